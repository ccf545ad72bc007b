/// 32-bit ARGB color, the wire format for overlay tints and extracted swatches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Argb(pub u32);

pub const TRANSPARENT: Argb = Argb(0);

impl Argb {
    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32))
    }

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_argb(255, r, g, b)
    }

    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn blue(self) -> u8 {
        self.0 as u8
    }

    pub const fn with_alpha(self, alpha: u8) -> Self {
        Self((self.0 & 0x00FF_FFFF) | ((alpha as u32) << 24))
    }

    /// Hue [0, 360), saturation [0, 1], value [0, 1]. Alpha is dropped.
    pub fn to_hsv(self) -> Hsv {
        let r = f32::from(self.red()) / 255.0;
        let g = f32::from(self.green()) / 255.0;
        let b = f32::from(self.blue()) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let saturation = if max == 0.0 { 0.0 } else { delta / max };

        Hsv {
            hue,
            saturation,
            value: max,
        }
    }
}

impl std::fmt::Display for Argb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hsv {
    pub hue: f32,
    pub saturation: f32,
    pub value: f32,
}

impl Hsv {
    pub fn to_rgb(self) -> Argb {
        let h = self.hue.rem_euclid(360.0);
        let s = self.saturation.clamp(0.0, 1.0);
        let v = self.value.clamp(0.0, 1.0);

        let c = v * s;
        let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
        let m = v - c;

        let (r, g, b) = match (h / 60.0) as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        let to_u8 = |ch: f32| ((ch + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Argb::from_rgb(to_u8(r), to_u8(g), to_u8(b))
    }
}

/// Composites `overlay` over one straight-alpha RGBA8 pixel in place.
pub fn blend_over(px: &mut [u8], overlay: Argb) {
    let sa = u16::from(overlay.alpha());
    if sa == 0 {
        return;
    }
    let inv = 255u16 - sa;

    let src = [overlay.red(), overlay.green(), overlay.blue()];
    for (c, &s) in px.iter_mut().take(3).zip(src.iter()) {
        let blended = mul_div255(u16::from(s), sa) as u16 + mul_div255(u16::from(*c), inv) as u16;
        *c = blended.min(255) as u8;
    }
    let da = u16::from(px[3]);
    px[3] = (sa + mul_div255(da, inv) as u16).min(255) as u8;
}

/// Composites `overlay` over every pixel of a straight-alpha RGBA8 buffer.
pub fn blend_over_in_place(pixels: &mut [u8], overlay: Argb) {
    if overlay.alpha() == 0 {
        return;
    }
    for px in pixels.chunks_exact_mut(4) {
        blend_over(px, overlay);
    }
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trip() {
        let c = Argb::from_argb(120, 10, 20, 30);
        assert_eq!(c.alpha(), 120);
        assert_eq!(c.red(), 10);
        assert_eq!(c.green(), 20);
        assert_eq!(c.blue(), 30);
        assert_eq!(c.with_alpha(255).alpha(), 255);
        assert_eq!(c.with_alpha(255).red(), 10);
    }

    #[test]
    fn hex_display_matches_argb_layout() {
        assert_eq!(Argb::from_argb(0x40, 0x00, 0x00, 0x00).to_string(), "40000000");
        assert_eq!(Argb::from_argb(0xff, 0x12, 0x34, 0x56).to_string(), "ff123456");
    }

    #[test]
    fn hsv_round_trip_on_primaries() {
        for c in [
            Argb::from_rgb(255, 0, 0),
            Argb::from_rgb(0, 255, 0),
            Argb::from_rgb(0, 0, 255),
            Argb::from_rgb(128, 128, 128),
            Argb::from_rgb(0, 0, 0),
        ] {
            assert_eq!(c.to_hsv().to_rgb(), c);
        }
    }

    #[test]
    fn blend_transparent_overlay_is_noop() {
        let mut px = [10, 20, 30, 40];
        blend_over(&mut px, TRANSPARENT);
        assert_eq!(px, [10, 20, 30, 40]);
    }

    #[test]
    fn blend_opaque_overlay_replaces_color() {
        let mut px = [10, 20, 30, 255];
        blend_over(&mut px, Argb::from_rgb(200, 100, 50));
        assert_eq!(px, [200, 100, 50, 255]);
    }

    #[test]
    fn blend_half_overlay_mixes() {
        let mut px = [0, 0, 0, 255];
        blend_over(&mut px, Argb::from_argb(128, 255, 255, 255));
        // Roughly half-way toward white.
        assert!(px[0] >= 126 && px[0] <= 130, "got {}", px[0]);
        assert_eq!(px[3], 255);
    }
}
