use std::collections::HashMap;

use crate::{color::Argb, snapshot::Snapshot};

/// Colors kept after quantization. More buys little for tint selection.
const MAX_COLORS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Swatch {
    pub color: Argb,
    pub population: u32,
}

/// Coarse palette of a snapshot: pixels quantized to 4 bits per channel, the
/// most populous bins kept, each represented by its average color. A tint
/// heuristic, not photographic analysis.
#[derive(Clone, Debug)]
pub struct Palette {
    swatches: Vec<Swatch>,
}

impl Palette {
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        if snapshot.is_degenerate() {
            return None;
        }

        struct Bin {
            count: u32,
            r: u64,
            g: u64,
            b: u64,
        }

        let mut bins: HashMap<u16, Bin> = HashMap::new();
        for px in snapshot.pixels().chunks_exact(4) {
            // Fully transparent pixels carry no color information.
            if px[3] == 0 {
                continue;
            }
            let key = (u16::from(px[0] >> 4) << 8) | (u16::from(px[1] >> 4) << 4) | u16::from(px[2] >> 4);
            let bin = bins.entry(key).or_insert(Bin {
                count: 0,
                r: 0,
                g: 0,
                b: 0,
            });
            bin.count += 1;
            bin.r += u64::from(px[0]);
            bin.g += u64::from(px[1]);
            bin.b += u64::from(px[2]);
        }
        if bins.is_empty() {
            return None;
        }

        let mut swatches: Vec<Swatch> = bins
            .into_values()
            .map(|bin| Swatch {
                color: Argb::from_rgb(
                    (bin.r / u64::from(bin.count)) as u8,
                    (bin.g / u64::from(bin.count)) as u8,
                    (bin.b / u64::from(bin.count)) as u8,
                ),
                population: bin.count,
            })
            .collect();
        swatches.sort_by(|a, b| b.population.cmp(&a.population));
        swatches.truncate(MAX_COLORS);

        Some(Self { swatches })
    }

    pub fn dominant(&self) -> Option<Swatch> {
        self.swatches.first().copied()
    }

    /// Most populous low-saturation, mid-brightness swatch.
    pub fn muted(&self) -> Option<Swatch> {
        self.best_match(|hsv| hsv.saturation <= 0.4 && (0.3..=0.7).contains(&hsv.value))
    }

    /// Most populous low-saturation, bright swatch.
    pub fn light_muted(&self) -> Option<Swatch> {
        self.best_match(|hsv| hsv.saturation <= 0.4 && hsv.value >= 0.55)
    }

    fn best_match(&self, accept: impl Fn(crate::color::Hsv) -> bool) -> Option<Swatch> {
        self.swatches
            .iter()
            .find(|s| accept(s.color.to_hsv()))
            .copied()
    }
}
