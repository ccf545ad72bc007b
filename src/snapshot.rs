use std::{sync::Arc, time::Instant};

use crate::error::{FrostError, FrostResult};

/// An immutable RGBA8 capture of the target region at one instant.
///
/// Pixels are shared behind an `Arc`, so clones are cheap and cache entries can
/// hand out the same buffer without copying. The buffer is never mutated after
/// capture; every pipeline stage that transforms a snapshot produces a new one.
#[derive(Clone, Debug)]
pub struct Snapshot {
    width: u32,
    height: u32,
    captured_at: Instant,
    pixels: Arc<[u8]>,
}

impl Snapshot {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> FrostResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| FrostError::validation("snapshot size overflow"))?;
        if pixels.len() != expected {
            return Err(FrostError::validation(
                "snapshot pixels must match width*height*4",
            ));
        }
        Ok(Self {
            width,
            height,
            captured_at: Instant::now(),
            pixels: pixels.into(),
        })
    }

    /// A 0x0 snapshot, produced when the target has no area.
    pub fn degenerate() -> Self {
        Self {
            width: 0,
            height: 0,
            captured_at: Instant::now(),
            pixels: Vec::new().into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0 || self.pixels.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// Identity of the underlying buffer, stable across clones of one capture.
    pub fn buffer_id(&self) -> usize {
        Arc::as_ptr(&self.pixels) as *const u8 as usize
    }

    pub fn to_image(&self) -> FrostResult<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.pixels.to_vec())
            .ok_or_else(|| FrostError::render("snapshot buffer does not form an image"))
    }

    pub fn from_image(img: image::RgbaImage) -> FrostResult<Self> {
        let (width, height) = img.dimensions();
        Self::new(width, height, img.into_raw())
    }

    /// Resamples to the given dimensions with a triangle filter.
    pub fn resized(&self, width: u32, height: u32) -> FrostResult<Self> {
        if self.is_degenerate() || width == 0 || height == 0 {
            return Ok(Self::degenerate());
        }
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }
        let img = self.to_image()?;
        let resized = image::imageops::resize(&img, width, height, image::imageops::Triangle);
        Self::from_image(resized)
    }
}

/// Downscaled capture dimensions for a given scale divisor: ceil(dim / scale),
/// at least 1x1 for a non-empty target.
pub fn scaled_dims(width: u32, height: u32, scale_factor: f32) -> (u32, u32) {
    if width == 0 || height == 0 || scale_factor <= 0.0 {
        return (0, 0);
    }
    let scale = |d: u32| ((f64::from(d) / f64::from(scale_factor)).ceil() as u32).max(1);
    (scale(width), scale(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_buffer() {
        assert!(Snapshot::new(2, 2, vec![0u8; 15]).is_err());
        assert!(Snapshot::new(2, 2, vec![0u8; 16]).is_ok());
    }

    #[test]
    fn degenerate_is_flagged() {
        assert!(Snapshot::degenerate().is_degenerate());
        assert!(!Snapshot::new(1, 1, vec![0u8; 4]).unwrap().is_degenerate());
    }

    #[test]
    fn clones_share_buffer_identity() {
        let snap = Snapshot::new(1, 1, vec![1, 2, 3, 4]).unwrap();
        let copy = snap.clone();
        assert_eq!(snap.buffer_id(), copy.buffer_id());

        let other = Snapshot::new(1, 1, vec![1, 2, 3, 4]).unwrap();
        assert_ne!(snap.buffer_id(), other.buffer_id());
    }

    #[test]
    fn scaled_dims_quarter_resolution() {
        assert_eq!(scaled_dims(400, 800, 4.0), (100, 200));
    }

    #[test]
    fn scaled_dims_rounds_up_and_floors_at_one() {
        assert_eq!(scaled_dims(401, 799, 4.0), (101, 200));
        assert_eq!(scaled_dims(3, 3, 8.0), (1, 1));
    }

    #[test]
    fn scaled_dims_zero_area_stays_zero() {
        assert_eq!(scaled_dims(0, 800, 4.0), (0, 0));
        assert_eq!(scaled_dims(400, 0, 4.0), (0, 0));
    }

    #[test]
    fn resized_changes_dimensions() {
        let snap = Snapshot::new(4, 4, vec![128u8; 64]).unwrap();
        let small = snap.resized(2, 2).unwrap();
        assert_eq!((small.width(), small.height()), (2, 2));

        let up = small.resized(4, 4).unwrap();
        assert_eq!((up.width(), up.height()), (4, 4));
    }
}
