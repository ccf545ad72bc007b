use crate::{
    blur_cpu::{apply_noise_in_place, box_blur_rgba8, gaussian_blur_rgba8},
    error::{FrostError, FrostResult},
    snapshot::Snapshot,
    surface::SurfaceCaps,
};

/// Kernel radii above this add cost without visible change on downscaled
/// snapshots.
const MAX_RADIUS_PX: u32 = 256;

/// Blur algorithm requested by the caller at setup time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlurAlgorithm {
    /// Compositor-effect path; honored only when the surface reports the
    /// capability.
    Accelerated,
    /// Separable Gaussian, the standard software path.
    #[default]
    Gaussian,
    /// Box-blur approximation for frames that keep missing the budget.
    FastApproximation,
}

/// The backend actually selected for a controller, chosen once at setup and
/// never re-dispatched per call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlurBackend {
    /// Row-parallel Gaussian on the worker pool, standing in for the
    /// compositor effect.
    Accelerated,
    Gaussian,
    FastApproximation,
    /// Pre-setup placeholder: passes snapshots through untouched.
    #[default]
    NoOp,
}

impl BlurBackend {
    /// Selection rule: a surface with compositor effects always gets the
    /// accelerated path, whatever the caller requested. This mirrors the
    /// observed behavior of the platform it models and is deliberate.
    pub fn select(caps: SurfaceCaps, requested: BlurAlgorithm) -> Self {
        if caps.compositor_effects {
            if requested != BlurAlgorithm::Accelerated {
                tracing::debug!(?requested, "compositor effects present, requested algorithm ignored");
            }
            return Self::Accelerated;
        }
        match requested {
            BlurAlgorithm::Accelerated => {
                tracing::debug!("accelerated blur requested without compositor effects, using gaussian");
                Self::Gaussian
            }
            BlurAlgorithm::Gaussian => Self::Gaussian,
            BlurAlgorithm::FastApproximation => Self::FastApproximation,
        }
    }

    pub fn is_noop(self) -> bool {
        self == Self::NoOp
    }

    /// Blurs `snapshot` with the given radius (in pixels of the snapshot's own
    /// resolution). The input is never mutated; radius <= 0 degenerates to an
    /// identity copy. The accelerated path fans out on `pool`; without one it
    /// stays serial, never on rayon's global registry.
    pub fn blur(
        self,
        snapshot: &Snapshot,
        radius: f32,
        apply_noise: bool,
        pool: Option<&rayon::ThreadPool>,
    ) -> FrostResult<Snapshot> {
        if snapshot.is_degenerate() {
            return Ok(Snapshot::degenerate());
        }
        if !radius.is_finite() {
            return Err(FrostError::validation("blur radius must be finite"));
        }

        let radius_px = radius.max(0.0).round().min(MAX_RADIUS_PX as f32) as u32;
        if self == Self::NoOp || radius_px == 0 {
            return Ok(snapshot.clone());
        }

        let (w, h) = (snapshot.width(), snapshot.height());
        let sigma = (radius_px as f32 / 2.0).max(0.5);
        let mut pixels = match self {
            Self::Accelerated => match pool {
                Some(pool) => {
                    pool.install(|| gaussian_blur_rgba8(snapshot.pixels(), w, h, radius_px, sigma, true))?
                }
                None => gaussian_blur_rgba8(snapshot.pixels(), w, h, radius_px, sigma, false)?,
            },
            Self::Gaussian => gaussian_blur_rgba8(snapshot.pixels(), w, h, radius_px, sigma, false)?,
            Self::FastApproximation => box_blur_rgba8(snapshot.pixels(), w, h, radius_px)?,
            Self::NoOp => unreachable!("handled above"),
        };

        if apply_noise {
            let seed = (u64::from(w) << 32) | u64::from(h);
            apply_noise_in_place(&mut pixels, w, seed);
        }

        Snapshot::new(w, h, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(compositor_effects: bool) -> SurfaceCaps {
        SurfaceCaps { compositor_effects }
    }

    fn snap(w: u32, h: u32) -> Snapshot {
        Snapshot::new(w, h, vec![100u8; (w * h * 4) as usize]).unwrap()
    }

    #[test]
    fn compositor_capability_overrides_requested_algorithm() {
        for requested in [
            BlurAlgorithm::Accelerated,
            BlurAlgorithm::Gaussian,
            BlurAlgorithm::FastApproximation,
        ] {
            assert_eq!(
                BlurBackend::select(caps(true), requested),
                BlurBackend::Accelerated
            );
        }
    }

    #[test]
    fn software_selection_honors_request() {
        assert_eq!(
            BlurBackend::select(caps(false), BlurAlgorithm::Gaussian),
            BlurBackend::Gaussian
        );
        assert_eq!(
            BlurBackend::select(caps(false), BlurAlgorithm::FastApproximation),
            BlurBackend::FastApproximation
        );
        // No hardware to accelerate with: degrade to the standard path.
        assert_eq!(
            BlurBackend::select(caps(false), BlurAlgorithm::Accelerated),
            BlurBackend::Gaussian
        );
    }

    #[test]
    fn noop_passes_snapshot_through() {
        let s = snap(2, 2);
        let out = BlurBackend::NoOp.blur(&s, 25.0, true, None).unwrap();
        assert_eq!(out.pixels(), s.pixels());
    }

    #[test]
    fn zero_radius_is_identity_copy() {
        let s = snap(3, 3);
        let out = BlurBackend::Gaussian.blur(&s, 0.0, false, None).unwrap();
        assert_eq!(out.pixels(), s.pixels());
    }

    #[test]
    fn negative_radius_degenerates_to_identity() {
        let s = snap(3, 3);
        let out = BlurBackend::FastApproximation
            .blur(&s, -5.0, false, None)
            .unwrap();
        assert_eq!(out.pixels(), s.pixels());
    }

    #[test]
    fn blur_does_not_mutate_input() {
        let s = snap(4, 4);
        let before = s.pixels().to_vec();
        let _ = BlurBackend::Gaussian.blur(&s, 3.0, true, None).unwrap();
        assert_eq!(s.pixels(), before.as_slice());
    }

    #[test]
    fn degenerate_snapshot_short_circuits() {
        let out = BlurBackend::Gaussian
            .blur(&Snapshot::degenerate(), 10.0, false, None)
            .unwrap();
        assert!(out.is_degenerate());
    }

    fn gradient(w: u32, h: u32) -> Snapshot {
        let pixels: Vec<u8> = (0..(w * h * 4)).map(|i| (i * 37 % 251) as u8).collect();
        Snapshot::new(w, h, pixels).unwrap()
    }

    #[test]
    fn accelerated_path_runs_inside_the_supplied_pool() {
        let s = gradient(9, 7);
        let serial = BlurBackend::Gaussian.blur(&s, 3.0, false, None).unwrap();

        // A single-thread pool: install + par_chunks_mut must complete on it
        // without deadlocking, and the output must match the serial path.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();
        let bounded = BlurBackend::Accelerated
            .blur(&s, 3.0, false, Some(&pool))
            .unwrap();
        assert_eq!(bounded.pixels(), serial.pixels());
    }

    #[test]
    fn accelerated_path_without_a_pool_stays_serial() {
        let s = gradient(5, 5);
        let serial = BlurBackend::Gaussian.blur(&s, 2.0, false, None).unwrap();
        let out = BlurBackend::Accelerated.blur(&s, 2.0, false, None).unwrap();
        assert_eq!(out.pixels(), serial.pixels());
    }
}
