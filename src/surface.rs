use crate::{error::FrostResult, snapshot::Snapshot};

/// Capabilities reported by the runtime environment hosting the target surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceCaps {
    /// The compositor can apply blur effects natively. When set, backend
    /// selection always picks the accelerated path, whatever the caller asked
    /// for.
    pub compositor_effects: bool,
}

/// The content behind the effect: something the controller can snapshot at a
/// requested resolution.
pub trait TargetSurface: Send {
    /// Full-resolution size of the region to blur, in pixels.
    fn size(&self) -> (u32, u32);

    fn capabilities(&self) -> SurfaceCaps {
        SurfaceCaps::default()
    }

    /// Captures the region downscaled to `width` x `height`.
    fn capture(&self, width: u32, height: u32) -> FrostResult<Snapshot>;
}

/// Where composited frames go: the visible container that owns the controller.
pub trait HostSurface {
    /// Receives the full-resolution composited frame. Called once per
    /// effect-producing `render_frame` pass.
    fn present(&mut self, frame: &Snapshot) -> FrostResult<()>;
}
