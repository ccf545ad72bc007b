#![forbid(unsafe_code)]

pub mod animator;
pub mod backend;
pub mod blur_cpu;
pub mod cache;
pub mod color;
pub mod color_extract;
pub mod controller;
pub mod error;
pub mod optimizer;
pub mod palette;
pub mod snapshot;
pub mod surface;

pub use animator::{AnimationUpdate, Animator, Curve, SpringCurve};
pub use backend::{BlurAlgorithm, BlurBackend};
pub use cache::{BlurCache, CacheKey};
pub use color::{Argb, Hsv};
pub use color_extract::DynamicColorExtractor;
pub use controller::{DEFAULT_BLUR_RADIUS, DEFAULT_SCALE_FACTOR, EffectConfig, EffectController};
pub use error::{FrostError, FrostResult};
pub use optimizer::{OptimizerOptions, PerformanceOptimizer, PerformanceStats};
pub use palette::{Palette, Swatch};
pub use snapshot::Snapshot;
pub use surface::{HostSurface, SurfaceCaps, TargetSurface};
