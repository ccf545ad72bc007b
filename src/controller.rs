use std::{
    sync::Arc,
    time::Instant,
};

use crate::{
    animator::{Animator, AnimationUpdate, DEFAULT_ANIMATION},
    backend::{BlurAlgorithm, BlurBackend},
    cache::CacheKey,
    color::{Argb, blend_over_in_place},
    color_extract::DynamicColorExtractor,
    error::{FrostError, FrostResult},
    optimizer::{OptimizerOptions, PerformanceOptimizer, PerformanceStats},
    snapshot::{Snapshot, scaled_dims},
    surface::{HostSurface, TargetSurface},
};

pub const DEFAULT_BLUR_RADIUS: f32 = 16.0;
pub const DEFAULT_SCALE_FACTOR: f32 = 6.0;

/// The mutable effect parameters. Owned exclusively by the controller;
/// external mutation goes through the facade setters only.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectConfig {
    pub radius: f32,
    pub overlay_color: Argb,
    pub auto_update: bool,
    pub enabled: bool,
    pub scale_factor: f32,
    pub apply_noise: bool,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_BLUR_RADIUS,
            overlay_color: crate::color::TRANSPARENT,
            auto_update: true,
            enabled: true,
            scale_factor: DEFAULT_SCALE_FACTOR,
            apply_noise: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ControllerState {
    Uninitialized,
    Active,
    /// Terminal. Every public call afterwards is a logged no-op.
    Destroyed,
}

/// Orchestrates one blur-and-composite pass per frame request and exposes the
/// chainable configuration facade.
///
/// Lifecycle: `Uninitialized -> Active` via [`Self::setup_with`],
/// `-> Destroyed` via [`Self::destroy`]. Nothing in the per-frame path ever
/// propagates a failure to the host; degraded frames are drawn unblurred and
/// logged.
pub struct EffectController {
    state: ControllerState,
    config: EffectConfig,
    backend: BlurBackend,
    target: Option<Box<dyn TargetSurface>>,
    optimizer: Option<Arc<PerformanceOptimizer>>,
    optimizer_options: OptimizerOptions,
    color_extractor: Option<DynamicColorExtractor>,
    animator: Animator,
    animations_enabled: bool,
    dynamic_colors_enabled: bool,
    performance_optimization_enabled: bool,
    last_frame: Option<Snapshot>,
    frame_dirty: bool,
}

impl EffectController {
    pub fn new() -> Self {
        Self::with_optimizer_options(OptimizerOptions::default())
    }

    pub fn with_optimizer_options(options: OptimizerOptions) -> Self {
        Self {
            state: ControllerState::Uninitialized,
            config: EffectConfig::default(),
            backend: BlurBackend::NoOp,
            target: None,
            optimizer: None,
            optimizer_options: options,
            color_extractor: None,
            animator: Animator::new(),
            animations_enabled: true,
            dynamic_colors_enabled: false,
            performance_optimization_enabled: true,
            last_frame: None,
            frame_dirty: true,
        }
    }

    /// Attaches the controller to a target surface, replacing any previous
    /// backend. When the optimizer currently recommends the approximation
    /// path, its quality scale becomes a floor on the scale factor.
    pub fn setup_with(
        &mut self,
        target: Box<dyn TargetSurface>,
        algorithm: BlurAlgorithm,
        scale_factor: f32,
        apply_noise: bool,
    ) -> FrostResult<&mut Self> {
        if self.state == ControllerState::Destroyed {
            tracing::debug!("setup_with on destroyed controller ignored");
            return Ok(self);
        }
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(FrostError::validation("scale_factor must be > 0"));
        }

        if self.performance_optimization_enabled && self.optimizer.is_none() {
            self.optimizer = Some(Arc::new(PerformanceOptimizer::new(
                self.optimizer_options.clone(),
            )?));
        }

        let caps = target.capabilities();
        let mut scale_factor = scale_factor;
        if let Some(opt) = &self.optimizer
            && opt.optimal_blur_algorithm(caps) == BlurAlgorithm::FastApproximation
        {
            scale_factor = scale_factor.max(opt.current_quality_scale());
        }

        self.backend = BlurBackend::select(caps, algorithm);
        self.config.scale_factor = scale_factor;
        self.config.apply_noise = apply_noise;
        self.target = Some(target);
        self.last_frame = None;
        self.frame_dirty = true;
        self.state = ControllerState::Active;

        if self.dynamic_colors_enabled && self.color_extractor.is_none() {
            self.color_extractor = self.make_extractor();
        }

        tracing::debug!(backend = ?self.backend, scale_factor, "controller attached");
        Ok(self)
    }

    /// Setup with the platform-default algorithm, scale factor and noise.
    pub fn setup_with_defaults(&mut self, target: Box<dyn TargetSurface>) -> FrostResult<&mut Self> {
        self.setup_with(target, BlurAlgorithm::default(), DEFAULT_SCALE_FACTOR, true)
    }

    /// Runs one blur-and-composite pass into `host`. Returns whether the host
    /// should continue drawing its children (always true; the effect never
    /// consumes the frame).
    #[tracing::instrument(skip_all, level = "trace")]
    pub fn render_frame(&mut self, host: &mut dyn HostSurface) -> FrostResult<bool> {
        match self.state {
            ControllerState::Uninitialized => return Ok(true),
            ControllerState::Destroyed => {
                tracing::debug!("render_frame on destroyed controller");
                return Ok(true);
            }
            ControllerState::Active => {}
        }
        if !self.config.enabled {
            return Ok(true);
        }

        // Auto-update suspended: re-present the last frame until the host
        // forces an update.
        if !self.config.auto_update && !self.frame_dirty {
            if let Some(frame) = self.last_frame.clone()
                && let Err(err) = host.present(&frame)
            {
                tracing::warn!(%err, "host refused re-presented frame");
            }
            return Ok(true);
        }

        let Some(target) = self.target.as_deref() else {
            return Ok(true);
        };
        let (full_w, full_h) = target.size();
        let (snap_w, snap_h) = scaled_dims(full_w, full_h, self.config.scale_factor);
        if snap_w == 0 || snap_h == 0 {
            tracing::debug!("target has no area, skipping pass");
            return Ok(true);
        }

        let snapshot = match target.capture(snap_w, snap_h) {
            Ok(snap) => snap,
            Err(err) => {
                tracing::warn!(%err, "snapshot capture failed, skipping pass");
                return Ok(true);
            }
        };
        if snapshot.is_degenerate() {
            tracing::debug!("degenerate snapshot, skipping pass");
            return Ok(true);
        }

        let blurred = self.blur_or_cached(&snapshot);

        if self.dynamic_colors_enabled
            && let Some(extractor) = &self.color_extractor
        {
            self.config.overlay_color =
                extractor.extract_adaptive_color(&blurred, self.config.overlay_color);
        }

        match self.compose(&blurred, full_w, full_h) {
            Ok(frame) => {
                if let Err(err) = host.present(&frame) {
                    tracing::warn!(%err, "host refused composited frame");
                }
                self.last_frame = Some(frame);
                self.frame_dirty = false;
            }
            Err(err) => tracing::warn!(%err, "compositing failed, frame dropped"),
        }

        Ok(true)
    }

    /// Cache-first blur. A miss runs the backend and records its wall time; a
    /// backend failure degrades to the unblurred snapshot.
    fn blur_or_cached(&self, snapshot: &Snapshot) -> Snapshot {
        let key = CacheKey::new(
            snapshot.width(),
            snapshot.height(),
            self.config.radius,
            self.config.overlay_color,
            self.config.scale_factor,
        );
        if let Some(opt) = &self.optimizer
            && let Some(hit) = opt.cached(&key)
        {
            return hit;
        }

        let effective_radius = self.config.radius * self.config.scale_factor;
        // The accelerated path parallelizes on the optimizer's bounded pool,
        // never on rayon's global one.
        let pool = self.optimizer.as_ref().and_then(|opt| opt.worker_pool());
        let start = Instant::now();
        match self.backend.blur(
            snapshot,
            effective_radius,
            self.config.apply_noise,
            pool.as_deref(),
        ) {
            Ok(blurred) => {
                if let Some(opt) = &self.optimizer {
                    opt.record_blur_performance(start, Instant::now());
                    opt.cache_result(
                        key,
                        blurred.clone(),
                        self.config.radius,
                        self.config.overlay_color,
                    );
                }
                blurred
            }
            Err(err) => {
                tracing::warn!(%err, "blur backend failed, drawing unblurred");
                snapshot.clone()
            }
        }
    }

    fn compose(&self, blurred: &Snapshot, width: u32, height: u32) -> FrostResult<Snapshot> {
        let upscaled = blurred.resized(width, height)?;
        if upscaled.is_degenerate() {
            return Err(FrostError::render("composited frame has no area"));
        }
        let mut pixels = upscaled.pixels().to_vec();
        blend_over_in_place(&mut pixels, self.config.overlay_color);
        Snapshot::new(width, height, pixels)
    }

    // Facade setters. All chainable; all safe no-ops once destroyed.

    pub fn set_blur_radius(&mut self, radius: f32) -> &mut Self {
        if self.guard_destroyed("set_blur_radius") {
            return self;
        }
        self.config.radius = radius.max(0.0);
        self.frame_dirty = true;
        self
    }

    pub fn set_overlay_color(&mut self, color: Argb) -> &mut Self {
        if self.guard_destroyed("set_overlay_color") {
            return self;
        }
        self.config.overlay_color = color;
        self.frame_dirty = true;
        self
    }

    pub fn set_blur_auto_update(&mut self, enabled: bool) -> &mut Self {
        if self.guard_destroyed("set_blur_auto_update") {
            return self;
        }
        self.config.auto_update = enabled;
        self
    }

    pub fn set_blur_enabled(&mut self, enabled: bool) -> &mut Self {
        if self.guard_destroyed("set_blur_enabled") {
            return self;
        }
        self.config.enabled = enabled;
        self.frame_dirty = true;
        self
    }

    pub fn set_animations_enabled(&mut self, enabled: bool) -> &mut Self {
        if self.guard_destroyed("set_animations_enabled") {
            return self;
        }
        self.animations_enabled = enabled;
        if !enabled {
            self.animator.cancel_all();
        }
        self
    }

    pub fn set_dynamic_colors_enabled(&mut self, enabled: bool) -> &mut Self {
        if self.guard_destroyed("set_dynamic_colors_enabled") {
            return self;
        }
        self.dynamic_colors_enabled = enabled;
        if enabled && self.color_extractor.is_none() {
            self.color_extractor = self.make_extractor();
        } else if !enabled && let Some(extractor) = self.color_extractor.take() {
            extractor.clear_cache();
        }
        self
    }

    pub fn set_performance_optimization_enabled(&mut self, enabled: bool) -> &mut Self {
        if self.guard_destroyed("set_performance_optimization_enabled") {
            return self;
        }
        self.performance_optimization_enabled = enabled;
        if enabled && self.optimizer.is_none() {
            match PerformanceOptimizer::new(self.optimizer_options.clone()) {
                Ok(opt) => self.optimizer = Some(Arc::new(opt)),
                Err(err) => tracing::warn!(%err, "could not start performance optimizer"),
            }
        } else if !enabled && let Some(opt) = self.optimizer.take() {
            opt.destroy();
        }
        self
    }

    /// Applies a JSON option map. Recognized keys: radius, overlayColor,
    /// blurAutoUpdate, blurEnabled, animationsEnabled, dynamicColorsEnabled,
    /// performanceOptimizationEnabled.
    pub fn apply_options(&mut self, options: &serde_json::Value) -> FrostResult<&mut Self> {
        if self.guard_destroyed("apply_options") {
            return Ok(self);
        }
        let Some(map) = options.as_object() else {
            return Err(FrostError::validation("options must be a JSON object"));
        };

        for (key, value) in map {
            match key.as_str() {
                "radius" => {
                    let radius = value
                        .as_f64()
                        .ok_or_else(|| FrostError::validation("radius must be a number"))?;
                    if !radius.is_finite() || radius < 0.0 {
                        return Err(FrostError::validation("radius must be finite and >= 0"));
                    }
                    self.set_blur_radius(radius as f32);
                }
                "overlayColor" => {
                    let raw = value
                        .as_u64()
                        .ok_or_else(|| FrostError::validation("overlayColor must be an integer"))?;
                    let color = u32::try_from(raw).map_err(|_| {
                        FrostError::validation("overlayColor is out of ARGB range")
                    })?;
                    self.set_overlay_color(Argb(color));
                }
                "blurAutoUpdate" => {
                    self.set_blur_auto_update(expect_bool(key, value)?);
                }
                "blurEnabled" => {
                    self.set_blur_enabled(expect_bool(key, value)?);
                }
                "animationsEnabled" => {
                    self.set_animations_enabled(expect_bool(key, value)?);
                }
                "dynamicColorsEnabled" => {
                    self.set_dynamic_colors_enabled(expect_bool(key, value)?);
                }
                "performanceOptimizationEnabled" => {
                    self.set_performance_optimization_enabled(expect_bool(key, value)?);
                }
                other => {
                    return Err(FrostError::validation(format!(
                        "unknown option '{other}'"
                    )));
                }
            }
        }
        Ok(self)
    }

    // Animation triggers.

    /// Springs the radius toward `target`, or sets it directly when
    /// animations are off.
    pub fn animate_blur_radius(&mut self, target: f32) -> &mut Self {
        if self.guard_destroyed("animate_blur_radius") {
            return self;
        }
        if self.animations_enabled {
            self.animator
                .animate_radius(self.config.radius, target.max(0.0), DEFAULT_ANIMATION);
        } else {
            self.set_blur_radius(target);
        }
        self
    }

    pub fn animate_blur_radius_with_velocity(&mut self, velocity: f32, target: f32) -> &mut Self {
        if self.guard_destroyed("animate_blur_radius_with_velocity") {
            return self;
        }
        if self.animations_enabled {
            self.animator
                .animate_radius_with_velocity(velocity, self.config.radius, target.max(0.0));
        } else {
            self.set_blur_radius(target);
        }
        self
    }

    /// Fades the overlay toward the target state; the enabled flag flips at
    /// fade completion.
    pub fn animate_blur_enabled(&mut self, enabled: bool) -> &mut Self {
        if self.guard_destroyed("animate_blur_enabled") {
            return self;
        }
        if self.animations_enabled {
            self.animator.animate_enabled(enabled, DEFAULT_ANIMATION);
        } else {
            self.set_blur_enabled(enabled);
        }
        self
    }

    /// Advances in-flight animations to `now` and applies their updates.
    /// Driven by the host's display tick, independent of `render_frame`.
    pub fn tick_animations(&mut self, now: Instant) -> &mut Self {
        if self.state == ControllerState::Destroyed {
            return self;
        }
        for update in self.animator.tick(now) {
            match update {
                AnimationUpdate::Radius(radius) => {
                    self.config.radius = radius.max(0.0);
                }
                AnimationUpdate::OverlayAlpha(alpha) => {
                    self.config.overlay_color = self.config.overlay_color.with_alpha(alpha);
                }
                AnimationUpdate::EnabledFlipped(enabled) => {
                    self.config.enabled = enabled;
                }
            }
            self.frame_dirty = true;
        }
        self
    }

    pub fn is_animating(&self) -> bool {
        self.animator.is_animating()
    }

    /// Manual dynamic-color trigger: derives a tint from `source` and adopts
    /// it as the overlay color.
    pub fn apply_dynamic_colors(&mut self, source: &Snapshot) -> &mut Self {
        if self.guard_destroyed("apply_dynamic_colors") {
            return self;
        }
        if let Some(extractor) = &self.color_extractor {
            self.config.overlay_color =
                extractor.extract_adaptive_color(source, self.config.overlay_color);
            self.frame_dirty = true;
        }
        self
    }

    /// Marks the current frame stale; the next `render_frame` recomputes even
    /// with auto-update off.
    pub fn invalidate(&mut self) -> &mut Self {
        if self.guard_destroyed("invalidate") {
            return self;
        }
        self.frame_dirty = true;
        self
    }

    /// Resize notification from the host; drops the stale composited frame.
    pub fn update_surface_size(&mut self) -> &mut Self {
        if self.guard_destroyed("update_surface_size") {
            return self;
        }
        self.last_frame = None;
        self.frame_dirty = true;
        self
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.state == ControllerState::Active
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == ControllerState::Destroyed
    }

    pub fn performance_stats(&self) -> Option<PerformanceStats> {
        self.optimizer.as_ref().map(|opt| opt.performance_stats())
    }

    /// Detaches and releases everything. Cancels in-flight animations; an
    /// in-flight background blur may still finish, its result is discarded
    /// harmlessly. Idempotent.
    pub fn destroy(&mut self) {
        if self.state == ControllerState::Destroyed {
            return;
        }
        self.state = ControllerState::Destroyed;
        self.animator.cancel_all();
        if let Some(extractor) = self.color_extractor.take() {
            extractor.clear_cache();
        }
        if let Some(opt) = self.optimizer.take() {
            opt.destroy();
        }
        self.target = None;
        self.last_frame = None;
        self.backend = BlurBackend::NoOp;
        tracing::debug!("controller destroyed");
    }

    fn guard_destroyed(&self, call: &str) -> bool {
        if self.state == ControllerState::Destroyed {
            tracing::debug!(call, "call on destroyed controller ignored");
            return true;
        }
        false
    }

    fn make_extractor(&self) -> Option<DynamicColorExtractor> {
        let pool = match self.optimizer.as_ref().and_then(|opt| opt.worker_pool()) {
            Some(pool) => pool,
            None => {
                // No optimizer to share a pool with: run analysis on a small
                // dedicated pool.
                match rayon::ThreadPoolBuilder::new().num_threads(2).build() {
                    Ok(pool) => Arc::new(pool),
                    Err(err) => {
                        tracing::warn!(%err, "could not start color analysis pool");
                        return None;
                    }
                }
            }
        };
        Some(DynamicColorExtractor::new(pool))
    }
}

impl Default for EffectController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EffectController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectController")
            .field("state", &self.state)
            .field("backend", &self.backend)
            .field("config", &self.config)
            .finish()
    }
}

fn expect_bool(key: &str, value: &serde_json::Value) -> FrostResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| FrostError::validation(format!("option '{key}' must be a boolean")))
}
