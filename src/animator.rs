use std::time::{Duration, Instant};

/// Spring parameters tuned for a soft, natural settle.
pub const SPRING_DAMPING: f32 = 0.8;
pub const SPRING_RESPONSE_S: f32 = 0.3;
pub const DEFAULT_ANIMATION: Duration = Duration::from_millis(300);

const MIN_VELOCITY_DURATION_MS: u64 = 150;
const MAX_VELOCITY_DURATION_MS: u64 = 500;

/// Damped-oscillator interpolation over normalized time [0, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpringCurve {
    pub damping: f32,
    pub response_s: f32,
}

impl Default for SpringCurve {
    fn default() -> Self {
        Self {
            damping: SPRING_DAMPING,
            response_s: SPRING_RESPONSE_S,
        }
    }
}

impl SpringCurve {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let w = 2.0 * std::f32::consts::PI / self.response_s;
        let zeta = self.damping;

        if zeta < 1.0 {
            let wd = w * (1.0 - zeta * zeta).sqrt();
            1.0 - (-zeta * w * t).exp() * ((wd * t).cos() + (zeta * w / wd) * (wd * t).sin())
        } else {
            1.0 - (-w * t).exp() * (1.0 + w * t)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Curve {
    Spring(SpringCurve),
    /// `1 - (1-t)^(2*factor)`; used for enable/disable fades.
    Decelerate { factor: f32 },
}

impl Curve {
    pub fn spring() -> Self {
        Self::Spring(SpringCurve::default())
    }

    pub fn decelerate() -> Self {
        Self::Decelerate { factor: 1.5 }
    }

    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Spring(s) => s.apply(t),
            Self::Decelerate { factor } => 1.0 - (1.0 - t).powf(2.0 * factor),
        }
    }
}

/// One in-flight scalar transition.
#[derive(Clone, Copy, Debug)]
pub struct Tween {
    from: f32,
    to: f32,
    start: Instant,
    duration: Duration,
    curve: Curve,
}

impl Tween {
    pub fn new(from: f32, to: f32, duration: Duration, curve: Curve) -> Self {
        Self {
            from,
            to,
            start: Instant::now(),
            duration,
            curve,
        }
    }

    fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn value_at(&self, now: Instant) -> f32 {
        let eased = self.curve.apply(self.progress(now));
        self.from + (self.to - self.from) * eased
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

/// What the controller should apply after a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimationUpdate {
    Radius(f32),
    OverlayAlpha(u8),
    /// Emitted once, when an enable/disable fade completes.
    EnabledFlipped(bool),
}

/// Drives smooth transitions of effect parameters, decoupled from the render
/// cadence. At most one tween per target; starting a new one replaces the old
/// outright, so a superseded tween never emits another update.
#[derive(Debug, Default)]
pub struct Animator {
    radius: Option<Tween>,
    fade: Option<(Tween, bool)>,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn animate_radius(&mut self, from: f32, to: f32, duration: Duration) {
        self.radius = Some(Tween::new(from, to, duration, Curve::spring()));
    }

    /// Gesture-driven variant: faster gestures get shorter settles, clamped to
    /// [150, 500] ms.
    pub fn animate_radius_with_velocity(&mut self, velocity: f32, from: f32, to: f32) {
        let speed = (velocity.abs() / 1000.0).max(0.1);
        let ms = (DEFAULT_ANIMATION.as_millis() as f32 / speed) as u64;
        let ms = ms.clamp(MIN_VELOCITY_DURATION_MS, MAX_VELOCITY_DURATION_MS);
        self.animate_radius(from, to, Duration::from_millis(ms));
    }

    /// Fades overlay alpha toward the target state on a decelerate curve. The
    /// enabled flag itself flips only at completion, never mid-flight.
    pub fn animate_enabled(&mut self, enabled: bool, duration: Duration) {
        let (from, to) = if enabled { (0.0, 1.0) } else { (1.0, 0.0) };
        self.fade = Some((Tween::new(from, to, duration, Curve::decelerate()), enabled));
    }

    pub fn cancel_all(&mut self) {
        self.radius = None;
        self.fade = None;
    }

    pub fn is_animating(&self) -> bool {
        self.radius.is_some() || self.fade.is_some()
    }

    /// Samples every live tween at `now`. Finished tweens are dropped after
    /// their final update.
    pub fn tick(&mut self, now: Instant) -> Vec<AnimationUpdate> {
        let mut updates = Vec::new();

        if let Some(tween) = self.radius {
            updates.push(AnimationUpdate::Radius(tween.value_at(now)));
            if tween.is_finished(now) {
                self.radius = None;
            }
        }

        if let Some((tween, target)) = self.fade {
            let alpha = (tween.value_at(now) * 255.0).round().clamp(0.0, 255.0) as u8;
            updates.push(AnimationUpdate::OverlayAlpha(alpha));
            if tween.is_finished(now) {
                updates.push(AnimationUpdate::EnabledFlipped(target));
                self.fade = None;
            }
        }

        updates
    }
}
