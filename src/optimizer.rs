use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::Context;

use crate::{
    backend::BlurAlgorithm,
    cache::{BlurCache, CacheKey},
    color::Argb,
    error::FrostResult,
    snapshot::Snapshot,
    surface::SurfaceCaps,
};

const MIN_QUALITY_SCALE: f32 = 0.5;
const MAX_QUALITY_SCALE: f32 = 1.0;

/// Tunable knobs. The frame-budget thresholds are presentation heuristics, not
/// a guaranteed SLA.
#[derive(Clone, Debug)]
pub struct OptimizerOptions {
    /// Target per-frame blur budget in milliseconds (16 ms ~ 60 fps).
    pub target_frame_budget_ms: f32,
    /// Minimum spacing between two quality adjustments.
    pub sample_interval: Duration,
    /// Memory the cache budget is derived from (1/8th, in KB). There is no
    /// portable way to ask the OS for this without another dependency, so the
    /// host supplies it; the default assumes a few GB of headroom.
    pub available_memory_bytes: u64,
    /// Worker pool size; defaults to max(2, available_parallelism / 2).
    pub worker_threads: Option<usize>,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            target_frame_budget_ms: 16.0,
            sample_interval: Duration::from_millis(1000),
            available_memory_bytes: 4 << 30,
            worker_threads: None,
        }
    }
}

#[derive(Debug, Default)]
struct PerfTotals {
    total_blur_ms: f64,
    operations: u64,
}

/// Read-only snapshot of the optimizer's state.
#[derive(Clone, Copy, Debug)]
pub struct PerformanceStats {
    pub average_frame_time_ms: f32,
    pub current_quality_scale: f32,
    pub total_operations: u64,
    pub cache_size: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl PerformanceStats {
    pub fn cache_hit_rate(&self) -> f32 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f32 / total as f32
        }
    }
}

/// Bounds memory used by cached blur results and adapts rendering quality to
/// sustain the frame budget. One instance per controller; nothing here is
/// process-global.
pub struct PerformanceOptimizer {
    options: OptimizerOptions,
    cache: BlurCache,
    totals: Mutex<PerfTotals>,
    average_frame_time_bits: AtomicU32,
    quality_scale_bits: AtomicU32,
    last_adjustment: Mutex<Option<Instant>>,
    pool: Mutex<Option<Arc<rayon::ThreadPool>>>,
    destroyed: AtomicBool,
}

impl PerformanceOptimizer {
    pub fn new(options: OptimizerOptions) -> FrostResult<Self> {
        let threads = options.worker_threads.unwrap_or_else(|| {
            let cores = std::thread::available_parallelism().map_or(2, |n| n.get());
            (cores / 2).max(2)
        });
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("frostpane-worker-{i}"))
            .build()
            .context("build blur worker pool")?;

        let budget = BlurCache::budget_from_available_memory(options.available_memory_bytes);
        Ok(Self {
            cache: BlurCache::new(budget),
            totals: Mutex::new(PerfTotals::default()),
            average_frame_time_bits: AtomicU32::new(options.target_frame_budget_ms.to_bits()),
            quality_scale_bits: AtomicU32::new(MAX_QUALITY_SCALE.to_bits()),
            last_adjustment: Mutex::new(None),
            pool: Mutex::new(Some(Arc::new(pool))),
            destroyed: AtomicBool::new(false),
            options,
        })
    }

    pub fn cached(&self, key: &CacheKey) -> Option<Snapshot> {
        self.cache.get(key)
    }

    pub fn cache_result(&self, key: CacheKey, snapshot: Snapshot, radius: f32, overlay: Argb) {
        self.cache.insert(key, snapshot, radius, overlay);
    }

    /// Accumulates one completed blur operation and, at most once per sampling
    /// window, re-evaluates the quality scale. Safe to call from worker
    /// threads.
    pub fn record_blur_performance(&self, start: Instant, end: Instant) {
        let blur_ms = end.saturating_duration_since(start).as_secs_f64() * 1000.0;
        {
            let mut totals = self.totals.lock().unwrap_or_else(|e| e.into_inner());
            totals.total_blur_ms += blur_ms;
            totals.operations += 1;
            let avg = (totals.total_blur_ms / totals.operations as f64) as f32;
            self.average_frame_time_bits
                .store(avg.to_bits(), Ordering::Relaxed);
        }

        let now = Instant::now();
        let mut last = self.last_adjustment.lock().unwrap_or_else(|e| e.into_inner());
        let due = last.is_none_or(|t| now.saturating_duration_since(t) >= self.options.sample_interval);
        if due {
            *last = Some(now);
            drop(last);
            self.adjust_quality();
        }
    }

    fn adjust_quality(&self) {
        let avg = self.average_frame_time_ms();
        let budget = self.options.target_frame_budget_ms;
        let current = self.current_quality_scale();

        let next = if avg > budget * 1.5 {
            (current - 0.1).max(MIN_QUALITY_SCALE)
        } else if avg < budget * 0.8 {
            (current + 0.05).min(MAX_QUALITY_SCALE)
        } else {
            current
        };

        if next != current {
            tracing::debug!(avg_ms = avg, from = current, to = next, "adjusted blur quality scale");
            self.quality_scale_bits.store(next.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn average_frame_time_ms(&self) -> f32 {
        f32::from_bits(self.average_frame_time_bits.load(Ordering::Relaxed))
    }

    pub fn current_quality_scale(&self) -> f32 {
        f32::from_bits(self.quality_scale_bits.load(Ordering::Relaxed))
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        let operations = self
            .totals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .operations;
        PerformanceStats {
            average_frame_time_ms: self.average_frame_time_ms(),
            current_quality_scale: self.current_quality_scale(),
            total_operations: operations,
            cache_size: self.cache.len(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
        }
    }

    /// Backend recommendation from the current performance picture.
    pub fn optimal_blur_algorithm(&self, caps: SurfaceCaps) -> BlurAlgorithm {
        if caps.compositor_effects {
            return BlurAlgorithm::Accelerated;
        }
        if self.average_frame_time_ms() > self.options.target_frame_budget_ms * 2.0 {
            BlurAlgorithm::FastApproximation
        } else {
            BlurAlgorithm::Gaussian
        }
    }

    /// Handle to the bounded worker pool, if the optimizer is still alive.
    pub fn worker_pool(&self) -> Option<Arc<rayon::ThreadPool>> {
        self.pool.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Releases the cache and the pool handle. Idempotent; in-flight pool work
    /// keeps the pool alive through its own Arc until it finishes.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pool.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.cache.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PerformanceOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceOptimizer")
            .field("average_frame_time_ms", &self.average_frame_time_ms())
            .field("quality_scale", &self.current_quality_scale())
            .field("cache_entries", &self.cache.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer(sample_interval: Duration) -> PerformanceOptimizer {
        PerformanceOptimizer::new(OptimizerOptions {
            sample_interval,
            worker_threads: Some(2),
            ..OptimizerOptions::default()
        })
        .unwrap()
    }

    fn record_ms(opt: &PerformanceOptimizer, ms: u64) {
        let start = Instant::now();
        opt.record_blur_performance(start, start + Duration::from_millis(ms));
    }

    #[test]
    fn average_tracks_recorded_samples() {
        let opt = optimizer(Duration::from_secs(1000));
        record_ms(&opt, 10);
        record_ms(&opt, 20);
        assert!((opt.average_frame_time_ms() - 15.0).abs() < 0.1);
    }

    #[test]
    fn slow_frames_step_quality_down_to_the_floor() {
        let opt = optimizer(Duration::ZERO);
        let mut previous = opt.current_quality_scale();
        assert_eq!(previous, 1.0);
        for _ in 0..10 {
            record_ms(&opt, 30);
            let scale = opt.current_quality_scale();
            assert!(scale >= MIN_QUALITY_SCALE);
            assert!(previous - scale <= 0.1 + f32::EPSILON);
            previous = scale;
        }
        assert_eq!(opt.current_quality_scale(), MIN_QUALITY_SCALE);
        // Further slow samples no longer decrease it.
        record_ms(&opt, 30);
        assert_eq!(opt.current_quality_scale(), MIN_QUALITY_SCALE);
    }

    #[test]
    fn fast_frames_step_quality_back_up_to_the_cap() {
        let opt = optimizer(Duration::ZERO);
        for _ in 0..6 {
            record_ms(&opt, 30);
        }
        assert!(opt.current_quality_scale() < 1.0);
        for _ in 0..200 {
            record_ms(&opt, 1);
        }
        assert_eq!(opt.current_quality_scale(), MAX_QUALITY_SCALE);
    }

    #[test]
    fn adjustment_is_rate_limited_by_the_sampling_window() {
        let opt = optimizer(Duration::from_secs(1000));
        for _ in 0..10 {
            record_ms(&opt, 30);
        }
        // Only the first record was allowed to adjust.
        assert!((opt.current_quality_scale() - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn stats_report_counters_and_hit_rate() {
        let opt = optimizer(Duration::from_secs(1000));
        let stats = opt.performance_stats();
        assert_eq!(stats.total_operations, 0);
        assert_eq!(stats.cache_hit_rate(), 0.0);

        let key = CacheKey::new(2, 2, 1.0, Argb(0), 1.0);
        assert!(opt.cached(&key).is_none());
        let snap = Snapshot::new(2, 2, vec![0u8; 16]).unwrap();
        opt.cache_result(key, snap, 1.0, Argb(0));
        assert!(opt.cached(&key).is_some());

        let stats = opt.performance_stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.cache_hit_rate() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn recommendation_follows_capability_then_latency() {
        let opt = optimizer(Duration::from_secs(1000));
        let accel = SurfaceCaps {
            compositor_effects: true,
        };
        assert_eq!(opt.optimal_blur_algorithm(accel), BlurAlgorithm::Accelerated);

        let soft = SurfaceCaps::default();
        assert_eq!(opt.optimal_blur_algorithm(soft), BlurAlgorithm::Gaussian);
        for _ in 0..4 {
            record_ms(&opt, 40);
        }
        assert_eq!(
            opt.optimal_blur_algorithm(soft),
            BlurAlgorithm::FastApproximation
        );
    }

    #[test]
    fn destroy_is_idempotent_and_drops_the_pool() {
        let opt = optimizer(Duration::from_secs(1000));
        assert!(opt.worker_pool().is_some());
        opt.destroy();
        opt.destroy();
        assert!(opt.worker_pool().is_none());
        assert!(opt.is_destroyed());
        assert_eq!(opt.performance_stats().cache_size, 0);
    }
}
