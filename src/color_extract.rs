use std::{
    collections::HashMap,
    sync::{Arc, Mutex, mpsc},
    time::Duration,
};

use crate::{
    color::Argb,
    palette::Palette,
    snapshot::Snapshot,
};

/// Hard wall-clock cap on how long a caller blocks for palette analysis.
const ANALYSIS_TIMEOUT: Duration = Duration::from_millis(50);
/// Color cache is flushed wholesale past this size. Deliberately not LRU.
const MAX_CACHE_ENTRIES: usize = 50;
/// Fixed overlay alpha of the acrylic tint.
const ACRYLIC_ALPHA: u8 = 120;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ColorKey {
    width: u32,
    height: u32,
    buffer_id: usize,
}

impl ColorKey {
    fn of(snapshot: &Snapshot) -> Self {
        Self {
            width: snapshot.width(),
            height: snapshot.height(),
            buffer_id: snapshot.buffer_id(),
        }
    }
}

/// Derives an adaptive overlay tint from captured content, bounded by latency.
///
/// Analysis runs on the shared worker pool; the caller waits on a channel with
/// a 50 ms deadline and falls back to direct center sampling when the deadline
/// passes or the analysis fails. Nothing here errors outward.
pub struct DynamicColorExtractor {
    cache: Mutex<HashMap<ColorKey, Argb>>,
    pool: Arc<rayon::ThreadPool>,
}

impl DynamicColorExtractor {
    pub fn new(pool: Arc<rayon::ThreadPool>) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            pool,
        }
    }

    pub fn extract_adaptive_color(&self, snapshot: &Snapshot, fallback: Argb) -> Argb {
        self.extract_with_analyzer(snapshot, fallback, |snap| {
            Palette::from_snapshot(&snap).map(|p| select_overlay_color(&p))
        })
    }

    /// Analyzer injection point; production use goes through
    /// [`Self::extract_adaptive_color`]. The analyzer returns `Some(None)`
    /// semantics via the outer Option: `None` means no usable palette.
    pub(crate) fn extract_with_analyzer<F>(&self, snapshot: &Snapshot, fallback: Argb, analyze: F) -> Argb
    where
        F: FnOnce(Snapshot) -> Option<Option<Argb>> + Send + 'static,
    {
        if snapshot.is_degenerate() {
            return fallback;
        }

        let key = ColorKey::of(snapshot);
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(&color) = cache.get(&key) {
                return color;
            }
        }

        let (tx, rx) = mpsc::channel();
        let task_snapshot = snapshot.clone();
        self.pool.spawn(move || {
            let result = analyze(task_snapshot);
            let _ = tx.send(result);
        });

        let color = match rx.recv_timeout(ANALYSIS_TIMEOUT) {
            // Analysis finished and picked a swatch.
            Ok(Some(Some(color))) => color,
            // Analysis finished but found nothing usable.
            Ok(Some(None)) | Ok(None) => fallback,
            // Deadline passed or the task died: sample directly.
            Err(_) => {
                tracing::debug!("palette analysis missed the deadline, sampling manually");
                sample_center_average(snapshot)
                    .map(acrylic_overlay)
                    .unwrap_or(fallback)
            }
        };

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(key, color);
        if cache.len() > MAX_CACHE_ENTRIES {
            cache.clear();
        }
        color
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl std::fmt::Debug for DynamicColorExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicColorExtractor")
            .field("cached_entries", &self.cached_entries())
            .finish()
    }
}

/// Swatch priority: muted, then dominant, then light-muted.
pub fn select_overlay_color(palette: &Palette) -> Option<Argb> {
    palette
        .muted()
        .or_else(|| palette.dominant())
        .or_else(|| palette.light_muted())
        .map(|s| acrylic_overlay(s.color))
}

/// Acrylic tint rule: reduce saturation x0.7, darken value x0.9 (floored at
/// 0.1), fixed alpha 120. Reproduced exactly for visual parity.
pub fn acrylic_overlay(base: Argb) -> Argb {
    let mut hsv = base.to_hsv();
    hsv.saturation = (hsv.saturation * 0.7).min(1.0);
    hsv.value = (hsv.value * 0.9).max(0.1);
    hsv.to_rgb().with_alpha(ACRYLIC_ALPHA)
}

/// Averages a centered square region (side = min(w,h)/4, 2 px step).
pub fn sample_center_average(snapshot: &Snapshot) -> Option<Argb> {
    if snapshot.is_degenerate() {
        return None;
    }
    let w = snapshot.width() as i64;
    let h = snapshot.height() as i64;
    let center_x = w / 2;
    let center_y = h / 2;
    let side = w.min(h) / 4;

    let pixels = snapshot.pixels();
    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    let mut count = 0u64;
    let sample =
        |x: i64, y: i64, r: &mut u64, g: &mut u64, b: &mut u64, count: &mut u64| {
            if x >= 0 && x < w && y >= 0 && y < h {
                let idx = ((y * w + x) as usize) * 4;
                *r += u64::from(pixels[idx]);
                *g += u64::from(pixels[idx + 1]);
                *b += u64::from(pixels[idx + 2]);
                *count += 1;
            }
        };
    let mut x = center_x - side / 2;
    while x < center_x + side / 2 {
        let mut y = center_y - side / 2;
        while y < center_y + side / 2 {
            sample(x, y, &mut r, &mut g, &mut b, &mut count);
            y += 2;
        }
        x += 2;
    }
    // Tiny snapshots have an empty sampling window; fall back to the center
    // pixel.
    if count == 0 {
        sample(center_x, center_y, &mut r, &mut g, &mut b, &mut count);
    }
    if count == 0 {
        return None;
    }
    Some(Argb::from_rgb(
        (r / count) as u8,
        (g / count) as u8,
        (b / count) as u8,
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn pool() -> Arc<rayon::ThreadPool> {
        Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap())
    }

    fn uniform_snapshot(w: u32, h: u32, color: Argb) -> Snapshot {
        let px = [color.red(), color.green(), color.blue(), 255];
        Snapshot::new(w, h, px.repeat((w * h) as usize)).unwrap()
    }

    #[test]
    fn degenerate_snapshot_returns_fallback() {
        let extractor = DynamicColorExtractor::new(pool());
        let fallback = Argb(0x40000000);
        assert_eq!(
            extractor.extract_adaptive_color(&Snapshot::degenerate(), fallback),
            fallback
        );
        assert_eq!(extractor.cached_entries(), 0);
    }

    #[test]
    fn acrylic_adjustment_is_exact() {
        let base = Argb::from_rgb(100, 150, 200);
        let out = acrylic_overlay(base);
        assert_eq!(out.alpha(), 120);

        let mut hsv = base.to_hsv();
        hsv.saturation = (hsv.saturation * 0.7).min(1.0);
        hsv.value = (hsv.value * 0.9).max(0.1);
        assert_eq!(out.with_alpha(255), hsv.to_rgb());
    }

    #[test]
    fn acrylic_floors_value_for_near_black() {
        let out = acrylic_overlay(Argb::from_rgb(2, 2, 2));
        assert!(out.to_hsv().value >= 0.09);
    }

    #[test]
    fn extraction_result_is_cached_by_identity() {
        let extractor = DynamicColorExtractor::new(pool());
        let snap = uniform_snapshot(16, 16, Argb::from_rgb(90, 90, 120));
        let fallback = Argb(0x40000000);

        let first = extractor.extract_adaptive_color(&snap, fallback);
        assert_eq!(extractor.cached_entries(), 1);
        // Same capture (clone shares the buffer) hits the cache.
        let again = extractor.extract_adaptive_color(&snap.clone(), fallback);
        assert_eq!(first, again);
        assert_eq!(extractor.cached_entries(), 1);
    }

    #[test]
    fn cache_is_flushed_wholesale_past_the_bound() {
        let extractor = DynamicColorExtractor::new(pool());
        let fallback = Argb(0);
        let mut snaps = Vec::new();
        for i in 0..=50 {
            // Distinct captures so each gets its own identity key.
            snaps.push(uniform_snapshot(8, 8, Argb::from_rgb(i as u8, 0, 0)));
        }
        for snap in &snaps {
            extractor.extract_adaptive_color(snap, fallback);
        }
        // 51st insert tripped the full flush.
        assert_eq!(extractor.cached_entries(), 0);
    }

    #[test]
    fn stalled_analysis_falls_back_to_manual_sampling_within_deadline() {
        let extractor = DynamicColorExtractor::new(pool());
        let color = Argb::from_rgb(100, 150, 200);
        let snap = uniform_snapshot(32, 32, color);
        let fallback = Argb(0x40000000);

        let started = Instant::now();
        let out = extractor.extract_with_analyzer(&snap, fallback, |_s| {
            std::thread::sleep(Duration::from_millis(400));
            None
        });
        let elapsed = started.elapsed();

        assert!(elapsed < Duration::from_millis(200), "took {elapsed:?}");
        // Manual sampling of a uniform image recovers the image color, not the
        // fallback.
        assert_eq!(out, acrylic_overlay(color));
    }

    #[test]
    fn failed_analysis_with_no_samples_returns_fallback() {
        let extractor = DynamicColorExtractor::new(pool());
        let fallback = Argb(0x11223344);
        let snap = uniform_snapshot(4, 4, Argb::from_rgb(10, 10, 10));
        // Analyzer completed but produced nothing usable.
        let out = extractor.extract_with_analyzer(&snap, fallback, |_s| Some(None));
        assert_eq!(out, fallback);
    }

    #[test]
    fn manual_sampling_averages_the_center_region() {
        let snap = uniform_snapshot(40, 40, Argb::from_rgb(10, 200, 30));
        assert_eq!(
            sample_center_average(&snap).unwrap(),
            Argb::from_rgb(10, 200, 30)
        );
    }

    #[test]
    fn manual_sampling_handles_tiny_snapshots() {
        let snap = uniform_snapshot(2, 2, Argb::from_rgb(50, 60, 70));
        assert_eq!(
            sample_center_average(&snap).unwrap(),
            Argb::from_rgb(50, 60, 70)
        );
    }
}
