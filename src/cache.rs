use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Instant,
};

use crate::{color::Argb, snapshot::Snapshot};

/// Deterministic fingerprint of one blur configuration. Parameters are rounded
/// at construction (radius to 1 decimal, scale to 2), so two keys built from
/// rounded-equal inputs compare and hash identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    width: u32,
    height: u32,
    radius_tenths: i64,
    color: u32,
    scale_hundredths: i64,
}

impl CacheKey {
    pub fn new(width: u32, height: u32, radius: f32, overlay_color: Argb, scale_factor: f32) -> Self {
        Self {
            width,
            height,
            radius_tenths: (f64::from(radius) * 10.0).round() as i64,
            color: overlay_color.0,
            scale_hundredths: (f64::from(scale_factor) * 100.0).round() as i64,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}_r{:.1}_c{:08x}_s{:.2}",
            self.width,
            self.height,
            self.radius_tenths as f64 / 10.0,
            self.color,
            self.scale_hundredths as f64 / 100.0,
        )
    }
}

#[derive(Debug)]
struct CacheEntry {
    snapshot: Snapshot,
    #[allow(dead_code)]
    radius: f32,
    #[allow(dead_code)]
    overlay_color: Argb,
    #[allow(dead_code)]
    created_at: Instant,
    last_used: AtomicU64,
}

/// Blur results keyed by parameters, bounded by byte footprint.
///
/// Lookups take the read lock and bump an atomic recency stamp; insert, evict
/// and clear take the write lock. Eviction is least-recently-used by memory,
/// not by entry count.
#[derive(Debug)]
pub struct BlurCache {
    budget_bytes: usize,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    bytes: AtomicUsize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BlurCache {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            entries: RwLock::new(HashMap::new()),
            bytes: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Budget rule: one eighth of available memory, counted in KB.
    pub fn budget_from_available_memory(available_bytes: u64) -> usize {
        ((available_bytes / 1024) / 8) as usize
    }

    pub fn get(&self, key: &CacheKey) -> Option<Snapshot> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) => {
                let stamp = self.clock.fetch_add(1, Ordering::Relaxed);
                entry.last_used.store(stamp, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.snapshot.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: CacheKey, snapshot: Snapshot, radius: f32, overlay_color: Argb) {
        let size = snapshot.byte_size();
        if size > self.budget_bytes {
            tracing::debug!(%key, size, budget = self.budget_bytes, "blur result exceeds cache budget, not cached");
            return;
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed);
        let previous = entries.insert(
            key,
            CacheEntry {
                snapshot,
                radius,
                overlay_color,
                created_at: Instant::now(),
                last_used: AtomicU64::new(stamp),
            },
        );
        let mut total = self.bytes.load(Ordering::Relaxed) + size;
        if let Some(prev) = previous {
            total -= prev.snapshot.byte_size();
        }

        while total > self.budget_bytes {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                .map(|(k, _)| *k);
            match oldest {
                Some(k) => {
                    if let Some(evicted) = entries.remove(&k) {
                        total -= evicted.snapshot.byte_size();
                        tracing::debug!(key = %k, "evicted blur cache entry");
                    }
                }
                None => break,
            }
        }
        self.bytes.store(total, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_size(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
        self.bytes.store(0, Ordering::Relaxed);
    }
}
