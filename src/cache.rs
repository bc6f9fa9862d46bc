//! 列缓存（读穿透 + 单飞加载）
//!
//! - 64 个 RwLock 分片，按列编号取模，降低热点列的读竞争
//! - 同一列同时 miss 时只有一个加载者真正读盘，其余调用方等待它的结果
//! - 加载失败（或加载者 panic）时撤销占位，后续调用方可以重试
//! - 发布进缓存的列只读共享，不做淘汰；淘汰由管理方显式调用 `evict`

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::column::CompressedColumn;
use crate::common::{ColumnId, Result};

const NUM_SHARDS: usize = 64;

// ── 槽位 ──────────────────────────────────────────────────────────────────────

enum Slot {
    Ready(Arc<CompressedColumn>),
    Loading(Arc<InFlight>),
}

#[derive(Clone)]
enum Outcome {
    Loaded(Arc<CompressedColumn>),
    Failed,
}

/// 一次正在进行的加载，等待方阻塞在 `done` 上
struct InFlight {
    outcome: Mutex<Option<Outcome>>,
    done:    Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self { outcome: Mutex::new(None), done: Condvar::new() }
    }

    fn finish(&self, outcome: Outcome) {
        *self.outcome.lock() = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut guard = self.outcome.lock();
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            self.done.wait(&mut guard);
        }
    }
}

// ── 统计 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits:         u64,
    /// 成为加载者的次数
    pub misses:       u64,
    pub loads:        u64,
    pub failed_loads: u64,
    /// 等到了别人加载结果的次数
    pub coalesced:    u64,
}

#[derive(Default)]
struct Counters {
    hits:         AtomicU64,
    misses:       AtomicU64,
    loads:        AtomicU64,
    failed_loads: AtomicU64,
    coalesced:    AtomicU64,
}

// ── ColumnCache ───────────────────────────────────────────────────────────────

pub struct ColumnCache {
    shards:   Vec<RwLock<HashMap<ColumnId, Slot>>>,
    counters: Counters,
}

impl ColumnCache {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, counters: Counters::default() }
    }

    fn shard(&self, column: ColumnId) -> &RwLock<HashMap<ColumnId, Slot>> {
        &self.shards[(column as usize) % NUM_SHARDS]
    }

    /// 只查已就绪的列，不触发加载
    pub fn get(&self, column: ColumnId) -> Option<Arc<CompressedColumn>> {
        match self.shard(column).read().get(&column) {
            Some(Slot::Ready(col)) => Some(Arc::clone(col)),
            _ => None,
        }
    }

    pub fn contains(&self, column: ColumnId) -> bool {
        self.get(column).is_some()
    }

    /// 命中直接返回；未命中时调用 `load`，同一列同一时刻至多一个加载者
    pub fn get_or_load<F>(&self, column: ColumnId, load: F) -> Result<Arc<CompressedColumn>>
    where
        F: FnOnce() -> Result<CompressedColumn>,
    {
        let shard = self.shard(column);
        loop {
            if let Some(Slot::Ready(col)) = shard.read().get(&column) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("cache hit: column {column}");
                return Ok(Arc::clone(col));
            }

            let flight = {
                let mut guard = shard.write();
                match guard.get(&column) {
                    Some(Slot::Ready(col)) => {
                        self.counters.hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(Arc::clone(col));
                    }
                    Some(Slot::Loading(flight)) => Arc::clone(flight),
                    None => {
                        let flight = Arc::new(InFlight::new());
                        guard.insert(column, Slot::Loading(Arc::clone(&flight)));
                        drop(guard);
                        self.counters.misses.fetch_add(1, Ordering::Relaxed);
                        return self.run_loader(column, flight, load);
                    }
                }
            };

            match flight.wait() {
                Outcome::Loaded(col) => {
                    self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    return Ok(col);
                }
                // 加载者已撤销占位，重新竞争
                Outcome::Failed => continue,
            }
        }
    }

    fn run_loader<F>(&self, column: ColumnId, flight: Arc<InFlight>, load: F) -> Result<Arc<CompressedColumn>>
    where
        F: FnOnce() -> Result<CompressedColumn>,
    {
        let mut reservation = Reservation { cache: self, column, flight, published: false };
        match load() {
            Ok(col) => {
                let col = Arc::new(col);
                reservation.publish(Arc::clone(&col));
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                Ok(col)
            }
            Err(e) => {
                self.counters.failed_loads.fetch_add(1, Ordering::Relaxed);
                warn!("loading column {column} failed: {e}");
                Err(e)
            }
        }
    }

    /// 直接放入（覆盖）一列，返回旧值
    pub fn insert(&self, column: ColumnId, col: Arc<CompressedColumn>) -> Option<Arc<CompressedColumn>> {
        match self.shard(column).write().insert(column, Slot::Ready(col)) {
            Some(Slot::Ready(old)) => Some(old),
            _ => None,
        }
    }

    /// 移除已就绪的列；正在加载的占位不受影响
    pub fn evict(&self, column: ColumnId) -> Option<Arc<CompressedColumn>> {
        let mut guard = self.shard(column).write();
        if let Some(Slot::Ready(_)) = guard.get(&column) {
            if let Some(Slot::Ready(col)) = guard.remove(&column) {
                return Some(col);
            }
        }
        None
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().retain(|_, slot| matches!(slot, Slot::Loading(_)));
        }
    }

    /// 已就绪的列数
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().values().filter(|slot| matches!(slot, Slot::Ready(_))).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits:         self.counters.hits.load(Ordering::Relaxed),
            misses:       self.counters.misses.load(Ordering::Relaxed),
            loads:        self.counters.loads.load(Ordering::Relaxed),
            failed_loads: self.counters.failed_loads.load(Ordering::Relaxed),
            coalesced:    self.counters.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl Default for ColumnCache {
    fn default() -> Self { Self::new() }
}

// ── 加载占位 ──────────────────────────────────────────────────────────────────

/// 未发布就被丢弃（出错或 panic）时撤销占位并唤醒等待方
struct Reservation<'a> {
    cache:     &'a ColumnCache,
    column:    ColumnId,
    flight:    Arc<InFlight>,
    published: bool,
}

impl Reservation<'_> {
    fn publish(&mut self, col: Arc<CompressedColumn>) {
        {
            let mut guard = self.cache.shard(self.column).write();
            // 加载期间被 insert/clear 改动过就不覆盖
            if matches!(guard.get(&self.column), Some(Slot::Loading(f)) if Arc::ptr_eq(f, &self.flight)) {
                guard.insert(self.column, Slot::Ready(Arc::clone(&col)));
            }
        }
        self.flight.finish(Outcome::Loaded(col));
        self.published = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        {
            let mut guard = self.cache.shard(self.column).write();
            if matches!(guard.get(&self.column), Some(Slot::Loading(f)) if Arc::ptr_eq(f, &self.flight)) {
                guard.remove(&self.column);
            }
        }
        self.flight.finish(Outcome::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BitmapEncoding;
    use crate::common::BitmapError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::Duration;

    fn column(id: ColumnId) -> CompressedColumn {
        let mut c = CompressedColumn::new(id.to_string(), BitmapEncoding::Wah32.codec());
        c.append_literal(u64::from(id));
        c
    }

    fn missing(id: ColumnId) -> BitmapError {
        BitmapError::ColumnIo { column: id, source: std::io::ErrorKind::NotFound.into() }
    }

    #[test]
    fn second_lookup_hits() {
        let cache = ColumnCache::new();
        let a = cache.get_or_load(3, || Ok(column(3))).unwrap();
        let b = cache.get_or_load(3, || panic!("must not reload")).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let s = cache.stats();
        assert_eq!((s.loads, s.hits), (1, 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_load_leaves_nothing_behind() {
        let cache = ColumnCache::new();
        assert!(cache.get_or_load(9, || Err(missing(9))).is_err());
        assert!(!cache.contains(9));
        assert_eq!(cache.len(), 0);
        // 占位已撤销，可以重试
        assert!(cache.get_or_load(9, || Ok(column(9))).is_ok());
        assert_eq!(cache.stats().failed_loads, 1);
    }

    #[test]
    fn panicking_loader_rolls_back() {
        let cache = ColumnCache::new();
        let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = cache.get_or_load(4, || panic!("boom"));
        }));
        assert!(r.is_err());
        assert!(cache.get_or_load(4, || Ok(column(4))).is_ok());
    }

    #[test]
    fn concurrent_misses_load_once() {
        let cache   = ColumnCache::new();
        let loads   = AtomicUsize::new(0);
        let threads = 8;
        let barrier = Barrier::new(threads);

        let results: Vec<Arc<CompressedColumn>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache
                            .get_or_load(17, || {
                                loads.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(Duration::from_millis(50));
                                Ok(column(17))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        for r in &results {
            assert!(Arc::ptr_eq(r, &results[0]));
        }
        let s = cache.stats();
        assert_eq!(s.loads, 1);
        assert_eq!(s.hits + s.coalesced + s.misses, threads as u64);
    }

    #[test]
    fn evict_and_insert() {
        let cache = ColumnCache::new();
        assert!(cache.insert(1, Arc::new(column(1))).is_none());
        assert!(cache.insert(1, Arc::new(column(1))).is_some());
        assert!(cache.evict(1).is_some());
        assert!(cache.evict(1).is_none());
        cache.insert(65, Arc::new(column(65)));
        cache.insert(2, Arc::new(column(2)));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
