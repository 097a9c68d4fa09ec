//! Frame-safe pool of dynamic GPU buffers.
//!
//! Hands out transient vertex/index/uniform buffers rounded up to size
//! buckets, reclaims them through the frame-deferred free list, and
//! falls back to exact unpooled allocations for oversized requests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::free_list::FreeList;
use super::size_class::SizeClassTable;
use crate::backend::{BufferDesc, GpuBackend};
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::throttle::RateLimiter;
use crate::types::{BufferId, BufferKind, BufferUsage, FrameNumber, MapMode};

/// Window for rate-limited warning/error logs.
const LOG_WINDOW: Duration = Duration::from_secs(1);

/// Pool of reusable dynamic buffers for one buffer kind.
///
/// Construct one per kind at rendering-subsystem startup and pass it to
/// consumers explicitly; checkout returns an RAII handle that feeds the
/// buffer back through the free list on drop. `advance_frame` must be
/// called exactly once per frame, after all of that frame's releases.
pub struct DynamicBufferPool {
    backend: Arc<dyn GpuBackend>,
    kind: BufferKind,
    table: SizeClassTable,
    free_list: Mutex<FreeList>,
    stats: PoolStats,
    oversize_log: RateLimiter,
    create_fail_log: RateLimiter,
}

/// Lock-free pool counters.
struct PoolStats {
    /// Checkouts served from the free list.
    hits: AtomicU64,
    /// Checkouts that allocated a fresh buffer.
    misses: AtomicU64,
    /// Buffers created through this pool.
    created: AtomicU64,
    /// Buffers returned to the free list.
    releases: AtomicU64,
    /// Buffers destroyed for exceeding the unused-age threshold.
    culled: AtomicU64,
    /// Requests too large for the bucket table (unpooled fallback).
    oversize: AtomicU64,
    /// Buffers currently checked out.
    checked_out: AtomicU64,
    /// Bytes currently resident in the free list.
    pooled_bytes: AtomicU64,
}

impl PoolStats {
    const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            created: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            culled: AtomicU64::new(0),
            oversize: AtomicU64::new(0),
            checked_out: AtomicU64::new(0),
            pooled_bytes: AtomicU64::new(0),
        }
    }
}

impl DynamicBufferPool {
    /// Create a pool for `kind` buffers against the given backend.
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        kind: BufferKind,
        config: &PoolConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let table = SizeClassTable::new(&config.bucket_sizes)?;
        let free_list = FreeList::new(table.num_buckets(), config);

        Ok(Arc::new(Self {
            backend,
            kind,
            table,
            free_list: Mutex::new(free_list),
            stats: PoolStats::new(),
            oversize_log: RateLimiter::new(LOG_WINDOW),
            create_fail_log: RateLimiter::new(LOG_WINDOW),
        }))
    }

    /// Buffer kind this pool serves.
    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Current frame number.
    pub fn current_frame(&self) -> FrameNumber {
        self.free_list.lock().current_frame()
    }

    /// Check out a buffer of at least `size` bytes.
    ///
    /// In-range requests round up to a bucket and reuse a free-listed
    /// buffer when one is safe; oversized requests allocate unpooled at
    /// the exact size and are destroyed on release instead of pooled.
    pub fn checkout(self: &Arc<Self>, size: u32) -> Result<PooledBuffer> {
        match self.table.bucket_index_for_size(size) {
            Ok(bucket) => {
                if let Some(entry) = self.free_list.lock().checkout(bucket) {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .pooled_bytes
                        .fetch_sub(entry.created_size as u64, Ordering::Relaxed);
                    return Ok(self.handle(entry.id, entry.created_size, true));
                }

                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                let bucket_size = self.table.bucket_size(bucket);
                let id = self.create(bucket_size)?;
                Ok(self.handle(id, bucket_size, true))
            }
            Err(Error::SizeExceedsMaximumBucket { requested, max }) => {
                self.stats.oversize.fetch_add(1, Ordering::Relaxed);
                if self.oversize_log.allow() {
                    warn!(
                        "{} buffer request of {} bytes exceeds largest bucket {}, allocating unpooled",
                        self.kind.name(),
                        requested,
                        max
                    );
                }
                let id = self.create(size)?;
                Ok(self.handle(id, size, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Advance the frame counter: promote entries past the safe-frame
    /// threshold and destroy a bounded number of stale ones.
    ///
    /// Call exactly once per frame, strictly after every release for
    /// the current frame has happened.
    pub fn advance_frame(&self) {
        let culled = self.free_list.lock().advance_frame();
        if culled.is_empty() {
            return;
        }

        let mut freed_bytes = 0u64;
        for entry in &culled {
            freed_bytes += entry.created_size as u64;
            self.destroy(entry.id);
        }
        self.stats
            .culled
            .fetch_add(culled.len() as u64, Ordering::Relaxed);
        self.stats
            .pooled_bytes
            .fetch_sub(freed_bytes, Ordering::Relaxed);

        debug!(
            "Culled {} stale {} buffers ({} bytes)",
            culled.len(),
            self.kind.name(),
            freed_bytes
        );
    }

    /// Get a snapshot of pool statistics.
    pub fn stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            created: self.stats.created.load(Ordering::Relaxed),
            releases: self.stats.releases.load(Ordering::Relaxed),
            culled: self.stats.culled.load(Ordering::Relaxed),
            oversize: self.stats.oversize.load(Ordering::Relaxed),
            checked_out: self.stats.checked_out.load(Ordering::Relaxed),
            pooled_bytes: self.stats.pooled_bytes.load(Ordering::Relaxed),
        }
    }

    fn handle(self: &Arc<Self>, id: BufferId, created_size: u32, pooled: bool) -> PooledBuffer {
        self.stats.checked_out.fetch_add(1, Ordering::Relaxed);
        PooledBuffer {
            pool: Arc::clone(self),
            id: Some(id),
            created_size,
            pooled,
        }
    }

    fn create(&self, byte_size: u32) -> Result<BufferId> {
        let desc = BufferDesc::new(self.kind, BufferUsage::Dynamic, byte_size);
        match self.backend.create_buffer(&desc) {
            Ok(id) => {
                self.stats.created.fetch_add(1, Ordering::Relaxed);
                Ok(id)
            }
            Err(e) => {
                if self.create_fail_log.allow() {
                    error!(
                        "Failed to create {} byte {} buffer: {}",
                        byte_size,
                        self.kind.name(),
                        e
                    );
                }
                Err(e)
            }
        }
    }

    fn destroy(&self, id: BufferId) {
        if let Err(e) = self.backend.destroy_buffer(id) {
            error!("Failed to destroy {} buffer {}: {}", self.kind.name(), id, e);
        }
    }

    /// Return a checked-out buffer. Pooled buffers enter the free list;
    /// unpooled fallbacks are destroyed immediately.
    fn release_entry(&self, id: BufferId, created_size: u32, pooled: bool) {
        self.stats.checked_out.fetch_sub(1, Ordering::Relaxed);

        if !pooled {
            self.destroy(id);
            return;
        }

        // created_size is always an exact bucket size, so this lookup
        // lands on the bucket the buffer was created under
        match self.table.bucket_index_for_size(created_size) {
            Ok(bucket) => {
                self.free_list.lock().release(bucket, id, created_size);
                self.stats.releases.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .pooled_bytes
                    .fetch_add(created_size as u64, Ordering::Relaxed);
            }
            Err(_) => self.destroy(id),
        }
    }
}

impl Drop for DynamicBufferPool {
    fn drop(&mut self) {
        let entries = self.free_list.lock().drain_all();
        for entry in &entries {
            self.destroy(entry.id);
        }
        if !entries.is_empty() {
            debug!(
                "Pool shutdown destroyed {} {} buffers",
                entries.len(),
                self.kind.name()
            );
        }
    }
}

/// Point-in-time snapshot of pool counters.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub created: u64,
    pub releases: u64,
    pub culled: u64,
    pub oversize: u64,
    pub checked_out: u64,
    pub pooled_bytes: u64,
}

impl PoolStatsSnapshot {
    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// RAII handle to a checked-out pool buffer.
///
/// The holder owns the buffer exclusively until drop (or explicit
/// `release`), at which point ownership transfers back to the pool.
/// The handle never destroys a pooled buffer directly.
pub struct PooledBuffer {
    pool: Arc<DynamicBufferPool>,
    id: Option<BufferId>,
    created_size: u32,
    pooled: bool,
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("id", &self.id)
            .field("created_size", &self.created_size)
            .field("pooled", &self.pooled)
            .finish()
    }
}

impl PooledBuffer {
    /// Native buffer id.
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id.unwrap()
    }

    /// Allocated byte size (>= the requested size).
    #[inline]
    pub fn created_size(&self) -> u32 {
        self.created_size
    }

    /// Whether the buffer returns to the free list on release.
    #[inline]
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// Write `data` at `offset` via a map/copy/unmap cycle.
    ///
    /// A full-buffer write maps with discard semantics so the driver
    /// never has to preserve prior contents.
    pub fn write(&self, offset: u32, data: &[u8]) -> Result<()> {
        let id = self.id.unwrap();
        let mode = if offset == 0 && data.len() as u32 == self.created_size {
            MapMode::WriteDiscard
        } else {
            MapMode::WriteOnly
        };

        let mut range = self.pool.backend.map(id, offset, data.len() as u32, mode)?;
        range.as_mut_slice().copy_from_slice(data);
        self.pool.backend.unmap(id, range)
    }

    /// Return the buffer to the pool now instead of at scope exit.
    pub fn release(self) {}
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.pool.release_entry(id, self.created_size, self.pooled);
        }
    }
}
