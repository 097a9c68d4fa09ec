//! Frame-deferred free list for pooled buffers.
//!
//! A buffer freed on frame F may still be referenced by draw calls the
//! GPU has not finished executing. Freed entries therefore sit in a
//! per-bucket pending ring for `num_safe_frames` frame advances before
//! they become available for reuse. Stale available entries are culled,
//! a bounded number per frame, so a mass release (level unload) cannot
//! hitch a single frame with destruction work.

use smallvec::SmallVec;
use std::collections::VecDeque;

use crate::config::PoolConfig;
use crate::types::{BufferId, FrameNumber};

/// A native buffer owned by the free list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PooledEntry {
    pub id: BufferId,
    /// Exact bucket size the buffer was created with
    pub created_size: u32,
    /// Frame on which the buffer was last released
    pub frame_freed: FrameNumber,
}

/// Per-bucket state: a pending ring and an available stack.
struct Bucket {
    /// Ring of `num_safe_frames` partitions keyed by frame_freed modulo
    /// the ring length. A slot is promoted when the frame counter wraps
    /// back onto it, exactly `num_safe_frames` frames after the frees.
    pending: Vec<SmallVec<[PooledEntry; 4]>>,
    /// Reusable entries. Pushed/popped at the back (most recently freed
    /// first, warm memory); culled from the front (oldest first).
    available: VecDeque<PooledEntry>,
}

impl Bucket {
    fn new(num_safe_frames: u32) -> Self {
        Self {
            pending: (0..num_safe_frames).map(|_| SmallVec::new()).collect(),
            available: VecDeque::new(),
        }
    }
}

/// Frame-deferred free list across all size buckets.
///
/// Not internally synchronized; the owning pool serializes access.
pub(crate) struct FreeList {
    buckets: Vec<Bucket>,
    frame: FrameNumber,
    num_safe_frames: u32,
    cull_after_frames: u64,
    max_drains_per_frame: usize,
}

impl FreeList {
    pub fn new(num_buckets: usize, config: &PoolConfig) -> Self {
        Self {
            buckets: (0..num_buckets)
                .map(|_| Bucket::new(config.num_safe_frames))
                .collect(),
            frame: FrameNumber::ZERO,
            num_safe_frames: config.num_safe_frames,
            cull_after_frames: config.cull_after_frames,
            max_drains_per_frame: config.max_drains_per_frame,
        }
    }

    /// Current frame number.
    #[inline]
    pub fn current_frame(&self) -> FrameNumber {
        self.frame
    }

    /// Pop a reusable entry for `bucket`, most recently freed first.
    pub fn checkout(&mut self, bucket: usize) -> Option<PooledEntry> {
        self.buckets[bucket].available.pop_back()
    }

    /// Return a buffer to the free list, stamped with the current frame.
    pub fn release(&mut self, bucket: usize, id: BufferId, created_size: u32) {
        let slot = self.frame.slot(self.num_safe_frames);
        self.buckets[bucket].pending[slot].push(PooledEntry {
            id,
            created_size,
            frame_freed: self.frame,
        });
    }

    /// Advance the frame counter, promote entries that have crossed the
    /// safe-frame threshold, and collect up to `max_drains_per_frame`
    /// stale entries for the caller to destroy.
    pub fn advance_frame(&mut self) -> Vec<PooledEntry> {
        self.frame.advance();

        // The slot the counter just wrapped onto holds entries freed
        // exactly num_safe_frames ago; they are now safe to reuse.
        let slot = self.frame.slot(self.num_safe_frames);
        for bucket in &mut self.buckets {
            for entry in bucket.pending[slot].drain(..) {
                bucket.available.push_back(entry);
            }
        }

        // Cull oldest-first, bounded per tick
        let mut culled = Vec::new();
        for bucket in &mut self.buckets {
            while culled.len() < self.max_drains_per_frame {
                let stale = bucket
                    .available
                    .front()
                    .is_some_and(|e| self.frame.frames_since(e.frame_freed) > self.cull_after_frames);
                if !stale {
                    break;
                }
                if let Some(entry) = bucket.available.pop_front() {
                    culled.push(entry);
                }
            }
            if culled.len() >= self.max_drains_per_frame {
                break;
            }
        }

        culled
    }

    /// Remove every entry, pending and available, for shutdown.
    pub fn drain_all(&mut self) -> Vec<PooledEntry> {
        let mut entries = Vec::new();
        for bucket in &mut self.buckets {
            for slot in &mut bucket.pending {
                entries.extend(slot.drain(..));
            }
            entries.extend(bucket.available.drain(..));
        }
        entries
    }

    /// Number of reusable entries for `bucket` (test/stats hook).
    pub fn available_len(&self, bucket: usize) -> usize {
        self.buckets[bucket].available.len()
    }

    /// Number of entries still waiting out the safe-frame window.
    pub fn pending_len(&self, bucket: usize) -> usize {
        self.buckets[bucket].pending.iter().map(|s| s.len()).sum()
    }
}
