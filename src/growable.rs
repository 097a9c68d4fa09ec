//! Per-owner growable element buffers.
//!
//! For steadily-growing data rewritten whole every frame (UI draw-batch
//! vertices and indices, skinned mesh scratch), a private buffer with
//! amortized growth beats the shared pool: the owner refills it each
//! frame, so there is no cross-frame GPU hazard and no need for bucket
//! reuse. Growth reallocates without preserving contents.

use std::sync::Arc;
use tracing::error;

use crate::backend::{BufferDesc, GpuBackend, MappedRange};
use crate::error::{Error, Result};
use crate::types::{BufferId, BufferKind, BufferUsage, IndexWidth, MapMode};

/// Construction parameters for a [`GrowableBuffer`].
#[derive(Debug, Clone)]
pub struct GrowableBufferDesc {
    pub kind: BufferKind,
    pub usage: BufferUsage,
    /// Bytes per element
    pub element_stride: u32,
    /// Size floor in bytes; the buffer never shrinks below this
    pub minimum_size: u32,
    /// Index element width; required for index buffers
    pub index_width: Option<IndexWidth>,
}

impl GrowableBufferDesc {
    /// Describe a growable vertex buffer.
    pub fn vertex(element_stride: u32, minimum_size: u32) -> Self {
        Self {
            kind: BufferKind::Vertex,
            usage: BufferUsage::Dynamic,
            element_stride,
            minimum_size,
            index_width: None,
        }
    }

    /// Describe a growable index buffer; the stride follows the width.
    pub fn index(width: IndexWidth, minimum_size: u32) -> Self {
        Self {
            kind: BufferKind::Index,
            usage: BufferUsage::Dynamic,
            element_stride: width.stride(),
            minimum_size,
            index_width: Some(width),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.element_stride == 0 {
            return Err(Error::InvalidConfig(
                "element_stride must be non-zero".to_string(),
            ));
        }
        if self.usage == BufferUsage::Immutable {
            return Err(Error::InvalidConfig(
                "growable buffers cannot be immutable".to_string(),
            ));
        }
        if self.index_width.is_some() && self.kind != BufferKind::Index {
            return Err(Error::InvalidConfig(format!(
                "index_width set on {} buffer",
                self.kind.name()
            )));
        }
        Ok(())
    }
}

/// A single long-lived buffer resized on demand, not shared or pooled.
///
/// Per-frame discipline: `pre_fill` to size the buffer for this frame's
/// element count, `lock_for_write` to stage the data, `unlock` to commit
/// it for GPU consumption.
pub struct GrowableBuffer {
    backend: Arc<dyn GpuBackend>,
    desc: GrowableBufferDesc,
    buffer: Option<BufferId>,
    allocated_size: u32,
    used_size: u32,
    locked: Option<MappedRange>,
}

impl GrowableBuffer {
    /// Create the buffer, allocating the minimum floor up front.
    pub fn new(backend: Arc<dyn GpuBackend>, desc: GrowableBufferDesc) -> Result<Self> {
        desc.validate()?;

        let mut buffer = Self {
            backend,
            desc,
            buffer: None,
            allocated_size: 0,
            used_size: 0,
            locked: None,
        };

        if buffer.desc.minimum_size > 0 {
            buffer.reallocate(buffer.desc.minimum_size)?;
        }

        Ok(buffer)
    }

    /// Currently allocated byte size.
    #[inline]
    pub fn allocated_size(&self) -> u32 {
        self.allocated_size
    }

    /// Bytes in use this frame (set by the last `pre_fill`).
    #[inline]
    pub fn used_size(&self) -> u32 {
        self.used_size
    }

    /// Size floor in bytes.
    #[inline]
    pub fn minimum_size(&self) -> u32 {
        self.desc.minimum_size
    }

    /// Elements the current allocation can hold.
    #[inline]
    pub fn element_capacity(&self) -> u32 {
        self.allocated_size / self.desc.element_stride
    }

    /// Native buffer id, if allocated.
    #[inline]
    pub fn buffer_id(&self) -> Option<BufferId> {
        self.buffer
    }

    /// Size the buffer for this frame's element count.
    ///
    /// Grows by reallocating (old contents are not preserved; the owner
    /// refills entirely). Shrinks only when `allow_shrink` is set, and
    /// never below the minimum floor. No reallocation happens while the
    /// demand fits the current allocation.
    pub fn pre_fill(&mut self, element_count: u32, allow_shrink: bool) -> Result<()> {
        if self.locked.is_some() {
            return Err(Error::BufferLocked);
        }

        if let Some(width) = self.desc.index_width {
            if element_count > width.max_elements() {
                return Err(Error::IndexRangeOverflow {
                    requested: element_count,
                    max: width.max_elements(),
                });
            }
        }

        let required = self.required_bytes(element_count)?;
        let target = required.max(self.desc.minimum_size);

        if required > self.allocated_size || (allow_shrink && target < self.allocated_size) {
            self.reallocate(target)?;
        }

        self.used_size = required;
        debug_assert!(self.used_size <= self.allocated_size);
        Ok(())
    }

    /// Map the first `element_count` elements for CPU writing.
    pub fn lock_for_write(&mut self, element_count: u32) -> Result<&mut [u8]> {
        if self.locked.is_some() {
            return Err(Error::BufferLocked);
        }

        let bytes = self.required_bytes(element_count)?;
        if bytes > self.allocated_size {
            return Err(Error::InvalidArgument(format!(
                "lock of {} bytes exceeds allocated size {}",
                bytes, self.allocated_size
            )));
        }

        let id = match self.buffer {
            Some(id) => id,
            None => {
                return Err(Error::InvalidArgument(
                    "lock of an unallocated buffer".to_string(),
                ))
            }
        };

        let mode = match self.desc.usage {
            BufferUsage::Dynamic => MapMode::WriteDiscard,
            _ => MapMode::WriteOnly,
        };
        let range = self.backend.map(id, 0, bytes, mode)?;
        self.locked = Some(range);
        Ok(self.locked.as_mut().unwrap().as_mut_slice())
    }

    /// Commit the staged write, making the buffer GPU-ready this frame.
    pub fn unlock(&mut self) -> Result<()> {
        let range = self.locked.take().ok_or(Error::BufferNotLocked)?;
        let id = range.buffer_id();
        self.backend.unmap(id, range)
    }

    fn required_bytes(&self, element_count: u32) -> Result<u32> {
        let bytes = element_count as u64 * self.desc.element_stride as u64;
        u32::try_from(bytes).map_err(|_| {
            Error::InvalidArgument(format!(
                "{} elements of stride {} overflow the addressable size",
                element_count, self.desc.element_stride
            ))
        })
    }

    fn reallocate(&mut self, byte_size: u32) -> Result<()> {
        let new_buffer = self.backend.create_buffer(&BufferDesc::new(
            self.desc.kind,
            self.desc.usage,
            byte_size,
        ))?;

        if let Some(old) = self.buffer.take() {
            if let Err(e) = self.backend.destroy_buffer(old) {
                error!("Failed to destroy outgrown buffer {}: {}", old, e);
            }
        }

        self.buffer = Some(new_buffer);
        self.allocated_size = byte_size;
        Ok(())
    }
}

impl Drop for GrowableBuffer {
    fn drop(&mut self) {
        if let Some(id) = self.buffer.take() {
            if let Err(e) = self.backend.destroy_buffer(id) {
                error!("Failed to destroy buffer {} on drop: {}", id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostBackend;

    fn setup(desc: GrowableBufferDesc) -> (Arc<HostBackend>, GrowableBuffer) {
        let backend = Arc::new(HostBackend::new());
        let buffer = GrowableBuffer::new(backend.clone(), desc).unwrap();
        (backend, buffer)
    }

    #[test]
    fn test_minimum_allocated_up_front() {
        let (backend, buf) = setup(GrowableBufferDesc::vertex(32, 6400));
        assert_eq!(buf.allocated_size(), 6400);
        assert_eq!(buf.element_capacity(), 200);
        assert_eq!(backend.live_bytes(), 6400);
    }

    #[test]
    fn test_pre_fill_zero_keeps_minimum() {
        let (_, mut buf) = setup(GrowableBufferDesc::vertex(32, 6400));

        buf.pre_fill(0, false).unwrap();
        assert_eq!(buf.allocated_size(), 6400);
        assert_eq!(buf.used_size(), 0);

        buf.pre_fill(0, true).unwrap();
        assert_eq!(buf.allocated_size(), 6400);
    }

    #[test]
    fn test_growth_is_amortized() {
        let (backend, mut buf) = setup(GrowableBufferDesc::vertex(32, 6400));

        buf.pre_fill(5000, false).unwrap();
        assert!(buf.allocated_size() >= 160_000);
        assert_eq!(buf.used_size(), 160_000);
        let creates_after_growth = backend.created_total();

        // Identical demand performs no reallocation
        buf.pre_fill(5000, false).unwrap();
        assert_eq!(backend.created_total(), creates_after_growth);
        assert_eq!(buf.used_size(), 160_000);

        // Smaller demand without shrink keeps the allocation
        buf.pre_fill(10, false).unwrap();
        assert_eq!(backend.created_total(), creates_after_growth);
        assert!(buf.allocated_size() >= 160_000);
        assert_eq!(buf.used_size(), 320);
    }

    #[test]
    fn test_shrink_respects_minimum() {
        let (_, mut buf) = setup(GrowableBufferDesc::vertex(32, 6400));

        buf.pre_fill(5000, false).unwrap();
        buf.pre_fill(10, true).unwrap();

        // 320 bytes demanded, floor wins
        assert_eq!(buf.allocated_size(), 6400);
        assert_eq!(buf.used_size(), 320);
    }

    #[test]
    fn test_index_overflow_is_hard_failure() {
        let (_, mut buf) = setup(GrowableBufferDesc::index(IndexWidth::U16, 1024));

        let err = buf.pre_fill(65536, false).unwrap_err();
        assert!(matches!(
            err,
            Error::IndexRangeOverflow {
                requested: 65536,
                max: 65535
            }
        ));

        // The boundary itself is fine
        buf.pre_fill(65535, false).unwrap();
        assert_eq!(buf.used_size(), 65535 * 2);
    }

    #[test]
    fn test_wide_index_clears_the_16_bit_bound() {
        let (_, mut buf) = setup(GrowableBufferDesc::index(IndexWidth::U32, 1024));
        buf.pre_fill(100_000, false).unwrap();
        assert_eq!(buf.used_size(), 400_000);
    }

    #[test]
    fn test_lock_fill_unlock() {
        let (backend, mut buf) = setup(GrowableBufferDesc::vertex(4, 64));

        buf.pre_fill(4, false).unwrap();
        let slice = buf.lock_for_write(4).unwrap();
        assert_eq!(slice.len(), 16);
        slice.copy_from_slice(b"0123456789abcdef");
        buf.unlock().unwrap();

        let id = buf.buffer_id().unwrap();
        assert_eq!(&backend.read_buffer(id).unwrap()[..16], b"0123456789abcdef");
    }

    #[test]
    fn test_double_lock_fails() {
        let (_, mut buf) = setup(GrowableBufferDesc::vertex(4, 64));
        buf.pre_fill(4, false).unwrap();

        buf.lock_for_write(4).unwrap();
        assert!(matches!(buf.lock_for_write(4), Err(Error::BufferLocked)));
        assert!(matches!(buf.pre_fill(4, false), Err(Error::BufferLocked)));

        buf.unlock().unwrap();
        assert!(buf.lock_for_write(4).is_ok());
    }

    #[test]
    fn test_unlock_without_lock_fails() {
        let (_, mut buf) = setup(GrowableBufferDesc::vertex(4, 64));
        assert!(matches!(buf.unlock(), Err(Error::BufferNotLocked)));
    }

    #[test]
    fn test_lock_beyond_allocation_fails() {
        let (_, mut buf) = setup(GrowableBufferDesc::vertex(4, 64));
        buf.pre_fill(4, false).unwrap();

        let err = buf.lock_for_write(1000).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_growth_replaces_native_buffer() {
        let (backend, mut buf) = setup(GrowableBufferDesc::vertex(32, 64));
        let first_id = buf.buffer_id().unwrap();

        buf.pre_fill(1000, false).unwrap();
        let second_id = buf.buffer_id().unwrap();

        assert_ne!(first_id, second_id);
        assert_eq!(backend.live_buffers(), 1);
    }

    #[test]
    fn test_drop_destroys_buffer() {
        let (backend, buf) = setup(GrowableBufferDesc::vertex(32, 640));
        assert_eq!(backend.live_buffers(), 1);
        drop(buf);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_element_count_overflow_rejected() {
        let (_, mut buf) = setup(GrowableBufferDesc::vertex(1024, 64));
        let err = buf.pre_fill(u32::MAX, false).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_desc_validation() {
        let backend = Arc::new(HostBackend::new());

        let bad_stride = GrowableBufferDesc {
            element_stride: 0,
            ..GrowableBufferDesc::vertex(4, 64)
        };
        assert!(GrowableBuffer::new(backend.clone(), bad_stride).is_err());

        let immutable = GrowableBufferDesc {
            usage: BufferUsage::Immutable,
            ..GrowableBufferDesc::vertex(4, 64)
        };
        assert!(GrowableBuffer::new(backend.clone(), immutable).is_err());

        let width_on_vertex = GrowableBufferDesc {
            index_width: Some(IndexWidth::U16),
            ..GrowableBufferDesc::vertex(4, 64)
        };
        assert!(GrowableBuffer::new(backend, width_on_vertex).is_err());
    }
}
