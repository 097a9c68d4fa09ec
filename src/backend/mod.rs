//! Native buffer creation and mapping, abstracted behind a trait.
//!
//! The pool never talks to a graphics API directly. A backend is chosen
//! at startup and injected as `Arc<dyn GpuBackend>`, so the same pool
//! code runs against real device memory or the in-process host backend
//! used by tests and benches.

mod host;

pub use host::HostBackend;

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use crate::types::{BufferId, BufferKind, BufferUsage, MapMode};

/// Creation parameters for a native buffer.
#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub kind: BufferKind,
    pub usage: BufferUsage,
    pub byte_size: u32,
    /// Required for Immutable usage; must cover the whole buffer
    pub initial_data: Option<Bytes>,
}

impl BufferDesc {
    /// Describe an uninitialized buffer.
    pub fn new(kind: BufferKind, usage: BufferUsage, byte_size: u32) -> Self {
        Self {
            kind,
            usage,
            byte_size,
            initial_data: None,
        }
    }

    /// Describe an immutable buffer with its full contents.
    pub fn immutable(kind: BufferKind, data: Bytes) -> Self {
        Self {
            kind,
            usage: BufferUsage::Immutable,
            byte_size: data.len() as u32,
            initial_data: Some(data),
        }
    }
}

/// CPU-writable staging for a mapped buffer range.
///
/// Produced by `GpuBackend::map` and committed by `GpuBackend::unmap`.
/// The staged bytes do not reach the buffer until unmap.
#[derive(Debug)]
pub struct MappedRange {
    id: BufferId,
    offset: u32,
    data: BytesMut,
}

impl MappedRange {
    pub(crate) fn new(id: BufferId, offset: u32, data: BytesMut) -> Self {
        Self { id, offset, data }
    }

    /// Buffer this range was mapped from
    #[inline]
    pub fn buffer_id(&self) -> BufferId {
        self.id
    }

    /// Byte offset of the range within the buffer
    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Length of the mapped range in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check whether the range is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only view of the staged bytes
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Writable view of the staged bytes
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn into_parts(self) -> (BufferId, u32, BytesMut) {
        (self.id, self.offset, self.data)
    }
}

/// Creation, destruction, and map/unmap primitives for one device.
///
/// Implementations must be safe to call from any thread; the pool's
/// frame-deferral discipline, not the backend, is what guarantees the
/// GPU is done with a buffer before destroy is called.
pub trait GpuBackend: Send + Sync {
    /// Allocate a buffer of exactly `desc.byte_size` bytes.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferId>;

    /// Release a buffer's device memory.
    fn destroy_buffer(&self, id: BufferId) -> Result<()>;

    /// Map `size` bytes at `offset` for CPU writing.
    fn map(&self, id: BufferId, offset: u32, size: u32, mode: MapMode) -> Result<MappedRange>;

    /// Commit a mapped range back to its buffer.
    fn unmap(&self, id: BufferId, range: MappedRange) -> Result<()>;
}
