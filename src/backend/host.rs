//! Host-memory backend for tests, benches, and headless runs.
//!
//! Buffer contents live in process memory. Lookups go through a live-id
//! table, so mapping or destroying a stale id fails loudly instead of
//! touching reused memory, which is the bug class the pool exists to
//! prevent on real devices.

use bytes::BytesMut;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{BufferDesc, GpuBackend, MappedRange};
use crate::error::{Error, Result};
use crate::types::{BufferId, BufferKind, BufferUsage, MapMode};

/// A single host-side buffer allocation.
struct HostBuffer {
    kind: BufferKind,
    usage: BufferUsage,
    data: BytesMut,
}

/// Live buffer table, guarded by one mutex.
struct HostState {
    buffers: FxHashMap<BufferId, HostBuffer>,
    next_id: u64,
}

/// In-process implementation of [`GpuBackend`].
pub struct HostBackend {
    state: Mutex<HostState>,

    /// Statistics: buffers created.
    created: AtomicU64,
    /// Statistics: buffers destroyed.
    destroyed: AtomicU64,
    /// Statistics: bytes currently allocated.
    live_bytes: AtomicU64,
    /// Remaining creations to fail (test injection).
    fail_next: AtomicU64,
}

impl HostBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                buffers: FxHashMap::default(),
                next_id: 1,
            }),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            live_bytes: AtomicU64::new(0),
            fail_next: AtomicU64::new(0),
        }
    }

    /// Make the next `n` create_buffer calls fail, for exercising
    /// allocation-failure paths.
    pub fn fail_next_creates(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of buffers currently alive.
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Bytes currently allocated across all live buffers.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// Total buffers created since construction.
    pub fn created_total(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Total buffers destroyed since construction.
    pub fn destroyed_total(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Read back a buffer's contents (test helper).
    pub fn read_buffer(&self, id: BufferId) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let buf = state.buffers.get(&id).ok_or(Error::UnknownBuffer(id))?;
        Ok(buf.data.to_vec())
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for HostBackend {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferId> {
        // Consume one injected failure if armed
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::DeviceResourceCreationFailed(
                "injected allocation failure".to_string(),
            ));
        }

        if desc.byte_size == 0 {
            return Err(Error::InvalidArgument(
                "cannot create zero-sized buffer".to_string(),
            ));
        }

        let mut data = BytesMut::zeroed(desc.byte_size as usize);

        match (&desc.usage, &desc.initial_data) {
            (BufferUsage::Immutable, None) => {
                return Err(Error::DeviceResourceCreationFailed(
                    "immutable buffer requires initial data".to_string(),
                ));
            }
            (_, Some(init)) => {
                if init.len() != desc.byte_size as usize {
                    return Err(Error::InvalidArgument(format!(
                        "initial data is {} bytes, buffer is {}",
                        init.len(),
                        desc.byte_size
                    )));
                }
                data.copy_from_slice(init);
            }
            (_, None) => {}
        }

        let mut state = self.state.lock();
        let id = BufferId::new(state.next_id);
        state.next_id += 1;
        state.buffers.insert(
            id,
            HostBuffer {
                kind: desc.kind,
                usage: desc.usage,
                data,
            },
        );

        self.created.fetch_add(1, Ordering::Relaxed);
        self.live_bytes
            .fetch_add(desc.byte_size as u64, Ordering::Relaxed);

        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<()> {
        let mut state = self.state.lock();
        let buf = state.buffers.remove(&id).ok_or(Error::UnknownBuffer(id))?;

        self.destroyed.fetch_add(1, Ordering::Relaxed);
        self.live_bytes
            .fetch_sub(buf.data.len() as u64, Ordering::Relaxed);

        Ok(())
    }

    fn map(&self, id: BufferId, offset: u32, size: u32, mode: MapMode) -> Result<MappedRange> {
        let state = self.state.lock();
        let buf = state.buffers.get(&id).ok_or(Error::UnknownBuffer(id))?;

        if buf.usage == BufferUsage::Immutable {
            return Err(Error::InvalidArgument(format!(
                "cannot map immutable buffer {}",
                id
            )));
        }

        let end = offset as usize + size as usize;
        if end > buf.data.len() {
            return Err(Error::InvalidArgument(format!(
                "map range {}..{} exceeds buffer size {}",
                offset,
                end,
                buf.data.len()
            )));
        }

        let staging = match mode {
            MapMode::WriteDiscard => BytesMut::zeroed(size as usize),
            MapMode::WriteOnly => {
                BytesMut::from(&buf.data[offset as usize..end])
            }
        };

        Ok(MappedRange::new(id, offset, staging))
    }

    fn unmap(&self, id: BufferId, range: MappedRange) -> Result<()> {
        let (range_id, offset, staged) = range.into_parts();
        if range_id != id {
            return Err(Error::InvalidArgument(format!(
                "unmap of buffer {} with range mapped from {}",
                id, range_id
            )));
        }

        let mut state = self.state.lock();
        let buf = state.buffers.get_mut(&id).ok_or(Error::UnknownBuffer(id))?;

        let end = offset as usize + staged.len();
        if end > buf.data.len() {
            return Err(Error::InvalidArgument(format!(
                "unmap range {}..{} exceeds buffer size {}",
                offset,
                end,
                buf.data.len()
            )));
        }

        buf.data[offset as usize..end].copy_from_slice(&staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn vertex_desc(size: u32) -> BufferDesc {
        BufferDesc::new(BufferKind::Vertex, BufferUsage::Dynamic, size)
    }

    #[test]
    fn test_create_destroy() {
        let backend = HostBackend::new();
        let id = backend.create_buffer(&vertex_desc(256)).unwrap();

        assert_eq!(backend.live_buffers(), 1);
        assert_eq!(backend.live_bytes(), 256);
        assert_eq!(backend.created_total(), 1);

        backend.destroy_buffer(id).unwrap();
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_bytes(), 0);
        assert_eq!(backend.destroyed_total(), 1);
    }

    #[test]
    fn test_ids_never_reused() {
        let backend = HostBackend::new();
        let a = backend.create_buffer(&vertex_desc(64)).unwrap();
        backend.destroy_buffer(a).unwrap();
        let b = backend.create_buffer(&vertex_desc(64)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_destroy_unknown_fails() {
        let backend = HostBackend::new();
        let err = backend.destroy_buffer(BufferId::new(999)).unwrap_err();
        assert!(matches!(err, Error::UnknownBuffer(_)));
    }

    #[test]
    fn test_map_write_roundtrip() {
        let backend = HostBackend::new();
        let id = backend.create_buffer(&vertex_desc(16)).unwrap();

        let mut range = backend.map(id, 0, 16, MapMode::WriteDiscard).unwrap();
        range.as_mut_slice().copy_from_slice(b"0123456789abcdef");
        backend.unmap(id, range).unwrap();

        assert_eq!(backend.read_buffer(id).unwrap(), b"0123456789abcdef");
    }

    #[test]
    fn test_map_discard_zeroes() {
        let backend = HostBackend::new();
        let id = backend.create_buffer(&vertex_desc(8)).unwrap();

        let mut range = backend.map(id, 0, 8, MapMode::WriteDiscard).unwrap();
        range.as_mut_slice().copy_from_slice(b"AAAAAAAA");
        backend.unmap(id, range).unwrap();

        // WriteDiscard staging starts zeroed regardless of contents
        let range = backend.map(id, 0, 8, MapMode::WriteDiscard).unwrap();
        assert!(range.as_slice().iter().all(|&b| b == 0));

        // WriteOnly staging reflects current contents
        let range = backend.map(id, 0, 8, MapMode::WriteOnly).unwrap();
        assert_eq!(range.as_slice(), b"AAAAAAAA");
    }

    #[test]
    fn test_partial_map_offset() {
        let backend = HostBackend::new();
        let id = backend.create_buffer(&vertex_desc(8)).unwrap();

        let mut range = backend.map(id, 4, 4, MapMode::WriteOnly).unwrap();
        range.as_mut_slice().copy_from_slice(b"tail");
        backend.unmap(id, range).unwrap();

        let contents = backend.read_buffer(id).unwrap();
        assert_eq!(&contents[4..], b"tail");
        assert_eq!(&contents[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_map_out_of_range() {
        let backend = HostBackend::new();
        let id = backend.create_buffer(&vertex_desc(8)).unwrap();
        let err = backend.map(id, 4, 8, MapMode::WriteOnly).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_map_after_destroy_fails() {
        let backend = HostBackend::new();
        let id = backend.create_buffer(&vertex_desc(8)).unwrap();
        backend.destroy_buffer(id).unwrap();

        let err = backend.map(id, 0, 8, MapMode::WriteOnly).unwrap_err();
        assert!(matches!(err, Error::UnknownBuffer(_)));
    }

    #[test]
    fn test_immutable_buffer() {
        let backend = HostBackend::new();
        let desc = BufferDesc::immutable(BufferKind::Uniform, Bytes::from_static(b"constants"));
        let id = backend.create_buffer(&desc).unwrap();

        assert_eq!(backend.read_buffer(id).unwrap(), b"constants");

        let err = backend.map(id, 0, 4, MapMode::WriteOnly).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_immutable_requires_data() {
        let backend = HostBackend::new();
        let desc = BufferDesc::new(BufferKind::Uniform, BufferUsage::Immutable, 64);
        let err = backend.create_buffer(&desc).unwrap_err();
        assert!(matches!(err, Error::DeviceResourceCreationFailed(_)));
    }

    #[test]
    fn test_zero_size_rejected() {
        let backend = HostBackend::new();
        let err = backend.create_buffer(&vertex_desc(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_fail_injection() {
        let backend = HostBackend::new();
        backend.fail_next_creates(2);

        assert!(backend.create_buffer(&vertex_desc(64)).is_err());
        assert!(backend.create_buffer(&vertex_desc(64)).is_err());
        assert!(backend.create_buffer(&vertex_desc(64)).is_ok());
    }
}
