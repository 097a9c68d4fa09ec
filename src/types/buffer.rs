use std::fmt;

/// Opaque identifier for a native buffer within a backend.
///
/// Ids are issued by the backend on creation and never reused for the
/// lifetime of that backend, so a stale id reliably fails lookups instead
/// of silently aliasing a newer buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BufferId(u64);

impl BufferId {
    /// Create a BufferId from a raw u64 value
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferId({})", self.0)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of GPU buffer; selects bind flags at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

impl BufferKind {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            BufferKind::Vertex => "vertex",
            BufferKind::Index => "index",
            BufferKind::Uniform => "uniform",
        }
    }
}

/// Write pattern the buffer is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Written rarely, read many times
    Static,
    /// Rewritten every frame via map/unmap
    Dynamic,
    /// Contents supplied at creation, never written again
    Immutable,
}

/// CPU access mode for a map call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// Write without reading back; existing contents are visible
    WriteOnly,
    /// Discard previous contents; the mapped range starts zeroed
    WriteDiscard,
}

/// Index element width for index buffers.
///
/// The width bounds how many vertices a draw can address. Exceeding it is
/// a hard error, never a silent truncation: truncated indices render
/// corrupted geometry instead of crashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    /// Bytes per index element
    #[inline]
    pub const fn stride(&self) -> u32 {
        match self {
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }

    /// Largest element count addressable at this width
    #[inline]
    pub const fn max_elements(&self) -> u32 {
        match self {
            IndexWidth::U16 => u16::MAX as u32,
            IndexWidth::U32 => u32::MAX,
        }
    }
}
