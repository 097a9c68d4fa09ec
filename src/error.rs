use std::fmt;

use crate::types::BufferId;

/// Unified error type for renderpool operations
#[derive(Debug)]
pub enum Error {
    /// Requested size is larger than the largest configured bucket
    SizeExceedsMaximumBucket { requested: u32, max: u32 },

    /// The graphics backend refused to allocate a buffer
    DeviceResourceCreationFailed(String),

    /// An index buffer was asked to address more elements than its
    /// index width can represent
    IndexRangeOverflow { requested: u32, max: u32 },

    /// lock_for_write called while the buffer is already locked
    BufferLocked,

    /// unlock called without a matching lock
    BufferNotLocked,

    /// Buffer id is not known to the backend (destroyed or foreign)
    UnknownBuffer(BufferId),

    /// Invalid pool or buffer configuration
    InvalidConfig(String),

    /// Invalid argument type or value
    InvalidArgument(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SizeExceedsMaximumBucket { requested, max } => {
                write!(f, "Size {} exceeds maximum bucket size {}", requested, max)
            }
            Error::DeviceResourceCreationFailed(msg) => {
                write!(f, "Device resource creation failed: {}", msg)
            }
            Error::IndexRangeOverflow { requested, max } => {
                write!(f, "Index range overflow: {} elements, width supports {}", requested, max)
            }
            Error::BufferLocked => write!(f, "Buffer is already locked"),
            Error::BufferNotLocked => write!(f, "Buffer is not locked"),
            Error::UnknownBuffer(id) => write!(f, "Unknown buffer: {}", id),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Result type alias for renderpool operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = Error::SizeExceedsMaximumBucket {
            requested: 2_000_000,
            max: 1_048_576,
        };
        assert!(e.to_string().contains("2000000"));
        assert!(e.to_string().contains("1048576"));

        let e = Error::IndexRangeOverflow {
            requested: 65536,
            max: 65535,
        };
        assert!(e.to_string().contains("65536"));
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&Error::BufferLocked);
    }
}
