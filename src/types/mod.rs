mod buffer;
mod frame;

pub use buffer::{BufferId, BufferKind, BufferUsage, IndexWidth, MapMode};
pub use frame::FrameNumber;
