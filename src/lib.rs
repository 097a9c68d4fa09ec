//! renderpool — frame-safe GPU buffer pooling for render pipelines.
//!
//! The GPU executes asynchronously relative to the CPU, so a buffer the
//! CPU just finished with may still feed in-flight draw calls. This
//! crate reuses transient buffers without that hazard: freed buffers
//! wait out a configurable number of frame boundaries before reuse, and
//! stale ones are destroyed a bounded number per frame.
//!
//! Two allocation models are provided:
//! - [`DynamicBufferPool`]: shared, size-bucketed checkout/release with
//!   frame-deferred reuse, for per-draw transient buffers.
//! - [`GrowableBuffer`]: a private per-owner buffer with amortized
//!   growth and lock/fill/unlock discipline, for data rewritten whole
//!   every frame.
//!
//! Graphics APIs are abstracted behind the [`GpuBackend`] trait; the
//! [`HostBackend`] implementation backs tests and headless runs.

pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod growable;
pub mod pool;
pub mod throttle;
pub mod types;

pub use backend::{BufferDesc, GpuBackend, HostBackend, MappedRange};
pub use command::{RenderCommand, RenderCommandSender, RenderQueue};
pub use config::PoolConfig;
pub use error::{Error, Result};
pub use growable::{GrowableBuffer, GrowableBufferDesc};
pub use pool::{DynamicBufferPool, PoolStatsSnapshot, PooledBuffer, SizeClassTable};
pub use types::{BufferId, BufferKind, BufferUsage, FrameNumber, IndexWidth, MapMode};
