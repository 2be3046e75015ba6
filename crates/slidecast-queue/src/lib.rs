//! In-process priority job queue.
//!
//! This crate provides:
//! - Priority-ordered job submission and admission (`take_next`)
//! - Job state tracking through to terminal status
//! - Synchronous event fan-out to registered listeners
//! - Structural snapshot export/restore
//!
//! All `JobQueue` methods are safe to call concurrently from any
//! thread. Listener callbacks are invoked strictly after the internal
//! lock is released, so a listener may re-enter the queue.

pub mod error;
pub mod events;
pub mod queue;
pub mod snapshot;

pub use error::{QueueError, QueueResult};
pub use events::{ListenerId, QueueEvent, QueueListener};
pub use queue::{JobQueue, QueueStatistics};
pub use snapshot::QueueSnapshot;
