//! Task dispatch.
//!
//! Every action the sweep or a user asks for becomes one [`Task`], handed
//! to a [`TaskQueue`]. The bundled [`WorkerPool`] executes tasks on spawned
//! tokio tasks; any queue with at-least-once delivery will do, since the
//! state machine tolerates duplicates.

mod pool;
mod task;

pub use pool::WorkerPool;
pub use task::{ArcTaskQueue, Task, TaskQueue};
