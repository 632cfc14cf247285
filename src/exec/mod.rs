// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `RealExecutorBackend` the runtime uses in production, which tests can
//!   replace with a fake implementation.
//! - [`task_runner`] runs one scheduled task and reports back to the runtime.
//! - [`retry`] is the per-task retry wrapper.
//! - [`cancel`] carries run-level cancellation to every task.

pub mod backend;
pub mod cancel;
pub mod retry;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use cancel::{CancelHandle, CancelSignal};
pub use retry::{Attempted, RetryPolicy, run_with_retry};
