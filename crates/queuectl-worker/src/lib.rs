//! Job processing for queuectl.
//!
//! This crate provides:
//! - The job manager that owns the lifecycle state machine
//! - The exponential backoff / dead-letter policy
//! - A shell command executor with a wall-clock timeout
//! - The worker loop that polls, executes, and reports
//! - The pool supervisor that spawns and signals worker processes

pub mod backoff;
pub mod executor;
pub mod pool;
pub mod queue;
pub mod runner;

pub use backoff::BackoffPolicy;
pub use executor::{CommandError, CommandOutput, CommandRunner, ShellExecutor};
pub use pool::WorkerPool;
pub use queue::JobQueue;
pub use runner::{JobOutcome, WorkerRunner};
