//! # queuectl-entity
//!
//! Domain entity for queuectl: the [`Job`](job::Job) record persisted by the
//! store, its lifecycle states, and the field patches used to move it
//! between states.

pub mod job;

pub use job::{EnqueueRequest, Job, JobClaim, JobCounts, JobPatch, JobState};
