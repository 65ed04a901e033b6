//! Job domain entities.

pub mod model;
pub mod patch;
pub mod state;

pub use model::{EnqueueRequest, Job, JobClaim};
pub use patch::JobPatch;
pub use state::{JobCounts, JobState};
