//! # queuectl-database
//!
//! The [`JobStore`] contract and its adapters: a PostgreSQL repository for
//! shared multi-process deployments and an in-memory store for tests and
//! single-process embedding.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryJobStore;
pub use repositories::JobRepository;
pub use store::JobStore;
