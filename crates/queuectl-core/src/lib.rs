//! # queuectl-core
//!
//! Core crate for queuectl. Contains configuration schemas and the unified
//! error system shared by the store adapters, the worker, and the CLI.
//!
//! This crate has **no** internal dependencies on other queuectl crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
