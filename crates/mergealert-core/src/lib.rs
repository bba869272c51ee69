//! # mergealert-core
//!
//! Core crate for Merge Alert. Contains configuration schemas, the unified
//! error system, and the traits shared by the dispatch and reconciliation
//! crates.
//!
//! This crate has **no** internal dependencies on other Merge Alert crates.

pub mod config;
pub mod crypto;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
