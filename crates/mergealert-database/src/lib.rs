//! # mergealert-database
//!
//! Storage for Merge Alert: the store traits the dispatcher and the
//! reconciler depend on, their PostgreSQL implementations, connection
//! pooling, and migrations. The in-memory store behind the `testing`
//! feature backs the test suites of this and the dependent crates.

pub mod connection;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;
pub use store::{DeliveryQuotaStore, DestinationStore, NotificationStore, ProjectStore, UserDirectory};
