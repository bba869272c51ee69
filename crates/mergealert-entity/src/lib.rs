//! # mergealert-entity
//!
//! Domain entity models for Merge Alert. Structs here are either database
//! rows (deriving `sqlx::FromRow`) or value objects decoded from GitLab
//! payloads. All derive `Debug`, `Clone`, `Serialize` and `Deserialize`.

pub mod delivery;
pub mod destination;
pub mod event;
pub mod notification;
pub mod project;
pub mod user;
