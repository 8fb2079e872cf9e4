//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - Plain create/update DTOs consumed by the repositories

pub mod desktop;
pub mod session;
pub mod tenant;
pub mod user;
