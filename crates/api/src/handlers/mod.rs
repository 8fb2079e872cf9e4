//! Request handlers.
//!
//! Each submodule provides async handler functions for one surface.
//! Handlers delegate to the broker/repositories and map errors via
//! [`crate::error::AppError`].

pub mod admin;
pub mod auth;
pub mod desktops;
pub mod health;
