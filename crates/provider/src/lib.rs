//! Opaque adapter to the cloud VM management API.
//!
//! [`client::VmProvider`] is the seam the rest of the system programs
//! against; [`http::HttpVmProvider`] implements it over the vendor's REST
//! API with bounded timeouts, retry with backoff for transient failures,
//! and immediate surfacing of permanent rejections.

pub mod client;
pub mod error;
pub mod http;
pub mod retry;

pub use client::{ImageInfo, NetworkInfo, PowerAction, VmProvider, VmSpec};
pub use error::ProviderError;
