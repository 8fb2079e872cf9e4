//! Periodic background loops, spawned from `main.rs` and stopped via a
//! shared [`tokio_util::sync::CancellationToken`].

pub mod idle_sweep;
pub mod reconcile;
