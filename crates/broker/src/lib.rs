//! The desktop lifecycle and session brokering layer.
//!
//! Four services own all orchestration in the system:
//! [`broker::SessionBroker`] authorizes and establishes sessions,
//! [`reconcile::StateReconciler`] folds provider-reported truth into the
//! local state machine, [`heartbeat::HeartbeatMonitor`] tracks liveness,
//! and [`idle::IdlePolicy`] suspends idle desktops and force-ends
//! overlong sessions. The provider, transport, and MFA collaborators are
//! trait seams injected at construction.

pub mod broker;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod idle;
pub mod mfa;
pub mod reconcile;
pub mod transport;

pub use broker::{ConnectRequest, ConnectionDescriptor, SessionBroker};
pub use config::BrokerConfig;
pub use error::{BrokerError, BrokerResult};
pub use heartbeat::HeartbeatMonitor;
pub use idle::IdlePolicy;
pub use reconcile::StateReconciler;
