//! The provider seam: a uniform contract over the cloud VM API.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProviderError;

/// Power commands the provider accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    On,
    Off,
    Suspend,
    Resume,
    Restart,
}

impl PowerAction {
    /// Value sent on the wire in the power request body.
    pub fn wire_value(self) -> &'static str {
        match self {
            PowerAction::On => "on",
            PowerAction::Off => "off",
            PowerAction::Suspend => "suspend",
            PowerAction::Resume => "resume",
            PowerAction::Restart => "restart",
        }
    }

    /// Parse an API-level action string (admin power endpoint).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "power_on" => Some(PowerAction::On),
            "power_off" => Some(PowerAction::Off),
            "suspend" => Some(PowerAction::Suspend),
            "resume" => Some(PowerAction::Resume),
            "restart" => Some(PowerAction::Restart),
            _ => None,
        }
    }
}

/// Parameters for creating a Windows VM.
#[derive(Debug, Clone)]
pub struct VmSpec {
    pub name: String,
    pub datacenter: String,
    pub image_id: String,
    pub cpu: String,
    pub ram_mb: i32,
    pub disk_gb: i32,
    pub network_name: String,
    pub admin_password: String,
}

/// An OS image offered by the provider.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub id: String,
    pub description: String,
    pub size_gb: i64,
}

/// A private network/VLAN offered by the provider.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    pub name: String,
    pub subnet: String,
}

/// Uniform contract over the cloud VM management API.
///
/// Implementations hold no desktop state; every method is a remote call
/// with a bounded timeout. `get_state` returns the provider's raw power
/// string — mapping onto [`vdesk_core::state::DesktopState`] is the
/// reconciler's job, so an unrecognized value is data, not an error.
#[async_trait]
pub trait VmProvider: Send + Sync {
    /// Create a VM and return its provider-side identifier.
    async fn create_vm(&self, spec: &VmSpec) -> Result<String, ProviderError>;

    /// Destroy a VM.
    async fn delete_vm(&self, server_id: &str) -> Result<(), ProviderError>;

    /// Issue a power command.
    async fn power(&self, server_id: &str, action: PowerAction) -> Result<(), ProviderError>;

    /// Fetch the provider-reported power state string (lowercased).
    async fn get_state(&self, server_id: &str) -> Result<String, ProviderError>;

    /// List OS images available for provisioning.
    async fn list_images(&self) -> Result<Vec<ImageInfo>, ProviderError>;

    /// List private networks available for placement.
    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, ProviderError>;
}
