//! Desktop lifecycle state machine.
//!
//! [`DesktopState`] is the single authoritative enum for a desktop's power
//! and provisioning state. Transitions happen along a fixed edge set,
//! driven either by explicit commands (connect, admin power actions, the
//! idle sweep) or by reconciliation against provider-reported truth.
//! [`DesktopState::can_transition_to`] is the one place that edge set is
//! encoded; every writer goes through it.

use serde::{Deserialize, Serialize};

/// Power/lifecycle state of a managed desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesktopState {
    /// No state check has succeeded yet.
    Unknown,
    /// VM creation has been requested and has not reached a terminal state.
    Provisioning,
    /// Powered on and reachable.
    On,
    /// A power-on/resume command was issued; waiting for the VM to boot.
    Starting,
    /// A suspend command was issued; waiting for the provider to confirm.
    Suspending,
    /// Suspended (RAM preserved on the provider side).
    Suspended,
    /// Powered off.
    Off,
    /// Terminal until an admin re-provisions or re-syncs the desktop.
    Error,
}

impl DesktopState {
    /// Database/API string for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            DesktopState::Unknown => "unknown",
            DesktopState::Provisioning => "provisioning",
            DesktopState::On => "on",
            DesktopState::Starting => "starting",
            DesktopState::Suspending => "suspending",
            DesktopState::Suspended => "suspended",
            DesktopState::Off => "off",
            DesktopState::Error => "error",
        }
    }

    /// Parse a stored state string. Unrecognized values map to `Unknown`
    /// rather than failing, so a bad row never takes down a read path.
    pub fn parse(s: &str) -> Self {
        match s {
            "provisioning" => DesktopState::Provisioning,
            "on" => DesktopState::On,
            "starting" => DesktopState::Starting,
            "suspending" => DesktopState::Suspending,
            "suspended" => DesktopState::Suspended,
            "off" => DesktopState::Off,
            "error" => DesktopState::Error,
            _ => DesktopState::Unknown,
        }
    }

    /// Whether the edge `self -> next` is a legal transition.
    ///
    /// Re-observing the current state is always allowed (no-op write).
    /// `Unknown` may move to any state: it only exists before the first
    /// successful state check. `Error` has no outgoing edges; leaving it
    /// requires the admin re-sync path, which bypasses this check.
    pub fn can_transition_to(self, next: DesktopState) -> bool {
        use DesktopState::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Unknown, _)
                | (Provisioning, On)
                | (Provisioning, Error)
                | (On, Suspending)
                | (On, Off)
                | (On, Error)
                | (Suspending, Suspended)
                | (Suspending, Error)
                | (Suspended, Starting)
                | (Suspended, Error)
                | (Starting, On)
                | (Starting, Error)
                | (Off, Starting)
        )
    }

    /// True for the in-flight states set by command paths and confirmed
    /// (or timed out) by reconciliation.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            DesktopState::Provisioning | DesktopState::Starting | DesktopState::Suspending
        )
    }
}

impl std::fmt::Display for DesktopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    UserDisconnect,
    IdleTimeout,
    MaxDuration,
    AdminTerminate,
    Error,
}

impl SessionEndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionEndReason::UserDisconnect => "user_disconnect",
            SessionEndReason::IdleTimeout => "idle_timeout",
            SessionEndReason::MaxDuration => "max_duration",
            SessionEndReason::AdminTerminate => "admin_terminate",
            SessionEndReason::Error => "error",
        }
    }
}

/// How a client attaches to a desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// In-browser client through the web gateway.
    Browser,
    /// Native RDP client through a tunneled endpoint.
    Native,
}

impl ConnectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionType::Browser => "browser",
            ConnectionType::Native => "native",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DesktopState::*;

    #[test]
    fn parse_round_trips_every_state() {
        for state in [
            Unknown,
            Provisioning,
            On,
            Starting,
            Suspending,
            Suspended,
            Off,
            Error,
        ] {
            assert_eq!(DesktopState::parse(state.as_str()), state);
        }
    }

    #[test]
    fn parse_unrecognized_maps_to_unknown() {
        assert_eq!(DesktopState::parse("rebooting"), Unknown);
        assert_eq!(DesktopState::parse(""), Unknown);
    }

    #[test]
    fn legal_edges_are_allowed() {
        assert!(Provisioning.can_transition_to(On));
        assert!(Provisioning.can_transition_to(Error));
        assert!(On.can_transition_to(Suspending));
        assert!(On.can_transition_to(Off));
        assert!(Suspending.can_transition_to(Suspended));
        assert!(Suspended.can_transition_to(Starting));
        assert!(Starting.can_transition_to(On));
        assert!(Off.can_transition_to(Starting));
    }

    #[test]
    fn illegal_edges_are_rejected() {
        assert!(!Off.can_transition_to(Suspended));
        assert!(!Off.can_transition_to(On));
        assert!(!On.can_transition_to(Suspended));
        assert!(!Suspended.can_transition_to(On));
        assert!(!Error.can_transition_to(On));
        assert!(!Error.can_transition_to(Starting));
    }

    #[test]
    fn self_edge_is_a_no_op() {
        assert!(On.can_transition_to(On));
        assert!(Error.can_transition_to(Error));
    }

    #[test]
    fn unknown_may_move_anywhere() {
        for next in [Provisioning, On, Starting, Suspending, Suspended, Off, Error] {
            assert!(Unknown.can_transition_to(next));
        }
    }
}
