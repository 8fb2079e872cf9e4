use std::time::Duration;

/// Tunable bounds for the brokering layer.
///
/// Deadlines and intervals are configuration rather than constants so
/// tests can shrink them.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Upper bound on waiting for a desktop to reach `on` during connect.
    pub start_timeout: Duration,
    /// Interval between state polls while waiting for `on`.
    pub start_poll_interval: Duration,
    /// Bound on the synchronous state refresh before a connect; on
    /// expiry the last known state is used instead.
    pub preconnect_refresh_timeout: Duration,
    /// How long a desktop may sit in a transitional state
    /// (`provisioning`/`starting`/`suspending`) before reconciliation
    /// moves it to `error`.
    pub transition_deadline: Duration,
    /// Validity window of issued session grants.
    pub grant_validity: Duration,
    /// A state check older than this is considered stale by read paths.
    pub state_check_stale_after: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(180),
            start_poll_interval: Duration::from_secs(5),
            preconnect_refresh_timeout: Duration::from_secs(5),
            transition_deadline: Duration::from_secs(900),
            grant_validity: Duration::from_secs(600),
            state_check_stale_after: Duration::from_secs(30),
        }
    }
}
