use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound for the inactivity timeout and the expiry poll (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Timing parameters for the session lifecycle.
///
/// ```text
///  last activity                  warning              logout
///       │◀──── inactivity − lead ────▶│◀──── lead ────────▶│
///                                     countdown N, N-1, … 0
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimeouts {
    /// Idle time after which the session is ended. Default: 600 (10 minutes).
    pub inactivity_timeout_secs: u64,
    /// How long before the logout the warning appears. Default: 60.
    pub warning_lead_secs: u64,
    /// Starting value of the visible countdown. Derived from
    /// `warning_lead_secs` by `validated()` so the countdown reaches zero
    /// exactly at the logout deadline; never read from or written to config.
    #[serde(skip)]
    pub countdown_secs: u64,
    /// How often the stored token's expiry is re-checked. Default: 30.
    pub expiry_poll_secs: u64,
    /// Activity events closer together than this are dropped. Default: 1000.
    pub activity_coalesce_ms: u64,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 600,
            warning_lead_secs: 60,
            countdown_secs: 60,
            expiry_poll_secs: 30,
            activity_coalesce_ms: 1_000,
        }
    }
}

impl SessionTimeouts {
    /// Clamp out-of-range values so the timeouts are safe to use.
    ///
    /// - `inactivity_timeout_secs` and `expiry_poll_secs` are between 1
    ///   and `MAX_INTERVAL_SECS`.
    /// - `warning_lead_secs` is at most the inactivity timeout.
    /// - `countdown_secs` equals the lead.
    pub fn validated(mut self) -> Self {
        self.inactivity_timeout_secs =
            clamp_interval("inactivity_timeout_secs", self.inactivity_timeout_secs);
        self.expiry_poll_secs = clamp_interval("expiry_poll_secs", self.expiry_poll_secs);
        if self.warning_lead_secs > self.inactivity_timeout_secs {
            warn!(
                lead = self.warning_lead_secs,
                timeout = self.inactivity_timeout_secs,
                "warning lead exceeds inactivity timeout, clamping"
            );
            self.warning_lead_secs = self.inactivity_timeout_secs;
        }
        self.countdown_secs = self.warning_lead_secs;
        self
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn warning_lead(&self) -> Duration {
        Duration::from_secs(self.warning_lead_secs)
    }

    /// Idle time before the warning appears.
    pub fn warning_delay(&self) -> Duration {
        self.inactivity_timeout().saturating_sub(self.warning_lead())
    }

    pub fn expiry_poll_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_poll_secs)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.activity_coalesce_ms)
    }

    pub fn has_warning(&self) -> bool {
        self.warning_lead_secs > 0
    }
}

fn clamp_interval(name: &str, secs: u64) -> u64 {
    if secs == 0 {
        warn!("{} is 0, using 1", name);
        1
    } else if secs > MAX_INTERVAL_SECS {
        warn!(secs, max = MAX_INTERVAL_SECS, "{} is too large, clamping", name);
        MAX_INTERVAL_SECS
    } else {
        secs
    }
}
