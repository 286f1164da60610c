//! Session states, events, snapshots and errors.

use std::fmt;

use thiserror::Error;

use crate::api::ApiError;
use crate::auth::{TokenError, UserIdentity};

/// The session state machine.
///
/// ```text
///   Anonymous ──login──▶ Active ──idle (timeout − lead)──▶ Warning
///       ▲                  ▲                                  │
///       │                  └──────activity / keep_alive───────┤
///       │                                                     │ countdown 0
///       └──────────── Expired ◀──── logout / token expiry ────┘
/// ```
///
/// `Expired` is passed through on every session end while storage is
/// cleared; the manager settles in `Anonymous` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Anonymous,
    Active,
    Warning,
    Expired,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Warning)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Active => "active",
            SessionState::Warning => "warning",
            SessionState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogoutReason {
    Manual,
    Inactivity,
    TokenExpired,
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogoutReason::Manual => "manual",
            LogoutReason::Inactivity => "inactivity",
            LogoutReason::TokenExpired => "token_expired",
        };
        f.write_str(name)
    }
}

/// Notifications emitted by the lifecycle, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged { from: SessionState, to: SessionState },
    /// Seconds left in the warning countdown (first value is the full countdown).
    Countdown { remaining_secs: u64 },
    LoggedOut { reason: LogoutReason },
}

/// Everything a consumer needs to render the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<UserIdentity>,
    /// Present only while `state` is `Warning`
    pub countdown: Option<u64>,
}

impl SessionSnapshot {
    pub fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
            user: None,
            countdown: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    pub fn has_financial_access(&self) -> bool {
        self.is_authenticated()
            && self
                .user
                .as_ref()
                .map(|u| u.can_view_financials)
                .unwrap_or(false)
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("login failed: {0}")]
    Auth(#[from] ApiError),

    #[error("login returned an unusable token: {0}")]
    Token(#[from] TokenError),

    #[error("login returned a token that has already expired")]
    TokenExpired,

    #[error("session manager is not running")]
    Unavailable,
}

impl SessionError {
    /// Message suitable for the login form.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Auth(e) => e.user_message(),
            SessionError::Token(_) | SessionError::TokenExpired => {
                "The server returned an invalid session. Please try again.".to_string()
            }
            SessionError::Unavailable => "Session service is not running.".to_string(),
        }
    }
}
