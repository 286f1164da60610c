//! Core library for glassdesk.
//!
//! This crate owns everything the front end needs to know about who is
//! logged in and for how long:
//!
//! - `api`: the auth-service client (login exchange)
//! - `auth`: bearer-token decoding and durable session storage
//! - `session`: the session lifecycle manager, its timers, and the route guard
//! - `config`: on-disk configuration and directory locations

pub mod api;
pub mod auth;
pub mod config;
pub mod session;

pub use api::{ApiClient, ApiError, AuthService, LoginGrant};
pub use auth::{Credential, SessionStore, StorageKey, UserIdentity};
pub use config::{Config, StorageBackend};
pub use session::{
    LogoutReason, Route, RouteDecision, RouteGuard, SessionError, SessionEvent, SessionHandle,
    SessionManager, SessionSnapshot, SessionState, SessionTimeouts,
};
