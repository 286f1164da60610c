//! Client for the glassdesk REST API's authentication endpoint.
//!
//! Only the credential exchange lives here. The API answers
//! `POST /auth/login` with a JWT bearer token plus the user's
//! attributes; everything else the backend serves is consumed by
//! screens outside this crate.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthService, LoginGrant};
pub use error::ApiError;
