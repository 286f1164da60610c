//! Authentication primitives: bearer-token decoding and durable storage.
//!
//! This module provides:
//! - `Credential`: a raw bearer token plus its decoded claims
//! - `SessionStore`: key-value persistence for the token and the
//!   last-activity timestamp, with file, keychain and in-memory backends
//!
//! Tokens are decoded, not verified. The signature is never checked on
//! the client; the transport is trusted to deliver the server's token.

pub mod credentials;
pub mod storage;
pub mod token;

pub use credentials::KeyringStore;
pub use storage::{FileStore, MemoryStore, SessionStore, StorageKey};
pub use token::{Claims, Credential, TokenError, UserIdentity};
