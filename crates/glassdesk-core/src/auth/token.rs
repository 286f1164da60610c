//! Bearer-token decoding.
//!
//! The backend issues JWTs whose payload carries the username (`sub`),
//! display name, the financial-access flag and an absolute expiry in
//! epoch seconds. Only the payload segment is read.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not a three-part JWT")]
    Malformed,

    #[error("token payload is not valid base64url")]
    Encoding,

    #[error("token payload is not valid JSON claims: {0}")]
    Claims(String),
}

/// Claims read from the token payload. Unknown claims (`iat`, `jti`,
/// `type`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub can_view_financials: bool,
    pub exp: i64,
}

/// The logged-in user as shown by the UI and consulted by the route guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub can_view_financials: bool,
}

impl UserIdentity {
    /// Name for the header bar: the full name, or the username when the
    /// server did not supply one.
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

/// A raw bearer token together with its decoded claims.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    claims: Claims,
}

impl Credential {
    /// Decode the payload segment of a JWT. The signature is not verified.
    pub fn decode(token: impl Into<String>) -> Result<Self, TokenError> {
        let token = token.into();
        let mut parts = token.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
            _ => return Err(TokenError::Malformed),
        };

        // Some issuers pad or use the standard alphabet
        let normalized: String = payload
            .trim_end_matches('=')
            .chars()
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                other => other,
            })
            .collect();

        let bytes = URL_SAFE_NO_PAD
            .decode(normalized.as_bytes())
            .map_err(|_| TokenError::Encoding)?;
        let claims: Claims =
            serde_json::from_slice(&bytes).map_err(|e| TokenError::Claims(e.to_string()))?;

        Ok(Self { token, claims })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    /// Absolute expiry in epoch seconds
    pub fn expires_at(&self) -> i64 {
        self.claims.exp
    }

    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.claims.exp, 0)
    }

    /// A token whose expiry equals `now` is already expired.
    pub fn is_expired_at(&self, now_epoch: i64) -> bool {
        self.claims.exp <= now_epoch
    }

    pub fn seconds_until_expiry(&self, now_epoch: i64) -> i64 {
        (self.claims.exp - now_epoch).max(0)
    }

    /// Identity derived from the claims alone (used when rehydrating).
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            username: self.claims.sub.clone(),
            full_name: self
                .claims
                .full_name
                .clone()
                .unwrap_or_else(|| self.claims.sub.clone()),
            can_view_financials: self.claims.can_view_financials,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.signature", header, payload)
}
