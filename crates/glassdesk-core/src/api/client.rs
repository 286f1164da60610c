//! API client for the glassdesk REST API.
//!
//! `ApiClient` performs the login exchange. The session manager talks to
//! it through the `AuthService` trait so tests and embedders can supply
//! their own exchange.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::UserIdentity;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Default base URL, matching the backend's development server.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    user: UserIdentity,
}

/// What a successful login exchange hands back: the raw bearer token and
/// the attributes the server reported for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub access_token: String,
    pub user: UserIdentity,
}

/// The credential exchange the session manager depends on.
pub trait AuthService: Send + Sync + 'static {
    fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<LoginGrant, ApiError>> + Send;
}

/// API client for the glassdesk backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url` (e.g. `http://host/api`)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange a username and password for a bearer token
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, ApiError> {
        let url = format!("{}/auth/login", self.base_url);
        debug!(url = %url, username = username, "Sending login request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let response = Self::check_response(response).await?;

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))?;

        if body.access_token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Login response carried an empty token".to_string(),
            ));
        }

        Ok(LoginGrant {
            access_token: body.access_token,
            user: body.user,
        })
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}

impl AuthService for ApiClient {
    async fn authenticate(&self, username: &str, password: &str) -> Result<LoginGrant, ApiError> {
        self.login(username, password).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:5000/api/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/api");
    }

    #[tokio::test]
    async fn test_login_success_returns_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({"username": "abbas", "password": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "aaa.bbb.ccc",
                "user": {
                    "username": "abbas",
                    "full_name": "Abbas",
                    "can_view_financials": true
                }
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&format!("{}/api", server.uri())).unwrap();
        let grant = client.login("abbas", "secret").await.unwrap();

        assert_eq!(grant.access_token, "aaa.bbb.ccc");
        assert_eq!(grant.user.username, "abbas");
        assert_eq!(grant.user.full_name, "Abbas");
        assert!(grant.user.can_view_financials);
    }

    #[tokio::test]
    async fn test_login_bad_credentials_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"msg": "Bad username or password"})),
            )
            .mount(&server)
            .await;

        let client = ApiClient::new(&format!("{}/api", server.uri())).unwrap();
        let err = client.login("irfan", "wrong").await.unwrap_err();

        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn test_login_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "x"})))
            .mount(&server)
            .await;

        let client = ApiClient::new(&format!("{}/api", server.uri())).unwrap();
        let err = client.login("abbas", "secret").await.unwrap_err();

        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }
}
