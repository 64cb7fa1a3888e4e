//! API client for the booking backend's REST API.
//!
//! Every request reads the bearer token from the shared [`SessionManager`]
//! right before it is sent. A 401 from the backend invalidates the
//! in-memory session so the UI falls back to the login screen.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Method, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{Role, SessionManager, TokenStore};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const LOGIN_PATH: &str = "auth/login";
const CURRENT_USER_PATH: &str = "auth/me";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(alias = "accessToken", alias = "access_token")]
    token: String,
}

/// Profile of the logged-in user as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: String,
    pub email: Option<String>,
    #[serde(alias = "fullName")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Option<Role>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Unknown role strings become `None` instead of failing the whole profile
fn lenient_role<'de, D>(deserializer: D) -> std::result::Result<Option<Role>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// API client for the booking backend.
/// Clone is cheap - reqwest::Client and the session are both reference counted.
pub struct ApiClient<S> {
    client: Client,
    base_url: String,
    session: Arc<SessionManager<S>>,
    initial_backoff: Duration,
}

impl<S> Clone for ApiClient<S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session: Arc::clone(&self.session),
            initial_backoff: self.initial_backoff,
        }
    }
}

impl<S: TokenStore> ApiClient<S> {
    /// Create a new API client
    pub fn new(base_url: &str, timeout: Duration, session: Arc<SessionManager<S>>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_http_client(base_url, client, session))
    }

    /// Create a client around an already configured `reqwest::Client`
    pub fn with_http_client(
        base_url: &str,
        client: Client,
        session: Arc<SessionManager<S>>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the first rate-limit backoff delay (doubled on each retry)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager<S>> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Request headers plus the bearer token they carry, if any
    fn auth_headers(&self) -> Result<(header::HeaderMap, Option<String>)> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let token = self.session.token();
        if let Some(ref token) = token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("Token is not a valid header value")?,
            );
        }
        Ok((headers, token))
    }

    /// Turn a non-success response into an error. A 401 also drops the
    /// in-memory session, but only if it still holds the token `sent`.
    async fn reject(&self, response: Response, sent: Option<&str>) -> anyhow::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_status(status, &body);
        if error.is_unauthorized() {
            warn!(url = %self.base_url, "Backend rejected the session token");
            if let Some(sent) = sent {
                self.session.invalidate_token(sent);
            }
        }
        error.into()
    }

    /// Send a request, retrying with exponential backoff while rate limited
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let (headers, sent) = self.auth_headers()?;
            let mut request = self.client.request(method.clone(), &url).headers(headers);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to send {} request to {}", method, url))?;

            let status = response.status();
            if status.is_success() {
                debug!(%method, url = %url, status = status.as_u16(), "Request succeeded");
                return Ok(response);
            }

            if status.as_u16() != 429 {
                return Err(self.reject(response, sent.as_deref()).await);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited.into());
            }
            warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
            tokio::time::sleep(backoff).await;
            backoff *= 2; // Exponential backoff
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T> {
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        Self::parse_json(response, path).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        Self::parse_json(response, path).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(Method::PUT, path, Some(body)).await?;
        Self::parse_json(response, path).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send::<()>(Method::DELETE, path, None).await?;
        Ok(())
    }

    // ===== Auth Endpoints =====

    /// Exchange credentials for a bearer token.
    ///
    /// The session is left alone; pass the token to
    /// [`SessionManager::login`] to adopt it. Bad credentials come back as
    /// [`ApiError::Unauthorized`] without invalidating the current session.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<String> {
        let url = self.url(LOGIN_PATH);

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { email, password })
            .send()
            .await
            .context("Failed to send authentication request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body).into());
        }

        let auth: AuthResponse = Self::parse_json(response, LOGIN_PATH)
            .await
            .context("Failed to parse auth response")?;
        Ok(auth.token)
    }

    /// Fetch the profile of the logged-in user
    pub async fn current_user(&self) -> Result<UserProfile> {
        self.get(CURRENT_USER_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;

    fn client(base_url: &str) -> ApiClient<MemoryTokenStore> {
        let session = Arc::new(SessionManager::new(MemoryTokenStore::new()));
        ApiClient::with_http_client(base_url, Client::new(), session)
    }

    #[test]
    fn test_url_joining() {
        let api = client("https://api.example.com/v1/");
        assert_eq!(api.base_url(), "https://api.example.com/v1");
        assert_eq!(api.url("/auth/me"), "https://api.example.com/v1/auth/me");
        assert_eq!(api.url("fields"), "https://api.example.com/v1/fields");
    }

    #[test]
    fn test_no_bearer_without_session() {
        let api = client("https://api.example.com");
        let (headers, sent) = api.auth_headers().expect("headers");
        assert!(headers.get(header::AUTHORIZATION).is_none());
        assert!(sent.is_none());
        assert!(headers.get(header::ACCEPT).is_some());
    }

    #[test]
    fn test_parse_user_profile() {
        let json = r#"{"_id": "u1", "email": "ana@example.com", "fullName": "Ana Ruiz", "role": "club"}"#;
        let profile: UserProfile = serde_json::from_str(json).expect("profile should parse");
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.role, Some(Role::Club));
        assert_eq!(profile.display_name(), "Ana Ruiz");
    }

    #[test]
    fn test_parse_user_profile_unknown_role() {
        let json = r#"{"id": "u2", "email": "x@example.com", "role": "REFEREE"}"#;
        let profile: UserProfile = serde_json::from_str(json).expect("profile should parse");
        assert_eq!(profile.role, None);
        assert_eq!(profile.display_name(), "x@example.com");
    }

    #[test]
    fn test_parse_auth_response_aliases() {
        for json in [
            r#"{"token": "a.b.c"}"#,
            r#"{"accessToken": "a.b.c"}"#,
            r#"{"access_token": "a.b.c"}"#,
        ] {
            let auth: AuthResponse = serde_json::from_str(json).expect("auth should parse");
            assert_eq!(auth.token, "a.b.c");
        }
    }
}
