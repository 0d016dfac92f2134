//! Authenticated HTTP session management.
//!
//! The backend uses a cookie-based session opened by POSTing credentials.
//! This module owns exactly one such session and recovers it
//! transparently: when a call dies with a connection error or timeout, a
//! brand-new session is built, authenticated, and the original call is
//! retried exactly once. Callers receive `None` on failure and must treat
//! it as "request failed", not as "offline".

use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::Credentials;
use crate::endpoints::Endpoints;

/// Errors that can occur while opening a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The authentication request never completed.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("Authentication rejected with status {0}")]
    Rejected(reqwest::StatusCode),
}

impl SessionError {
    /// Whether this failure is a transport problem rather than a
    /// credential rejection. Transport failures are recoverable by
    /// falling back to offline routing; rejections at startup are fatal.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Owns one authenticated HTTP session against the backend.
pub struct SessionManager {
    /// Rebuilt wholesale on re-authentication so the cookie jar starts
    /// fresh.
    client: RwLock<reqwest::Client>,
    endpoints: Endpoints,
    credentials: Credentials,
    timeout: std::time::Duration,
}

impl SessionManager {
    /// Create a session manager. No network call is made until
    /// [`Self::authenticate`].
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never
    /// happen under normal circumstances as we use standard TLS
    /// configuration.
    #[must_use]
    pub fn new(endpoints: Endpoints, credentials: Credentials, timeout: std::time::Duration) -> Self {
        let client = Self::build_client(timeout);
        Self {
            client: RwLock::new(client),
            endpoints,
            credentials,
            timeout,
        }
    }

    fn build_client(timeout: std::time::Duration) -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client")
    }

    /// Open (or re-open) the session by POSTing the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] when the request never reaches
    /// the backend and [`SessionError::Rejected`] on a non-2xx answer.
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<(), SessionError> {
        let body = json!({
            "email": self.credentials.email,
            "password": self.credentials.password.expose_secret(),
        });

        let client = self.client.read().await.clone();
        let response = client
            .post(self.endpoints.authenticate())
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            debug!("Authenticated to the backend");
            Ok(())
        } else {
            warn!(status = %response.status(), "Backend rejected authentication");
            Err(SessionError::Rejected(response.status()))
        }
    }

    /// Perform a GET under the current session.
    ///
    /// Returns `None` when the request failed even after the one allowed
    /// re-authentication; the HTTP status of a returned response is the
    /// caller's to check.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: Url) -> Option<reqwest::Response> {
        let client = self.client.read().await.clone();
        match client.get(url.clone()).send().await {
            Ok(response) => Some(response),
            Err(e) if e.is_connect() || e.is_timeout() => {
                warn!(error = %e, "GET failed, rebuilding session");
                self.recover_and_retry(|client| client.get(url)).await
            }
            Err(e) => {
                error!(error = %e, "GET failed");
                None
            }
        }
    }

    /// Perform a POST with a JSON body under the current session.
    ///
    /// Same failure semantics as [`Self::get`].
    #[instrument(skip(self, body), fields(url = %url))]
    pub async fn post<T: Serialize + Sync>(&self, url: Url, body: &T) -> Option<reqwest::Response> {
        let client = self.client.read().await.clone();
        match client.post(url.clone()).json(body).send().await {
            Ok(response) => Some(response),
            Err(e) if e.is_connect() || e.is_timeout() => {
                warn!(error = %e, "POST failed, rebuilding session");
                self.recover_and_retry(|client| client.post(url).json(body))
                    .await
            }
            Err(e) => {
                error!(error = %e, "POST failed");
                None
            }
        }
    }

    /// Build a fresh session, authenticate it, and retry the original
    /// call exactly once.
    async fn recover_and_retry(
        &self,
        build_request: impl FnOnce(reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Option<reqwest::Response> {
        {
            let mut client = self.client.write().await;
            *client = Self::build_client(self.timeout);
        }

        if let Err(e) = self.authenticate().await {
            error!(error = %e, "Re-authentication failed, giving up on request");
            return None;
        }

        let client = self.client.read().await.clone();
        match build_request(client).send().await {
            Ok(response) => Some(response),
            Err(e) => {
                error!(error = %e, "Retried request failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("endpoints", &self.endpoints)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn session(base: &str) -> SessionManager {
        SessionManager::new(
            Endpoints::new(base.parse().unwrap()),
            Credentials {
                email: "terminal@example.com".to_string(),
                password: SecretString::from("hunter2".to_string()),
            },
            std::time::Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(session(&server.uri()).authenticate().await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = session(&server.uri()).authenticate().await;
        assert!(matches!(result, Err(SessionError::Rejected(status)) if status.as_u16() == 401));
    }

    #[tokio::test]
    async fn test_authenticate_transport_error() {
        let result = session("http://127.0.0.1:1/").authenticate().await;
        assert!(matches!(result, Err(e) if e.is_transport()));
    }

    #[tokio::test]
    async fn test_get_returns_response_even_on_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let session = session(&server.uri());
        let response = session.get(session.endpoints.users()).await.unwrap();
        assert_eq!(response.status().as_u16(), 503);
    }

    #[tokio::test]
    async fn test_connect_error_triggers_exactly_one_reauth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server.uri());
        // Target a closed port: connect error, one re-auth, one retry that
        // also fails, then None.
        let response = session.get("http://127.0.0.1:1/users".parse().unwrap()).await;
        assert!(response.is_none());

        server.verify().await;
    }

    #[tokio::test]
    async fn test_successful_retry_returns_the_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        // The first call times out; the retry under the fresh session is
        // answered promptly.
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server.uri());
        let response = session.get(session.endpoints.users()).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);

        server.verify().await;
    }

    #[tokio::test]
    async fn test_failed_reauth_returns_none_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/authenticate"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let session = session(&server.uri());
        let response = session.get("http://127.0.0.1:1/users".parse().unwrap()).await;
        assert!(response.is_none());

        server.verify().await;
    }
}
