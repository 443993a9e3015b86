//! This module is about obtaining and caching the OAuth2 bearer token required by the [Warcraft Logs API](https://www.warcraftlogs.com/api/docs), through the client credentials flow.

use crate::clock::Clock;
use crate::transport::{HttpRequest, RequestAuth, RequestBody, Transport};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// The token endpoint used when none is configured.
pub const DEFAULT_TOKEN_URL: &str = "https://www.warcraftlogs.com/oauth/token";

/// The GraphQL endpoint used when none is configured.
pub const DEFAULT_API_URL: &str = "https://www.warcraftlogs.com/api/v2/client";

/// How long a token exchange may take before it is abandoned.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Tokens with fewer seconds than this left before their expiry are treated as already expired.
pub const EXPIRY_BUFFER_SECS: i64 = 60;

/// The client identity this process authenticates as.
#[derive(Clone)]
pub struct Credential {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub api_url: String,
}

impl Credential {
    /// Create a credential pointing at the default Warcraft Logs endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

// Keeps the secret out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// A bearer token issued by the authorization server.
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds, as reported by the authorization server.
    pub expires_in: i64,
    pub issued_at: DateTime<Utc>,
    /// Fixed at issuance as `issued_at + expires_in`.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token can still be handed out at `now`, keeping [EXPIRY_BUFFER_SECS] in reserve.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - chrono::Duration::seconds(EXPIRY_BUFFER_SECS)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// No token could be obtained from the authorization server.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("WCL Authentication failed: {message}")]
pub struct AuthenticationFailure {
    pub message: String,
}

impl AuthenticationFailure {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Body of a successful token response.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
}

/// Body of a failed token response.
#[derive(Deserialize)]
struct TokenErrorResponse {
    error: serde_json::Value,
}

/// Owner of the single cached [AccessToken] of a [Credential].
pub struct TokenManager {
    credential: Credential,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    token: RwLock<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(credential: Credential, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            credential,
            transport,
            clock,
            token: RwLock::new(None),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Exchange the client credentials for a fresh token, replacing the cached one.
    ///
    /// On failure the previously cached token, if any, is left as it was.
    pub async fn authenticate(&self) -> Result<AccessToken, AuthenticationFailure> {
        debug!("Requesting a new token from {}", &self.credential.token_url);

        trace!("Building token request...");
        let request = HttpRequest {
            url: self.credential.token_url.clone(),
            auth: RequestAuth::Basic {
                username: self.credential.client_id.clone(),
                password: self.credential.client_secret.clone(),
            },
            body: RequestBody::Form(vec![("grant_type".to_string(), "client_credentials".to_string())]),
            timeout: AUTH_TIMEOUT,
        };

        trace!("Posting token request...");
        let resp = self.transport.send(request).await.map_err(|e| AuthenticationFailure::new(e.0))?;

        if !resp.is_success() {
            trace!("Token endpoint answered {}, extracting the error...", resp.status);
            let message = match serde_json::from_slice::<TokenErrorResponse>(&resp.body) {
                Ok(TokenErrorResponse { error: serde_json::Value::String(error) }) => error,
                Ok(TokenErrorResponse { error }) => error.to_string(),
                Err(_) => format!("Request failed with status code {}", resp.status),
            };
            return Err(AuthenticationFailure::new(message));
        }

        trace!("Parsing token response...");
        let body: TokenResponse = serde_json::from_slice(&resp.body)
            .map_err(|e| AuthenticationFailure::new(format!("malformed token response: {e}")))?;

        let issued_at = self.clock.now();
        let expires_at = chrono::Duration::try_seconds(body.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| AuthenticationFailure::new("malformed token response: expires_in out of range"))?;
        let token = AccessToken {
            access_token: body.access_token,
            token_type: body.token_type,
            expires_in: body.expires_in,
            issued_at,
            expires_at,
        };

        trace!("Replacing the cached token...");
        *self.token.write().await = Some(token.clone());
        info!("Obtained a new {} token expiring at {}", &token.token_type, &token.expires_at);

        Ok(token)
    }

    /// Get a token string with at least [EXPIRY_BUFFER_SECS] seconds of validity left, authenticating first if needed.
    pub async fn valid_token(&self) -> Result<String, AuthenticationFailure> {
        let now = self.clock.now();
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_usable_at(now) {
                trace!("Reusing cached token expiring at {}", &token.expires_at);
                return Ok(token.access_token.clone())
            }
            debug!("Cached token expires at {}, renewing it", &token.expires_at);
        }
        else {
            debug!("No token cached, authenticating");
        }

        let token = self.authenticate().await?;
        Ok(token.access_token)
    }

    /// Forget the cached token, so that the next [TokenManager::valid_token] authenticates again.
    pub async fn clear_token(&self) {
        debug!("Clearing the cached token");
        *self.token.write().await = None;
    }

    /// A snapshot of the cached token, if any.
    pub async fn current_token(&self) -> Option<AccessToken> {
        self.token.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use crate::transport::testing::ScriptedTransport;
    use chrono::TimeZone;
    use serde_json::json;

    fn start() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn token_body(token: &str, expires_in: i64) -> serde_json::Value {
        json!({"access_token": token, "token_type": "Bearer", "expires_in": expires_in})
    }

    fn manager(transport: ScriptedTransport) -> (TokenManager, Arc<ScriptedTransport>, Arc<ManualClock>) {
        let transport = Arc::new(transport);
        let clock = Arc::new(ManualClock::at(start()));
        let credential = Credential {
            token_url: "https://auth.test/oauth/token".to_string(),
            ..Credential::new("client", "secret")
        };
        let manager = TokenManager::new(credential, transport.clone(), clock.clone());
        (manager, transport, clock)
    }

    #[tokio::test]
    async fn authenticate_posts_client_credentials() {
        let (manager, transport, _) = manager(ScriptedTransport::new().respond(200, token_body("abc", 3600)));

        let token = manager.authenticate().await.unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.issued_at, start());
        assert_eq!(token.expires_at, start() + chrono::Duration::seconds(3600));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://auth.test/oauth/token");
        assert_eq!(requests[0].timeout, Duration::from_secs(10));
        assert_eq!(
            requests[0].auth,
            RequestAuth::Basic { username: "client".to_string(), password: "secret".to_string() }
        );
        assert_eq!(
            requests[0].body,
            RequestBody::Form(vec![("grant_type".to_string(), "client_credentials".to_string())])
        );
    }

    #[tokio::test]
    async fn valid_token_authenticates_lazily_and_reuses() {
        let (manager, transport, _) = manager(ScriptedTransport::new().respond(200, token_body("abc", 3600)));
        assert_eq!(manager.current_token().await, None);

        assert_eq!(manager.valid_token().await.unwrap(), "abc");
        assert_eq!(manager.valid_token().await.unwrap(), "abc");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn token_is_renewed_sixty_seconds_before_expiry() {
        let (manager, transport, clock) = manager(
            ScriptedTransport::new()
                .respond(200, token_body("first", 3600))
                .respond(200, token_body("second", 3600)),
        );
        assert_eq!(manager.valid_token().await.unwrap(), "first");

        clock.advance(3539);
        assert_eq!(manager.valid_token().await.unwrap(), "first");
        assert_eq!(transport.requests().len(), 1);

        clock.advance(1);
        assert_eq!(manager.valid_token().await.unwrap(), "second");
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn renewal_replaces_every_field() {
        let (manager, _, clock) = manager(
            ScriptedTransport::new()
                .respond(200, json!({"access_token": "old", "token_type": "Bearer", "expires_in": 120}))
                .respond(200, json!({"access_token": "new", "token_type": "bearer", "expires_in": 7200})),
        );
        manager.valid_token().await.unwrap();
        clock.advance(100);
        manager.valid_token().await.unwrap();

        let current = manager.current_token().await.unwrap();
        let renewed_at = start() + chrono::Duration::seconds(100);
        assert_eq!(
            current,
            AccessToken {
                access_token: "new".to_string(),
                token_type: "bearer".to_string(),
                expires_in: 7200,
                issued_at: renewed_at,
                expires_at: renewed_at + chrono::Duration::seconds(7200),
            }
        );
    }

    #[tokio::test]
    async fn rejected_credentials_carry_the_upstream_error() {
        let (manager, _, _) = manager(ScriptedTransport::new().respond(401, json!({"error": "invalid_client"})));

        let failure = manager.authenticate().await.unwrap_err();
        assert!(failure.to_string().contains("invalid_client"));
        assert_eq!(manager.current_token().await, None);
    }

    #[tokio::test]
    async fn failure_leaves_the_cached_token_alone() {
        let (manager, _, _) = manager(
            ScriptedTransport::new()
                .respond(200, token_body("abc", 3600))
                .fail("connection reset"),
        );
        manager.authenticate().await.unwrap();

        let failure = manager.authenticate().await.unwrap_err();
        assert_eq!(failure.message, "connection reset");
        assert_eq!(manager.current_token().await.unwrap().access_token, "abc");
    }

    #[tokio::test]
    async fn error_bodies_without_an_error_field_fall_back_to_the_status() {
        let (manager, _, _) = manager(ScriptedTransport::new().respond_raw(503, "<html>down</html>"));

        let failure = manager.valid_token().await.unwrap_err();
        assert_eq!(failure.message, "Request failed with status code 503");
    }

    #[tokio::test]
    async fn malformed_token_bodies_are_failures() {
        let (manager, _, _) = manager(ScriptedTransport::new().respond(200, json!({"token_type": "Bearer"})));

        let failure = manager.valid_token().await.unwrap_err();
        assert!(failure.message.starts_with("malformed token response"));
        assert_eq!(manager.current_token().await, None);
    }

    #[tokio::test]
    async fn unrepresentable_lifetimes_are_failures() {
        let (manager, _, _) = manager(
            ScriptedTransport::new()
                .respond(200, token_body("first", 3600))
                .respond(200, token_body("second", i64::MAX)),
        );
        manager.authenticate().await.unwrap();

        let failure = manager.authenticate().await.unwrap_err();
        assert_eq!(failure.message, "malformed token response: expires_in out of range");
        assert_eq!(manager.current_token().await.unwrap().access_token, "first");
    }

    #[tokio::test]
    async fn clearing_forces_a_new_exchange() {
        let (manager, transport, _) = manager(
            ScriptedTransport::new()
                .respond(200, token_body("first", 3600))
                .respond(200, token_body("second", 3600)),
        );
        manager.valid_token().await.unwrap();
        manager.clear_token().await;
        assert_eq!(manager.current_token().await, None);

        assert_eq!(manager.valid_token().await.unwrap(), "second");
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!("{:?}", Credential::new("client", "hunter2"));
        assert!(rendered.contains("client"));
        assert!(!rendered.contains("hunter2"));
    }
}
