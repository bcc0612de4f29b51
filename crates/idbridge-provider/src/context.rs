//! Backend authorization context.
//!
//! Admin API calls carry a bearer token obtained with the client-credentials
//! grant. The [`TokenContextProvider`] keeps one token for the whole
//! factory and renews it shortly before it expires, preferring the refresh
//! token when the backend issued one.
//!
//! Renewal is single-flight: callers queue on one lock while a token
//! request is in flight and then reuse its result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::ProviderError;
use crate::transport::Transport;

/// Tokens are renewed this long before they expire.
const EXPIRY_SKEW: Duration = Duration::from_secs(5);

/// Errors raised while obtaining an access token.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The token endpoint could not be reached.
    #[error("Token request failed: {0}")]
    Transport(#[source] Box<ProviderError>),

    /// The token endpoint rejected the client.
    #[error("Token request rejected with HTTP {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The token response could not be parsed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for ContextError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status { status, body } => Self::Rejected { status, body },
            ProviderError::InvalidResponse(msg) => Self::InvalidResponse(msg),
            other => Self::Transport(Box::new(other)),
        }
    }
}

/// Source of the bearer token for admin API calls.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Returns a currently valid access token.
    async fn access_token(&self) -> Result<String, ContextError>;

    /// Drops the current token so the next call obtains a new one.
    async fn invalidate(&self);
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    refresh_token: Option<String>,
    refresh_expires_in: Option<u64>,
}

fn default_expires_in() -> u64 {
    60
}

fn expiry(issued_at: Instant, field: &str, secs: u64) -> Result<Instant, ContextError> {
    issued_at
        .checked_add(Duration::from_secs(secs))
        .ok_or_else(|| ContextError::InvalidResponse(format!("{field} out of range: {secs}")))
}

/// A token with its expiry instants.
struct AccessContext {
    access_token: String,
    expires_at: Instant,
    refresh_token: Option<String>,
    refresh_expires_at: Option<Instant>,
}

impl AccessContext {
    fn from_response(response: TokenResponse, issued_at: Instant) -> Result<Self, ContextError> {
        let refresh_expires_at = match response.refresh_expires_in {
            Some(secs) => Some(expiry(issued_at, "refresh_expires_in", secs)?),
            None => None,
        };
        Ok(Self {
            expires_at: expiry(issued_at, "expires_in", response.expires_in)?,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            refresh_expires_at,
        })
    }

    fn is_valid(&self, now: Instant) -> bool {
        now + EXPIRY_SKEW < self.expires_at
    }

    /// Refresh token that is still usable. A refresh token without a
    /// reported lifetime is tried once and replaced on failure.
    fn usable_refresh_token(&self, now: Instant) -> Option<&str> {
        let token = self.refresh_token.as_deref()?;
        match self.refresh_expires_at {
            Some(at) if now + EXPIRY_SKEW >= at => None,
            _ => Some(token),
        }
    }
}

/// Client-credentials token provider shared by all sessions of a factory.
pub struct TokenContextProvider {
    transport: Arc<Transport>,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    current: Mutex<Option<AccessContext>>,
}

impl TokenContextProvider {
    /// Creates a provider. No request is made until the first token is
    /// needed.
    #[must_use]
    pub fn new(
        transport: Arc<Transport>,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            current: Mutex::new(None),
        }
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<AccessContext, ContextError> {
        let issued_at = Instant::now();
        let response = self
            .transport
            .execute(self.transport.post(&self.token_endpoint).form(params))
            .await?
            .error_for_status()?;
        let token: TokenResponse = response.json()?;
        AccessContext::from_response(token, issued_at)
    }

    async fn client_credentials(&self) -> Result<AccessContext, ContextError> {
        tracing::debug!(client_id = %self.client_id, "Requesting access token");
        self.request_token(&[
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AccessContext, ContextError> {
        tracing::debug!(client_id = %self.client_id, "Refreshing access token");
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }
}

#[async_trait]
impl ContextProvider for TokenContextProvider {
    async fn access_token(&self) -> Result<String, ContextError> {
        let mut current = self.current.lock().await;
        let now = Instant::now();

        if let Some(context) = current.as_ref() {
            if context.is_valid(now) {
                return Ok(context.access_token.clone());
            }
        }

        let refreshed = match current.as_ref().and_then(|c| c.usable_refresh_token(now)) {
            Some(refresh_token) => match self.refresh(refresh_token).await {
                Ok(context) => Some(context),
                Err(e) => {
                    tracing::warn!(error = %e, "Token refresh failed, requesting a new token");
                    None
                }
            },
            None => None,
        };

        let context = match refreshed {
            Some(context) => context,
            None => self.client_credentials().await.inspect_err(|e| {
                tracing::warn!(error = %e, "Failed to obtain access token");
            })?,
        };

        let token = context.access_token.clone();
        *current = Some(context);
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.current.lock().await = None;
        tracing::debug!("Access token invalidated");
    }
}
