//! Error types for the identity provider.
//!
//! Two families exist:
//!
//! - [`ProvisionError`] - raised once while the factory is constructed. A
//!   factory is never handed out when one of these occurs.
//! - [`ProviderError`] - raised by a single session call. These are never
//!   cached; the next call with the same inputs goes to the backend again.

use crate::config::ConfigError;
use crate::context::ContextError;

/// Fatal errors raised while building the factory.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Trust material could not be read or parsed.
    #[error("Invalid trust material: {0}")]
    TrustMaterial(String),

    /// The proxy settings could not be applied.
    #[error("Invalid proxy configuration: {0}")]
    Proxy(String),

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Errors raised by an individual identity query.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A network error occurred while talking to the backend.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// No connection slot became free within the acquire timeout.
    #[error("Timed out waiting for a free connection after {0:?}")]
    PoolTimeout(std::time::Duration),

    /// The backend answered with a non-success status.
    #[error("Backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The backend response could not be interpreted.
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// A backend URL could not be built.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// No authorization could be obtained for the backend call.
    #[error("Authorization failed: {0}")]
    Context(#[from] ContextError),
}

impl ProviderError {
    /// Creates a `Status` error, truncating long bodies.
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Self::Status { status, body }
    }

    /// Returns `true` if the backend rejected our service credential.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }

    /// Returns `true` if this error comes from the network or pool rather
    /// than from the backend's answer.
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Network(_) | Self::PoolTimeout(_))
    }
}

const MAX_ERROR_BODY: usize = 512;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = ProviderError::status(503, "maintenance");
        assert_eq!(err.to_string(), "Backend returned HTTP 503: maintenance");

        let err = ProviderError::PoolTimeout(Duration::from_secs(2));
        assert_eq!(
            err.to_string(),
            "Timed out waiting for a free connection after 2s"
        );

        let err = ProvisionError::TrustMaterial("bad pem".to_string());
        assert_eq!(err.to_string(), "Invalid trust material: bad pem");

        let err: ProvisionError = ConfigError::Missing("client_id".to_string()).into();
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_status_body_truncated() {
        let err = ProviderError::status(500, "é".repeat(600));
        let ProviderError::Status { body, .. } = err else {
            panic!("expected status error");
        };
        assert!(body.len() <= MAX_ERROR_BODY);
        assert!(body.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_error_predicates() {
        assert!(ProviderError::status(401, "").is_unauthorized());
        assert!(!ProviderError::status(403, "").is_unauthorized());
        assert!(ProviderError::PoolTimeout(Duration::from_secs(1)).is_transport_error());
        assert!(!ProviderError::InvalidResponse("x".to_string()).is_transport_error());
    }
}
