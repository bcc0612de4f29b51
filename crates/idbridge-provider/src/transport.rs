//! Shared HTTP transport.
//!
//! [`Transport::provision`] builds the single pooled client used by every
//! session of a factory. All security-relevant decisions (certificate trust,
//! proxy credentials) are made here once and never revisited per request.
//!
//! # Connection limit
//!
//! `reqwest` only bounds idle connections, so the transport additionally
//! holds a semaphore permit for every request/response exchange. A request
//! that cannot get a permit within `pool_acquire_timeout` fails with
//! [`ProviderError::PoolTimeout`].
//!
//! # Proxy credentials
//!
//! Proxy credentials are attached as `Proxy-Authorization` to requests sent
//! through the proxy only. Hosts listed in `no_proxy` are contacted directly
//! and never see them.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, NoProxy, Proxy, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::{Semaphore, SemaphorePermit};
use url::Url;

use crate::config::{ProxyConfig, TlsTrust, TransportConfig};
use crate::error::{ProviderError, ProvisionError};

/// Hook that modifies every outgoing request.
pub trait RequestInterceptor: Send + Sync {
    /// Returns the modified request.
    fn intercept(&self, request: RequestBuilder) -> RequestBuilder;
}

/// Interceptor adding a fixed set of headers.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders {
    headers: HeaderMap,
}

impl StaticHeaders {
    /// Creates an empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

impl RequestInterceptor for StaticHeaders {
    fn intercept(&self, request: RequestBuilder) -> RequestBuilder {
        request.headers(self.headers.clone())
    }
}

/// A decoded backend response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    status: StatusCode,
    body: String,
}

impl TransportResponse {
    /// HTTP status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response body decoded with the response's or the configured charset.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Fails with [`ProviderError::Status`] unless the status is 2xx.
    pub fn error_for_status(self) -> Result<Self, ProviderError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ProviderError::status(self.status.as_u16(), self.body))
        }
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProviderError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ProviderError::InvalidResponse(format!("malformed JSON body: {e}")))
    }
}

/// The pooled HTTP client shared by all sessions.
pub struct Transport {
    client: reqwest::Client,
    permits: Semaphore,
    max_connections: usize,
    acquire_timeout: Duration,
    charset: String,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("charset", &self.charset)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl Transport {
    /// Builds the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the settings fail [`TransportConfig::validate`]
    /// - the extra trust anchor cannot be read or parsed
    /// - the proxy URI is invalid
    /// - the TLS backend fails to initialize
    pub fn provision(
        config: &TransportConfig,
        interceptors: Vec<Arc<dyn RequestInterceptor>>,
    ) -> Result<Self, ProvisionError> {
        config.validate()?;
        let max_connections = config.max_connections;

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(max_connections);

        match config.tls_trust {
            TlsTrust::Validate => {}
            TlsTrust::AcceptAll => {
                tracing::warn!(
                    "TLS certificate validation is disabled; any certificate and host name will be accepted"
                );
                builder = builder
                    .danger_accept_invalid_certs(true)
                    .danger_accept_invalid_hostnames(true);
            }
        }

        if let Some(path) = &config.ca_certificate {
            let pem = std::fs::read(path).map_err(|e| {
                ProvisionError::TrustMaterial(format!("cannot read {}: {e}", path.display()))
            })?;
            let certificate = Certificate::from_pem(&pem).map_err(|e| {
                ProvisionError::TrustMaterial(format!("cannot parse {}: {e}", path.display()))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        builder = match &config.proxy {
            Some(proxy) => builder.proxy(build_proxy(proxy)?),
            // Ignore HTTP_PROXY and friends; only configured proxies are used.
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(ProvisionError::Client)?;

        tracing::info!(
            max_connections,
            tls_trust = ?config.tls_trust,
            proxy = config.proxy.is_some(),
            charset = %config.charset,
            "HTTP transport provisioned"
        );

        Ok(Self {
            client,
            permits: Semaphore::new(max_connections),
            max_connections,
            acquire_timeout: config.pool_acquire_timeout,
            charset: config.charset.clone(),
            interceptors,
        })
    }

    /// Starts a GET request.
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    /// Starts a POST request.
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Sends a request and reads the full body while holding a connection
    /// slot.
    ///
    /// Non-success statuses are returned, not raised; see
    /// [`TransportResponse::error_for_status`].
    pub async fn execute(&self, request: RequestBuilder) -> Result<TransportResponse, ProviderError> {
        let _permit = self.acquire().await?;

        let request = self
            .interceptors
            .iter()
            .fold(request, |request, interceptor| interceptor.intercept(request));

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Backend request failed");
            ProviderError::Network(e)
        })?;
        let status = response.status();
        let body = response.text_with_charset(&self.charset).await?;

        tracing::trace!(status = status.as_u16(), bytes = body.len(), "Backend response");
        Ok(TransportResponse { status, body })
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, ProviderError> {
        match tokio::time::timeout(self.acquire_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            _ => {
                tracing::warn!(
                    max_connections = self.max_connections,
                    "No free connection within {:?}",
                    self.acquire_timeout
                );
                Err(ProviderError::PoolTimeout(self.acquire_timeout))
            }
        }
    }

    /// Configured connection limit.
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Connection slots not currently in use.
    #[must_use]
    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }

    /// Charset used for bodies that declare none.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }
}

fn build_proxy(config: &ProxyConfig) -> Result<Proxy, ProvisionError> {
    let uri = Url::parse(&config.uri)
        .map_err(|e| ProvisionError::Proxy(format!("invalid proxy URI '{}': {e}", config.uri)))?;
    if !matches!(uri.scheme(), "http" | "https") {
        return Err(ProvisionError::Proxy(format!(
            "unsupported proxy scheme '{}'",
            uri.scheme()
        )));
    }
    if uri.host_str().is_none() {
        return Err(ProvisionError::Proxy(format!(
            "proxy URI '{}' has no host",
            config.uri
        )));
    }

    let mut proxy = Proxy::all(uri.as_str())
        .map_err(|e| ProvisionError::Proxy(format!("invalid proxy URI '{}': {e}", config.uri)))?;

    if let Some((user, password)) = config.credentials() {
        proxy = proxy.basic_auth(user, password);
    } else if config.username.is_some() {
        tracing::warn!("Proxy user configured without password; proxy authentication disabled");
    }

    if let Some(hosts) = config.no_proxy.as_deref() {
        proxy = proxy.no_proxy(NoProxy::from_string(hosts));
    }

    Ok(proxy)
}
