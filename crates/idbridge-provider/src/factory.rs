//! Identity session factory.
//!
//! The factory is the composition root. It is built once per host process
//! and owns every expensive resource: the pooled transport, the token
//! context and the three query caches. Sessions borrow them through `Arc`
//! handles.

use std::sync::Arc;

use crate::cache::{CheckPasswordCache, GroupQueryCache, UserQueryCache, create_cache};
use crate::config::IdentityConfig;
use crate::context::{ContextProvider, TokenContextProvider};
use crate::error::ProvisionError;
use crate::rest::AdminApi;
use crate::session::IdentitySession;
use crate::transport::{RequestInterceptor, Transport};

/// Long-lived owner of the shared transport and caches.
pub struct IdentityProviderFactory {
    config: Arc<IdentityConfig>,
    transport: Arc<Transport>,
    context: Arc<dyn ContextProvider>,
    api: Arc<AdminApi>,
    user_cache: UserQueryCache,
    group_cache: GroupQueryCache,
    password_cache: CheckPasswordCache,
}

impl std::fmt::Debug for IdentityProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProviderFactory")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl IdentityProviderFactory {
    /// Validates `config`, provisions the transport and creates the caches.
    ///
    /// No backend request is made here; the first token is requested by the
    /// first query.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the transport
    /// cannot be provisioned. No factory exists in that case.
    pub fn new(
        config: IdentityConfig,
        interceptors: Vec<Arc<dyn RequestInterceptor>>,
    ) -> Result<Self, ProvisionError> {
        config.validate()?;

        let transport = Arc::new(Transport::provision(&config.transport, interceptors)?);
        let context: Arc<dyn ContextProvider> = Arc::new(TokenContextProvider::new(
            Arc::clone(&transport),
            config.token_endpoint(),
            config.client_id.clone(),
            config.client_secret.clone(),
        ));

        let user_cache = create_cache(&config.cache);
        let group_cache = create_cache(&config.cache);
        let password_cache = create_cache(&config.login_cache);

        tracing::info!(
            admin_url = %config.admin_url,
            client_id = %config.client_id,
            user_id_attribute = ?config.user_id_attribute,
            directory_cache = config.cache.is_active(),
            login_cache = config.login_cache.is_active(),
            "Identity provider factory initialized"
        );

        let config = Arc::new(config);
        let api = Arc::new(AdminApi::new(
            Arc::clone(&transport),
            Arc::clone(&context),
            Arc::clone(&config),
        ));

        Ok(Self {
            config,
            transport,
            context,
            api,
            user_cache,
            group_cache,
            password_cache,
        })
    }

    /// Replaces the token context, e.g. with a pre-authorized one.
    #[must_use]
    pub fn with_context_provider(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.api = Arc::new(AdminApi::new(
            Arc::clone(&self.transport),
            Arc::clone(&context),
            Arc::clone(&self.config),
        ));
        self.context = context;
        self
    }

    /// Opens a session over the shared resources.
    #[must_use]
    pub fn open_session(&self) -> IdentitySession {
        IdentitySession::new(
            Arc::clone(&self.api),
            Arc::clone(&self.user_cache),
            Arc::clone(&self.group_cache),
            Arc::clone(&self.password_cache),
        )
    }

    /// Drops every cached result of all three caches.
    pub fn clear_cache(&self) {
        self.user_cache.clear();
        self.group_cache.clear();
        self.password_cache.clear();
        tracing::debug!("Identity caches cleared");
    }

    /// Replaces the user query cache for sessions opened afterwards.
    pub fn set_user_query_cache(&mut self, cache: UserQueryCache) {
        self.user_cache = cache;
    }

    /// Replaces the group query cache for sessions opened afterwards.
    pub fn set_group_query_cache(&mut self, cache: GroupQueryCache) {
        self.group_cache = cache;
    }

    /// Replaces the password check cache for sessions opened afterwards.
    pub fn set_check_password_cache(&mut self, cache: CheckPasswordCache) {
        self.password_cache = cache;
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// Token context shared by all sessions.
    #[must_use]
    pub fn context_provider(&self) -> &Arc<dyn ContextProvider> {
        &self.context
    }

    /// Transport shared by all sessions.
    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{LruQueryCache, QueryCache};
    use crate::config::{CacheConfig, TlsTrust};
    use crate::query::UserQuery;
    use crate::types::User;
    use std::time::Duration;

    fn config() -> IdentityConfig {
        IdentityConfig {
            client_id: "engine".to_string(),
            client_secret: "secret".to_string(),
            ..IdentityConfig::default()
        }
    }

    fn alice() -> User {
        User {
            id: "alice".to_string(),
            first_name: "Alice".to_string(),
            last_name: String::new(),
            email: "alice@example.com".to_string(),
        }
    }

    #[test]
    fn test_invalid_config_yields_no_factory() {
        let err = IdentityProviderFactory::new(IdentityConfig::default(), Vec::new()).unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn test_bad_trust_material_yields_no_factory() {
        let mut config = config();
        config.transport.tls_trust = TlsTrust::AcceptAll;
        config.transport.ca_certificate = Some("/nonexistent/ca.pem".into());
        let err = IdentityProviderFactory::new(config, Vec::new()).unwrap_err();
        assert!(matches!(err, ProvisionError::TrustMaterial(_)));
    }

    #[test]
    fn test_sessions_share_resources() {
        let factory = IdentityProviderFactory::new(config(), Vec::new()).unwrap();
        let before = Arc::strong_count(factory.transport());

        let sessions: Vec<_> = (0..100).map(|_| factory.open_session()).collect();
        // Sessions reach the transport through the shared API handle only.
        assert_eq!(Arc::strong_count(factory.transport()), before);
        assert_eq!(Arc::strong_count(&factory.api), sessions.len() + 1);
        assert_eq!(factory.transport().max_connections(), 50);
    }

    #[test]
    fn test_clear_cache_clears_all_instances() {
        let mut factory = IdentityProviderFactory::new(config(), Vec::new()).unwrap();
        let users: UserQueryCache = Arc::new(LruQueryCache::new(10, None));
        let passwords: CheckPasswordCache = Arc::new(LruQueryCache::new(10, None));
        factory.set_user_query_cache(Arc::clone(&users));
        factory.set_check_password_cache(Arc::clone(&passwords));

        users.put(UserQuery::new().id("alice"), vec![alice()]);
        passwords.put(crate::query::CheckPasswordKey::new("alice", "pw"), true);

        factory.clear_cache();
        assert!(users.is_empty());
        assert!(passwords.is_empty());
    }

    #[tokio::test]
    async fn test_injected_cache_answers_without_backend() {
        let mut factory = IdentityProviderFactory::new(config(), Vec::new()).unwrap();
        let users: UserQueryCache = Arc::new(LruQueryCache::new(10, Some(Duration::from_secs(60))));
        users.put(UserQuery::new().id("alice"), vec![alice()]);
        factory.set_user_query_cache(users);

        // The configured backend is unreachable; only the cache can answer.
        let session = factory.open_session();
        let found = session.find_user_by_id("alice").await.unwrap();
        assert_eq!(found, Some(alice()));
    }

    #[test]
    fn test_disabled_cache_config_produces_pass_through() {
        let mut config = config();
        config.cache = CacheConfig::disabled();
        let factory = IdentityProviderFactory::new(config, Vec::new()).unwrap();

        factory.user_cache.put(UserQuery::new(), vec![alice()]);
        assert!(factory.user_cache.get(&UserQuery::new()).is_none());
    }
}
