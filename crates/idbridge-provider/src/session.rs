//! Per-unit-of-work identity session.
//!
//! A session is a handle onto resources owned by the factory. Opening one
//! performs no I/O and allocates nothing beyond a few reference counts; it
//! can be cloned and shared between tasks.

use std::sync::Arc;

use crate::ProviderResult;
use crate::cache::{CheckPasswordCache, GroupQueryCache, UserQueryCache};
use crate::query::{CheckPasswordKey, GroupQuery, Page, UserQuery};
use crate::rest::AdminApi;
use crate::types::{Group, User};

/// Read-only identity lookups, answered from cache when possible.
///
/// Every query first consults its cache. On a miss the backend is called,
/// the full result is stored and the requested [`Page`] is cut from it.
/// Failed calls are never cached.
#[derive(Clone)]
pub struct IdentitySession {
    api: Arc<AdminApi>,
    user_cache: UserQueryCache,
    group_cache: GroupQueryCache,
    password_cache: CheckPasswordCache,
}

impl std::fmt::Debug for IdentitySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySession")
            .field("cached_user_queries", &self.user_cache.len())
            .field("cached_group_queries", &self.group_cache.len())
            .field("cached_password_checks", &self.password_cache.len())
            .finish()
    }
}

impl IdentitySession {
    pub(crate) fn new(
        api: Arc<AdminApi>,
        user_cache: UserQueryCache,
        group_cache: GroupQueryCache,
        password_cache: CheckPasswordCache,
    ) -> Self {
        Self {
            api,
            user_cache,
            group_cache,
            password_cache,
        }
    }

    /// Returns the page of users matching `query`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns the backend or transport error of a cache miss.
    pub async fn find_users(&self, query: &UserQuery, page: Page) -> ProviderResult<Vec<User>> {
        let users = self.all_users(query).await?;
        Ok(page.apply(&users))
    }

    /// Returns the page of groups matching `query`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns the backend or transport error of a cache miss.
    pub async fn find_groups(&self, query: &GroupQuery, page: Page) -> ProviderResult<Vec<Group>> {
        let groups = self.all_groups(query).await?;
        Ok(page.apply(&groups))
    }

    /// Looks up a single user by the configured id attribute.
    pub async fn find_user_by_id(&self, id: &str) -> ProviderResult<Option<User>> {
        let users = self.all_users(&UserQuery::new().id(id)).await?;
        Ok(users.into_iter().next())
    }

    /// Looks up a single group by id, or by path when paths are ids.
    pub async fn find_group_by_id(&self, id: &str) -> ProviderResult<Option<Group>> {
        let groups = self.all_groups(&GroupQuery::new().id(id)).await?;
        Ok(groups.into_iter().next())
    }

    /// Number of users matching `query`.
    pub async fn count_users(&self, query: &UserQuery) -> ProviderResult<usize> {
        Ok(self.all_users(query).await?.len())
    }

    /// Number of groups matching `query`.
    pub async fn count_groups(&self, query: &GroupQuery) -> ProviderResult<usize> {
        Ok(self.all_groups(query).await?.len())
    }

    /// Checks a password.
    ///
    /// An empty user id or password is rejected without contacting the
    /// backend. Unknown users and wrong passwords yield `Ok(false)`; both
    /// outcomes are cached in the login cache when it is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend could not give an answer. Errors
    /// are not cached, so a later call retries.
    pub async fn check_password(&self, user_id: &str, password: &str) -> ProviderResult<bool> {
        if user_id.is_empty() || password.is_empty() {
            return Ok(false);
        }

        let key = CheckPasswordKey::new(user_id, password);
        if let Some(valid) = self.password_cache.get(&key) {
            tracing::debug!(cache = "check_password", user_id, "Cache hit");
            return Ok(valid);
        }
        tracing::debug!(cache = "check_password", user_id, "Cache miss");

        let valid = self.api.check_password(user_id, password).await?;
        self.password_cache.put(key, valid);
        Ok(valid)
    }

    async fn all_users(&self, query: &UserQuery) -> ProviderResult<Vec<User>> {
        if let Some(users) = self.user_cache.get(query) {
            tracing::debug!(cache = "user", results = users.len(), "Cache hit");
            return Ok(users);
        }
        tracing::debug!(cache = "user", "Cache miss");

        let users = self.api.search_users(query).await?;
        self.user_cache.put(query.clone(), users.clone());
        Ok(users)
    }

    async fn all_groups(&self, query: &GroupQuery) -> ProviderResult<Vec<Group>> {
        if let Some(groups) = self.group_cache.get(query) {
            tracing::debug!(cache = "group", results = groups.len(), "Cache hit");
            return Ok(groups);
        }
        tracing::debug!(cache = "group", "Cache miss");

        let groups = self.api.search_groups(query).await?;
        self.group_cache.put(query.clone(), groups.clone());
        Ok(groups)
    }
}
