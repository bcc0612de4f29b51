//! # idbridge-provider
//!
//! Caching, read-only identity lookups against a Keycloak-style realm.
//!
//! This crate provides:
//! - One pooled HTTP transport with configurable certificate trust, proxy
//!   and connection limit
//! - Bounded LRU query caches with time-to-live, one per query shape
//! - Bearer token handling for the realm's admin API
//! - Cheap per-unit-of-work sessions over those shared resources
//!
//! ## Overview
//!
//! Build an [`IdentityProviderFactory`] once, then open an
//! [`IdentitySession`] whenever lookups are needed:
//!
//! ```ignore
//! use idbridge_provider::prelude::*;
//!
//! let factory = IdentityProviderFactory::new(config, Vec::new())?;
//! let session = factory.open_session();
//! let admins = session
//!     .find_users(&UserQuery::new().member_of_group("admins"), Page::all())
//!     .await?;
//! let valid = session.check_password("alice", "secret").await?;
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Provider configuration and loader
//! - [`transport`] - Shared HTTP transport
//! - [`cache`] - Query cache abstraction and implementations
//! - [`context`] - Admin API access token provider
//! - [`factory`] - Composition root owning the shared resources
//! - [`session`] - Cached query facade
//! - [`query`] - Query criteria, cache keys and paging
//! - [`types`] - Users and groups

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod factory;
pub mod query;
mod rest;
pub mod session;
pub mod transport;
pub mod types;

pub use cache::{CheckPasswordCache, GroupQueryCache, QueryCache, UserQueryCache};
pub use config::{CacheConfig, ConfigError, IdentityConfig, TlsTrust, UserIdAttribute};
pub use context::{ContextError, ContextProvider, TokenContextProvider};
pub use error::{ProviderError, ProvisionError};
pub use factory::IdentityProviderFactory;
pub use query::{CheckPasswordKey, GroupQuery, Page, UserQuery};
pub use session::IdentitySession;
pub use transport::{RequestInterceptor, StaticHeaders, Transport};
pub use types::{Group, GroupType, User};

/// Type alias for identity lookup results.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use idbridge_provider::prelude::*;
/// ```
pub mod prelude {
    pub use crate::ProviderResult;
    pub use crate::config::{CacheConfig, IdentityConfig, TlsTrust, UserIdAttribute};
    pub use crate::error::{ProviderError, ProvisionError};
    pub use crate::factory::IdentityProviderFactory;
    pub use crate::query::{GroupQuery, Page, UserQuery};
    pub use crate::session::IdentitySession;
    pub use crate::types::{Group, GroupType, User};
}
