//! Admin REST API of the identity backend.
//!
//! Thin typed layer over [`Transport`]: builds endpoint URLs, attaches the
//! bearer token, maps JSON representations to [`User`] and [`Group`] and
//! re-applies query criteria the backend cannot express.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::{IdentityConfig, UserIdAttribute};
use crate::context::ContextProvider;
use crate::error::ProviderError;
use crate::query::{GroupQuery, UserQuery};
use crate::transport::Transport;
use crate::types::{Group, GroupType, User};

/// User as returned by the admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserRepresentation {
    pub id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Group as returned by the admin API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GroupRepresentation {
    pub id: String,
    pub name: String,
    pub path: Option<String>,
    #[serde(default)]
    pub sub_groups: Vec<GroupRepresentation>,
}

/// Admin API client bound to one realm.
pub(crate) struct AdminApi {
    transport: Arc<Transport>,
    context: Arc<dyn ContextProvider>,
    config: Arc<IdentityConfig>,
}

impl AdminApi {
    pub fn new(
        transport: Arc<Transport>,
        context: Arc<dyn ContextProvider>,
        config: Arc<IdentityConfig>,
    ) -> Self {
        Self {
            transport,
            context,
            config,
        }
    }

    /// Users matching `query`, ordered by id.
    pub async fn search_users(&self, query: &UserQuery) -> Result<Vec<User>, ProviderError> {
        let representations = if let Some(group_id) = &query.group_id {
            self.group_members(group_id).await?
        } else if let Some(id) = &query.id {
            self.user_by_host_id(id).await?.into_iter().collect()
        } else {
            let url = self.admin_url(&["users"])?;
            self.get_json(url, &user_search_params(query, self.config.max_result_size))
                .await?
                .unwrap_or_default()
        };

        let mut users: Vec<User> = representations
            .into_iter()
            .filter_map(|rep| self.to_user(rep))
            .filter(|user| query.matches(user))
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users.dedup_by(|a, b| a.id == b.id);
        Ok(users)
    }

    /// Groups matching `query`, ordered by id.
    pub async fn search_groups(&self, query: &GroupQuery) -> Result<Vec<Group>, ProviderError> {
        let representations = if let Some(user_id) = &query.user_id {
            self.user_groups(user_id).await?
        } else if let Some(id) = &query.id {
            self.group_by_host_id(id).await?.into_iter().collect()
        } else {
            let url = self.admin_url(&["groups"])?;
            let params = [
                ("max", self.config.max_result_size.to_string()),
                ("briefRepresentation", "false".to_string()),
            ];
            let top_level: Vec<GroupRepresentation> =
                self.get_json(url, &params).await?.unwrap_or_default();
            if self.config.flatten_subgroups {
                flatten(top_level)
            } else {
                top_level
            }
        };

        let mut groups: Vec<Group> = representations
            .into_iter()
            .map(|rep| self.to_group(rep))
            .filter(|group| query.matches(group))
            .collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        groups.dedup_by(|a, b| a.id == b.id);
        Ok(groups)
    }

    /// Verifies a password with the resource-owner password grant.
    ///
    /// Returns `Ok(false)` for unknown users and rejected credentials.
    pub async fn check_password(&self, user_id: &str, password: &str) -> Result<bool, ProviderError> {
        let username = match self.config.user_id_attribute {
            UserIdAttribute::Username => user_id.to_string(),
            UserIdAttribute::Id | UserIdAttribute::Email => {
                match self.user_by_host_id(user_id).await?.and_then(|rep| rep.username) {
                    Some(username) => username,
                    None => {
                        tracing::debug!(user_id, "Password check for unknown user");
                        return Ok(false);
                    }
                }
            }
        };

        let form = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", username.as_str()),
            ("password", password),
        ];
        let endpoint = self.config.token_endpoint();
        let response = self
            .transport
            .execute(self.transport.post(&endpoint).form(&form))
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
                if oauth_error(response.body()).as_deref() == Some("invalid_grant") =>
            {
                tracing::debug!(user_id, status = response.status().as_u16(), "Password rejected");
                Ok(false)
            }
            // Client errors such as invalid_client say nothing about the password.
            status => {
                tracing::warn!(
                    status = status.as_u16(),
                    error = oauth_error(response.body()).as_deref().unwrap_or("-"),
                    "Password grant failed"
                );
                Err(ProviderError::status(status.as_u16(), response.body()))
            }
        }
    }

    async fn user_by_host_id(&self, id: &str) -> Result<Option<UserRepresentation>, ProviderError> {
        match self.config.user_id_attribute {
            UserIdAttribute::Id => self.get_json(self.admin_url(&["users", id])?, &[]).await,
            UserIdAttribute::Username => self.find_user_exact("username", id).await,
            UserIdAttribute::Email => self.find_user_exact("email", id).await,
        }
    }

    async fn find_user_exact(
        &self,
        attribute: &str,
        value: &str,
    ) -> Result<Option<UserRepresentation>, ProviderError> {
        let params = [(attribute, value.to_string()), ("exact", "true".to_string())];
        let candidates: Vec<UserRepresentation> = self
            .get_json(self.admin_url(&["users"])?, &params)
            .await?
            .unwrap_or_default();

        Ok(candidates.into_iter().find(|rep| {
            let field = match attribute {
                "username" => rep.username.as_deref(),
                _ => rep.email.as_deref(),
            };
            field.is_some_and(|f| f.eq_ignore_ascii_case(value))
        }))
    }

    async fn group_by_host_id(&self, id: &str) -> Result<Option<GroupRepresentation>, ProviderError> {
        let url = if self.config.group_path_as_id {
            let mut segments = vec!["group-by-path"];
            segments.extend(id.split('/').filter(|s| !s.is_empty()));
            self.admin_url(&segments)?
        } else {
            self.admin_url(&["groups", id])?
        };
        self.get_json(url, &[]).await
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<UserRepresentation>, ProviderError> {
        let Some(group) = self.group_by_host_id(group_id).await? else {
            return Ok(Vec::new());
        };
        let url = self.admin_url(&["groups", group.id.as_str(), "members"])?;
        let params = [("max", self.config.max_result_size.to_string())];
        Ok(self.get_json(url, &params).await?.unwrap_or_default())
    }

    async fn user_groups(&self, user_id: &str) -> Result<Vec<GroupRepresentation>, ProviderError> {
        let Some(user) = self.user_by_host_id(user_id).await? else {
            return Ok(Vec::new());
        };
        let url = self.admin_url(&["users", user.id.as_str(), "groups"])?;
        let params = [
            ("max", self.config.max_result_size.to_string()),
            ("briefRepresentation", "false".to_string()),
        ];
        Ok(self.get_json(url, &params).await?.unwrap_or_default())
    }

    /// Authorized GET. `404` maps to `None`; `401` drops the cached token.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> Result<Option<T>, ProviderError> {
        let token = self.context.access_token().await?;
        let request = self
            .transport
            .get(url.as_str())
            .bearer_auth(token)
            .query(params);

        tracing::debug!(path = url.path(), "Admin API request");
        let response = self.transport.execute(request).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED => {
                tracing::warn!(path = url.path(), "Admin API rejected the access token");
                self.context.invalidate().await;
                Err(ProviderError::status(401, response.body()))
            }
            _ => response.error_for_status()?.json().map(Some),
        }
    }

    fn admin_url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.config.admin_url)
            .map_err(|e| ProviderError::InvalidUrl(format!("{}: {e}", self.config.admin_url)))?;
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                ProviderError::InvalidUrl(format!("{} cannot be a base", self.config.admin_url))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn to_user(&self, rep: UserRepresentation) -> Option<User> {
        let id = match self.config.user_id_attribute {
            UserIdAttribute::Id => Some(rep.id),
            UserIdAttribute::Username => rep.username,
            UserIdAttribute::Email => rep.email.clone(),
        }?;
        Some(User {
            id,
            first_name: rep.first_name.unwrap_or_default(),
            last_name: rep.last_name.unwrap_or_default(),
            email: rep.email.unwrap_or_default(),
        })
    }

    fn to_group(&self, rep: GroupRepresentation) -> Group {
        let id = if self.config.group_path_as_id {
            rep.path.unwrap_or_else(|| format!("/{}", rep.name))
        } else {
            rep.id
        };
        let group_type = match self.config.administrator_group.as_deref() {
            Some(admin) if admin == rep.name || admin == id => GroupType::System,
            _ => GroupType::Standard,
        };
        Group {
            id,
            name: rep.name,
            group_type,
        }
    }
}

/// Query parameters for `/users`. Exact criteria are sent with
/// `exact=true`; without any, `like` patterns are sent as infix searches.
/// Results are always filtered again client-side.
fn user_search_params(query: &UserQuery, max: usize) -> Vec<(&'static str, String)> {
    let mut params = vec![("max", max.to_string())];

    let exact = [
        ("firstName", &query.first_name),
        ("lastName", &query.last_name),
        ("email", &query.email),
    ];
    if exact.iter().any(|(_, v)| v.is_some()) {
        params.extend(exact.into_iter().filter_map(|(k, v)| v.clone().map(|v| (k, v))));
        params.push(("exact", "true".to_string()));
        return params;
    }

    let like = [
        ("firstName", &query.first_name_like),
        ("lastName", &query.last_name_like),
        ("email", &query.email_like),
    ];
    for (key, pattern) in like {
        // Only a single literal run can be forwarded as an infix search.
        if let Some(term) = pattern.as_deref().and_then(infix_term) {
            params.push((key, term));
        }
    }
    params
}

/// The `error` code of an OAuth error response, if the body is one.
fn oauth_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct OAuthError {
        error: String,
    }
    serde_json::from_str::<OAuthError>(body).ok().map(|e| e.error)
}

fn infix_term(pattern: &str) -> Option<String> {
    let mut parts = pattern.split('%').filter(|p| !p.is_empty());
    let term = parts.next()?;
    parts.next().is_none().then(|| term.to_string())
}

fn flatten(groups: Vec<GroupRepresentation>) -> Vec<GroupRepresentation> {
    let mut flat = Vec::new();
    let mut stack = groups;
    while let Some(mut group) = stack.pop() {
        stack.append(&mut group.sub_groups);
        flat.push(group);
    }
    flat
}
