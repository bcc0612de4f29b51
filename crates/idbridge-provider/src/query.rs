//! Query criteria and cache keys.
//!
//! Every query shape doubles as the key of its cache. Keys hold only the
//! filter criteria; paging is applied to the cached full result, so
//! requesting another page of the same query is a cache hit.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::types::{Group, GroupType, User};

/// Criteria of a user query.
///
/// All set criteria must match. `*_like` criteria use `%` as wildcard and
/// compare case-insensitively. User ids and e-mail addresses also compare
/// ASCII case-insensitively, as the backend resolves them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UserQuery {
    pub id: Option<String>,
    pub ids: Option<BTreeSet<String>>,
    pub first_name: Option<String>,
    pub first_name_like: Option<String>,
    pub last_name: Option<String>,
    pub last_name_like: Option<String>,
    pub email: Option<String>,
    pub email_like: Option<String>,
    /// Only members of this group.
    pub group_id: Option<String>,
}

impl UserQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn first_name_like(mut self, pattern: impl Into<String>) -> Self {
        self.first_name_like = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn last_name(mut self, name: impl Into<String>) -> Self {
        self.last_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn last_name_like(mut self, pattern: impl Into<String>) -> Self {
        self.last_name_like = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn email_like(mut self, pattern: impl Into<String>) -> Self {
        self.email_like = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn member_of_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Returns `true` if `user` satisfies every criterion except group
    /// membership, which is resolved by the backend call.
    #[must_use]
    pub fn matches(&self, user: &User) -> bool {
        eq_ignore_case_opt(&self.id, &user.id)
            && self
                .ids
                .as_ref()
                .is_none_or(|ids| ids.iter().any(|id| id.eq_ignore_ascii_case(&user.id)))
            && eq_opt(&self.first_name, &user.first_name)
            && like_opt(&self.first_name_like, &user.first_name)
            && eq_opt(&self.last_name, &user.last_name)
            && like_opt(&self.last_name_like, &user.last_name)
            && eq_ignore_case_opt(&self.email, &user.email)
            && like_opt(&self.email_like, &user.email)
    }
}

/// Criteria of a group query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupQuery {
    pub id: Option<String>,
    pub ids: Option<BTreeSet<String>>,
    pub name: Option<String>,
    pub name_like: Option<String>,
    pub group_type: Option<GroupType>,
    /// Only groups this user is a member of.
    pub user_id: Option<String>,
}

impl GroupQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn name_like(mut self, pattern: impl Into<String>) -> Self {
        self.name_like = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn group_type(mut self, group_type: GroupType) -> Self {
        self.group_type = Some(group_type);
        self
    }

    #[must_use]
    pub fn member(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns `true` if `group` satisfies every criterion except
    /// membership.
    #[must_use]
    pub fn matches(&self, group: &Group) -> bool {
        eq_opt(&self.id, &group.id)
            && self.ids.as_ref().is_none_or(|ids| ids.contains(&group.id))
            && eq_opt(&self.name, &group.name)
            && like_opt(&self.name_like, &group.name)
            && self.group_type.is_none_or(|t| t == group.group_type)
    }
}

/// Cache key of a password check.
///
/// Holds a SHA-256 digest of the password, never the password itself.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CheckPasswordKey {
    user_id: String,
    password_digest: [u8; 32],
}

impl CheckPasswordKey {
    #[must_use]
    pub fn new(user_id: &str, password: &str) -> Self {
        let mut hasher = Sha256::new();
        // Salt with the user id so equal passwords of different users differ.
        hasher.update(user_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(password.as_bytes());
        Self {
            user_id: user_id.to_string(),
            password_digest: hasher.finalize().into(),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl std::fmt::Debug for CheckPasswordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckPasswordKey")
            .field("user_id", &self.user_id)
            .field("password_digest", &"***")
            .finish()
    }
}

/// Window applied to a query result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub first_result: usize,
    pub max_results: Option<usize>,
}

impl Page {
    /// The whole result.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(first_result: usize, max_results: usize) -> Self {
        Self {
            first_result,
            max_results: Some(max_results),
        }
    }

    /// Copies the selected window out of `items`.
    #[must_use]
    pub fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.first_result)
            .take(self.max_results.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

fn eq_opt(expected: &Option<String>, actual: &str) -> bool {
    expected.as_deref().is_none_or(|e| e == actual)
}

fn eq_ignore_case_opt(expected: &Option<String>, actual: &str) -> bool {
    expected.as_deref().is_none_or(|e| e.eq_ignore_ascii_case(actual))
}

fn like_opt(pattern: &Option<String>, actual: &str) -> bool {
    pattern.as_deref().is_none_or(|p| like(p, actual))
}

/// Case-insensitive match with `%` matching any run of characters.
#[must_use]
pub fn like(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let value = value.to_lowercase();

    let parts: Vec<&str> = pattern.split('%').collect();
    let [first, middle @ .., last] = parts.as_slice() else {
        return pattern == value;
    };

    if !value.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    for part in middle.iter().filter(|p| !p.is_empty()) {
        match value[pos..].find(part) {
            Some(offset) => pos += offset + part.len(),
            None => return false,
        }
    }
    value[pos..].ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn user(id: &str, first: &str, last: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.to_string(),
        }
    }

    #[test]
    fn test_like() {
        assert!(like("alice", "Alice"));
        assert!(!like("alice", "alice2"));
        assert!(like("al%", "alice"));
        assert!(like("%ce", "alice"));
        assert!(like("%li%", "alice"));
        assert!(like("a%i%e", "alice"));
        assert!(like("%", ""));
        assert!(like("%@example.com", "bob@EXAMPLE.com"));
        assert!(!like("a%x", "alice"));
        assert!(!like("ab%ba", "aba"));
    }

    #[test]
    fn test_user_query_keys() {
        let a = UserQuery::new().email_like("%@example.com").ids(["2", "1"]);
        let b = UserQuery::new().ids(["1", "2"]).email_like("%@example.com");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = UserQuery::new().email_like("%@example.org").ids(["1", "2"]);
        assert_ne!(a, c);
        assert_ne!(UserQuery::new().first_name("x"), UserQuery::new().last_name("x"));
    }

    #[test]
    fn test_user_query_matches() {
        let alice = user("1", "Alice", "Liddell", "alice@example.com");
        assert!(UserQuery::new().matches(&alice));
        assert!(UserQuery::new().id("1").matches(&alice));
        assert!(!UserQuery::new().id("2").matches(&alice));
        assert!(UserQuery::new().ids(["1", "3"]).matches(&alice));
        assert!(!UserQuery::new().first_name("alice").matches(&alice));
        assert!(UserQuery::new().first_name_like("al%").matches(&alice));
        assert!(
            UserQuery::new()
                .last_name("Liddell")
                .email_like("%@example.com")
                .matches(&alice)
        );
        assert!(!UserQuery::new().email("bob@example.com").matches(&alice));
        // Membership is resolved by the backend, not here.
        assert!(UserQuery::new().member_of_group("g1").matches(&alice));
    }

    #[test]
    fn test_user_ids_and_emails_ignore_case() {
        let alice = user("alice", "Alice", "Liddell", "alice@example.com");
        assert!(UserQuery::new().id("Alice").matches(&alice));
        assert!(UserQuery::new().ids(["ALICE", "bob"]).matches(&alice));
        assert!(UserQuery::new().email("Alice@Example.com").matches(&alice));
        assert!(!UserQuery::new().id("alicia").matches(&alice));
    }

    #[test]
    fn test_group_query_matches() {
        let admins = Group {
            id: "g1".to_string(),
            name: "Admins".to_string(),
            group_type: GroupType::System,
        };
        assert!(GroupQuery::new().name_like("adm%").matches(&admins));
        assert!(GroupQuery::new().group_type(GroupType::System).matches(&admins));
        assert!(!GroupQuery::new().group_type(GroupType::Standard).matches(&admins));
        assert!(!GroupQuery::new().ids(["g2"]).matches(&admins));
    }

    #[test]
    fn test_check_password_key() {
        let a = CheckPasswordKey::new("alice", "secret");
        assert_eq!(a, CheckPasswordKey::new("alice", "secret"));
        assert_eq!(hash_of(&a), hash_of(&CheckPasswordKey::new("alice", "secret")));
        assert_ne!(a, CheckPasswordKey::new("alice", "Secret"));
        assert_ne!(a, CheckPasswordKey::new("bob", "secret"));
        // The separator keeps ("ab", "c") and ("a", "bc") apart.
        assert_ne!(
            CheckPasswordKey::new("ab", "c"),
            CheckPasswordKey::new("a", "bc")
        );

        let debug = format!("{a:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_page_apply() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(Page::all().apply(&items), items);
        assert_eq!(Page::new(1, 2).apply(&items), vec![2, 3]);
        assert_eq!(Page::new(4, 10).apply(&items), vec![5]);
        assert!(Page::new(10, 1).apply(&items).is_empty());
    }
}
