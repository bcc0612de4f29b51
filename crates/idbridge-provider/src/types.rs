//! Domain records returned to callers.

use serde::{Deserialize, Serialize};

/// A user as seen by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id, taken from the configured backend attribute.
    pub id: String,
    /// Given name, empty when unknown.
    pub first_name: String,
    /// Family name, empty when unknown.
    pub last_name: String,
    /// E-mail address, empty when unknown.
    pub email: String,
}

/// Kind of group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    /// The configured administrator group.
    System,
    /// Any other group.
    Standard,
}

impl GroupType {
    /// Returns the string form used in output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Standard => "standard",
        }
    }
}

impl std::fmt::Display for GroupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A group as seen by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group id, or the group path when paths are used as ids.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Kind of group.
    pub group_type: GroupType,
}
