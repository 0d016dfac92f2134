//! Account holder type.

use serde::{Deserialize, Serialize};

use super::email::Email;

/// An account holder known to the backend.
///
/// Identity key is the display name; the application assumes names are
/// unique. Users are replaced wholesale on every data refresh, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Display name, unique across the user list.
    pub name: String,
    /// Email address the backend bills purchases to.
    pub email: Email,
}

impl User {
    /// Create a new user record.
    #[must_use]
    pub const fn new(name: String, email: Email) -> Self {
        Self { name, email }
    }
}

impl PartialOrd for User {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for User {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}
