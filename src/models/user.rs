use serde::{Deserialize, Serialize};

/// A user record in the mock store.
///
/// Records are append-only for the lifetime of a store: never edited,
/// never deleted. IDs are unique and monotonic within one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl User {
    /// One-line summary for list rendering: "name - email (role)"
    pub fn display_line(&self) -> String {
        format!("{} - {} ({})", self.name, self.email, self.role)
    }
}

/// Input for the add-user mutation. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: String,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role: role.into(),
        }
    }
}
