use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Agent,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
}

impl User {
    pub fn is_agent(&self) -> bool {
        matches!(self.role, UserRole::Agent | UserRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}

/// Identity lookup consumed by the ticket core. Authentication and session
/// handling live elsewhere; the core only needs to resolve ids to users.
pub trait UserDirectory: Send + Sync {
    fn resolve(&self, id: Uuid) -> Option<User>;
}

/// In-process directory backed by a map. Production deployments swap in an
/// adapter over the real identity service.
#[derive(Default)]
pub struct StaticDirectory {
    users: RwLock<HashMap<Uuid, User>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, username: &str, email: &str, role: UserRole) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            role,
        };
        self.insert(user.clone());
        user
    }

    pub fn insert(&self, user: User) {
        self.users
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(user.id, user);
    }
}

impl UserDirectory for StaticDirectory {
    fn resolve(&self, id: Uuid) -> Option<User> {
        self.users
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
    }
}
