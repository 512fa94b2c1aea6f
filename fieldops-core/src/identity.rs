use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Roles issued by the identity provider. Older tokens carry `user` for
/// clients, so it is accepted as an alias.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Dispatcher,
    Technician,
    #[serde(alias = "user")]
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Dispatcher => "dispatcher",
            Role::Technician => "technician",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "dispatcher" => Ok(Role::Dispatcher),
            "technician" => Ok(Role::Technician),
            "client" | "user" => Ok(Role::Client),
            other => Err(CoreError::Validation(format!("Unknown role '{}'", other))),
        }
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

/// Read access to the user/role registry owned by the identity collaborator.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: Uuid) -> CoreResult<Option<UserRecord>>;

    /// Resolve `id` and require it to hold `role`. Missing users and role
    /// mismatches are both reported as NotFound, e.g. "Technician ... not found".
    async fn require_role(&self, id: Uuid, role: Role) -> CoreResult<UserRecord> {
        match self.find_user(id).await? {
            Some(user) if user.role == role => Ok(user),
            _ => Err(CoreError::NotFound(format!(
                "{} {} not found",
                capitalize(role.as_str()),
                id
            ))),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_is_an_alias_for_client() {
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::Client);
        assert_eq!("user".parse::<Role>().unwrap(), Role::Client);
        assert_eq!(serde_json::to_string(&Role::Client).unwrap(), "\"client\"");
    }

    #[test]
    fn test_unknown_role_is_a_validation_error() {
        assert!(matches!("marketer".parse::<Role>(), Err(CoreError::Validation(_))));
    }
}
