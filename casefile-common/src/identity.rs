//! Caller identity as resolved by the upstream identity provider
//!
//! Authentication and role lookup happen outside Casefile. Services only
//! receive the resolved `{user_id, role}` pair and act on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Identifier of a user known to the identity provider
pub type UserId = i64;

/// User role, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    User,
    Editor,
    Analyst,
    Validator,
    Admin,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Guest,
        Role::User,
        Role::Editor,
        Role::Analyst,
        Role::Validator,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Editor => "editor",
            Role::Analyst => "analyst",
            Role::Validator => "validator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" => Ok(Role::Guest),
            "user" => Ok(Role::User),
            "editor" => Ok(Role::Editor),
            "analyst" => Ok(Role::Analyst),
            "validator" => Ok(Role::Validator),
            "admin" => Ok(Role::Admin),
            other => Err(Error::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}

/// The caller of an engine operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True if the actor's role is `floor` or more privileged
    pub fn has_at_least(&self, floor: Role) -> bool {
        self.role >= floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Guest < Role::User);
        assert!(Role::Editor < Role::Analyst);
        assert!(Role::Analyst < Role::Validator);
        assert!(Role::Validator < Role::Admin);
    }

    #[test]
    fn test_role_parse_roundtrip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!(" Analyst ".parse::<Role>().unwrap(), Role::Analyst);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_actor_floor() {
        let analyst = Actor::new(7, Role::Analyst);
        assert!(analyst.has_at_least(Role::Editor));
        assert!(analyst.has_at_least(Role::Analyst));
        assert!(!analyst.has_at_least(Role::Validator));
        assert!(!analyst.is_admin());
        assert!(Actor::new(1, Role::Admin).is_admin());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Validator).unwrap();
        assert_eq!(json, "\"validator\"");
    }
}
