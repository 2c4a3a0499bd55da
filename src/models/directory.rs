//! People and organisational structure the approval workflow routes through.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{CategoryId, DepartmentId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Executive,
    HeadOfDepartment,
    LineManager,
    Agent,
    Requester,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Executive => "executive",
            Role::HeadOfDepartment => "head_of_department",
            Role::LineManager => "line_manager",
            Role::Agent => "agent",
            Role::Requester => "requester",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "executive" => Ok(Role::Executive),
            "head_of_department" | "hod" => Ok(Role::HeadOfDepartment),
            "line_manager" | "lm" => Ok(Role::LineManager),
            "agent" => Ok(Role::Agent),
            "requester" | "user" => Ok(Role::Requester),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    /// Line manager who signs off this user's requests
    #[serde(default)]
    pub manager_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    #[serde(default)]
    pub head_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub requires_approval: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_aliases() {
        assert_eq!("hod".parse::<Role>(), Ok(Role::HeadOfDepartment));
        assert_eq!("LM".parse::<Role>(), Ok(Role::LineManager));
        assert_eq!("user".parse::<Role>(), Ok(Role::Requester));
        assert!("janitor".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::HeadOfDepartment).unwrap();
        assert_eq!(json, "\"head_of_department\"");
    }
}
