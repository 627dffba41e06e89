use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub is_demo: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The four fixed user roles. Every role maps to exactly one
/// permission group via the role registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "AD")]
    Administrator,
    #[serde(rename = "PM")]
    ProjectManager,
    #[serde(rename = "DV")]
    Developer,
    #[serde(rename = "SM")]
    Submitter,
}

impl Role {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Administrator => "AD",
            Self::ProjectManager => "PM",
            Self::Developer => "DV",
            Self::Submitter => "SM",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "AD" => Some(Self::Administrator),
            "PM" => Some(Self::ProjectManager),
            "DV" => Some(Self::Developer),
            "SM" => Some(Self::Submitter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserInput {
    pub username: String,
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_demo: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRolesInput {
    pub user_ids: Vec<Uuid>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}
