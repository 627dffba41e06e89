use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub kind: TicketKind,
    pub submitter_id: Uuid,
    pub assigned_developer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TicketPriority {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TicketStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TicketKind {
    #[serde(rename = "BUG/ERROR")]
    BugError,
    #[serde(rename = "NEW FEATURE")]
    NewFeature,
    #[serde(rename = "ENHANCEMENT")]
    Enhancement,
    #[serde(rename = "CHANGE")]
    Change,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BugError => "BUG/ERROR",
            Self::NewFeature => "NEW FEATURE",
            Self::Enhancement => "ENHANCEMENT",
            Self::Change => "CHANGE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BUG/ERROR" => Some(Self::BugError),
            "NEW FEATURE" => Some(Self::NewFeature),
            "ENHANCEMENT" => Some(Self::Enhancement),
            "CHANGE" => Some(Self::Change),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicketInput {
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub priority: TicketPriority,
    pub kind: TicketKind,
}

/// Full field set of the ticket update form. Every field is carried on
/// every update; only the assignee may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTicketInput {
    pub title: String,
    pub description: String,
    pub assigned_developer_id: Option<Uuid>,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub kind: TicketKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub comments: Vec<super::TicketComment>,
    pub history: Vec<super::TicketHistory>,
    pub files: Vec<super::TicketFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketCounts {
    pub by_status: Vec<(String, i64)>,
    pub by_kind: Vec<(String, i64)>,
}
