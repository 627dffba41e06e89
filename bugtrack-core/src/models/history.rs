use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit record for a tracked-field change on a ticket.
/// Rows are written only by the ticket update path, never directly.
/// Both value sides are nullable: an assignment row has a NULL prev
/// side on first assignment and a NULL new side when cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketHistory {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub action: HistoryAction,
    pub prev_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HistoryAction {
    #[serde(rename = "ASSIGNED_TO_USER")]
    AssignedToUser,
    #[serde(rename = "STATUS_UPDATED")]
    StatusUpdated,
    #[serde(rename = "PRIORITY_CHANGED")]
    PriorityChanged,
    #[serde(rename = "TYPE_CHANGED")]
    TypeChanged,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssignedToUser => "ASSIGNED_TO_USER",
            Self::StatusUpdated => "STATUS_UPDATED",
            Self::PriorityChanged => "PRIORITY_CHANGED",
            Self::TypeChanged => "TYPE_CHANGED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ASSIGNED_TO_USER" => Some(Self::AssignedToUser),
            "STATUS_UPDATED" => Some(Self::StatusUpdated),
            "PRIORITY_CHANGED" => Some(Self::PriorityChanged),
            "TYPE_CHANGED" => Some(Self::TypeChanged),
            _ => None,
        }
    }
}
