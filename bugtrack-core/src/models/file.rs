use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to a file uploaded against a ticket. The bytes live in the
/// uploads directory; only the stored path is kept here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketFile {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_name: String,
    pub stored_path: String,
    pub uploaded_at: DateTime<Utc>,
}
