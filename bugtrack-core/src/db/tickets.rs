use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{
    CreateTicketInput, HistoryAction, Role, Ticket, TicketComment, TicketCounts, TicketDetail,
    TicketFile, TicketHistory, TicketKind, TicketPriority, TicketStatus, UpdateTicketInput, User,
};

use super::{parse_ts, parse_uuid, Database};

struct TicketRow {
    id: String,
    project_id: String,
    title: String,
    description: String,
    priority: String,
    status: String,
    kind: String,
    submitter_id: String,
    assigned_developer_id: Option<String>,
    created_at: String,
    updated_at: String,
}

const TICKET_COLS: &str = "id, project_id, title, description, priority, status, kind, \
                           submitter_id, assigned_developer_id, created_at, updated_at";

fn read_ticket_row(row: &Row) -> rusqlite::Result<TicketRow> {
    Ok(TicketRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: row.get(4)?,
        status: row.get(5)?,
        kind: row.get(6)?,
        submitter_id: row.get(7)?,
        assigned_developer_id: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn ticket_from_row(raw: TicketRow) -> Result<Ticket> {
    let priority = TicketPriority::from_str(&raw.priority)
        .ok_or_else(|| StoreError::InvalidInput(format!("unknown priority: {}", raw.priority)))?;
    let status = TicketStatus::from_str(&raw.status)
        .ok_or_else(|| StoreError::InvalidInput(format!("unknown status: {}", raw.status)))?;
    let kind = TicketKind::from_str(&raw.kind)
        .ok_or_else(|| StoreError::InvalidInput(format!("unknown ticket kind: {}", raw.kind)))?;
    Ok(Ticket {
        id: parse_uuid(&raw.id)?,
        project_id: parse_uuid(&raw.project_id)?,
        title: raw.title,
        description: raw.description,
        priority,
        status,
        kind,
        submitter_id: parse_uuid(&raw.submitter_id)?,
        assigned_developer_id: raw
            .assigned_developer_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?,
        created_at: parse_ts(&raw.created_at)?,
        updated_at: parse_ts(&raw.updated_at)?,
    })
}

fn get_ticket_tx(tx: &Transaction, id: Uuid) -> Result<Option<Ticket>> {
    let raw = tx
        .query_row(
            &format!("SELECT {TICKET_COLS} FROM tickets WHERE id = ?1"),
            [id.to_string()],
            read_ticket_row,
        )
        .optional()?;
    raw.map(ticket_from_row).transpose()
}

fn add_history(
    tx: &Transaction,
    ticket_id: Uuid,
    action: HistoryAction,
    prev_value: Option<&str>,
    new_value: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    tx.execute(
        "INSERT INTO ticket_history (id, ticket_id, action, prev_value, new_value, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            Uuid::new_v4().to_string(),
            ticket_id.to_string(),
            action.as_str(),
            prev_value,
            new_value,
            now.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Diff the persisted prior state against the incoming field set and append
/// one history row per tracked field that changed. All rows share the
/// timestamp of the update. Never called on creation.
fn record_ticket_changes(
    tx: &Transaction,
    prev: &Ticket,
    incoming: &UpdateTicketInput,
    now: DateTime<Utc>,
) -> Result<()> {
    if prev.assigned_developer_id != incoming.assigned_developer_id {
        // both sides nullable: NULL prev on first assignment, NULL new
        // when the assignment is cleared
        add_history(
            tx,
            prev.id,
            HistoryAction::AssignedToUser,
            prev.assigned_developer_id.map(|u| u.to_string()).as_deref(),
            incoming
                .assigned_developer_id
                .map(|u| u.to_string())
                .as_deref(),
            now,
        )?;
    }
    if prev.status != incoming.status {
        add_history(
            tx,
            prev.id,
            HistoryAction::StatusUpdated,
            Some(prev.status.as_str()),
            Some(incoming.status.as_str()),
            now,
        )?;
    }
    if prev.priority != incoming.priority {
        add_history(
            tx,
            prev.id,
            HistoryAction::PriorityChanged,
            Some(prev.priority.as_str()),
            Some(incoming.priority.as_str()),
            now,
        )?;
    }
    if prev.kind != incoming.kind {
        add_history(
            tx,
            prev.id,
            HistoryAction::TypeChanged,
            Some(prev.kind.as_str()),
            Some(incoming.kind.as_str()),
            now,
        )?;
    }
    Ok(())
}

/// Force every ticket of the project to CLOSED. Flows through the same
/// diff-and-log step as a direct update, so tickets that were OPEN get a
/// STATUS_UPDATED row and already-closed tickets are a no-op.
pub(crate) fn close_project_tickets(
    tx: &Transaction,
    project_id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    let tickets = {
        let mut stmt = tx.prepare(&format!(
            "SELECT {TICKET_COLS} FROM tickets WHERE project_id = ?1"
        ))?;
        let rows = stmt.query_map([project_id.to_string()], read_ticket_row)?;
        let mut tickets = Vec::new();
        for raw in rows {
            tickets.push(ticket_from_row(raw?)?);
        }
        tickets
    };

    for ticket in tickets {
        tx.execute(
            "UPDATE tickets SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                TicketStatus::Closed.as_str(),
                now.to_rfc3339(),
                ticket.id.to_string(),
            ],
        )?;
        if ticket.status != TicketStatus::Closed {
            add_history(
                tx,
                ticket.id,
                HistoryAction::StatusUpdated,
                Some(ticket.status.as_str()),
                Some(TicketStatus::Closed.as_str()),
                now,
            )?;
        }
    }
    Ok(())
}

impl Database {
    /// First save of a ticket. Status starts OPEN and no history row is
    /// written regardless of field values.
    pub fn create_ticket(&self, submitter_id: Uuid, input: CreateTicketInput) -> Result<Ticket> {
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            project_id: input.project_id,
            title: input.title,
            description: input.description,
            priority: input.priority,
            status: TicketStatus::Open,
            kind: input.kind,
            submitter_id,
            assigned_developer_id: None,
            created_at: now,
            updated_at: now,
        };
        self.conn().execute(
            "INSERT INTO tickets (id, project_id, title, description, priority, status, kind,
                                  submitter_id, assigned_developer_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                ticket.id.to_string(),
                ticket.project_id.to_string(),
                ticket.title,
                ticket.description,
                ticket.priority.as_str(),
                ticket.status.as_str(),
                ticket.kind.as_str(),
                ticket.submitter_id.to_string(),
                Option::<String>::None,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(ticket)
    }

    pub fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        let raw = self
            .conn()
            .query_row(
                &format!("SELECT {TICKET_COLS} FROM tickets WHERE id = ?1"),
                [id.to_string()],
                read_ticket_row,
            )
            .optional()?;
        raw.map(ticket_from_row).transpose()
    }

    /// Update a ticket with the full field set of the update form. The
    /// audit trail is recorded against the persisted prior row inside the
    /// same transaction.
    pub fn update_ticket(&self, id: Uuid, input: UpdateTicketInput) -> Result<Ticket> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let prev = get_ticket_tx(&tx, id)?.ok_or(StoreError::NotFound("ticket"))?;
        let now = Utc::now();
        tx.execute(
            "UPDATE tickets SET title = ?1, description = ?2, assigned_developer_id = ?3,
                                priority = ?4, status = ?5, kind = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                input.title,
                input.description,
                input.assigned_developer_id.map(|u| u.to_string()),
                input.priority.as_str(),
                input.status.as_str(),
                input.kind.as_str(),
                now.to_rfc3339(),
                id.to_string(),
            ],
        )?;
        record_ticket_changes(&tx, &prev, &input, now)?;

        let updated = get_ticket_tx(&tx, id)?.ok_or(StoreError::NotFound("ticket"))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Open tickets visible to the requester: Administrators see all,
    /// Developers and Project Managers see tickets assigned to them,
    /// everyone else sees tickets they submitted.
    pub fn list_tickets_for_user(&self, user: &User) -> Result<Vec<Ticket>> {
        let conn = self.conn();
        let (sql, param) = match user.role {
            Role::Administrator => (
                format!("SELECT {TICKET_COLS} FROM tickets WHERE status = 'OPEN' ORDER BY created_at"),
                None,
            ),
            Role::Developer | Role::ProjectManager => (
                format!(
                    "SELECT {TICKET_COLS} FROM tickets
                     WHERE assigned_developer_id = ?1 AND status = 'OPEN' ORDER BY created_at"
                ),
                Some(user.id.to_string()),
            ),
            Role::Submitter => (
                format!(
                    "SELECT {TICKET_COLS} FROM tickets
                     WHERE submitter_id = ?1 AND status = 'OPEN' ORDER BY created_at"
                ),
                Some(user.id.to_string()),
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let mut tickets = Vec::new();
        match param {
            Some(p) => {
                let rows = stmt.query_map([p], read_ticket_row)?;
                for raw in rows {
                    tickets.push(ticket_from_row(raw?)?);
                }
            }
            None => {
                let rows = stmt.query_map([], read_ticket_row)?;
                for raw in rows {
                    tickets.push(ticket_from_row(raw?)?);
                }
            }
        }
        Ok(tickets)
    }

    pub fn get_ticket_detail(&self, id: Uuid) -> Result<Option<TicketDetail>> {
        let Some(ticket) = self.get_ticket(id)? else {
            return Ok(None);
        };
        Ok(Some(TicketDetail {
            comments: self.list_comments(id)?,
            history: self.list_history(id)?,
            files: self.list_ticket_files(id)?,
            ticket,
        }))
    }

    pub fn add_comment(
        &self,
        ticket_id: Uuid,
        commenter_id: Uuid,
        message: String,
    ) -> Result<TicketComment> {
        if self.get_ticket(ticket_id)?.is_none() {
            return Err(StoreError::NotFound("ticket"));
        }
        let comment = TicketComment {
            id: Uuid::new_v4(),
            ticket_id,
            commenter_id,
            message,
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO ticket_comments (id, ticket_id, commenter_id, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comment.id.to_string(),
                comment.ticket_id.to_string(),
                comment.commenter_id.to_string(),
                comment.message,
                comment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(comment)
    }

    pub fn list_comments(&self, ticket_id: Uuid) -> Result<Vec<TicketComment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, commenter_id, message, created_at
             FROM ticket_comments WHERE ticket_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([ticket_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut comments = Vec::new();
        for raw in rows {
            let (id, ticket_id, commenter_id, message, created_at) = raw?;
            comments.push(TicketComment {
                id: parse_uuid(&id)?,
                ticket_id: parse_uuid(&ticket_id)?,
                commenter_id: parse_uuid(&commenter_id)?,
                message,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(comments)
    }

    pub fn list_history(&self, ticket_id: Uuid) -> Result<Vec<TicketHistory>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, action, prev_value, new_value, changed_at
             FROM ticket_history WHERE ticket_id = ?1 ORDER BY changed_at, action",
        )?;
        let rows = stmt.query_map([ticket_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut history = Vec::new();
        for raw in rows {
            let (id, ticket_id, action, prev_value, new_value, changed_at) = raw?;
            let action = HistoryAction::from_str(&action).ok_or_else(|| {
                StoreError::InvalidInput(format!("unknown history action: {action}"))
            })?;
            history.push(TicketHistory {
                id: parse_uuid(&id)?,
                ticket_id: parse_uuid(&ticket_id)?,
                action,
                prev_value,
                new_value,
                changed_at: parse_ts(&changed_at)?,
            });
        }
        Ok(history)
    }

    pub fn add_ticket_file(
        &self,
        ticket_id: Uuid,
        uploaded_by: Uuid,
        file_name: String,
        stored_path: String,
    ) -> Result<TicketFile> {
        if self.get_ticket(ticket_id)?.is_none() {
            return Err(StoreError::NotFound("ticket"));
        }
        let file = TicketFile {
            id: Uuid::new_v4(),
            ticket_id,
            uploaded_by,
            file_name,
            stored_path,
            uploaded_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO ticket_files (id, ticket_id, uploaded_by, file_name, stored_path, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                file.id.to_string(),
                file.ticket_id.to_string(),
                file.uploaded_by.to_string(),
                file.file_name,
                file.stored_path,
                file.uploaded_at.to_rfc3339(),
            ],
        )?;
        Ok(file)
    }

    pub fn list_ticket_files(&self, ticket_id: Uuid) -> Result<Vec<TicketFile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, ticket_id, uploaded_by, file_name, stored_path, uploaded_at
             FROM ticket_files WHERE ticket_id = ?1 ORDER BY uploaded_at",
        )?;
        let rows = stmt.query_map([ticket_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;
        let mut files = Vec::new();
        for raw in rows {
            let (id, ticket_id, uploaded_by, file_name, stored_path, uploaded_at) = raw?;
            files.push(TicketFile {
                id: parse_uuid(&id)?,
                ticket_id: parse_uuid(&ticket_id)?,
                uploaded_by: parse_uuid(&uploaded_by)?,
                file_name,
                stored_path,
                uploaded_at: parse_ts(&uploaded_at)?,
            });
        }
        Ok(files)
    }

    /// Dashboard aggregates: ticket counts grouped by status and by kind.
    pub fn ticket_counts(&self) -> Result<TicketCounts> {
        let conn = self.conn();
        let mut by_status = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM tickets GROUP BY status ORDER BY status DESC",
            )?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
            for row in rows {
                by_status.push(row?);
            }
        }
        let mut by_kind = Vec::new();
        {
            let mut stmt =
                conn.prepare("SELECT kind, COUNT(*) FROM tickets GROUP BY kind ORDER BY kind")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
            for row in rows {
                by_kind.push(row?);
            }
        }
        Ok(TicketCounts { by_status, by_kind })
    }
}
