use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{
    CreateProjectInput, ManageProjectUsersInput, Project, Role, UpdateProjectInput, User,
};

use super::tickets::close_project_tickets;
use super::users::{read_user_row, user_from_row};
use super::{parse_ts, parse_uuid, Database};

struct ProjectRow {
    id: String,
    title: String,
    description: String,
    is_active: bool,
    manager_id: Option<String>,
    created_at: String,
    updated_at: String,
}

const PROJECT_COLS: &str = "id, title, description, is_active, manager_id, created_at, updated_at";

fn read_project_row(row: &Row) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        is_active: row.get(3)?,
        manager_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn project_from_row(raw: ProjectRow) -> Result<Project> {
    Ok(Project {
        id: parse_uuid(&raw.id)?,
        title: raw.title,
        description: raw.description,
        is_active: raw.is_active,
        manager_id: raw.manager_id.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_ts(&raw.created_at)?,
        updated_at: parse_ts(&raw.updated_at)?,
    })
}

fn replace_personnel(tx: &Transaction, project_id: Uuid, personnel: &[Uuid]) -> Result<()> {
    tx.execute(
        "DELETE FROM project_personnel WHERE project_id = ?1",
        [project_id.to_string()],
    )?;
    for user_id in personnel {
        tx.execute(
            "INSERT OR IGNORE INTO project_personnel (project_id, user_id) VALUES (?1, ?2)",
            params![project_id.to_string(), user_id.to_string()],
        )?;
    }
    Ok(())
}

impl Database {
    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            is_active: true,
            manager_id: input.manager_id,
            created_at: now,
            updated_at: now,
        };
        tx.execute(
            "INSERT INTO projects (id, title, description, is_active, manager_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project.id.to_string(),
                project.title,
                project.description,
                project.is_active,
                project.manager_id.map(|u| u.to_string()),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        replace_personnel(&tx, project.id, &input.personnel)?;
        tx.commit()?;
        Ok(project)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let raw = self
            .conn()
            .query_row(
                &format!("SELECT {PROJECT_COLS} FROM projects WHERE id = ?1"),
                [id.to_string()],
                read_project_row,
            )
            .optional()?;
        raw.map(project_from_row).transpose()
    }

    /// Update title, description, and the active flag. Archiving a project
    /// (is_active true -> false, or any save that leaves it inactive)
    /// force-closes all of its tickets in the same transaction. Tickets are
    /// never reopened when a project is reactivated.
    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Project> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let now = Utc::now();
        let changed = tx.execute(
            "UPDATE projects SET title = ?1, description = ?2, is_active = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                input.title,
                input.description,
                input.is_active,
                now.to_rfc3339(),
                id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("project"));
        }
        if !input.is_active {
            close_project_tickets(&tx, id, now)?;
            tracing::info!(project_id = %id, "project archived, open tickets closed");
        }

        let raw = tx.query_row(
            &format!("SELECT {PROJECT_COLS} FROM projects WHERE id = ?1"),
            [id.to_string()],
            read_project_row,
        )?;
        tx.commit()?;
        project_from_row(raw)
    }

    pub fn set_project_users(&self, id: Uuid, input: ManageProjectUsersInput) -> Result<Project> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE projects SET manager_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                input.manager_id.map(|u| u.to_string()),
                Utc::now().to_rfc3339(),
                id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("project"));
        }
        replace_personnel(&tx, id, &input.personnel)?;

        let raw = tx.query_row(
            &format!("SELECT {PROJECT_COLS} FROM projects WHERE id = ?1"),
            [id.to_string()],
            read_project_row,
        )?;
        tx.commit()?;
        project_from_row(raw)
    }

    /// Cascades to the project's tickets (and through them to comments,
    /// history, and files).
    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", [id.to_string()])?;
        Ok(changed > 0)
    }

    /// Active projects visible to the requester: Administrators see all,
    /// Project Managers see the projects they manage, everyone else sees
    /// projects they are assigned to.
    pub fn list_projects_for_user(&self, user: &User) -> Result<Vec<Project>> {
        let conn = self.conn();
        let (sql, param) = match user.role {
            Role::Administrator => (
                format!("SELECT {PROJECT_COLS} FROM projects WHERE is_active = 1 ORDER BY title"),
                None,
            ),
            Role::ProjectManager => (
                format!(
                    "SELECT {PROJECT_COLS} FROM projects
                     WHERE manager_id = ?1 AND is_active = 1 ORDER BY title"
                ),
                Some(user.id.to_string()),
            ),
            Role::Developer | Role::Submitter => (
                format!(
                    "SELECT p.id, p.title, p.description, p.is_active, p.manager_id, p.created_at, p.updated_at
                     FROM projects p JOIN project_personnel pp ON pp.project_id = p.id
                     WHERE pp.user_id = ?1 AND p.is_active = 1 ORDER BY p.title"
                ),
                Some(user.id.to_string()),
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let mut projects = Vec::new();
        match param {
            Some(p) => {
                let rows = stmt.query_map([p], read_project_row)?;
                for raw in rows {
                    projects.push(project_from_row(raw?)?);
                }
            }
            None => {
                let rows = stmt.query_map([], read_project_row)?;
                for raw in rows {
                    projects.push(project_from_row(raw?)?);
                }
            }
        }
        Ok(projects)
    }

    pub fn list_archived_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLS} FROM projects WHERE is_active = 0 ORDER BY title"
        ))?;
        let rows = stmt.query_map([], read_project_row)?;
        let mut projects = Vec::new();
        for raw in rows {
            projects.push(project_from_row(raw?)?);
        }
        Ok(projects)
    }

    pub fn list_project_personnel(&self, project_id: Uuid) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.email, u.role, u.is_demo, u.created_at, u.updated_at
             FROM project_personnel pp JOIN users u ON u.id = pp.user_id
             WHERE pp.project_id = ?1 ORDER BY u.username",
        )?;
        let rows = stmt.query_map([project_id.to_string()], read_user_row)?;
        let mut personnel = Vec::new();
        for raw in rows {
            personnel.push(user_from_row(raw?)?);
        }
        Ok(personnel)
    }

    pub fn is_assigned_to_project(&self, project_id: Uuid, user_id: Uuid) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM project_personnel WHERE project_id = ?1 AND user_id = ?2",
            params![project_id.to_string(), user_id.to_string()],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CreateTicketInput, CreateUserInput, TicketKind, TicketPriority, TicketStatus,
    };

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn seed_user(db: &Database, username: &str, role: Role) -> User {
        db.create_user(CreateUserInput {
            username: username.into(),
            email: None,
            role: Some(role),
            is_demo: false,
        })
        .unwrap()
    }

    fn seed_project_with_tickets(db: &Database, count: usize) -> (Project, Vec<Uuid>) {
        let submitter = seed_user(db, "test_submitter", Role::Submitter);
        let project = db
            .create_project(CreateProjectInput {
                title: "Test Project".into(),
                description: "Test Description".into(),
                manager_id: None,
                personnel: vec![],
            })
            .unwrap();
        let mut ticket_ids = Vec::new();
        for n in 0..count {
            let ticket = db
                .create_ticket(
                    submitter.id,
                    CreateTicketInput {
                        project_id: project.id,
                        title: format!("Ticket {}", n + 1),
                        description: "ticket desc.".into(),
                        priority: TicketPriority::Low,
                        kind: TicketKind::BugError,
                    },
                )
                .unwrap();
            ticket_ids.push(ticket.id);
        }
        (project, ticket_ids)
    }

    #[test]
    fn tickets_close_on_project_archive() {
        let db = test_db();
        let (project, ticket_ids) = seed_project_with_tickets(&db, 2);

        db.update_project(
            project.id,
            UpdateProjectInput {
                title: project.title.clone(),
                description: project.description.clone(),
                is_active: false,
            },
        )
        .unwrap();

        for id in &ticket_ids {
            let ticket = db.get_ticket(*id).unwrap().unwrap();
            assert_eq!(ticket.status, TicketStatus::Closed);
            // the forced close flows through the audit recorder
            let history = db.list_history(*id).unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].new_value.as_deref(), Some("CLOSED"));
        }
    }

    #[test]
    fn tickets_untouched_when_project_saved_without_archiving() {
        let db = test_db();
        let (project, ticket_ids) = seed_project_with_tickets(&db, 2);

        db.update_project(
            project.id,
            UpdateProjectInput {
                title: "Updated Test Project Title".into(),
                description: project.description.clone(),
                is_active: true,
            },
        )
        .unwrap();

        for id in &ticket_ids {
            let ticket = db.get_ticket(*id).unwrap().unwrap();
            assert_eq!(ticket.status, TicketStatus::Open);
            assert!(db.list_history(*id).unwrap().is_empty());
        }
    }

    #[test]
    fn reactivation_does_not_reopen_tickets() {
        let db = test_db();
        let (project, ticket_ids) = seed_project_with_tickets(&db, 1);

        for active in [false, true] {
            db.update_project(
                project.id,
                UpdateProjectInput {
                    title: project.title.clone(),
                    description: project.description.clone(),
                    is_active: active,
                },
            )
            .unwrap();
        }

        let ticket = db.get_ticket(ticket_ids[0]).unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Closed);
        // one close, no reopen row
        assert_eq!(db.list_history(ticket_ids[0]).unwrap().len(), 1);
    }

    #[test]
    fn archiving_twice_adds_no_extra_history() {
        let db = test_db();
        let (project, ticket_ids) = seed_project_with_tickets(&db, 1);

        for _ in 0..2 {
            db.update_project(
                project.id,
                UpdateProjectInput {
                    title: project.title.clone(),
                    description: project.description.clone(),
                    is_active: false,
                },
            )
            .unwrap();
        }

        assert_eq!(db.list_history(ticket_ids[0]).unwrap().len(), 1);
    }

    #[test]
    fn deleting_project_cascades_to_tickets_and_children() {
        let db = test_db();
        let (project, ticket_ids) = seed_project_with_tickets(&db, 2);
        let commenter = seed_user(&db, "commenter", Role::Developer);
        db.add_comment(ticket_ids[0], commenter.id, "note".into())
            .unwrap();

        assert!(db.delete_project(project.id).unwrap());

        for id in &ticket_ids {
            assert!(db.get_ticket(*id).unwrap().is_none());
            assert!(db.list_comments(*id).unwrap().is_empty());
            assert!(db.list_history(*id).unwrap().is_empty());
            assert!(db.list_ticket_files(*id).unwrap().is_empty());
        }
    }

    #[test]
    fn referenced_user_cannot_be_deleted() {
        let db = test_db();
        let (_, _) = seed_project_with_tickets(&db, 1);
        let submitter = db.get_user_by_username("test_submitter").unwrap().unwrap();

        let err = db.delete_user(submitter.id).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert!(db.get_user(submitter.id).unwrap().is_some());
    }

    #[test]
    fn project_listings_are_role_scoped() {
        let db = test_db();
        let admin = seed_user(&db, "admin", Role::Administrator);
        let pm = seed_user(&db, "pm", Role::ProjectManager);
        let dev = seed_user(&db, "dev", Role::Developer);

        let managed = db
            .create_project(CreateProjectInput {
                title: "Managed".into(),
                description: "d".into(),
                manager_id: Some(pm.id),
                personnel: vec![dev.id],
            })
            .unwrap();
        let other = db
            .create_project(CreateProjectInput {
                title: "Other".into(),
                description: "d".into(),
                manager_id: None,
                personnel: vec![],
            })
            .unwrap();

        let admin_sees = db.list_projects_for_user(&admin).unwrap();
        assert_eq!(admin_sees.len(), 2);

        let pm_sees = db.list_projects_for_user(&pm).unwrap();
        assert_eq!(pm_sees.len(), 1);
        assert_eq!(pm_sees[0].id, managed.id);

        let dev_sees = db.list_projects_for_user(&dev).unwrap();
        assert_eq!(dev_sees.len(), 1);
        assert_eq!(dev_sees[0].id, managed.id);

        // archive drops the project from active listings
        db.update_project(
            other.id,
            UpdateProjectInput {
                title: other.title.clone(),
                description: other.description.clone(),
                is_active: false,
            },
        )
        .unwrap();
        assert_eq!(db.list_projects_for_user(&admin).unwrap().len(), 1);
        assert_eq!(db.list_archived_projects().unwrap().len(), 1);
    }
}
