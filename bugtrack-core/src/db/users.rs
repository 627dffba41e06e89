use std::collections::HashSet;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{CreateUserInput, Role, Session, User};
use crate::roles::Permission;

use super::{parse_ts, parse_uuid, Database};

pub(crate) struct UserRow {
    id: String,
    username: String,
    email: Option<String>,
    role: String,
    is_demo: bool,
    created_at: String,
    updated_at: String,
}

const USER_COLS: &str = "id, username, email, role, is_demo, created_at, updated_at";

pub(crate) fn read_user_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        is_demo: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub(crate) fn user_from_row(raw: UserRow) -> Result<User> {
    let role = Role::from_code(&raw.role)
        .ok_or_else(|| StoreError::Configuration(format!("unknown role code: {}", raw.role)))?;
    Ok(User {
        id: parse_uuid(&raw.id)?,
        username: raw.username,
        email: raw.email,
        role,
        is_demo: raw.is_demo,
        created_at: parse_ts(&raw.created_at)?,
        updated_at: parse_ts(&raw.updated_at)?,
    })
}

/// Resolve (or create) the group for `role` and make it the user's only
/// group membership. Runs inside the transaction of the user save that
/// triggered it. A freshly created group is seeded with exactly the
/// registry's permission set for its name; existing groups are left as
/// they were.
fn sync_user_group(tx: &Transaction, user_id: Uuid, role: Role) -> Result<()> {
    let group_name = role.group_name();
    let existing: Option<String> = tx
        .query_row("SELECT id FROM groups WHERE name = ?1", [group_name], |r| {
            r.get(0)
        })
        .optional()?;

    let group_id = match existing {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO groups (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![id, group_name, Utc::now().to_rfc3339()],
            )?;
            for perm in role.permissions() {
                tx.execute(
                    "INSERT OR IGNORE INTO group_permissions (group_id, permission) VALUES (?1, ?2)",
                    params![id, perm.codename()],
                )?;
            }
            tracing::info!(group = group_name, "created group and seeded permissions");
            id
        }
    };

    // Membership is fully replaced, never additive. The target group is
    // resolved before anything is cleared.
    tx.execute(
        "DELETE FROM user_groups WHERE user_id = ?1",
        [user_id.to_string()],
    )?;
    tx.execute(
        "INSERT INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
        params![user_id.to_string(), group_id],
    )?;
    Ok(())
}

impl Database {
    pub fn create_user(&self, input: CreateUserInput) -> Result<User> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: input.username,
            email: input.email,
            role: input.role.unwrap_or(Role::Submitter),
            is_demo: input.is_demo,
            created_at: now,
            updated_at: now,
        };
        tx.execute(
            "INSERT INTO users (id, username, email, role, is_demo, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.role.as_code(),
                user.is_demo,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        sync_user_group(&tx, user.id, user.role)?;
        tx.commit()?;
        Ok(user)
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let raw = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                [id.to_string()],
                read_user_row,
            )
            .optional()?;
        raw.map(user_from_row).transpose()
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let raw = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE username = ?1"),
                [username],
                read_user_row,
            )
            .optional()?;
        raw.map(user_from_row).transpose()
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLS} FROM users ORDER BY username"))?;
        let rows = stmt.query_map([], read_user_row)?;
        let mut users = Vec::new();
        for raw in rows {
            users.push(user_from_row(raw?)?);
        }
        Ok(users)
    }

    /// Change a user's role. Group membership is re-derived in the same
    /// transaction.
    pub fn set_user_role(&self, id: Uuid, role: Role) -> Result<User> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let now = Utc::now();
        let changed = tx.execute(
            "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
            params![role.as_code(), now.to_rfc3339(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("user"));
        }
        sync_user_group(&tx, id, role)?;

        let raw = tx.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            [id.to_string()],
            read_user_row,
        )?;
        tx.commit()?;
        user_from_row(raw)
    }

    /// Blocked while the user is referenced as a project manager, ticket
    /// submitter, or assigned developer (foreign keys are RESTRICT).
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
        Ok(changed > 0)
    }

    pub fn user_group_names(&self, id: Uuid) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT g.name FROM user_groups ug
             JOIN groups g ON g.id = ug.group_id
             WHERE ug.user_id = ?1 ORDER BY g.name",
        )?;
        let rows = stmt.query_map([id.to_string()], |r| r.get(0))?;
        let mut names = Vec::new();
        for name in rows {
            names.push(name?);
        }
        Ok(names)
    }

    pub fn is_in_group(&self, id: Uuid, group_name: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM user_groups ug
             JOIN groups g ON g.id = ug.group_id
             WHERE ug.user_id = ?1 AND g.name = ?2",
            params![id.to_string(), group_name],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn user_permissions(&self, id: Uuid) -> Result<HashSet<Permission>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT gp.permission FROM user_groups ug
             JOIN group_permissions gp ON gp.group_id = ug.group_id
             WHERE ug.user_id = ?1",
        )?;
        let rows = stmt.query_map([id.to_string()], |r| r.get::<_, String>(0))?;
        let mut perms = HashSet::new();
        for codename in rows {
            let codename = codename?;
            let perm = Permission::from_codename(&codename).ok_or_else(|| {
                StoreError::Configuration(format!("unknown permission codename: {codename}"))
            })?;
            perms.insert(perm);
        }
        Ok(perms)
    }

    pub fn has_permission(&self, id: Uuid, perm: Permission) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM user_groups ug
             JOIN group_permissions gp ON gp.group_id = ug.group_id
             WHERE ug.user_id = ?1 AND gp.permission = ?2",
            params![id.to_string(), perm.codename()],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn create_session(&self, user_id: Uuid) -> Result<Session> {
        let session = Session {
            token: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO sessions (token, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                session.token.to_string(),
                session.user_id.to_string(),
                session.created_at.to_rfc3339(),
            ],
        )?;
        Ok(session)
    }

    pub fn get_session_user(&self, token: Uuid) -> Result<Option<User>> {
        let raw = self
            .conn()
            .query_row(
                "SELECT u.id, u.username, u.email, u.role, u.is_demo, u.created_at, u.updated_at
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1",
                [token.to_string()],
                read_user_row,
            )
            .optional()?;
        raw.map(user_from_row).transpose()
    }

    pub fn delete_session(&self, token: Uuid) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM sessions WHERE token = ?1", [token.to_string()])?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn new_user(db: &Database, username: &str, role: Role) -> User {
        db.create_user(CreateUserInput {
            username: username.into(),
            email: None,
            role: Some(role),
            is_demo: false,
        })
        .unwrap()
    }

    #[test]
    fn user_joins_submitter_group_by_default() {
        let db = test_db();
        let user = db
            .create_user(CreateUserInput {
                username: "alice".into(),
                email: None,
                role: None,
                is_demo: false,
            })
            .unwrap();
        assert_eq!(user.role, Role::Submitter);
        assert_eq!(db.user_group_names(user.id).unwrap(), vec!["Submitter"]);
    }

    #[test]
    fn role_change_replaces_group_membership() {
        let db = test_db();
        let user = new_user(&db, "bob", Role::Submitter);

        for role in [Role::Administrator, Role::Developer, Role::ProjectManager] {
            let user = db.set_user_role(user.id, role).unwrap();
            assert_eq!(user.role, role);
            assert_eq!(
                db.user_group_names(user.id).unwrap(),
                vec![role.group_name()]
            );
        }
    }

    #[test]
    fn group_permissions_match_registry_on_first_creation() {
        let db = test_db();
        let user = new_user(&db, "carol", Role::Submitter);

        let perms = db.user_permissions(user.id).unwrap();
        let expected: HashSet<Permission> =
            Role::Submitter.permissions().iter().copied().collect();
        assert_eq!(perms, expected);
    }

    #[test]
    fn resaving_same_role_does_not_alter_group_permissions() {
        let db = test_db();
        let user = new_user(&db, "dave", Role::Developer);

        // Simulate a later catalog divergence by dropping one seeded row;
        // a re-save must not repopulate it.
        {
            let conn = db.conn();
            conn.execute(
                "DELETE FROM group_permissions WHERE permission = 'view_project'",
                [],
            )
            .unwrap();
        }
        db.set_user_role(user.id, Role::Developer).unwrap();

        let perms = db.user_permissions(user.id).unwrap();
        assert!(!perms.contains(&Permission::ViewProject));
        assert_eq!(perms.len(), Role::Developer.permissions().len() - 1);
        assert_eq!(db.user_group_names(user.id).unwrap(), vec!["Developer"]);
    }

    #[test]
    fn permission_check_follows_role() {
        let db = test_db();
        let user = new_user(&db, "erin", Role::Submitter);

        assert!(db.has_permission(user.id, Permission::AddTicket).unwrap());
        assert!(!db.has_permission(user.id, Permission::ChangeTicket).unwrap());

        db.set_user_role(user.id, Role::ProjectManager).unwrap();
        assert!(db.has_permission(user.id, Permission::ChangeTicket).unwrap());
        assert!(!db.has_permission(user.id, Permission::ChangeUser).unwrap());
    }

    #[test]
    fn sessions_resolve_to_their_user() {
        let db = test_db();
        let user = new_user(&db, "frank", Role::Administrator);

        let session = db.create_session(user.id).unwrap();
        let found = db.get_session_user(session.token).unwrap().unwrap();
        assert_eq!(found.id, user.id);

        assert!(db.delete_session(session.token).unwrap());
        assert!(db.get_session_user(session.token).unwrap().is_none());
    }
}
