//! Static role registry: maps each role to its group name and the
//! permission set seeded into that group on first creation.
//!
//! The catalog is fixed. Groups snapshot it when they are created;
//! later edits here do not retroactively change existing groups.

use serde::{Deserialize, Serialize};

use crate::models::Role;

/// Typed permission checked by the authorization layer. Persisted by
/// codename in group_permissions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    AddProject,
    ChangeProject,
    DeleteProject,
    ViewProject,
    AddTicket,
    ChangeTicket,
    ViewTicket,
    AddTicketFiles,
    ChangeTicketFiles,
    DeleteTicketFiles,
    ViewTicketFiles,
    AddComment,
    ViewComment,
    ChangeUser,
    ViewUser,
}

impl Permission {
    pub fn codename(&self) -> &'static str {
        match self {
            Self::AddProject => "add_project",
            Self::ChangeProject => "change_project",
            Self::DeleteProject => "delete_project",
            Self::ViewProject => "view_project",
            Self::AddTicket => "add_ticket",
            Self::ChangeTicket => "change_ticket",
            Self::ViewTicket => "view_ticket",
            Self::AddTicketFiles => "add_ticketfiles",
            Self::ChangeTicketFiles => "change_ticketfiles",
            Self::DeleteTicketFiles => "delete_ticketfiles",
            Self::ViewTicketFiles => "view_ticketfiles",
            Self::AddComment => "add_comment",
            Self::ViewComment => "view_comment",
            Self::ChangeUser => "change_user",
            Self::ViewUser => "view_user",
        }
    }

    pub fn from_codename(s: &str) -> Option<Self> {
        match s {
            "add_project" => Some(Self::AddProject),
            "change_project" => Some(Self::ChangeProject),
            "delete_project" => Some(Self::DeleteProject),
            "view_project" => Some(Self::ViewProject),
            "add_ticket" => Some(Self::AddTicket),
            "change_ticket" => Some(Self::ChangeTicket),
            "view_ticket" => Some(Self::ViewTicket),
            "add_ticketfiles" => Some(Self::AddTicketFiles),
            "change_ticketfiles" => Some(Self::ChangeTicketFiles),
            "delete_ticketfiles" => Some(Self::DeleteTicketFiles),
            "view_ticketfiles" => Some(Self::ViewTicketFiles),
            "add_comment" => Some(Self::AddComment),
            "view_comment" => Some(Self::ViewComment),
            "change_user" => Some(Self::ChangeUser),
            "view_user" => Some(Self::ViewUser),
            _ => None,
        }
    }
}

impl Role {
    /// Canonical group name for this role.
    pub fn group_name(&self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::ProjectManager => "Project Manager",
            Self::Developer => "Developer",
            Self::Submitter => "Submitter",
        }
    }

    pub fn from_group_name(name: &str) -> Option<Self> {
        match name {
            "Administrator" => Some(Self::Administrator),
            "Project Manager" => Some(Self::ProjectManager),
            "Developer" => Some(Self::Developer),
            "Submitter" => Some(Self::Submitter),
            _ => None,
        }
    }

    /// Permission set seeded into this role's group at first creation.
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Self::Administrator => &[
                ChangeUser,
                ViewUser,
                AddProject,
                ChangeProject,
                ViewProject,
                ChangeTicket,
                ViewTicket,
                AddTicketFiles,
                ChangeTicketFiles,
                DeleteTicketFiles,
                ViewTicketFiles,
                AddComment,
                ViewComment,
            ],
            Self::ProjectManager => &[
                AddProject,
                ChangeProject,
                DeleteProject,
                ViewProject,
                ChangeTicket,
                ViewTicket,
                AddComment,
                ViewComment,
                AddTicketFiles,
                ViewTicketFiles,
                ChangeTicketFiles,
            ],
            Self::Developer => &[
                ViewProject,
                ViewTicket,
                AddTicketFiles,
                ViewTicketFiles,
                AddComment,
                ViewComment,
            ],
            Self::Submitter => &[
                ViewProject,
                AddTicket,
                ViewTicket,
                AddTicketFiles,
                AddComment,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn submitter_registry_row() {
        let perms: HashSet<Permission> =
            Role::Submitter.permissions().iter().copied().collect();
        let expected: HashSet<Permission> = [
            Permission::ViewProject,
            Permission::AddTicket,
            Permission::ViewTicket,
            Permission::AddTicketFiles,
            Permission::AddComment,
        ]
        .into_iter()
        .collect();
        assert_eq!(perms, expected);
    }

    #[test]
    fn every_role_resolves_its_own_group_name() {
        for role in [
            Role::Administrator,
            Role::ProjectManager,
            Role::Developer,
            Role::Submitter,
        ] {
            assert_eq!(Role::from_group_name(role.group_name()), Some(role));
        }
    }

    #[test]
    fn unknown_role_code_is_rejected() {
        assert_eq!(Role::from_code("XX"), None);
        assert_eq!(Role::from_group_name("Superuser"), None);
    }

    #[test]
    fn codenames_round_trip() {
        for role in [
            Role::Administrator,
            Role::ProjectManager,
            Role::Developer,
            Role::Submitter,
        ] {
            for perm in role.permissions() {
                assert_eq!(Permission::from_codename(perm.codename()), Some(*perm));
            }
        }
    }
}
