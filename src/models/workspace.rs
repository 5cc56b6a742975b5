use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Role a user holds inside a workspace.
/// Corresponds to the `membership_role` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "membership_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular member.
    Member,
    /// May invite others.
    Admin,
    /// Creator of the workspace. Exactly one per workspace, never transferred.
    Owner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// Whether this role may create invitations.
    pub fn can_invite(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

/// Input structure for creating or renaming a workspace.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct WorkspaceInput {
    /// Must be between 1 and 200 characters.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

/// A tenant. The owner is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(name: &str, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id,
            created_at: Utc::now(),
        }
    }

    /// The membership row created atomically with the workspace.
    pub fn owner_membership(&self) -> Membership {
        Membership {
            user_id: self.owner_id,
            workspace_id: self.id,
            role: Role::Owner,
            created_at: self.created_at,
        }
    }
}

/// Unique per `(user_id, workspace_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// An outstanding invitation. The row is kept after redemption for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub inviter_id: Uuid,
    pub invitee_email: String,
    pub invitee_id: Option<Uuid>,
    pub role: Role,
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_creation() {
        let owner = Uuid::new_v4();
        let workspace = Workspace::new("Acme", owner);
        assert_eq!(workspace.name, "Acme");
        assert_eq!(workspace.owner_id, owner);

        let membership = workspace.owner_membership();
        assert_eq!(membership.user_id, owner);
        assert_eq!(membership.workspace_id, workspace.id);
        assert_eq!(membership.role, Role::Owner);
    }

    #[test]
    fn test_role_serialization_and_permissions() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"member\"").unwrap();
        assert_eq!(role, Role::Member);

        assert!(Role::Owner.can_invite());
        assert!(Role::Admin.can_invite());
        assert!(!Role::Member.can_invite());
        assert_eq!(Role::Owner.as_str(), "owner");
    }

    #[test]
    fn test_workspace_input_validation() {
        assert!(WorkspaceInput { name: "Acme".into() }.validate().is_ok());
        assert!(WorkspaceInput { name: "".into() }.validate().is_err());
    }
}
