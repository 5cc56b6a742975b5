//! Workspaces and their memberships.
//!
//! Membership itself is enforced by the access gate before these operations run.
//! Owner-only actions are checked here and answered with `Forbidden`.

pub mod invitation;

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::models::{Membership, Workspace, WorkspaceInput};
use crate::store::{MembershipStore, WorkspaceStore};

pub use invitation::{CreateInvitationRequest, InvitationService};

/// Loads the workspace and requires `actor` to own it.
pub(crate) async fn require_owner(
    workspaces: &dyn WorkspaceStore,
    actor: Uuid,
    workspace_id: Uuid,
) -> Result<Workspace, AppError> {
    let workspace = workspaces
        .get(workspace_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Workspace not found".into()))?;
    if workspace.owner_id != actor {
        return Err(AppError::Forbidden(
            "Only the workspace owner may do this".into(),
        ));
    }
    Ok(workspace)
}

pub struct WorkspaceService {
    workspaces: Arc<dyn WorkspaceStore>,
    memberships: Arc<dyn MembershipStore>,
}

impl WorkspaceService {
    pub fn new(workspaces: Arc<dyn WorkspaceStore>, memberships: Arc<dyn MembershipStore>) -> Self {
        Self {
            workspaces,
            memberships,
        }
    }

    /// Creates the workspace with `owner_id` as its owner member.
    pub async fn create(&self, owner_id: Uuid, input: &WorkspaceInput) -> Result<Workspace, AppError> {
        input.validate()?;
        let workspace = self
            .workspaces
            .create_with_owner(&Workspace::new(&input.name, owner_id))
            .await?;
        log::info!("workspace {} created by {}", workspace.id, owner_id);
        Ok(workspace)
    }

    pub async fn get(&self, workspace_id: Uuid) -> Result<Workspace, AppError> {
        self.workspaces
            .get(workspace_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Workspace not found".into()))
    }

    pub async fn rename(
        &self,
        actor: Uuid,
        workspace_id: Uuid,
        input: &WorkspaceInput,
    ) -> Result<Workspace, AppError> {
        input.validate()?;
        require_owner(self.workspaces.as_ref(), actor, workspace_id).await?;
        self.workspaces.update_name(workspace_id, &input.name).await
    }

    pub async fn delete(&self, actor: Uuid, workspace_id: Uuid) -> Result<(), AppError> {
        require_owner(self.workspaces.as_ref(), actor, workspace_id).await?;
        self.workspaces.delete(workspace_id).await?;
        log::info!("workspace {} deleted by {}", workspace_id, actor);
        Ok(())
    }

    pub async fn list_owned(&self, owner_id: Uuid) -> Result<Vec<Workspace>, AppError> {
        self.workspaces.list_by_owner(owner_id).await
    }

    pub async fn members(&self, actor: Uuid, workspace_id: Uuid) -> Result<Vec<Membership>, AppError> {
        require_owner(self.workspaces.as_ref(), actor, workspace_id).await?;
        self.memberships.list_by_workspace(workspace_id).await
    }

    /// Removes a member. The owner's own membership cannot be removed.
    pub async fn remove_member(
        &self,
        actor: Uuid,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        let workspace = require_owner(self.workspaces.as_ref(), actor, workspace_id).await?;
        if user_id == workspace.owner_id {
            return Err(AppError::validation(
                "user_id",
                "WORKSPACE OWNER CANNOT BE REMOVED",
            ));
        }
        self.memberships.remove(user_id, workspace_id).await?;
        log::info!("removed {} from workspace {}", user_id, workspace_id);
        Ok(())
    }
}
