//! Workspace invitations.
//!
//! Creating an invitation stores a row, signs an `invitation` token describing it and
//! queues an email carrying the token. Redeeming the token creates the membership.
//! Under `RedemptionPolicy::Stateless` the token alone decides. Under
//! `RedemptionPolicy::Strict` the stored row must still be valid and is consumed once
//! the membership has been created.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::magic_link::find_or_create_identity;
use crate::auth::token::{InvitationGrant, Purpose, TokenService};
use crate::config::RedemptionPolicy;
use crate::error::AppError;
use crate::models::{Invitation, Membership, Role};
use crate::notification::{InvitationPayload, NotificationChannel, NotificationMessage};
use crate::security::{parse_uuid, require_email};
use crate::store::{IdentityStore, InvitationStore, MembershipStore, Stores, WorkspaceStore};
use crate::workspace::require_owner;

/// Appended to the frontend URL, followed by the invitation token.
pub const INVITATION_PATH: &str = "/api/membership/add?token=";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvitationRequest {
    #[serde(default)]
    pub invitee_id: Option<String>,
    pub invitee_email: String,
    pub workspace_id: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct InvitationListQuery {
    pub workspace_id: String,
}

pub struct InvitationService {
    tokens: Arc<TokenService>,
    identities: Arc<dyn IdentityStore>,
    workspaces: Arc<dyn WorkspaceStore>,
    memberships: Arc<dyn MembershipStore>,
    invitations: Arc<dyn InvitationStore>,
    notifications: Arc<dyn NotificationChannel>,
    policy: RedemptionPolicy,
}

impl InvitationService {
    pub fn new(
        tokens: Arc<TokenService>,
        stores: &Stores,
        notifications: Arc<dyn NotificationChannel>,
        policy: RedemptionPolicy,
    ) -> Self {
        Self {
            tokens,
            identities: stores.identities.clone(),
            workspaces: stores.workspaces.clone(),
            memberships: stores.memberships.clone(),
            invitations: stores.invitations.clone(),
            notifications,
            policy,
        }
    }

    /// Invites someone into a workspace where `inviter` is an owner or admin.
    pub async fn create(
        &self,
        inviter: Uuid,
        request: &CreateInvitationRequest,
    ) -> Result<Invitation, AppError> {
        let workspace_id = parse_uuid("workspace_id", &request.workspace_id)?;
        let invitee_id = request
            .invitee_id
            .as_deref()
            .map(|id| parse_uuid("invitee_id", id))
            .transpose()?;
        require_email("invitee_email", &request.invitee_email)?;
        if request.role == Role::Owner {
            return Err(AppError::validation("role", "OWNER IS NOT AN INVITABLE ROLE"));
        }

        let workspace = self
            .workspaces
            .get(workspace_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Workspace not found".into()))?;
        let may_invite = self
            .memberships
            .find(inviter, workspace_id)
            .await?
            .map_or(false, |m| m.role.can_invite());
        if !may_invite {
            return Err(AppError::Forbidden(
                "Only owners and admins may invite".into(),
            ));
        }

        let invitation = self
            .invitations
            .create(&Invitation {
                id: Uuid::new_v4(),
                workspace_id,
                inviter_id: inviter,
                invitee_email: request.invitee_email.clone(),
                invitee_id,
                role: request.role,
                is_valid: true,
                created_at: Utc::now(),
            })
            .await?;

        if let Err(e) = self.send(&invitation, &workspace.name).await {
            if let Err(cleanup) = self.invitations.delete(invitation.id).await {
                log::error!(
                    "could not remove unsent invitation {}: {}",
                    invitation.id,
                    cleanup
                );
            }
            return Err(e);
        }

        log::info!(
            "invitation {} to {} created for workspace {}",
            invitation.id,
            invitation.invitee_email,
            workspace_id
        );
        Ok(invitation)
    }

    async fn send(&self, invitation: &Invitation, workspace_name: &str) -> Result<(), AppError> {
        let token = self.tokens.issue_invitation_token(InvitationGrant {
            invitation_id: invitation.id,
            workspace_id: invitation.workspace_id,
            inviter_id: invitation.inviter_id,
            invitee_email: invitation.invitee_email.clone(),
            invitee_id: invitation.invitee_id,
            role: invitation.role,
        })?;

        let message = NotificationMessage::Invitation(InvitationPayload {
            to_email: invitation.invitee_email.clone(),
            workspace_name: workspace_name.to_string(),
            role: invitation.role.as_str().to_string(),
            token,
            invitation_url: INVITATION_PATH.to_string(),
        });
        self.notifications.publish(&message).await?;
        Ok(())
    }

    pub async fn list(&self, actor: Uuid, workspace_id: &str) -> Result<Vec<Invitation>, AppError> {
        let workspace_id = parse_uuid("workspace_id", workspace_id)?;
        require_owner(self.workspaces.as_ref(), actor, workspace_id).await?;
        self.invitations.list_by_workspace(workspace_id).await
    }

    /// Deletes an invitation. Only its inviter may do so.
    pub async fn delete(&self, actor: Uuid, invitation_id: &str) -> Result<(), AppError> {
        let invitation_id = parse_uuid("invitation_id", invitation_id)?;
        let invitation = self
            .invitations
            .get(invitation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Invitation not found".into()))?;
        if invitation.inviter_id != actor {
            return Err(AppError::Forbidden(
                "Only the inviter may delete this invitation".into(),
            ));
        }
        self.invitations.delete(invitation_id).await?;
        log::info!("invitation {} deleted by {}", invitation_id, actor);
        Ok(())
    }

    /// Turns an invitation token into a membership.
    ///
    /// Under `RedemptionPolicy::Strict` the stored row is only consumed once the
    /// membership exists, so a failed redemption leaves the invitation usable.
    pub async fn redeem(&self, token: &str) -> Result<Membership, AppError> {
        let claims = self.tokens.parse_invitation_token(token)?;
        claims.ensure(Purpose::Invitation)?;
        let grant = claims.extra;

        if self.policy == RedemptionPolicy::Strict {
            self.check_stored(&grant).await?;
        }

        if self.workspaces.get(grant.workspace_id).await?.is_none() {
            return Err(AppError::NotFound("Workspace not found".into()));
        }

        let user_id = match grant.invitee_id {
            Some(id) => id,
            None => {
                find_or_create_identity(self.identities.as_ref(), &grant.invitee_email)
                    .await?
                    .id
            }
        };

        let membership = self
            .memberships
            .add(&Membership {
                user_id,
                workspace_id: grant.workspace_id,
                role: grant.role,
                created_at: Utc::now(),
            })
            .await?;

        if self.policy == RedemptionPolicy::Strict {
            if let Err(e) = self.consume_stored(&grant).await {
                if let Err(cleanup) = self.memberships.remove(user_id, grant.workspace_id).await {
                    log::error!(
                        "could not roll back membership of {} in {}: {}",
                        user_id,
                        grant.workspace_id,
                        cleanup
                    );
                }
                return Err(e);
            }
        }

        log::info!(
            "invitation {} redeemed: {} joined {}",
            grant.invitation_id,
            user_id,
            grant.workspace_id
        );
        Ok(membership)
    }

    async fn check_stored(&self, grant: &InvitationGrant) -> Result<(), AppError> {
        let stored = self
            .invitations
            .get(grant.invitation_id)
            .await?
            .ok_or_else(|| {
                AppError::Unauthorized(format!("invitation {} no longer exists", grant.invitation_id))
            })?;
        if stored.workspace_id != grant.workspace_id {
            return Err(AppError::Unauthorized(format!(
                "invitation {} does not match token workspace",
                grant.invitation_id
            )));
        }
        if !stored.is_valid {
            return Err(AppError::Unauthorized(format!(
                "invitation {} already redeemed",
                grant.invitation_id
            )));
        }
        Ok(())
    }

    // Loses to a concurrent redemption of the same row when it returns Unauthorized.
    async fn consume_stored(&self, grant: &InvitationGrant) -> Result<(), AppError> {
        if !self.invitations.consume(grant.invitation_id).await? {
            return Err(AppError::Unauthorized(format!(
                "invitation {} already redeemed",
                grant.invitation_id
            )));
        }
        Ok(())
    }
}
