//! PostgreSQL store over a shared `sqlx::PgPool`.
//!
//! Expects the `auth`, `user_profile`, `invalid_token`, `workspace`, `membership` and
//! `invitation` tables to exist, with `UUID` identifier columns and a
//! `membership_role` enum.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{IdentityStore, InvalidationStore, InvitationStore, MembershipStore, WorkspaceStore};
use crate::error::AppError;
use crate::models::{Identity, InvalidationRecord, Invitation, Membership, Profile, Workspace};

const INVITATION_COLUMNS: &str =
    "id, workspace_id, inviter_id, invitee_email, invitee_id, role, is_valid, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        let identity =
            sqlx::query_as::<_, Identity>("SELECT id, email, created_at FROM auth WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(identity)
    }

    async fn create(&self, identity: &Identity) -> Result<Identity, AppError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Identity>(
            "INSERT INTO auth (id, email, created_at) VALUES ($1, $2, $3) \
             RETURNING id, email, created_at",
        )
        .bind(identity.id)
        .bind(&identity.email)
        .bind(identity.created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO user_profile (id, name) VALUES ($1, '')")
            .bind(identity.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get_profile(&self, id: Uuid) -> Result<Profile, AppError> {
        sqlx::query_as::<_, Profile>("SELECT id, name FROM user_profile WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Profile not found".into()))
    }

    async fn update_profile(&self, id: Uuid, name: &str) -> Result<Profile, AppError> {
        sqlx::query_as::<_, Profile>(
            "UPDATE user_profile SET name = $2 WHERE id = $1 RETURNING id, name",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".into()))
    }
}

#[async_trait]
impl InvalidationStore for PgStore {
    async fn invalidate(&self, record: &InvalidationRecord) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO invalid_token (token_hash, user_id, invalidated_at, expires_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (token_hash) DO NOTHING",
        )
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(record.invalidated_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn is_invalidated(&self, token_hash: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM invalid_token WHERE token_hash = $1)",
        )
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM invalid_token WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl WorkspaceStore for PgStore {
    async fn create_with_owner(&self, workspace: &Workspace) -> Result<Workspace, AppError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Workspace>(
            "INSERT INTO workspace (id, name, owner_id, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING id, name, owner_id, created_at",
        )
        .bind(workspace.id)
        .bind(&workspace.name)
        .bind(workspace.owner_id)
        .bind(workspace.created_at)
        .fetch_one(&mut *tx)
        .await?;

        let owner = workspace.owner_membership();
        sqlx::query(
            "INSERT INTO membership (user_id, workspace_id, role, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(owner.user_id)
        .bind(owner.workspace_id)
        .bind(owner.role)
        .bind(owner.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Workspace>, AppError> {
        let workspace = sqlx::query_as::<_, Workspace>(
            "SELECT id, name, owner_id, created_at FROM workspace WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(workspace)
    }

    async fn update_name(&self, id: Uuid, name: &str) -> Result<Workspace, AppError> {
        sqlx::query_as::<_, Workspace>(
            "UPDATE workspace SET name = $2, updated_at = $3 WHERE id = $1 \
             RETURNING id, name, owner_id, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Workspace not found".into()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM invitation WHERE workspace_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM membership WHERE workspace_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM workspace WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Workspace not found".into()));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Workspace>, AppError> {
        let workspaces = sqlx::query_as::<_, Workspace>(
            "SELECT id, name, owner_id, created_at FROM workspace \
             WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(workspaces)
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn add(&self, membership: &Membership) -> Result<Membership, AppError> {
        let created = sqlx::query_as::<_, Membership>(
            "INSERT INTO membership (user_id, workspace_id, role, created_at) VALUES ($1, $2, $3, $4) \
             RETURNING user_id, workspace_id, role, created_at",
        )
        .bind(membership.user_id)
        .bind(membership.workspace_id)
        .bind(membership.role)
        .bind(membership.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("Membership already exists".into()),
            other => other,
        })?;
        Ok(created)
    }

    async fn remove(&self, user_id: Uuid, workspace_id: Uuid) -> Result<(), AppError> {
        let result =
            sqlx::query("DELETE FROM membership WHERE user_id = $1 AND workspace_id = $2")
                .bind(user_id)
                .bind(workspace_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Membership not found".into()));
        }
        Ok(())
    }

    async fn find(&self, user_id: Uuid, workspace_id: Uuid) -> Result<Option<Membership>, AppError> {
        let membership = sqlx::query_as::<_, Membership>(
            "SELECT user_id, workspace_id, role, created_at FROM membership \
             WHERE user_id = $1 AND workspace_id = $2",
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(membership)
    }

    async fn is_member(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM membership WHERE user_id = $1 AND workspace_id = $2)",
        )
        .bind(user_id)
        .bind(workspace_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Membership>, AppError> {
        let members = sqlx::query_as::<_, Membership>(
            "SELECT user_id, workspace_id, role, created_at FROM membership \
             WHERE workspace_id = $1 ORDER BY created_at",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }
}

#[async_trait]
impl InvitationStore for PgStore {
    async fn create(&self, invitation: &Invitation) -> Result<Invitation, AppError> {
        let sql = format!(
            "INSERT INTO invitation ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {cols}",
            cols = INVITATION_COLUMNS
        );
        let created = sqlx::query_as::<_, Invitation>(&sql)
            .bind(invitation.id)
            .bind(invitation.workspace_id)
            .bind(invitation.inviter_id)
            .bind(&invitation.invitee_email)
            .bind(invitation.invitee_id)
            .bind(invitation.role)
            .bind(invitation.is_valid)
            .bind(invitation.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Invitation>, AppError> {
        let sql = format!("SELECT {} FROM invitation WHERE id = $1", INVITATION_COLUMNS);
        let invitation = sqlx::query_as::<_, Invitation>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invitation)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM invitation WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Invitation not found".into()));
        }
        Ok(())
    }

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Invitation>, AppError> {
        let sql = format!(
            "SELECT {} FROM invitation WHERE workspace_id = $1 ORDER BY created_at",
            INVITATION_COLUMNS
        );
        let invitations = sqlx::query_as::<_, Invitation>(&sql)
            .bind(workspace_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(invitations)
    }

    async fn consume(&self, id: Uuid) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE invitation SET is_valid = FALSE WHERE id = $1 AND is_valid")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}
