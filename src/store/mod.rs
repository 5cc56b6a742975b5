//! Persistence collaborators.
//!
//! Flows only ever see these traits. `PgStore` backs them with PostgreSQL and
//! `MemoryStore` keeps everything in process for tests and local runs.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Identity, InvalidationRecord, Invitation, Membership, Profile, Workspace};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError>;

    /// Creates the identity together with its empty profile.
    ///
    /// A second identity with the same email fails with `AppError::Conflict`.
    async fn create(&self, identity: &Identity) -> Result<Identity, AppError>;

    async fn get_profile(&self, id: Uuid) -> Result<Profile, AppError>;

    async fn update_profile(&self, id: Uuid, name: &str) -> Result<Profile, AppError>;
}

#[async_trait]
pub trait InvalidationStore: Send + Sync {
    /// Inserts the record unless one with the same hash exists.
    ///
    /// Returns `true` if this call burned the token, `false` if it was already burned.
    /// Check and insert happen as one operation inside the store.
    async fn invalidate(&self, record: &InvalidationRecord) -> Result<bool, AppError>;

    async fn is_invalidated(&self, token_hash: &str) -> Result<bool, AppError>;

    /// Drops records whose token expired at or before `now` and returns how many went.
    ///
    /// An expired token fails validation before the store is consulted, so its record
    /// no longer protects anything.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Persists the workspace and its owner membership in one transaction.
    async fn create_with_owner(&self, workspace: &Workspace) -> Result<Workspace, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Workspace>, AppError>;

    async fn update_name(&self, id: Uuid, name: &str) -> Result<Workspace, AppError>;

    /// Removes the workspace along with its memberships and invitations.
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Workspace>, AppError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Fails with `AppError::Conflict` if the user already belongs to the workspace.
    async fn add(&self, membership: &Membership) -> Result<Membership, AppError>;

    async fn remove(&self, user_id: Uuid, workspace_id: Uuid) -> Result<(), AppError>;

    async fn find(&self, user_id: Uuid, workspace_id: Uuid) -> Result<Option<Membership>, AppError>;

    async fn is_member(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, AppError>;

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Membership>, AppError>;
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn create(&self, invitation: &Invitation) -> Result<Invitation, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Invitation>, AppError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppError>;

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Invitation>, AppError>;

    /// Flips `is_valid` from true to false. Returns `false` if it was already consumed.
    async fn consume(&self, id: Uuid) -> Result<bool, AppError>;
}

/// The full set of stores the flows are wired against.
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityStore>,
    pub invalidations: Arc<dyn InvalidationStore>,
    pub workspaces: Arc<dyn WorkspaceStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub invitations: Arc<dyn InvitationStore>,
}

impl Stores {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_shared(Arc::new(PgStore::new(pool)))
    }

    /// Uses one backend for every store.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: IdentityStore
            + InvalidationStore
            + WorkspaceStore
            + MembershipStore
            + InvitationStore
            + 'static,
    {
        Self {
            identities: store.clone(),
            invalidations: store.clone(),
            workspaces: store.clone(),
            memberships: store.clone(),
            invitations: store,
        }
    }
}
