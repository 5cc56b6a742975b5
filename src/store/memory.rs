//! In-process store.
//!
//! Suitable for tests and single-process development. Nothing survives a restart and
//! nothing is shared between processes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{IdentityStore, InvalidationStore, InvitationStore, MembershipStore, WorkspaceStore};
use crate::error::AppError;
use crate::models::{Identity, InvalidationRecord, Invitation, Membership, Profile, Workspace};

#[derive(Default)]
struct State {
    identities: HashMap<Uuid, Identity>,
    profiles: HashMap<Uuid, Profile>,
    invalidated: HashMap<String, InvalidationRecord>,
    workspaces: HashMap<Uuid, Workspace>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
    invitations: HashMap<Uuid, Invitation>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        let state = self.state()?;
        Ok(state.identities.values().find(|i| i.email == email).cloned())
    }

    async fn create(&self, identity: &Identity) -> Result<Identity, AppError> {
        let mut state = self.state()?;
        if state
            .identities
            .values()
            .any(|i| i.email == identity.email || i.id == identity.id)
        {
            return Err(AppError::Conflict("Identity already exists".into()));
        }
        state.identities.insert(identity.id, identity.clone());
        state.profiles.insert(
            identity.id,
            Profile {
                id: identity.id,
                name: String::new(),
            },
        );
        Ok(identity.clone())
    }

    async fn get_profile(&self, id: Uuid) -> Result<Profile, AppError> {
        self.state()?
            .profiles
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Profile not found".into()))
    }

    async fn update_profile(&self, id: Uuid, name: &str) -> Result<Profile, AppError> {
        let mut state = self.state()?;
        let profile = state
            .profiles
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Profile not found".into()))?;
        profile.name = name.to_string();
        Ok(profile.clone())
    }
}

#[async_trait]
impl InvalidationStore for MemoryStore {
    async fn invalidate(&self, record: &InvalidationRecord) -> Result<bool, AppError> {
        let mut state = self.state()?;
        if state.invalidated.contains_key(&record.token_hash) {
            return Ok(false);
        }
        state
            .invalidated
            .insert(record.token_hash.clone(), record.clone());
        Ok(true)
    }

    async fn is_invalidated(&self, token_hash: &str) -> Result<bool, AppError> {
        Ok(self.state()?.invalidated.contains_key(token_hash))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state()?;
        let before = state.invalidated.len();
        state.invalidated.retain(|_, record| record.expires_at > now);
        Ok((before - state.invalidated.len()) as u64)
    }
}

#[async_trait]
impl WorkspaceStore for MemoryStore {
    async fn create_with_owner(&self, workspace: &Workspace) -> Result<Workspace, AppError> {
        let mut state = self.state()?;
        if state.workspaces.contains_key(&workspace.id) {
            return Err(AppError::Conflict("Workspace already exists".into()));
        }
        state.workspaces.insert(workspace.id, workspace.clone());
        state.memberships.insert(
            (workspace.owner_id, workspace.id),
            workspace.owner_membership(),
        );
        Ok(workspace.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Workspace>, AppError> {
        Ok(self.state()?.workspaces.get(&id).cloned())
    }

    async fn update_name(&self, id: Uuid, name: &str) -> Result<Workspace, AppError> {
        let mut state = self.state()?;
        let workspace = state
            .workspaces
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Workspace not found".into()))?;
        workspace.name = name.to_string();
        Ok(workspace.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.state()?;
        if state.workspaces.remove(&id).is_none() {
            return Err(AppError::NotFound("Workspace not found".into()));
        }
        state.memberships.retain(|(_, ws), _| *ws != id);
        state.invitations.retain(|_, inv| inv.workspace_id != id);
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Workspace>, AppError> {
        let state = self.state()?;
        let mut workspaces: Vec<Workspace> = state
            .workspaces
            .values()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect();
        workspaces.sort_by_key(|w| w.created_at);
        Ok(workspaces)
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn add(&self, membership: &Membership) -> Result<Membership, AppError> {
        let mut state = self.state()?;
        let key = (membership.user_id, membership.workspace_id);
        if state.memberships.contains_key(&key) {
            return Err(AppError::Conflict("Membership already exists".into()));
        }
        state.memberships.insert(key, membership.clone());
        Ok(membership.clone())
    }

    async fn remove(&self, user_id: Uuid, workspace_id: Uuid) -> Result<(), AppError> {
        self.state()?
            .memberships
            .remove(&(user_id, workspace_id))
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Membership not found".into()))
    }

    async fn find(&self, user_id: Uuid, workspace_id: Uuid) -> Result<Option<Membership>, AppError> {
        Ok(self.state()?.memberships.get(&(user_id, workspace_id)).cloned())
    }

    async fn is_member(&self, user_id: Uuid, workspace_id: Uuid) -> Result<bool, AppError> {
        Ok(self.state()?.memberships.contains_key(&(user_id, workspace_id)))
    }

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Membership>, AppError> {
        let state = self.state()?;
        let mut members: Vec<Membership> = state
            .memberships
            .values()
            .filter(|m| m.workspace_id == workspace_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.created_at);
        Ok(members)
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn create(&self, invitation: &Invitation) -> Result<Invitation, AppError> {
        let mut state = self.state()?;
        if state.invitations.contains_key(&invitation.id) {
            return Err(AppError::Conflict("Invitation already exists".into()));
        }
        state.invitations.insert(invitation.id, invitation.clone());
        Ok(invitation.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Invitation>, AppError> {
        Ok(self.state()?.invitations.get(&id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.state()?
            .invitations
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Invitation not found".into()))
    }

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Invitation>, AppError> {
        let state = self.state()?;
        let mut invitations: Vec<Invitation> = state
            .invitations
            .values()
            .filter(|i| i.workspace_id == workspace_id)
            .cloned()
            .collect();
        invitations.sort_by_key(|i| i.created_at);
        Ok(invitations)
    }

    async fn consume(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state()?;
        match state.invitations.get_mut(&id) {
            Some(invitation) if invitation.is_valid => {
                invitation.is_valid = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
