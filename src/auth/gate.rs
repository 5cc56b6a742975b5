//! Request admission.
//!
//! A request moves from unauthenticated to authenticated once its bearer token parses
//! as a valid access token, and optionally on to workspace-authorized once the
//! membership store confirms the caller belongs to the workspace. Every rejection is a
//! 401 whose specific reason only reaches the log.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::extractors::AuthenticatedUser;
use crate::auth::token::{Purpose, TokenService};
use crate::error::AppError;
use crate::store::MembershipStore;

/// Result of looking up a caller's membership. Errors and absence stay distinct here
/// even though both end in a rejection.
#[derive(Debug)]
pub enum MembershipCheck {
    Member,
    NotMember,
    Failed(AppError),
}

pub struct AccessGate {
    tokens: Arc<TokenService>,
    memberships: Arc<dyn MembershipStore>,
}

impl AccessGate {
    pub fn new(tokens: Arc<TokenService>, memberships: Arc<dyn MembershipStore>) -> Self {
        Self {
            tokens,
            memberships,
        }
    }

    /// Pulls the raw token out of an `Authorization` header value.
    /// The `Bearer ` prefix is optional.
    pub fn bearer_token(header: Option<&str>) -> Option<&str> {
        let value = header?.trim();
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    pub fn authenticate(&self, header: Option<&str>) -> Result<AuthenticatedUser, AppError> {
        let raw = Self::bearer_token(header)
            .ok_or_else(|| AppError::Unauthorized("no bearer token".into()))?;

        let claims = self.tokens.parse_user_token(raw)?;
        claims.ensure(Purpose::Access)?;

        Ok(AuthenticatedUser {
            user_id: claims.extra.user_id,
            email: claims.extra.email,
        })
    }

    pub async fn check_membership(&self, user_id: Uuid, workspace_id: Uuid) -> MembershipCheck {
        match self.memberships.is_member(user_id, workspace_id).await {
            Ok(true) => MembershipCheck::Member,
            Ok(false) => MembershipCheck::NotMember,
            Err(e) => MembershipCheck::Failed(e),
        }
    }

    pub async fn authorize_workspace(
        &self,
        user: &AuthenticatedUser,
        workspace_id: Uuid,
    ) -> Result<(), AppError> {
        match self.check_membership(user.user_id, workspace_id).await {
            MembershipCheck::Member => Ok(()),
            MembershipCheck::NotMember => Err(AppError::Unauthorized(format!(
                "user {} is not a member of workspace {}",
                user.user_id, workspace_id
            ))),
            MembershipCheck::Failed(e) => {
                log::error!("membership lookup failed: {}", e);
                Err(AppError::Unauthorized(format!(
                    "membership of {} in {} could not be verified",
                    user.user_id, workspace_id
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenConfig;
    use crate::models::{Membership, Role};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    struct BrokenMemberships;

    #[async_trait]
    impl MembershipStore for BrokenMemberships {
        async fn add(&self, _: &Membership) -> Result<Membership, AppError> {
            Err(AppError::Internal("down".into()))
        }
        async fn remove(&self, _: Uuid, _: Uuid) -> Result<(), AppError> {
            Err(AppError::Internal("down".into()))
        }
        async fn find(&self, _: Uuid, _: Uuid) -> Result<Option<Membership>, AppError> {
            Err(AppError::Internal("down".into()))
        }
        async fn is_member(&self, _: Uuid, _: Uuid) -> Result<bool, AppError> {
            Err(AppError::Internal("down".into()))
        }
        async fn list_by_workspace(&self, _: Uuid) -> Result<Vec<Membership>, AppError> {
            Err(AppError::Internal("down".into()))
        }
    }

    fn tokens() -> Arc<TokenService> {
        Arc::new(TokenService::new("gate-secret", "taskflow", TokenConfig::default()))
    }

    fn user() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "a@example.com".into(),
        }
    }

    #[test]
    fn test_bearer_prefix_is_optional() {
        assert_eq!(AccessGate::bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(AccessGate::bearer_token(Some("abc")), Some("abc"));
        assert_eq!(AccessGate::bearer_token(Some("Bearer ")), None);
        assert_eq!(AccessGate::bearer_token(None), None);
    }

    #[test]
    fn test_authenticate_accepts_only_access_tokens() {
        let tokens = tokens();
        let gate = AccessGate::new(tokens.clone(), Arc::new(MemoryStore::new()));
        let id = Uuid::new_v4();

        let access = tokens.issue_user_token(Purpose::Access, id, "a@example.com").unwrap();
        let user = gate.authenticate(Some(format!("Bearer {}", access).as_str())).unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.email, "a@example.com");

        let refresh = tokens.issue_user_token(Purpose::Refresh, id, "a@example.com").unwrap();
        assert!(matches!(
            gate.authenticate(Some(refresh.as_str())),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(gate.authenticate(None), Err(AppError::Unauthorized(_))));
        assert!(matches!(
            gate.authenticate(Some("Bearer not-a-token")),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_authenticate_rejects_expired_access_token() {
        let durations = TokenConfig {
            access: Duration::seconds(-60),
            ..TokenConfig::default()
        };
        let tokens = Arc::new(TokenService::new("gate-secret", "taskflow", durations));
        let gate = AccessGate::new(tokens.clone(), Arc::new(MemoryStore::new()));
        let access = tokens
            .issue_user_token(Purpose::Access, Uuid::new_v4(), "a@example.com")
            .unwrap();

        assert!(matches!(
            gate.authenticate(Some(access.as_str())),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[actix_rt::test]
    async fn test_membership_outcomes_are_distinguishable_but_both_reject() {
        let store = Arc::new(MemoryStore::new());
        let gate = AccessGate::new(tokens(), store.clone());
        let member = user();
        let workspace_id = Uuid::new_v4();
        store
            .add(&Membership {
                user_id: member.user_id,
                workspace_id,
                role: Role::Member,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(gate.authorize_workspace(&member, workspace_id).await.is_ok());

        let outsider = user();
        assert!(matches!(
            gate.check_membership(outsider.user_id, workspace_id).await,
            MembershipCheck::NotMember
        ));
        assert!(matches!(
            gate.authorize_workspace(&outsider, workspace_id).await,
            Err(AppError::Unauthorized(_))
        ));

        let broken = AccessGate::new(tokens(), Arc::new(BrokenMemberships));
        assert!(matches!(
            broken.check_membership(member.user_id, workspace_id).await,
            MembershipCheck::Failed(_)
        ));
        assert!(matches!(
            broken.authorize_workspace(&member, workspace_id).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
