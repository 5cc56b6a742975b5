//! Passwordless sign-in.
//!
//! A magic link is a short-lived `login` token mailed to the address. Redeeming it
//! yields an access/refresh pair for the identity.

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::auth::token::{Purpose, TokenPair, TokenService};
use crate::error::AppError;
use crate::models::{Identity, Profile, ProfileInput};
use crate::notification::{MagicLinkPayload, NotificationChannel, NotificationMessage};
use crate::security::require_email;
use crate::store::IdentityStore;

/// Appended to the frontend URL, followed by the login token.
pub const VERIFY_PATH: &str = "/api/auth/verify?token=";

/// Returns the identity for `email`, creating it with an empty profile if unseen.
///
/// A concurrent creation for the same address surfaces as `AppError::Conflict`.
pub async fn find_or_create_identity(
    identities: &dyn IdentityStore,
    email: &str,
) -> Result<Identity, AppError> {
    if let Some(identity) = identities.find_by_email(email).await? {
        return Ok(identity);
    }
    let identity = identities.create(&Identity::new(email)).await?;
    log::info!("created identity {} for {}", identity.id, identity.email);
    Ok(identity)
}

pub struct AuthService {
    tokens: Arc<TokenService>,
    identities: Arc<dyn IdentityStore>,
    notifications: Arc<dyn NotificationChannel>,
}

impl AuthService {
    pub fn new(
        tokens: Arc<TokenService>,
        identities: Arc<dyn IdentityStore>,
        notifications: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self {
            tokens,
            identities,
            notifications,
        }
    }

    /// Mails a sign-in link to `email`. Fails as a whole if the message cannot be queued.
    pub async fn request_magic_link(&self, email: &str) -> Result<Identity, AppError> {
        require_email("email", email)?;

        let identity = find_or_create_identity(self.identities.as_ref(), email).await?;
        let token = self
            .tokens
            .issue_user_token(Purpose::Login, identity.id, &identity.email)?;

        let message = NotificationMessage::MagicLink(MagicLinkPayload {
            to_email: identity.email.clone(),
            token,
            verify_url: VERIFY_PATH.to_string(),
        });
        self.notifications.publish(&message).await?;

        log::info!("magic link queued for {}", identity.id);
        Ok(identity)
    }

    /// Exchanges a login token for a fresh session pair.
    pub fn verify(&self, token: &str) -> Result<TokenPair, AppError> {
        let claims = self.tokens.parse_user_token(token)?;
        claims.ensure(Purpose::Login)?;

        let pair = self
            .tokens
            .issue_pair(claims.extra.user_id, &claims.extra.email)?;
        log::info!("login verified for {}", claims.extra.user_id);
        Ok(pair)
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<Profile, AppError> {
        self.identities.get_profile(user_id).await
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: &ProfileInput,
    ) -> Result<Profile, AppError> {
        input.validate()?;
        self.identities.update_profile(user_id, &input.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenConfig;
    use crate::notification::MemoryChannel;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    struct Fixture {
        service: AuthService,
        tokens: Arc<TokenService>,
        store: Arc<MemoryStore>,
        channel: Arc<MemoryChannel>,
    }

    fn fixture() -> Fixture {
        let tokens = Arc::new(TokenService::new("auth-secret", "taskflow", TokenConfig::default()));
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(MemoryChannel::new());
        Fixture {
            service: AuthService::new(tokens.clone(), store.clone(), channel.clone()),
            tokens,
            store,
            channel,
        }
    }

    #[actix_rt::test]
    async fn test_magic_link_for_new_email_creates_identity_and_publishes() {
        let f = fixture();
        let identity = f.service.request_magic_link("new@example.com").await.unwrap();

        let stored = f.store.find_by_email("new@example.com").await.unwrap();
        assert_eq!(stored, Some(identity.clone()));

        let published = f.channel.published();
        assert_eq!(published.len(), 1);
        match &published[0] {
            NotificationMessage::MagicLink(payload) => {
                assert_eq!(payload.to_email, "new@example.com");
                assert_eq!(payload.verify_url, VERIFY_PATH);
                let claims = f.tokens.parse_user_token(&payload.token).unwrap();
                assert_eq!(claims.purpose(), Purpose::Login);
                assert_eq!(claims.extra.user_id, identity.id);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_magic_link_reuses_existing_identity() {
        let f = fixture();
        let first = f.service.request_magic_link("a@example.com").await.unwrap();
        let second = f.service.request_magic_link("a@example.com").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(f.channel.published().len(), 2);
    }

    #[actix_rt::test]
    async fn test_magic_link_rejects_bad_email_without_side_effects() {
        let f = fixture();
        let err = f.service.request_magic_link("not-an-email").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "email"));
        assert!(f.channel.published().is_empty());
    }

    #[actix_rt::test]
    async fn test_publish_failure_fails_the_request() {
        let f = fixture();
        f.channel.set_failing(true);
        let err = f.service.request_magic_link("a@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_verify_issues_matching_pair() {
        let f = fixture();
        let id = Uuid::new_v4();
        let login = f
            .tokens
            .issue_user_token(Purpose::Login, id, "a@example.com")
            .unwrap();

        let pair = f.service.verify(&login).unwrap();
        let access = f.tokens.parse_user_token(&pair.access_token).unwrap();
        let refresh = f.tokens.parse_user_token(&pair.refresh_token).unwrap();
        assert_eq!(access.purpose(), Purpose::Access);
        assert_eq!(refresh.purpose(), Purpose::Refresh);
        assert_eq!(access.extra, refresh.extra);
        assert_eq!(access.extra.user_id, id);
        assert_eq!(access.extra.email, "a@example.com");
    }

    #[test]
    fn test_verify_rejects_other_purposes() {
        let f = fixture();
        let access = f
            .tokens
            .issue_user_token(Purpose::Access, Uuid::new_v4(), "a@example.com")
            .unwrap();
        assert!(matches!(f.service.verify(&access), Err(AppError::Unauthorized(_))));
        assert!(matches!(f.service.verify("garbage"), Err(AppError::Unauthorized(_))));
    }

    #[actix_rt::test]
    async fn test_profile_update_validates_name() {
        let f = fixture();
        let identity = f.service.request_magic_link("p@example.com").await.unwrap();
        assert_eq!(f.service.profile(identity.id).await.unwrap().name, "");

        let updated = f
            .service
            .update_profile(identity.id, &ProfileInput { name: "Ada".into() })
            .await
            .unwrap();
        assert_eq!(updated.name, "Ada");

        let err = f
            .service
            .update_profile(identity.id, &ProfileInput { name: "".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
