//! Refresh-token rotation.
//!
//! A refresh token is burned by inserting its hash into the invalidation store before
//! replacements are issued. The insert is the check: if the hash is already present the
//! token was used before and the rotation is refused. Store failures refuse too.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::token::{Purpose, TokenPair, TokenService};
use crate::error::AppError;
use crate::models::InvalidationRecord;
use crate::security::hash_token;
use crate::store::InvalidationStore;

pub struct SessionService {
    tokens: Arc<TokenService>,
    invalidations: Arc<dyn InvalidationStore>,
}

impl SessionService {
    pub fn new(tokens: Arc<TokenService>, invalidations: Arc<dyn InvalidationStore>) -> Self {
        Self {
            tokens,
            invalidations,
        }
    }

    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.tokens.parse_user_token(refresh_token)?;
        claims.ensure(Purpose::Refresh)?;

        let record = InvalidationRecord {
            token_hash: hash_token(refresh_token),
            user_id: claims.extra.user_id,
            invalidated_at: Utc::now(),
            expires_at: claims.base.exp,
        };

        match self.invalidations.invalidate(&record).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(AppError::Unauthorized(format!(
                    "refresh token of {} was already used",
                    record.user_id
                )))
            }
            Err(e) => {
                log::error!("invalidation store failed during rotation: {}", e);
                return Err(AppError::Unauthorized(
                    "refresh token could not be burned".into(),
                ));
            }
        }

        let pair = self
            .tokens
            .issue_pair(claims.extra.user_id, &claims.extra.email)?;
        log::info!("rotated session for {}", claims.extra.user_id);
        Ok(pair)
    }

    /// Forgets burned refresh tokens that have expired on their own.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let purged = self.invalidations.purge_expired(Utc::now()).await?;
        if purged > 0 {
            log::info!("purged {} expired invalidation records", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenConfig;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use uuid::Uuid;

    struct UnavailableStore;

    #[async_trait]
    impl InvalidationStore for UnavailableStore {
        async fn invalidate(&self, _: &InvalidationRecord) -> Result<bool, AppError> {
            Err(AppError::Internal("connection refused".into()))
        }

        async fn is_invalidated(&self, _: &str) -> Result<bool, AppError> {
            Err(AppError::Internal("connection refused".into()))
        }

        async fn purge_expired(&self, _: DateTime<Utc>) -> Result<u64, AppError> {
            Err(AppError::Internal("connection refused".into()))
        }
    }

    fn tokens() -> Arc<TokenService> {
        Arc::new(TokenService::new("session-secret", "taskflow", TokenConfig::default()))
    }

    #[actix_rt::test]
    async fn test_second_rotation_with_same_token_is_rejected() {
        let tokens = tokens();
        let store = Arc::new(MemoryStore::new());
        let service = SessionService::new(tokens.clone(), store.clone());
        let id = Uuid::new_v4();
        let refresh = tokens
            .issue_user_token(Purpose::Refresh, id, "a@example.com")
            .unwrap();

        let pair = service.rotate(&refresh).await.unwrap();
        let rotated = tokens.parse_user_token(&pair.refresh_token).unwrap();
        assert_eq!(rotated.extra.user_id, id);
        assert!(store.is_invalidated(&hash_token(&refresh)).await.unwrap());

        let replay = service.rotate(&refresh).await;
        assert!(matches!(replay, Err(AppError::Unauthorized(_))));

        assert!(service.rotate(&pair.refresh_token).await.is_ok());
    }

    #[actix_rt::test]
    async fn test_rotation_requires_refresh_purpose() {
        let tokens = tokens();
        let store = Arc::new(MemoryStore::new());
        let service = SessionService::new(tokens.clone(), store.clone());
        let access = tokens
            .issue_user_token(Purpose::Access, Uuid::new_v4(), "a@example.com")
            .unwrap();

        assert!(matches!(
            service.rotate(&access).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(!store.is_invalidated(&hash_token(&access)).await.unwrap());
    }

    #[actix_rt::test]
    async fn test_store_failure_fails_closed() {
        let tokens = tokens();
        let service = SessionService::new(tokens.clone(), Arc::new(UnavailableStore));
        let refresh = tokens
            .issue_user_token(Purpose::Refresh, Uuid::new_v4(), "a@example.com")
            .unwrap();

        assert!(matches!(
            service.rotate(&refresh).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[actix_rt::test]
    async fn test_concurrent_rotations_yield_one_pair() {
        let tokens = tokens();
        let service = Arc::new(SessionService::new(tokens.clone(), Arc::new(MemoryStore::new())));
        let refresh = tokens
            .issue_user_token(Purpose::Refresh, Uuid::new_v4(), "a@example.com")
            .unwrap();

        let (a, b) = futures::join!(service.rotate(&refresh), service.rotate(&refresh));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[actix_rt::test]
    async fn test_purge_keeps_burned_tokens_that_are_still_live() {
        let tokens = tokens();
        let store = Arc::new(MemoryStore::new());
        let service = SessionService::new(tokens.clone(), store.clone());
        let refresh = tokens
            .issue_user_token(Purpose::Refresh, Uuid::new_v4(), "a@example.com")
            .unwrap();
        service.rotate(&refresh).await.unwrap();
        store
            .invalidate(&InvalidationRecord {
                token_hash: "stale".into(),
                user_id: Uuid::new_v4(),
                invalidated_at: Utc::now() - Duration::days(8),
                expires_at: Utc::now() - Duration::days(1),
            })
            .await
            .unwrap();

        assert_eq!(service.purge_expired().await.unwrap(), 1);
        assert!(!store.is_invalidated("stale").await.unwrap());
        assert!(matches!(
            service.rotate(&refresh).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[actix_rt::test]
    async fn test_purge_reports_store_failure() {
        let service = SessionService::new(tokens(), Arc::new(UnavailableStore));
        assert!(matches!(
            service.purge_expired().await,
            Err(AppError::Internal(_))
        ));
    }
}
