//! Purpose-scoped signed tokens.
//!
//! Every token carries a `purpose` and a matching single-entry audience. Parsing only
//! establishes that the token is well formed, signed with our key and from our issuer.
//! Whether it may be used is decided by the caller through [`Claims::ensure`], which
//! checks purpose and the `nbf`/`exp` window against the wall clock.

use std::fmt;

use chrono::{serde::ts_seconds, DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::Role;

/// The single allowed use of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Access,
    Login,
    Refresh,
    Invitation,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Purpose::Access => "access",
            Purpose::Login => "login",
            Purpose::Refresh => "refresh",
            Purpose::Invitation => "invitation",
        };
        f.write_str(name)
    }
}

/// Lifetime of each token purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenConfig {
    pub access: Duration,
    pub login: Duration,
    pub refresh: Duration,
    pub invitation: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access: Duration::days(365),
            login: Duration::minutes(15),
            refresh: Duration::days(7),
            invitation: Duration::hours(24),
        }
    }
}

impl TokenConfig {
    pub fn duration_for(&self, purpose: Purpose) -> Duration {
        match purpose {
            Purpose::Access => self.access,
            Purpose::Login => self.login,
            Purpose::Refresh => self.refresh,
            Purpose::Invitation => self.invitation,
        }
    }
}

/// Registered claims shared by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseClaims {
    pub purpose: Purpose,
    pub sub: String,
    pub iss: String,
    #[serde(with = "ts_seconds")]
    pub iat: DateTime<Utc>,
    #[serde(with = "ts_seconds")]
    pub nbf: DateTime<Utc>,
    #[serde(with = "ts_seconds")]
    pub exp: DateTime<Utc>,
    pub jti: String,
    pub aud: Vec<Purpose>,
}

impl BaseClaims {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.nbf <= now && now <= self.exp
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_expired(&self) -> bool {
        self.exp < Utc::now()
    }

}

/// Full claim set: the registered claims plus a purpose-specific extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims<E> {
    #[serde(flatten)]
    pub base: BaseClaims,
    #[serde(flatten)]
    pub extra: E,
}

impl<E> Claims<E> {
    pub fn purpose(&self) -> Purpose {
        self.base.purpose
    }

    pub fn is_valid(&self) -> bool {
        self.base.is_valid()
    }

    pub fn is_expired(&self) -> bool {
        self.base.is_expired()
    }

    /// Accepts the token only for `purpose` and only inside its validity window.
    pub fn ensure(&self, purpose: Purpose) -> Result<(), AppError> {
        if self.base.purpose != purpose {
            return Err(AppError::Unauthorized(format!(
                "wrong token purpose: expected {}, got {}",
                purpose, self.base.purpose
            )));
        }
        if !self.base.is_valid() {
            return Err(AppError::Unauthorized(format!(
                "{} token expired or not yet valid",
                purpose
            )));
        }
        Ok(())
    }
}

/// Extension carried by login, access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrant {
    pub user_id: Uuid,
    pub email: String,
}

/// Extension carried by invitation tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationGrant {
    pub invitation_id: Uuid,
    pub workspace_id: Uuid,
    pub inviter_id: Uuid,
    pub invitee_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitee_id: Option<Uuid>,
    pub role: Role,
}

pub type UserClaims = Claims<UserGrant>;
pub type InvitationClaims = Claims<InvitationGrant>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Why a token could not be issued or parsed. Never shown to end users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    InvalidSignature,
    Malformed,
    ClaimsTypeMismatch,
    ForeignIssuer,
    Signing(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenError::InvalidSignature => write!(f, "invalid signature"),
            TokenError::Malformed => write!(f, "malformed token"),
            TokenError::ClaimsTypeMismatch => write!(f, "claims do not match the expected shape"),
            TokenError::ForeignIssuer => write!(f, "token issued by someone else"),
            TokenError::Signing(msg) => write!(f, "failed to sign token: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<TokenError> for AppError {
    fn from(error: TokenError) -> AppError {
        match error {
            TokenError::Signing(msg) => AppError::Internal(format!("token signing: {}", msg)),
            other => AppError::Unauthorized(format!("invalid token: {}", other)),
        }
    }
}

/// Issues and parses HMAC-SHA-256 signed tokens.
///
/// Safe to share across request threads; it holds no mutable state.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    durations: TokenConfig,
}

impl TokenService {
    pub fn new(secret: &str, issuer: impl Into<String>, durations: TokenConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            durations,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.jwt_secret, config.jwt_issuer.clone(), config.token_durations)
    }

    fn base_claims(&self, purpose: Purpose, subject: String) -> Result<BaseClaims, TokenError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(self.durations.duration_for(purpose))
            .ok_or_else(|| TokenError::Signing(format!("{} token lifetime out of range", purpose)))?;
        Ok(BaseClaims {
            purpose,
            sub: subject,
            iss: self.issuer.clone(),
            iat: now,
            nbf: now,
            exp,
            jti: Uuid::new_v4().to_string(),
            aud: vec![purpose],
        })
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Signs a token for `purpose`, expiring after the configured duration for that purpose.
    pub fn issue<E: Serialize>(
        &self,
        purpose: Purpose,
        subject: impl Into<String>,
        extra: E,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            base: self.base_claims(purpose, subject.into())?,
            extra,
        };
        self.sign(&claims)
    }

    pub fn issue_user_token(
        &self,
        purpose: Purpose,
        user_id: Uuid,
        email: &str,
    ) -> Result<String, TokenError> {
        self.issue(
            purpose,
            user_id.to_string(),
            UserGrant {
                user_id,
                email: email.to_string(),
            },
        )
    }

    /// Issues a fresh access + refresh pair bound to the same identity.
    pub fn issue_pair(&self, user_id: Uuid, email: &str) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_user_token(Purpose::Access, user_id, email)?,
            refresh_token: self.issue_user_token(Purpose::Refresh, user_id, email)?,
        })
    }

    pub fn issue_invitation_token(&self, grant: InvitationGrant) -> Result<String, TokenError> {
        let subject = grant.invitee_email.clone();
        self.issue(Purpose::Invitation, subject, grant)
    }

    /// Verifies signature and issuer and decodes the claims into `Claims<E>`.
    ///
    /// Purpose and expiry are deliberately left to the caller.
    pub fn parse<E: DeserializeOwned>(&self, token: &str) -> Result<Claims<E>, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<Claims<E>>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                ErrorKind::InvalidIssuer => TokenError::ForeignIssuer,
                ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => {
                    TokenError::ClaimsTypeMismatch
                }
                _ => TokenError::Malformed,
            })
    }

    pub fn parse_user_token(&self, token: &str) -> Result<UserClaims, TokenError> {
        self.parse(token)
    }

    pub fn parse_invitation_token(&self, token: &str) -> Result<InvitationClaims, TokenError> {
        self.parse(token)
    }
}
