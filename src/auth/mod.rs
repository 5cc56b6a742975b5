pub mod extractors;
pub mod gate;
pub mod magic_link;
pub mod middleware;
pub mod session;
pub mod token;

use serde::{Deserialize, Serialize};

pub use extractors::{AuthenticatedUser, RequestContext, WorkspaceScope};
pub use gate::{AccessGate, MembershipCheck};
pub use magic_link::AuthService;
pub use middleware::{AuthMiddleware, MembershipGate};
pub use session::SessionService;
pub use token::{Claims, Purpose, TokenConfig, TokenError, TokenPair, TokenService};

/// Name of the HTTP-only cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Payload for requesting a magic link.
#[derive(Debug, Serialize, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

/// Token passed as a query parameter, as in verification and redemption links.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

/// Body returned by verification and rotation. The refresh token travels in a cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
}
