use crate::{
    auth::{
        AccessTokenResponse, AuthService, MagicLinkRequest, SessionService, TokenPair, TokenQuery,
        REFRESH_COOKIE,
    },
    error::AppError,
};
use actix_web::{
    cookie::{Cookie, SameSite},
    get, post, web, HttpRequest, HttpResponse, Responder,
};

fn session_response(pair: TokenPair) -> HttpResponse {
    let cookie = Cookie::build(REFRESH_COOKIE, pair.refresh_token)
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .finish();
    HttpResponse::Ok().cookie(cookie).json(AccessTokenResponse {
        access_token: pair.access_token,
    })
}

/// Request a magic link
///
/// Creates the identity on first use and queues a sign-in email.
///
/// ## Responses:
/// - `204 No Content`: The email was queued.
/// - `400 Bad Request`: The address is not a valid email.
/// - `409 Conflict`: A concurrent request created the same identity.
/// - `500 Internal Server Error`: The email could not be queued.
#[post("/magic-link")]
pub async fn request_magic_link(
    service: web::Data<AuthService>,
    body: web::Json<MagicLinkRequest>,
) -> Result<impl Responder, AppError> {
    service.request_magic_link(&body.email).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Verify a magic link
///
/// Exchanges a `login` token for an access token (body) and a refresh token (cookie).
#[get("/verify")]
pub async fn verify(
    service: web::Data<AuthService>,
    query: web::Query<TokenQuery>,
) -> Result<impl Responder, AppError> {
    let pair = service.verify(&query.token)?;
    Ok(session_response(pair))
}

/// Rotate the session
///
/// Burns the refresh token from the cookie and returns a fresh pair.
/// Presenting an already rotated token yields `401 Unauthorized`.
#[get("/refresh-token")]
pub async fn refresh_token(
    service: web::Data<SessionService>,
    req: HttpRequest,
) -> Result<impl Responder, AppError> {
    let cookie = req
        .cookie(REFRESH_COOKIE)
        .ok_or_else(|| AppError::Unauthorized("no refresh cookie".into()))?;
    let pair = service.rotate(cookie.value()).await?;
    Ok(session_response(pair))
}
