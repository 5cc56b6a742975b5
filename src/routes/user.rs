use crate::{
    auth::{AuthService, AuthenticatedUser},
    error::AppError,
    models::ProfileInput,
};
use actix_web::{get, put, web, HttpResponse, Responder};

/// The identity bound to the access token.
#[get("/auth")]
pub async fn current_identity(user: AuthenticatedUser) -> impl Responder {
    HttpResponse::Ok().json(user)
}

#[get("/profile")]
pub async fn get_profile(
    service: web::Data<AuthService>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let profile = service.profile(user.user_id).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Update the display name (1 to 100 characters).
#[put("/profile")]
pub async fn update_profile(
    service: web::Data<AuthService>,
    user: AuthenticatedUser,
    body: web::Json<ProfileInput>,
) -> Result<impl Responder, AppError> {
    let profile = service.update_profile(user.user_id, &body).await?;
    Ok(HttpResponse::Ok().json(profile))
}
