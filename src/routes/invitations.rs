use crate::{
    auth::{AuthenticatedUser, TokenQuery},
    error::AppError,
    workspace::{invitation::InvitationListQuery, CreateInvitationRequest, InvitationService},
};
use actix_web::{delete, get, post, web, HttpResponse, Responder};

/// Invite someone into a workspace
///
/// The caller must be an owner or admin of the workspace. The invitee receives an email
/// with a redemption link.
///
/// ## Responses:
/// - `201 Created`: Returns the stored `Invitation`.
/// - `400 Bad Request`: Malformed identifiers, email or role.
/// - `403 Forbidden`: The caller may not invite into this workspace.
/// - `404 Not Found`: The workspace does not exist.
/// - `500 Internal Server Error`: The email could not be queued.
#[post("")]
pub async fn create_invitation(
    service: web::Data<InvitationService>,
    user: AuthenticatedUser,
    body: web::Json<CreateInvitationRequest>,
) -> Result<impl Responder, AppError> {
    let invitation = service.create(user.user_id, &body).await?;
    Ok(HttpResponse::Created().json(invitation))
}

/// List a workspace's invitations (owner only).
#[get("")]
pub async fn list_invitations(
    service: web::Data<InvitationService>,
    user: AuthenticatedUser,
    query: web::Query<InvitationListQuery>,
) -> Result<impl Responder, AppError> {
    let invitations = service.list(user.user_id, &query.workspace_id).await?;
    Ok(HttpResponse::Ok().json(invitations))
}

/// Delete an invitation (inviter only).
#[delete("/{invitation_id}")]
pub async fn delete_invitation(
    service: web::Data<InvitationService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    service.delete(user.user_id, &path).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Redeem an invitation
///
/// Public: the invitation token itself is the credential.
///
/// ## Responses:
/// - `201 Created`: Returns the new `Membership`.
/// - `401 Unauthorized`: The token is invalid, expired or not an invitation token.
/// - `409 Conflict`: The invitee is already a member.
#[get("/add")]
pub async fn redeem_invitation(
    service: web::Data<InvitationService>,
    query: web::Query<TokenQuery>,
) -> Result<impl Responder, AppError> {
    let membership = service.redeem(&query.token).await?;
    Ok(HttpResponse::Created().json(membership))
}
