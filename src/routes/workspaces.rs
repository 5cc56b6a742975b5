use crate::{
    auth::{AuthenticatedUser, WorkspaceScope},
    error::AppError,
    models::WorkspaceInput,
    security::parse_uuid,
    workspace::WorkspaceService,
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MemberPath {
    pub user_id: String,
}

/// Create a workspace owned by the caller.
#[post("")]
pub async fn create_workspace(
    service: web::Data<WorkspaceService>,
    user: AuthenticatedUser,
    body: web::Json<WorkspaceInput>,
) -> Result<impl Responder, AppError> {
    let workspace = service.create(user.user_id, &body).await?;
    Ok(HttpResponse::Created().json(workspace))
}

/// Workspaces owned by the caller.
#[get("/mine")]
pub async fn list_my_workspaces(
    service: web::Data<WorkspaceService>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let workspaces = service.list_owned(user.user_id).await?;
    Ok(HttpResponse::Ok().json(workspaces))
}

#[get("")]
pub async fn get_workspace(
    service: web::Data<WorkspaceService>,
    scope: WorkspaceScope,
) -> Result<impl Responder, AppError> {
    let workspace = service.get(scope.workspace_id).await?;
    Ok(HttpResponse::Ok().json(workspace))
}

/// Rename a workspace (owner only).
#[put("")]
pub async fn update_workspace(
    service: web::Data<WorkspaceService>,
    scope: WorkspaceScope,
    body: web::Json<WorkspaceInput>,
) -> Result<impl Responder, AppError> {
    let workspace = service
        .rename(scope.user.user_id, scope.workspace_id, &body)
        .await?;
    Ok(HttpResponse::Ok().json(workspace))
}

/// Delete a workspace with its memberships and invitations (owner only).
#[delete("")]
pub async fn delete_workspace(
    service: web::Data<WorkspaceService>,
    scope: WorkspaceScope,
) -> Result<impl Responder, AppError> {
    service.delete(scope.user.user_id, scope.workspace_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[get("/members")]
pub async fn list_members(
    service: web::Data<WorkspaceService>,
    scope: WorkspaceScope,
) -> Result<impl Responder, AppError> {
    let members = service.members(scope.user.user_id, scope.workspace_id).await?;
    Ok(HttpResponse::Ok().json(members))
}

/// Remove a member (owner only). The owner cannot be removed.
#[delete("/members/{user_id}")]
pub async fn remove_member(
    service: web::Data<WorkspaceService>,
    scope: WorkspaceScope,
    path: web::Path<MemberPath>,
) -> Result<impl Responder, AppError> {
    let user_id = parse_uuid("user_id", &path.user_id)?;
    service
        .remove_member(scope.user.user_id, scope.workspace_id, user_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
