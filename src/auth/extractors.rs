use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;

/// The identity bound to a request by `AuthMiddleware`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
}

/// Typed per-request context. Only the gate middlewares write to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub identity: Option<AuthenticatedUser>,
    pub workspace_id: Option<Uuid>,
}

impl RequestContext {
    pub fn of(req: &HttpRequest) -> RequestContext {
        req.extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default()
    }
}

/// A caller that passed the membership gate for the workspace in the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceScope {
    pub user: AuthenticatedUser,
    pub workspace_id: Uuid,
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match RequestContext::of(req).identity {
            Some(user) => ready(Ok(user)),
            None => {
                let err = AppError::Unauthorized(format!(
                    "no identity bound to request for {}",
                    req.path()
                ));
                ready(Err(err.into()))
            }
        }
    }
}

impl FromRequest for WorkspaceScope {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match RequestContext::of(req) {
            RequestContext {
                identity: Some(user),
                workspace_id: Some(workspace_id),
            } => ready(Ok(WorkspaceScope { user, workspace_id })),
            _ => {
                let err = AppError::Unauthorized(format!(
                    "no workspace scope bound to request for {}",
                    req.path()
                ));
                ready(Err(err.into()))
            }
        }
    }
}
