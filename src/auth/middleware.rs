use std::rc::Rc;

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use uuid::Uuid;

use crate::auth::extractors::{AuthenticatedUser, RequestContext};
use crate::auth::gate::AccessGate;
use crate::error::AppError;
use crate::security::parse_uuid;

fn gate_of(req: &ServiceRequest) -> Result<web::Data<AccessGate>, AppError> {
    req.app_data::<web::Data<AccessGate>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("access gate is not registered".into()))
}

fn authenticate(req: &ServiceRequest) -> Result<AuthenticatedUser, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    gate_of(req)?.authenticate(header)
}

async fn admit_member(req: &ServiceRequest) -> Result<Uuid, AppError> {
    let gate = gate_of(req)?;
    let workspace_id =
        parse_uuid("workspace_id", req.match_info().get("ws_id").unwrap_or_default())?;
    let identity = req
        .extensions()
        .get::<RequestContext>()
        .and_then(|ctx| ctx.identity.clone())
        .ok_or_else(|| AppError::Unauthorized("membership gate reached without identity".into()))?;

    gate.authorize_workspace(&identity, workspace_id).await?;
    Ok(workspace_id)
}

/// Admits only requests carrying a valid access token and binds the caller's identity
/// into the `RequestContext`. Rejections are answered here and never reach the handler.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match authenticate(&req) {
            Ok(user) => {
                log::debug!("authenticated {} for {}", user.user_id, req.path());
                req.extensions_mut().insert(RequestContext {
                    identity: Some(user),
                    workspace_id: None,
                });
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(app_err) => {
                let res = req.error_response(app_err).map_into_right_body();
                Box::pin(async move { Ok(res) })
            }
        }
    }
}

/// Admits only members of the workspace named by the `ws_id` path segment.
///
/// Must sit inside `AuthMiddleware`. Binds the workspace id into the `RequestContext`.
pub struct MembershipGate;

impl<S, B> Transform<S, ServiceRequest> for MembershipGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = MembershipGateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MembershipGateService {
            service: Rc::new(service),
        }))
    }
}

pub struct MembershipGateService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MembershipGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            match admit_member(&req).await {
                Ok(workspace_id) => {
                    if let Some(ctx) = req.extensions_mut().get_mut::<RequestContext>() {
                        ctx.workspace_id = Some(workspace_id);
                    }
                    service
                        .call(req)
                        .await
                        .map(ServiceResponse::map_into_left_body)
                }
                Err(app_err) => Ok(req.error_response(app_err).map_into_right_body()),
            }
        })
    }
}
