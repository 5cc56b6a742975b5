#![doc = "The `taskflow` library crate."]
#![doc = ""]
#![doc = "Identity and access for a multi-tenant task tracker: passwordless sign-in,"]
#![doc = "refresh-token rotation, workspace invitations, the request access gate and"]
#![doc = "the email notification queue. The binary (`main.rs`) wires these to"]
#![doc = "PostgreSQL, RabbitMQ and an actix-web server."]

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod models;
pub mod notification;
pub mod routes;
pub mod security;
pub mod store;
pub mod workspace;

use std::sync::Arc;

use actix_web::web;

use crate::auth::{AccessGate, AuthService, SessionService, TokenService};
use crate::config::{Config, RedemptionPolicy};
use crate::notification::NotificationChannel;
use crate::store::Stores;
use crate::workspace::{InvitationService, WorkspaceService};

/// Everything the HTTP layer needs, built once and shared by every worker.
#[derive(Clone)]
pub struct AppServices {
    pub tokens: Arc<TokenService>,
    pub gate: web::Data<AccessGate>,
    pub auth: web::Data<AuthService>,
    pub sessions: web::Data<SessionService>,
    pub workspaces: web::Data<WorkspaceService>,
    pub invitations: web::Data<InvitationService>,
}

impl AppServices {
    pub fn from_config(
        config: &Config,
        stores: Stores,
        notifications: Arc<dyn NotificationChannel>,
    ) -> Self {
        Self::new(
            Arc::new(TokenService::from_config(config)),
            stores,
            notifications,
            config.redemption_policy,
        )
    }

    pub fn new(
        tokens: Arc<TokenService>,
        stores: Stores,
        notifications: Arc<dyn NotificationChannel>,
        policy: RedemptionPolicy,
    ) -> Self {
        Self {
            gate: web::Data::new(AccessGate::new(tokens.clone(), stores.memberships.clone())),
            auth: web::Data::new(AuthService::new(
                tokens.clone(),
                stores.identities.clone(),
                notifications.clone(),
            )),
            sessions: web::Data::new(SessionService::new(
                tokens.clone(),
                stores.invalidations.clone(),
            )),
            workspaces: web::Data::new(WorkspaceService::new(
                stores.workspaces.clone(),
                stores.memberships.clone(),
            )),
            invitations: web::Data::new(InvitationService::new(
                tokens.clone(),
                &stores,
                notifications,
                policy,
            )),
            tokens,
        }
    }

    /// Registers the services as app data and mounts every route.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.gate.clone())
            .app_data(self.auth.clone())
            .app_data(self.sessions.clone())
            .app_data(self.workspaces.clone())
            .app_data(self.invitations.clone());
        routes::config(cfg);
    }
}
