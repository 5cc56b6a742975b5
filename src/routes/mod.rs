pub mod auth;
pub mod health;
pub mod invitations;
pub mod user;
pub mod workspaces;

use actix_web::web;

use crate::auth::{AuthMiddleware, MembershipGate};

/// Registers every route. Expects the services and the `AccessGate` as app data.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health).service(
        web::scope("/api")
            .service(
                web::scope("/auth")
                    .service(auth::request_magic_link)
                    .service(auth::verify)
                    .service(auth::refresh_token),
            )
            .service(
                web::scope("/user")
                    .wrap(AuthMiddleware)
                    .service(user::current_identity)
                    .service(user::get_profile)
                    .service(user::update_profile),
            )
            .service(
                web::scope("/invitation")
                    .wrap(AuthMiddleware)
                    .service(invitations::create_invitation)
                    .service(invitations::list_invitations)
                    .service(invitations::delete_invitation),
            )
            .service(web::scope("/membership").service(invitations::redeem_invitation))
            .service(
                web::scope("/workspaces")
                    .wrap(AuthMiddleware)
                    .service(workspaces::create_workspace)
                    .service(workspaces::list_my_workspaces)
                    .service(
                        web::scope("/{ws_id}")
                            .wrap(MembershipGate)
                            .service(workspaces::get_workspace)
                            .service(workspaces::update_workspace)
                            .service(workspaces::delete_workspace)
                            .service(workspaces::list_members)
                            .service(workspaces::remove_member),
                    ),
            ),
    );
}
