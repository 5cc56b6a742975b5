use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{test, App};
use pretty_assertions::assert_eq;
use serde_json::json;
use taskflow::auth::{Purpose, TokenConfig, TokenService};
use taskflow::config::RedemptionPolicy;
use taskflow::models::{Identity, Membership, Role, Workspace};
use taskflow::notification::{MemoryChannel, NotificationMessage};
use taskflow::store::{IdentityStore, MembershipStore, MemoryStore, Stores, WorkspaceStore};
use taskflow::AppServices;
use uuid::Uuid;

struct Harness {
    services: AppServices,
    store: Arc<MemoryStore>,
    channel: Arc<MemoryChannel>,
}

impl Harness {
    fn new(policy: RedemptionPolicy) -> Self {
        let tokens = Arc::new(TokenService::new(
            "integration-secret",
            "taskflow",
            TokenConfig::default(),
        ));
        let store = Arc::new(MemoryStore::new());
        let channel = Arc::new(MemoryChannel::new());
        let services = AppServices::new(
            tokens,
            Stores::from_shared(store.clone()),
            channel.clone(),
            policy,
        );
        Self {
            services,
            store,
            channel,
        }
    }

    async fn identity(&self, email: &str) -> Identity {
        IdentityStore::create(self.store.as_ref(), &Identity::new(email))
            .await
            .unwrap()
    }

    fn bearer(&self, identity: &Identity) -> String {
        let token = self
            .services
            .tokens
            .issue_user_token(Purpose::Access, identity.id, &identity.email)
            .unwrap();
        format!("Bearer {}", token)
    }

    fn invitation_token(&self) -> String {
        match self.channel.last() {
            Some(NotificationMessage::Invitation(payload)) => payload.token,
            other => panic!("expected an invitation message, got {:?}", other),
        }
    }
}

#[actix_rt::test]
async fn test_invite_and_redeem_over_http() {
    let h = Harness::new(RedemptionPolicy::Stateless);
    let app = test::init_service(App::new().configure(|cfg| h.services.configure(cfg))).await;
    let alice = h.identity("alice@example.com").await;

    let req = test::TestRequest::post()
        .uri("/api/workspaces")
        .insert_header((header::AUTHORIZATION, h.bearer(&alice)))
        .set_json(json!({ "name": "W" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let workspace: Workspace = test::read_body_json(resp).await;
    assert_eq!(workspace.owner_id, alice.id);

    let req = test::TestRequest::post()
        .uri("/api/invitation")
        .insert_header((header::AUTHORIZATION, h.bearer(&alice)))
        .set_json(json!({
            "invitee_email": "bob@example.com",
            "workspace_id": workspace.id.to_string(),
            "role": "member"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    match h.channel.last() {
        Some(NotificationMessage::Invitation(payload)) => {
            assert_eq!(payload.to_email, "bob@example.com");
            assert_eq!(payload.workspace_name, "W");
            assert_eq!(payload.role, "member");
        }
        other => panic!("expected an invitation message, got {:?}", other),
    }
    let token = h.invitation_token();

    // Redemption is public; the token is the credential.
    let req = test::TestRequest::get()
        .uri(&format!("/api/membership/add?token={}", token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let membership: Membership = test::read_body_json(resp).await;

    let bob = h
        .store
        .find_by_email("bob@example.com")
        .await
        .unwrap()
        .expect("redemption should create the invitee");
    assert_eq!(membership.user_id, bob.id);
    assert_eq!(membership.workspace_id, workspace.id);
    assert_eq!(membership.role, Role::Member);
    assert!(h.store.is_member(bob.id, workspace.id).await.unwrap());

    // Bob now passes the gate and sees the workspace.
    let req = test::TestRequest::get()
        .uri(&format!("/api/workspaces/{}", workspace.id))
        .insert_header((header::AUTHORIZATION, h.bearer(&bob)))
        .to_request();
    let fetched: Workspace = test::call_and_read_body_json(&app, req).await;
    assert_eq!(fetched, workspace);

    // A second redemption of the same token collides with the existing membership.
    let req = test::TestRequest::get()
        .uri(&format!("/api/membership/add?token={}", token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[actix_rt::test]
async fn test_gate_rejects_non_members_without_side_effects() {
    let h = Harness::new(RedemptionPolicy::Stateless);
    let app = test::init_service(App::new().configure(|cfg| h.services.configure(cfg))).await;
    let alice = h.identity("alice@example.com").await;
    let carol = h.identity("carol@example.com").await;
    let workspace = h
        .store
        .create_with_owner(&Workspace::new("W", alice.id))
        .await
        .unwrap();

    let requests = vec![
        test::TestRequest::get().uri(&format!("/api/workspaces/{}", workspace.id)),
        test::TestRequest::get().uri(&format!("/api/workspaces/{}/members", workspace.id)),
        test::TestRequest::put()
            .uri(&format!("/api/workspaces/{}", workspace.id))
            .set_json(json!({ "name": "taken" })),
        test::TestRequest::delete().uri(&format!("/api/workspaces/{}", workspace.id)),
        test::TestRequest::delete()
            .uri(&format!("/api/workspaces/{}/members/{}", workspace.id, alice.id)),
    ];

    for req in requests {
        let req = req
            .insert_header((header::AUTHORIZATION, h.bearer(&carol)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "unauthorized" }));
    }

    let stored = WorkspaceStore::get(h.store.as_ref(), workspace.id)
        .await
        .unwrap()
        .expect("workspace should survive rejected requests");
    assert_eq!(stored.name, "W");
    let members = MembershipStore::list_by_workspace(h.store.as_ref(), workspace.id)
        .await
        .unwrap();
    assert_eq!(members.len(), 1);

    // Unknown workspaces look the same as foreign ones; malformed ids are a 400.
    let req = test::TestRequest::get()
        .uri(&format!("/api/workspaces/{}", Uuid::new_v4()))
        .insert_header((header::AUTHORIZATION, h.bearer(&carol)))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
    let req = test::TestRequest::get()
        .uri("/api/workspaces/not-a-uuid")
        .insert_header((header::AUTHORIZATION, h.bearer(&carol)))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[actix_rt::test]
async fn test_members_cannot_manage_the_workspace() {
    let h = Harness::new(RedemptionPolicy::Stateless);
    let app = test::init_service(App::new().configure(|cfg| h.services.configure(cfg))).await;
    let alice = h.identity("alice@example.com").await;
    let bob = h.identity("bob@example.com").await;
    let workspace = h
        .store
        .create_with_owner(&Workspace::new("W", alice.id))
        .await
        .unwrap();
    h.store
        .add(&Membership {
            user_id: bob.id,
            workspace_id: workspace.id,
            role: Role::Member,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/api/workspaces/{}", workspace.id))
        .insert_header((header::AUTHORIZATION, h.bearer(&bob)))
        .set_json(json!({ "name": "Mine now" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/workspaces/{}", workspace.id))
        .insert_header((header::AUTHORIZATION, h.bearer(&bob)))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    // A plain member may not invite either.
    let req = test::TestRequest::post()
        .uri("/api/invitation")
        .insert_header((header::AUTHORIZATION, h.bearer(&bob)))
        .set_json(json!({
            "invitee_email": "dave@example.com",
            "workspace_id": workspace.id.to_string(),
            "role": "member"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    assert!(h.channel.published().is_empty());

    // The owner renames, lists members, and cannot remove themselves.
    let req = test::TestRequest::put()
        .uri(&format!("/api/workspaces/{}", workspace.id))
        .insert_header((header::AUTHORIZATION, h.bearer(&alice)))
        .set_json(json!({ "name": "Renamed" }))
        .to_request();
    let renamed: Workspace = test::call_and_read_body_json(&app, req).await;
    assert_eq!(renamed.name, "Renamed");

    let req = test::TestRequest::get()
        .uri(&format!("/api/workspaces/{}/members", workspace.id))
        .insert_header((header::AUTHORIZATION, h.bearer(&alice)))
        .to_request();
    let members: Vec<Membership> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(members.len(), 2);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/workspaces/{}/members/{}", workspace.id, alice.id))
        .insert_header((header::AUTHORIZATION, h.bearer(&alice)))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );

    let req = test::TestRequest::delete()
        .uri(&format!("/api/workspaces/{}/members/{}", workspace.id, bob.id))
        .insert_header((header::AUTHORIZATION, h.bearer(&alice)))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    // Bob is out, so the gate now turns him away.
    let req = test::TestRequest::get()
        .uri(&format!("/api/workspaces/{}", workspace.id))
        .insert_header((header::AUTHORIZATION, h.bearer(&bob)))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_rt::test]
async fn test_strict_redemption_is_single_use() {
    let h = Harness::new(RedemptionPolicy::Strict);
    let app = test::init_service(App::new().configure(|cfg| h.services.configure(cfg))).await;
    let alice = h.identity("alice@example.com").await;
    let workspace = h
        .store
        .create_with_owner(&Workspace::new("W", alice.id))
        .await
        .unwrap();

    let invite = |email: &str| {
        test::TestRequest::post()
            .uri("/api/invitation")
            .insert_header((header::AUTHORIZATION, h.bearer(&alice)))
            .set_json(json!({
                "invitee_email": email,
                "workspace_id": workspace.id.to_string(),
                "role": "admin"
            }))
            .to_request()
    };

    let resp = test::call_service(&app, invite("erin@example.com")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let token = h.invitation_token();

    let req = test::TestRequest::get()
        .uri(&format!("/api/membership/add?token={}", token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri(&format!("/api/membership/add?token={}", token))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );

    // A deleted invitation can no longer be redeemed.
    let resp = test::call_service(&app, invite("frank@example.com")).await;
    let invitation: serde_json::Value = test::read_body_json(resp).await;
    let token = h.invitation_token();
    let req = test::TestRequest::delete()
        .uri(&format!(
            "/api/invitation/{}",
            invitation["id"].as_str().unwrap()
        ))
        .insert_header((header::AUTHORIZATION, h.bearer(&alice)))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NO_CONTENT
    );

    let req = test::TestRequest::get()
        .uri(&format!("/api/membership/add?token={}", token))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}
