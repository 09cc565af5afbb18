use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use meridian_core::ReferralPolicy;
use meridian_db::Database;
use meridian_db::models::NewUser;
use meridian_types::models::Role;

use crate::auth::{AppState, AppStateInner, create_token};
use crate::router;

const SECRET: &str = "test-secret";
const API_KEY: &str = "plugin-key";

fn state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: SECRET.into(),
        api_key: Some(API_KEY.into()),
        referral_policy: ReferralPolicy::default(),
    })
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let bearer = format!("Bearer {token}");
    send(app, method, uri, &[("authorization", bearer.as_str())], body).await
}

/// Register through the API; returns (user id, token, referral code, response).
async fn register(
    app: &Router,
    email: &str,
    role: &str,
    referral_code: Option<&str>,
) -> (Uuid, String, String, Value) {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/register",
        &[],
        Some(json!({
            "email": email,
            "username": email.split('@').next().unwrap(),
            "password": "correct horse battery",
            "role": role,
            "referral_code": referral_code,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["user_id"].as_str().unwrap().parse().unwrap(),
        body["token"].as_str().unwrap().to_string(),
        body["referral_code"].as_str().unwrap().to_string(),
        body,
    )
}

fn admin_token(state: &AppState) -> String {
    let id = Uuid::new_v4();
    state
        .db
        .create_user(&NewUser {
            id,
            email: "root@example.com",
            username: "root",
            password_hash: "unused",
            role: Role::Admin,
        })
        .unwrap();
    create_token(SECRET, id, "root", Role::Admin).unwrap()
}

#[tokio::test]
async fn register_with_referral_code_credits_both_users() {
    let app = router(state());

    let (_, alice_token, alice_code, body) =
        register(&app, "alice@example.com", "investor", None).await;
    assert_eq!(body["referral"]["status"], "no_referral");
    assert_eq!(body["referral"]["points_awarded"], 50);

    let (_, bob_token, _, body) =
        register(&app, "bob@example.com", "investor", Some(&alice_code)).await;
    assert_eq!(body["referral"]["status"], "completed");
    assert_eq!(body["referral"]["points_awarded"], 100);
    assert_eq!(body["referral"]["referrer_points"], 100);

    let (status, balance) = call(&app, Method::GET, "/points/balance", &alice_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["points"], 150);

    let (_, balance) = call(&app, Method::GET, "/points/balance", &bob_token, None).await;
    assert_eq!(balance["points"], 100);

    let (_, stats) = call(&app, Method::GET, "/referrals/me", &alice_token, None).await;
    assert_eq!(stats["referral_count"], 1);

    let (_, audit) = call(&app, Method::GET, "/points/audit", &bob_token, None).await;
    assert_eq!(audit["consistent"], true);
}

#[tokio::test]
async fn bad_referral_code_does_not_block_registration() {
    let app = router(state());
    let (_, _, _, body) = register(&app, "carol@example.com", "company", Some("NOPE2345")).await;
    assert_eq!(body["referral"]["status"], "invalid_code");
    assert_eq!(body["referral"]["points_awarded"], 50);
}

#[tokio::test]
async fn duplicate_email_and_privileged_roles_are_rejected() {
    let app = router(state());
    register(&app, "dup@example.com", "investor", None).await;

    let payload = |role: &str| {
        json!({
            "email": "dup@example.com",
            "username": "dup",
            "password": "correct horse battery",
            "role": role,
        })
    };
    let (status, _) =
        send(&app, Method::POST, "/auth/register", &[], Some(payload("investor"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::POST, "/auth/register", &[], Some(payload("admin"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_returns_a_working_token() {
    let app = router(state());
    register(&app, "dana@example.com", "investor", None).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/login",
        &[],
        Some(json!({ "email": "dana@example.com", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/login",
        &[],
        Some(json!({ "email": "DANA@example.com", "password": "correct horse battery" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "investor");

    let token = body["token"].as_str().unwrap();
    let (status, _) = call(&app, Method::GET, "/points/history", token, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = router(state());
    let (status, _) = send(&app, Method::GET, "/points/balance", &[], None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, "/points/balance", "not-a-jwt", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/health", &[], None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bandwidth_reports_need_the_api_key() {
    let app = router(state());
    let (_, token, _, _) = register(&app, "erin@example.com", "investor", None).await;
    let report = json!({ "email": "erin@example.com", "points": 7, "ipv4": "203.0.113.9" });

    let (status, _) = send(
        &app,
        Method::POST,
        "/points/update",
        &[("x-api-key", "wrong")],
        Some(report.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/points/update",
        &[("x-api-key", API_KEY)],
        Some(report),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["new_balance"], 57);

    let (_, history) = call(&app, Method::GET, "/points/history?limit=1", &token, None).await;
    assert_eq!(history[0]["kind"], "bandwidth_sharing");
    assert_eq!(history[0]["metadata"]["ipv4"], "203.0.113.9");
}

#[tokio::test]
async fn admin_adjustment_cannot_overdraw() {
    let state = state();
    let admin = admin_token(&state);
    let app = router(state);
    let (user_id, token, _, _) = register(&app, "fay@example.com", "investor", None).await;
    let uri = format!("/admin/users/{user_id}/points");

    let (status, _) = call(
        &app,
        Method::POST,
        &uri,
        &token,
        Some(json!({ "delta": 10, "description": "self-service" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        Method::POST,
        &uri,
        &admin,
        Some(json!({ "delta": -51, "description": "clawback" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "unable to update points");

    let (status, body) = call(
        &app,
        Method::POST,
        &uri,
        &admin,
        Some(json!({ "delta": -50, "description": "clawback" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance"], 0);
}

#[tokio::test]
async fn downloads_follow_the_nda_and_grant_flow() {
    let state = state();
    let admin = admin_token(&state);
    let app = router(state);

    let (_, owner, _, _) = register(&app, "founder@example.com", "company", None).await;
    let (investor_id, investor, _, _) = register(&app, "vc@example.com", "investor", None).await;

    let (status, company) = call(
        &app,
        Method::POST,
        "/companies",
        &owner,
        Some(json!({ "name": "Acme Robotics" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let company_id = company["id"].as_str().unwrap().to_string();

    let (status, folders) = call(
        &app,
        Method::POST,
        &format!("/companies/{company_id}/dataroom/init"),
        &owner,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let financials = folders[0]["id"].as_str().unwrap().to_string();

    let (status, file) = call(
        &app,
        Method::POST,
        &format!("/folders/{financials}/files"),
        &owner,
        Some(json!({ "filename": "p&l-2025.pdf", "mime_type": "application/pdf" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let download = format!("/files/{}/download", file["id"].as_str().unwrap());

    // Private company, no grants: the investor has no tier at all.
    let (status, _) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let access_uri = format!("/companies/{company_id}/access");
    let (_, access) = call(&app, Method::GET, &access_uri, &investor, None).await;
    assert_eq!(access["level"], "none");

    // Full access needs the NDA first.
    let grant = json!({ "user_id": investor_id, "access_level": "full_dd" });
    let grant_uri = format!("/companies/{company_id}/access");
    let (status, _) = call(&app, Method::POST, &grant_uri, &admin, Some(grant.clone())).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);

    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/companies/{company_id}/access/{investor_id}/nda"),
        &admin,
        Some(json!({ "nda_document_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::POST, &grant_uri, &owner, Some(grant.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::POST, &grant_uri, &admin, Some(grant)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["file"]["filename"], "p&l-2025.pdf");

    let (status, listing) = call(
        &app,
        Method::GET,
        &format!("/companies/{company_id}/folders"),
        &investor,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["access"]["level"], "full_dd");
    assert_eq!(listing["folders"][0]["files"][0]["download_count"], 1);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/companies/{company_id}/access/{investor_id}"),
        &admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

/// Owner, private company and one `nda` folder holding one file.
/// Returns (owner token, company id, folder id, file id).
async fn private_nda_room(app: &Router) -> (String, String, String, String) {
    let (_, owner, _, _) = register(app, "cfo@example.com", "company", None).await;
    let (_, company) = call(
        app,
        Method::POST,
        "/companies",
        &owner,
        Some(json!({ "name": "Quiet Ventures" })),
    )
    .await;
    let company_id = company["id"].as_str().unwrap().to_string();

    let (status, folder) = call(
        app,
        Method::POST,
        &format!("/companies/{company_id}/folders"),
        &owner,
        Some(json!({ "name": "Term sheet", "access_level": "nda" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let folder_id = folder["id"].as_str().unwrap().to_string();

    let (status, file) = call(
        app,
        Method::POST,
        &format!("/folders/{folder_id}/files"),
        &owner,
        Some(json!({ "filename": "terms.pdf" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let file_id = file["id"].as_str().unwrap().to_string();

    (owner, company_id, folder_id, file_id)
}

#[tokio::test]
async fn investors_cannot_record_their_own_nda() {
    let app = router(state());
    let (owner, company_id, _, file_id) = private_nda_room(&app).await;
    let (investor_id, investor, _, _) = register(&app, "lp@example.com", "investor", None).await;
    let download = format!("/files/{file_id}/download");
    let nda_uri = format!("/companies/{company_id}/access/{investor_id}/nda");
    let nda = json!({ "nda_document_id": Uuid::new_v4() });

    let (status, _) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::PUT, &nda_uri, &investor, Some(nda.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::PUT, &nda_uri, &owner, Some(nda)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["file"]["filename"], "terms.pdf");
}

#[tokio::test]
async fn managers_edit_folders_delete_files_and_read_analytics() {
    let state = state();
    let admin = admin_token(&state);
    let app = router(state);
    let (owner, company_id, folder_id, file_id) = private_nda_room(&app).await;
    let (investor_id, investor, _, _) = register(&app, "gp@example.com", "investor", None).await;

    let grant = json!({ "user_id": investor_id, "access_level": "overview" });
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/companies/{company_id}/access"),
        &admin,
        Some(grant),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let download = format!("/files/{file_id}/download");
    let (status, _) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let folder_uri = format!("/folders/{folder_id}");
    let lower = json!({ "access_level": "overview" });
    let (status, _) = call(&app, Method::PUT, &folder_uri, &investor, Some(lower.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, folder) = call(&app, Method::PUT, &folder_uri, &owner, Some(lower)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(folder["access_level"], "overview");

    let (status, _) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::OK);

    let analytics_uri = format!("/companies/{company_id}/analytics");
    let (status, _) = call(&app, Method::GET, &analytics_uri, &investor, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, report) = call(&app, Method::GET, &analytics_uri, &owner, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_views"], 1);
    assert_eq!(report["unique_visitors"], 1);
    assert_eq!(report["visitors"][0]["user_id"], investor_id.to_string());
    assert_eq!(report["visitors"][0]["downloads"], 1);

    let file_uri = format!("/files/{file_id}");
    let (status, _) = call(&app, Method::DELETE, &file_uri, &investor, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &file_uri, &owner, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::GET, &download, &investor, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
