//! Integration tests for login.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_json};
use serde_json::json;
use sqlx::PgPool;
use vdesk_broker::mfa::TotpGate;
use vdesk_db::repositories::UserRepo;

#[sqlx::test(migrations = "../db/migrations")]
async fn login_issues_a_token(pool: PgPool) {
    let (app, _provider) = common::build_test_app(pool.clone());
    let tenant = common::seed_tenant(&pool).await;
    common::seed_user(&pool, &tenant, "alice", "user").await;

    let response = post_json(
        &app,
        "/api/v1/auth/login",
        json!({ "tenant": "acme", "username": "alice", "password": "password123" }),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["data"]["token"].is_string());
    assert_eq!(json["data"]["role"], "user");
    assert_eq!(json["data"]["mfa_enabled"], false);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn wrong_password_is_unauthorized(pool: PgPool) {
    let (app, _provider) = common::build_test_app(pool.clone());
    let tenant = common::seed_tenant(&pool).await;
    common::seed_user(&pool, &tenant, "alice", "user").await;

    let response = post_json(
        &app,
        "/api/v1/auth/login",
        json!({ "tenant": "acme", "username": "alice", "password": "wrong" }),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_tenant_and_unknown_user_look_identical(pool: PgPool) {
    let (app, _provider) = common::build_test_app(pool.clone());
    let tenant = common::seed_tenant(&pool).await;
    common::seed_user(&pool, &tenant, "alice", "user").await;

    let unknown_tenant = post_json(
        &app,
        "/api/v1/auth/login",
        json!({ "tenant": "nope", "username": "alice", "password": "password123" }),
        None,
    )
    .await;
    let unknown_user = post_json(
        &app,
        "/api/v1/auth/login",
        json!({ "tenant": "acme", "username": "nobody", "password": "password123" }),
        None,
    )
    .await;

    assert_eq!(unknown_tenant.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(unknown_tenant).await["error"],
        body_json(unknown_user).await["error"],
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn enrolled_user_must_supply_an_mfa_code(pool: PgPool) {
    let (app, _provider) = common::build_test_app(pool.clone());
    let tenant = common::seed_tenant(&pool).await;
    let (user, _) = common::seed_user(&pool, &tenant, "alice", "user").await;
    UserRepo::enable_mfa(&pool, user.id, &TotpGate::generate_secret())
        .await
        .unwrap();

    let response = post_json(
        &app,
        "/api/v1/auth/login",
        json!({ "tenant": "acme", "username": "alice", "password": "password123" }),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "MFA_REQUIRED");
}
