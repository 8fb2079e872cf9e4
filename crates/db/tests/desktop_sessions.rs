//! Integration tests for the desktop and session repositories: the CAS
//! state transition and the open-session uniqueness/idempotency rules the
//! broker relies on.

use chrono::Utc;
use sqlx::PgPool;
use vdesk_core::state::{ConnectionType, DesktopState, SessionEndReason};
use vdesk_db::models::desktop::{CreateDesktop, Desktop};
use vdesk_db::models::session::CreateSession;
use vdesk_db::models::tenant::CreateTenant;
use vdesk_db::models::user::{CreateUser, User};
use vdesk_db::repositories::{DesktopRepo, SessionRepo, TenantRepo, UserRepo};

async fn seed_desktop(pool: &PgPool) -> (User, Desktop) {
    let tenant = TenantRepo::create(
        pool,
        &CreateTenant {
            name: "Acme".into(),
            slug: "acme".into(),
        },
    )
    .await
    .unwrap();

    let user = UserRepo::create(
        pool,
        &CreateUser {
            tenant_id: tenant.id,
            username: "alice".into(),
            email: None,
            password_hash: "x".into(),
            role: "user".into(),
        },
    )
    .await
    .unwrap();

    let desktop = DesktopRepo::create(
        pool,
        &CreateDesktop {
            tenant_id: tenant.id,
            user_id: Some(user.id),
            provider_server_id: "srv-1".into(),
            display_name: "Alice's Desktop".into(),
            vm_private_ip: Some("10.0.0.5".into()),
            vm_rdp_username: None,
            vm_rdp_password_sealed: None,
            vm_cpu: None,
            vm_ram_mb: None,
            vm_disk_gb: None,
            initial_state: DesktopState::Off,
        },
    )
    .await
    .unwrap();

    (user, desktop)
}

fn session_input(desktop_id: uuid::Uuid, user_id: uuid::Uuid) -> CreateSession {
    CreateSession {
        desktop_id,
        user_id,
        connection_type: ConnectionType::Browser,
        client_ip: None,
        local_port: None,
        grant_ref: None,
    }
}

#[sqlx::test]
async fn cas_transition_applies_only_from_expected_state(pool: PgPool) {
    let (_, desktop) = seed_desktop(&pool).await;
    let now = Utc::now();

    let applied =
        DesktopRepo::transition_state(&pool, desktop.id, DesktopState::Off, DesktopState::Starting, now)
            .await
            .unwrap();
    assert!(applied);

    // A second writer assuming the old state loses the race.
    let applied =
        DesktopRepo::transition_state(&pool, desktop.id, DesktopState::Off, DesktopState::Starting, now)
            .await
            .unwrap();
    assert!(!applied);

    let current = DesktopRepo::find_by_id(&pool, desktop.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.state(), DesktopState::Starting);
}

#[sqlx::test]
async fn only_one_open_session_per_key(pool: PgPool) {
    let (user, desktop) = seed_desktop(&pool).await;
    let now = Utc::now();

    let first = SessionRepo::create_open(&pool, &session_input(desktop.id, user.id), now)
        .await
        .unwrap();
    assert!(first.is_some());

    let second = SessionRepo::create_open(&pool, &session_input(desktop.id, user.id), now)
        .await
        .unwrap();
    assert!(second.is_none(), "duplicate open session must be rejected");

    let winner = SessionRepo::find_open_by_key(&pool, desktop.id, user.id, ConnectionType::Browser)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(winner.id, first.unwrap().id);
}

#[sqlx::test]
async fn different_connection_types_may_coexist(pool: PgPool) {
    let (user, desktop) = seed_desktop(&pool).await;
    let now = Utc::now();

    let browser = SessionRepo::create_open(&pool, &session_input(desktop.id, user.id), now)
        .await
        .unwrap();
    assert!(browser.is_some());

    let mut native = session_input(desktop.id, user.id);
    native.connection_type = ConnectionType::Native;
    let native = SessionRepo::create_open(&pool, &native, now).await.unwrap();
    assert!(native.is_some());
}

#[sqlx::test]
async fn end_is_idempotent(pool: PgPool) {
    let (user, desktop) = seed_desktop(&pool).await;
    let now = Utc::now();

    let session = SessionRepo::create_open(&pool, &session_input(desktop.id, user.id), now)
        .await
        .unwrap()
        .unwrap();

    let first = SessionRepo::end(&pool, session.id, SessionEndReason::UserDisconnect, now)
        .await
        .unwrap();
    assert!(first);

    let second = SessionRepo::end(&pool, session.id, SessionEndReason::AdminTerminate, now)
        .await
        .unwrap();
    assert!(!second, "second close is a no-op");

    let row = SessionRepo::find_by_id(&pool, session.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.end_reason.as_deref(), Some("user_disconnect"));
}

#[sqlx::test]
async fn heartbeat_on_closed_session_touches_nothing(pool: PgPool) {
    let (user, desktop) = seed_desktop(&pool).await;
    let now = Utc::now();

    let session = SessionRepo::create_open(&pool, &session_input(desktop.id, user.id), now)
        .await
        .unwrap()
        .unwrap();
    SessionRepo::end(&pool, session.id, SessionEndReason::UserDisconnect, now)
        .await
        .unwrap();

    let touched = SessionRepo::touch_heartbeat(&pool, session.id, now).await.unwrap();
    assert!(!touched);

    let row = SessionRepo::find_by_id(&pool, session.id)
        .await
        .unwrap()
        .unwrap();
    assert!(row.last_heartbeat.is_none());
    assert!(row.ended_at.is_some(), "heartbeat must not resurrect a session");
}

#[sqlx::test]
async fn closing_frees_the_idempotency_key(pool: PgPool) {
    let (user, desktop) = seed_desktop(&pool).await;
    let now = Utc::now();

    let first = SessionRepo::create_open(&pool, &session_input(desktop.id, user.id), now)
        .await
        .unwrap()
        .unwrap();
    SessionRepo::end(&pool, first.id, SessionEndReason::IdleTimeout, now)
        .await
        .unwrap();

    let reopened = SessionRepo::create_open(&pool, &session_input(desktop.id, user.id), now)
        .await
        .unwrap();
    assert!(reopened.is_some(), "closed sessions do not block new ones");
}
