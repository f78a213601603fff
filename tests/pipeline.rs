//! Database-backed pipeline tests.
//!
//! Each test runs against its own throwaway PostgreSQL database created by
//! `#[sqlx::test]` from the connection in `DATABASE_URL`, with migrations
//! applied. They cover the store behavior the DB-free tests cannot reach:
//! token upsert, atomic fan-out, read idempotence, and full delivery
//! reconciliation against a stubbed provider.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use sqlx::PgPool;
use tokio::sync::Notify;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pushgate::api;
use pushgate::audit::ActivityLog;
use pushgate::jobs::dispatcher::deliver_campaign;
use pushgate::models::campaign::{CampaignKind, CampaignStatus, NewCampaign};
use pushgate::models::notification::DeliveryStatus;
use pushgate::models::token::{NewDeviceToken, Platform};
use pushgate::provider::PushClient;
use pushgate::state::AppState;
use pushgate::store::postgres::PgStore;

const ADMIN_KEY: &str = "test-admin-key";

fn campaign_input(title: &str) -> NewCampaign {
    NewCampaign {
        title: title.to_string(),
        message: "message body".to_string(),
        kind: CampaignKind::Alert,
        image_url: None,
        deep_link: None,
        created_by: "test".to_string(),
    }
}

async fn register_user(store: &PgStore, token: &str) -> Uuid {
    let user_id = Uuid::new_v4();
    store
        .upsert_device_token(&NewDeviceToken {
            user_id,
            token: token.to_string(),
            device_id: format!("dev-{}", token),
            platform: Platform::Android,
        })
        .await
        .unwrap();
    user_id
}

fn app(pool: PgPool) -> Router {
    let store = PgStore::from_pool(pool);
    let state = Arc::new(AppState {
        db: store.clone(),
        activity: ActivityLog::new(store),
        dispatch: Arc::new(Notify::new()),
        admin_key: ADMIN_KEY.to_string(),
    });
    Router::new()
        .nest("/api/v1", api::api_router(state.clone()))
        .with_state(state)
}

// ── Token registry ───────────────────────────────────────────

#[sqlx::test(migrations = "./migrations")]
async fn reregistering_a_device_keeps_one_row_and_newest_token(pool: PgPool) {
    let store = PgStore::from_pool(pool);
    let user_id = Uuid::new_v4();

    for token in ["first-token", "second-token"] {
        store
            .upsert_device_token(&NewDeviceToken {
                user_id,
                token: token.to_string(),
                device_id: "phone-1".to_string(),
                platform: Platform::Ios,
            })
            .await
            .unwrap();
    }

    let tokens = store.list_user_tokens(user_id).await.unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].token, "second-token");
    assert!(tokens[0].is_active);
}

#[sqlx::test(migrations = "./migrations")]
async fn deactivating_unknown_token_is_a_no_op(pool: PgPool) {
    let store = PgStore::from_pool(pool);
    let user_id = register_user(&store, "real-token").await;

    let matched = store
        .deactivate_device_token(user_id, "never-registered")
        .await
        .unwrap();
    assert!(!matched);
    assert_eq!(store.list_active_tokens().await.unwrap().len(), 1);
}

// ── Campaign fan-out ─────────────────────────────────────────

#[sqlx::test(migrations = "./migrations")]
async fn fanout_commits_total_together_with_inbox_rows(pool: PgPool) {
    let store = PgStore::from_pool(pool);
    let alice = register_user(&store, "alice-phone").await;
    register_user(&store, "bob-phone").await;

    // Alice carries a second device; she still gets a single inbox row.
    store
        .upsert_device_token(&NewDeviceToken {
            user_id: alice,
            token: "alice-tablet".to_string(),
            device_id: "tablet-1".to_string(),
            platform: Platform::Web,
        })
        .await
        .unwrap();

    let tokens = store.list_active_tokens().await.unwrap();
    let mut users: Vec<Uuid> = tokens.iter().map(|t| t.user_id).collect();
    users.dedup();

    let (campaign_id, created) = store
        .create_campaign_with_fanout(&campaign_input("Maintenance window"), &users)
        .await
        .unwrap();
    assert_eq!(created, 2);

    // A single read after intake sees the total and the rows agree: there is
    // no window where the campaign is pending with total_users still zero.
    let campaign = store.get_campaign(campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Pending);
    assert_eq!(campaign.total_users, 2);

    let inbox = store.list_notifications(alice, 10, 0).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].delivery_status, DeliveryStatus::Pending);
    assert_eq!(inbox[0].title, "Maintenance window");
}

#[sqlx::test(migrations = "./migrations")]
async fn intake_failure_campaign_is_terminal_and_never_queued(pool: PgPool) {
    let store = PgStore::from_pool(pool);

    let campaign_id = store
        .insert_failed_campaign(&campaign_input("Nobody home"))
        .await
        .unwrap();

    let campaign = store.get_campaign(campaign_id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Failed);
    assert_eq!(campaign.total_users, 0);
    assert!(campaign.completed_at.is_some());
    assert!(store.list_pending_campaigns().await.unwrap().is_empty());
}

// ── Delivery reconciliation ──────────────────────────────────

#[sqlx::test(migrations = "./migrations")]
async fn provider_error_fails_campaign_and_every_row(pool: PgPool) {
    let store = PgStore::from_pool(pool);
    let activity = ActivityLog::new(store.clone());
    let users = [
        register_user(&store, "tok-a").await,
        register_user(&store, "tok-b").await,
    ];

    let (campaign_id, _) = store
        .create_campaign_with_fanout(&campaign_input("Doomed"), &users)
        .await
        .unwrap();
    let campaign = store.get_campaign(campaign_id).await.unwrap().unwrap();

    // Nothing listens on this port, so the provider call errors out.
    let provider = PushClient::new("http://127.0.0.1:9".to_string(), "key".to_string());
    deliver_campaign(&store, &provider, &activity, &campaign)
        .await
        .unwrap();

    let finished = store.get_campaign(campaign_id).await.unwrap().unwrap();
    assert_eq!(finished.status, CampaignStatus::Failed);
    assert_eq!(finished.delivered_users, 0);
    assert_eq!(finished.failed_users, finished.total_users);

    for user in users {
        let inbox = store.list_notifications(user, 10, 0).await.unwrap();
        assert_eq!(inbox[0].delivery_status, DeliveryStatus::Failed);
    }
    assert!(store.list_pending_campaigns().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn partial_receipt_splits_delivered_and_failed_rows(pool: PgPool) {
    let store = PgStore::from_pool(pool);
    let activity = ActivityLog::new(store.clone());
    for i in 0..10 {
        register_user(&store, &format!("tok-{}", i)).await;
    }

    let tokens = store.list_active_tokens().await.unwrap();
    let mut users: Vec<Uuid> = tokens.iter().map(|t| t.user_id).collect();
    users.dedup();

    let (campaign_id, created) = store
        .create_campaign_with_fanout(&campaign_input("Big news"), &users)
        .await
        .unwrap();
    assert_eq!(created, 10);
    let campaign = store.get_campaign(campaign_id).await.unwrap().unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "delivered": 8
        })))
        .mount(&server)
        .await;

    let provider = PushClient::new(server.uri(), "key".to_string());
    deliver_campaign(&store, &provider, &activity, &campaign)
        .await
        .unwrap();

    let finished = store.get_campaign(campaign_id).await.unwrap().unwrap();
    assert_eq!(finished.status, CampaignStatus::PartialFailed);
    assert_eq!(finished.delivered_users, 8);
    assert_eq!(finished.failed_users, 2);

    let mut delivered_rows = 0;
    let mut failed_rows = 0;
    for user in &users {
        let inbox = store.list_notifications(*user, 10, 0).await.unwrap();
        match inbox[0].delivery_status {
            DeliveryStatus::Delivered => {
                assert!(inbox[0].delivered_at.is_some());
                delivered_rows += 1;
            }
            DeliveryStatus::Failed => failed_rows += 1,
            DeliveryStatus::Pending => panic!("row left pending after reconciliation"),
        }
    }
    assert_eq!((delivered_rows, failed_rows), (8, 2));
}

// ── Inbox ────────────────────────────────────────────────────

#[sqlx::test(migrations = "./migrations")]
async fn marking_read_twice_keeps_first_timestamp(pool: PgPool) {
    let store = PgStore::from_pool(pool);
    let user = register_user(&store, "tok-read").await;
    store
        .create_campaign_with_fanout(&campaign_input("Read me"), &[user])
        .await
        .unwrap();

    let inbox = store.list_notifications(user, 10, 0).await.unwrap();
    let notification_id = inbox[0].id;

    assert!(store
        .mark_notification_read(notification_id, user)
        .await
        .unwrap());
    let first = store.list_notifications(user, 10, 0).await.unwrap()[0].read_at;
    assert!(first.is_some());

    assert!(store
        .mark_notification_read(notification_id, user)
        .await
        .unwrap());
    let second = store.list_notifications(user, 10, 0).await.unwrap()[0].read_at;
    assert_eq!(first, second);

    assert_eq!(store.count_unread_notifications(user).await.unwrap(), 0);
}

// ── Auth middleware ──────────────────────────────────────────

#[sqlx::test(migrations = "./migrations")]
async fn admin_routes_use_the_key_from_state(pool: PgPool) {
    let app = app(pool);

    let denied = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/campaigns")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let wrong_key = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/campaigns")
                .header("x-admin-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong_key.status(), StatusCode::UNAUTHORIZED);

    let allowed = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/campaigns")
                .header("x-admin-key", ADMIN_KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
async fn user_routes_require_a_user_id(pool: PgPool) {
    let app = app(pool);

    let denied = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/notifications")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/notifications")
                .header("x-user-id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}
