use std::sync::Arc;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::audit::event;
use crate::errors::AppError;
use crate::models::campaign::{self, Campaign, CampaignStatus, NewCampaign};
use crate::models::notification::UserNotification;
use crate::models::token::{NewDeviceToken, Platform};
use crate::state::AppState;

use super::AuthedUser;

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

// ── Campaign Handlers (admin) ────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub title: String,
    pub message: String,
    pub kind: String,
    pub image_url: Option<String>,
    pub deep_link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCampaignResponse {
    pub id: Uuid,
    pub status: CampaignStatus,
    pub total_users: u64,
}

/// POST /api/v1/campaigns — create a broadcast campaign.
///
/// Persists the campaign and its per-user fan-out, nudges the dispatcher, and
/// returns 202 before any provider call is attempted. Zero active tokens is a
/// distinguished 422 (`no_recipients`), with the campaign finalized as failed
/// so the attempt stays visible in the admin list.
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CreateCampaignResponse>), AppError> {
    let (title, message, kind) =
        campaign::validate_intake(&payload.title, &payload.message, &payload.kind)?;

    let new_campaign = NewCampaign {
        title: title.clone(),
        message: message.clone(),
        kind,
        image_url: payload.image_url,
        deep_link: payload.deep_link,
        created_by: "admin-api".to_string(),
    };

    let tokens = state.db.list_active_tokens().await?;
    if tokens.is_empty() {
        let campaign_id = state.db.insert_failed_campaign(&new_campaign).await?;
        state.activity.record(
            event::NO_RECIPIENTS,
            json!({ "campaign_id": campaign_id, "stage": "intake" }),
        );
        return Err(AppError::NoRecipients);
    }

    // One inbox row per distinct user, however many devices they carry.
    let mut users: Vec<Uuid> = tokens.iter().map(|t| t.user_id).collect();
    users.dedup();

    // Campaign, fan-out rows, and total commit together: the dispatcher can
    // never observe the campaign with a stale total or a half-written inbox.
    let (campaign_id, created) = state
        .db
        .create_campaign_with_fanout(&new_campaign, &users)
        .await?;
    state.activity.record(
        event::CAMPAIGN_CREATED,
        json!({ "campaign_id": campaign_id, "title": title, "kind": kind }),
    );
    state.activity.record(
        event::RECIPIENTS_RESOLVED,
        json!({
            "campaign_id": campaign_id,
            "users": created,
            "tokens": tokens.len(),
        }),
    );

    // Delivery happens in the dispatcher task; the pending row is the queue.
    state.dispatch.notify_one();

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateCampaignResponse {
            id: campaign_id,
            status: CampaignStatus::Pending,
            total_users: created,
        }),
    ))
}

/// GET /api/v1/campaigns — list campaigns with counters and status.
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<Campaign>>, AppError> {
    let campaigns = state
        .db
        .list_campaigns(params.limit(), params.offset())
        .await?;
    Ok(Json(campaigns))
}

/// GET /api/v1/campaigns/:id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, AppError> {
    let campaign = state.db.get_campaign(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(campaign))
}

/// GET /api/v1/activity — recent activity-log entries.
pub async fn list_activity(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<crate::models::activity::ActivityEntry>>, AppError> {
    let entries = state.db.list_activity(params.limit()).await?;
    Ok(Json(entries))
}

// ── Device Handlers (user) ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_token: String,
    pub device_id: String,
    pub platform: String,
}

/// POST /api/v1/devices — register (or re-register) a device token.
/// Idempotent per (user, device); the latest token wins.
pub async fn register_device(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Json(payload): Json<RegisterDeviceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if payload.device_token.trim().is_empty() {
        return Err(AppError::Validation {
            field: "device_token",
            reason: "must not be empty".into(),
        });
    }
    if payload.device_id.trim().is_empty() {
        return Err(AppError::Validation {
            field: "device_id",
            reason: "must not be empty".into(),
        });
    }
    let platform = Platform::parse(&payload.platform).ok_or_else(|| AppError::Validation {
        field: "platform",
        reason: "must be one of: ios, android, web".into(),
    })?;

    let id = state
        .db
        .upsert_device_token(&NewDeviceToken {
            user_id,
            token: payload.device_token,
            device_id: payload.device_id.clone(),
            platform,
        })
        .await?;

    state.activity.record(
        event::TOKEN_REGISTERED,
        json!({ "user_id": user_id, "device_id": payload.device_id }),
    );

    Ok(Json(json!({ "id": id, "active": true })))
}

#[derive(Debug, Deserialize)]
pub struct RemoveDeviceRequest {
    pub device_token: String,
}

/// DELETE /api/v1/devices — deactivate a device token.
/// Succeeds even when nothing matched: the token is already gone.
pub async fn remove_device(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Json(payload): Json<RemoveDeviceRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let matched = state
        .db
        .deactivate_device_token(user_id, &payload.device_token)
        .await?;

    if matched {
        state
            .activity
            .record(event::TOKEN_DEACTIVATED, json!({ "user_id": user_id }));
    }

    Ok(Json(json!({ "removed": matched })))
}

// ── Inbox Handlers (user) ────────────────────────────────────

/// GET /api/v1/notifications — list the caller's inbox, newest first.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<Vec<UserNotification>>, AppError> {
    let notifs = state
        .db
        .list_notifications(user_id, params.limit(), params.offset())
        .await?;
    Ok(Json(notifs))
}

/// GET /api/v1/notifications/unread — count unread
pub async fn count_unread_notifications(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = state.db.count_unread_notifications(user_id).await?;
    Ok(Json(json!({ "count": count })))
}

/// POST /api/v1/notifications/:id/read — mark as read (idempotent)
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let matched = state.db.mark_notification_read(id, user_id).await?;
    if !matched {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "success": true })))
}

/// POST /api/v1/notifications/read-all — mark all as read
pub async fn mark_all_notifications_read(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user_id)): Extension<AuthedUser>,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = state.db.mark_all_notifications_read(user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}
