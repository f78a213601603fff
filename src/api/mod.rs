use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::state::AppState;

pub mod handlers;

/// Identity of the end user behind a device/inbox request, resolved by the
/// fronting auth layer and forwarded in `X-User-Id`.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub Uuid);

/// Build the API router. All routes are relative; the caller mounts this
/// under `/api/v1`. Takes the state up front so the admin middleware can
/// read the configured key from it.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin = Router::new()
        .route(
            "/campaigns",
            get(handlers::list_campaigns).post(handlers::create_campaign),
        )
        .route("/campaigns/:id", get(handlers::get_campaign))
        .route("/activity", get(handlers::list_activity))
        .layer(middleware::from_fn_with_state(state, admin_auth));

    let user = Router::new()
        .route(
            "/devices",
            post(handlers::register_device).delete(handlers::remove_device),
        )
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/unread",
            get(handlers::count_unread_notifications),
        )
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .layer(middleware::from_fn(user_auth));

    Router::new()
        .merge(admin)
        .merge(user)
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: validates `X-Admin-Key` header against the key carried in
/// `AppState`. Returns 401 if missing/invalid.
async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided_key = req
        .headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    match provided_key {
        Some(k) if k == state.admin_key => Ok(next.run(req).await),
        Some(k) => {
            // SECURITY: Never log the expected key or the full provided key
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!("admin API: invalid key (provided: '{}')", masked);
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("admin API: missing X-Admin-Key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Middleware: resolves the calling user from the `X-User-Id` header set by
/// the fronting auth proxy. Authentication itself happens upstream; a missing
/// or malformed id is a 401 here.
async fn user_auth(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok());

    match user_id {
        Some(id) => {
            req.extensions_mut().insert(AuthedUser(id));
            Ok(next.run(req).await)
        }
        None => {
            tracing::warn!("user API: missing or invalid X-User-Id header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
