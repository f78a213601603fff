use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Notify;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod audit;
mod cli;
mod config;
mod errors;
mod jobs;
mod models;
mod provider;
mod state;
mod store;

use audit::ActivityLog;
use provider::PushClient;
use state::AppState;
use store::postgres::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "pushgate=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_server(cfg, port).await,
        Some(cli::Commands::Campaign { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            let activity = ActivityLog::new(db.clone());
            let push = PushClient::new(cfg.provider_url.clone(), cfg.provider_api_key.clone());
            handle_campaign_command(command, &db, &push, &activity).await
        }
        Some(cli::Commands::Token { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_token_command(command, &db).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url).await?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let activity = ActivityLog::new(db.clone());
    let push = PushClient::new(cfg.provider_url.clone(), cfg.provider_api_key.clone());
    let dispatch = Arc::new(Notify::new());

    let state = Arc::new(AppState {
        db: db.clone(),
        activity: activity.clone(),
        dispatch: dispatch.clone(),
        admin_key: cfg.admin_key.clone(),
    });

    let app = axum::Router::new()
        // Health endpoints (no auth)
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .route("/readyz", axum::routing::get(readiness_check))
        .nest("/api/v1", api::api_router(state.clone()))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        // Admin dashboard runs on its own origin during development.
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            let dashboard_origin = std::env::var("PUSHGATE_DASHBOARD_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string());
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-admin-key"),
                    HeaderName::from_static("x-user-id"),
                    HeaderName::from_static("x-request-id"),
                ])
        })
        .layer(axum::middleware::from_fn(request_id_middleware));

    jobs::dispatcher::spawn(db, push, activity, dispatch, cfg.sweep_interval_secs);
    tracing::info!(
        "Delivery dispatcher started (fallback sweep every {}s)",
        cfg.sweep_interval_secs
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Pushgate listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with server logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn readiness_check() -> &'static str {
    "ok"
}

async fn handle_campaign_command(
    cmd: cli::CampaignCommands,
    db: &PgStore,
    push: &PushClient,
    activity: &ActivityLog,
) -> anyhow::Result<()> {
    match cmd {
        cli::CampaignCommands::Create {
            title,
            message,
            kind,
            image_url,
            deep_link,
            now,
        } => {
            let (title, message, kind) = models::campaign::validate_intake(&title, &message, &kind)
                .map_err(|e| anyhow::anyhow!("{}", e))?;

            let new_campaign = models::campaign::NewCampaign {
                title,
                message,
                kind,
                image_url,
                deep_link,
                created_by: "cli".to_string(),
            };

            let tokens = db.list_active_tokens().await?;
            if tokens.is_empty() {
                db.insert_failed_campaign(&new_campaign).await?;
                anyhow::bail!("no active device tokens are registered");
            }

            let mut users: Vec<uuid::Uuid> = tokens.iter().map(|t| t.user_id).collect();
            users.dedup();
            let (campaign_id, created) = db
                .create_campaign_with_fanout(&new_campaign, &users)
                .await?;

            println!(
                "Campaign created:\n  ID:        {}\n  Kind:      {}\n  Recipients: {}",
                campaign_id,
                kind.as_str(),
                created
            );

            if now {
                let campaign = db
                    .get_campaign(campaign_id)
                    .await?
                    .context("campaign vanished after insert")?;
                jobs::dispatcher::deliver_campaign(db, push, activity, &campaign).await?;
                let finished = db
                    .get_campaign(campaign_id)
                    .await?
                    .context("campaign vanished after dispatch")?;
                println!(
                    "Delivered: status={:?} delivered={} failed={}",
                    finished.status, finished.delivered_users, finished.failed_users
                );
            } else {
                println!("Left pending; the running server's dispatcher will deliver it.");
            }
        }
        cli::CampaignCommands::List { limit } => {
            let campaigns = db.list_campaigns(limit, 0).await?;
            if campaigns.is_empty() {
                println!("No campaigns found.");
            } else {
                println!(
                    "{:<38} {:<24} {:<15} {:>6} {:>9} {:>7}",
                    "ID", "TITLE", "STATUS", "TOTAL", "DELIVERED", "FAILED"
                );
                for c in campaigns {
                    let title_display = truncate_title(&c.title);
                    println!(
                        "{:<38} {:<24} {:<15} {:>6} {:>9} {:>7}",
                        c.id,
                        title_display,
                        format!("{:?}", c.status),
                        c.total_users,
                        c.delivered_users,
                        c.failed_users
                    );
                }
            }
        }
    }
    Ok(())
}

/// Shorten a title for the fixed-width table, counting characters rather
/// than bytes so multibyte titles never split mid-character.
fn truncate_title(title: &str) -> String {
    if title.chars().count() > 24 {
        let head: String = title.chars().take(21).collect();
        format!("{}…", head)
    } else {
        title.to_string()
    }
}

async fn handle_token_command(cmd: cli::TokenCommands, db: &PgStore) -> anyhow::Result<()> {
    match cmd {
        cli::TokenCommands::List { user_id } => {
            let user_id = uuid::Uuid::parse_str(&user_id).context("Invalid user_id")?;
            let tokens = db.list_user_tokens(user_id).await?;
            if tokens.is_empty() {
                println!("No devices found.");
            } else {
                println!("{:<38} {:<20} {:<10} ACTIVE", "ID", "DEVICE", "PLATFORM");
                for t in tokens {
                    println!(
                        "{:<38} {:<20} {:<10} {}",
                        t.id,
                        t.device_id,
                        format!("{:?}", t.platform),
                        t.is_active
                    );
                }
            }
        }
        cli::TokenCommands::Deactivate { user_id, token } => {
            let user_id = uuid::Uuid::parse_str(&user_id).context("Invalid user_id")?;
            let matched = db.deactivate_device_token(user_id, &token).await?;
            if matched {
                println!("Token deactivated.");
            } else {
                println!("Token not found or already inactive.");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::truncate_title;

    #[test]
    fn short_title_passes_through() {
        assert_eq!(truncate_title("Road closed"), "Road closed");
    }

    #[test]
    fn long_title_gets_ellipsis() {
        let title = "a".repeat(30);
        let out = truncate_title(&title);
        assert_eq!(out, format!("{}…", "a".repeat(21)));
    }

    #[test]
    fn multibyte_title_truncates_on_char_boundary() {
        // 25 chars, so it must shorten; byte 21 falls inside a euro sign.
        let title = "1234567890123456789012€€€";
        let out = truncate_title(title);
        assert_eq!(out, "123456789012345678901…");
    }

    #[test]
    fn multibyte_title_within_limit_is_untouched() {
        // 23 chars but 29 bytes; character count is what matters.
        let title = "12345678901234567890€€€";
        assert_eq!(truncate_title(title), title);
    }
}
