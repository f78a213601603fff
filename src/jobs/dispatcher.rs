//! Background job: deliver pending campaigns to the push provider.
//!
//! The intake handler only persists a campaign and its fan-out rows, then
//! nudges this task through a `Notify`. A fallback interval sweep re-reads
//! `pending` campaigns, so work interrupted by a crash is picked up again on
//! restart: the pending row itself is the durable marker of in-flight work.
//!
//! One provider call per campaign, no retries. Provider errors finalize the
//! campaign as failed and are never surfaced to the admin, who already got a
//! 202 at intake.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;
use tokio::time;
use uuid::Uuid;

use crate::audit::{event, ActivityLog};
use crate::models::campaign::{Campaign, CampaignStatus};
use crate::models::token::DeviceToken;
use crate::provider::{PushClient, PushPayload, PushReceipt};
use crate::store::postgres::PgStore;

/// Spawn the dispatcher task. Call this once at startup.
pub fn spawn(
    store: PgStore,
    provider: PushClient,
    activity: ActivityLog,
    wakeup: Arc<Notify>,
    sweep_interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(sweep_interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = wakeup.notified() => {}
                _ = interval.tick() => {}
            }
            if let Err(e) = sweep(&store, &provider, &activity).await {
                tracing::error!("dispatch sweep failed: {}", e);
            }
        }
    });
}

/// Deliver every pending campaign, oldest first. Campaigns are independent;
/// a provider failure on one is absorbed inside `deliver_campaign` and does
/// not stop the sweep. Database errors abort the sweep and surface in the
/// spawn loop's log line.
async fn sweep(store: &PgStore, provider: &PushClient, activity: &ActivityLog) -> anyhow::Result<()> {
    let pending = store.list_pending_campaigns().await?;
    for campaign in pending {
        deliver_campaign(store, provider, activity, &campaign).await?;
    }
    Ok(())
}

/// Deliver one campaign and finalize its status. Public so the CLI can
/// dispatch inline with `campaign create --now`.
pub async fn deliver_campaign(
    store: &PgStore,
    provider: &PushClient,
    activity: &ActivityLog,
    campaign: &Campaign,
) -> anyhow::Result<()> {
    let recipients = store.list_active_tokens().await?;

    // Tokens can disappear between fan-out and dispatch. With nothing left
    // to submit, every remaining inbox row fails.
    if recipients.is_empty() {
        let failed = store.fail_remaining_pending(campaign.id).await?;
        store
            .finalize_campaign(campaign.id, CampaignStatus::Failed, 0, failed as i32)
            .await?;
        activity.record(
            event::NO_RECIPIENTS,
            json!({ "campaign_id": campaign.id, "stage": "dispatch" }),
        );
        tracing::warn!(campaign_id = %campaign.id, "no active tokens at dispatch time");
        return Ok(());
    }

    let tokens: Vec<String> = recipients.iter().map(|r| r.token.clone()).collect();
    let payload = PushPayload::from_campaign(campaign);

    match provider.send_batch(campaign.id, &tokens, &payload).await {
        Ok(receipt) => {
            let delivered = delivered_users(&recipients, &receipt);
            let delivered_count = store.mark_users_delivered(campaign.id, &delivered).await?;
            let failed_count = store.fail_remaining_pending(campaign.id).await?;
            let status =
                CampaignStatus::from_counts(delivered_count as i64, campaign.total_users as i64);
            store
                .finalize_campaign(campaign.id, status, delivered_count as i32, failed_count as i32)
                .await?;

            activity.record(
                event::PROVIDER_SUCCEEDED,
                json!({
                    "campaign_id": campaign.id,
                    "submitted_tokens": tokens.len(),
                    "delivered_users": delivered_count,
                    "failed_users": failed_count,
                }),
            );
            tracing::info!(
                campaign_id = %campaign.id,
                delivered = delivered_count,
                failed = failed_count,
                status = ?status,
                "campaign delivered"
            );
        }
        Err(e) => {
            tracing::warn!(campaign_id = %campaign.id, error = %e, "push provider call failed");
            let failed = store.fail_remaining_pending(campaign.id).await?;
            store
                .finalize_campaign(campaign.id, CampaignStatus::Failed, 0, failed as i32)
                .await?;
            activity.record(
                event::PROVIDER_FAILED,
                json!({ "campaign_id": campaign.id, "error": e.to_string() }),
            );
        }
    }

    Ok(())
}

/// Users with at least one delivered token, in submission order.
///
/// A receipt naming failed tokens is authoritative. With only a delivered
/// count, the first `delivered` recipients in submission order are taken as
/// delivered. With neither, every submitted token counts as delivered.
pub fn delivered_users(recipients: &[DeviceToken], receipt: &PushReceipt) -> Vec<Uuid> {
    let token_delivered: Vec<bool> = match (&receipt.failed_tokens, receipt.delivered) {
        (Some(failed), _) => recipients
            .iter()
            .map(|r| !failed.iter().any(|f| f == &r.token))
            .collect(),
        (None, Some(n)) => (0..recipients.len()).map(|i| (i as u64) < n).collect(),
        (None, None) => vec![true; recipients.len()],
    };

    let mut seen = HashSet::new();
    let mut users = Vec::new();
    for (recipient, delivered) in recipients.iter().zip(token_delivered) {
        if delivered && seen.insert(recipient.user_id) {
            users.push(recipient.user_id);
        }
    }
    users
}
