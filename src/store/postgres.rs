use sqlx::PgPool;
use uuid::Uuid;

use crate::models::activity::ActivityEntry;
use crate::models::campaign::{Campaign, CampaignStatus, NewCampaign};
use crate::models::notification::UserNotification;
use crate::models::token::{DeviceToken, NewDeviceToken};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- Token Registry --

    /// Idempotent upsert keyed on (user_id, device_id). A re-registration
    /// overwrites the token in place, reactivates the record, and refreshes
    /// the last-active timestamp.
    pub async fn upsert_device_token(&self, t: &NewDeviceToken) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO device_tokens (user_id, token, device_id, platform)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (user_id, device_id)
               DO UPDATE SET token = EXCLUDED.token,
                             platform = EXCLUDED.platform,
                             is_active = true,
                             last_active_at = NOW()
               RETURNING id"#,
        )
        .bind(t.user_id)
        .bind(&t.token)
        .bind(&t.device_id)
        .bind(t.platform)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Deactivate a token. Matching zero rows is not an error: the token is
    /// treated as already removed. Returns whether a row matched, for logging.
    pub async fn deactivate_device_token(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE device_tokens SET is_active = false WHERE user_id = $1 AND token = $2 AND is_active = true",
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All active tokens across all users, in stable submission order.
    /// Dispatcher-only.
    pub async fn list_active_tokens(&self) -> anyhow::Result<Vec<DeviceToken>> {
        let rows = sqlx::query_as::<_, DeviceToken>(
            r#"SELECT id, user_id, token, device_id, platform, is_active, last_active_at, created_at
               FROM device_tokens
               WHERE is_active = true
               ORDER BY user_id, created_at"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn list_user_tokens(&self, user_id: Uuid) -> anyhow::Result<Vec<DeviceToken>> {
        let rows = sqlx::query_as::<_, DeviceToken>(
            r#"SELECT id, user_id, token, device_id, platform, is_active, last_active_at, created_at
               FROM device_tokens
               WHERE user_id = $1
               ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // -- Campaigns --

    /// Create a campaign together with its per-user fan-out and total, in one
    /// transaction. A pending campaign only ever becomes visible to the
    /// dispatcher with its inbox rows and total already in place, so a sweep
    /// can never deliver against a half-written fan-out.
    pub async fn create_campaign_with_fanout(
        &self,
        c: &NewCampaign,
        user_ids: &[Uuid],
    ) -> anyhow::Result<(Uuid, u64)> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO campaigns (title, message, kind, image_url, deep_link, created_by)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id"#,
        )
        .bind(&c.title)
        .bind(&c.message)
        .bind(c.kind)
        .bind(&c.image_url)
        .bind(&c.deep_link)
        .bind(&c.created_by)
        .fetch_one(&mut *tx)
        .await?;

        let created = sqlx::query(
            r#"INSERT INTO user_notifications (user_id, campaign_id, title, message, kind)
               SELECT u, $2, $3, $4, $5 FROM UNNEST($1::uuid[]) AS u"#,
        )
        .bind(user_ids)
        .bind(id)
        .bind(&c.title)
        .bind(&c.message)
        .bind(c.kind)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("UPDATE campaigns SET total_users = $2 WHERE id = $1")
            .bind(id)
            .bind(created as i32)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok((id, created))
    }

    /// Record a campaign that failed at intake (no active recipients). The
    /// row is terminal from the start and never enters the dispatch queue.
    pub async fn insert_failed_campaign(&self, c: &NewCampaign) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO campaigns (title, message, kind, image_url, deep_link, created_by, status, completed_at)
               VALUES ($1, $2, $3, $4, $5, $6, 'failed', NOW())
               RETURNING id"#,
        )
        .bind(&c.title)
        .bind(&c.message)
        .bind(c.kind)
        .bind(&c.image_url)
        .bind(&c.deep_link)
        .bind(&c.created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get_campaign(&self, id: Uuid) -> anyhow::Result<Option<Campaign>> {
        let row = sqlx::query_as::<_, Campaign>(
            r#"SELECT id, title, message, kind, image_url, deep_link, created_by, status,
                      total_users, delivered_users, failed_users, created_at, completed_at
               FROM campaigns WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_campaigns(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, Campaign>(
            r#"SELECT id, title, message, kind, image_url, deep_link, created_by, status,
                      total_users, delivered_users, failed_users, created_at, completed_at
               FROM campaigns ORDER BY created_at DESC LIMIT $1 OFFSET $2"#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Campaigns still awaiting delivery, oldest first. The dispatcher's work
    /// queue; pending rows left by a crash reappear here.
    pub async fn list_pending_campaigns(&self) -> anyhow::Result<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, Campaign>(
            r#"SELECT id, title, message, kind, image_url, deep_link, created_by, status,
                      total_users, delivered_users, failed_users, created_at, completed_at
               FROM campaigns WHERE status = 'pending' ORDER BY created_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Move a campaign to its terminal status with final counters. The status
    /// guard keeps a terminal campaign from being rewritten by a late sweep.
    pub async fn finalize_campaign(
        &self,
        id: Uuid,
        status: CampaignStatus,
        delivered_users: i32,
        failed_users: i32,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"UPDATE campaigns
               SET status = $2, delivered_users = $3, failed_users = $4, completed_at = NOW()
               WHERE id = $1 AND status = 'pending'"#,
        )
        .bind(id)
        .bind(status)
        .bind(delivered_users)
        .bind(failed_users)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // -- Per-User Notifications --

    /// Mark the given users' rows delivered for a campaign. Only pending rows
    /// move, so repeated reconciliation cannot inflate counters.
    pub async fn mark_users_delivered(
        &self,
        campaign_id: Uuid,
        user_ids: &[Uuid],
    ) -> anyhow::Result<u64> {
        if user_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"UPDATE user_notifications
               SET delivery_status = 'delivered', delivered_at = NOW()
               WHERE campaign_id = $1 AND user_id = ANY($2) AND delivery_status = 'pending'"#,
        )
        .bind(campaign_id)
        .bind(user_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Fail every row of a campaign still pending. Used both for partial
    /// delivery and for a provider error, so no row stays pending forever.
    pub async fn fail_remaining_pending(&self, campaign_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"UPDATE user_notifications
               SET delivery_status = 'failed'
               WHERE campaign_id = $1 AND delivery_status = 'pending'"#,
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_notifications(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<UserNotification>> {
        let rows = sqlx::query_as::<_, UserNotification>(
            r#"SELECT id, user_id, campaign_id, title, message, kind, is_read, read_at,
                      delivery_status, delivered_at, created_at
               FROM user_notifications
               WHERE user_id = $1
               ORDER BY created_at DESC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_unread_notifications(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_notifications WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Idempotent: COALESCE keeps the first read timestamp on repeat calls.
    pub async fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"UPDATE user_notifications
               SET is_read = true, read_at = COALESCE(read_at, NOW())
               WHERE id = $1 AND user_id = $2"#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_notifications_read(&self, user_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"UPDATE user_notifications
               SET is_read = true, read_at = COALESCE(read_at, NOW())
               WHERE user_id = $1 AND is_read = false"#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // -- Activity Log --

    pub async fn insert_activity(
        &self,
        event: &str,
        detail: serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO activity_log (event, detail) VALUES ($1, $2)")
            .bind(event)
            .bind(detail)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn list_activity(&self, limit: i64) -> anyhow::Result<Vec<ActivityEntry>> {
        let rows = sqlx::query_as::<_, ActivityEntry>(
            "SELECT id, event, detail, created_at FROM activity_log ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
