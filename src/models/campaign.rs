use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

pub const TITLE_MAX: usize = 200;
pub const MESSAGE_MAX: usize = 2000;

/// Category attached to a campaign and carried through to devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "campaign_kind", rename_all = "snake_case")]
pub enum CampaignKind {
    Alert,
    Announcement,
    Promotion,
    System,
}

impl CampaignKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "alert" => Some(Self::Alert),
            "announcement" => Some(Self::Announcement),
            "promotion" => Some(Self::Promotion),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Announcement => "announcement",
            Self::Promotion => "promotion",
            Self::System => "system",
        }
    }
}

/// Campaign lifecycle. `Pending` is the durable marker of undelivered work;
/// the other three states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "campaign_status", rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Sent,
    PartialFailed,
    Failed,
}

impl CampaignStatus {
    /// Terminal status as a pure function of delivery counts.
    pub fn from_counts(delivered: i64, total: i64) -> Self {
        if delivered == 0 {
            Self::Failed
        } else if delivered >= total {
            Self::Sent
        } else {
            Self::PartialFailed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: CampaignKind,
    pub image_url: Option<String>,
    pub deep_link: Option<String>,
    pub created_by: String,
    pub status: CampaignStatus,
    pub total_users: i32,
    pub delivered_users: i32,
    pub failed_users: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub title: String,
    pub message: String,
    pub kind: CampaignKind,
    pub image_url: Option<String>,
    pub deep_link: Option<String>,
    pub created_by: String,
}

/// Validate raw intake fields. Returns the trimmed title/message and the
/// parsed kind, or the first validation failure.
pub fn validate_intake(
    title: &str,
    message: &str,
    kind: &str,
) -> Result<(String, String, CampaignKind), AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation {
            field: "title",
            reason: "must not be empty".into(),
        });
    }
    if title.len() > TITLE_MAX {
        return Err(AppError::Validation {
            field: "title",
            reason: format!("must be at most {} characters", TITLE_MAX),
        });
    }

    let message = message.trim();
    if message.is_empty() {
        return Err(AppError::Validation {
            field: "message",
            reason: "must not be empty".into(),
        });
    }
    if message.len() > MESSAGE_MAX {
        return Err(AppError::Validation {
            field: "message",
            reason: format!("must be at most {} characters", MESSAGE_MAX),
        });
    }

    let kind = CampaignKind::parse(kind).ok_or_else(|| AppError::Validation {
        field: "kind",
        reason: "must be one of: alert, announcement, promotion, system".into(),
    })?;

    Ok((title.to_string(), message.to_string(), kind))
}
