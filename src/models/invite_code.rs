// src/models/invite_code.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'invite_codes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InviteCode {
    pub id: i64,
    pub code: String,
    pub created_by: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub used_by: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
}

impl InviteCode {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.used_by.is_none() && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

/// DTO for issuing a new invite code.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateInviteCodeRequest {
    /// Lifetime of the code; no expiry when omitted.
    #[validate(range(min = 1, max = 720))]
    pub expires_in_hours: Option<i64>,
}
