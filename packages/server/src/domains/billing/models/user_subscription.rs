use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool};
use tracing::warn;

use crate::common::UserId;
use crate::domains::billing::quota::UserPlan;

/// A user's plan and cumulative word usage.
///
/// `words_used` only ever grows, and only inside the transaction that
/// completes the task being charged.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserSubscription {
    pub user_id: UserId,
    pub user_plan: String,
    pub words_used: i64,
    pub selected_ai_model: Option<String>,
    pub words_warning_80_sent: bool,
    pub words_warning_100_sent: bool,
    pub updated_at: DateTime<Utc>,
}

impl UserSubscription {
    pub fn plan(&self) -> UserPlan {
        self.user_plan.parse().unwrap_or_else(|_| {
            warn!(
                user_id = %self.user_id,
                plan = %self.user_plan,
                "Unknown subscription plan, treating as free"
            );
            UserPlan::Free
        })
    }

    pub async fn find_by_user(user_id: UserId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM user_subscriptions WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Read and lock the row for the rest of the transaction.
    pub async fn find_for_update<'e>(
        user_id: UserId,
        executor: impl PgExecutor<'e>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM user_subscriptions WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(Into::into)
    }

    /// Add `words` to the usage counter and latch the warning flags.
    ///
    /// Flags are only ever raised here, never cleared.
    pub async fn record_usage<'e>(
        user_id: UserId,
        words: i64,
        warning_80_sent: bool,
        warning_100_sent: bool,
        executor: impl PgExecutor<'e>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE user_subscriptions
            SET words_used = words_used + $2,
                words_warning_80_sent = words_warning_80_sent OR $3,
                words_warning_100_sent = words_warning_100_sent OR $4,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(words.max(0))
        .bind(warning_80_sent)
        .bind(warning_100_sent)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    /// Create or replace a subscription row (provisioning and tests).
    pub async fn upsert(
        user_id: UserId,
        plan: UserPlan,
        words_used: i64,
        selected_ai_model: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO user_subscriptions (user_id, user_plan, words_used, selected_ai_model)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET user_plan = EXCLUDED.user_plan,
                words_used = EXCLUDED.words_used,
                selected_ai_model = EXCLUDED.selected_ai_model,
                words_warning_80_sent = FALSE,
                words_warning_100_sent = FALSE,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(plan.to_string())
        .bind(words_used)
        .bind(selected_ai_model)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
