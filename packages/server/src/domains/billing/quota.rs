//! Word-usage quota enforcement.
//!
//! Usage is charged when a task completes, inside the completion transaction.
//! The free plan is a hard cap; paid plans may run over their quota and are
//! notified instead.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde_json::json;
use sqlx::PgConnection;
use thiserror::Error;
use tracing::{info, warn};

use crate::common::UserId;
use crate::domains::billing::models::UserSubscription;
use crate::domains::billing::rates::ModelRateCatalog;

/// Error code reported to clients when the free plan is exhausted.
pub const FREE_PLAN_QUOTA_EXCEEDED_CODE: i32 = 1002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserPlan {
    Free,
    Professional,
    Team,
}

impl fmt::Display for UserPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserPlan::Free => write!(f, "free"),
            UserPlan::Professional => write!(f, "professional"),
            UserPlan::Team => write!(f, "team"),
        }
    }
}

impl FromStr for UserPlan {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "free" => Ok(UserPlan::Free),
            "professional" => Ok(UserPlan::Professional),
            "team" => Ok(UserPlan::Team),
            _ => Err(anyhow::anyhow!("Invalid user plan: {}", s)),
        }
    }
}

/// Word quota per plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanQuotas {
    pub free: i64,
    pub professional: i64,
    pub team: i64,
}

impl PlanQuotas {
    pub fn quota_for(&self, plan: UserPlan) -> i64 {
        match plan {
            UserPlan::Free => self.free,
            UserPlan::Professional => self.professional,
            UserPlan::Team => self.team,
        }
    }
}

impl Default for PlanQuotas {
    fn default() -> Self {
        Self {
            free: 10_000,
            professional: 1_000_000,
            team: 5_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("Free plan word quota exceeded: usage {usage}, quota {quota}")]
    FreePlanQuotaExceeded { usage: i64, quota: i64 },
}

impl QuotaError {
    pub fn code(&self) -> i32 {
        match self {
            QuotaError::FreePlanQuotaExceeded { .. } => FREE_PLAN_QUOTA_EXCEEDED_CODE,
        }
    }

    /// Message pushed to the user's live channel.
    pub fn notice(&self) -> serde_json::Value {
        match self {
            QuotaError::FreePlanQuotaExceeded { usage, quota } => json!({
                "type": "words_quota_exceeded",
                "code": self.code(),
                "plan": UserPlan::Free.to_string(),
                "usage": usage,
                "quota": quota,
                "message": self.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageWarning {
    Reached80,
    Reached100,
}

impl UsageWarning {
    pub fn percent(self) -> u8 {
        match self {
            UsageWarning::Reached80 => 80,
            UsageWarning::Reached100 => 100,
        }
    }
}

// =============================================================================
// Pure accounting
// =============================================================================

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c as u32,
        0x3400..=0x4DBF      // Extension A
        | 0x4E00..=0x9FFF    // Unified Ideographs
        | 0xF900..=0xFAFF    // Compatibility Ideographs
        | 0x20000..=0x2A6DF  // Extension B
        | 0x2A700..=0x2EBEF  // Extensions C-F
        | 0x30000..=0x3134F) // Extension G
}

/// Count words: each CJK ideograph is one word, and each maximal run of other
/// non-whitespace characters is one word.
pub fn count_words(text: &str) -> u64 {
    let mut words = 0u64;
    let mut in_run = false;

    for c in text.chars() {
        if is_cjk_ideograph(c) {
            words += 1;
            in_run = false;
        } else if c.is_whitespace() {
            in_run = false;
        } else if !in_run {
            words += 1;
            in_run = true;
        }
    }

    words
}

/// Words charged for a job: at least one, even for empty output.
pub fn billed_words(total_words: u64, cost_multiplier: f64) -> i64 {
    let billed = (total_words as f64 * cost_multiplier).round();
    if billed.is_finite() && billed >= 1.0 {
        billed as i64
    } else {
        1
    }
}

/// Outcome of charging `billed_words` against a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaAssessment {
    pub billed_words: i64,
    pub new_usage: i64,
    pub quota: i64,
    pub over_quota: bool,
    pub warnings: Vec<UsageWarning>,
}

/// Decide whether a charge is accepted and which warnings it triggers.
pub fn assess(
    subscription: &UserSubscription,
    billed_words: i64,
    quotas: &PlanQuotas,
) -> Result<QuotaAssessment, QuotaError> {
    let plan = subscription.plan();
    let quota = quotas.quota_for(plan);
    let new_usage = subscription.words_used.saturating_add(billed_words);
    let over_quota = new_usage > quota;

    if plan == UserPlan::Free && over_quota {
        return Err(QuotaError::FreePlanQuotaExceeded {
            usage: new_usage,
            quota,
        });
    }

    let mut warnings = Vec::new();
    if quota > 0 {
        if !subscription.words_warning_80_sent && new_usage * 100 >= quota * 80 {
            warnings.push(UsageWarning::Reached80);
        }
        if !subscription.words_warning_100_sent && new_usage >= quota {
            warnings.push(UsageWarning::Reached100);
        }
    }

    Ok(QuotaAssessment {
        billed_words,
        new_usage,
        quota,
        over_quota,
        warnings,
    })
}

// =============================================================================
// Enforcer
// =============================================================================

/// A committed-with-the-transaction usage charge.
#[derive(Debug, Clone)]
pub struct QuotaCharge {
    pub user_id: UserId,
    pub plan: UserPlan,
    pub billed_words: i64,
    pub words_used: i64,
    pub quota: i64,
    pub over_quota: bool,
    pub warnings: Vec<UsageWarning>,
}

impl QuotaCharge {
    /// Messages to publish once the charge has been committed.
    pub fn notices(&self) -> Vec<serde_json::Value> {
        let mut notices: Vec<serde_json::Value> = self
            .warnings
            .iter()
            .map(|warning| {
                json!({
                    "type": "words_usage_warning",
                    "threshold": warning.percent(),
                    "plan": self.plan.to_string(),
                    "usage": self.words_used,
                    "quota": self.quota,
                })
            })
            .collect();

        if self.over_quota && self.plan != UserPlan::Free {
            notices.push(json!({
                "type": "words_quota_overage",
                "plan": self.plan.to_string(),
                "usage": self.words_used,
                "quota": self.quota,
                "overage": self.words_used - self.quota,
            }));
        }

        notices
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuotaEnforcer {
    quotas: PlanQuotas,
    rates: ModelRateCatalog,
}

impl QuotaEnforcer {
    pub fn new(quotas: PlanQuotas, rates: ModelRateCatalog) -> Self {
        Self { quotas, rates }
    }

    pub fn quotas(&self) -> &PlanQuotas {
        &self.quotas
    }

    /// Charge `total_words` of job output to the user.
    ///
    /// Must run on the completion transaction's connection: the subscription
    /// row is locked and updated there. Returns `Ok(None)` when the user has
    /// no subscription. A free-plan rejection is returned as a `QuotaError`
    /// inside the `anyhow::Error`.
    pub async fn charge(
        &self,
        user_id: UserId,
        total_words: u64,
        conn: &mut PgConnection,
    ) -> Result<Option<QuotaCharge>> {
        let Some(subscription) = UserSubscription::find_for_update(user_id, &mut *conn).await?
        else {
            warn!(user_id = %user_id, "No subscription found, usage not charged");
            return Ok(None);
        };

        let multiplier = self
            .rates
            .cost_multiplier(subscription.selected_ai_model.as_deref());
        let billed = billed_words(total_words, multiplier);

        let assessment = assess(&subscription, billed, &self.quotas)?;

        let updated = UserSubscription::record_usage(
            user_id,
            assessment.billed_words,
            assessment.warnings.contains(&UsageWarning::Reached80),
            assessment.warnings.contains(&UsageWarning::Reached100),
            &mut *conn,
        )
        .await?;

        info!(
            user_id = %user_id,
            total_words,
            multiplier,
            billed_words = billed,
            words_used = updated.words_used,
            quota = assessment.quota,
            "Word usage charged"
        );

        Ok(Some(QuotaCharge {
            user_id,
            plan: subscription.plan(),
            billed_words: assessment.billed_words,
            words_used: updated.words_used,
            quota: assessment.quota,
            over_quota: assessment.over_quota,
            warnings: assessment.warnings,
        }))
    }
}
