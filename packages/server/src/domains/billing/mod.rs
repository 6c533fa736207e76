//! Billing domain - subscription plans, word usage and quota enforcement.

pub mod models;
pub mod quota;
pub mod rates;

pub use models::UserSubscription;
pub use quota::{
    assess, billed_words, count_words, PlanQuotas, QuotaAssessment, QuotaCharge, QuotaEnforcer,
    QuotaError, UsageWarning, UserPlan,
};
pub use rates::{ModelRate, ModelRateCatalog};
