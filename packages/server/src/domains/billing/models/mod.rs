pub mod user_subscription;

pub use user_subscription::UserSubscription;
