pub mod health_check;
pub mod subscriptions;
pub mod subscriptions_confirm;
pub mod unsubscriptions;

pub use health_check::health_check;
pub use subscriptions::{handle_create_subscription, handle_subscription_stats};
pub use subscriptions_confirm::handle_confirm_subscription;
pub use unsubscriptions::{handle_one_click_unsubscription, handle_unsubscription};
