use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;
use crate::domain::subscription_source::SubscriptionSource;

/// One newsletter recipient. Rows are never hard-deleted: an unsubscribed
/// recipient keeps its row (and unsubscribe token) for later reactivation.
#[derive(Debug, serde::Serialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: SubscriberEmail,
    pub name: Option<SubscriberName>,
    pub is_active: bool,
    pub source: SubscriptionSource,
    pub verification_token: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub unsubscribe_token: String,
    pub subscribed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
