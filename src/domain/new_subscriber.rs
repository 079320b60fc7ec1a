use serde::Deserialize;

use crate::domain::subscriber_email::SubscriberEmail;
use crate::domain::subscriber_name::SubscriberName;
use crate::domain::subscription_source::SubscriptionSource;

pub struct NewSubscriber {
    pub email: SubscriberEmail,
    pub name: Option<SubscriberName>,
    pub source: SubscriptionSource,
}

#[derive(Deserialize)]
pub struct NewSubscriberBody {
    pub email: String,
    pub name: Option<String>,
    pub source: Option<String>,
}

impl TryFrom<NewSubscriberBody> for NewSubscriber {
    type Error = String;

    fn try_from(body: NewSubscriberBody) -> Result<Self, Self::Error> {
        let email =
            SubscriberEmail::parse(body.email).map_err(|err| format!("email: {}", err))?;
        let name = match body.name {
            Some(name) => {
                Some(SubscriberName::parse(name).map_err(|err| format!("name: {}", err))?)
            }
            None => None,
        };
        let source = match body.source {
            Some(source) => {
                SubscriptionSource::parse(source).map_err(|err| format!("source: {}", err))?
            }
            None => SubscriptionSource::default(),
        };

        Ok(NewSubscriber {
            email,
            name,
            source,
        })
    }
}
