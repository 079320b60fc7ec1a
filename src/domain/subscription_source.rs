/// Acquisition channel of a subscription. Recorded as-is, never mutated after
/// reactivation updates it to the latest channel used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum SubscriptionSource {
    Footer,
    Blog,
    Shop,
    Contact,
}

impl SubscriptionSource {
    pub fn parse(source: String) -> Result<SubscriptionSource, String> {
        match source.as_str() {
            "footer" => Ok(SubscriptionSource::Footer),
            "blog" => Ok(SubscriptionSource::Blog),
            "shop" => Ok(SubscriptionSource::Shop),
            "contact" => Ok(SubscriptionSource::Contact),
            _ => Err(format!("{} is not a valid subscription source", source)),
        }
    }
}

impl AsRef<str> for SubscriptionSource {
    fn as_ref(&self) -> &str {
        match self {
            SubscriptionSource::Footer => "footer",
            SubscriptionSource::Blog => "blog",
            SubscriptionSource::Shop => "shop",
            SubscriptionSource::Contact => "contact",
        }
    }
}

impl Default for SubscriptionSource {
    fn default() -> Self {
        SubscriptionSource::Footer
    }
}
