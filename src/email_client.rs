use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use std::time;

use crate::domain::subscriber_email::SubscriberEmail;

const REQUEST_TIMEOUT: time::Duration = time::Duration::from_secs(10);

/// Thin wrapper around the transactional-email provider's send API.
/// The sender address is fixed at construction; every email carries the
/// configured reply-to.
pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: SubscriberEmail,
    reply_to: SubscriberEmail,
    api_key: Secret<String>,
}

#[derive(serde::Serialize)]
pub struct SendEmailBody {
    personalizations: Vec<SendgridPersonalization>,
    from: SendgridEmail,
    reply_to: SendgridEmail,
    subject: String,
    content: Vec<SendgridContent>,
}

#[derive(serde::Serialize)]
struct SendgridEmail {
    email: String,
}

#[derive(serde::Serialize)]
struct SendgridPersonalization {
    to: Vec<SendgridEmail>,
}

#[derive(serde::Serialize)]
struct SendgridContent {
    content_type: String,
    value: String,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SubscriberEmail,
        reply_to: SubscriberEmail,
        api_key: Secret<String>,
        timeout: Option<time::Duration>,
    ) -> EmailClient {
        let http_client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()
            .unwrap();

        EmailClient {
            http_client,
            base_url,
            sender,
            reply_to,
            api_key,
        }
    }

    pub async fn send_email(
        &self,
        recipient: SubscriberEmail,
        subject: &str,
        html_content: &str,
    ) -> Result<(), reqwest::Error> {
        let url = format!("{}/mail/send", self.base_url);
        let body = SendEmailBody {
            from: SendgridEmail {
                email: String::from(self.sender.as_ref()),
            },
            reply_to: SendgridEmail {
                email: String::from(self.reply_to.as_ref()),
            },
            personalizations: vec![SendgridPersonalization {
                to: vec![SendgridEmail {
                    email: String::from(recipient.as_ref()),
                }],
            }],
            subject: String::from(subject),
            content: vec![SendgridContent {
                content_type: String::from("text/html"),
                value: String::from(html_content),
            }],
        };

        self.http_client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()?; // return an error when server response status code is 4xx or 5xx

        Ok(())
    }
}
