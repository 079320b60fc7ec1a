use crate::domain::subscriber_email::SubscriberEmail;
use crate::email_client::EmailClient;

/// Welcome and farewell notifications share the same best-effort contract:
/// the caller attempts the send exactly once after the store mutation has
/// committed, logs a failure and never surfaces it to the requester.

pub fn build_unsubscribe_link(base_url: &str, unsubscribe_token: &str) -> String {
    format!("{}/unsubscriptions?token={}", base_url, unsubscribe_token)
}

pub fn build_verification_link(base_url: &str, verification_token: &str) -> String {
    format!(
        "{}/subscriptions/confirm?token={}",
        base_url, verification_token
    )
}

fn branded_layout(heading: &str, inner_html: &str, footer_html: &str) -> String {
    format!(
        r#"
        <div style="font-family: Georgia, serif; max-width: 560px; margin: 0 auto; color: #1d1d1f;">
            <div style="border-bottom: 2px solid #1d1d1f; padding: 16px 0;">
                <h1 style="font-size: 22px; margin: 0;">{}</h1>
            </div>
            <div style="padding: 24px 0; font-size: 16px; line-height: 1.6;">{}</div>
            <div style="border-top: 1px solid #d2d2d7; padding: 16px 0; font-size: 12px; color: #6e6e73;">{}</div>
        </div>
        "#,
        heading, inner_html, footer_html
    )
}

#[tracing::instrument(
    name = "Send a welcome email to a subscriber",
    skip(email_client, recipient, verification_token, unsubscribe_token),
    fields(base_url = %base_url)
)]
pub async fn send_welcome_email(
    email_client: &EmailClient,
    recipient: SubscriberEmail,
    recipient_name: Option<&str>,
    base_url: &str,
    verification_token: &str,
    unsubscribe_token: &str,
) -> Result<(), reqwest::Error> {
    let verification_link = build_verification_link(base_url, verification_token);
    let unsubscribe_link = build_unsubscribe_link(base_url, unsubscribe_token);
    let greeting = match recipient_name {
        Some(name) => format!("Hello {},", name),
        None => String::from("Hello,"),
    };
    let inner_html = format!(
        r#"
            <p>{}</p>
            <p>Thanks for subscribing to the studio newsletter. Expect occasional notes
            on new paintings, city projects and things built with code.</p>
            <p>Please <a href="{}" style="color: #1d1d1f;">verify your email address</a>
            so we know this inbox is really yours.</p>
        "#,
        greeting, verification_link
    );
    let footer_html = format!(
        r#"<p>You are receiving this because you signed up on the studio website.
        <a href="{}" style="color: #6e6e73;">Unsubscribe</a> at any time.</p>"#,
        unsubscribe_link
    );
    let html_body = branded_layout("Welcome to the studio", &inner_html, &footer_html);

    email_client
        .send_email(recipient, "Welcome to the studio newsletter", &html_body)
        .await
}

#[tracing::instrument(
    name = "Send a farewell email to a subscriber",
    skip(email_client, recipient),
    fields(base_url = %base_url)
)]
pub async fn send_farewell_email(
    email_client: &EmailClient,
    recipient: SubscriberEmail,
    base_url: &str,
) -> Result<(), reqwest::Error> {
    let inner_html = format!(
        r#"
            <p>You have been unsubscribed from the studio newsletter.</p>
            <p>No more emails will be sent to this address. If this was a mistake,
            you can sign up again anytime at <a href="{}" style="color: #1d1d1f;">the studio website</a>.</p>
        "#,
        base_url
    );
    let footer_html = String::from("<p>Thanks for having been along for the ride.</p>");
    let html_body = branded_layout("Sorry to see you go", &inner_html, &footer_html);

    email_client
        .send_email(recipient, "You have been unsubscribed", &html_body)
        .await
}
