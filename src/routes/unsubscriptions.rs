use actix_web::{
    http::{header, StatusCode},
    web, HttpResponse, Responder, ResponseError,
};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    domain::{subscriber::Subscriber, subscriber_email::SubscriberEmail},
    email_client::EmailClient,
    notifications::send_farewell_email,
    routes::subscriptions::{get_subscriber_by_email, map_subscriber_row},
    startup::ApplicationBaseUrl,
};

#[derive(thiserror::Error)]
pub enum UnsubscribeError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid unsubscribe token")]
    InvalidToken,
    #[error("No subscriber found for the given email.")]
    NotFound,
    #[error("Something went wrong while processing the request.")]
    Store(#[source] sqlx::Error),
}

impl std::fmt::Debug for UnsubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

#[derive(serde::Serialize)]
struct UnsubscribeErrorBody {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ResponseError for UnsubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            UnsubscribeError::Validation(_) | UnsubscribeError::InvalidToken => {
                StatusCode::BAD_REQUEST
            }
            UnsubscribeError::NotFound => StatusCode::NOT_FOUND,
            UnsubscribeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // A token miss reads as an invalid link, reported under an `error` key.
        let body = match self {
            UnsubscribeError::InvalidToken => UnsubscribeErrorBody {
                success: false,
                message: None,
                error: Some(self.to_string()),
            },
            _ => UnsubscribeErrorBody {
                success: false,
                message: Some(self.to_string()),
                error: None,
            },
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

impl UnsubscribeError {
    fn redirect_code(&self) -> &'static str {
        match self {
            UnsubscribeError::Validation(_) => "missing_parameters",
            UnsubscribeError::InvalidToken => "invalid_token",
            UnsubscribeError::NotFound => "not_found",
            UnsubscribeError::Store(_) => "server_error",
        }
    }
}

#[derive(serde::Deserialize)]
pub struct UnsubscribeBody {
    pub email: Option<String>,
    pub token: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct UnsubscribeParameters {
    pub email: Option<String>,
    pub token: Option<String>,
}

enum UnsubscribeRequest {
    ByEmail(SubscriberEmail),
    ByToken(String),
}

impl UnsubscribeRequest {
    // Exactly one of email/token identifies the subscriber.
    fn parse(
        email: Option<String>,
        token: Option<String>,
    ) -> Result<UnsubscribeRequest, UnsubscribeError> {
        match (email, token) {
            (Some(_), Some(_)) => Err(UnsubscribeError::Validation(String::from(
                "Provide either an email or an unsubscribe token, not both.",
            ))),
            (None, None) => Err(UnsubscribeError::Validation(String::from(
                "Provide an email or an unsubscribe token.",
            ))),
            (Some(email), None) => {
                let email = SubscriberEmail::parse(email)
                    .map_err(|err| UnsubscribeError::Validation(format!("email: {}", err)))?;

                Ok(UnsubscribeRequest::ByEmail(email))
            }
            (None, Some(token)) => Ok(UnsubscribeRequest::ByToken(token)),
        }
    }
}

enum UnsubscribeOutcome {
    Unsubscribed,
    AlreadyUnsubscribed,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_unsubscribed: Option<bool>,
}

#[tracing::instrument(
    name = "Unsubscribe handler",
    skip(body, db_pool, email_client, base_url)
)]
pub async fn handle_unsubscription(
    body: web::Json<UnsubscribeBody>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    base_url: web::Data<ApplicationBaseUrl>,
) -> Result<HttpResponse, UnsubscribeError> {
    let body = body.into_inner();
    let request = UnsubscribeRequest::parse(body.email, body.token)?;

    match run_unsubscription(request, &db_pool, &email_client, base_url.0.as_str()).await? {
        UnsubscribeOutcome::Unsubscribed => Ok(HttpResponse::Ok().json(UnsubscribeResponse {
            success: true,
            message: String::from("You have been unsubscribed."),
            already_unsubscribed: None,
        })),
        UnsubscribeOutcome::AlreadyUnsubscribed => {
            Ok(HttpResponse::Ok().json(UnsubscribeResponse {
                success: true,
                message: String::from("You were already unsubscribed."),
                already_unsubscribed: Some(true),
            }))
        }
    }
}

// One-click variant used from email footers: same logic, but the outcome is
// reported to a status page through redirect query flags.
#[tracing::instrument(
    name = "One-click unsubscribe handler",
    skip(parameters, db_pool, email_client, base_url)
)]
pub async fn handle_one_click_unsubscription(
    parameters: web::Query<UnsubscribeParameters>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    base_url: web::Data<ApplicationBaseUrl>,
) -> impl Responder {
    let status_page = format!("{}/newsletter/unsubscribed", base_url.0);
    let parameters = parameters.into_inner();

    let request = match UnsubscribeRequest::parse(parameters.email, parameters.token) {
        Ok(request) => request,
        Err(err) => {
            tracing::error!("Invalid one-click unsubscribe request: {:?}", err);
            return redirect_to(format!("{}?error={}", status_page, err.redirect_code()));
        }
    };

    match run_unsubscription(request, &db_pool, &email_client, base_url.0.as_str()).await {
        Ok(UnsubscribeOutcome::Unsubscribed) => {
            redirect_to(format!("{}?success=true", status_page))
        }
        Ok(UnsubscribeOutcome::AlreadyUnsubscribed) => {
            redirect_to(format!("{}?already_unsubscribed=true", status_page))
        }
        Err(err) => {
            tracing::error!("One-click unsubscribe failed: {:?}", err);
            redirect_to(format!("{}?error={}", status_page, err.redirect_code()))
        }
    }
}

fn redirect_to(location: String) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

async fn run_unsubscription(
    request: UnsubscribeRequest,
    db_pool: &PgPool,
    email_client: &EmailClient,
    base_url: &str,
) -> Result<UnsubscribeOutcome, UnsubscribeError> {
    let subscriber = match request {
        UnsubscribeRequest::ByEmail(email) => {
            get_subscriber_by_email(db_pool, email.as_ref())
                .await
                .map_err(UnsubscribeError::Store)?
                .ok_or(UnsubscribeError::NotFound)?
        }
        UnsubscribeRequest::ByToken(token) => {
            get_subscriber_by_unsubscribe_token(db_pool, &token)
                .await
                .map_err(UnsubscribeError::Store)?
                .ok_or(UnsubscribeError::InvalidToken)?
        }
    };

    if !subscriber.is_active {
        return Ok(UnsubscribeOutcome::AlreadyUnsubscribed);
    }

    deactivate_subscriber(db_pool, &subscriber.id)
        .await
        .map_err(UnsubscribeError::Store)?;

    // Best-effort: the unsubscription is already committed, a failed send only gets logged.
    if let Err(err) = send_farewell_email(email_client, subscriber.email.clone(), base_url).await {
        tracing::error!(
            "Failed to send a farewell email to {}: {:?}",
            subscriber.email.as_ref(),
            err
        );
    }

    Ok(UnsubscribeOutcome::Unsubscribed)
}

#[tracing::instrument(name = "Fetch a subscriber by unsubscribe token", skip(db_pool, token))]
async fn get_subscriber_by_unsubscribe_token(
    db_pool: &PgPool,
    token: &str,
) -> Result<Option<Subscriber>, sqlx::Error> {
    sqlx::query(
        r#"
        SELECT id, email, name, is_active, source, verification_token, verified_at,
               unsubscribe_token, subscribed_at, updated_at
        FROM subscribers
        WHERE unsubscribe_token = $1
        "#,
    )
    .bind(token)
    .map(map_subscriber_row)
    .fetch_optional(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        err
    })
}

#[tracing::instrument(name = "Mark a subscriber as inactive", skip(db_pool, subscriber_id))]
async fn deactivate_subscriber(db_pool: &PgPool, subscriber_id: &Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE subscribers SET is_active = FALSE, updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(subscriber_id)
        .execute(db_pool)
        .await
        .map_err(|err| {
            tracing::error!("Failed to execute query: {:?}", err);
            err
        })?;

    Ok(())
}
