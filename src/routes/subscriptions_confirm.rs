use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

#[derive(thiserror::Error)]
pub enum ConfirmError {
    #[error("Invalid verification token")]
    InvalidToken,
    #[error("Something went wrong while processing the request.")]
    Store(#[source] sqlx::Error),
}

impl std::fmt::Debug for ConfirmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

#[derive(serde::Serialize)]
struct ConfirmErrorBody {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ResponseError for ConfirmError {
    fn status_code(&self) -> StatusCode {
        match self {
            ConfirmError::InvalidToken => StatusCode::BAD_REQUEST,
            ConfirmError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ConfirmError::InvalidToken => ConfirmErrorBody {
                success: false,
                message: None,
                error: Some(self.to_string()),
            },
            ConfirmError::Store(_) => ConfirmErrorBody {
                success: false,
                message: Some(self.to_string()),
                error: None,
            },
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

#[derive(serde::Deserialize, Debug)]
pub struct Parameters {
    pub token: String,
}

#[derive(serde::Serialize)]
struct ConfirmResponse {
    success: bool,
    message: String,
}

/// Optional hardening step: confirming ownership of the address. Activation
/// does not depend on it, subscribers receive mail from the moment they sign up.
#[tracing::instrument(
    name = "Confirm a newsletter subscription",
    skip(db_pool, parameters)
)]
pub async fn handle_confirm_subscription(
    db_pool: web::Data<PgPool>,
    parameters: web::Query<Parameters>,
) -> Result<HttpResponse, ConfirmError> {
    let verified = mark_subscriber_verified(&db_pool, parameters.token.as_str())
        .await
        .map_err(ConfirmError::Store)?;

    match verified {
        Some(subscriber_id) => {
            tracing::info!("Subscriber {} verified their email address", subscriber_id);

            Ok(HttpResponse::Ok().json(ConfirmResponse {
                success: true,
                message: String::from("Your email address has been verified."),
            }))
        }
        None => Err(ConfirmError::InvalidToken),
    }
}

// Clearing the token in the same statement makes it single-use.
#[tracing::instrument(name = "Mark a subscriber as verified", skip(db_pool, token))]
async fn mark_subscriber_verified(
    db_pool: &PgPool,
    token: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE subscribers
        SET verification_token = NULL, verified_at = $1, updated_at = $1
        WHERE verification_token = $2
        RETURNING id
        "#,
    )
    .bind(Utc::now())
    .bind(token)
    .map(|row: PgRow| row.get("id"))
    .fetch_optional(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        err
    })
}
