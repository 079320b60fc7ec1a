use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use chrono::Utc;
use rand::Rng;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    domain::{
        new_subscriber::{NewSubscriber, NewSubscriberBody},
        subscriber::Subscriber,
        subscriber_email::SubscriberEmail,
        subscriber_name::SubscriberName,
        subscription_source::SubscriptionSource,
    },
    email_client::EmailClient,
    notifications::send_welcome_email,
    startup::ApplicationBaseUrl,
};

#[derive(thiserror::Error)]
pub enum SubscriptionError {
    #[error("{0}")]
    Validation(String),
    #[error("Something went wrong while processing the request.")]
    Store(#[source] sqlx::Error),
}

impl std::fmt::Debug for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

#[derive(serde::Serialize)]
struct SubscriptionErrorBody {
    success: bool,
    message: String,
}

impl ResponseError for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscriptionError::Validation(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Store failures keep their detail in the logs; the client only sees the generic message.
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(SubscriptionErrorBody {
            success: false,
            message: self.to_string(),
        })
    }
}

#[derive(serde::Serialize)]
pub struct SubscriberSummary {
    id: Uuid,
    email: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_subscribed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reactivated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscriber: Option<SubscriberSummary>,
}

#[tracing::instrument(
    name = "Creating a new subscription handler",
    skip(body, db_pool, email_client, base_url),
    fields(subscriber_email = %body.email)
)]
pub async fn handle_create_subscription(
    body: web::Json<NewSubscriberBody>,
    db_pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    base_url: web::Data<ApplicationBaseUrl>,
) -> Result<HttpResponse, SubscriptionError> {
    let new_subscriber: NewSubscriber = body
        .into_inner()
        .try_into()
        .map_err(SubscriptionError::Validation)?;

    let existing = get_subscriber_by_email(&db_pool, new_subscriber.email.as_ref())
        .await
        .map_err(SubscriptionError::Store)?;

    if let Some(subscriber) = existing {
        if subscriber.is_active {
            return Ok(HttpResponse::Ok().json(SubscribeResponse {
                success: true,
                message: String::from("You are already subscribed."),
                already_subscribed: Some(true),
                reactivated: None,
                subscriber: None,
            }));
        }
    }

    let verification_token = generate_token();
    let record = upsert_subscriber(&db_pool, &new_subscriber, &verification_token)
        .await
        .map_err(SubscriptionError::Store)?;

    // Best-effort: the subscription is already committed, a failed send only gets logged.
    if let Err(err) = send_welcome_email(
        &email_client,
        new_subscriber.email.clone(),
        new_subscriber.name.as_ref().map(|name| name.as_ref()),
        base_url.0.as_str(),
        &verification_token,
        &record.unsubscribe_token,
    )
    .await
    {
        tracing::error!(
            "Failed to send a welcome email to {}: {:?}",
            new_subscriber.email.as_ref(),
            err
        );
    }

    if record.inserted {
        Ok(HttpResponse::Created().json(SubscribeResponse {
            success: true,
            message: String::from("Thanks for subscribing!"),
            already_subscribed: None,
            reactivated: None,
            subscriber: Some(SubscriberSummary {
                id: record.id,
                email: record.email,
            }),
        }))
    } else {
        Ok(HttpResponse::Ok().json(SubscribeResponse {
            success: true,
            message: String::from("Welcome back! Your subscription is active again."),
            already_subscribed: None,
            reactivated: Some(true),
            subscriber: None,
        }))
    }
}

#[derive(serde::Deserialize)]
pub struct StatsParameters {
    pub action: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStats {
    total: u64,
    active: u64,
    inactive: u64,
    by_source: HashMap<String, u64>,
}

#[derive(serde::Serialize)]
struct StatsResponse {
    success: bool,
    stats: SubscriptionStats,
}

#[tracing::instrument(name = "Subscription stats handler", skip(parameters, db_pool))]
pub async fn handle_subscription_stats(
    parameters: web::Query<StatsParameters>,
    db_pool: web::Data<PgPool>,
) -> Result<HttpResponse, SubscriptionError> {
    match parameters.action.as_deref() {
        Some("stats") => {}
        _ => {
            return Err(SubscriptionError::Validation(String::from(
                "action: unknown or missing action",
            )))
        }
    }

    let stats = get_subscription_stats(&db_pool)
        .await
        .map_err(SubscriptionError::Store)?;

    Ok(HttpResponse::Ok().json(StatsResponse {
        success: true,
        stats,
    }))
}

pub fn map_subscriber_row(row: PgRow) -> Subscriber {
    Subscriber {
        id: row.get("id"),
        email: SubscriberEmail::parse(row.get("email")).unwrap(),
        name: row
            .get::<Option<String>, _>("name")
            .map(|name| SubscriberName::parse(name).unwrap()),
        is_active: row.get("is_active"),
        source: SubscriptionSource::parse(row.get("source")).unwrap(),
        verification_token: row.get("verification_token"),
        verified_at: row.get("verified_at"),
        unsubscribe_token: row.get("unsubscribe_token"),
        subscribed_at: row.get("subscribed_at"),
        updated_at: row.get("updated_at"),
    }
}

#[tracing::instrument(name = "Fetch a subscriber by email", skip(db_pool, email))]
pub async fn get_subscriber_by_email(
    db_pool: &PgPool,
    email: &str,
) -> Result<Option<Subscriber>, sqlx::Error> {
    sqlx::query(
        r#"
        SELECT id, email, name, is_active, source, verification_token, verified_at,
               unsubscribe_token, subscribed_at, updated_at
        FROM subscribers
        WHERE email = $1
        "#,
    )
    .bind(email)
    .map(map_subscriber_row)
    .fetch_optional(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        err
    })
}

struct UpsertedSubscriber {
    id: Uuid,
    email: String,
    unsubscribe_token: String,
    inserted: bool,
}

#[tracing::instrument(
    name = "Insert or reactivate a subscriber",
    skip(db_pool, new_subscriber, verification_token)
)]
async fn upsert_subscriber(
    db_pool: &PgPool,
    new_subscriber: &NewSubscriber,
    verification_token: &str,
) -> Result<UpsertedSubscriber, sqlx::Error> {
    // The unique constraint on email turns the concurrent-subscribe race into a
    // reactivation update. The unsubscribe token is only set on first insert and
    // never rotated. `xmax = 0` holds only for freshly inserted rows.
    sqlx::query(
        r#"
        INSERT INTO subscribers
            (id, email, name, is_active, source, verification_token, unsubscribe_token, subscribed_at, updated_at)
        VALUES ($1, $2, $3, TRUE, $4, $5, $6, $7, $7)
        ON CONFLICT (email) DO UPDATE
        SET is_active = TRUE,
            source = EXCLUDED.source,
            name = COALESCE(EXCLUDED.name, subscribers.name),
            verification_token = EXCLUDED.verification_token,
            verified_at = NULL,
            updated_at = EXCLUDED.updated_at
        RETURNING id, email, unsubscribe_token, (xmax = 0) AS inserted
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new_subscriber.email.as_ref())
    .bind(new_subscriber.name.as_ref().map(|name| name.as_ref()))
    .bind(new_subscriber.source.as_ref())
    .bind(verification_token)
    .bind(generate_token())
    .bind(Utc::now())
    .map(|row: PgRow| UpsertedSubscriber {
        id: row.get("id"),
        email: row.get("email"),
        unsubscribe_token: row.get("unsubscribe_token"),
        inserted: row.get("inserted"),
    })
    .fetch_one(db_pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        err
    })
}

// Full scan reduced in memory; fine at the scale of a personal site.
#[tracing::instrument(name = "Compute subscription stats", skip(db_pool))]
async fn get_subscription_stats(db_pool: &PgPool) -> Result<SubscriptionStats, sqlx::Error> {
    let rows = sqlx::query("SELECT is_active, source FROM subscribers")
        .map(|row: PgRow| {
            (
                row.get::<bool, _>("is_active"),
                row.get::<String, _>("source"),
            )
        })
        .fetch_all(db_pool)
        .await
        .map_err(|err| {
            tracing::error!("Failed to execute query: {:?}", err);
            err
        })?;

    let mut stats = SubscriptionStats {
        total: 0,
        active: 0,
        inactive: 0,
        by_source: HashMap::new(),
    };

    for (is_active, source) in rows {
        stats.total += 1;
        if is_active {
            stats.active += 1;
        } else {
            stats.inactive += 1;
        }
        *stats.by_source.entry(source).or_insert(0) += 1;
    }

    Ok(stats)
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();

    std::iter::repeat_with(|| rng.sample(rand::distributions::Alphanumeric))
        .map(char::from)
        .take(30)
        .collect()
}
