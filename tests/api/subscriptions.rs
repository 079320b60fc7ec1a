use sqlx::Row;
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::{find_email_link, TestApp};

#[tokio::test]
async fn subscribe_returns_201_and_persists_the_subscriber() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("name", "Ana");
    body.insert("email", "ana@test.com");

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    let response = test_app.post_subscription(body).await;

    assert_eq!(201, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(response_body["success"], true);
    assert_eq!(response_body["subscriber"]["email"], "ana@test.com");

    let row = sqlx::query(
        "SELECT email, name, is_active, source, verification_token, verified_at, unsubscribe_token FROM subscribers;",
    )
    .fetch_one(&test_app.db_pool)
    .await
    .expect("Query to fetch subscribers failed.");

    assert_eq!(row.get::<String, _>("email"), "ana@test.com");
    assert_eq!(row.get::<Option<String>, _>("name").as_deref(), Some("Ana"));
    assert!(row.get::<bool, _>("is_active"));
    // Defaults to the footer channel when the body does not carry a source
    assert_eq!(row.get::<String, _>("source"), "footer");
    assert!(row.get::<Option<String>, _>("verification_token").is_some());
    assert!(row
        .get::<Option<chrono::DateTime<chrono::Utc>>, _>("verified_at")
        .is_none());
    assert!(!row.get::<String, _>("unsubscribe_token").is_empty());
}

#[tokio::test]
async fn subscribe_records_the_acquisition_channel() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "ana@test.com");
    body.insert("source", "blog");

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    test_app.post_subscription(body).await;

    let source: String = sqlx::query("SELECT source FROM subscribers;")
        .fetch_one(&test_app.db_pool)
        .await
        .expect("Query to fetch subscribers failed.")
        .get("source");

    assert_eq!(source, "blog");
}

#[tokio::test]
async fn subscribe_returns_400_when_body_is_invalid() {
    let test_app = TestApp::spawn_app().await;

    let test_cases: Vec<(HashMap<&str, &str>, &str)> = vec![
        (HashMap::from([]), "missing body parameters"),
        (HashMap::from([("name", "Ana")]), "missing email parameter"),
        (
            HashMap::from([("email", "test.com")]),
            "invalid email parameter",
        ),
        (
            HashMap::from([("email", "ana@test.com"), ("name", "{Ana}")]),
            "invalid name parameter",
        ),
        (
            HashMap::from([("email", "ana@test.com"), ("source", "billboard")]),
            "unknown subscription source",
        ),
    ];

    for (invalid_body, error_message) in test_cases {
        let response = test_app.post_subscription(invalid_body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 status when payload was {}",
            error_message
        );
    }

    let subscribers_count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM subscribers;")
        .fetch_one(&test_app.db_pool)
        .await
        .expect("Query to count subscribers failed.")
        .get("count");

    assert_eq!(subscribers_count, 0);
}

#[tokio::test]
async fn subscribe_is_idempotent_for_active_subscribers() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "ana@test.com");

    // A single welcome email: repeated subscribes must not send another one
    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&test_app.email_server)
        .await;

    let first_response = test_app.post_subscription(body.clone()).await;

    assert_eq!(201, first_response.status().as_u16());

    let second_response = test_app.post_subscription(body).await;

    assert_eq!(200, second_response.status().as_u16());

    let response_body: serde_json::Value = second_response.json().await.unwrap();

    assert_eq!(response_body["success"], true);
    assert_eq!(response_body["alreadySubscribed"], true);

    let subscribers_count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM subscribers;")
        .fetch_one(&test_app.db_pool)
        .await
        .expect("Query to count subscribers failed.")
        .get("count");

    assert_eq!(subscribers_count, 1);
}

#[tokio::test]
async fn subscribe_reactivates_an_unsubscribed_recipient_with_a_fresh_token() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "ana@test.com");

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    test_app.post_subscription(body.clone()).await;

    let first_tokens = sqlx::query(
        "SELECT verification_token, unsubscribe_token FROM subscribers;",
    )
    .fetch_one(&test_app.db_pool)
    .await
    .expect("Query to fetch subscribers failed.");
    let first_verification_token: Option<String> = first_tokens.get("verification_token");
    let first_unsubscribe_token: String = first_tokens.get("unsubscribe_token");

    test_app
        .post_unsubscription(HashMap::from([("email", "ana@test.com")]))
        .await;

    let response = test_app.post_subscription(body).await;

    assert_eq!(200, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(response_body["success"], true);
    assert_eq!(response_body["reactivated"], true);

    let row = sqlx::query(
        "SELECT is_active, verification_token, unsubscribe_token FROM subscribers;",
    )
    .fetch_one(&test_app.db_pool)
    .await
    .expect("Query to fetch subscribers failed.");

    assert!(row.get::<bool, _>("is_active"));
    // Verification starts over with a new token, the unsubscribe token never rotates
    assert_ne!(
        row.get::<Option<String>, _>("verification_token"),
        first_verification_token
    );
    assert_eq!(
        row.get::<String, _>("unsubscribe_token"),
        first_unsubscribe_token
    );
}

#[tokio::test]
async fn subscribe_sends_a_welcome_email_with_verification_and_unsubscribe_links() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("name", "Ana");
    body.insert("email", "ana@test.com");

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&test_app.email_server)
        .await;

    test_app.post_subscription(body).await;

    let received_requests = &test_app.email_server.received_requests().await.unwrap();

    assert_eq!(received_requests.len(), 1);

    let verification_link = find_email_link(&received_requests[0], "/subscriptions/confirm");
    let unsubscribe_link = find_email_link(&received_requests[0], "/unsubscriptions");

    assert!(verification_link.contains("token="));
    assert!(unsubscribe_link.contains("token="));
}

#[tokio::test]
async fn subscribe_succeeds_even_if_the_email_delivery_fails() {
    let test_app = TestApp::spawn_app().await;
    let mut body = HashMap::new();

    body.insert("email", "ana@test.com");

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&test_app.email_server)
        .await;

    let response = test_app.post_subscription(body).await;

    assert_eq!(201, response.status().as_u16());

    let is_active: bool = sqlx::query("SELECT is_active FROM subscribers;")
        .fetch_one(&test_app.db_pool)
        .await
        .expect("Query to fetch subscribers failed.")
        .get("is_active");

    assert!(is_active);
}

#[tokio::test]
async fn stats_report_totals_and_breakdown_by_source() {
    let test_app = TestApp::spawn_app().await;

    Mock::given(path("/mail/send"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    test_app
        .post_subscription(HashMap::from([("email", "ana@test.com")]))
        .await;
    test_app
        .post_subscription(HashMap::from([("email", "ben@test.com"), ("source", "shop")]))
        .await;
    test_app
        .post_unsubscription(HashMap::from([("email", "ben@test.com")]))
        .await;

    let response = test_app.get_stats().await;

    assert_eq!(200, response.status().as_u16());

    let response_body: serde_json::Value = response.json().await.unwrap();

    assert_eq!(response_body["success"], true);
    assert_eq!(response_body["stats"]["total"], 2);
    assert_eq!(response_body["stats"]["active"], 1);
    assert_eq!(response_body["stats"]["inactive"], 1);
    assert_eq!(response_body["stats"]["bySource"]["footer"], 1);
    assert_eq!(response_body["stats"]["bySource"]["shop"], 1);
}

#[tokio::test]
async fn stats_with_unknown_action_returns_400() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get_subscriptions("action=export").await;

    assert_eq!(400, response.status().as_u16());

    let missing_action_response = test_app.get_subscriptions("").await;

    assert_eq!(400, missing_action_response.status().as_u16());
}
