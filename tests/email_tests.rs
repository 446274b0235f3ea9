use beam::error::BeamError;
use beam::services::{EmailMessage, Mailer, ResendMailer};
use mockito::Matcher;
use serde_json::json;

fn message() -> EmailMessage {
    EmailMessage::claim_notification(
        "alice@example.com",
        "10",
        "http://localhost:3000/claim/abc",
    )
}

#[tokio::test]
async fn resend_mailer_posts_message_and_returns_id() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/emails")
        .match_header("authorization", "Bearer re_test")
        .match_body(Matcher::PartialJson(json!({
            "from": "noreply@beam-app.com",
            "to": ["alice@example.com"],
            "subject": "You've received $10 USDC on Beam!",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"email_123"}"#)
        .create_async()
        .await;

    let mailer = ResendMailer::new(
        server.url(),
        "re_test".to_string(),
        "noreply@beam-app.com".to_string(),
    );

    let id = mailer.send(&message()).await.unwrap();
    assert_eq!(id, "email_123");
    mock.assert_async().await;
}

#[tokio::test]
async fn resend_mailer_surfaces_provider_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/emails")
        .with_status(422)
        .with_header("content-type", "application/json")
        .with_body(r#"{"statusCode":422,"name":"validation_error","message":"Invalid `to` field"}"#)
        .create_async()
        .await;

    let mailer = ResendMailer::new(
        server.url(),
        "re_test".to_string(),
        "noreply@beam-app.com".to_string(),
    );

    let err = mailer.send(&message()).await.unwrap_err();
    match err {
        BeamError::Email(msg) => assert_eq!(msg, "Invalid `to` field"),
        other => panic!("unexpected error: {other:?}"),
    }
}
