mod common;

use azure_core::credentials::Secret;
use common::{CLIENT_ID, VAULT, fake_jwt, init_logging};
use device_code_credentials::{
    DeviceCodeAuthenticator, Error, http::HttpIdentityProvider, operator::NoConfirmation,
};
use httpmock::{Method::POST, MockServer};
use serde_json::json;
use std::{sync::Arc, time::Duration};

const DEVICE_CODE_PATH: &str = "/tenantA/oauth2/v2.0/devicecode";
const TOKEN_PATH: &str = "/tenantA/oauth2/v2.0/token";

fn authenticator() -> DeviceCodeAuthenticator {
    DeviceCodeAuthenticator::new(
        Arc::new(HttpIdentityProvider::new(Duration::from_secs(5))),
        Arc::new(NoConfirmation),
    )
    .with_timeout(Duration::from_secs(10))
}

fn authority(server: &MockServer) -> String {
    format!("{}/tenantA", server.base_url())
}

async fn mock_device_code(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path(DEVICE_CODE_PATH);
            then.status(200).json_body(json!({
                "device_code": "device-code-1",
                "user_code": "ABC-123",
                "verification_uri": "https://microsoft.com/devicelogin",
                "expires_in": 900,
                "interval": 1,
                "message": "To sign in, enter the code ABC-123"
            }));
        })
        .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn device_code_flow_over_http() -> Result<(), Error> {
    init_logging();
    let server = MockServer::start_async().await;
    let device_code = mock_device_code(&server).await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(200).json_body(json!({
                "token_type": "Bearer",
                "access_token": "tok1",
                "expires_in": 3599,
                "refresh_token": "refresh-1",
                "id_token": fake_jwt(&json!({"oid": "user-oid-1"}))
            }));
        })
        .await;

    let acquired = authenticator()
        .acquire_token(&authority(&server), VAULT, CLIENT_ID)
        .await?;

    assert_eq!(acquired.token.value().secret(), "tok1");
    assert_eq!(acquired.token.audience(), VAULT);
    assert_eq!(acquired.user_object_id.as_deref(), Some("user-oid-1"));
    assert_eq!(
        acquired.refresh_token.as_ref().map(Secret::secret),
        Some("refresh-1")
    );
    assert_eq!(device_code.hits_async().await, 1);
    assert_eq!(token.hits_async().await, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_token_error() {
    let server = MockServer::start_async().await;
    mock_device_code(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(400).json_body(json!({
                "error": "expired_token",
                "error_description": "AADSTS70019: Verification code expired."
            }));
        })
        .await;

    let result = authenticator()
        .acquire_token(&authority(&server), VAULT, CLIENT_ID)
        .await;

    assert!(matches!(result, Err(Error::DeviceCodeExpired)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn declined_sign_in() {
    let server = MockServer::start_async().await;
    mock_device_code(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(400).json_body(json!({
                "error": "authorization_declined",
                "error_description": "AADSTS70000: The user declined."
            }));
        })
        .await;

    let result = authenticator()
        .acquire_token(&authority(&server), VAULT, CLIENT_ID)
        .await;

    assert!(matches!(result, Err(Error::AccessDenied(msg)) if msg.starts_with("authorization_declined")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn device_code_request_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(DEVICE_CODE_PATH);
            then.status(400).json_body(json!({
                "error": "invalid_client",
                "error_description": "AADSTS700016: Application not found."
            }));
        })
        .await;

    let result = authenticator()
        .acquire_token(&authority(&server), VAULT, CLIENT_ID)
        .await;

    assert!(matches!(result, Err(Error::Provider(msg)) if msg.starts_with("invalid_client")));
}

#[tokio::test]
async fn unreachable_provider_is_network_failure() {
    // nothing listens on port 1
    let result = authenticator()
        .acquire_token("http://127.0.0.1:1/tenantA", VAULT, CLIENT_ID)
        .await;

    assert!(matches!(result, Err(Error::NetworkFailure(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_token_redemption() -> Result<(), Error> {
    let server = MockServer::start_async().await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(200).json_body(json!({
                "access_token": "tok2",
                "expires_in": "3600",
                "refresh_token": "refresh-2"
            }));
        })
        .await;

    let acquired = authenticator()
        .redeem_refresh_token(
            &authority(&server),
            VAULT,
            CLIENT_ID,
            &Secret::new("refresh-1"),
        )
        .await?;

    assert_eq!(acquired.token.value().secret(), "tok2");
    assert!(acquired.user_object_id.is_none());
    assert_eq!(token.hits_async().await, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_provider_times_out_request() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(DEVICE_CODE_PATH);
            then.status(200)
                .delay(Duration::from_secs(2))
                .json_body(json!({
                    "device_code": "device-code-1",
                    "user_code": "ABC-123",
                    "verification_uri": "https://microsoft.com/devicelogin"
                }));
        })
        .await;

    let result = DeviceCodeAuthenticator::new(
        Arc::new(HttpIdentityProvider::new(Duration::from_millis(100))),
        Arc::new(NoConfirmation),
    )
    .with_timeout(Duration::from_secs(10))
    .acquire_token(&authority(&server), VAULT, CLIENT_ID)
    .await;

    assert!(matches!(result, Err(Error::AuthTimeout)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn garbled_poll_error_is_provider_error() {
    let server = MockServer::start_async().await;
    mock_device_code(&server).await;
    let token = server
        .mock_async(|when, then| {
            when.method(POST).path(TOKEN_PATH);
            then.status(502).body("<html>bad gateway</html>");
        })
        .await;

    let result = authenticator()
        .acquire_token(&authority(&server), VAULT, CLIENT_ID)
        .await;

    assert!(matches!(result, Err(Error::Provider(msg)) if msg.starts_with("unexpected response")));
    assert_eq!(token.hits_async().await, 1);
}
