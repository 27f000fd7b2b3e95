//! Identity-provider connection speaking the OAuth2 device authorization
//! grant (RFC 8628) over HTTPS.

use crate::{
    error::{Error, Result},
    identity_provider::{
        DeviceCodeGrant, IdentityConnection, IdentityProvider, PollOutcome, TokenResponse,
    },
    session::AuthenticationSession,
};
use azure_core::credentials::Secret;
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: u64 = 5;
const DEFAULT_DEVICE_CODE_LIFETIME: u64 = 900;
const DEFAULT_TOKEN_LIFETIME: u64 = 3600;

/// Talks to an Entra ID style `/oauth2/v2.0/{devicecode,token}` pair of
/// endpoints.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    request_timeout: Duration,
}

impl Default for HttpIdentityProvider {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl HttpIdentityProvider {
    /// `request_timeout` bounds every individual HTTP request.
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl IdentityProvider for HttpIdentityProvider {
    async fn connect(&self) -> Result<Box<dyn IdentityConnection>> {
        // a fresh client per acquisition, so its pool dies with the connection
        let client = Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| Error::NetworkFailure(e.to_string()))?;
        Ok(Box::new(HttpConnection { client }))
    }
}

struct HttpConnection {
    client: Client,
}

#[derive(Deserialize)]
struct DeviceCodeBody {
    device_code: String,
    user_code: String,
    #[serde(alias = "verification_url")]
    verification_uri: String,
    #[serde(default, deserialize_with = "seconds")]
    expires_in: Option<u64>,
    #[serde(default, deserialize_with = "seconds")]
    interval: Option<u64>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct TokenBody {
    access_token: String,
    #[serde(default, deserialize_with = "seconds")]
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    error_description: Option<String>,
}

impl ErrorBody {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {description}", self.error),
            None => self.error.clone(),
        }
    }
}

impl From<TokenBody> for TokenResponse {
    fn from(body: TokenBody) -> Self {
        Self {
            access_token: Secret::new(body.access_token),
            expires_in: body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME),
            refresh_token: body.refresh_token.map(Secret::new),
            id_token: body.id_token,
        }
    }
}

/// Some endpoints send numbers, older ones send them as strings.
fn seconds<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

async fn read_body(response: Response) -> Result<(bool, String)> {
    let success = response.status().is_success();
    let body = response.text().await?;
    Ok((success, body))
}

fn parse<T>(body: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_str(body).map_err(|e| Error::Provider(format!("unexpected response: {e}")))
}

fn provider_error(body: &str) -> Error {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => Error::Provider(err.describe()),
        Err(_) => Error::Provider(format!("unexpected response: {body}")),
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl IdentityConnection for HttpConnection {
    async fn request_device_code(
        &self,
        session: &AuthenticationSession,
    ) -> Result<DeviceCodeGrant> {
        let url = session.device_code_endpoint();
        debug!(%url, "requesting device code");
        let scope = session.scope();
        let form = [("client_id", session.client_id()), ("scope", scope.as_str())];
        let response = self.client.post(url).form(&form).send().await?;
        let (success, body) = read_body(response).await?;
        if !success {
            return Err(provider_error(&body));
        }
        let body: DeviceCodeBody = parse(&body)?;
        let message = body.message.unwrap_or_else(|| {
            DeviceCodeGrant::default_message(&body.user_code, &body.verification_uri)
        });
        Ok(DeviceCodeGrant {
            device_code: Secret::new(body.device_code),
            user_code: body.user_code,
            verification_uri: body.verification_uri,
            expires_in: body.expires_in.unwrap_or(DEFAULT_DEVICE_CODE_LIFETIME),
            interval: body.interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            message,
        })
    }

    async fn poll_token(
        &self,
        session: &AuthenticationSession,
        grant: &DeviceCodeGrant,
    ) -> Result<PollOutcome> {
        let url = session.token_endpoint();
        debug!(%url, "polling for device code token");
        let form = [
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ("client_id", session.client_id()),
            ("device_code", grant.device_code.secret()),
        ];
        let response = self.client.post(url).form(&form).send().await?;
        let (success, body) = read_body(response).await?;
        if success {
            return Ok(PollOutcome::Issued(parse::<TokenBody>(&body)?.into()));
        }

        let err: ErrorBody = parse(&body)?;
        Ok(match err.error.as_str() {
            "authorization_pending" => PollOutcome::Pending,
            "slow_down" => PollOutcome::SlowDown,
            "expired_token" | "code_expired" => PollOutcome::Expired,
            "authorization_declined" | "access_denied" | "bad_verification_code" => {
                PollOutcome::Declined(err.describe())
            }
            _ => return Err(Error::Provider(err.describe())),
        })
    }

    async fn redeem_refresh_token(
        &self,
        session: &AuthenticationSession,
        refresh_token: &Secret,
    ) -> Result<TokenResponse> {
        let url = session.token_endpoint();
        debug!(%url, "redeeming refresh token");
        let scope = session.scope();
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", session.client_id()),
            ("scope", scope.as_str()),
            ("refresh_token", refresh_token.secret()),
        ];
        let response = self.client.post(url).form(&form).send().await?;
        let (success, body) = read_body(response).await?;
        if !success {
            return Err(provider_error(&body));
        }
        Ok(parse::<TokenBody>(&body)?.into())
    }
}
