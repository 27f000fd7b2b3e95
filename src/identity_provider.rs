use crate::{error::Result, session::AuthenticationSession};
use azure_core::credentials::Secret;
use std::fmt::Debug;

/// Device code issued by the identity provider.
#[derive(Debug, Clone)]
pub struct DeviceCodeGrant {
    pub device_code: Secret,
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds until the device code stops being redeemable.
    pub expires_in: u64,
    /// Seconds the provider asks callers to wait between polls.
    pub interval: u64,
    /// Human-readable sign-in instructions.
    pub message: String,
}

impl DeviceCodeGrant {
    /// Instructions used when the provider does not send its own.
    #[must_use]
    pub fn default_message(user_code: &str, verification_uri: &str) -> String {
        format!("To sign in, use a web browser to open the page {verification_uri} and enter the code {user_code} to authenticate.")
    }
}

/// Successful response of the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub access_token: Secret,
    pub expires_in: u64,
    pub refresh_token: Option<Secret>,
    pub id_token: Option<String>,
}

/// Result of one poll of the token endpoint with a device code.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The user has not finished signing in yet.
    Pending,
    /// Polling too fast, the interval has to grow.
    SlowDown,
    Expired,
    Declined(String),
    Issued(TokenResponse),
}

/// Source of connections to an identity provider.
///
/// [`DeviceCodeAuthenticator`](crate::DeviceCodeAuthenticator) opens one
/// connection per acquisition and drops it before returning, whatever the
/// outcome, so nothing a connection holds outlives the call.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait IdentityProvider: Send + Sync + Debug {
    async fn connect(&self) -> Result<Box<dyn IdentityConnection>>;
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait IdentityConnection: Send + Sync {
    async fn request_device_code(&self, session: &AuthenticationSession)
    -> Result<DeviceCodeGrant>;

    async fn poll_token(
        &self,
        session: &AuthenticationSession,
        grant: &DeviceCodeGrant,
    ) -> Result<PollOutcome>;

    async fn redeem_refresh_token(
        &self,
        session: &AuthenticationSession,
        refresh_token: &Secret,
    ) -> Result<TokenResponse>;
}
