use crate::{
    cache::TokenCache,
    config::DeviceCodeConfig,
    device_code::DeviceCodeAuthenticator,
    error::{Error, Result},
    session::scope_to_audience,
    token::{AcquiredToken, BearerToken},
};
use async_lock::Mutex;
use azure_core::credentials::{AccessToken, Secret, TokenCredential, TokenRequestOptions};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, warn};

/// Supplies a current token for an audience on demand.
///
/// This is the only contract downstream clients depend on; how the token was
/// obtained stays behind it.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait CredentialSupplier: Send + Sync {
    async fn supply_token(&self, audience: &str) -> Result<Arc<BearerToken>>;
}

/// Enables authentication to Azure clients using a Device Code workflow.
///
/// Tokens are cached per audience. When a cached token expires and the
/// identity provider handed out a refresh token for that audience, it is
/// redeemed silently before falling back to a new interactive sign-in.
#[derive(Debug)]
pub struct DeviceCodeCredential {
    authority: String,
    client_id: String,
    cache: TokenCache,
    authenticator: DeviceCodeAuthenticator,
    refresh_tokens: Mutex<BTreeMap<String, Secret>>,
    user_object_id: Mutex<Option<String>>,
}

impl DeviceCodeCredential {
    /// Create a new `DeviceCodeCredential` that prompts on the console and
    /// talks to the configured authority over HTTPS.
    pub fn new(config: &DeviceCodeConfig) -> Result<Arc<Self>> {
        let authenticator = DeviceCodeAuthenticator::default().with_timeout(config.timeout());
        Self::with_authenticator(config, authenticator)
    }

    pub fn with_authenticator(
        config: &DeviceCodeConfig,
        authenticator: DeviceCodeAuthenticator,
    ) -> Result<Arc<Self>> {
        let authority = config.authority()?;
        if config.client_id.trim().is_empty() {
            return Err(Error::InvalidArgument("client id must not be empty".to_owned()));
        }
        Ok(Arc::new(Self {
            authority: authority.to_string(),
            client_id: config.client_id.clone(),
            cache: TokenCache::new().with_expiry_margin(config.expiry_margin()),
            authenticator,
            refresh_tokens: Mutex::new(BTreeMap::new()),
            user_object_id: Mutex::new(None),
        }))
    }

    /// Object id of the user who signed in most recently, for granting them
    /// access policies on the resources being provisioned.
    pub async fn user_object_id(&self) -> Option<String> {
        self.user_object_id.lock().await.clone()
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    async fn get_access_token(&self, audience: &str) -> Result<BearerToken> {
        let refresh_token = self.refresh_tokens.lock().await.remove(audience);
        if let Some(refresh_token) = refresh_token {
            match self
                .authenticator
                .redeem_refresh_token(&self.authority, audience, &self.client_id, &refresh_token)
                .await
            {
                Ok(acquired) => return Ok(self.record(audience, acquired).await),
                Err(err) => {
                    warn!(audience, error = %err, "refresh token rejected, starting device code flow");
                }
            }
        }

        let acquired = self
            .authenticator
            .acquire_token(&self.authority, audience, &self.client_id)
            .await?;
        Ok(self.record(audience, acquired).await)
    }

    async fn record(&self, audience: &str, acquired: AcquiredToken) -> BearerToken {
        if let Some(oid) = acquired.user_object_id {
            debug!(audience, user_object_id = %oid, "signed in");
            *self.user_object_id.lock().await = Some(oid);
        }
        if let Some(refresh_token) = acquired.refresh_token {
            self.refresh_tokens
                .lock()
                .await
                .insert(audience.to_owned(), refresh_token);
        }
        acquired.token
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl CredentialSupplier for DeviceCodeCredential {
    async fn supply_token(&self, audience: &str) -> Result<Arc<BearerToken>> {
        self.cache
            .get_token(audience, |a| self.get_access_token(a))
            .await
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl TokenCredential for DeviceCodeCredential {
    async fn get_token(
        &self,
        scopes: &[&str],
        _options: Option<TokenRequestOptions<'_>>,
    ) -> azure_core::Result<AccessToken> {
        let audience = scopes
            .first()
            .copied()
            .map(scope_to_audience)
            .ok_or_else(|| Error::InvalidArgument("no scopes requested".to_owned()))?;
        let token = self.supply_token(audience).await?;
        Ok(AccessToken {
            token: token.value().clone(),
            expires_on: token.expires_on(),
        })
    }
}
