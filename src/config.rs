use crate::error::{Error, Result};
use serde::Deserialize;
use std::{env, time::Duration};
use url::Url;

/// Public client id of the Azure CLI, registered in every tenant.
pub const AZURE_CLI_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_EXPIRY_MARGIN_SECS: u64 = 300;

const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
const ENV_TIMEOUT: &str = "AZURE_DEVICE_CODE_TIMEOUT";

/// Settings for [`DeviceCodeCredential`](crate::DeviceCodeCredential).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeviceCodeConfig {
    pub tenant_id: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    /// Hard ceiling for one interactive acquisition, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Cached tokens this close to expiry are treated as absent, in seconds.
    #[serde(default = "default_expiry_margin")]
    pub expiry_margin: u64,
}

fn default_client_id() -> String {
    AZURE_CLI_CLIENT_ID.to_owned()
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_owned()
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_expiry_margin() -> u64 {
    DEFAULT_EXPIRY_MARGIN_SECS
}

impl DeviceCodeConfig {
    #[must_use]
    pub fn new<T>(tenant_id: T) -> Self
    where
        T: Into<String>,
    {
        Self {
            tenant_id: tenant_id.into(),
            client_id: default_client_id(),
            authority_host: default_authority_host(),
            timeout: DEFAULT_TIMEOUT_SECS,
            expiry_margin: DEFAULT_EXPIRY_MARGIN_SECS,
        }
    }

    #[must_use]
    pub fn with_client_id<C>(mut self, client_id: C) -> Self
    where
        C: Into<String>,
    {
        self.client_id = client_id.into();
        self
    }

    #[must_use]
    pub fn with_authority_host<H>(mut self, authority_host: H) -> Self
    where
        H: Into<String>,
    {
        self.authority_host = authority_host.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.as_secs();
        self
    }

    #[must_use]
    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin.as_secs();
        self
    }

    /// Read the configuration from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`,
    /// `AZURE_AUTHORITY_HOST` and `AZURE_DEVICE_CODE_TIMEOUT`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tenant_id = lookup(ENV_TENANT_ID)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidArgument(format!("{ENV_TENANT_ID} is not set")))?;
        let mut config = Self::new(tenant_id);
        if let Some(client_id) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            config.client_id = client_id;
        }
        if let Some(host) = lookup(ENV_AUTHORITY_HOST).filter(|v| !v.is_empty()) {
            config.authority_host = host;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT) {
            config.timeout = timeout.trim().parse().map_err(|_| {
                Error::InvalidArgument(format!("{ENV_TIMEOUT} is not a number of seconds"))
            })?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    #[must_use]
    pub fn expiry_margin(&self) -> Duration {
        Duration::from_secs(self.expiry_margin)
    }

    /// Authority URL for the configured tenant, e.g.
    /// `https://login.microsoftonline.com/<tenant>`.
    pub fn authority(&self) -> Result<Url> {
        let invalid = |reason: String| Error::InvalidAuthority {
            authority: self.authority_host.clone(),
            reason,
        };
        if self.tenant_id.is_empty() || self.tenant_id.contains('/') {
            return Err(invalid(format!("invalid tenant id {:?}", self.tenant_id)));
        }
        let mut host = Url::parse(&self.authority_host).map_err(|e| invalid(e.to_string()))?;
        host.path_segments_mut()
            .map_err(|()| invalid("URL cannot be a base".to_owned()))?
            .pop_if_empty()
            .push(&self.tenant_id);
        Ok(host)
    }
}
