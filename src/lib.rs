//! # Device Code Credentials
//!
//! `device-code-credentials` obtains bearer tokens for Azure management,
//! key vault and storage clients through the interactive OAuth2 device-code
//! grant, and caches them per audience for the lifetime of a session.
//!
//! ## Modules
//!
//! - `cache`: Per-audience token cache. Concurrent requests for the same
//!   audience share a single acquisition.
//! - `config`: Tenant, client id and timeouts, read from the environment or
//!   deserialized.
//! - `credential`: [`DeviceCodeCredential`], the credential supplier handed to
//!   SDK clients. Implements [`CredentialSupplier`] and
//!   `azure_core`'s `TokenCredential`.
//! - `device_code`: [`DeviceCodeAuthenticator`], which runs the device-code
//!   flow itself.
//! - `http`: HTTP implementation of the identity-provider endpoints.
//! - `identity_provider`: The seam between the flow and the identity provider.
//! - `operator`: How the operator is shown the code and asked to continue.
//!
//! ```no_run
//! use device_code_credentials::{CredentialSupplier, DeviceCodeConfig, DeviceCodeCredential};
//!
//! # async fn run() -> device_code_credentials::Result<()> {
//! let config = DeviceCodeConfig::from_env()?;
//! let credential = DeviceCodeCredential::new(&config)?;
//! let token = credential.supply_token("https://vault.azure.net").await?;
//! println!("vault token expires on {}", token.expires_on());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(
    clippy::indexing_slicing,
    clippy::manual_assert,
    clippy::panic,
    clippy::expect_used,
    clippy::unwrap_used
)]

pub mod cache;
mod claims;
pub mod config;
pub mod credential;
pub mod device_code;
mod error;
pub mod http;
pub mod identity_provider;
pub mod operator;
mod session;
mod token;

pub use crate::{
    cache::TokenCache,
    config::DeviceCodeConfig,
    credential::{CredentialSupplier, DeviceCodeCredential},
    device_code::DeviceCodeAuthenticator,
    error::{Error, Result},
    session::{AuthenticationSession, scope_to_audience},
    token::{AcquiredToken, BearerToken},
};
