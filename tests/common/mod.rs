// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use azure_core::credentials::Secret;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use device_code_credentials::{
    AuthenticationSession, Error, Result,
    identity_provider::{
        DeviceCodeGrant, IdentityConnection, IdentityProvider, PollOutcome, TokenResponse,
    },
    operator::OperatorPrompt,
};
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tracing_subscriber::EnvFilter;

pub const AUTHORITY: &str = "https://login.example/tenantA";
pub const VAULT: &str = "https://vault.example";
pub const MANAGEMENT: &str = "https://management.example";
pub const CLIENT_ID: &str = "test-client";
pub const USER_CODE: &str = "ABC-123";

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Unsigned JWT carrying `claims`, good enough for claim extraction.
pub fn fake_jwt(claims: &serde_json::Value) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

pub fn issued(value: &str, expires_in: u64) -> TokenResponse {
    TokenResponse {
        access_token: Secret::new(value.to_owned()),
        expires_in,
        refresh_token: Some(Secret::new(format!("refresh-{value}"))),
        id_token: Some(fake_jwt(&serde_json::json!({"oid": "user-oid-1"}))),
    }
}

/// Scripted identity provider. Poll answers are served in order; once the
/// script runs out every poll answers `Pending`.
#[derive(Debug, Default)]
pub struct StubState {
    pub connects: AtomicUsize,
    pub live_connections: AtomicUsize,
    pub device_code_requests: AtomicUsize,
    pub polls: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub device_code_lifetime: AtomicU64,
    pub poll_delay_ms: AtomicU64,
    pub hang_on_poll: AtomicBool,
    pub reject_refresh: AtomicBool,
    pub poll_script: Mutex<VecDeque<PollOutcome>>,
    pub refresh_value: Mutex<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct StubProvider {
    pub state: Arc<StubState>,
}

impl StubProvider {
    pub fn new(script: Vec<PollOutcome>) -> Self {
        let state = StubState {
            device_code_lifetime: AtomicU64::new(900),
            poll_script: Mutex::new(script.into()),
            ..StubState::default()
        };
        Self {
            state: Arc::new(state),
        }
    }

    pub fn issuing(value: &str, expires_in: u64) -> Self {
        Self::new(vec![PollOutcome::Issued(issued(value, expires_in))])
    }

    pub fn push(&self, outcome: PollOutcome) {
        if let Ok(mut script) = self.state.poll_script.lock() {
            script.push_back(outcome);
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn connect(&self) -> Result<Box<dyn IdentityConnection>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.live_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct StubConnection {
    state: Arc<StubState>,
}

impl Drop for StubConnection {
    fn drop(&mut self) {
        self.state.live_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityConnection for StubConnection {
    async fn request_device_code(
        &self,
        _session: &AuthenticationSession,
    ) -> Result<DeviceCodeGrant> {
        self.state.device_code_requests.fetch_add(1, Ordering::SeqCst);
        let verification_uri = "https://login.example/device".to_owned();
        Ok(DeviceCodeGrant {
            device_code: Secret::new("device-code-1"),
            user_code: USER_CODE.to_owned(),
            message: DeviceCodeGrant::default_message(USER_CODE, &verification_uri),
            verification_uri,
            expires_in: self.state.device_code_lifetime.load(Ordering::SeqCst),
            interval: 0,
        })
    }

    async fn poll_token(
        &self,
        _session: &AuthenticationSession,
        _grant: &DeviceCodeGrant,
    ) -> Result<PollOutcome> {
        self.state.polls.fetch_add(1, Ordering::SeqCst);
        if self.state.hang_on_poll.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        let delay = self.state.poll_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let next = self
            .state
            .poll_script
            .lock()
            .map_err(|_| Error::Provider("poisoned script".to_owned()))?
            .pop_front();
        Ok(next.unwrap_or(PollOutcome::Pending))
    }

    async fn redeem_refresh_token(
        &self,
        _session: &AuthenticationSession,
        refresh_token: &Secret,
    ) -> Result<TokenResponse> {
        self.state.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.state.reject_refresh.load(Ordering::SeqCst) {
            return Err(Error::Provider("invalid_grant".to_owned()));
        }
        let value = self
            .state
            .refresh_value
            .lock()
            .map_err(|_| Error::Provider("poisoned refresh value".to_owned()))?
            .clone()
            .unwrap_or_else(|| format!("from-{}", refresh_token.secret()));
        Ok(issued(&value, 3600))
    }
}

/// Counts confirmations, optionally failing them.
#[derive(Debug, Default)]
pub struct CountingPrompt {
    pub confirmations: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl OperatorPrompt for CountingPrompt {
    async fn confirm(&self, grant: &DeviceCodeGrant) -> Result<()> {
        assert_eq!(grant.user_code, USER_CODE);
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Interrupted("console input closed".to_owned()));
        }
        Ok(())
    }
}
