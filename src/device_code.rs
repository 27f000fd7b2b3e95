use crate::{
    claims,
    error::{Error, Result},
    http::HttpIdentityProvider,
    identity_provider::{
        DeviceCodeGrant, IdentityConnection, IdentityProvider, PollOutcome, TokenResponse,
    },
    operator::{ConsolePrompt, OperatorPrompt},
    session::AuthenticationSession,
    token::{AcquiredToken, BearerToken},
};
use azure_core::credentials::Secret;
use futures::future::{Either, select};
use std::{pin::pin, sync::Arc, time::Duration};
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ceiling for one acquisition when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);
const MIN_POLL_INTERVAL_SECS: u64 = 1;
const MAX_POLL_INTERVAL_SECS: u64 = 60;
/// Device codes are never honoured for longer than a day.
const MAX_DEVICE_CODE_LIFETIME_SECS: u64 = 86_400;

/// Runs the OAuth2 device-code grant for one audience at a time.
///
/// The authenticator keeps no state between calls. Each call opens its own
/// identity-provider connection and releases it before returning.
#[derive(Debug, Clone)]
pub struct DeviceCodeAuthenticator {
    provider: Arc<dyn IdentityProvider>,
    prompt: Arc<dyn OperatorPrompt>,
    timeout: Duration,
    cancellation: CancellationToken,
}

impl Default for DeviceCodeAuthenticator {
    fn default() -> Self {
        Self::new(
            Arc::new(HttpIdentityProvider::default()),
            Arc::new(ConsolePrompt::default()),
        )
    }
}

impl DeviceCodeAuthenticator {
    pub fn new(provider: Arc<dyn IdentityProvider>, prompt: Arc<dyn OperatorPrompt>) -> Self {
        Self {
            provider,
            prompt,
            timeout: DEFAULT_TIMEOUT,
            cancellation: CancellationToken::new(),
        }
    }

    /// Hard ceiling for a whole acquisition, operator wait included.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort in-flight acquisitions with [`Error::Interrupted`] once `token`
    /// is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Obtain a token for `audience` from `authority`, walking the operator
    /// through the device-code sign-in.
    pub async fn acquire_token(
        &self,
        authority: &str,
        audience: &str,
        client_id: &str,
    ) -> Result<AcquiredToken> {
        let session = AuthenticationSession::new(authority, audience, client_id)?;
        self.bounded(self.device_code_flow(&session)).await
    }

    /// Exchange a refresh token for a new access token without involving the
    /// operator.
    pub async fn redeem_refresh_token(
        &self,
        authority: &str,
        audience: &str,
        client_id: &str,
        refresh_token: &Secret,
    ) -> Result<AcquiredToken> {
        let session = AuthenticationSession::new(authority, audience, client_id)?;
        self.bounded(async {
            let connection = self.provider.connect().await?;
            let response = connection
                .redeem_refresh_token(&session, refresh_token)
                .await?;
            debug!(audience = session.audience(), "refresh token redeemed");
            Ok(into_acquired(&session, response))
        })
        .await
    }

    async fn bounded<F>(&self, flow: F) -> Result<AcquiredToken>
    where
        F: Future<Output = Result<AcquiredToken>> + Send,
    {
        let cancelled = pin!(self.cancellation.cancelled());
        let flow = pin!(timeout(self.timeout, flow));
        match select(cancelled, flow).await {
            Either::Left(((), _)) => Err(Error::Interrupted("authentication cancelled".to_owned())),
            Either::Right((Ok(result), _)) => result,
            Either::Right((Err(_), _)) => {
                warn!(timeout = ?self.timeout, "authentication timed out");
                Err(Error::AuthTimeout)
            }
        }
    }

    async fn device_code_flow(&self, session: &AuthenticationSession) -> Result<AcquiredToken> {
        let connection = self.provider.connect().await?;

        let grant = connection.request_device_code(session).await?;
        info!(
            audience = session.audience(),
            user_code = %grant.user_code,
            verification_uri = %grant.verification_uri,
            expires_in = grant.expires_in,
            "device code issued"
        );

        self.prompt.confirm(&grant).await?;

        let response = poll_until_issued(connection.as_ref(), session, &grant).await?;
        let acquired = into_acquired(session, response);
        info!(
            audience = session.audience(),
            expires_on = %acquired.token.expires_on(),
            "token acquired"
        );
        Ok(acquired)
    }
}

async fn poll_until_issued(
    connection: &dyn IdentityConnection,
    session: &AuthenticationSession,
    grant: &DeviceCodeGrant,
) -> Result<TokenResponse> {
    let lifetime = Duration::from_secs(grant.expires_in.min(MAX_DEVICE_CODE_LIFETIME_SECS));
    let deadline = Instant::now() + lifetime;
    let mut interval = Duration::from_secs(
        grant
            .interval
            .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS),
    );
    loop {
        match connection.poll_token(session, grant).await? {
            PollOutcome::Issued(response) => return Ok(response),
            PollOutcome::Pending => {}
            PollOutcome::SlowDown => interval = interval.saturating_add(SLOW_DOWN_STEP),
            PollOutcome::Expired => return Err(Error::DeviceCodeExpired),
            PollOutcome::Declined(reason) => {
                warn!(audience = session.audience(), %reason, "sign-in declined");
                return Err(Error::AccessDenied(reason));
            }
        }
        if Instant::now()
            .checked_add(interval)
            .is_none_or(|next| next >= deadline)
        {
            return Err(Error::DeviceCodeExpired);
        }
        debug!(?interval, "sign-in pending");
        sleep(interval).await;
    }
}

fn into_acquired(session: &AuthenticationSession, response: TokenResponse) -> AcquiredToken {
    let user_object_id = response
        .id_token
        .as_deref()
        .and_then(claims::object_id)
        .or_else(|| claims::object_id(response.access_token.secret()));
    AcquiredToken {
        token: BearerToken::expiring_in(
            response.access_token.secret(),
            response.expires_in,
            session.audience(),
        ),
        user_object_id,
        refresh_token: response.refresh_token,
    }
}
