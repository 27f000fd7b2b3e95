use azure_core::error::ErrorKind;

/// Failures raised while acquiring a bearer token.
///
/// None of these are retried inside the crate. A failed acquisition leaves the
/// cache untouched and the next request starts the interactive flow over.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The identity-provider URL could not be parsed or is not usable as an
    /// authority.
    #[error("invalid authority {authority:?}: {reason}")]
    InvalidAuthority { authority: String, reason: String },

    /// A required input (audience, client id, scopes) was empty or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The identity provider did not answer within the allotted wait.
    #[error("timed out waiting for the identity provider")]
    AuthTimeout,

    /// The operator did not finish signing in before the device code expired.
    #[error("device code expired before sign-in completed")]
    DeviceCodeExpired,

    /// The flow was cancelled, or the operator console went away.
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// Transport-level failure talking to the identity provider.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The user declined the sign-in request.
    #[error("sign-in declined: {0}")]
    AccessDenied(String),

    /// The identity provider answered with something this crate does not
    /// understand.
    #[error("identity provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::AuthTimeout
        } else if err.is_decode() {
            Self::Provider(err.to_string())
        } else {
            Self::NetworkFailure(err.to_string())
        }
    }
}

impl From<Error> for azure_core::Error {
    fn from(err: Error) -> Self {
        Self::with_message(ErrorKind::Credential, err.to_string())
    }
}
