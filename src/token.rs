use azure_core::credentials::Secret;
use std::time::Duration;
use time::OffsetDateTime;

/// An access token scoped to one audience.
///
/// Tokens are never mutated after they are issued. Refreshing produces a new
/// `BearerToken` which replaces the old one in the cache.
#[derive(Debug, Clone)]
pub struct BearerToken {
    value: Secret,
    expires_on: OffsetDateTime,
    audience: String,
}

impl BearerToken {
    #[must_use]
    pub fn new<V, A>(value: V, expires_on: OffsetDateTime, audience: A) -> Self
    where
        V: Into<String>,
        A: Into<String>,
    {
        Self {
            value: Secret::new(value.into()),
            expires_on,
            audience: audience.into(),
        }
    }

    /// Build a token from an `expires_in` seconds value as returned by the
    /// token endpoint.
    #[must_use]
    pub fn expiring_in<V, A>(value: V, expires_in: u64, audience: A) -> Self
    where
        V: Into<String>,
        A: Into<String>,
    {
        Self::new(value, convert_expires_in(expires_in), audience)
    }

    #[must_use]
    pub fn value(&self) -> &Secret {
        &self.value
    }

    #[must_use]
    pub fn expires_on(&self) -> OffsetDateTime {
        self.expires_on
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Returns true when the token expires within `margin` from now.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        let margin = time::Duration::try_from(margin).unwrap_or(time::Duration::MAX);
        OffsetDateTime::now_utc().saturating_add(margin) >= self.expires_on
    }
}

/// Everything a single acquisition yields.
#[derive(Debug, Clone)]
pub struct AcquiredToken {
    pub token: BearerToken,
    /// Unique object id of the user who completed the sign-in, used for
    /// downstream access-policy grants.
    pub user_object_id: Option<String>,
    pub refresh_token: Option<Secret>,
}

impl AcquiredToken {
    #[must_use]
    pub fn new(token: BearerToken) -> Self {
        Self {
            token,
            user_object_id: None,
            refresh_token: None,
        }
    }
}

/// Lifetimes past the representable range saturate instead of overflowing.
pub(crate) fn convert_expires_in(seconds: u64) -> OffsetDateTime {
    let lifetime = time::Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX));
    OffsetDateTime::now_utc().saturating_add(lifetime)
}
