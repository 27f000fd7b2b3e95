use crate::error::{Error, Result};
use url::{Host, Url};

const DEFAULT_SUFFIX: &str = "/.default";
const IDENTITY_SCOPES: &str = "openid profile offline_access";

/// Inputs of a single device-code acquisition.
///
/// Built fresh for every attempt and dropped once a token or a terminal
/// failure is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationSession {
    authority: Url,
    client_id: String,
    audience: String,
}

impl AuthenticationSession {
    pub fn new(authority: &str, audience: &str, client_id: &str) -> Result<Self> {
        let authority = parse_authority(authority)?;
        if audience.trim().is_empty() {
            return Err(Error::InvalidArgument("audience must not be empty".to_owned()));
        }
        if client_id.trim().is_empty() {
            return Err(Error::InvalidArgument("client id must not be empty".to_owned()));
        }
        Ok(Self {
            authority,
            client_id: client_id.to_owned(),
            audience: audience.to_owned(),
        })
    }

    #[must_use]
    pub fn authority(&self) -> &Url {
        &self.authority
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn device_code_endpoint(&self) -> Url {
        self.endpoint("devicecode")
    }

    #[must_use]
    pub fn token_endpoint(&self) -> Url {
        self.endpoint("token")
    }

    /// Space separated scope string sent to the identity provider.
    #[must_use]
    pub fn scope(&self) -> String {
        let resource = if self.audience.ends_with(DEFAULT_SUFFIX) {
            self.audience.clone()
        } else {
            format!("{}{DEFAULT_SUFFIX}", self.audience)
        };
        format!("{resource} {IDENTITY_SCOPES}")
    }

    fn endpoint(&self, name: &str) -> Url {
        let mut url = self.authority.clone();
        // parse_authority rejected cannot-be-a-base URLs
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["oauth2", "v2.0", name]);
        }
        url
    }
}

fn parse_authority(authority: &str) -> Result<Url> {
    let invalid = |reason: &str| Error::InvalidAuthority {
        authority: authority.to_owned(),
        reason: reason.to_owned(),
    };
    let url = Url::parse(authority).map_err(|e| invalid(&e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("URL cannot be a base"));
    }
    match url.scheme() {
        "https" => {}
        "http" if is_loopback(&url) => {}
        _ => return Err(invalid("authority must use https")),
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("authority must not carry a query or fragment"));
    }
    if url.path_segments().is_none_or(|mut s| s.all(str::is_empty)) {
        return Err(invalid("authority must name a tenant"));
    }
    Ok(url)
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Map a token-request scope such as `https://vault.azure.net/.default` to the
/// audience it names.
#[must_use]
pub fn scope_to_audience(scope: &str) -> &str {
    scope.strip_suffix(DEFAULT_SUFFIX).unwrap_or(scope)
}
