use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

#[derive(Deserialize)]
struct IdentityClaims {
    oid: Option<String>,
    sub: Option<String>,
}

/// Read the user's unique id from an unverified JWT: the `oid` (object id)
/// claim, or `sub` when the token carries no `oid`.
///
/// The token came straight from the identity provider over TLS, so the
/// signature is not checked here.
pub(crate) fn object_id(jwt: &str) -> Option<String> {
    let payload = jwt.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims = serde_json::from_slice::<IdentityClaims>(&decoded).ok()?;
    claims
        .oid
        .filter(|oid| !oid.is_empty())
        .or_else(|| claims.sub.filter(|sub| !sub.is_empty()))
}

#[cfg(test)]
pub(crate) fn fake_jwt(claims: &serde_json::Value) -> String {
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_oid() {
        let jwt = fake_jwt(&json!({"oid": "11111111-2222", "name": "someone"}));
        assert_eq!(object_id(&jwt).as_deref(), Some("11111111-2222"));
    }

    #[test]
    fn falls_back_to_sub() {
        let jwt = fake_jwt(&json!({"sub": "subject-1"}));
        assert_eq!(object_id(&jwt).as_deref(), Some("subject-1"));
        let jwt = fake_jwt(&json!({"oid": "", "sub": "subject-1"}));
        assert_eq!(object_id(&jwt).as_deref(), Some("subject-1"));
        let jwt = fake_jwt(&json!({"oid": "object-1", "sub": "subject-1"}));
        assert_eq!(object_id(&jwt).as_deref(), Some("object-1"));
    }

    #[test]
    fn missing_or_garbage() {
        assert_eq!(object_id(&fake_jwt(&json!({"name": "x"}))), None);
        assert_eq!(object_id("opaque-token"), None);
        assert_eq!(object_id("a.!!!.c"), None);
    }
}
