use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::claims::ClaimSet;
use crate::error::Error;

/// Protocol claims that describe the token rather than the user; excluded
/// from the identity claim set.
pub const PROTOCOL_CLAIMS: &[&str] = &[
    "iss", "aud", "exp", "iat", "nbf", "nonce", "azp", "at_hash", "c_hash", "jti", "sid",
    "auth_time", "amr", "acr",
];

/// Validates an ID token received from the token endpoint and returns its
/// payload claims.
///
/// Checks `iss` against the discovered issuer, `aud` against the client id,
/// `exp` against `now`, and `nonce` against the value parked at login.
/// The signature is not verified: in the authorization-code flow the token
/// arrives on the direct TLS channel from the token endpoint, which OIDC
/// Core 3.1.3.7 accepts in place of a signature check.
///
/// # Errors
///
/// Returns [`Error::IdToken`] if the token is malformed, expired, or any
/// of the `iss`/`aud`/`nonce` claims do not match the expected values.
pub fn validate(
    token_str: &str,
    expected_issuer: &str,
    expected_audience: &str,
    expected_nonce: Option<&str>,
    now: OffsetDateTime,
) -> Result<serde_json::Map<String, JsonValue>, Error> {
    let payload = decode_payload(token_str)?;

    let actual_issuer = payload
        .get("iss")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::IdToken("missing claim: iss".into()))?;
    if actual_issuer != expected_issuer {
        return Err(Error::IdToken(format!(
            "iss: expected '{expected_issuer}', got '{actual_issuer}'"
        )));
    }

    let audience_matches = match payload.get("aud") {
        Some(JsonValue::String(aud)) => aud == expected_audience,
        Some(JsonValue::Array(auds)) => auds
            .iter()
            .any(|a| a.as_str() == Some(expected_audience)),
        _ => false,
    };
    if !audience_matches {
        return Err(Error::IdToken(format!(
            "aud does not include '{expected_audience}'"
        )));
    }

    let exp = payload
        .get("exp")
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| Error::IdToken("missing claim: exp".into()))?;
    if exp <= now.unix_timestamp() {
        return Err(Error::IdToken("token expired".into()));
    }

    if let Some(expected) = expected_nonce {
        let actual = payload
            .get("nonce")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::IdToken("missing claim: nonce".into()))?;
        if actual != expected {
            return Err(Error::IdToken("nonce mismatch".into()));
        }
    }

    Ok(payload)
}

/// Builds the identity claim set from a validated payload, in document
/// order, with protocol claims stripped.
#[must_use]
pub fn identity_claims(payload: &serde_json::Map<String, JsonValue>) -> ClaimSet {
    ClaimSet::from_json_object(payload, PROTOCOL_CLAIMS)
}

/// Decodes the payload segment of a compact JWT without verifying the
/// signature.
fn decode_payload(token_str: &str) -> Result<serde_json::Map<String, JsonValue>, Error> {
    let parts: Vec<&str> = token_str.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::IdToken("invalid token format".into()));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| Error::IdToken("invalid payload encoding".into()))?;

    let payload: JsonValue = serde_json::from_slice(&payload_bytes)
        .map_err(|_| Error::IdToken("invalid payload".into()))?;

    match payload {
        JsonValue::Object(map) => Ok(map),
        _ => Err(Error::IdToken("payload is not an object".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(payload: JsonValue) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
        format!("{header}.{body}.sig")
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn valid_payload() -> JsonValue {
        json!({
            "iss": "https://id.example",
            "aud": "demo-client",
            "exp": now().unix_timestamp() + 600,
            "nonce": "n-1",
            "sub": "user-1",
            "role": "admin",
            "name": "alice",
        })
    }

    #[test]
    fn accepts_valid_token() {
        let payload = validate(
            &token(valid_payload()),
            "https://id.example",
            "demo-client",
            Some("n-1"),
            now(),
        )
        .unwrap();
        assert_eq!(payload.get("sub").unwrap(), "user-1");
    }

    #[test]
    fn accepts_audience_array() {
        let mut payload = valid_payload();
        payload["aud"] = json!(["other", "demo-client"]);
        assert!(validate(
            &token(payload),
            "https://id.example",
            "demo-client",
            Some("n-1"),
            now(),
        )
        .is_ok());
    }

    #[test]
    fn rejects_wrong_issuer() {
        let err = validate(
            &token(valid_payload()),
            "https://other.example",
            "demo-client",
            Some("n-1"),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::IdToken(_)));
    }

    #[test]
    fn rejects_wrong_audience() {
        assert!(validate(
            &token(valid_payload()),
            "https://id.example",
            "other-client",
            Some("n-1"),
            now(),
        )
        .is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let mut payload = valid_payload();
        payload["exp"] = json!(now().unix_timestamp() - 1);
        assert!(validate(
            &token(payload),
            "https://id.example",
            "demo-client",
            Some("n-1"),
            now(),
        )
        .is_err());
    }

    #[test]
    fn rejects_nonce_mismatch() {
        assert!(validate(
            &token(valid_payload()),
            "https://id.example",
            "demo-client",
            Some("n-2"),
            now(),
        )
        .is_err());
    }

    #[test]
    fn rejects_malformed_token() {
        assert!(validate("not-a-jwt", "i", "a", None, now()).is_err());
        assert!(validate("a.b", "i", "a", None, now()).is_err());
        assert!(validate("a.!!!.c", "i", "a", None, now()).is_err());
    }

    #[test]
    fn identity_claims_strip_protocol_claims_in_order() {
        let payload = validate(
            &token(valid_payload()),
            "https://id.example",
            "demo-client",
            Some("n-1"),
            now(),
        )
        .unwrap();
        let claims = identity_claims(&payload);
        let types: Vec<_> = claims.iter().map(|c| c.claim_type.as_str()).collect();
        assert_eq!(types, vec!["sub", "role", "name"]);
    }
}
