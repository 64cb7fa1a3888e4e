//! Bearer token decoding and validity checks.
//!
//! Tokens are JWTs issued by the booking backend. The client never verifies
//! signatures (that is the backend's job); it only reads the payload to learn
//! the role and expiry so the UI can decide what to show.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of dot-separated segments in a signed token (header.payload.signature)
const TOKEN_SEGMENTS: usize = 3;

/// Role granted to the bearer of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Role {
    Player,
    Club,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Player => "PLAYER",
            Role::Club => "CLUB",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAYER" => Ok(Role::Player),
            "CLUB" => Ok(Role::Club),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

/// Payload as it appears on the wire. Every claim is optional. `role` and
/// `sub` of an unexpected type read as missing; a non-numeric `exp` fails the
/// whole decode so an expiry can never be silently dropped.
#[derive(Debug, Deserialize)]
struct RawClaims {
    role: Option<Value>,
    exp: Option<f64>,
    sub: Option<Value>,
}

/// Claims the client cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub role: Option<Role>,
    /// Expiry as Unix seconds
    pub exp: Option<i64>,
    pub sub: Option<String>,
}

impl Claims {
    /// Whether the claims are still usable at `now_secs` (Unix seconds).
    /// A token without an expiry claim never expires on the client side.
    pub fn is_live_at(&self, now_secs: i64) -> bool {
        match self.exp {
            Some(exp) => exp > now_secs,
            None => true,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// Seconds remaining until expiry (for display), clamped at zero
    pub fn seconds_until_expiry(&self, now_secs: i64) -> Option<i64> {
        self.exp.map(|exp| (exp - now_secs).max(0))
    }
}

impl From<RawClaims> for Claims {
    fn from(raw: RawClaims) -> Self {
        let role = match raw.role {
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        // A fractional expiry is still in the future until its ceiling has passed
        let exp = raw.exp.filter(|e| e.is_finite()).map(|e| e.ceil() as i64);
        let sub = match raw.sub {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self { role, exp, sub }
    }
}

/// Decode a token's payload without verifying its signature.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON object in the middle. Never panics on malformed input.
pub fn decode(token: &str) -> Option<Claims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != TOKEN_SEGMENTS {
        return None;
    }

    let payload = segments[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    // Structs also deserialize from JSON arrays; only an object is a claims set
    let value: Value = serde_json::from_slice(&bytes).ok()?;
    if !value.is_object() {
        return None;
    }
    let raw: RawClaims = serde_json::from_value(value).ok()?;
    Some(raw.into())
}

/// Validity check against an explicit clock
pub fn is_valid_token_at(token: &str, now_secs: i64) -> bool {
    decode(token).is_some_and(|claims| claims.is_live_at(now_secs))
}

/// Validity check against the current time
pub fn is_valid_token(token: &str) -> bool {
    is_valid_token_at(token, Utc::now().timestamp())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Build an unsigned token with the given payload
    pub(crate) fn make_token(payload: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{}.{}.signature", header, body)
    }

    #[test]
    fn test_decode_reads_role_exp_sub() {
        let token = make_token(json!({"role": "CLUB", "exp": 2_000_000_000, "sub": "user-42"}));
        let claims = decode(&token).expect("token should decode");
        assert_eq!(claims.role, Some(Role::Club));
        assert_eq!(claims.exp, Some(2_000_000_000));
        assert_eq!(claims.sub.as_deref(), Some("user-42"));
    }

    #[test]
    fn test_decode_role_case_insensitive() {
        let token = make_token(json!({"role": "admin"}));
        assert_eq!(decode(&token).and_then(|c| c.role), Some(Role::Admin));
    }

    #[test]
    fn test_decode_unknown_role_is_none() {
        let token = make_token(json!({"role": "REFEREE"}));
        let claims = decode(&token).expect("payload is still valid JSON");
        assert_eq!(claims.role, None);
    }

    #[test]
    fn test_decode_numeric_subject() {
        let token = make_token(json!({"sub": 17}));
        assert_eq!(decode(&token).and_then(|c| c.sub).as_deref(), Some("17"));
    }

    #[test]
    fn test_decode_tolerates_padding() {
        let body = base64::engine::general_purpose::URL_SAFE.encode(br#"{"role":"PLAYER"}"#);
        let token = format!("h.{}.s", body);
        assert_eq!(decode(&token).and_then(|c| c.role), Some(Role::Player));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode("").is_none());
        assert!(decode("not-a-jwt").is_none());
        assert!(decode("a.b").is_none());
        assert!(decode("a.b.c.d").is_none());
        assert!(decode("a.!!!.c").is_none()); // not base64
        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert!(decode(&format!("a.{}.c", not_json)).is_none());
        let not_object = URL_SAFE_NO_PAD.encode("[1,2,3]");
        assert!(decode(&format!("a.{}.c", not_object)).is_none());
    }

    #[test]
    fn test_positional_payload_is_rejected() {
        let token = make_token(json!(["ADMIN", null, null]));
        assert!(decode(&token).is_none());
        assert!(!is_valid_token_at(&token, 0));
    }

    #[test]
    fn test_non_numeric_expiry_fails_decode() {
        let token = make_token(json!({"role": "CLUB", "exp": "tomorrow"}));
        assert!(decode(&token).is_none());
        assert!(!is_valid_token(&token));
    }

    #[test]
    fn test_odd_role_and_subject_types_read_as_missing() {
        let token = make_token(json!({"role": 3, "sub": {"id": 1}}));
        let claims = decode(&token).expect("payload is an object");
        assert_eq!(claims.role, None);
        assert_eq!(claims.sub, None);
    }

    #[test]
    fn test_wrong_segment_count_never_valid() {
        let good = make_token(json!({"role": "PLAYER"}));
        assert!(is_valid_token_at(&good, 0));

        let two = good.rsplitn(2, '.').nth(1).unwrap_or_default().to_string();
        assert!(!is_valid_token_at(&two, 0));
        let four = format!("{}.extra", good);
        assert!(!is_valid_token_at(&four, 0));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = 1_700_000_000;
        let token = make_token(json!({"exp": now}));
        assert!(!is_valid_token_at(&token, now)); // exp == now is expired
        assert!(is_valid_token_at(&token, now - 1));
        assert!(!is_valid_token_at(&token, now + 1));
    }

    #[test]
    fn test_fractional_expiry() {
        let token = make_token(json!({"exp": 100.5}));
        assert!(is_valid_token_at(&token, 100));
        assert!(!is_valid_token_at(&token, 101));
    }

    #[test]
    fn test_no_expiry_is_valid() {
        let token = make_token(json!({"role": "CLUB"}));
        assert!(is_valid_token(&token));
        assert!(is_valid_token_at(&token, i64::MAX));
    }

    #[test]
    fn test_is_valid_token_uses_current_time() {
        let future = Utc::now().timestamp() + 3600;
        let past = Utc::now().timestamp() - 3600;
        assert!(is_valid_token(&make_token(json!({"exp": future}))));
        assert!(!is_valid_token(&make_token(json!({"exp": past}))));
    }

    #[test]
    fn test_claims_expiry_helpers() {
        let claims = Claims {
            role: None,
            exp: Some(1_000),
            sub: None,
        };
        assert_eq!(claims.seconds_until_expiry(400), Some(600));
        assert_eq!(claims.seconds_until_expiry(5_000), Some(0));
        assert_eq!(claims.expires_at().map(|d| d.timestamp()), Some(1_000));
    }

    #[test]
    fn test_role_display_round_trips_through_from_str() {
        for role in [Role::Player, Role::Club, Role::Admin] {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
    }
}
