//! Local inspection of access tokens.
//!
//! Access tokens are JWTs. Only the payload segment is read; the signature is
//! the server's business. Everything here is pure: "now" is always passed in.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedToken {
    #[error("Token must have three segments, found {0}")]
    SegmentCount(usize),

    #[error("Token payload is not valid base64url")]
    Encoding,

    #[error("Token payload is not valid claims JSON: {0}")]
    Claims(String),

    #[error("Token timestamp out of range: {0}")]
    Timestamp(i64),
}

/// Claims decoded from an access token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedClaims {
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DecodedClaims {
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

#[derive(Deserialize)]
struct RawClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, MalformedToken> {
    DateTime::from_timestamp(secs, 0).ok_or(MalformedToken::Timestamp(secs))
}

/// Decode the claims of `token` without verifying its signature.
pub fn decode(token: &str) -> Result<DecodedClaims, MalformedToken> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(MalformedToken::SegmentCount(segments.len()));
    }

    // Some issuers pad their segments; the URL-safe alphabet never contains '='.
    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|_| MalformedToken::Encoding)?;
    let raw: RawClaims =
        serde_json::from_slice(&payload).map_err(|e| MalformedToken::Claims(e.to_string()))?;

    Ok(DecodedClaims {
        subject: raw.sub,
        issued_at: timestamp(raw.iat)?,
        expires_at: timestamp(raw.exp)?,
    })
}

/// Signed time left before `token` expires; negative once expired.
pub fn time_until_expiry(token: &str, now: DateTime<Utc>) -> Result<Duration, MalformedToken> {
    Ok(decode(token)?.time_until_expiry(now))
}

/// Diagnostic summary of the current access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TokenInfo {
    #[serde(rename_all = "camelCase")]
    Decoded {
        valid: bool,
        subject: String,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        /// Whole minutes left; zero once expired.
        minutes_remaining: i64,
    },
    Missing,
    Invalid { reason: String },
}

impl TokenInfo {
    pub fn inspect(token: Option<&str>, now: DateTime<Utc>) -> Self {
        let Some(token) = token else {
            return TokenInfo::Missing;
        };
        match decode(token) {
            Ok(claims) => {
                let remaining = claims.time_until_expiry(now);
                TokenInfo::Decoded {
                    valid: remaining > Duration::zero(),
                    subject: claims.subject,
                    issued_at: claims.issued_at,
                    expires_at: claims.expires_at,
                    minutes_remaining: remaining.num_minutes().max(0),
                }
            }
            Err(e) => TokenInfo::Invalid {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, TokenInfo::Decoded { valid: true, .. })
    }
}

/// Build an unsigned JWT-shaped token for tests.
#[cfg(test)]
pub(crate) fn mint(subject: &str, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": subject,
        "iat": issued_at.timestamp(),
        "exp": expires_at.timestamp(),
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_decode_claims() {
        let token = mint("an@shop.vn", at(1_700_000_000), at(1_700_000_900));
        let claims = decode(&token).expect("decodes");
        assert_eq!(claims.subject, "an@shop.vn");
        assert_eq!(claims.issued_at, at(1_700_000_000));
        assert_eq!(claims.expires_at, at(1_700_000_900));
    }

    #[test]
    fn test_time_until_expiry_is_signed() {
        let token = mint("u", at(1_000), at(2_000));
        assert_eq!(time_until_expiry(&token, at(1_400)).unwrap(), Duration::seconds(600));
        assert_eq!(time_until_expiry(&token, at(2_000)).unwrap(), Duration::zero());
        assert_eq!(time_until_expiry(&token, at(2_060)).unwrap(), Duration::seconds(-60));
    }

    #[test]
    fn test_padded_payload_is_accepted() {
        let token = mint("u", at(1_000), at(2_000));
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        while parts[1].len() % 4 != 0 {
            parts[1].push('=');
        }
        assert!(decode(&parts.join(".")).is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        assert_eq!(decode("opaque"), Err(MalformedToken::SegmentCount(1)));
        assert_eq!(decode("a.b.c.d"), Err(MalformedToken::SegmentCount(4)));
        assert_eq!(decode("a.!!!.c"), Err(MalformedToken::Encoding));

        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("hello"));
        assert!(matches!(decode(&not_json), Err(MalformedToken::Claims(_))));

        let string_exp = format!(
            "h.{}.s",
            URL_SAFE_NO_PAD.encode(r#"{"sub":"u","iat":1,"exp":"soon"}"#)
        );
        assert!(matches!(decode(&string_exp), Err(MalformedToken::Claims(_))));

        let no_exp = format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"sub":"u","iat":1}"#));
        assert!(matches!(decode(&no_exp), Err(MalformedToken::Claims(_))));

        let no_sub = format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"iat":1,"exp":2}"#));
        assert!(matches!(
            decode(&no_sub),
            Err(MalformedToken::Claims(msg)) if msg.contains("sub")
        ));
    }

    #[test]
    fn test_token_info() {
        let token = mint("an@shop.vn", at(0), at(3_600));

        match TokenInfo::inspect(Some(&token), at(600)) {
            TokenInfo::Decoded { valid, minutes_remaining, .. } => {
                assert!(valid);
                assert_eq!(minutes_remaining, 50);
            }
            other => panic!("unexpected {:?}", other),
        }

        let expired = TokenInfo::inspect(Some(&token), at(4_000));
        assert!(!expired.is_valid());
        assert!(matches!(expired, TokenInfo::Decoded { minutes_remaining: 0, .. }));

        assert_eq!(TokenInfo::inspect(None, at(0)), TokenInfo::Missing);
        assert!(matches!(
            TokenInfo::inspect(Some("garbage"), at(0)),
            TokenInfo::Invalid { .. }
        ));
    }
}
