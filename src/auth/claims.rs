//! Expiry decoding for the portal's self-describing ID tokens
//!
//! The token is three base64url segments joined by dots; the middle one is a
//! JSON object whose `exp` field holds the expiry in Unix seconds. The
//! signature is not verified: the token is only ever sent back to the portal
//! that issued it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

/// Lifetime assumed when a token carries no readable `exp` claim
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Decode the `exp` claim of a token, if present and well-formed
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut segments = token.split('.');
    let (_, payload, _) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    // Some issuers pad their segments; the URL-safe engine here does not accept padding.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// Expiry of `token`, falling back to `issued_at` + one hour
pub fn expiry_or_default(token: &str, issued_at: DateTime<Utc>) -> DateTime<Utc> {
    match decode_expiry(token) {
        Some(exp) => exp,
        None => {
            debug!("Token carries no decodable exp claim, assuming one hour lifetime");
            issued_at + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)
        }
    }
}
