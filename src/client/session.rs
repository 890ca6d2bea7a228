//! Session state: bearer token, expiry and the merged cookie jar
//!
//! Pure data plus merge logic. Nothing in here performs I/O; the
//! authentication flow fills a [`Session`] and the session guard reads and
//! invalidates it.

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, SET_COOKIE};
use std::fmt;

/// Ordered cookie jar with last-value-wins semantics per cookie name.
///
/// Cookies keep the position in which their name was first seen, so the
/// rendered `Cookie` header is stable across merges.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    /// Create an empty jar
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a jar from every `Set-Cookie` header in a response
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = Self::new();
        jar.absorb_headers(headers);
        jar
    }

    /// Parse a `name=value; name2=value2` header string
    pub fn parse(header: &str) -> Self {
        let mut jar = Self::new();
        for pair in header.split(';') {
            if let Some((name, value)) = split_pair(pair) {
                jar.insert(name, value);
            }
        }
        jar
    }

    /// Insert or overwrite a single cookie
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.cookies.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.cookies.push((name, value)),
        }
    }

    /// Merge every `Set-Cookie` header of a response into this jar.
    ///
    /// Only the leading `name=value` pair of each header is kept; attributes
    /// (`Path`, `Expires`, `HttpOnly`, ...) are dropped. Returns the number of
    /// cookies seen.
    pub fn absorb_headers(&mut self, headers: &HeaderMap) -> usize {
        let mut seen = 0;
        for raw in headers.get_all(SET_COOKIE) {
            let Ok(raw) = raw.to_str() else {
                continue;
            };
            let first = raw.split(';').next().unwrap_or_default();
            if let Some((name, value)) = split_pair(first) {
                self.insert(name, value);
                seen += 1;
            }
        }
        seen
    }

    /// Merge another jar into this one; `other` wins on name clashes
    pub fn merge(&mut self, other: &CookieJar) {
        for (name, value) in &other.cookies {
            self.insert(name.clone(), value.clone());
        }
    }

    /// Return a new jar holding `self` overlaid with `other`
    pub fn merged_with(&self, other: &CookieJar) -> CookieJar {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    /// Value of a cookie by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Number of cookies held
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether the jar holds no cookies
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Drop every cookie
    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    /// Render as a `Cookie` request header value
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Iterate over cookie names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.iter().map(|(n, _)| n.as_str())
    }
}

impl fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Cookie values are session credentials.
        f.debug_list().entries(self.names()).finish()
    }
}

fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (name, value) = pair.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

/// Live authentication state for one configured device account
#[derive(Clone, Default)]
pub struct Session {
    /// Sent as `Authorization: Bearer <token>` on JSON endpoints
    pub bearer_token: Option<String>,

    /// Used to mint a new bearer token without a full login
    pub refresh_token: Option<String>,

    /// Instant after which the bearer token is no longer accepted
    pub expires_at: Option<DateTime<Utc>>,

    /// Application session cookies
    pub cookie_jar: CookieJar,
}

impl Session {
    /// Create an empty, unauthenticated session
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether both a bearer token and its expiry are held
    pub fn has_token(&self) -> bool {
        self.bearer_token.is_some() && self.expires_at.is_some()
    }

    /// Whether the token expires within `buffer` of `now`.
    ///
    /// A session without a token or expiry always needs refreshing.
    pub fn needs_refresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) if self.bearer_token.is_some() => now + buffer >= expires_at,
            _ => true,
        }
    }

    /// Drop the bearer token so the next operation re-authenticates
    pub fn invalidate_token(&mut self) {
        self.bearer_token = None;
    }

    /// Drop the bearer token and the cookie session
    pub fn invalidate_all(&mut self) {
        self.bearer_token = None;
        self.cookie_jar.clear();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("cookie_jar", &self.cookie_jar)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_later_cookie_overwrites_earlier() {
        let mut jar = CookieJar::parse("a=1; b=2");
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=3; Path=/; HttpOnly"));
        headers.append(SET_COOKIE, HeaderValue::from_static("c=4; Secure"));

        assert_eq!(jar.absorb_headers(&headers), 2);
        assert_eq!(jar.header_value(), "a=3; b=2; c=4");
    }

    #[test]
    fn test_merge_keeps_first_seen_order() {
        let app = CookieJar::parse("nonce=n1; correlation=c1");
        let callback = CookieJar::parse("sid=xyz; nonce=");

        let merged = app.merged_with(&callback);
        assert_eq!(merged.header_value(), "nonce=; correlation=c1; sid=xyz");
        assert_eq!(merged.get("sid"), Some("xyz"));
    }

    #[test]
    fn test_parse_skips_garbage() {
        let jar = CookieJar::parse(" ; =x; novalue; k = v ");
        assert_eq!(jar.len(), 1);
        assert_eq!(jar.get("k"), Some("v"));
    }

    #[test]
    fn test_needs_refresh_buffer() {
        let now = Utc::now();
        let mut session = Session::new();
        assert!(session.needs_refresh(now, Duration::seconds(60)));

        session.bearer_token = Some("t".into());
        session.expires_at = Some(now + Duration::seconds(61));
        assert!(!session.needs_refresh(now, Duration::seconds(60)));

        session.expires_at = Some(now + Duration::seconds(30));
        assert!(session.needs_refresh(now, Duration::seconds(60)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let session = Session {
            bearer_token: Some("secret-token".into()),
            cookie_jar: CookieJar::parse("sid=secret-cookie"),
            ..Session::default()
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("secret-cookie"));
        assert!(rendered.contains("sid"));
    }
}
