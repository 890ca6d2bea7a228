//! Hidden-form value extraction from raw HTML
//!
//! The portal renders its login, callback and settings pages server-side and
//! hands state back to the client as hidden `<input>` fields. There is no
//! DOM here: every field has a pair of named-capture patterns (one per
//! attribute order) and extraction returns `Some(value)` when found and
//! `None` when missing. Callers decide which missing field is fatal.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fmt;

/// Hidden form fields the client knows how to scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HiddenField {
    /// Anti-forgery token on the login page and the settings page
    CsrfToken,
    /// Where the identity provider sends the browser after login
    ReturnUrl,
    /// OIDC authorization code on the auto-submitting callback form
    Code,
    /// OIDC ID token on the auto-submitting callback form
    IdToken,
    /// OIDC session state on the auto-submitting callback form
    SessionState,
}

impl HiddenField {
    /// Form field name as rendered in the HTML
    pub fn name(&self) -> &'static str {
        match self {
            HiddenField::CsrfToken => "__RequestVerificationToken",
            HiddenField::ReturnUrl => "ReturnUrl",
            HiddenField::Code => "code",
            HiddenField::IdToken => "id_token",
            HiddenField::SessionState => "session_state",
        }
    }

    /// Extract this field's value from `html`, HTML-entity-decoded
    pub fn extract(&self, html: &str) -> Option<String> {
        let patterns = patterns_for(*self);
        patterns
            .iter()
            .find_map(|re| re.captures(html))
            .and_then(|caps| caps.name("dq").or_else(|| caps.name("sq")))
            .map(|m| decode_entities(m.as_str()).into_owned())
    }
}

impl fmt::Display for HiddenField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn build_patterns(name: &str) -> [Regex; 2] {
    let name = regex::escape(name);
    // name before value, then value before name; a value may contain the other quote
    let name_attr = format!(r#"\bname\s*=\s*(?:"{name}"|'{name}')"#);
    let value_attr = r#"\bvalue\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#;
    let name_first = format!(r"(?is)<input\b[^>]*?{name_attr}[^>]*?{value_attr}");
    let value_first = format!(r"(?is)<input\b[^>]*?{value_attr}[^>]*?{name_attr}");
    [
        Regex::new(&name_first).expect("valid hidden field pattern"),
        Regex::new(&value_first).expect("valid hidden field pattern"),
    ]
}

static CSRF_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| build_patterns("__RequestVerificationToken"));
static RETURN_URL_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| build_patterns("ReturnUrl"));
static CODE_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| build_patterns("code"));
static ID_TOKEN_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| build_patterns("id_token"));
static SESSION_STATE_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| build_patterns("session_state"));

fn patterns_for(field: HiddenField) -> &'static [Regex; 2] {
    match field {
        HiddenField::CsrfToken => &CSRF_PATTERNS,
        HiddenField::ReturnUrl => &RETURN_URL_PATTERNS,
        HiddenField::Code => &CODE_PATTERNS,
        HiddenField::IdToken => &ID_TOKEN_PATTERNS,
        HiddenField::SessionState => &SESSION_STATE_PATTERNS,
    }
}

static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&#(?:[xX](?P<hex>[0-9a-fA-F]+)|(?P<dec>[0-9]+));")
        .expect("valid entity pattern")
});

/// Decode the HTML entities the portal emits in attribute values.
///
/// Handles the named XML entities plus decimal and hex numeric references.
/// `&amp;` is decoded last so `&amp;lt;` becomes `&lt;`, not `<`.
pub fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let numeric = NUMERIC_ENTITY.replace_all(raw, |caps: &regex::Captures<'_>| {
        let code = match (caps.name("hex"), caps.name("dec")) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            (None, None) => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    let decoded = numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    Cow::Owned(decoded)
}

/// Markers that identify the identity provider's login form
const LOGIN_FORM_MARKERS: &[&str] = &[
    "name=\"Password\"",
    "name='Password'",
    "type=\"password\"",
    "type='password'",
];

/// Whether an HTML body is the login form rather than the requested page.
///
/// Used as the content-based session-expiry signal when the portal answers
/// an expired session with `200` and the login page instead of a redirect.
pub fn looks_like_login_page(html: &str) -> bool {
    LOGIN_FORM_MARKERS.iter().any(|marker| html.contains(marker))
}

/// Whether an HTML body contains one of the invalid-credentials markers
pub fn contains_error_marker(html: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .any(|marker| html.contains(marker.as_str()))
}
