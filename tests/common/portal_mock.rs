//! WireMock-based portal mocking infrastructure
//!
//! One mock server plays both the identity provider and the application:
//! the login handshake, the JSON parameter endpoints and the settings form
//! all live under the same base URL.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use heatpump_bridge::{
    client::{CookieJar, FieldCatalog, FieldKind, FormField},
    PortalClient, PortalConfig, PortalCredentials, Session,
};
use serde_json::{json, Value};
use url::Url;
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

pub const DEVICE_ID: &str = "dev-42";
pub const USERNAME: &str = "owner@example.com";
pub const PASSWORD: &str = "correct-horse";

pub const TELEMETRY_PATH: &str = "/api/devices/dev-42/telemetry";
pub const CONFIGURATION_PATH: &str = "/api/devices/dev-42/configuration";
pub const SETTINGS_PAGE_PATH: &str = "/Devices/dev-42/Settings";
pub const SETTINGS_SAVE_PATH: &str = "/Devices/dev-42/Settings/Save";

pub const LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <form method="post" action="/Account/Login">
    <input name="Username" type="text" />
    <input name="Password" type="password" />
    <input name="__RequestVerificationToken" type="hidden" value="tok1" />
    <button type="submit">Log in</button>
  </form>
</body></html>"#;

pub const INVALID_LOGIN_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <div class="validation-summary-errors"><ul><li>Invalid username or password</li></ul></div>
  <form method="post" action="/Account/Login">
    <input name="Username" type="text" />
    <input name="Password" type="password" />
    <input name="__RequestVerificationToken" type="hidden" value="tok2" />
  </form>
</body></html>"#;

/// Build a three-segment token whose payload carries `exp`
pub fn make_token(exp: i64) -> String {
    format!(
        "{}.{}.c2lnbmF0dXJl",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(json!({ "sub": "owner", "exp": exp }).to_string())
    )
}

/// Token valid for another hour
pub fn fresh_token() -> String {
    make_token((Utc::now() + Duration::hours(1)).timestamp())
}

/// Token the portal has stopped accepting.
///
/// Expires later than anything the mocked login issues, so it never equals
/// [`MockPortalServer::id_token`].
pub fn stale_token() -> String {
    make_token((Utc::now() + Duration::hours(2)).timestamp())
}

/// Session holding `token`, valid for another hour, with the given cookies
pub fn session_with(token: &str, cookies: &str) -> Session {
    Session {
        bearer_token: Some(token.to_string()),
        refresh_token: None,
        expires_at: Some(Utc::now() + Duration::hours(1)),
        cookie_jar: CookieJar::parse(cookies),
    }
}

/// Parameter document in the portal's `groups`/`viewParameters` shape
pub fn parameter_document(values: &[(&str, Value)]) -> Value {
    let parameters: Vec<Value> = values
        .iter()
        .map(|(id, value)| json!({ "id": id, "actualValue": value }))
        .collect();
    json!({ "groups": [ { "viewParameters": parameters } ] })
}

/// Settings page carrying the given anti-forgery token
pub fn settings_page(csrf: &str) -> String {
    format!(
        r#"<html><body><form method="post" action="{SETTINGS_SAVE_PATH}">
        <input name="__RequestVerificationToken" type="hidden" value="{csrf}" />
        <select name="_MODE"><option value="-1">unchanged</option></select>
        </form></body></html>"#
    )
}

/// Four-field catalog used by the write tests
pub fn small_catalog() -> FieldCatalog {
    FieldCatalog::new(vec![
        FormField::new("_FIELD_A", FieldKind::Numeric),
        FormField::new("_FIELD_B", FieldKind::Numeric),
        FormField::new("_MODE", FieldKind::Select),
        FormField::new("_LABEL", FieldKind::Text),
    ])
    .expect("valid catalog")
}

/// Decode a URL-encoded request body into ordered pairs
pub fn form_pairs(request: &Request) -> Vec<(String, String)> {
    url::form_urlencoded::parse(&request.body)
        .into_owned()
        .collect()
}

/// `Cookie` header of a received request
pub fn cookie_header(request: &Request) -> String {
    request
        .headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Mock heat-pump portal for testing
pub struct MockPortalServer {
    pub server: MockServer,
    pub base_url: String,
    /// ID token issued by the mocked login flow
    pub id_token: String,
}

impl MockPortalServer {
    /// Start a server with no mocks mounted
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self {
            server,
            base_url,
            id_token: fresh_token(),
        }
    }

    /// Start a server with the full login handshake mounted
    pub async fn with_login_flow() -> Self {
        let mock_server = Self::start().await;
        mock_server.mock_login_flow().await;
        mock_server
    }

    /// Portal config pointing both hosts at the mock server
    pub fn portal_config(&self) -> PortalConfig {
        let url = Url::parse(&self.base_url).expect("mock server URL");
        let mut config = PortalConfig::new(url.clone(), url, DEVICE_ID);
        config.timeout = std::time::Duration::from_secs(5);
        config
    }

    pub fn credentials() -> PortalCredentials {
        PortalCredentials::new(USERNAME, PASSWORD)
    }

    /// Client with an empty session and the default catalog
    pub fn client(&self) -> PortalClient {
        PortalClient::new(
            self.portal_config(),
            Self::credentials(),
            FieldCatalog::default(),
        )
        .expect("client")
    }

    /// Client around an existing session and the four-field catalog
    pub fn client_with_session(&self, session: Session) -> PortalClient {
        PortalClient::with_session(
            self.portal_config(),
            Self::credentials(),
            small_catalog(),
            session,
        )
        .expect("client")
    }

    /// Mount the five-step login handshake
    pub async fn mock_login_flow(&self) {
        // Step 1: app root redirects to the authorize endpoint
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header(
                        "Location",
                        format!(
                            "{}/connect/authorize?client_id=heatpump-portal&response_type=code%20id_token&state=abc",
                            self.base_url
                        )
                        .as_str(),
                    )
                    .insert_header("Set-Cookie", ".AspNetCore.Correlation=corr1; path=/; httponly"),
            )
            .mount(&self.server)
            .await;

        // Step 2: authorize redirects to the login form, which sets the antiforgery cookie
        Mock::given(method("GET"))
            .and(path("/connect/authorize"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/Account/Login?ReturnUrl=%2Fauth")
                    .insert_header("Set-Cookie", "idsrv.xsrf=x1; path=/"),
            )
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/Account/Login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html")
                    .insert_header("Set-Cookie", ".AspNetCore.Antiforgery=af1; path=/")
                    .set_body_string(LOGIN_PAGE),
            )
            .mount(&self.server)
            .await;

        // Step 3: credentials accepted
        Mock::given(method("POST"))
            .and(path("/Account/Login"))
            .and(body_string_contains("__RequestVerificationToken=tok1"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/auth")
                    .insert_header("Set-Cookie", "idsrv=session1; path=/; httponly"),
            )
            .mount(&self.server)
            .await;

        // Step 4: auto-submitting authorization form
        let callback_form = format!(
            r#"<html><body onload="document.forms[0].submit()">
            <form method="post" action="{base}/signin-oidc">
              <input type="hidden" name="code" value="c1" />
              <input type="hidden" name="id_token" value="{token}" />
              <input type="hidden" name="scope" value="openid profile" />
              <input type="hidden" name="state" value="abc" />
              <input type="hidden" name="session_state" value="ss1" />
            </form></body></html>"#,
            base = self.base_url,
            token = self.id_token
        );
        Mock::given(method("GET"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_string(callback_form))
            .mount(&self.server)
            .await;

        // Step 5: app callback sets the session cookie
        Mock::given(method("POST"))
            .and(path("/signin-oidc"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", "/")
                    .insert_header("Set-Cookie", "sid=xyz; path=/; secure; httponly"),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve a parameter document on `endpoint` for requests bearing `token`
    pub async fn mock_parameters(&self, endpoint: &str, token: &str, values: &[(&str, Value)]) {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .and(header("Authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(parameter_document(values)))
            .mount(&self.server)
            .await;
    }

    /// All received requests matching `method` and `path`
    pub async fn requests_to(&self, http_method: &str, request_path: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
            .collect()
    }

    /// Number of login handshakes started
    pub async fn login_count(&self) -> usize {
        self.requests_to("GET", "/").await.len()
    }

    /// Total number of requests received
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|r| r.len())
            .unwrap_or_default()
    }
}
