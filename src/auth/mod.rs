//! Authentication flow engine for the portal's OIDC front door
//!
//! The portal has no token API for end users. A session is obtained by
//! replaying what a browser does:
//!
//! ```text
//!  app  GET /              ──302──▶  IdP /connect/authorize?...&state=S
//!  IdP  GET authorize      ──302──▶  IdP /Account/Login?ReturnUrl=R   (form + CSRF)
//!  IdP  POST /Account/Login ─302──▶  (credentials accepted, IdP cookies set)
//!  IdP  GET R              ──200──▶  auto-submit form: code, id_token, session_state
//!  app  POST /signin-oidc  ──302──▶  app session cookies
//! ```
//!
//! The `id_token` from the last form becomes the bearer token for the JSON
//! endpoints and the app cookies authenticate the HTML settings pages.

pub mod claims;

use crate::client::session::{CookieJar, Session};
use crate::client::transport::{self, redirect_target, with_cookies};
use crate::config::{PortalConfig, PortalCredentials};
use crate::error::{PortalError, Result};
use crate::logging::redact_form;
use crate::scrape::{self, HiddenField};
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Scope requested on the OIDC callback
pub const OIDC_SCOPE: &str = "openid profile";

/// Token endpoint response for the refresh grant
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Drives the login handshake and the refresh grant
#[derive(Clone)]
pub struct Authenticator {
    /// Redirect-free HTTP client
    client: Client,

    /// Portal configuration
    config: Arc<PortalConfig>,

    /// Account credentials
    credentials: PortalCredentials,
}

/// Hidden state carried from the login page to the credential POST
struct LoginPage {
    csrf_token: String,
    return_url: String,
    cookies: CookieJar,
}

/// Values scraped from the auto-submitting authorization form
struct AuthorizationForm {
    code: String,
    id_token: String,
    session_state: Option<String>,
}

impl Authenticator {
    pub fn new(client: Client, config: Arc<PortalConfig>, credentials: PortalCredentials) -> Self {
        Self {
            client,
            config,
            credentials,
        }
    }

    /// Run the full login handshake and return a fresh session
    pub async fn authenticate(&self) -> Result<Session> {
        info!("Performing portal login for {}", self.credentials.username);

        // Step 1: bootstrap at the app root to learn the IdP redirect and state
        let (authorize_url, state, app_cookies) = self.bootstrap().await?;

        // Step 2: reach the login form
        let mut login_page = self.fetch_login_page(authorize_url).await?;

        // Step 3: submit credentials
        self.submit_credentials(&mut login_page).await?;

        // Step 4: collect the authorization code
        let form = self.fetch_authorization_form(&login_page).await?;

        // Step 5: complete the OIDC callback on the app
        let cookie_jar = self.complete_callback(&form, &state, &app_cookies).await?;

        let expires_at = claims::expiry_or_default(&form.id_token, Utc::now());
        info!(
            cookies = cookie_jar.len(),
            %expires_at,
            "Portal login succeeded"
        );

        Ok(Session {
            bearer_token: Some(form.id_token),
            refresh_token: None,
            expires_at: Some(expires_at),
            cookie_jar,
        })
    }

    async fn bootstrap(&self) -> Result<(Url, String, CookieJar)> {
        let root = self.config.root_url()?;
        let response = transport::send(self.client.get(root), "bootstrap").await?;
        let app_cookies = CookieJar::from_headers(response.headers());

        let Some(authorize_url) = redirect_target(&response) else {
            return Err(PortalError::authentication(format!(
                "no redirect from app root (status {})",
                response.status()
            )));
        };

        let state = authorize_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| {
                PortalError::authentication("authorize redirect carries no state parameter")
            })?;

        debug!(
            authorize = %authorize_url.path(),
            app_cookies = app_cookies.len(),
            "Bootstrap redirect received"
        );
        Ok((authorize_url, state, app_cookies))
    }

    async fn fetch_login_page(&self, authorize_url: Url) -> Result<LoginPage> {
        let mut cookies = CookieJar::new();
        let (final_url, response) = transport::follow_redirects(
            &self.client,
            authorize_url,
            &mut cookies,
            self.config.max_redirects,
            "login page",
        )
        .await
        .map_err(|e| match e {
            PortalError::Api { message, .. } => PortalError::authentication(message),
            other => other,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::authentication(format!(
                "login page answered {status}"
            )));
        }

        let html = transport::read_text(response, "login page").await?;

        let csrf_token = HiddenField::CsrfToken.extract(&html).ok_or_else(|| {
            PortalError::authentication(format!(
                "login page has no {}",
                HiddenField::CsrfToken
            ))
        })?;

        let return_url = HiddenField::ReturnUrl
            .extract(&html)
            .or_else(|| {
                final_url
                    .query_pairs()
                    .find(|(k, _)| k.eq_ignore_ascii_case("ReturnUrl"))
                    .map(|(_, v)| v.into_owned())
            })
            .map(|raw| normalize_return_url(&raw))
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                PortalError::authentication(format!(
                    "login page has no {}",
                    HiddenField::ReturnUrl
                ))
            })?;

        if cookies.is_empty() {
            return Err(PortalError::authentication(
                "login page set no session cookies",
            ));
        }

        debug!(
            cookies = cookies.len(),
            return_url = %return_url,
            "Login form scraped"
        );
        Ok(LoginPage {
            csrf_token,
            return_url,
            cookies,
        })
    }

    async fn submit_credentials(&self, page: &mut LoginPage) -> Result<()> {
        let form = vec![
            ("Username".to_string(), self.credentials.username.clone()),
            ("Password".to_string(), self.credentials.password.clone()),
            (
                HiddenField::CsrfToken.name().to_string(),
                page.csrf_token.clone(),
            ),
            (HiddenField::ReturnUrl.name().to_string(), page.return_url.clone()),
        ];
        debug!(form = %redact_form(&form), "Submitting credentials");

        let request = with_cookies(self.client.post(self.config.login_url()?), &page.cookies)
            .form(&form);
        let response = transport::send(request, "credential submission").await?;
        let status = response.status();

        if status.is_redirection() {
            page.cookies.absorb_headers(response.headers());
            return Ok(());
        }

        if status.is_success() {
            let html = transport::read_text(response, "credential submission").await?;
            if scrape::contains_error_marker(&html, &self.config.error_markers) {
                return Err(PortalError::invalid_credentials(
                    "invalid credentials: the portal rejected the username or password",
                ));
            }
        }

        Err(PortalError::authentication(format!(
            "credential submission answered {status} instead of a redirect"
        )))
    }

    async fn fetch_authorization_form(&self, page: &LoginPage) -> Result<AuthorizationForm> {
        let url = self.config.identity_endpoint(&page.return_url)?;
        let response = transport::send(
            with_cookies(self.client.get(url), &page.cookies),
            "authorization code",
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::authentication(format!(
                "authorization step answered {status}"
            )));
        }

        let html = transport::read_text(response, "authorization code").await?;
        let required = |field: HiddenField| {
            field.extract(&html).ok_or_else(|| {
                PortalError::authentication(format!("authorization form has no {field}"))
            })
        };

        Ok(AuthorizationForm {
            code: required(HiddenField::Code)?,
            id_token: required(HiddenField::IdToken)?,
            session_state: HiddenField::SessionState.extract(&html),
        })
    }

    async fn complete_callback(
        &self,
        form: &AuthorizationForm,
        state: &str,
        app_cookies: &CookieJar,
    ) -> Result<CookieJar> {
        let mut body = vec![
            (HiddenField::Code.name().to_string(), form.code.clone()),
            (HiddenField::IdToken.name().to_string(), form.id_token.clone()),
            ("scope".to_string(), OIDC_SCOPE.to_string()),
            ("state".to_string(), state.to_string()),
        ];
        if let Some(session_state) = &form.session_state {
            body.push((
                HiddenField::SessionState.name().to_string(),
                session_state.clone(),
            ));
        }
        debug!(form = %redact_form(&body), "Completing OIDC callback");

        let request = with_cookies(self.client.post(self.config.callback_url()?), app_cookies)
            .form(&body);
        let response = transport::send(request, "OIDC callback").await?;

        let status = response.status();
        if !status.is_redirection() {
            return Err(PortalError::authentication(format!(
                "OIDC callback answered {status} instead of a redirect"
            )));
        }

        Ok(app_cookies.merged_with(&CookieJar::from_headers(response.headers())))
    }

    /// Mint a new bearer token from the refresh token, keeping the cookies.
    ///
    /// Without a refresh token this is a full [`authenticate`](Self::authenticate).
    pub async fn refresh_tokens(&self, session: &Session) -> Result<Session> {
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            debug!("No refresh token held, performing full login");
            return self.authenticate().await;
        };

        match self.request_refresh(refresh_token).await {
            Ok(tokens) => {
                let mut refreshed = session.clone();
                apply_token_response(&mut refreshed, tokens)?;
                info!("Portal token refreshed");
                Ok(refreshed)
            }
            Err(e) => {
                // Any refresh failure, transient ones included, falls back to a
                // full login. Kept deliberately: callers rely on it.
                warn!("Token refresh failed, re-authenticating: {}", e);
                self.authenticate().await
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];

        let response = transport::send(
            self.client.post(self.config.token_url()?).form(&params),
            "token refresh",
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = transport::read_text(response, "token refresh")
                .await
                .unwrap_or_default();
            return Err(PortalError::api(
                Some(status.as_u16()),
                format!("token refresh failed: {}", body.trim()),
            ));
        }

        let body = transport::read_text(response, "token refresh").await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Replace bearer token, refresh token and expiry together
fn apply_token_response(session: &mut Session, tokens: TokenResponse) -> Result<()> {
    let bearer = tokens
        .id_token
        .or(tokens.access_token)
        .ok_or_else(|| PortalError::parsing("token response carries no token"))?;

    let now = Utc::now();
    let expires_at = claims::decode_expiry(&bearer)
        .or_else(|| {
            // expires_in comes from the server; out-of-range values fall through
            tokens
                .expires_in
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
        })
        .unwrap_or_else(|| now + Duration::seconds(claims::DEFAULT_TOKEN_LIFETIME_SECS));

    session.bearer_token = Some(bearer);
    if let Some(refresh_token) = tokens.refresh_token {
        session.refresh_token = Some(refresh_token);
    }
    session.expires_at = Some(expires_at);
    Ok(())
}

/// Percent-decode a return URL that arrived encoded (`%2Fauth`).
///
/// Already-decoded paths and absolute URLs keep their inner query encoding.
fn normalize_return_url(raw: &str) -> String {
    let raw = raw.trim();
    let encoded = !raw.starts_with('/') && !raw.contains("://") && raw.contains('%');
    if !encoded {
        return raw.to_string();
    }
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("%2Fauth", "/auth")]
    #[case("%2Fconnect%2Fauthorize%2Fcallback%3Fstate%3Dabc", "/connect/authorize/callback?state=abc")]
    #[case("/auth", "/auth")]
    #[case(
        "/connect/authorize/callback?redirect_uri=https%3A%2F%2Fportal",
        "/connect/authorize/callback?redirect_uri=https%3A%2F%2Fportal"
    )]
    #[case("https://id.example.com/auth?x=%2F", "https://id.example.com/auth?x=%2F")]
    fn test_normalize_return_url(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_return_url(raw), expected);
    }

    #[test]
    fn test_token_response_replaces_tokens_together() {
        let mut session = Session {
            bearer_token: Some("old".into()),
            refresh_token: Some("r1".into()),
            expires_at: Some(Utc::now()),
            cookie_jar: CookieJar::parse("sid=xyz"),
        };

        apply_token_response(
            &mut session,
            TokenResponse {
                id_token: None,
                access_token: Some("opaque".into()),
                refresh_token: None,
                expires_in: Some(600),
            },
        )
        .unwrap();

        assert_eq!(session.bearer_token.as_deref(), Some("opaque"));
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(session.cookie_jar.get("sid"), Some("xyz"));
        let remaining = session.expires_at.unwrap() - Utc::now();
        assert!(remaining > Duration::seconds(590) && remaining <= Duration::seconds(600));
    }

    #[rstest]
    #[case(i64::MAX)]
    #[case(i64::MIN)]
    #[case(i64::MAX / 1000)]
    fn test_out_of_range_expires_in_uses_default_lifetime(#[case] expires_in: i64) {
        let mut session = Session::new();
        apply_token_response(
            &mut session,
            TokenResponse {
                id_token: None,
                access_token: Some("opaque".into()),
                refresh_token: None,
                expires_in: Some(expires_in),
            },
        )
        .unwrap();

        let remaining = session.expires_at.unwrap() - Utc::now();
        let default = Duration::seconds(claims::DEFAULT_TOKEN_LIFETIME_SECS);
        assert!(remaining > default - Duration::seconds(10) && remaining <= default);
    }

    #[test]
    fn test_token_response_without_token_is_rejected() {
        let mut session = Session::new();
        let tokens = TokenResponse {
            id_token: None,
            access_token: None,
            refresh_token: Some("r2".into()),
            expires_in: None,
        };
        assert!(matches!(
            apply_token_response(&mut session, tokens),
            Err(PortalError::Parsing(_))
        ));
    }
}
