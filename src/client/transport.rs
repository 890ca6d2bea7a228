//! Shared HTTP plumbing for the portal client
//!
//! Every request goes through one redirect-free `reqwest::Client`: the login
//! handshake needs to see each `302` and its `Set-Cookie` headers, and the
//! data endpoints need to see a redirect to the login page rather than
//! silently following it. Where a flow does want to follow redirects, it
//! walks them by hand with [`follow_redirects`].

use crate::client::session::CookieJar;
use crate::config::{EndpointPaths, PortalConfig};
use crate::error::{PortalError, Result};
use reqwest::header::{COOKIE, LOCATION};
use reqwest::{redirect, Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

/// Build the shared redirect-free HTTP client
pub fn build_client(config: &PortalConfig) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .redirect(redirect::Policy::none())
        .user_agent(format!("heatpump-bridge/{}", env!("CARGO_PKG_VERSION")));

    if !config.verify_ssl {
        warn!("SSL verification disabled - this is insecure for production use");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| PortalError::network(format!("Failed to build HTTP client: {e}")))
}

/// Send a request, classifying transport failures
pub async fn send(request: RequestBuilder, context: &str) -> Result<Response> {
    request
        .send()
        .await
        .map_err(|e| PortalError::from_transport(context, e))
}

/// Read a response body as text, classifying transport failures
pub async fn read_text(response: Response, context: &str) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| PortalError::from_transport(context, e))
}

/// Attach the jar as a `Cookie` header when it holds anything
pub fn with_cookies(request: RequestBuilder, jar: &CookieJar) -> RequestBuilder {
    if jar.is_empty() {
        request
    } else {
        request.header(COOKIE, jar.header_value())
    }
}

/// `Location` of a redirect response, resolved against the request URL
pub fn redirect_target(response: &Response) -> Option<Url> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    response.url().join(location).ok()
}

/// GET `url`, following redirects by hand and capturing cookies on every hop.
///
/// Returns the final URL together with the first non-redirect response.
pub async fn follow_redirects(
    client: &Client,
    url: Url,
    jar: &mut CookieJar,
    max_redirects: usize,
    context: &str,
) -> Result<(Url, Response)> {
    let mut current = url;

    for hop in 0..=max_redirects {
        let response = send(with_cookies(client.get(current.clone()), jar), context).await?;
        let captured = jar.absorb_headers(response.headers());
        debug!(
            hop,
            url = %current,
            status = %response.status(),
            cookies = captured,
            "{context}: response received"
        );

        match redirect_target(&response) {
            Some(next) => current = next,
            None => return Ok((current, response)),
        }
    }

    Err(PortalError::api(
        None,
        format!("{context}: more than {max_redirects} redirects"),
    ))
}

/// Why a data request was judged to be an authentication rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection {
    /// HTTP status of the rejecting response
    pub status: Option<u16>,
    /// Human-readable reason
    pub reason: String,
}

impl AuthRejection {
    pub fn new(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// Recognizes the portal's "your session is gone" signals
#[derive(Debug, Clone)]
pub struct LoginDetector {
    login_paths: Vec<String>,
}

impl LoginDetector {
    pub fn new(endpoints: &EndpointPaths) -> Self {
        Self {
            login_paths: [&endpoints.login_path, &endpoints.authorize_path]
                .into_iter()
                .map(|p| p.trim_end_matches('/').to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether `url` points at the login form or the authorize endpoint
    pub fn is_login_url(&self, url: &Url) -> bool {
        let path = url.path().trim_end_matches('/').to_ascii_lowercase();
        self.login_paths.iter().any(|login| path.starts_with(login.as_str()))
    }

    /// Classify a response as an auth rejection: `401`/`403`, or a redirect
    /// into the login flow.
    pub fn rejection(&self, response: &Response) -> Option<AuthRejection> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Some(AuthRejection::new(
                Some(status.as_u16()),
                format!("portal answered {status}"),
            ));
        }

        let target = redirect_target(response)?;
        self.is_login_url(&target).then(|| {
            AuthRejection::new(
                Some(status.as_u16()),
                format!("redirected to login at {}", target.path()),
            )
        })
    }
}
