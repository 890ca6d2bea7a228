//! Settings writer
//!
//! The settings page is a classic server-rendered form: fetch it with the app
//! session cookies to obtain a fresh anti-forgery token, then post the whole
//! form back. Page fetch and submission are one guarded attempt, so a
//! rejection of either re-authenticates and starts over with a new token.

use crate::client::form::{FieldCatalog, WriteRequest};
use crate::client::guard::{Attempt, InvalidationScope, SessionGuard};
use crate::client::session::Session;
use crate::client::transport::{self, AuthRejection, LoginDetector};
use crate::error::{PortalError, Result};
use crate::logging::redact_form;
use crate::scrape::{self, HiddenField};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

/// Submits single-field changes through the settings form
pub struct Writer {
    client: Client,
    page_url: Url,
    save_url: Url,
    catalog: FieldCatalog,
    detector: LoginDetector,
}

impl Writer {
    pub fn new(
        client: Client,
        page_url: Url,
        save_url: Url,
        catalog: FieldCatalog,
        detector: LoginDetector,
    ) -> Self {
        Self {
            client,
            page_url,
            save_url,
            catalog,
            detector,
        }
    }

    /// Settings form catalog in use
    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Persist one field change.
    ///
    /// Unknown fields are rejected before any request is made.
    pub async fn write(&self, guard: &SessionGuard, request: &WriteRequest) -> Result<()> {
        let form = self.catalog.render(request)?;
        let form = &form;

        guard
            .with_auth_retry(
                "settings write",
                InvalidationScope::TokenAndCookies,
                move |session| self.submit_once(form, session),
            )
            .await?;

        info!(field = %request.field, value = %request.value, "Setting written");
        Ok(())
    }

    async fn fetch_csrf_token(&self, session: &Session) -> Result<Attempt<String>> {
        let request =
            transport::with_cookies(self.client.get(self.page_url.clone()), &session.cookie_jar);
        let response = transport::send(request, "settings page").await?;

        if let Some(rejection) = self.detector.rejection(&response) {
            return Ok(Attempt::AuthRejected(rejection));
        }

        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::api(
                Some(status.as_u16()),
                "settings page request failed",
            ));
        }

        let html = transport::read_text(response, "settings page").await?;
        match HiddenField::CsrfToken.extract(&html) {
            Some(token) => Ok(Attempt::Done(token)),
            None if scrape::looks_like_login_page(&html) => {
                Ok(Attempt::AuthRejected(AuthRejection::new(
                    Some(status.as_u16()),
                    "login page served instead of settings",
                )))
            }
            None => Err(PortalError::parsing(format!(
                "settings page has no {}",
                HiddenField::CsrfToken
            ))),
        }
    }

    async fn submit_once(
        &self,
        form: &[(String, String)],
        session: Session,
    ) -> Result<Attempt<()>> {
        let csrf_token = match self.fetch_csrf_token(&session).await? {
            Attempt::Done(token) => token,
            Attempt::AuthRejected(rejection) => return Ok(Attempt::AuthRejected(rejection)),
        };

        let mut body = form.to_vec();
        body.push((HiddenField::CsrfToken.name().to_string(), csrf_token));
        debug!(form = %redact_form(&body), "Submitting settings form");

        let request =
            transport::with_cookies(self.client.post(self.save_url.clone()), &session.cookie_jar)
                .form(&body);
        let response = transport::send(request, "settings save").await?;

        if let Some(rejection) = self.detector.rejection(&response) {
            return Ok(Attempt::AuthRejected(rejection));
        }

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            return Ok(Attempt::Done(()));
        }

        let body = transport::read_text(response, "settings save")
            .await
            .unwrap_or_default();
        Err(PortalError::api(
            Some(status.as_u16()),
            format!("settings save rejected: {}", truncate(body.trim(), 200)),
        ))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
