//! Session guard: keeps the session valid and retries once on rejection
//!
//! Every data operation runs through [`SessionGuard::with_auth_retry`]. An
//! attempt reports either a result or an [`AuthRejection`]; on rejection the
//! guard invalidates the session, re-authenticates and runs the attempt one
//! more time. A second rejection is terminal.

use crate::auth::Authenticator;
use crate::client::session::Session;
use crate::client::transport::AuthRejection;
use crate::error::{PortalError, Result};
use chrono::{Duration, Utc};
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Attempts per operation, the first included
pub const MAX_ATTEMPTS: u32 = 2;

/// Tokens expiring within this many seconds are refreshed up front
pub const REFRESH_BUFFER_SECS: i64 = 60;

/// Outcome of one attempt of a guarded operation
#[derive(Debug)]
pub enum Attempt<T> {
    /// The portal accepted the request
    Done(T),
    /// The portal rejected the session
    AuthRejected(AuthRejection),
}

/// What to drop from the session when an attempt is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Bearer-authenticated JSON requests: drop the token
    Token,
    /// Cookie-authenticated form requests: drop the token and the cookies
    TokenAndCookies,
}

/// Owns the session and serializes authentication on it
pub struct SessionGuard {
    authenticator: Authenticator,
    session: Mutex<Session>,
}

impl SessionGuard {
    pub fn new(authenticator: Authenticator, session: Session) -> Self {
        Self {
            authenticator,
            session: Mutex::new(session),
        }
    }

    /// Copy of the current session state
    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Make sure a usable token is held and return the session to use.
    ///
    /// No token: full login. Token expiring within a minute: refresh.
    /// Otherwise no network I/O. Runs under the session lock, so concurrent
    /// callers wait for a single login instead of racing their own.
    pub async fn ensure_authenticated(&self) -> Result<Session> {
        let mut session = self.session.lock().await;

        if !session.has_token() {
            info!("No portal session, authenticating");
            *session = self.authenticator.authenticate().await?;
        } else if session.needs_refresh(Utc::now(), Duration::seconds(REFRESH_BUFFER_SECS)) {
            info!("Portal token about to expire, refreshing");
            let refreshed = self.authenticator.refresh_tokens(&session).await?;
            *session = refreshed;
        }

        Ok(session.clone())
    }

    /// Clear the rejected credentials, unless a sibling request already
    /// replaced them.
    pub async fn invalidate(&self, rejected: &Session, scope: InvalidationScope) {
        let mut session = self.session.lock().await;
        if session.bearer_token != rejected.bearer_token {
            debug!("Session already replaced since the rejected attempt, keeping it");
            return;
        }

        match scope {
            InvalidationScope::Token => session.invalidate_token(),
            InvalidationScope::TokenAndCookies => session.invalidate_all(),
        }
    }

    /// Run `attempt` with a valid session, re-authenticating and retrying
    /// once if the portal rejects it.
    pub async fn with_auth_retry<T, F, Fut>(
        &self,
        operation: &str,
        scope: InvalidationScope,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<Attempt<T>>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let session = self.ensure_authenticated().await?;

            match attempt(session.clone()).await? {
                Attempt::Done(value) => return Ok(value),
                Attempt::AuthRejected(rejection) if attempts >= MAX_ATTEMPTS => {
                    warn!(
                        operation,
                        attempts,
                        "Portal rejected the session again after re-authentication: {}",
                        rejection.reason
                    );
                    return Err(PortalError::api_auth_failure(
                        rejection.status,
                        format!("{operation}: {}", rejection.reason),
                    ));
                }
                Attempt::AuthRejected(rejection) => {
                    warn!(
                        operation,
                        attempt = attempts,
                        "Portal rejected the session, re-authenticating: {}",
                        rejection.reason
                    );
                    self.invalidate(&session, scope).await;
                }
            }
        }
    }
}
