//! Portal client façade
//!
//! [`PortalClient`] owns one session and exposes the read/write contract.
//! Callers never see how many login round-trips happened underneath.

use crate::auth::Authenticator;
use crate::client::form::{FieldCatalog, WriteRequest};
use crate::client::guard::SessionGuard;
use crate::client::reader::{ReadingSet, Reader};
use crate::client::session::Session;
use crate::client::transport::{self, LoginDetector};
use crate::client::writer::Writer;
use crate::config::{BridgeConfig, PortalConfig, PortalCredentials};
use crate::error::{PortalError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Read/write contract of a heat-pump portal
#[async_trait]
pub trait HeatPumpPortal: Send + Sync {
    /// Fetch telemetry and configuration values
    async fn fetch_readings(&self) -> Result<ReadingSet>;

    /// Write a raw, already formatted value
    async fn write_setting(&self, field: &str, value: &str) -> Result<()>;

    /// Write a temperature in °C, formatted with one decimal
    async fn write_temperature(&self, field: &str, celsius: f64) -> Result<()>;

    /// Write the option index of a select field
    async fn write_selection(&self, field: &str, option: i64) -> Result<()>;
}

/// Authenticated client for one portal account and device
pub struct PortalClient {
    /// Portal configuration
    config: Arc<PortalConfig>,

    /// Session owner
    guard: SessionGuard,

    /// Parameter reader
    reader: Reader,

    /// Settings writer
    writer: Writer,
}

impl PortalClient {
    /// Create a client with an empty session; the first operation logs in
    pub fn new(
        config: PortalConfig,
        credentials: PortalCredentials,
        catalog: FieldCatalog,
    ) -> Result<Self> {
        Self::with_session(config, credentials, catalog, Session::new())
    }

    /// Create a client from a loaded bridge configuration
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        Self::new(
            config.portal.clone(),
            config.credentials.clone(),
            config.catalog()?,
        )
    }

    /// Create a client around an existing session
    pub fn with_session(
        config: PortalConfig,
        credentials: PortalCredentials,
        catalog: FieldCatalog,
        session: Session,
    ) -> Result<Self> {
        config.validate()?;
        let client = transport::build_client(&config)?;
        let detector = LoginDetector::new(&config.endpoints);

        let reader = Reader::new(
            client.clone(),
            config.telemetry_url()?,
            config.configuration_url()?,
            detector.clone(),
        );
        let writer = Writer::new(
            client.clone(),
            config.settings_page_url()?,
            config.settings_save_url()?,
            catalog,
            detector,
        );

        let config = Arc::new(config);
        let authenticator = Authenticator::new(client, config.clone(), credentials);

        Ok(Self {
            config,
            guard: SessionGuard::new(authenticator, session),
            reader,
            writer,
        })
    }

    /// Portal configuration in use
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Settings form catalog in use
    pub fn catalog(&self) -> &FieldCatalog {
        self.writer.catalog()
    }

    /// Copy of the current session
    pub async fn session(&self) -> Session {
        self.guard.snapshot().await
    }

    /// Make sure the session holds a usable token, logging in if needed
    pub async fn authenticate(&self) -> Result<Session> {
        self.guard.ensure_authenticated().await
    }

    /// Fetch telemetry and configuration values
    pub async fn fetch_readings(&self) -> Result<ReadingSet> {
        self.reader.fetch_readings(&self.guard).await
    }

    /// Write a raw, already formatted value to one settings field
    pub async fn write_setting(&self, field: &str, value: &str) -> Result<()> {
        self.writer
            .write(&self.guard, &WriteRequest::new(field, value))
            .await
    }

    /// Write a temperature in °C
    pub async fn write_temperature(&self, field: &str, celsius: f64) -> Result<()> {
        if !celsius.is_finite() {
            return Err(PortalError::invalid_input(format!(
                "Temperature for {field} must be a finite number"
            )));
        }
        self.write_setting(field, &format!("{celsius:.1}")).await
    }

    /// Write the option index of a select field
    pub async fn write_selection(&self, field: &str, option: i64) -> Result<()> {
        if option < 0 {
            return Err(PortalError::invalid_input(format!(
                "Option for {field} must not be negative"
            )));
        }
        self.write_setting(field, &option.to_string()).await
    }
}

#[async_trait]
impl HeatPumpPortal for PortalClient {
    async fn fetch_readings(&self) -> Result<ReadingSet> {
        PortalClient::fetch_readings(self).await
    }

    async fn write_setting(&self, field: &str, value: &str) -> Result<()> {
        PortalClient::write_setting(self, field, value).await
    }

    async fn write_temperature(&self, field: &str, celsius: f64) -> Result<()> {
        PortalClient::write_temperature(self, field, celsius).await
    }

    async fn write_selection(&self, field: &str, option: i64) -> Result<()> {
        PortalClient::write_selection(self, field, option).await
    }
}
