//! Configuration management for the heat-pump bridge
//!
//! Sources are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `HEATPUMP__`-prefixed environment variables
//! (`HEATPUMP__PORTAL__DEVICE_ID` sets `portal.device_id`), then the flat
//! `HEATPUMP_*` variables read by [`BridgeConfig::from_env`].

pub mod credentials;

use crate::client::form::{default_fields, FieldCatalog, FormField};
use crate::error::{PortalError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, time::Duration};
use url::Url;

pub use credentials::PortalCredentials;

/// Placeholder replaced with the configured device id in endpoint paths
pub const DEVICE_PLACEHOLDER: &str = "{device}";

/// Top-level bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Portal hosts, endpoints and HTTP behaviour
    pub portal: PortalConfig,

    /// Account credentials
    pub credentials: PortalCredentials,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Settings form catalog, in form order
    pub form_fields: Vec<FormField>,

    /// Interval between reads in `poll` mode
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

/// Portal hosts, endpoints and HTTP behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Application host (e.g. "https://portal.example.com")
    pub app_url: Url,

    /// Identity provider host
    pub identity_url: Url,

    /// Device whose parameters are read and written
    pub device_id: String,

    /// OIDC client id used for the refresh grant
    pub client_id: String,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Enable SSL/TLS verification
    pub verify_ssl: bool,

    /// Maximum redirect hops followed while reaching the login form
    pub max_redirects: usize,

    /// Page fragments that mark a rejected login
    pub error_markers: Vec<String>,

    /// Endpoint paths
    pub endpoints: EndpointPaths,
}

/// Endpoint paths, relative to the app or identity host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointPaths {
    /// App root; the bootstrap request starts here
    pub root_path: String,
    /// App OIDC callback
    pub callback_path: String,
    /// JSON telemetry values
    pub telemetry_path: String,
    /// JSON configuration values
    pub configuration_path: String,
    /// HTML settings page carrying the CSRF token
    pub settings_page_path: String,
    /// Settings form target
    pub settings_save_path: String,
    /// Identity provider login form
    pub login_path: String,
    /// Identity provider authorize endpoint
    pub authorize_path: String,
    /// Identity provider token endpoint
    pub token_path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable structured JSON logging
    pub json_format: bool,

    /// Log to file (path)
    pub file: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            credentials: PortalCredentials::default(),
            logging: LoggingConfig::default(),
            form_fields: default_fields(),
            poll_interval: Duration::from_secs(60),
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            app_url: local_url(),
            identity_url: local_url(),
            device_id: String::new(),
            client_id: "heatpump-portal".to_string(),
            timeout: Duration::from_secs(30),
            verify_ssl: true,
            max_redirects: 10,
            error_markers: vec![
                "Invalid username or password".to_string(),
                "validation-summary-errors".to_string(),
            ],
            endpoints: EndpointPaths::default(),
        }
    }
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            root_path: "/".to_string(),
            callback_path: "/signin-oidc".to_string(),
            telemetry_path: "/api/devices/{device}/telemetry".to_string(),
            configuration_path: "/api/devices/{device}/configuration".to_string(),
            settings_page_path: "/Devices/{device}/Settings".to_string(),
            settings_save_path: "/Devices/{device}/Settings/Save".to_string(),
            login_path: "/Account/Login".to_string(),
            authorize_path: "/connect/authorize".to_string(),
            token_path: "/connect/token".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file: None,
        }
    }
}

fn local_url() -> Url {
    Url::parse("http://127.0.0.1/").expect("static URL is valid")
}

impl PortalConfig {
    /// Create a config for the given hosts and device with default endpoints
    pub fn new(app_url: Url, identity_url: Url, device_id: impl Into<String>) -> Self {
        Self {
            app_url,
            identity_url,
            device_id: device_id.into(),
            ..Self::default()
        }
    }

    fn expand(&self, path: &str) -> String {
        path.replace(
            DEVICE_PLACEHOLDER,
            &urlencoding::encode(&self.device_id),
        )
    }

    /// Resolve an app path, substituting the device id
    pub fn app_endpoint(&self, path: &str) -> Result<Url> {
        let path = self.expand(path);
        self.app_url
            .join(&path)
            .map_err(|e| PortalError::config(format!("Invalid app path {path}: {e}")))
    }

    /// Resolve an identity provider path
    pub fn identity_endpoint(&self, path: &str) -> Result<Url> {
        self.identity_url
            .join(path)
            .map_err(|e| PortalError::config(format!("Invalid identity path {path}: {e}")))
    }

    pub fn root_url(&self) -> Result<Url> {
        self.app_endpoint(&self.endpoints.root_path)
    }

    pub fn callback_url(&self) -> Result<Url> {
        self.app_endpoint(&self.endpoints.callback_path)
    }

    pub fn telemetry_url(&self) -> Result<Url> {
        self.app_endpoint(&self.endpoints.telemetry_path)
    }

    pub fn configuration_url(&self) -> Result<Url> {
        self.app_endpoint(&self.endpoints.configuration_path)
    }

    pub fn settings_page_url(&self) -> Result<Url> {
        self.app_endpoint(&self.endpoints.settings_page_path)
    }

    pub fn settings_save_url(&self) -> Result<Url> {
        self.app_endpoint(&self.endpoints.settings_save_path)
    }

    pub fn login_url(&self) -> Result<Url> {
        self.identity_endpoint(&self.endpoints.login_path)
    }

    pub fn token_url(&self) -> Result<Url> {
        self.identity_endpoint(&self.endpoints.token_path)
    }

    /// Validate hosts, device id and timeouts
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("app_url", &self.app_url), ("identity_url", &self.identity_url)] {
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(PortalError::config(format!(
                    "{name} must use http or https scheme"
                )));
            }
        }

        if self.device_id.trim().is_empty() {
            return Err(PortalError::config("Device id cannot be empty"));
        }

        if self.timeout.is_zero() {
            return Err(PortalError::config("Timeout must be greater than zero"));
        }

        if self.max_redirects == 0 {
            return Err(PortalError::config("max_redirects must be at least 1"));
        }

        Ok(())
    }
}

impl BridgeConfig {
    /// Default config file location (`<config dir>/heatpump-bridge/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("heatpump-bridge").join("config.toml"))
    }

    /// Load configuration from defaults, a TOML file and the environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(default) = Self::default_path() {
                    builder = builder.add_source(File::from(default).required(false));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("HEATPUMP")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut config: BridgeConfig = builder.build()?.try_deserialize()?;
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from the flat `HEATPUMP_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("HEATPUMP_APP_URL") {
            self.portal.app_url = url
                .parse()
                .map_err(|e| PortalError::config(format!("Invalid HEATPUMP_APP_URL: {e}")))?;
        }

        if let Ok(url) = env::var("HEATPUMP_IDENTITY_URL") {
            self.portal.identity_url = url
                .parse()
                .map_err(|e| PortalError::config(format!("Invalid HEATPUMP_IDENTITY_URL: {e}")))?;
        }

        if let Ok(device_id) = env::var("HEATPUMP_DEVICE_ID") {
            self.portal.device_id = device_id;
        }

        if let Ok(client_id) = env::var("HEATPUMP_CLIENT_ID") {
            self.portal.client_id = client_id;
        }

        if let Ok(timeout) = env::var("HEATPUMP_TIMEOUT") {
            self.portal.timeout = parse_duration(&timeout)
                .map_err(|e| PortalError::config(format!("Invalid HEATPUMP_TIMEOUT: {e}")))?;
        }

        self.credentials.apply_env();

        if let Ok(level) = env::var("RUST_LOG") {
            self.logging.level = level;
        }

        if let Ok(file) = env::var("HEATPUMP_LOG_FILE") {
            self.logging.file = Some(file);
        }

        if let Ok(json) = env::var("HEATPUMP_LOG_JSON") {
            self.logging.json_format = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Settings form catalog built from `form_fields`
    pub fn catalog(&self) -> Result<FieldCatalog> {
        FieldCatalog::new(self.form_fields.clone())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.portal.validate()?;

        if self.credentials.username.trim().is_empty() {
            return Err(PortalError::config("Username cannot be empty"));
        }

        if self.poll_interval.is_zero() {
            return Err(PortalError::config("Poll interval must be greater than zero"));
        }

        self.catalog()?;
        Ok(())
    }
}

/// Parse plain seconds (`"30"`) or a humantime duration (`"1m 30s"`)
fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}
