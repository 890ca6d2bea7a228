//! Heat-pump portal bridge
//!
//! This crate integrates a cloud-hosted heat-pump control portal with a
//! home-automation bridge. The portal is a server-rendered web application
//! behind an OpenID-Connect login, so there is no stable API: the client
//! replays the browser login handshake, keeps the resulting bearer token and
//! cookies alive, and re-authenticates transparently when the portal drops
//! the session.
//!
//! # Features
//!
//! - Browser-emulating OIDC login with CSRF and hidden-form scraping
//! - Token expiry tracking with proactive refresh
//! - Expiry detection from status codes, login redirects and login pages
//! - Concurrent telemetry/configuration reads merged into one reading set
//! - Single-field settings writes through the full settings form
//!
//! # Example
//!
//! ```no_run
//! use heatpump_bridge::{BridgeConfig, PortalClient};
//!
//! # async fn run() -> heatpump_bridge::Result<()> {
//! let config = BridgeConfig::load(None)?;
//! let client = PortalClient::from_config(&config)?;
//!
//! let readings = client.fetch_readings().await?;
//! for reading in readings.iter() {
//!     println!("{} = {}", reading.id, reading.value);
//! }
//!
//! client.write_temperature("_HOT_WATER_SETPOINT", 48.0).await?;
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod scrape;

// Re-export main types for convenience
pub use client::{
    FieldCatalog, FieldKind, FormField, HeatPumpPortal, PortalClient, Reading, ReadingSet,
    Session,
};
pub use config::{BridgeConfig, PortalConfig, PortalCredentials};
pub use error::{PortalError, Result};
