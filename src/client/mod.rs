//! Authenticated session client for the heat-pump portal
//!
//! Layout, leaves first:
//!
//! - [`session`]: bearer token, expiry and cookie jar
//! - [`transport`]: redirect-free HTTP plumbing and login detection
//! - [`guard`]: ensure-authenticated and the bounded auth-retry loop
//! - [`reader`] / [`writer`] / [`form`]: the data operations
//! - [`portal`]: the [`PortalClient`] façade

pub mod form;
pub mod guard;
pub mod portal;
pub mod reader;
pub mod session;
pub mod transport;
pub mod writer;

pub use form::{FieldCatalog, FieldKind, FormField, WriteRequest};
pub use portal::{HeatPumpPortal, PortalClient};
pub use reader::{Reading, ReadingSet};
pub use session::{CookieJar, Session};
