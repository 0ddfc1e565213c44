//! Sluice: an in-process HTTP rate-limiting reverse proxy.
//!
//! The library is split along the request path: [`limit`] holds the
//! admission engine (four algorithms behind one contract plus the policy
//! registry), [`proxy`] holds the HTTP surface (server, dispatcher,
//! forwarder and admin handlers), [`config`] loads and validates the YAML
//! configuration, and [`client`] talks to the admin surface of a running
//! gateway.

#![forbid(unsafe_code)]

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod limit;
pub mod proxy;
pub mod telemetry;

pub use client::AdminClient;
pub use config::{load_from_path, Config};
pub use error::{GatewayError, Result};
pub use limit::{Algorithm, Decision, RuleConfig, RuleRegistry};
pub use proxy::{Gateway, GatewayServer};
