mod loader;
mod types;

pub use loader::{load_from_path, parse_listen_addr};
pub use types::{Config, GatewayConfig, LimitsConfig, LoggingConfig, RuleSpec};
