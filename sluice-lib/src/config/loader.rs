use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use http::Uri;

use crate::config::Config;
use crate::error::{GatewayError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| GatewayError::Config(format!("Failed to read config file: {e}")))?;
    let cfg: Config = serde_yaml::from_str(&txt)
        .map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))?;

    validate_config(&cfg)?;

    Ok(cfg)
}

/// Parse a listen address, accepting the ":8080" shorthand for all
/// interfaces.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    let candidate =
        if addr.starts_with(':') { format!("0.0.0.0{addr}") } else { addr.to_string() };
    candidate
        .parse()
        .map_err(|e| GatewayError::Config(format!("invalid listen_addr {addr:?}: {e}")))
}

fn validate_config(cfg: &Config) -> Result<()> {
    parse_listen_addr(&cfg.gateway.listen_addr)?;

    for (prefix, target) in &cfg.gateway.targets {
        let uri: Uri = target.parse().map_err(|e| {
            GatewayError::InvalidUpstream(format!("target for {prefix}: {target}: {e}"))
        })?;
        if uri.scheme_str() != Some("http") || uri.authority().is_none() {
            return Err(GatewayError::InvalidUpstream(format!(
                "target for {prefix}: {target}: expected http://host:port"
            )));
        }
    }

    for (path, rule) in &cfg.default_rules {
        rule.rule_config()
            .map_err(|e| GatewayError::Config(format!("default rule for {path}: {e}")))?;
    }

    Ok(())
}
