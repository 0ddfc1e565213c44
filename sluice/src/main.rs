#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sluice_lib::config::{load_from_path, LoggingConfig, RuleSpec};
use sluice_lib::telemetry::init_tracing;
use sluice_lib::{AdminClient, GatewayServer, Result, RuleRegistry};
use tracing::{error, info};

const INSTALL_ATTEMPTS: u32 = 3;
const INSTALL_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(author, version, about = "Rate-limiting reverse proxy")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, value_name = "FILE", default_value = "configs/config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            init_tracing(&LoggingConfig::default());
            error!(%err, config = %cli.config.display(), "failed to load configuration");
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging);
    info!(
        listen_addr = %config.gateway.listen_addr,
        targets = config.gateway.targets.len(),
        default_rules = config.default_rules.len(),
        "configuration loaded"
    );

    let registry = Arc::new(RuleRegistry::new(config.limits.max_keys_per_rule));
    let server = match GatewayServer::bind(&config, Arc::clone(&registry)).await {
        Ok(server) => server,
        Err(err) => {
            error!(%err, "failed to start gateway");
            std::process::exit(1);
        }
    };
    let addr = match server.local_addr() {
        Ok(addr) => addr,
        Err(err) => {
            error!(%err, "failed to read listen address");
            std::process::exit(1);
        }
    };

    // Default rules go through the admin surface like any other rule
    // install. The listener may not be accepting yet when this task runs
    // first, hence the bounded retry.
    let default_rules = config.default_rules.clone();
    tokio::spawn(async move {
        if let Err(err) = install_default_rules(addr, default_rules).await {
            error!(%err, "failed to install default rules");
            std::process::exit(1);
        }
    });

    if let Err(err) = server.serve().await {
        error!(%err, "gateway exited with error");
        std::process::exit(1);
    }
}

async fn install_default_rules(
    addr: SocketAddr,
    rules: BTreeMap<String, RuleSpec>,
) -> Result<()> {
    if rules.is_empty() {
        return Ok(());
    }

    let client = AdminClient::new(format!("http://{addr}"));
    for (path, spec) in &rules {
        let config = spec.rule_config()?;
        let mut last_err = None;
        for attempt in 0..INSTALL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(INSTALL_RETRY_DELAY).await;
            }
            match client.set_rule(path, spec.algorithm, config).await {
                Ok(()) => {
                    info!(
                        path = %path,
                        algorithm = %spec.algorithm,
                        window_size = %spec.window_size,
                        limit = spec.limit,
                        "default rule installed"
                    );
                    last_err = None;
                    break;
                }
                Err(err) => last_err = Some(err),
            }
        }
        if let Some(err) = last_err {
            return Err(err);
        }
    }
    Ok(())
}
