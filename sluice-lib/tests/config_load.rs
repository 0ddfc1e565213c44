use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sluice_lib::config::{load_from_path, parse_listen_addr};
use sluice_lib::limit::Algorithm;

fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos();
    std::env::temp_dir().join(format!("sluice-{nanos}-{name}.yaml"))
}

fn load(name: &str, yaml: &str) -> sluice_lib::Result<sluice_lib::Config> {
    let path = tmp_path(name);
    fs::write(&path, yaml).expect("write config");
    let result = load_from_path(&path);
    let _ = fs::remove_file(&path);
    result
}

#[test]
fn loads_minimal_config() {
    let cfg = load(
        "minimal",
        r#"
gateway:
  listen_addr: "127.0.0.1:0"
"#,
    )
    .expect("minimal config loads");

    assert_eq!(cfg.gateway.listen_addr, "127.0.0.1:0");
    assert!(cfg.gateway.targets.is_empty());
    assert!(cfg.default_rules.is_empty());
    assert_eq!(cfg.limits.max_keys_per_rule, 100_000);
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.gateway.shutdown_grace_secs, 30);
}

#[test]
fn loads_targets_and_rules() {
    let cfg = load(
        "full",
        r#"
gateway:
  listen_addr: ":8080"
  targets:
    "/api/v1": "http://127.0.0.1:8081"
    "/api/v2": "http://127.0.0.1:8082"
default_rules:
  "/api/v1/users":
    algorithm: "token_bucket"
    window_size: "1m"
    limit: 100
limits:
  max_keys_per_rule: 500
"#,
    )
    .expect("full config loads");

    assert_eq!(cfg.gateway.targets.len(), 2);
    assert_eq!(cfg.limits.max_keys_per_rule, 500);

    let spec = cfg.default_rules.get("/api/v1/users").expect("rule present");
    assert_eq!(spec.algorithm, Algorithm::TokenBucket);
    let rule_config = spec.rule_config().expect("rule config parses");
    assert_eq!(rule_config.window_size, Duration::from_secs(60));
    assert_eq!(rule_config.limit, 100);
}

#[test]
fn listen_addr_shorthand() {
    let addr = parse_listen_addr(":8080").expect("shorthand parses");
    assert_eq!(addr.to_string(), "0.0.0.0:8080");

    let addr = parse_listen_addr("127.0.0.1:9000").expect("full form parses");
    assert_eq!(addr.to_string(), "127.0.0.1:9000");

    assert!(parse_listen_addr("not-an-addr").is_err());
}

#[test]
fn rejects_bad_duration() {
    let err = load(
        "bad-duration",
        r#"
gateway:
  listen_addr: "127.0.0.1:0"
default_rules:
  "/p":
    algorithm: "token_bucket"
    window_size: "soon"
    limit: 5
"#,
    )
    .expect_err("bad duration rejected");
    assert!(err.to_string().contains("window_size"));
}

#[test]
fn rejects_unknown_algorithm() {
    let err = load(
        "bad-algorithm",
        r#"
gateway:
  listen_addr: "127.0.0.1:0"
default_rules:
  "/p":
    algorithm: "roulette"
    window_size: "1s"
    limit: 5
"#,
    )
    .expect_err("unknown algorithm rejected");
    assert!(err.to_string().contains("parse"));
}

#[test]
fn rejects_zero_limit() {
    let err = load(
        "zero-limit",
        r#"
gateway:
  listen_addr: "127.0.0.1:0"
default_rules:
  "/p":
    algorithm: "sliding_log"
    window_size: "1s"
    limit: 0
"#,
    )
    .expect_err("zero limit rejected");
    assert!(err.to_string().contains("limit"));
}

#[test]
fn rejects_malformed_target() {
    let err = load(
        "bad-target",
        r#"
gateway:
  listen_addr: "127.0.0.1:0"
  targets:
    "/api": "ftp://127.0.0.1:21"
"#,
    )
    .expect_err("non-http target rejected");
    assert!(err.to_string().contains("http"));
}

#[test]
fn rejects_missing_gateway_section() {
    let err = load("no-gateway", "default_rules: {}\n").expect_err("missing gateway rejected");
    assert!(err.to_string().contains("parse"));
}
