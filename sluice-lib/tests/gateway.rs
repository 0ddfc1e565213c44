//! End-to-end tests over real sockets: in-process upstreams behind a
//! bound gateway, driven with a plain HTTP client.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use sluice_lib::config::{Config, GatewayConfig, LimitsConfig, LoggingConfig};
use sluice_lib::limit::{Algorithm, RuleConfig};
use sluice_lib::{AdminClient, GatewayServer, RuleRegistry};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Minimal upstream that names itself in a header and echoes the path.
async fn spawn_upstream(name: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<Incoming>| async move {
                    let body = format!("{name}:{}", req.uri().path());
                    let resp = hyper::Response::builder()
                        .header("x-upstream", name)
                        .body(Full::new(Bytes::from(body)))
                        .expect("build upstream response");
                    Ok::<_, hyper::Error>(resp)
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });
    addr
}

struct TestGateway {
    addr: SocketAddr,
    registry: Arc<RuleRegistry>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TestGateway {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn spawn_gateway(targets: BTreeMap<String, String>) -> TestGateway {
    let config = Config {
        gateway: GatewayConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            targets,
            shutdown_grace_secs: 1,
        },
        default_rules: BTreeMap::new(),
        limits: LimitsConfig::default(),
        logging: LoggingConfig::default(),
    };

    let registry = Arc::new(RuleRegistry::default());
    let server = GatewayServer::bind(&config, Arc::clone(&registry)).await.expect("bind gateway");
    let addr = server.local_addr().expect("gateway addr");

    let (shutdown, mut rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        server
            .serve_with_shutdown(async move {
                let _ = rx.wait_for(|stop| *stop).await;
            })
            .await
            .expect("serve failed");
    });

    TestGateway { addr, registry, shutdown, task }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("build http client")
}

fn token_bucket_rule(window: &str, limit: u64) -> serde_json::Value {
    serde_json::json!({
        "Algorithm": "token_bucket",
        "Config": { "WindowSize": window, "Limit": limit }
    })
}

#[tokio::test]
async fn admin_rule_round_trip() {
    let gw = spawn_gateway(BTreeMap::new()).await;
    let client = client();

    let resp = client
        .post(gw.url("/admin/rules?path=/p"))
        .json(&token_bucket_rule("1s", 5))
        .send()
        .await
        .expect("post rule");
    assert_eq!(resp.status(), 200);

    let resp = client.get(gw.url("/admin/rules/p")).send().await.expect("get rule");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
        Some("application/json")
    );
    let body: serde_json::Value = resp.json().await.expect("rule body");
    assert_eq!(body, token_bucket_rule("1s", 5));

    let resp = client.delete(gw.url("/admin/rules/p")).send().await.expect("delete rule");
    assert_eq!(resp.status(), 200);

    let resp = client.get(gw.url("/admin/rules/p")).send().await.expect("get absent rule");
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn admin_client_round_trip() {
    let gw = spawn_gateway(BTreeMap::new()).await;
    let admin = AdminClient::new(format!("http://{}", gw.addr));

    let cfg = RuleConfig { window_size: Duration::from_millis(500), limit: 3 };
    admin.set_rule("/svc", Algorithm::LeakyBucket, cfg).await.expect("set rule");

    let (algorithm, stored) = admin
        .get_rule("/svc")
        .await
        .expect("get rule")
        .expect("rule present");
    assert_eq!(algorithm, Algorithm::LeakyBucket);
    assert_eq!(stored, cfg);

    admin.remove_rule("/svc").await.expect("remove rule");
    assert!(admin.get_rule("/svc").await.expect("get rule").is_none());
}

#[tokio::test]
async fn routes_to_longest_matching_prefix() {
    let a = spawn_upstream("a").await;
    let b = spawn_upstream("b").await;
    let mut targets = BTreeMap::new();
    targets.insert("/api".to_string(), format!("http://{a}"));
    targets.insert("/api/v2".to_string(), format!("http://{b}"));
    let gw = spawn_gateway(targets).await;
    let client = client();

    let resp = client.get(gw.url("/api/v2/foo")).send().await.expect("request /api/v2/foo");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-upstream").and_then(|v| v.to_str().ok()), Some("b"));
    assert_eq!(resp.text().await.expect("body"), "b:/api/v2/foo");

    let resp = client.get(gw.url("/api/v1/bar")).send().await.expect("request /api/v1/bar");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-upstream").and_then(|v| v.to_str().ok()), Some("a"));
}

#[tokio::test]
async fn rate_limited_request_gets_429() {
    let a = spawn_upstream("a").await;
    let mut targets = BTreeMap::new();
    targets.insert("/api".to_string(), format!("http://{a}"));
    let gw = spawn_gateway(targets).await;
    let client = client();

    let rule = serde_json::json!({
        "Algorithm": "sliding_window",
        "Config": { "WindowSize": "30s", "Limit": 2 }
    });
    let resp = client
        .post(gw.url("/admin/rules?path=/api/limited"))
        .json(&rule)
        .send()
        .await
        .expect("post rule");
    assert_eq!(resp.status(), 200);

    for i in 0..2 {
        let resp = client.get(gw.url("/api/limited")).send().await.expect("request");
        assert_eq!(resp.status(), 200, "request {i} should be admitted");
    }

    let resp = client.get(gw.url("/api/limited")).send().await.expect("limited request");
    assert_eq!(resp.status(), 429);
    let retry_after: u64 = resp
        .headers()
        .get("x-ratelimit-retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("retry-after header");
    assert!((1..=30).contains(&retry_after), "retry-after {retry_after} out of range");
    assert!(resp.bytes().await.expect("body").is_empty());

    // Other paths are unaffected.
    let resp = client.get(gw.url("/api/other")).send().await.expect("other path");
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn unknown_path_is_never_limited() {
    let a = spawn_upstream("a").await;
    let mut targets = BTreeMap::new();
    targets.insert("/".to_string(), format!("http://{a}"));
    let gw = spawn_gateway(targets).await;
    let client = client();

    for i in 0..50 {
        let resp = client.get(gw.url("/q")).send().await.expect("request");
        assert_eq!(resp.status(), 200, "request {i} should pass through");
    }
}

#[tokio::test]
async fn unmatched_prefix_returns_json_404() {
    let gw = spawn_gateway(BTreeMap::new()).await;
    let client = client();

    let resp = client.get(gw.url("/nowhere")).send().await.expect("request");
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.expect("error body");
    assert_eq!(body, serde_json::json!({ "error": "service not found" }));
}

#[tokio::test]
async fn dead_upstream_returns_502() {
    // Bind and immediately drop a listener to get a port nothing serves.
    let dead = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr")
    };
    let mut targets = BTreeMap::new();
    targets.insert("/api".to_string(), format!("http://{dead}"));
    let gw = spawn_gateway(targets).await;
    let client = client();

    let resp = client.get(gw.url("/api/x")).send().await.expect("request");
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn admin_rejects_bad_requests() {
    let gw = spawn_gateway(BTreeMap::new()).await;
    let client = client();

    // Missing path query parameter.
    let resp = client
        .post(gw.url("/admin/rules"))
        .json(&token_bucket_rule("1s", 5))
        .send()
        .await
        .expect("post without path");
    assert_eq!(resp.status(), 400);

    // Malformed body.
    let resp = client
        .post(gw.url("/admin/rules?path=/p"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("post malformed body");
    assert_eq!(resp.status(), 400);

    // Unknown algorithm.
    let resp = client
        .post(gw.url("/admin/rules?path=/p"))
        .json(&serde_json::json!({
            "Algorithm": "roulette",
            "Config": { "WindowSize": "1s", "Limit": 5 }
        }))
        .send()
        .await
        .expect("post unknown algorithm");
    assert_eq!(resp.status(), 400);

    // Bad duration string.
    let resp = client
        .post(gw.url("/admin/rules?path=/p"))
        .json(&token_bucket_rule("soon", 5))
        .send()
        .await
        .expect("post bad duration");
    assert_eq!(resp.status(), 400);

    // Zero limit fails validation.
    let resp = client
        .post(gw.url("/admin/rules?path=/p"))
        .json(&token_bucket_rule("1s", 0))
        .send()
        .await
        .expect("post zero limit");
    assert_eq!(resp.status(), 400);

    // Nothing was installed along the way.
    assert_eq!(gw.registry.rule_count(), 0);

    // Unknown admin path.
    let resp = client.get(gw.url("/admin/nope")).send().await.expect("unknown admin path");
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn graceful_shutdown_releases_policies() {
    let gw = spawn_gateway(BTreeMap::new()).await;
    let client = client();

    let resp = client
        .post(gw.url("/admin/rules?path=/p"))
        .json(&token_bucket_rule("1s", 5))
        .send()
        .await
        .expect("post rule");
    assert_eq!(resp.status(), 200);
    assert_eq!(gw.registry.rule_count(), 1);

    gw.shutdown.send(true).expect("signal shutdown");
    tokio::time::timeout(Duration::from_secs(5), gw.task)
        .await
        .expect("shutdown within grace period")
        .expect("serve task");

    assert_eq!(gw.registry.rule_count(), 0);
}
