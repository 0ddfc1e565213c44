//! HTTP client for the gateway's admin surface.
//!
//! Used by the bootstrap to install configured default rules and usable
//! from tools that manage rules on a running gateway.

use std::time::Duration;

use http::{header, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::{GatewayError, Result};
use crate::limit::{Algorithm, RuleConfig};
use crate::proxy::admin::{percent_encode, RuleBody};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

type AdminHttpClient = Client<HttpConnector, Full<Bytes>>;

pub struct AdminClient {
    base: String,
    client: AdminHttpClient,
    timeout: Duration,
}

impl AdminClient {
    /// `base` is the gateway origin, e.g. `http://127.0.0.1:8080`.
    pub fn new(base: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { base: base.into(), client, timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Install or replace the rule for `path`.
    pub async fn set_rule(
        &self,
        path: &str,
        algorithm: Algorithm,
        config: RuleConfig,
    ) -> Result<()> {
        let body = RuleBody::from_rule(algorithm, config);
        let bytes = serde_json::to_vec(&body)
            .map_err(|e| GatewayError::Http(format!("failed to encode rule: {e}")))?;

        let uri = self.uri(&format!("/admin/rules?path={}", percent_encode(path)))?;
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(bytes)))
            .map_err(|e| GatewayError::Http(format!("failed to build request: {e}")))?;

        let resp = self.send(req).await?;
        if resp.status() != StatusCode::OK {
            return Err(GatewayError::Http(format!(
                "set rule failed: status={}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Fetch the rule for `path`, or `None` if absent.
    pub async fn get_rule(&self, path: &str) -> Result<Option<(Algorithm, RuleConfig)>> {
        let uri = self.uri(&format!("/admin/rules{}", percent_encode(path)))?;
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .map_err(|e| GatewayError::Http(format!("failed to build request: {e}")))?;

        let resp = self.send(req).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                let body = resp
                    .into_body()
                    .collect()
                    .await
                    .map_err(|e| GatewayError::Http(format!("failed to read body: {e}")))?
                    .to_bytes();
                let rule: RuleBody = serde_json::from_slice(&body)
                    .map_err(|e| GatewayError::Http(format!("failed to decode rule: {e}")))?;
                let config = rule.rule_config().map_err(GatewayError::Http)?;
                Ok(Some((rule.algorithm, config)))
            }
            status => Err(GatewayError::Http(format!("get rule failed: status={status}"))),
        }
    }

    /// Remove the rule for `path`. Succeeds whether or not it existed.
    pub async fn remove_rule(&self, path: &str) -> Result<()> {
        let uri = self.uri(&format!("/admin/rules{}", percent_encode(path)))?;
        let req = Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .map_err(|e| GatewayError::Http(format!("failed to build request: {e}")))?;

        let resp = self.send(req).await?;
        if resp.status() != StatusCode::OK {
            return Err(GatewayError::Http(format!(
                "remove rule failed: status={}",
                resp.status()
            )));
        }
        Ok(())
    }

    fn uri(&self, path_and_query: &str) -> Result<Uri> {
        format!("{}{path_and_query}", self.base)
            .parse()
            .map_err(|e| GatewayError::Http(format!("invalid admin URL: {e}")))
    }

    async fn send(&self, req: Request<Full<Bytes>>) -> Result<Response<Incoming>> {
        tokio::time::timeout(self.timeout, self.client.request(req))
            .await
            .map_err(|_| GatewayError::Http("admin request timed out".to_string()))?
            .map_err(|e| GatewayError::Http(format!("admin request failed: {e}")))
    }
}
