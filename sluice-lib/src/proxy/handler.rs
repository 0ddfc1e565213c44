//! Request dispatch: admin surface, admission, then forwarding.

use std::net::SocketAddr;
use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use hyper::body::Incoming;
use hyper::{Request, Response};
use tracing::{debug, error};

use crate::clock::{Clock, MonotonicClock};
use crate::config::Config;
use crate::error::Result;
use crate::limit::{Decision, RuleRegistry};
use crate::proxy::forwarding::{build_client, forward, HttpClient, UpstreamMap};
use crate::proxy::http_result::RequestError;
use crate::proxy::synthetic_response::{empty_response, json_error};
use crate::proxy::{admin, RespBody};

const RETRY_AFTER_HEADER: &str = "x-ratelimit-retry-after";

/// `/admin` itself and everything below it.
fn is_admin_path(path: &str) -> bool {
    path.strip_prefix("/admin").map_or(false, |rest| rest.is_empty() || rest.starts_with('/'))
}

/// Shared per-gateway state: the rule registry, the upstream map, the
/// pooled upstream client and the admission clock.
pub struct Gateway {
    registry: Arc<RuleRegistry>,
    upstreams: UpstreamMap,
    client: HttpClient,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("upstreams", &self.upstreams)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(config: &Config, registry: Arc<RuleRegistry>) -> Result<Self> {
        let upstreams = UpstreamMap::from_targets(&config.gateway.targets)?;
        Ok(Self {
            registry,
            upstreams,
            client: build_client(),
            clock: Arc::new(MonotonicClock::new()),
        })
    }

    /// Substitute the admission clock; intended for tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Handle one request from `peer`. Never returns an error: every
    /// failure is converted into a synthetic response here.
    pub(crate) async fn handle(
        &self,
        req: Request<Incoming>,
        peer: SocketAddr,
    ) -> Response<RespBody> {
        // The request moves into the forwarder, so take the path by value.
        let path = req.uri().path().to_string();

        // Admin requests bypass rate limiting.
        if is_admin_path(&path) {
            return admin::handle_admin(req, &self.registry).await;
        }

        if let Some(rejection) = self.check_admission(&path, peer) {
            return rejection;
        }

        let result = match self.upstreams.select(&path) {
            Some(upstream) => forward(req, upstream, &self.client).await,
            None => Err(RequestError::NoMatchingUpstream),
        };

        match result {
            Ok(resp) => resp,
            Err(e @ RequestError::NoMatchingUpstream) => {
                debug!(path = %path, "no upstream matches request path");
                json_error(StatusCode::from(e), "service not found")
            }
            Err(e) => {
                error!(error = %e, error_type = e.error_type(), "forwarding failed");
                empty_response(StatusCode::from(e))
            }
        }
    }

    /// Run the admission check for `path`. Returns the 429 response when
    /// the request is rejected, `None` when it may proceed.
    ///
    /// The key is the raw socket peer address. Forwarded-for headers are
    /// not trusted; honoring them behind a known proxy would be an
    /// explicit opt-in.
    fn check_admission(&self, path: &str, peer: SocketAddr) -> Option<Response<RespBody>> {
        let key = peer.ip().to_string();
        match self.registry.allow(path, &key, self.clock.now()) {
            Decision::Allowed => None,
            Decision::Limited { retry_after } => {
                debug!(path, key = %key, ?retry_after, "request rate limited");
                let mut resp = empty_response(StatusCode::TOO_MANY_REQUESTS);
                let secs = retry_after.as_secs();
                resp.headers_mut().insert(
                    HeaderName::from_static(RETRY_AFTER_HEADER),
                    HeaderValue::from_str(&secs.to_string())
                        .unwrap_or_else(|_| HeaderValue::from_static("0")),
                );
                Some(resp)
            }
        }
    }
}
