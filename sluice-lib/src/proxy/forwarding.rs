//! Upstream selection and request forwarding.

use std::collections::BTreeMap;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName};
use http::{header, Request, Response, Uri};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::{GatewayError, Result};
use crate::proxy::http_result::{HttpResult, RequestError};
use crate::proxy::RespBody;

pub type HttpClient = Client<HttpConnector, Incoming>;

/// Hop-by-hop headers are stripped on both legs of the proxy.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// One upstream origin reachable under a path prefix.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub prefix: String,
    pub origin: Uri,
}

/// Prefix-to-origin map with deterministic longest-prefix selection.
///
/// Prefixes are sorted by descending length (lexicographic among equal
/// lengths), so the first match is always the most specific one
/// regardless of configuration order.
#[derive(Debug, Clone, Default)]
pub struct UpstreamMap {
    upstreams: Vec<Upstream>,
}

impl UpstreamMap {
    pub fn from_targets(targets: &BTreeMap<String, String>) -> Result<Self> {
        let mut upstreams = Vec::with_capacity(targets.len());
        for (prefix, target) in targets {
            let origin: Uri = target
                .parse()
                .map_err(|e| GatewayError::InvalidUpstream(format!("{target}: {e}")))?;
            if origin.scheme_str() != Some("http") || origin.authority().is_none() {
                return Err(GatewayError::InvalidUpstream(format!(
                    "{target}: expected http://host:port"
                )));
            }
            upstreams.push(Upstream { prefix: prefix.clone(), origin });
        }
        upstreams.sort_by(|a, b| {
            b.prefix.len().cmp(&a.prefix.len()).then_with(|| a.prefix.cmp(&b.prefix))
        });
        Ok(Self { upstreams })
    }

    /// Longest matching prefix for `path`, if any.
    pub fn select(&self, path: &str) -> Option<&Upstream> {
        self.upstreams.iter().find(|u| path.starts_with(&u.prefix))
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}

/// Build the shared upstream client. Connections are pooled per origin
/// with an idle keep-alive, so repeated requests skip the TCP handshake.
pub(crate) fn build_client() -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_keepalive(Some(Duration::from_secs(60)));
    Client::builder(TokioExecutor::new()).build(connector)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // The Connection header may name additional hop-by-hop headers.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| name.trim().parse::<HeaderName>().ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Forward an admitted request to `upstream`, streaming the response
/// back. Method, path, query and body pass through unchanged; only the
/// scheme and authority are rewritten.
pub(crate) async fn forward(
    req: Request<Incoming>,
    upstream: &Upstream,
    client: &HttpClient,
) -> HttpResult<Response<RespBody>> {
    let authority = upstream.origin.authority().cloned().ok_or_else(|| {
        RequestError::Internal(format!("upstream {} has no authority", upstream.origin))
    })?;
    let path_and_query =
        req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/").to_string();

    let uri = Uri::builder()
        .scheme("http")
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| RequestError::Internal(format!("failed to build upstream URI: {e}")))?;

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    strip_hop_by_hop(&mut parts.headers);
    let out_req = Request::from_parts(parts, body);

    let resp = client
        .request(out_req)
        .await
        .map_err(|e| RequestError::UpstreamUnavailable(e.to_string()))?;

    let mut resp = resp.map(|b| b.boxed());
    strip_hop_by_hop(resp.headers_mut());
    Ok(resp)
}
