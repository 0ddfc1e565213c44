//! Admin surface: install, query and remove rate-limit rules as JSON
//! over HTTP.
//!
//! - `POST /admin/rules?path=<urlencoded>` with a [`RuleBody`] installs
//!   or replaces a rule.
//! - `GET /admin/rules/<path>` returns the rule or 404.
//! - `DELETE /admin/rules/<path>` removes the rule; 200 either way.
//!
//! Requests under `/admin` are never rate limited.

use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::limit::{Algorithm, LimitError, RuleConfig, RuleRegistry};
use crate::proxy::synthetic_response::{empty_response, json_error, json_response};
use crate::proxy::RespBody;

const RULES_PATH: &str = "/admin/rules";

/// Wire form of a rule. Durations travel as human-readable strings
/// ("500ms", "1s", "1m").
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RuleBody {
    #[serde(rename = "Algorithm")]
    pub algorithm: Algorithm,
    #[serde(rename = "Config")]
    pub config: RuleBodyConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RuleBodyConfig {
    #[serde(rename = "WindowSize")]
    pub window_size: String,
    #[serde(rename = "Limit")]
    pub limit: u64,
}

impl RuleBody {
    pub(crate) fn from_rule(algorithm: Algorithm, config: RuleConfig) -> Self {
        Self {
            algorithm,
            config: RuleBodyConfig {
                window_size: humantime::format_duration(config.window_size).to_string(),
                limit: config.limit,
            },
        }
    }

    pub(crate) fn rule_config(&self) -> Result<RuleConfig, String> {
        let window_size = humantime::parse_duration(&self.config.window_size)
            .map_err(|e| format!("invalid WindowSize {:?}: {e}", self.config.window_size))?;
        Ok(RuleConfig { window_size, limit: self.config.limit })
    }
}

pub(crate) async fn handle_admin(
    req: Request<Incoming>,
    registry: &RuleRegistry,
) -> Response<RespBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if path == RULES_PATH {
        if method == Method::POST {
            return add_rule(req, registry).await;
        }
        return json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    }

    if let Some(rest) = path.strip_prefix(RULES_PATH) {
        if rest.starts_with('/') {
            let rule_path = percent_decode(rest);
            return match method {
                Method::GET => get_rule(&rule_path, registry),
                Method::DELETE => remove_rule(&rule_path, registry),
                _ => json_error(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
            };
        }
    }

    json_error(StatusCode::NOT_FOUND, "not found")
}

async fn add_rule(req: Request<Incoming>, registry: &RuleRegistry) -> Response<RespBody> {
    let query = req.uri().query().map(str::to_owned);
    let Some(path) = query_param(query.as_deref(), "path") else {
        return json_error(StatusCode::BAD_REQUEST, "path is required");
    };

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return json_error(StatusCode::BAD_REQUEST, &format!("failed to read body: {e}"))
        }
    };
    let rule: RuleBody = match serde_json::from_slice(&body) {
        Ok(rule) => rule,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let config = match rule.rule_config() {
        Ok(config) => config,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e),
    };

    match registry.add_rule(&path, rule.algorithm, config) {
        Ok(()) => {
            info!(path = %path, algorithm = %rule.algorithm, limit = config.limit, "rule installed");
            empty_response(StatusCode::OK)
        }
        Err(e @ LimitError::InvalidConfig(_)) => {
            json_error(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn get_rule(path: &str, registry: &RuleRegistry) -> Response<RespBody> {
    match registry.get_rule(path) {
        Some((algorithm, config)) => {
            let body = RuleBody::from_rule(algorithm, config);
            match serde_json::to_vec(&body) {
                Ok(bytes) => json_response(StatusCode::OK, Bytes::from(bytes)),
                Err(e) => json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("failed to encode rule: {e}"),
                ),
            }
        }
        None => json_error(StatusCode::NOT_FOUND, "rule not found"),
    }
}

fn remove_rule(path: &str, registry: &RuleRegistry) -> Response<RespBody> {
    registry.remove_rule(path);
    info!(path = %path, "rule removed");
    empty_response(StatusCode::OK)
}

/// Extract a percent-decoded query parameter. Empty values count as
/// missing, matching the original surface's "path is required" check.
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = match parts.next() {
            Some(key) => key,
            None => continue,
        };
        if key == name {
            let value = parts.next().unwrap_or("");
            let decoded = percent_decode(&value.replace('+', " "));
            if decoded.is_empty() {
                return None;
            }
            return Some(decoded);
        }
    }
    None
}

fn hex_val(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|v| v as u8)
}

/// Decode %XX escapes, leaving malformed escapes untouched.
pub(crate) fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Encode everything outside the unreserved set; '/' is left alone so
/// encoded paths stay readable in both query strings and path segments.
pub(crate) fn percent_encode(input: &str) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_escapes() {
        assert_eq!(percent_decode("%2Fapi%2Fv1"), "/api/v1");
        assert_eq!(percent_decode("/plain"), "/plain");
        assert_eq!(percent_decode("a%20b"), "a b");
    }

    #[test]
    fn leaves_malformed_escapes() {
        assert_eq!(percent_decode("%2"), "%2");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("100%"), "100%");
    }

    #[test]
    fn encode_round_trips() {
        let original = "/api/v1/users?x=1 2";
        assert_eq!(percent_decode(&percent_encode(original)), original);
    }

    #[test]
    fn query_param_lookup() {
        assert_eq!(query_param(Some("path=%2Fp&x=1"), "path").as_deref(), Some("/p"));
        assert_eq!(query_param(Some("x=1"), "path"), None);
        assert_eq!(query_param(Some("path="), "path"), None);
        assert_eq!(query_param(None, "path"), None);
    }
}
