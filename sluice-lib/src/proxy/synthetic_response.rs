use http::{header, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;

use crate::proxy::RespBody;

pub(crate) fn empty_body() -> RespBody {
    Full::new(Bytes::new()).map_err(|never| match never {}).boxed()
}

fn full_body(bytes: Bytes) -> RespBody {
    Full::new(bytes).map_err(|never| match never {}).boxed()
}

/// Build an empty-bodied response with the given status
pub(crate) fn empty_response(status: StatusCode) -> Response<RespBody> {
    let mut resp = Response::new(empty_body());
    *resp.status_mut() = status;
    resp
}

/// Build a JSON response from already-serialized bytes
pub(crate) fn json_response(status: StatusCode, body: Bytes) -> Response<RespBody> {
    let mut resp = Response::new(full_body(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Build a `{"error": ...}` JSON response
pub(crate) fn json_error(status: StatusCode, message: &str) -> Response<RespBody> {
    let payload = serde_json::json!({ "error": message });
    let body = serde_json::to_vec(&payload).unwrap_or_default();
    json_response(status, Bytes::from(body))
}
