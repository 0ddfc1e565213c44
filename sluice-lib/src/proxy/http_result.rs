use http::StatusCode;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response
/// RequestError is converted into a synthetic response at the handler
/// boundary
pub(crate) type HttpResult<T> = std::result::Result<T, RequestError>;

/// Describes things that can go wrong on the proxied request path
#[derive(Debug, Error, Clone)]
pub enum RequestError {
    #[error("no upstream matches request path")]
    NoMatchingUpstream,

    #[error("upstream request failed: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RequestError> for StatusCode {
    fn from(e: RequestError) -> StatusCode {
        match e {
            RequestError::NoMatchingUpstream => StatusCode::NOT_FOUND,
            RequestError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            RequestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl RequestError {
    /// Returns a string identifier for the error type, useful for logging
    pub fn error_type(&self) -> &'static str {
        match self {
            RequestError::NoMatchingUpstream => "no_matching_upstream",
            RequestError::UpstreamUnavailable(_) => "upstream_unavailable",
            RequestError::Internal(_) => "internal",
        }
    }
}
