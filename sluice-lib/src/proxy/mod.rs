pub(crate) mod admin;
pub mod forwarding;
pub mod handler;
pub(crate) mod http_result;
pub mod server;
pub(crate) mod synthetic_response;

pub use handler::Gateway;
pub use server::GatewayServer;

pub(crate) type RespBody = http_body_util::combinators::BoxBody<bytes::Bytes, hyper::Error>;
