pub mod api;
pub mod flow;
mod http;

pub mod runner;

pub use flow::{FlowKind, TargetOptions};
pub use http::{
    Error as HttpError, HttpClient, HttpRequest, HttpResponse, Result as HttpResult,
    TransportErrorKind,
};
