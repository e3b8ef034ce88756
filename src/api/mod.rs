mod client;
mod error;
mod http;
mod time;
mod types;

pub use client::JiraClient;
pub use error::{ApiError, HttpFailure, ReportedError};
pub use http::{ApiRequest, ApiResponse, BoxFuture, ReqwestHandler, RequestHandler};
pub use time::format_clock_time;
pub use types::*;
