//! Error model for requests sent through the authenticated pipeline.

use reqwest::{Method, StatusCode};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// How a single dispatch failed, before the pipeline decides what to do about it
#[derive(Debug, Clone)]
pub enum HttpFailure {
    /// No response at all (DNS, refused connection, TLS, dropped socket)
    Connectivity(String),
    Status { status: StatusCode, body: String },
}

impl HttpFailure {
    /// True for failures that a fresh sign-in may cure
    pub fn is_auth_related(&self) -> bool {
        match self {
            HttpFailure::Connectivity(_) => true,
            HttpFailure::Status { status, .. } => {
                *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
            }
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpFailure::Connectivity(_) => None,
            HttpFailure::Status { status, .. } => Some(*status),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{method} {url} failed: HTTP {status}: {body}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("{method} {url} failed: no response ({message})")]
    Connectivity {
        method: Method,
        url: String,
        message: String,
    },
    #[error("not signed in")]
    NotSignedIn,
    #[error("sign-in state closed while a request was waiting to be retried")]
    AuthClosed,
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("http client setup failed: {0}")]
    Build(#[from] reqwest::Error),
    #[error("credential cannot be sent as a header: {0}")]
    Credential(#[from] reqwest::header::InvalidHeaderValue),
}

impl ApiError {
    pub fn from_failure(method: &Method, url: &str, failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Connectivity(message) => ApiError::Connectivity {
                method: method.clone(),
                url: url.to_string(),
                message,
            },
            HttpFailure::Status { status, body } => ApiError::Status {
                method: method.clone(),
                url: url.to_string(),
                status,
                body,
            },
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Snapshot of a failure published on the application-wide error channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub status: Option<u16>,
    pub message: String,
}

impl ReportedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl From<&ApiError> for ReportedError {
    fn from(err: &ApiError) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ReportedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{}] {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}
