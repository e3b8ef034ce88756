//! Transport layer: a plain request value and the handler that sends it.

use std::future::Future;
use std::pin::Pin;

use log::debug;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use super::error::{ApiError, HttpFailure};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An outgoing request. `url` is either absolute or a path relative to the site root.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::new(Method::POST, url);
        request.body = Some(body);
        request
    }

    pub fn is_absolute(&self) -> bool {
        self.url.starts_with("http://") || self.url.starts_with("https://")
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Sends one request and reports the outcome without any retry logic
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, HttpFailure>>;
}

/// The real network handler
pub struct ReqwestHandler {
    client: Client,
}

impl ReqwestHandler {
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }
}

impl RequestHandler for ReqwestHandler {
    fn handle(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, HttpFailure>> {
        Box::pin(async move {
            debug!("{} {}", request.method, request.url);

            let mut builder = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers)
                .header(header::ACCEPT, HeaderValue::from_static("application/json"));
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| HttpFailure::Connectivity(e.to_string()))?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_success() {
                Ok(ApiResponse { status, body })
            } else {
                Err(HttpFailure::Status { status, body })
            }
        })
    }
}
