use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};

use super::AuthState;
use crate::api::{ApiError, ApiRequest, ApiResponse, BoxFuture, HttpFailure, ReportedError, RequestHandler};

/// Identity endpoint; the authentication flow retries it on its own
pub const MYSELF_PATH: &str = "/rest/api/3/myself";

/// `GET /rest/api/3/issue/{KEY}?...`, where a 404 only means the key does not exist
const ISSUE_LOOKUP_PATTERN: &str = r"/rest/api/3/issue/[A-Za-z][A-Za-z0-9_]*-[1-9][0-9]*\?";

static ISSUE_LOOKUP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(ISSUE_LOOKUP_PATTERN).expect("invalid issue lookup regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recovery {
    /// Wait for a fresh sign-in, then send the original request again
    RetryAfterSignIn,
    /// Resolve with no response
    Drop,
    /// Hand the error back to the caller
    Propagate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Disposition {
    report: bool,
    recovery: Recovery,
}

/// `failure` is `None` when there was no credential to send the request with.
fn classify(request: &ApiRequest, failure: Option<&HttpFailure>) -> Disposition {
    let auth_related = failure.map_or(true, HttpFailure::is_auth_related);
    let identity = request.url == MYSELF_PATH;

    let recovery = match (auth_related, identity) {
        (true, true) => Recovery::Drop,
        (true, false) => Recovery::RetryAfterSignIn,
        (false, _) => Recovery::Propagate,
    };

    let report = match failure {
        _ if recovery == Recovery::Drop => false,
        Some(failure) => !is_missing_issue(request, failure),
        None => true,
    };

    Disposition { report, recovery }
}

fn is_missing_issue(request: &ApiRequest, failure: &HttpFailure) -> bool {
    failure.status() == Some(StatusCode::NOT_FOUND)
        && request.method == Method::GET
        && ISSUE_LOOKUP_REGEX.is_match(&request.url)
}

/// Sends every API request with the stored credential and recovers from
/// authorization failures by waiting for the next sign-in.
pub struct AuthInterceptor {
    state: Arc<AuthState>,
    handler: Arc<dyn RequestHandler>,
}

impl AuthInterceptor {
    pub fn new(state: Arc<AuthState>, handler: Arc<dyn RequestHandler>) -> Self {
        Self { state, handler }
    }

    pub fn state(&self) -> &Arc<AuthState> {
        &self.state
    }

    /// Resolves to `Ok(None)` when the request was dropped.
    pub fn intercept(&self, request: ApiRequest) -> BoxFuture<'_, Result<Option<ApiResponse>, ApiError>> {
        Box::pin(async move {
            let failure = match self.state.auth_info() {
                Some(auth_info) => {
                    let mut rewritten = request.clone();
                    if !rewritten.is_absolute() {
                        rewritten.url = format!("{}{}", auth_info.base_url(), rewritten.url);
                    }
                    let mut credential = HeaderValue::from_str(&auth_info.auth_header())?;
                    credential.set_sensitive(true);
                    rewritten.headers.insert(AUTHORIZATION, credential);

                    match self.handler.handle(rewritten).await {
                        Ok(response) => return Ok(Some(response)),
                        Err(failure) => Some(failure),
                    }
                }
                None => None,
            };

            self.recover(request, failure).await
        })
    }

    async fn recover(
        &self,
        request: ApiRequest,
        failure: Option<HttpFailure>,
    ) -> Result<Option<ApiResponse>, ApiError> {
        let disposition = classify(&request, failure.as_ref());
        let error = match failure {
            Some(failure) => ApiError::from_failure(&request.method, &request.url, failure),
            None => ApiError::NotSignedIn,
        };

        if disposition.report {
            self.state.report(ReportedError::from(&error));
        }

        match disposition.recovery {
            Recovery::Propagate => Err(error),
            Recovery::Drop => {
                debug!("dropping {} {}: {}", request.method, request.url, error);
                Ok(None)
            }
            Recovery::RetryAfterSignIn => {
                debug!("{} {} waits for sign-in: {}", request.method, request.url, error);
                {
                    let _parked = self.state.begin_wait();
                    self.wait_for_fresh_user().await?;
                }
                self.intercept(request).await
            }
        }
    }

    async fn wait_for_fresh_user(&self) -> Result<(), ApiError> {
        let mut users = self.state.subscribe_user();
        // Whatever is current now is stale; only a later sign-in counts
        users.borrow_and_update();
        loop {
            users.changed().await.map_err(|_| ApiError::AuthClosed)?;
            let signed_in = users.borrow_and_update().is_some();
            if signed_in {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::User;
    use crate::auth::AuthInfo;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedHandler {
        replies: Mutex<VecDeque<Result<ApiResponse, HttpFailure>>>,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedHandler {
        fn with(replies: Vec<Result<ApiResponse, HttpFailure>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            })
        }

        fn seen(&self) -> Vec<ApiRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl RequestHandler for ScriptedHandler {
        fn handle(&self, request: ApiRequest) -> BoxFuture<'_, Result<ApiResponse, HttpFailure>> {
            self.seen.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(HttpFailure::Connectivity("script exhausted".into())));
            Box::pin(async move { reply })
        }
    }

    fn ok(body: &str) -> Result<ApiResponse, HttpFailure> {
        Ok(ApiResponse {
            status: StatusCode::OK,
            body: body.to_string(),
        })
    }

    fn status(code: u16) -> Result<ApiResponse, HttpFailure> {
        Err(HttpFailure::Status {
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        })
    }

    fn user() -> User {
        User {
            account_id: "abc".into(),
            display_name: Some("Dana".into()),
            email_address: None,
        }
    }

    fn signed_in_state() -> Arc<AuthState> {
        let state = Arc::new(AuthState::new());
        state.sign_in(AuthInfo::new("https://acme.atlassian.net", "dev@acme.test", "tok"));
        state
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn relative_urls_get_base_and_header() {
        let handler = ScriptedHandler::with(vec![ok("{}"), ok("{}")]);
        let pipeline = AuthInterceptor::new(signed_in_state(), handler.clone());

        pipeline.intercept(ApiRequest::get("/rest/api/3/project")).await.unwrap();
        pipeline.intercept(ApiRequest::get("https://other.test/x")).await.unwrap();

        let seen = handler.seen();
        assert_eq!(seen[0].url, "https://acme.atlassian.net/rest/api/3/project");
        assert_eq!(seen[1].url, "https://other.test/x");
        let credential = seen[0].headers.get(AUTHORIZATION).unwrap();
        assert!(credential.to_str().unwrap().starts_with("Basic "));
        assert!(credential.is_sensitive());
    }

    #[tokio::test]
    async fn missing_issue_404_is_not_reported() {
        let state = signed_in_state();
        let handler = ScriptedHandler::with(vec![status(404)]);
        let pipeline = AuthInterceptor::new(state.clone(), handler);

        let result = pipeline.intercept(ApiRequest::get("/rest/api/3/issue/ABC-123?x=1")).await;

        assert_eq!(result.unwrap_err().status(), Some(StatusCode::NOT_FOUND));
        assert!(state.last_error().is_none());
    }

    #[tokio::test]
    async fn malformed_issue_key_404_is_reported() {
        let state = signed_in_state();
        let handler = ScriptedHandler::with(vec![status(404)]);
        let pipeline = AuthInterceptor::new(state.clone(), handler);

        let result = pipeline.intercept(ApiRequest::get("/rest/api/3/issue/ABC-0?x=1")).await;

        assert!(result.is_err());
        assert_eq!(state.last_error().and_then(|e| e.status), Some(404));
    }

    #[tokio::test]
    async fn issue_404_on_post_is_reported() {
        let state = signed_in_state();
        let handler = ScriptedHandler::with(vec![status(404)]);
        let pipeline = AuthInterceptor::new(state.clone(), handler);

        let request = ApiRequest::post("/rest/api/3/issue/ABC-123?x=1", serde_json::json!({}));
        assert!(pipeline.intercept(request).await.is_err());
        assert!(state.last_error().is_some());
    }

    #[tokio::test]
    async fn server_error_propagates_and_is_reported() {
        let state = signed_in_state();
        let handler = ScriptedHandler::with(vec![status(500)]);
        let pipeline = AuthInterceptor::new(state.clone(), handler.clone());

        let result = pipeline.intercept(ApiRequest::get("/rest/api/3/search")).await;

        assert_eq!(result.unwrap_err().status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(state.last_error().and_then(|e| e.status), Some(500));
        assert_eq!(handler.seen().len(), 1);
    }

    #[tokio::test]
    async fn identity_endpoint_auth_failure_is_dropped() {
        let state = signed_in_state();
        let handler = ScriptedHandler::with(vec![status(403)]);
        let pipeline = AuthInterceptor::new(state.clone(), handler.clone());

        let result = pipeline.intercept(ApiRequest::get(MYSELF_PATH)).await;

        assert!(matches!(result, Ok(None)));
        assert_eq!(handler.seen().len(), 1);
        assert!(state.last_error().is_none());
    }

    #[tokio::test]
    async fn identity_endpoint_without_credential_is_dropped() {
        let state = Arc::new(AuthState::new());
        let handler = ScriptedHandler::with(vec![ok("{}")]);
        let pipeline = AuthInterceptor::new(state.clone(), handler.clone());

        let result = pipeline.intercept(ApiRequest::get(MYSELF_PATH)).await;

        assert!(matches!(result, Ok(None)));
        assert!(handler.seen().is_empty());
        assert!(state.last_error().is_none());
        assert_eq!(state.waiting_for_sign_in(), 0);
    }

    #[tokio::test]
    async fn parked_requests_are_counted_until_released() {
        let state = signed_in_state();
        state.set_user(Some(user()));
        let handler = ScriptedHandler::with(vec![
            Err(HttpFailure::Connectivity("blip".into())),
            ok("{}"),
        ]);
        let pipeline = Arc::new(AuthInterceptor::new(state.clone(), handler));

        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.intercept(ApiRequest::get("/rest/api/3/project")).await })
        };
        settle().await;
        assert_eq!(state.waiting_for_sign_in(), 1);
        // Still signed in, so only the count shows the request is stuck
        assert!(state.user().is_some());

        state.set_user(Some(user()));
        assert!(task.await.unwrap().unwrap().is_some());
        assert_eq!(state.waiting_for_sign_in(), 0);
    }

    #[tokio::test]
    async fn aborted_wait_releases_its_count() {
        let state = signed_in_state();
        let handler = ScriptedHandler::with(vec![status(401)]);
        let pipeline = Arc::new(AuthInterceptor::new(state.clone(), handler));

        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.intercept(ApiRequest::get("/rest/api/3/project")).await })
        };
        settle().await;
        assert_eq!(state.waiting_for_sign_in(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(state.waiting_for_sign_in(), 0);
    }

    #[tokio::test]
    async fn no_credential_retries_only_after_fresh_sign_in() {
        let state = Arc::new(AuthState::new());
        // Stale value present before the request fails
        state.set_user(Some(user()));
        let handler = ScriptedHandler::with(vec![ok(r#"{"ok":true}"#)]);
        let pipeline = Arc::new(AuthInterceptor::new(state.clone(), handler.clone()));

        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.intercept(ApiRequest::get("/rest/api/3/project")).await })
        };
        settle().await;
        assert!(!task.is_finished());
        assert!(matches!(state.last_error(), Some(ReportedError { status: None, .. })));
        assert!(handler.seen().is_empty());

        // A sign-out does not release the request
        state.set_user(None);
        settle().await;
        assert!(!task.is_finished());

        state.sign_in(AuthInfo::new("https://acme.atlassian.net", "dev@acme.test", "tok"));
        state.set_user(Some(user()));

        let response = task.await.unwrap().unwrap().expect("response");
        assert_eq!(response.body, r#"{"ok":true}"#);

        let seen = handler.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "https://acme.atlassian.net/rest/api/3/project");
        assert_eq!(seen[0].headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[tokio::test]
    async fn unauthorized_retries_original_request_once_signed_in() {
        let state = signed_in_state();
        let handler = ScriptedHandler::with(vec![status(401), ok("{}")]);
        let pipeline = Arc::new(AuthInterceptor::new(state.clone(), handler.clone()));

        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.intercept(ApiRequest::get("/rest/api/3/project")).await })
        };
        settle().await;
        assert!(!task.is_finished());
        assert_eq!(state.last_error().and_then(|e| e.status), Some(401));

        state.sign_in(AuthInfo::new("https://moved.atlassian.net", "dev@acme.test", "new"));
        state.set_user(Some(user()));

        assert!(task.await.unwrap().unwrap().is_some());
        let seen = handler.seen();
        assert_eq!(seen.len(), 2);
        // Replayed from the original relative path against the new site
        assert_eq!(seen[1].url, "https://moved.atlassian.net/rest/api/3/project");
    }

    #[tokio::test]
    async fn connectivity_failure_waits_for_sign_in() {
        let state = signed_in_state();
        let handler = ScriptedHandler::with(vec![Err(HttpFailure::Connectivity("refused".into()))]);
        let pipeline = Arc::new(AuthInterceptor::new(state.clone(), handler));

        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.intercept(ApiRequest::get("/rest/api/3/project")).await })
        };
        settle().await;
        assert!(!task.is_finished());
        assert!(state.last_error().is_some());
        task.abort();
    }

    #[test]
    fn issue_lookup_pattern() {
        let lookup = |url: &str| ISSUE_LOOKUP_REGEX.is_match(url);
        assert!(lookup("/rest/api/3/issue/ABC-123?fields=summary"));
        assert!(lookup("/rest/api/3/issue/a_1-9?x"));
        assert!(!lookup("/rest/api/3/issue/ABC-0?x=1"));
        assert!(!lookup("/rest/api/3/issue/1AB-12?x=1"));
        assert!(!lookup("/rest/api/3/issue/ABC-12"));
    }
}
