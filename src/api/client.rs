use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use log::{debug, info};
use reqwest::StatusCode;

use super::error::{ApiError, ReportedError, Result};
use super::http::{ApiRequest, ApiResponse, RequestHandler};
use super::types::*;
use crate::auth::{AuthInterceptor, AuthState, MYSELF_PATH};

const ISSUE_FIELDS: &str = "summary,parent,components";

/// Jira REST client; every call goes through the authenticated pipeline
#[derive(Clone)]
pub struct JiraClient {
    pipeline: Arc<AuthInterceptor>,
}

impl JiraClient {
    pub fn new(state: Arc<AuthState>, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            pipeline: Arc::new(AuthInterceptor::new(state, handler)),
        }
    }

    pub fn state(&self) -> &Arc<AuthState> {
        self.pipeline.state()
    }

    /// Sends a request and fails with `NotSignedIn` if the pipeline dropped it
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let method = request.method.clone();
        let url = request.url.clone();
        let response = self
            .pipeline
            .intercept(request)
            .await?
            .ok_or(ApiError::NotSignedIn)?;
        debug!("{} {} -> {}", method, url, response.status);
        Ok(response)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        self.send(ApiRequest::post(path, body)).await?.json()
    }

    /// Resolve the signed-in user and publish it to everyone waiting on a sign-in.
    ///
    /// This flow owns the identity endpoint: the pipeline drops its
    /// authorization failures, so they are surfaced here instead.
    pub async fn authenticate(&self) -> Result<Option<User>> {
        let state = self.state();
        match self.pipeline.intercept(ApiRequest::get(MYSELF_PATH)).await {
            Ok(Some(response)) => {
                let user: User = response.json()?;
                info!("signed in as {}", user.display_name.as_deref().unwrap_or(&user.account_id));
                state.set_user(Some(user.clone()));
                Ok(Some(user))
            }
            Ok(None) => {
                state.set_user(None);
                state.report(ReportedError::new(
                    "Sign-in failed: check the site URL, email and API token",
                ));
                Ok(None)
            }
            Err(e) => {
                state.set_user(None);
                Err(e)
            }
        }
    }

    /// Look up an issue by key; `Ok(None)` means the key does not exist
    pub async fn issue(&self, key: &str) -> Result<Option<Issue>> {
        let path = format!(
            "/rest/api/3/issue/{}?fields={}",
            urlencoding::encode(key),
            ISSUE_FIELDS
        );
        match self.get(&path).await {
            Ok(issue) => Ok(Some(issue)),
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search_issues(&self, jql: &str, max_results: i32) -> Result<SearchResponse> {
        let request_body = serde_json::json!({
            "jql": jql,
            "maxResults": max_results,
            "fields": ["summary", "parent", "components"]
        });
        self.post("/rest/api/3/search/jql", request_body).await
    }

    async fn issue_worklogs(&self, issue_key: &str, start: i64, end: i64) -> Result<Vec<WorklogRecord>> {
        let path = format!(
            "/rest/api/3/issue/{}/worklog?startedAfter={}&startedBefore={}",
            urlencoding::encode(issue_key),
            start,
            end
        );
        let response: WorklogResponse = self.get(&path).await?;
        Ok(response.worklogs)
    }

    /// The signed-in user's worklogs that start on a day in `[start_date, end_date]`
    pub async fn worklogs_between(&self, account_id: &str, start_date: NaiveDate, end_date: NaiveDate) -> Result<Vec<Worklog>> {
        let jql = format!(
            "worklogAuthor = currentUser() AND worklogDate >= '{}' AND worklogDate <= '{}' ORDER BY updated DESC",
            start_date.format("%Y-%m-%d"),
            end_date.format("%Y-%m-%d")
        );
        let issues = self.search_issues(&jql, 100).await?;

        let range_start = local_midnight(start_date);
        let range_end = local_midnight(end_date + Duration::days(1));

        let mut worklogs = Vec::new();
        for issue in issues.issues {
            let records = self
                .issue_worklogs(
                    &issue.key,
                    range_start.timestamp_millis(),
                    range_end.timestamp_millis(),
                )
                .await?;

            for record in records {
                let mine = record
                    .author
                    .as_ref()
                    .is_some_and(|author| author.account_id == account_id);
                let started = record.started.timestamp_millis();
                if mine && started >= range_start.timestamp_millis() && started < range_end.timestamp_millis() {
                    worklogs.push(Worklog::new(record, issue.clone()));
                }
            }
        }

        debug!("loaded {} worklogs for {}..={}", worklogs.len(), start_date, end_date);
        Ok(worklogs)
    }
}

fn local_midnight(date: NaiveDate) -> DateTime<Local> {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&midnight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BoxFuture, HttpFailure};
    use crate::auth::AuthInfo;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Replies(Mutex<VecDeque<std::result::Result<ApiResponse, HttpFailure>>>);

    impl RequestHandler for Replies {
        fn handle(&self, _request: ApiRequest) -> BoxFuture<'_, std::result::Result<ApiResponse, HttpFailure>> {
            let reply = self
                .0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(HttpFailure::Connectivity("script exhausted".into())));
            Box::pin(async move { reply })
        }
    }

    fn client(replies: Vec<std::result::Result<ApiResponse, HttpFailure>>) -> JiraClient {
        let state = Arc::new(AuthState::new());
        state.sign_in(AuthInfo::new("https://acme.atlassian.net", "dev@acme.test", "tok"));
        JiraClient::new(state, Arc::new(Replies(Mutex::new(replies.into()))))
    }

    fn ok(body: &str) -> std::result::Result<ApiResponse, HttpFailure> {
        Ok(ApiResponse {
            status: StatusCode::OK,
            body: body.to_string(),
        })
    }

    fn failed(status: StatusCode) -> std::result::Result<ApiResponse, HttpFailure> {
        Err(HttpFailure::Status {
            status,
            body: String::new(),
        })
    }

    #[tokio::test]
    async fn authenticate_publishes_user() {
        let client = client(vec![ok(r#"{"accountId":"abc","displayName":"Dana"}"#)]);
        let user = client.authenticate().await.unwrap().expect("user");
        assert_eq!(user.account_id, "abc");
        assert_eq!(client.state().user(), Some(user));
    }

    #[tokio::test]
    async fn authenticate_reports_rejected_credentials() {
        let client = client(vec![failed(StatusCode::UNAUTHORIZED)]);
        assert!(client.authenticate().await.unwrap().is_none());
        assert!(client.state().user().is_none());
        assert!(client.state().last_error().is_some());
    }

    #[tokio::test]
    async fn known_issue_key_resolves() {
        let client = client(vec![ok(r#"{"id":"42","key":"ABC-123","fields":{"summary":"Fix it"}}"#)]);
        let issue = client.issue("ABC-123").await.unwrap().expect("issue");
        assert_eq!(issue.key, "ABC-123");
        assert_eq!(issue.fields.summary, "Fix it");
    }

    #[tokio::test]
    async fn unknown_issue_key_is_none() {
        let client = client(vec![failed(StatusCode::NOT_FOUND)]);
        assert!(client.issue("ABC-123").await.unwrap().is_none());
        assert!(client.state().last_error().is_none());
    }

    #[tokio::test]
    async fn load_parked_on_lost_connection_resumes_after_authenticate() {
        let client = client(vec![
            ok(r#"{"accountId":"abc"}"#),
            Err(HttpFailure::Connectivity("blip".into())),
            ok(r#"{"accountId":"abc"}"#),
            ok(r#"{"issues":[]}"#),
        ]);
        client.authenticate().await.unwrap();

        let load = {
            let client = client.clone();
            tokio::spawn(async move {
                let start = NaiveDate::from_ymd_opt(2024, 7, 8).unwrap();
                client.worklogs_between("abc", start, start + Duration::days(6)).await
            })
        };
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(!load.is_finished());
        assert!(client.state().user().is_some());
        assert_eq!(client.state().waiting_for_sign_in(), 1);

        // What the refresh action does when a request is parked
        client.authenticate().await.unwrap();

        assert!(load.await.unwrap().unwrap().is_empty());
        assert_eq!(client.state().waiting_for_sign_in(), 0);
    }

    #[tokio::test]
    async fn worklogs_are_filtered_to_account_and_range() {
        let search = r#"{"issues":[{"id":"42","key":"ABC-7","fields":{"summary":"Fix it"}}]}"#;
        let worklogs = r#"{"worklogs":[
            {"id":"1","author":{"accountId":"abc"},"timeSpentSeconds":3600,"started":"2024-07-10T09:00:00.000+0000"},
            {"id":"2","author":{"accountId":"zzz"},"timeSpentSeconds":3600,"started":"2024-07-10T10:00:00.000+0000"},
            {"id":"3","author":{"accountId":"abc"},"timeSpentSeconds":60,"started":"2024-08-01T10:00:00.000+0000"}
        ]}"#;
        let client = client(vec![ok(search), ok(worklogs)]);

        let start = NaiveDate::from_ymd_opt(2024, 7, 8).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 7, 14).unwrap();
        let loaded = client.worklogs_between("abc", start, end).await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "1");
        assert_eq!(loaded[0].issue.key, "ABC-7");
        assert_eq!(loaded[0].columns, 1);
    }
}
