//! Shared sign-in state and the request pipeline that depends on it.
//!
//! `AuthState` is created once and handed to everything that needs it. Each
//! field has a single writer:
//! - credentials: `sign_in` / `sign_out`
//! - signed-in user: the authentication flow in `JiraClient::authenticate`
//! - reported error: the request pipeline and the authentication flow
//!   (the UI only clears it)
//! - waiting count: the request pipeline, through `SignInWait`

mod interceptor;

pub use interceptor::{AuthInterceptor, MYSELF_PATH};

use std::sync::{PoisonError, RwLock};

use base64::{engine::general_purpose::STANDARD, Engine};
use log::{info, warn};
use tokio::sync::watch;

use crate::api::{ReportedError, User};

/// Site URL plus the credential for the `Authorization` header
#[derive(Clone, PartialEq, Eq)]
pub struct AuthInfo {
    base_url: String,
    email: String,
    token: String,
}

impl AuthInfo {
    pub fn new(base_url: impl Into<String>, email: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            email: email.into(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_header(&self) -> String {
        let auth_string = format!("{}:{}", self.email, self.token);
        format!("Basic {}", STANDARD.encode(auth_string))
    }
}

impl std::fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInfo")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("token", &"<redacted>")
            .finish()
    }
}

pub struct AuthState {
    auth_info: RwLock<Option<AuthInfo>>,
    user: watch::Sender<Option<User>>,
    error: watch::Sender<Option<ReportedError>>,
    waiting: watch::Sender<usize>,
}

/// Held by a request while it is parked until the next sign-in
pub struct SignInWait<'a> {
    state: &'a AuthState,
}

impl Drop for SignInWait<'_> {
    fn drop(&mut self) {
        self.state.waiting.send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        let (user, _) = watch::channel(None);
        let (error, _) = watch::channel(None);
        let (waiting, _) = watch::channel(0);
        Self {
            auth_info: RwLock::new(None),
            user,
            error,
            waiting,
        }
    }

    pub fn auth_info(&self) -> Option<AuthInfo> {
        self.auth_info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sign_in(&self, auth_info: AuthInfo) {
        info!("signing in to {}", auth_info.base_url());
        *self.auth_info.write().unwrap_or_else(PoisonError::into_inner) = Some(auth_info);
    }

    pub fn sign_out(&self) {
        info!("signing out");
        *self.auth_info.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.set_user(None);
    }

    pub fn user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    /// Every call notifies subscribers, even when the value is unchanged:
    /// a repeated sign-in as the same user is still a fresh signal.
    pub fn set_user(&self, user: Option<User>) {
        self.user.send_replace(user);
    }

    /// The signed-in user, waiting for a sign-in if there is none yet
    pub async fn signed_in_user(&self) -> Option<User> {
        let mut users = self.user.subscribe();
        loop {
            let current = users.borrow_and_update().clone();
            if current.is_some() {
                return current;
            }
            users.changed().await.ok()?;
        }
    }

    pub fn subscribe_user(&self) -> watch::Receiver<Option<User>> {
        self.user.subscribe()
    }

    pub fn report(&self, error: ReportedError) {
        warn!("reporting error: {}", error);
        self.error.send_replace(Some(error));
    }

    pub fn last_error(&self) -> Option<ReportedError> {
        self.error.borrow().clone()
    }

    pub fn clear_error(&self) {
        self.error.send_if_modified(|current| current.take().is_some());
    }

    /// Count a request as parked until the returned guard is dropped
    pub fn begin_wait(&self) -> SignInWait<'_> {
        self.waiting.send_modify(|count| *count += 1);
        SignInWait { state: self }
    }

    /// Requests parked until the next sign-in; only a new sign-in releases them
    pub fn waiting_for_sign_in(&self) -> usize {
        *self.waiting.borrow()
    }
}
