use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::domain::UserId;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub const DEFAULT_IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

#[derive(Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
    pub email: Option<String>,
    id_token: String,
}

impl AuthUser {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            email,
            id_token: String::new(),
        }
    }

    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = id_token.into();
        self
    }

    pub fn id_token(&self) -> &str {
        &self.id_token
    }
}

impl fmt::Debug for AuthUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthUser")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("id_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AuthStateChange {
    pub user: Option<AuthUser>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    UserNotFound,
    WrongPassword,
    InvalidCredentials,
    TooManyRequests,
    UserDisabled,
    EmailInUse,
    InvalidEmail,
    WeakPassword,
    Other,
}

impl AuthErrorCode {
    /// Accepts both REST error messages (`"TOO_MANY_ATTEMPTS_TRY_LATER : ..."`)
    /// and SDK-style codes (`"auth/too-many-requests"`).
    pub fn parse(raw: &str) -> Self {
        let token = raw
            .split([' ', ':'])
            .find(|part| !part.is_empty())
            .unwrap_or_default();
        match token.trim_start_matches("auth/") {
            "EMAIL_NOT_FOUND" | "user-not-found" => Self::UserNotFound,
            "INVALID_PASSWORD" | "wrong-password" => Self::WrongPassword,
            "INVALID_LOGIN_CREDENTIALS" | "invalid-credential" | "invalid-login-credentials" => {
                Self::InvalidCredentials
            }
            "TOO_MANY_ATTEMPTS_TRY_LATER" | "too-many-requests" => Self::TooManyRequests,
            "USER_DISABLED" | "user-disabled" => Self::UserDisabled,
            "EMAIL_EXISTS" | "email-already-in-use" => Self::EmailInUse,
            "INVALID_EMAIL" | "invalid-email" => Self::InvalidEmail,
            "WEAK_PASSWORD" | "weak-password" => Self::WeakPassword,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{message}")]
    Rejected { code: AuthErrorCode, message: String },
    #[error("auth provider unreachable: {0}")]
    Transport(String),
}

impl AuthError {
    pub fn rejected(raw: impl Into<String>) -> Self {
        let message = raw.into();
        Self::Rejected {
            code: AuthErrorCode::parse(&message),
            message,
        }
    }

    pub fn code(&self) -> AuthErrorCode {
        match self {
            Self::Rejected { code, .. } => *code,
            Self::Transport(_) => AuthErrorCode::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInFailure {
    InvalidCredentials,
    RateLimited,
    AccountDisabled,
    Other,
}

impl SignInFailure {
    pub fn classify(err: &AuthError) -> Self {
        match err.code() {
            AuthErrorCode::UserNotFound
            | AuthErrorCode::WrongPassword
            | AuthErrorCode::InvalidCredentials => Self::InvalidCredentials,
            AuthErrorCode::TooManyRequests => Self::RateLimited,
            AuthErrorCode::UserDisabled => Self::AccountDisabled,
            _ => Self::Other,
        }
    }

    pub fn user_message(self, err: &AuthError) -> String {
        match self {
            Self::InvalidCredentials => "Invalid email or password.".to_string(),
            Self::RateLimited => {
                "Too many failed attempts. Please wait a moment and try again.".to_string()
            }
            Self::AccountDisabled => {
                "This account has been disabled. Please contact support.".to_string()
            }
            Self::Other => format!("Error signing in: {err}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpFailure {
    EmailInUse,
    InvalidEmail,
    WeakPassword,
    Other,
}

impl SignUpFailure {
    pub fn classify(err: &AuthError) -> Self {
        match err.code() {
            AuthErrorCode::EmailInUse => Self::EmailInUse,
            AuthErrorCode::InvalidEmail => Self::InvalidEmail,
            AuthErrorCode::WeakPassword => Self::WeakPassword,
            _ => Self::Other,
        }
    }

    pub fn user_message(self, err: &AuthError) -> String {
        match self {
            Self::EmailInUse => "An account with this email already exists.".to_string(),
            Self::InvalidEmail => "Please enter a valid email address.".to_string(),
            Self::WeakPassword => {
                "Password is too weak. Please choose a stronger password.".to_string()
            }
            Self::Other => format!("Error creating account: {err}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetFailure {
    NotFound,
    InvalidEmail,
    Other,
}

impl ResetFailure {
    pub fn classify(err: &AuthError) -> Self {
        match err.code() {
            AuthErrorCode::UserNotFound => Self::NotFound,
            AuthErrorCode::InvalidEmail => Self::InvalidEmail,
            _ => Self::Other,
        }
    }

    pub fn user_message(self, err: &AuthError) -> String {
        match self {
            Self::NotFound => "No account found with this email address.".to_string(),
            Self::InvalidEmail => "Please enter a valid email address.".to_string(),
            Self::Other => format!("Error sending reset link: {err}"),
        }
    }
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn send_verification_email(&self, user: &AuthUser) -> Result<(), AuthError>;
    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    async fn current_user(&self) -> Option<AuthUser>;
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    id_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_token: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: ProviderError,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: String,
}

/// Sessions live in memory only, so a fresh gateway always starts signed out.
pub struct IdentityToolkitGateway {
    http: Client,
    endpoint: String,
    api_key: String,
    current: Mutex<Option<AuthUser>>,
    events: broadcast::Sender<AuthStateChange>,
}

impl IdentityToolkitGateway {
    pub fn new(http: Client, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            current: Mutex::new(None),
            events,
        }
    }

    fn method_url(&self, method: &str) -> String {
        // `accounts:signUp` is not a valid relative URL, so no `Url::join`.
        format!("{}/accounts:{method}", self.endpoint.trim_end_matches('/'))
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> Result<R, AuthError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|err| AuthError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|err| AuthError::Transport(format!("invalid provider response: {err}")));
        }

        let body = response.json::<ProviderErrorBody>().await.unwrap_or_default();
        let message = if body.error.message.is_empty() {
            format!("auth provider returned {status}")
        } else {
            body.error.message
        };
        debug!(method, %status, %message, "auth: provider rejected request");
        Err(AuthError::rejected(message))
    }

    async fn set_current(&self, user: Option<AuthUser>) {
        *self.current.lock().await = user.clone();
        let _ = self.events.send(AuthStateChange { user });
    }
}

#[async_trait]
impl AuthGateway for IdentityToolkitGateway {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let token: TokenResponse = self
            .call(
                "signInWithPassword",
                &PasswordCredentials {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        let user = AuthUser::new(token.local_id, token.email.or_else(|| Some(email.to_string())))
            .with_id_token(token.id_token);
        info!(user_id = %user.user_id, "auth: signed in");
        self.set_current(Some(user.clone())).await;
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let token: TokenResponse = self
            .call(
                "signUp",
                &PasswordCredentials {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        let user = AuthUser::new(token.local_id, token.email.or_else(|| Some(email.to_string())))
            .with_id_token(token.id_token);
        info!(user_id = %user.user_id, "auth: account created");
        Ok(user)
    }

    async fn send_verification_email(&self, user: &AuthUser) -> Result<(), AuthError> {
        if user.id_token().is_empty() {
            warn!(user_id = %user.user_id, "auth: no id token; cannot request verification email");
            return Err(AuthError::rejected("MISSING_ID_TOKEN"));
        }
        let _: serde_json::Value = self
            .call(
                "sendOobCode",
                &OobCodeRequest {
                    request_type: "VERIFY_EMAIL",
                    email: None,
                    id_token: Some(user.id_token()),
                },
            )
            .await?;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let _: serde_json::Value = self
            .call(
                "sendOobCode",
                &OobCodeRequest {
                    request_type: "PASSWORD_RESET",
                    email: Some(email),
                    id_token: None,
                },
            )
            .await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.set_current(None).await;
        Ok(())
    }

    async fn current_user(&self) -> Option<AuthUser> {
        self.current.lock().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
