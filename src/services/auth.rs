// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential issuer client and sign-in/registration input validation.
//!
//! The issuer is Firebase Auth, reached through its REST API. Its only
//! output the rest of the crate consumes is the identity channel returned
//! by [`CredentialIssuer::identity`], which the session boundary follows.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use validator::{Validate, ValidationError};

use crate::config::Config;
use crate::db::CollectionGateway;
use crate::error::{AppError, Result};
use crate::models::{Identity, Profile};
use crate::services::ProfileService;

/// External issuer of credentials.
pub trait CredentialIssuer: Send + Sync {
    fn sign_in(&self, credentials: &Credentials) -> impl Future<Output = Result<Identity>> + Send;

    /// Create an account and sign it in.
    fn sign_up(&self, credentials: &Credentials) -> impl Future<Output = Result<Identity>> + Send;

    fn send_password_reset(&self, email: &str) -> impl Future<Output = Result<()>> + Send;

    fn sign_out(&self);

    /// Current identity, `None` while signed out.
    fn identity(&self) -> watch::Receiver<Option<Identity>>;
}

/// Email and password as typed by the user.
#[derive(Debug, Clone, Default, Validate)]
pub struct Credentials {
    #[validate(custom(function = validate_email))]
    pub email: String,
    #[validate(custom(function = validate_password))]
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Validate, failing with the first problem in form order.
    pub fn check(&self) -> Result<()> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(AppError::Validation(
                "Enter your email and password.".to_string(),
            ));
        }
        validate_email(&self.email).map_err(field_error)?;
        validate_password(&self.password).map_err(field_error)?;
        Ok(())
    }
}

/// Sign-up form: credentials plus the profile fields.
#[derive(Debug, Clone, Default, Validate)]
pub struct Registration {
    #[validate(nested)]
    pub credentials: Credentials,
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 32, message = "Phone number is required"))]
    pub phone: String,
}

impl Registration {
    pub fn check(&self) -> Result<()> {
        if self.name.trim().is_empty()
            || self.phone.trim().is_empty()
            || self.credentials.email.is_empty()
            || self.credentials.password.is_empty()
        {
            return Err(AppError::Validation("Fill in every field.".to_string()));
        }
        self.credentials.check()?;
        self.validate()?;
        Ok(())
    }
}

fn field_error(error: ValidationError) -> AppError {
    AppError::Validation(
        error
            .message
            .map(|m| m.to_string())
            .unwrap_or_else(|| error.code.to_string()),
    )
}

/// `local@domain.tld`: no whitespace, exactly one `@`, and a dot inside
/// the domain with characters on both sides.
pub fn validate_email(email: &str) -> std::result::Result<(), ValidationError> {
    let invalid =
        || ValidationError::new("email").with_message(Cow::Borrowed("Invalid email address"));

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid());
    };
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let has_inner_dot = domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len());
    if !has_inner_dot {
        return Err(invalid());
    }
    Ok(())
}

/// At least 8 characters with a lowercase and an uppercase letter, a digit
/// and a symbol.
pub fn validate_password(password: &str) -> std::result::Result<(), ValidationError> {
    let strong = password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_ascii_alphanumeric());

    if !strong {
        return Err(ValidationError::new("password").with_message(Cow::Borrowed(
            "Password must have at least 8 characters, with upper and lower case letters, a number and a symbol",
        )));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'static str,
    email: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    email: String,
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Firebase Auth REST client.
pub struct FirebaseAuth {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    /// ID token of the signed-in user.
    id_token: Mutex<Option<String>>,
    identity: watch::Sender<Option<Identity>>,
}

impl FirebaseAuth {
    pub fn new(config: &Config) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            http: reqwest::Client::new(),
            base_url: config.auth_base_url.trim_end_matches('/').to_string(),
            api_key: config.firebase_api_key.clone(),
            id_token: Mutex::new(None),
            identity,
        }
    }

    /// ID token of the signed-in user, for authenticated backend calls.
    pub fn id_token(&self) -> Option<String> {
        self.id_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/accounts:{}", self.base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("Request to credential issuer failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(endpoint, status = status.as_u16(), "Credential issuer rejected request");
            return Err(issuer_error(&body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Auth(format!("JSON parse error: {}", e)))
    }

    async fn password_grant(&self, endpoint: &str, credentials: &Credentials) -> Result<Identity> {
        credentials.check()?;

        let tokens: TokenResponse = self
            .post(
                endpoint,
                &PasswordRequest {
                    email: credentials.email.trim(),
                    password: &credentials.password,
                    return_secure_token: true,
                },
            )
            .await?;

        let identity = Identity::new(&tokens.email);
        *self.id_token.lock().unwrap_or_else(PoisonError::into_inner) = Some(tokens.id_token);
        self.identity.send_replace(Some(identity.clone()));

        tracing::info!(identity = %identity, endpoint, "Signed in");
        Ok(identity)
    }
}

/// Map an issuer error body to a user-facing error.
fn issuer_error(body: &str) -> AppError {
    let code = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_default();
    // Codes may carry a detail suffix, e.g. "WEAK_PASSWORD : ..."
    let code = code.split([' ', ':']).next().unwrap_or_default();

    let message = match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "Incorrect email or password."
        }
        "EMAIL_EXISTS" => "An account with this email already exists.",
        "USER_DISABLED" => "This account has been disabled.",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts. Try again later.",
        "WEAK_PASSWORD" => "Password is too weak.",
        "INVALID_EMAIL" => "Invalid email address",
        _ => "Could not reach the sign-in service. Please try again.",
    };
    AppError::Auth(message.to_string())
}

impl CredentialIssuer for FirebaseAuth {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity> {
        self.password_grant("signInWithPassword", credentials).await
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Identity> {
        self.password_grant("signUp", credentials).await
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        if email.is_empty() {
            return Err(AppError::Validation("Enter your email.".to_string()));
        }
        validate_email(email).map_err(field_error)?;

        let _: serde_json::Value = self
            .post(
                "sendOobCode",
                &OobCodeRequest {
                    request_type: "PASSWORD_RESET",
                    email: email.trim(),
                },
            )
            .await?;

        tracing::info!("Password reset email sent");
        Ok(())
    }

    fn sign_out(&self) {
        self.id_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.identity.send_replace(None);
        tracing::info!("Signed out");
    }

    fn identity(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }
}

/// Create an account, then its profile document.
pub async fn register<A, G>(
    issuer: &A,
    profiles: &ProfileService<G>,
    registration: &Registration,
) -> Result<Identity>
where
    A: CredentialIssuer,
    G: CollectionGateway,
{
    registration.check()?;

    let identity = issuer.sign_up(&registration.credentials).await?;
    profiles
        .create(&Profile {
            id: None,
            email: identity.to_string(),
            name: Some(registration.name.trim().to_string()),
            phone: Some(registration.phone.trim().to_string()),
            photo_ref: None,
        })
        .await?;

    tracing::info!(identity = %identity, "Account registered");
    Ok(identity)
}
