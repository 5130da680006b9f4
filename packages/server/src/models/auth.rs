use serde::{Deserialize, Serialize};

use crate::entity::user;
use crate::error::AppError;

fn validate_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            })
        && !email.chars().any(char::is_whitespace);
    if !valid {
        return Err(AppError::Validation("A valid email address is required".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 || password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be 8-128 characters".into(),
        ));
    }
    Ok(())
}

/// Normalised form of an email address used for lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Request body for user registration.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "alice@example.com")]
    pub email: String,
    /// Password (8-128 characters).
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
    /// Display name (up to 64 characters). Defaults to the email's local part.
    #[schema(example = "Alice")]
    pub name: Option<String>,
}

pub fn validate_register_request(payload: &RegisterRequest) -> Result<(), AppError> {
    validate_email(&payload.email)?;
    validate_password(&payload.password)?;
    if let Some(name) = &payload.name
        && name.trim().chars().count() > 64
    {
        return Err(AppError::Validation(
            "Name must be at most 64 characters".into(),
        ));
    }
    Ok(())
}

/// Request body for user login.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
}

pub fn validate_login_request(payload: &LoginRequest) -> Result<(), AppError> {
    if payload.email.trim().is_empty() {
        return Err(AppError::Validation("Email must not be empty".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }
    Ok(())
}

/// Successful registration response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RegisterResponse {
    pub success: bool,
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "alice@example.com")]
    pub email: String,
    /// Whether the account must confirm its email before logging in.
    pub verification_required: bool,
}

/// Account data visible to its owner.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserProfile {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "Alice")]
    pub display_name: String,
    pub verified: bool,
    /// Current credit balance.
    #[schema(example = 10)]
    pub credits: i64,
    #[schema(example = "Schuhe")]
    pub category: Option<String>,
    #[schema(example = "1:1")]
    pub image_ratio: String,
}

impl From<user::Model> for UserProfile {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            verified: user.verified,
            credits: user.credits,
            category: user.category,
            image_ratio: user.image_ratio,
        }
    }
}

/// Successful login response. The session itself travels in an HttpOnly cookie.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub success: bool,
    pub user: UserProfile,
    /// Send back as `X-CSRF-Token` on state-changing requests.
    #[schema(example = "9f2c4e...")]
    pub csrf_token: String,
}

/// Current session.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub success: bool,
    pub user: UserProfile,
    pub csrf_token: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ForgotPasswordRequest {
    #[schema(example = "alice@example.com")]
    pub email: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    /// New password (8-128 characters).
    pub password: String,
}

pub fn validate_reset_password_request(payload: &ResetPasswordRequest) -> Result<(), AppError> {
    if payload.token.trim().is_empty() {
        return Err(AppError::Validation("Token must not be empty".into()));
    }
    validate_password(&payload.password)
}

/// One-shot message shown after a redirect.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, utoipa::ToSchema)]
pub struct Flash {
    /// `success`, `info` or `error`.
    #[schema(example = "success")]
    pub kind: String,
    #[schema(example = "Email address confirmed")]
    pub message: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct FlashResponse {
    pub success: bool,
    pub flash: Option<Flash>,
}
