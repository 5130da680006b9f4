use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::*;
use tracing::{info, instrument, warn};

use crate::clients::mailer::Email;
use crate::entity::auth_token::{self, TokenKind};
use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::extractors::session::RequestContext;
use crate::models::auth::{
    Flash, FlashResponse, ForgotPasswordRequest, LoginRequest, LoginResponse, MeResponse,
    RegisterRequest, RegisterResponse, ResetPasswordRequest, UserProfile, VerifyEmailRequest,
    normalize_email, validate_login_request, validate_register_request,
    validate_reset_password_request,
};
use crate::models::shared::MessageResponse;
use crate::state::AppState;
use crate::utils::{cookie, hash, jwt};

const VERIFY_TOKEN_TTL_HOURS: i64 = 48;
const RESET_TOKEN_TTL_HOURS: i64 = 1;
const DEFAULT_IMAGE_RATIO: &str = "1:1";

/// Store the hash of a fresh single-use token and return the raw token.
async fn issue_token<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    kind: TokenKind,
    ttl_hours: i64,
) -> Result<String, DbErr> {
    let raw = hash::generate_token();
    let now = Utc::now();
    auth_token::ActiveModel {
        user_id: Set(user_id),
        kind: Set(kind),
        token_hash: Set(hash::hash_token(&raw)),
        expires_at: Set(now + Duration::hours(ttl_hours)),
        used_at: Set(None),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(raw)
}

/// Lock an unused, unexpired token of `kind` and mark it used.
async fn consume_token<C: ConnectionTrait>(
    db: &C,
    raw: &str,
    kind: TokenKind,
) -> Result<auth_token::Model, AppError> {
    let invalid = || AppError::Validation("Invalid or expired token".into());

    let token = auth_token::Entity::find()
        .filter(auth_token::Column::TokenHash.eq(hash::hash_token(raw.trim())))
        .filter(auth_token::Column::Kind.eq(kind))
        .lock(LockType::Update)
        .one(db)
        .await?
        .ok_or_else(invalid)?;

    if token.used_at.is_some() || token.expires_at <= Utc::now() {
        return Err(invalid());
    }

    let mut active: auth_token::ActiveModel = token.into();
    active.used_at = Set(Some(Utc::now()));
    Ok(active.update(db).await?)
}

async fn send_best_effort(state: &AppState, email: Email) {
    if let Err(e) = state.mailer.send(email).await {
        warn!(error = %e, "Failed to send email");
    }
}

pub(crate) async fn find_user<C: ConnectionTrait>(db: &C, id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    operation_id = "registerUser",
    summary = "Register a new account",
    description = "Creates an account with the configured starting balance and emails a \
        verification link (valid for 48 hours).",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Email already registered (EMAIL_TAKEN)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_register_request(&payload)?;

    let email = normalize_email(&payload.email);
    let display_name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default())
        .to_string();

    let password = hash::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;
    let initial = state.config.credits.initial_balance;

    let txn = state.db.begin().await?;

    let user = user::ActiveModel {
        email: Set(email),
        password: Set(password),
        display_name: Set(display_name),
        verified: Set(false),
        credits: Set(initial),
        initial_credits: Set(initial),
        category: Set(None),
        image_ratio: Set(DEFAULT_IMAGE_RATIO.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::EmailTaken,
        _ => AppError::from(e),
    })?;

    let token = issue_token(&txn, user.id, TokenKind::VerifyEmail, VERIFY_TOKEN_TTL_HOURS).await?;
    txn.commit().await?;

    info!(user_id = user.id, "Registered user");
    send_best_effort(
        &state,
        Email {
            to: user.email.clone(),
            subject: "Bitte bestätige deine E-Mail-Adresse".into(),
            body: format!(
                "{}/verify?token={token}",
                state.config.auth.public_base_url.trim_end_matches('/')
            ),
        },
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            id: user.id,
            email: user.email,
            verification_required: state.config.auth.require_verification,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log in",
    description = "Sets an HttpOnly session cookie and returns the CSRF token that must accompany \
        every state-changing request as `X-CSRF-Token`.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Wrong email or password (INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 403, description = "Email not verified (EMAIL_NOT_VERIFIED)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, jar, payload), fields(email = %payload.email))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    validate_login_request(&payload)?;

    let user = user::Entity::find()
        .filter(user::Column::Email.eq(normalize_email(&payload.email)))
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let is_valid = hash::verify_password(&payload.password, &user.password)
        .map_err(|e| AppError::Internal(format!("Password verify error: {}", e)))?;
    if !is_valid {
        return Err(AppError::InvalidCredentials);
    }

    if state.config.auth.require_verification && !user.verified {
        return Err(AppError::EmailNotVerified);
    }

    let csrf_token = hash::generate_token();
    let token = jwt::sign(
        user.id,
        &user.email,
        &csrf_token,
        state.config.auth.session_ttl_hours,
        &state.config.auth.jwt_secret,
    )
    .map_err(|e| AppError::Internal(format!("JWT sign error: {}", e)))?;

    let jar = jar.add(cookie::session_cookie(&state.config.auth, token));
    info!(user_id = user.id, "User logged in");

    Ok((
        jar,
        Json(LoginResponse {
            success: true,
            user: UserProfile::from(user),
            csrf_token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "Auth",
    operation_id = "logout",
    summary = "Log out",
    description = "Clears the session cookie. Succeeds without a session.",
    responses((status = 200, description = "Logged out", body = MessageResponse)),
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    (
        cookie::clear_session(jar, &state.config.auth),
        Json(MessageResponse::ok("Logged out")),
    )
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "getCurrentUser",
    summary = "Current session",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn me(ctx: RequestContext) -> Result<Json<MeResponse>, AppError> {
    let user = find_user(&ctx.db, ctx.user_id).await?;
    Ok(Json(MeResponse {
        success: true,
        user: UserProfile::from(user),
        csrf_token: ctx.csrf_token,
    }))
}

#[utoipa::path(
    post,
    path = "/verify",
    tag = "Auth",
    operation_id = "verifyEmail",
    summary = "Confirm an email address",
    description = "Consumes a `verify_email` token. Leaves a flash message for the next page view.",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email confirmed", body = MessageResponse),
        (status = 400, description = "Unknown, used or expired token (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, jar, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<VerifyEmailRequest>,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    let txn = state.db.begin().await?;
    let token = consume_token(&txn, &payload.token, TokenKind::VerifyEmail).await?;

    user::Entity::update_many()
        .col_expr(user::Column::Verified, Expr::value(true))
        .filter(user::Column::Id.eq(token.user_id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    info!(user_id = token.user_id, "Email verified");
    let jar = cookie::set_flash(
        jar,
        &state.config.auth,
        &Flash {
            kind: "success".into(),
            message: "E-Mail-Adresse bestätigt".into(),
        },
    );
    Ok((jar, Json(MessageResponse::ok("Email address confirmed"))))
}

#[utoipa::path(
    post,
    path = "/password/forgot",
    tag = "Auth",
    operation_id = "forgotPassword",
    summary = "Request a password reset link",
    description = "Always succeeds so that account existence is not disclosed. The link is valid \
        for one hour.",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Request accepted", body = MessageResponse)),
)]
#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let accepted = MessageResponse::ok("If the account exists, a reset link has been sent");

    let Some(user) = user::Entity::find()
        .filter(user::Column::Email.eq(normalize_email(&payload.email)))
        .one(&state.db)
        .await?
    else {
        return Ok(Json(accepted));
    };

    let token = issue_token(
        &state.db,
        user.id,
        TokenKind::PasswordReset,
        RESET_TOKEN_TTL_HOURS,
    )
    .await?;

    send_best_effort(
        &state,
        Email {
            to: user.email,
            subject: "Passwort zurücksetzen".into(),
            body: format!(
                "{}/reset-password?token={token}",
                state.config.auth.public_base_url.trim_end_matches('/')
            ),
        },
    )
    .await;

    Ok(Json(accepted))
}

#[utoipa::path(
    post,
    path = "/password/reset",
    tag = "Auth",
    operation_id = "resetPassword",
    summary = "Set a new password with a reset token",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid token or password (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    validate_reset_password_request(&payload)?;

    let password = hash::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;

    let txn = state.db.begin().await?;
    let token = consume_token(&txn, &payload.token, TokenKind::PasswordReset).await?;
    user::Entity::update_many()
        .col_expr(user::Column::Password, Expr::value(password))
        .filter(user::Column::Id.eq(token.user_id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    info!(user_id = token.user_id, "Password reset");
    Ok(Json(MessageResponse::ok("Password changed")))
}

#[utoipa::path(
    get,
    path = "/flash",
    tag = "Auth",
    operation_id = "takeFlash",
    summary = "Read and clear the pending flash message",
    responses((status = 200, description = "Pending message, if any", body = FlashResponse)),
)]
pub async fn take_flash(jar: CookieJar) -> (CookieJar, Json<FlashResponse>) {
    let (jar, flash) = cookie::take_flash(jar);
    (
        jar,
        Json(FlashResponse {
            success: true,
            flash,
        }),
    )
}
