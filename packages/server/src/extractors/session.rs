use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{Method, request::Parts},
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::errors::ErrorKind;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::state::AppState;
use crate::utils::{hash, jwt};

/// Header carrying the CSRF token on state-changing requests.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Request-scoped context of an authenticated session.
///
/// Add this as a handler parameter to require a logged-in user. For
/// `POST`/`PUT`/`PATCH`/`DELETE` the `X-CSRF-Token` header must match the
/// token bound to the session.
pub struct RequestContext {
    pub user_id: i32,
    pub email: String,
    pub csrf_token: String,
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
}

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(&state.config.auth.session_cookie)
            .map(|c| c.value().to_string())
            .ok_or(AppError::Unauthorized)?;

        let claims =
            jwt::verify(&token, &state.config.auth.jwt_secret).map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::SessionExpired,
                _ => AppError::Unauthorized,
            })?;

        if is_state_changing(&parts.method) {
            let presented = parts
                .headers
                .get(CSRF_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or(AppError::CsrfMismatch)?;
            if !hash::tokens_match(presented, &claims.csrf) {
                return Err(AppError::CsrfMismatch);
            }
        }

        Ok(RequestContext {
            user_id: claims.sub,
            email: claims.email,
            csrf_token: claims.csrf,
            db: state.db.clone(),
            config: state.config.clone(),
        })
    }
}
