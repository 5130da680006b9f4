use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::config::AuthConfig;
use crate::models::auth::Flash;

/// Name of the one-shot flash cookie.
pub const FLASH_COOKIE: &str = "vitrine_flash";

fn base(name: String, value: String, config: &AuthConfig) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .build()
}

/// Session cookie carrying the signed JWT.
pub fn session_cookie(config: &AuthConfig, token: String) -> Cookie<'static> {
    let mut cookie = base(config.session_cookie.clone(), token, config);
    cookie.set_max_age(time::Duration::hours(config.session_ttl_hours));
    cookie
}

pub fn clear_session(jar: CookieJar, config: &AuthConfig) -> CookieJar {
    jar.remove(Cookie::build(config.session_cookie.clone()).path("/"))
}

/// Queue a flash message for the next `GET /session/flash`.
///
/// The JSON payload is hex encoded to stay within the cookie value charset.
pub fn set_flash(jar: CookieJar, config: &AuthConfig, flash: &Flash) -> CookieJar {
    let value = serde_json::to_vec(flash).map(hex::encode).unwrap_or_default();
    jar.add(base(FLASH_COOKIE.to_string(), value, config))
}

/// Read and clear the pending flash message.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let flash = jar
        .get(FLASH_COOKIE)
        .and_then(|c| hex::decode(c.value()).ok())
        .and_then(|bytes| serde_json::from_slice::<Flash>(&bytes).ok());
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, flash);
    }
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), flash)
}
