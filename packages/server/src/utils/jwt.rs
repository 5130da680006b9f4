use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Session JWT claims, carried in the session cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,      // User ID
    pub email: String, // Email at login time
    pub csrf: String,  // Expected X-CSRF-Token value
    pub exp: usize,    // Expiration timestamp
}

/// Sign a new session token.
pub fn sign(user_id: i32, email: &str, csrf: &str, ttl_hours: i64, secret: &str) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or_else(|| anyhow::anyhow!("session expiry out of range"))?
        .timestamp();

    let claims = Claims {
        sub: user_id,
        email: email.to_owned(),
        csrf: csrf.to_owned(),
        exp: expiration as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify and decode a session token.
pub fn verify(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}
