use std::time::Duration;

use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cache::{keys, RedisCache};
use crate::db::operations::{find_auth_session, find_user_by_id, ROLE_ADMIN};
use crate::db::DatabaseProxy;

const AUTH_COOKIE_NAME: &str = "auth_token";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: String,
    pub created_at: i64,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid JWT_EXPIRES_IN")]
    InvalidExpiresIn,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedSession {
    user: AuthUser,
    expires_at: i64,
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, AUTH_COOKIE_NAME) {
        return Some(token);
    }

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    auth_header
        .strip_prefix("Bearer ")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Verified user plus the auth session's expiry (epoch ms).
pub async fn verify_request_token(
    proxy: &DatabaseProxy,
    token: &str,
    secret: &str,
) -> Result<(AuthUser, i64), AuthError> {
    let claims = verify_jwt_hs256(token, secret)?;
    let token_hash = hash_token(token);

    let session = find_auth_session(proxy, &token_hash)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    if session.user_id != claims.user_id {
        return Err(AuthError::InvalidToken);
    }
    if session.expires_at < Utc::now().timestamp_millis() {
        return Err(AuthError::InvalidToken);
    }

    let user = find_user_by_id(proxy, &claims.user_id)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    Ok((
        AuthUser {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
        },
        session.expires_at,
    ))
}

pub async fn verify_request_token_cached(
    proxy: &DatabaseProxy,
    token: &str,
    secret: &str,
    cache: Option<&RedisCache>,
) -> Result<(AuthUser, i64), AuthError> {
    let Some(cache) = cache else {
        return verify_request_token(proxy, token, secret).await;
    };

    // the signature is always checked; only the database round trips are cached
    verify_jwt_hs256(token, secret)?;

    let key = keys::session_key(&hash_token(token));
    let now = Utc::now().timestamp_millis();
    if let Some(cached) = cache.get::<CachedSession>(&key).await {
        if cached.expires_at > now {
            return Ok((cached.user, cached.expires_at));
        }
        cache.delete(&key).await;
    }

    let (user, expires_at) = verify_request_token(proxy, token, secret).await?;
    let remaining = Duration::from_millis((expires_at - now).max(1) as u64);
    let ttl = remaining.min(keys::SESSION_TTL);
    cache
        .set(
            &key,
            &CachedSession {
                user: user.clone(),
                expires_at,
            },
            ttl,
        )
        .await;

    Ok((user, expires_at))
}

#[derive(Debug, Clone)]
struct JwtClaims {
    user_id: String,
}

fn verify_jwt_hs256(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let payload_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    let sig_b64 = parts.next().ok_or(AuthError::InvalidToken)?;
    if parts.next().is_some() {
        return Err(AuthError::InvalidToken);
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64.as_bytes())
        .map_err(|_| AuthError::InvalidToken)?;

    let header_json: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| AuthError::InvalidToken)?;
    let alg = header_json
        .get("alg")
        .and_then(|value| value.as_str())
        .ok_or(AuthError::InvalidToken)?;
    if alg != "HS256" {
        return Err(AuthError::InvalidToken);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json: serde_json::Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| AuthError::InvalidToken)?;

    validate_registered_claims(&payload_json)?;

    let user_id = payload_json
        .get("userId")
        .and_then(|value| value.as_str())
        .ok_or(AuthError::InvalidToken)?
        .to_string();

    Ok(JwtClaims { user_id })
}

fn validate_registered_claims(payload: &serde_json::Value) -> Result<(), AuthError> {
    let now = Utc::now().timestamp();

    if let Some(exp) = payload.get("exp").and_then(|value| value.as_i64()) {
        if now >= exp {
            return Err(AuthError::InvalidToken);
        }
    }

    if let Some(nbf) = payload.get("nbf").and_then(|value| value.as_i64()) {
        if now < nbf {
            return Err(AuthError::InvalidToken);
        }
    }

    Ok(())
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns the token and its expiry in epoch milliseconds.
pub fn sign_jwt_for_user(
    user_id: &str,
    secret: &str,
    expires_in: &str,
) -> Result<(String, i64), AuthError> {
    let expires_in_ms = parse_expires_in_ms(expires_in)?;

    let issued_at = Utc::now();
    let exp = issued_at
        .checked_add_signed(chrono::Duration::milliseconds(expires_in_ms))
        .ok_or(AuthError::InvalidExpiresIn)?;

    let header_json = serde_json::json!({
        "alg": "HS256",
        "typ": "JWT",
    });

    let payload_json = serde_json::json!({
        "userId": user_id,
        "jti": uuid::Uuid::new_v4().to_string(),
        "iat": issued_at.timestamp(),
        "exp": exp.timestamp(),
    });

    let header_b64 = URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&header_json).map_err(|_| AuthError::InvalidToken)?);
    let payload_b64 = URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&payload_json).map_err(|_| AuthError::InvalidToken)?);
    let signing_input = format!("{header_b64}.{payload_b64}");

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok((format!("{signing_input}.{sig_b64}"), exp.timestamp_millis()))
}

pub fn parse_expires_in_ms(value: &str) -> Result<i64, AuthError> {
    let trimmed = value.trim();
    if trimmed.len() < 2 {
        return Err(AuthError::InvalidExpiresIn);
    }

    let (digits, unit) = trimmed.split_at(trimmed.len() - 1);

    let amount: i64 = digits.parse().map_err(|_| AuthError::InvalidExpiresIn)?;
    if amount <= 0 {
        return Err(AuthError::InvalidExpiresIn);
    }

    match unit {
        "s" => Ok(amount * 1000),
        "m" => Ok(amount * 60 * 1000),
        "h" => Ok(amount * 60 * 60 * 1000),
        "d" => Ok(amount * 24 * 60 * 60 * 1000),
        _ => Err(AuthError::InvalidExpiresIn),
    }
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt_cost())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

fn bcrypt_cost() -> u32 {
    if cfg!(test) || cfg!(debug_assertions) {
        4
    } else {
        bcrypt::DEFAULT_COST
    }
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        if key == name {
            return Some(value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn test_sign_then_verify() {
        let (token, expires_at) = sign_jwt_for_user("user-1", SECRET, "1h").unwrap();
        assert!(expires_at > Utc::now().timestamp_millis());
        let claims = verify_jwt_hs256(&token, SECRET).unwrap();
        assert_eq!(claims.user_id, "user-1");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let (token, _) = sign_jwt_for_user("user-1", SECRET, "1h").unwrap();
        assert!(matches!(
            verify_jwt_hs256(&token, "other-secret"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let (token, _) = sign_jwt_for_user("user-1", SECRET, "1h").unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(verify_jwt_hs256(&tampered, SECRET).is_err());
        assert!(verify_jwt_hs256("a.b", SECRET).is_err());
    }

    #[test]
    fn test_parse_expires_in() {
        assert_eq!(parse_expires_in_ms("30s").unwrap(), 30_000);
        assert_eq!(parse_expires_in_ms("2h").unwrap(), 7_200_000);
        assert_eq!(parse_expires_in_ms("1d").unwrap(), 86_400_000);
        assert!(parse_expires_in_ms("0h").is_err());
        assert!(parse_expires_in_ms("h").is_err());
        assert!(parse_expires_in_ms("5w").is_err());
    }

    #[test]
    fn test_extract_token_prefers_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));

        headers.insert(header::COOKIE, "theme=dark; auth_token=from-cookie".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }
}
