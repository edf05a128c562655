//! Owner authentication: one-time codes, password hashing, session tokens
//! and the bearer-token middleware guarding the data routes.

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use institute_core::model::SystemUser;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::api::{ApiError, AppState};
use crate::config::AuthConfig;

pub const OTP_EXPIRY_MINUTES: i64 = 10;
pub const PASSWORD_COST: u32 = 10;
pub const MAX_LOGO_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Unauthorized")]
    MissingToken,
    #[error("Session expired or invalid")]
    InvalidToken,
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Unauthorized(e.to_string())
    }
}

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// Owner record id.
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_token(config: &AuthConfig, user: &SystemUser, now: DateTime<Utc>) -> Result<IssuedToken> {
    let expires_at = now + config.token_ttl();
    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .context("signing session token")?;
    Ok(IssuedToken { token, expires_at })
}

pub fn verify_token(config: &AuthConfig, token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::InvalidToken)
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Rejects requests without a valid session; stores the [`Claims`] in the
/// request extensions for handlers that want them.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(AuthError::MissingToken)?;
    let claims = verify_token(&state.config.auth, token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Six-digit verification code.
pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

pub fn hash_otp(otp: &str) -> String {
    hex::encode(Sha256::digest(otp.trim().as_bytes()))
}

pub fn is_password_hash(stored: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|p| stored.starts_with(p))
}

pub async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, PASSWORD_COST))
        .await
        .context("hashing task panicked")?
        .context("hashing password")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Match,
    /// Matched a plaintext value that should now be replaced by a hash.
    MatchNeedsUpgrade,
    Mismatch,
}

pub async fn check_password(password: String, stored: String) -> Result<PasswordCheck> {
    if !is_password_hash(&stored) {
        return Ok(if !stored.is_empty() && stored == password {
            PasswordCheck::MatchNeedsUpgrade
        } else {
            PasswordCheck::Mismatch
        });
    }
    let ok = tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored))
        .await
        .context("verify task panicked")?
        .unwrap_or(false);
    Ok(if ok {
        PasswordCheck::Match
    } else {
        PasswordCheck::Mismatch
    })
}

/// Checks an institute logo data URL (`data:image/...;base64,...`) and
/// returns it trimmed.
pub fn validate_logo(logo: Option<&str>) -> Result<String, &'static str> {
    const INVALID: &str = "Logo must be a valid image data URL";
    let trimmed = logo.map(str::trim).filter(|l| !l.is_empty()).ok_or("Logo is required")?;
    if !trimmed.starts_with("data:image/") {
        return Err(INVALID);
    }
    let (_, payload) = trimmed.split_once(',').ok_or(INVALID)?;
    if payload.is_empty() {
        return Err(INVALID);
    }
    let bytes = STANDARD.decode(payload).map_err(|_| INVALID)?;
    if bytes.is_empty() {
        return Err(INVALID);
    }
    if bytes.len() > MAX_LOGO_BYTES {
        return Err("Logo size must be 5 MB or less");
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            expires_minutes: 0,
            expires_days: 14,
        }
    }

    fn owner() -> SystemUser {
        let now = Utc::now();
        SystemUser {
            id: "01HOWNER".into(),
            name: "Asha".into(),
            email: "asha@example.com".into(),
            institute_name: "Star Academy".into(),
            password: String::new(),
            institute_logo: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn token_round_trip_and_expiry() {
        let now = Utc::now();
        let issued = issue_token(&config(), &owner(), now).unwrap();
        assert_eq!(issued.expires_at, now + chrono::Duration::days(14));
        let claims = verify_token(&config(), &issued.token).unwrap();
        assert_eq!(claims.sub, "01HOWNER");
        assert_eq!(claims.email, "asha@example.com");

        let other = AuthConfig {
            jwt_secret: "other".into(),
            ..config()
        };
        assert_eq!(verify_token(&other, &issued.token), Err(AuthError::InvalidToken));

        let stale = issue_token(&config(), &owner(), now - chrono::Duration::days(30)).unwrap();
        assert_eq!(verify_token(&config(), &stale.token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn otp_shape_and_hash() {
        for _ in 0..50 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(
            hash_otp("123456"),
            "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92"
        );
    }

    #[tokio::test]
    async fn legacy_plaintext_passwords_need_upgrade() {
        assert_eq!(
            check_password("pw".into(), "pw".into()).await.unwrap(),
            PasswordCheck::MatchNeedsUpgrade
        );
        assert_eq!(
            check_password("pw".into(), "nope".into()).await.unwrap(),
            PasswordCheck::Mismatch
        );
        let hash = hash_password("pw".into()).await.unwrap();
        assert!(is_password_hash(&hash));
        assert_eq!(
            check_password("pw".into(), hash).await.unwrap(),
            PasswordCheck::Match
        );
    }

    #[test]
    fn logo_rules() {
        assert_eq!(validate_logo(None), Err("Logo is required"));
        assert_eq!(
            validate_logo(Some("http://x/logo.png")),
            Err("Logo must be a valid image data URL")
        );
        assert_eq!(
            validate_logo(Some(" data:image/png;base64,aGk= ")),
            Ok("data:image/png;base64,aGk=".to_string())
        );
        let big = STANDARD.encode(vec![0u8; MAX_LOGO_BYTES + 1]);
        assert_eq!(
            validate_logo(Some(&format!("data:image/png;base64,{big}"))),
            Err("Logo size must be 5 MB or less")
        );
    }
}
