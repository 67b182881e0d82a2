//! JWT authentication
//!
//! Access and refresh tokens signed with HS256, token revocation on logout,
//! and per-username lockout after repeated failed logins.

use anyhow::{Result, Context, bail};
use sha2::{Sha256, Digest};

use chrono::{DateTime, Utc, Duration};
use jsonwebtoken::{encode, decode, Header, Algorithm, Validation, DecodingKey, EncodingKey};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::config::AuthConfig;
use crate::error::ApiError;

/// Revoked token ids are remembered this long
const REVOCATION_RETENTION_DAYS: i64 = 7;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub username: String,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// Token ID for revocation
    pub jti: String,
}

/// Token type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Authentication state
pub struct AuthState {
    secret: String,
    settings: AuthConfig,
    /// Revoked token IDs (for logout)
    revoked_tokens: RwLock<HashMap<String, DateTime<Utc>>>,
    /// Failed login attempts
    login_attempts: RwLock<HashMap<String, (u32, DateTime<Utc>)>>,
}

impl AuthState {
    pub fn new(secret: impl Into<String>, settings: AuthConfig) -> Arc<Self> {
        Arc::new(Self {
            secret: secret.into(),
            settings,
            revoked_tokens: RwLock::new(HashMap::new()),
            login_attempts: RwLock::new(HashMap::new()),
        })
    }

    /// Access token lifetime in seconds
    pub fn access_token_ttl(&self) -> i64 {
        self.settings.access_token_expiry_minutes * 60
    }

    fn issue(&self, user_id: &str, username: &str, token_type: TokenType, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            token_type,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        ).context("Failed to encode JWT")
    }

    /// Generate access token for user
    pub fn generate_access_token(&self, user_id: &str, username: &str) -> Result<String> {
        let ttl = Duration::minutes(self.settings.access_token_expiry_minutes);
        self.issue(user_id, username, TokenType::Access, ttl)
    }

    /// Generate refresh token
    pub fn generate_refresh_token(&self, user_id: &str, username: &str) -> Result<String> {
        let ttl = Duration::days(self.settings.refresh_token_expiry_days);
        self.issue(user_id, username, TokenType::Refresh, ttl)
    }

    /// Validate and decode token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let jti = self.extract_jti(token)?;
        if self.is_token_revoked(&jti) {
            bail!("Token has been revoked");
        }

        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ).context("Invalid token")?;

        Ok(token_data.claims)
    }

    /// Extract JTI from token without checking expiry
    pub fn extract_jti(&self, token: &str) -> Result<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ).context("Failed to decode token")?;

        Ok(token_data.claims.jti)
    }

    /// Revoke a token (logout)
    pub fn revoke_token(&self, jti: &str) {
        let mut revoked = self.revoked_tokens.write().unwrap_or_else(|e| e.into_inner());
        revoked.insert(jti.to_string(), Utc::now());
    }

    fn is_token_revoked(&self, jti: &str) -> bool {
        let revoked = self.revoked_tokens.read().unwrap_or_else(|e| e.into_inner());
        revoked.contains_key(jti)
    }

    /// Record failed login attempt
    pub fn record_failed_login(&self, identifier: &str) {
        let mut attempts = self.login_attempts.write().unwrap_or_else(|e| e.into_inner());
        let entry = attempts.entry(identifier.to_string()).or_insert((0, Utc::now()));
        entry.0 += 1;
        entry.1 = Utc::now();
    }

    /// Remaining lockout, if the identifier is locked
    pub fn is_locked(&self, identifier: &str) -> Option<Duration> {
        let attempts = self.login_attempts.read().unwrap_or_else(|e| e.into_inner());
        let (count, last_attempt) = attempts.get(identifier)?;
        if *count < self.settings.max_login_attempts {
            return None;
        }
        let lockout_end = *last_attempt + Duration::minutes(self.settings.lockout_duration_minutes);
        let now = Utc::now();
        (now < lockout_end).then(|| lockout_end - now)
    }

    /// Clear login attempts (on successful login)
    pub fn clear_login_attempts(&self, identifier: &str) {
        let mut attempts = self.login_attempts.write().unwrap_or_else(|e| e.into_inner());
        attempts.remove(identifier);
    }

    /// Forget old revocations and expired lockouts
    pub fn cleanup(&self) {
        let now = Utc::now();

        {
            let mut revoked = self.revoked_tokens.write().unwrap_or_else(|e| e.into_inner());
            revoked.retain(|_, revoked_at| now - *revoked_at <= Duration::days(REVOCATION_RETENTION_DAYS));
        }

        let lockout = Duration::minutes(self.settings.lockout_duration_minutes);
        let mut attempts = self.login_attempts.write().unwrap_or_else(|e| e.into_inner());
        attempts.retain(|_, (_, last)| now - *last <= lockout);
    }
}

/// Generate a secure JWT secret
pub fn generate_jwt_secret() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

/// Salted SHA-256 digest stored as `salt$hash`
pub fn hash_password(password: &str) -> Result<String> {
    use rand::Rng;
    let mut rng = rand::rng();
    let salt: [u8; 16] = rng.random();
    let salt_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, salt);

    let combined = format!("{}{}", password, salt_b64);
    let hash = Sha256::digest(combined.as_bytes());
    let hash_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, hash);

    Ok(format!("{}${}", salt_b64, hash_b64))
}

/// Verify a password hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let Some((salt_b64, expected)) = hash.split_once('$') else {
        bail!("Invalid hash format");
    };

    let combined = format!("{}{}", password, salt_b64);
    let computed_hash = Sha256::digest(combined.as_bytes());
    let computed_b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, computed_hash);

    Ok(computed_b64 == expected)
}

/// Axum middleware for JWT authentication
pub async fn auth_middleware(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.validate_token(token).map_err(|e| {
        tracing::debug!("Rejected token: {:#}", e);
        ApiError::Unauthorized
    })?;

    if claims.token_type != TokenType::Access {
        return Err(ApiError::Unauthorized);
    }

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Refresh token request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutRequest {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<AuthState> {
        AuthState::new(generate_jwt_secret(), AuthConfig::default())
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let state = state();

        let token = state.generate_access_token("user123", "clinic").unwrap();
        let claims = state.validate_token(&token).unwrap();

        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.username, "clinic");
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let token = state().generate_access_token("user123", "clinic").unwrap();
        assert!(state().validate_token(&token).is_err());
    }

    #[test]
    fn test_token_revocation() {
        let state = state();

        let token = state.generate_access_token("user123", "clinic").unwrap();
        let claims = state.validate_token(&token).unwrap();

        state.revoke_token(&claims.jti);
        assert!(state.validate_token(&token).is_err());
    }

    #[test]
    fn test_refresh_token() {
        let state = state();

        let token = state.generate_refresh_token("user123", "clinic").unwrap();
        let claims = state.validate_token(&token).unwrap();

        assert_eq!(claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_lockout_after_max_attempts() {
        let settings = AuthConfig {
            max_login_attempts: 2,
            ..AuthConfig::default()
        };
        let state = AuthState::new("secret", settings);

        state.record_failed_login("clinic");
        assert!(state.is_locked("clinic").is_none());
        state.record_failed_login("clinic");
        let remaining = state.is_locked("clinic").unwrap();
        assert!(remaining.num_minutes() >= 29);

        state.clear_login_attempts("clinic");
        assert!(state.is_locked("clinic").is_none());
    }

    #[test]
    fn test_cleanup_keeps_recent_entries() {
        let state = state();
        state.revoke_token("jti-1");
        state.record_failed_login("clinic");
        state.cleanup();
        assert!(state.is_token_revoked("jti-1"));
        assert_eq!(state.login_attempts.read().unwrap().len(), 1);
    }

    #[test]
    fn test_password_hashing() {
        let password = "my_secure_password";
        let hash = hash_password(password).unwrap();

        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
        assert!(verify_password(password, "no-separator").is_err());
    }
}
