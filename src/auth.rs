//! # Authentication Module
//!
//! User registration and login with Argon2id password hashing, plus the
//! bearer-token identity gate used by the write endpoints.
//!
//! The token scheme is a scaffold: `Authorization: Bearer <user-id>` is a
//! direct, unverified identity claim. Swap in a real session layer before
//! exposing this publicly; registration and login already do proper hashing
//! so one can slot in behind the same handlers.

use crate::db::Store;
use crate::error::{ApiError, ApiResult};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Core Types
// ============================================================================

/// Authentication service managing user accounts
#[derive(Clone)]
pub struct AuthService {
    store: Arc<Store>,
}

/// Acting identity extracted from the Authorization header
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Identity payload returned by both register and login
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub token: String,
}

// ============================================================================
// AuthService Implementation
// ============================================================================

impl AuthService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Hash a password using Argon2id with a fresh random salt
    fn hash_password(&self, password: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))
    }

    /// Verify a password against its stored hash (constant-time)
    fn verify_password(&self, password: &str, hash: &str) -> ApiResult<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    fn required(field: Option<String>, name: &str) -> ApiResult<String> {
        match field {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(ApiError::validation(format!("{} is required", name))),
        }
    }

    /// Register a new user. Duplicate username or email is a 409.
    pub async fn register(&self, req: RegisterRequest) -> ApiResult<AuthResponse> {
        let username = Self::required(req.username, "username")?;
        let email = Self::required(req.email, "email")?;
        let password = Self::required(req.password, "password")?;

        let display_name = match req.display_name {
            Some(name) if !name.trim().is_empty() => name,
            _ => username.clone(),
        };

        let password_hash = self.hash_password(&password)?;

        let insert_username = username.clone();
        let insert_display = display_name.clone();
        let id = self
            .store
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO users (username, email, password_hash, display_name)
                     VALUES (?, ?, ?, ?)",
                    rusqlite::params![insert_username, email, password_hash, insert_display],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| e.on_conflict("username or email already exists"))?;

        info!("New user registered: {}", username);

        Ok(AuthResponse {
            id,
            token: id.to_string(),
            username,
            display_name,
        })
    }

    /// Authenticate by username and password.
    ///
    /// Unknown username and wrong password return the identical error so
    /// callers cannot probe which usernames exist.
    pub async fn login(&self, req: LoginRequest) -> ApiResult<AuthResponse> {
        let username = Self::required(req.username, "username")?;
        let password = Self::required(req.password, "password")?;

        let lookup = username.clone();
        let row: Option<(i64, String, Option<String>)> = self
            .store
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, password_hash, display_name FROM users WHERE username = ?",
                    rusqlite::params![lookup],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
            })
            .await?;

        let (id, password_hash, display_name) = row.ok_or_else(invalid_credentials)?;

        if !self.verify_password(&password, &password_hash)? {
            return Err(invalid_credentials());
        }

        info!("User logged in: {}", username);

        Ok(AuthResponse {
            id,
            token: id.to_string(),
            display_name: display_name.unwrap_or_else(|| username.clone()),
            username,
        })
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("invalid credentials")
}

// ============================================================================
// Bearer Identity Gate
// ============================================================================

/// Extract the acting user id from the Authorization header.
///
/// Missing header, wrong scheme, or a non-integer token all reject with 401.
pub fn bearer_identity(headers: &HeaderMap) -> ApiResult<AuthUser> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("unauthorized"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("unauthorized"))?;

    let id: i64 = token
        .trim()
        .parse()
        .map_err(|_| ApiError::unauthorized("invalid token"))?;

    Ok(AuthUser { id })
}

// ============================================================================
// API Handlers
// ============================================================================

/// App state for the auth router
#[derive(Clone)]
pub struct AuthState {
    pub auth: AuthService,
}

/// POST /api/register
async fn register_handler(
    State(state): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

/// POST /api/login
async fn login_handler(
    State(state): State<AuthState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let resp = state.auth.login(req).await?;
    Ok(Json(resp))
}

/// Creates the auth router
pub fn create_auth_router(auth_state: AuthState) -> Router {
    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .with_state(auth_state)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_service() -> AuthService {
        let store = Arc::new(Store::in_memory().await.unwrap());
        AuthService::new(store)
    }

    fn register_req(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.to_string()),
            email: Some(email.to_string()),
            password: Some("hunter2hunter2".to_string()),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_password_hashing() {
        let service = create_test_service().await;
        let hash = service.hash_password("supersecret123").unwrap();

        assert!(service.verify_password("supersecret123", &hash).unwrap());
        assert!(!service.verify_password("wrongpassword", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_register_defaults_display_name_to_username() {
        let service = create_test_service().await;
        let resp = service
            .register(register_req("maker42", "maker@example.com"))
            .await
            .unwrap();

        assert_eq!(resp.username, "maker42");
        assert_eq!(resp.display_name, "maker42");
        assert_eq!(resp.token, resp.id.to_string());
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let service = create_test_service().await;
        service
            .register(register_req("maker42", "a@example.com"))
            .await
            .unwrap();

        let err = service
            .register(register_req("maker42", "b@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let service = create_test_service().await;
        service
            .register(register_req("maker42", "same@example.com"))
            .await
            .unwrap();

        let err = service
            .register(register_req("other", "same@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_login_wrong_password_matches_unknown_user() {
        let service = create_test_service().await;
        service
            .register(register_req("maker42", "maker@example.com"))
            .await
            .unwrap();

        let wrong_password = service
            .login(LoginRequest {
                username: Some("maker42".to_string()),
                password: Some("not-the-password".to_string()),
            })
            .await
            .unwrap_err();

        let unknown_user = service
            .login(LoginRequest {
                username: Some("nobody".to_string()),
                password: Some("whatever".to_string()),
            })
            .await
            .unwrap_err();

        assert_eq!(wrong_password.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_user.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_register_missing_fields_rejected() {
        let service = create_test_service().await;
        let err = service
            .register(RegisterRequest {
                username: Some("maker42".to_string()),
                email: None,
                password: Some("hunter2hunter2".to_string()),
                display_name: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_bearer_identity_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_identity(&headers).is_err());

        headers.insert(AUTHORIZATION, "Token 7".parse().unwrap());
        assert!(bearer_identity(&headers).is_err());

        headers.insert(AUTHORIZATION, "Bearer not-a-number".parse().unwrap());
        assert!(bearer_identity(&headers).is_err());

        headers.insert(AUTHORIZATION, "Bearer 42".parse().unwrap());
        assert_eq!(bearer_identity(&headers).unwrap().id, 42);
    }
}
