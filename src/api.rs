//! # Laserscribe API
//!
//! The HTTP JSON API layer powered by Axum. Composes the auth, catalog,
//! and settings routers under `/api` with CORS and request tracing.
//!
//! ## Endpoints
//!
//! - `POST /api/register`, `POST /api/login`
//! - `GET  /api/brands`, `GET /api/brands/:id/models`
//! - `GET  /api/categories`, `GET /api/materials`, `GET /api/materials/:id/aliases`
//! - `GET  /api/operations`
//! - `GET  /api/settings`, `GET /api/settings/top`, `GET /api/settings/:id`
//! - `POST /api/settings`, `PUT/DELETE /api/settings/:id` (bearer token)
//! - `POST /api/settings/:id/vote` (bearer token)
//! - `GET  /api/profile/settings` (bearer token)
//! - `GET  /api/health`

use crate::auth::{create_auth_router, AuthService, AuthState};
use crate::catalog::{create_catalog_router, CatalogState};
use crate::db::Store;
use crate::settings::{create_settings_router, SettingsService, SettingsState};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

/// GET /api/health
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state
        .store
        .with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
        .await
    {
        Ok(_) => Json(json!({ "status": "ok" })),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            Json(json!({ "status": "degraded" }))
        }
    }
}

/// Creates the Axum router with all endpoints
pub fn create_router(store: Arc<Store>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth_state = AuthState {
        auth: AuthService::new(Arc::clone(&store)),
    };
    let catalog_state = CatalogState {
        store: Arc::clone(&store),
    };
    let settings_state = SettingsState {
        settings: SettingsService::new(Arc::clone(&store)),
    };
    let app_state = AppState { store };

    let api = Router::new()
        .route("/health", get(health_handler))
        .with_state(app_state)
        .merge(create_auth_router(auth_state))
        .merge(create_catalog_router(catalog_state))
        .merge(create_settings_router(settings_state));

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
