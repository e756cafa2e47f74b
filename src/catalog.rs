//! # Catalog Module
//!
//! Read-only reference data: brands, machine models, material categories,
//! materials (with free-text search across names and aliases), and
//! operations. No pagination or ranking; every endpoint is a direct read.

use crate::db::Store;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Serialize)]
pub struct Brand {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineModel {
    pub id: i64,
    pub brand_id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialAlias {
    pub id: i64,
    pub material_id: i64,
    pub alias: String,
}

#[derive(Debug, Serialize)]
pub struct Operation {
    pub id: i64,
    pub name: String,
}

/// Query parameters for GET /api/materials
#[derive(Debug, Deserialize)]
pub struct MaterialQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

// ============================================================================
// Queries
// ============================================================================

async fn all_brands(store: &Store) -> ApiResult<Vec<Brand>> {
    store
        .with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM brands ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Brand {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

async fn models_by_brand(store: &Store, brand_id: i64) -> ApiResult<Vec<MachineModel>> {
    store
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, brand_id, name FROM machine_models WHERE brand_id = ? ORDER BY name",
            )?;
            let rows = stmt
                .query_map([brand_id], |row| {
                    Ok(MachineModel {
                        id: row.get(0)?,
                        brand_id: row.get(1)?,
                        name: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

async fn all_categories(store: &Store) -> ApiResult<Vec<Category>> {
    store
        .with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM material_categories ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

fn material_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Material> {
    Ok(Material {
        id: row.get(0)?,
        category_id: row.get(1)?,
        name: row.get(2)?,
    })
}

/// Case-insensitive substring match over material names and aliases.
async fn search_materials(store: &Store, term: String) -> ApiResult<Vec<Material>> {
    store
        .with_conn(move |conn| {
            let pattern = format!("%{}%", term.to_lowercase());
            let mut stmt = conn.prepare(
                "SELECT DISTINCT m.id, m.category_id, m.name
                 FROM materials m
                 LEFT JOIN material_aliases a ON a.material_id = m.id
                 WHERE LOWER(m.name) LIKE ?1 OR LOWER(a.alias) LIKE ?1
                 ORDER BY m.name",
            )?;
            let rows = stmt
                .query_map([pattern], |row| material_from_row(row))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

async fn materials_by_category(store: &Store, category_id: i64) -> ApiResult<Vec<Material>> {
    store
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, category_id, name FROM materials WHERE category_id = ? ORDER BY name",
            )?;
            let rows = stmt
                .query_map([category_id], |row| material_from_row(row))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

async fn all_materials(store: &Store) -> ApiResult<Vec<Material>> {
    store
        .with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, category_id, name FROM materials ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| material_from_row(row))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

async fn aliases_by_material(store: &Store, material_id: i64) -> ApiResult<Vec<MaterialAlias>> {
    store
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, material_id, alias FROM material_aliases WHERE material_id = ? ORDER BY alias",
            )?;
            let rows = stmt
                .query_map([material_id], |row| {
                    Ok(MaterialAlias {
                        id: row.get(0)?,
                        material_id: row.get(1)?,
                        alias: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

async fn all_operations(store: &Store) -> ApiResult<Vec<Operation>> {
    store
        .with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM operations ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Operation {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
}

// ============================================================================
// API Handlers
// ============================================================================

/// App state for the catalog router
#[derive(Clone)]
pub struct CatalogState {
    pub store: Arc<Store>,
}

/// GET /api/brands
async fn brands_handler(State(state): State<CatalogState>) -> Result<Json<Vec<Brand>>, ApiError> {
    Ok(Json(all_brands(&state.store).await?))
}

/// GET /api/brands/:id/models
async fn models_handler(
    State(state): State<CatalogState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<MachineModel>>, ApiError> {
    Ok(Json(models_by_brand(&state.store, id).await?))
}

/// GET /api/categories
async fn categories_handler(
    State(state): State<CatalogState>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(all_categories(&state.store).await?))
}

/// GET /api/materials
///
/// `search` takes precedence over `category_id` when both are supplied.
async fn materials_handler(
    State(state): State<CatalogState>,
    Query(query): Query<MaterialQuery>,
) -> Result<Json<Vec<Material>>, ApiError> {
    let materials = match query {
        MaterialQuery {
            search: Some(term), ..
        } if !term.is_empty() => search_materials(&state.store, term).await?,
        MaterialQuery {
            category_id: Some(id),
            ..
        } => materials_by_category(&state.store, id).await?,
        _ => all_materials(&state.store).await?,
    };
    Ok(Json(materials))
}

/// GET /api/materials/:id/aliases
async fn aliases_handler(
    State(state): State<CatalogState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<MaterialAlias>>, ApiError> {
    Ok(Json(aliases_by_material(&state.store, id).await?))
}

/// GET /api/operations
async fn operations_handler(
    State(state): State<CatalogState>,
) -> Result<Json<Vec<Operation>>, ApiError> {
    Ok(Json(all_operations(&state.store).await?))
}

/// Creates the catalog router
pub fn create_catalog_router(state: CatalogState) -> Router {
    Router::new()
        .route("/brands", get(brands_handler))
        .route("/brands/:id/models", get(models_handler))
        .route("/categories", get(categories_handler))
        .route("/materials", get(materials_handler))
        .route("/materials/:id/aliases", get(aliases_handler))
        .route("/operations", get(operations_handler))
        .with_state(state)
}

// ============================================================================
// Tests
// ============================================================================
