//! # Settings Module
//!
//! Community-submitted laser cutting settings: search with AND-composed
//! optional filters, top-by-score listing, ownership-scoped create/update/
//! delete, and vote submission with score aggregation.
//!
//! A setting's score is never stored; it is aggregated from the votes table
//! on every read. Vote submission upserts on the (user, setting) key and
//! recomputes the aggregate inside the same transaction, so the response
//! always reflects the vote just applied.

use crate::auth::bearer_identity;
use crate::db::{SqlValue, Store};
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

// ============================================================================
// Models
// ============================================================================

/// A setting row with its derived vote aggregate
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub id: i64,
    pub user_id: i64,
    pub machine_model_id: i64,
    pub material_id: i64,
    pub operation_id: i64,
    pub power: i64,
    pub speed: i64,
    pub passes: i64,
    pub frequency: Option<i64>,
    pub dpi: Option<i64>,
    pub notes: Option<String>,
    pub created_at: chrono::NaiveDateTime,
    /// Net sum of +1/-1 votes
    pub score: i64,
    /// Total number of votes cast
    pub votes: i64,
}

/// Vote aggregate returned after a vote is applied
#[derive(Debug, Serialize)]
pub struct VoteScore {
    pub score: i64,
    pub total: i64,
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Optional equality filters for GET /api/settings; supplied filters are
/// AND-composed, omitted ones impose no constraint.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsFilter {
    #[serde(default)]
    pub machine_model_id: Option<i64>,
    #[serde(default)]
    pub material_id: Option<i64>,
    #[serde(default)]
    pub operation_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Optional fields are tri-state: an absent JSON field maps to NULL, an
/// explicit value (including 0 or "") is stored as given.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSettingRequest {
    #[serde(default)]
    pub machine_model_id: Option<i64>,
    #[serde(default)]
    pub material_id: Option<i64>,
    #[serde(default)]
    pub operation_id: Option<i64>,
    #[serde(default)]
    pub power: Option<i64>,
    #[serde(default)]
    pub speed: Option<i64>,
    #[serde(default)]
    pub passes: Option<i64>,
    #[serde(default)]
    pub frequency: Option<i64>,
    #[serde(default)]
    pub dpi: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingRequest {
    #[serde(default)]
    pub power: Option<i64>,
    #[serde(default)]
    pub speed: Option<i64>,
    #[serde(default)]
    pub passes: Option<i64>,
    #[serde(default)]
    pub frequency: Option<i64>,
    #[serde(default)]
    pub dpi: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    #[serde(default)]
    pub value: Option<i64>,
}

// ============================================================================
// SettingsService Implementation
// ============================================================================

/// Service for settings CRUD and voting
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<Store>,
}

/// Shared SELECT joining each setting to its vote aggregate
const SETTING_SELECT: &str = "SELECT s.id, s.user_id, s.machine_model_id, s.material_id, \
     s.operation_id, s.power, s.speed, s.passes, s.frequency, s.dpi, s.notes, s.created_at, \
     COALESCE(SUM(v.value), 0) AS score, COUNT(v.value) AS votes \
     FROM settings s LEFT JOIN votes v ON v.setting_id = s.id";

fn setting_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Setting> {
    Ok(Setting {
        id: row.get(0)?,
        user_id: row.get(1)?,
        machine_model_id: row.get(2)?,
        material_id: row.get(3)?,
        operation_id: row.get(4)?,
        power: row.get(5)?,
        speed: row.get(6)?,
        passes: row.get(7)?,
        frequency: row.get(8)?,
        dpi: row.get(9)?,
        notes: row.get(10)?,
        created_at: row.get(11)?,
        score: row.get(12)?,
        votes: row.get(13)?,
    })
}

fn required(field: Option<i64>, name: &str) -> ApiResult<i64> {
    field.ok_or_else(|| ApiError::validation(format!("{} is required", name)))
}

impl SettingsService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Search settings; every supplied filter narrows the result set.
    pub async fn search(&self, filter: SettingsFilter) -> ApiResult<Vec<Setting>> {
        self.store
            .with_conn(move |conn| {
                let mut clauses: Vec<&str> = Vec::new();
                let mut params: Vec<i64> = Vec::new();

                if let Some(v) = filter.machine_model_id {
                    clauses.push("s.machine_model_id = ?");
                    params.push(v);
                }
                if let Some(v) = filter.material_id {
                    clauses.push("s.material_id = ?");
                    params.push(v);
                }
                if let Some(v) = filter.operation_id {
                    clauses.push("s.operation_id = ?");
                    params.push(v);
                }
                if let Some(v) = filter.user_id {
                    clauses.push("s.user_id = ?");
                    params.push(v);
                }

                let mut sql = String::from(SETTING_SELECT);
                if !clauses.is_empty() {
                    sql.push_str(" WHERE ");
                    sql.push_str(&clauses.join(" AND "));
                }
                sql.push_str(" GROUP BY s.id ORDER BY s.id");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params), |row| {
                        setting_from_row(row)
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Settings ordered by net score descending; ties break by ascending id.
    pub async fn top(&self) -> ApiResult<Vec<Setting>> {
        self.store
            .with_conn(|conn| {
                let sql = format!("{} GROUP BY s.id ORDER BY score DESC, s.id ASC", SETTING_SELECT);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| setting_from_row(row))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Fetch one setting by id
    pub async fn get(&self, id: i64) -> ApiResult<Setting> {
        let setting = self
            .store
            .with_conn(move |conn| {
                let sql = format!("{} WHERE s.id = ? GROUP BY s.id", SETTING_SELECT);
                conn.query_row(&sql, [id], |row| setting_from_row(row))
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })
            })
            .await?;

        setting.ok_or_else(|| ApiError::not_found("setting not found"))
    }

    /// Create a setting owned by `user_id`.
    ///
    /// A second setting for the same (user, machine model, material,
    /// operation) key is a 409.
    pub async fn create(&self, user_id: i64, req: CreateSettingRequest) -> ApiResult<i64> {
        let machine_model_id = required(req.machine_model_id, "machineModelId")?;
        let material_id = required(req.material_id, "materialId")?;
        let operation_id = required(req.operation_id, "operationId")?;
        let power = required(req.power, "power")?;
        let speed = required(req.speed, "speed")?;
        let passes = match req.passes {
            Some(p) if p > 0 => p,
            _ => 1,
        };

        let id = self
            .store
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO settings (user_id, machine_model_id, material_id, operation_id, \
                     power, speed, passes, frequency, dpi, notes) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    rusqlite::params![
                        user_id,
                        machine_model_id,
                        material_id,
                        operation_id,
                        power,
                        speed,
                        passes,
                        req.frequency,
                        req.dpi,
                        req.notes,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(|e| {
                e.on_conflict(
                    "you already have a setting for this machine/material/operation combination",
                )
            })?;

        info!("Setting {} created by user {}", id, user_id);
        Ok(id)
    }

    /// Update a setting; the predicate narrows on (id, owner), so updating
    /// someone else's setting is a 404, not a silent success.
    pub async fn update(&self, user_id: i64, id: i64, req: UpdateSettingRequest) -> ApiResult<()> {
        let power = required(req.power, "power")?;
        let speed = required(req.speed, "speed")?;
        let passes = match req.passes {
            Some(p) if p > 0 => p,
            _ => 1,
        };

        let affected = self
            .store
            .execute(
                "UPDATE settings SET power = ?, speed = ?, passes = ?, frequency = ?, dpi = ?, \
                 notes = ? WHERE id = ? AND user_id = ?",
                vec![
                    SqlValue::Integer(power),
                    SqlValue::Integer(speed),
                    SqlValue::Integer(passes),
                    req.frequency.map_or(SqlValue::Null, SqlValue::Integer),
                    req.dpi.map_or(SqlValue::Null, SqlValue::Integer),
                    req.notes.map_or(SqlValue::Null, SqlValue::Text),
                    SqlValue::Integer(id),
                    SqlValue::Integer(user_id),
                ],
            )
            .await?;

        if affected == 0 {
            return Err(ApiError::not_found("setting not found"));
        }
        Ok(())
    }

    /// Delete a setting; same ownership predicate and 404 behavior as update.
    pub async fn delete(&self, user_id: i64, id: i64) -> ApiResult<()> {
        let affected = self
            .store
            .execute(
                "DELETE FROM settings WHERE id = ? AND user_id = ?",
                vec![SqlValue::Integer(id), SqlValue::Integer(user_id)],
            )
            .await?;

        if affected == 0 {
            return Err(ApiError::not_found("setting not found"));
        }
        Ok(())
    }

    /// Apply a vote and return the fresh aggregate.
    ///
    /// The upsert and the recompute run in one IMMEDIATE transaction, so the
    /// returned score always includes the vote just cast. A repeat vote from
    /// the same user overwrites the prior value.
    pub async fn vote(&self, user_id: i64, setting_id: i64, value: i64) -> ApiResult<VoteScore> {
        if value != 1 && value != -1 {
            return Err(ApiError::validation("value must be 1 or -1"));
        }

        let score = self
            .store
            .with_transaction(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM settings WHERE id = ?)",
                    [setting_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Ok(None);
                }

                conn.execute(
                    "INSERT INTO votes (user_id, setting_id, value) VALUES (?, ?, ?) \
                     ON CONFLICT (user_id, setting_id) DO UPDATE SET value = excluded.value",
                    rusqlite::params![user_id, setting_id, value],
                )?;

                conn.query_row(
                    "SELECT COALESCE(SUM(value), 0), COUNT(*) FROM votes WHERE setting_id = ?",
                    [setting_id],
                    |row| {
                        Ok(VoteScore {
                            score: row.get(0)?,
                            total: row.get(1)?,
                        })
                    },
                )
                .map(Some)
            })
            .await?;

        score.ok_or_else(|| ApiError::not_found("setting not found"))
    }

    /// All settings owned by `user_id`
    pub async fn for_user(&self, user_id: i64) -> ApiResult<Vec<Setting>> {
        self.search(SettingsFilter {
            user_id: Some(user_id),
            ..SettingsFilter::default()
        })
        .await
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// App state for the settings router
#[derive(Clone)]
pub struct SettingsState {
    pub settings: SettingsService,
}

/// GET /api/settings
async fn search_handler(
    State(state): State<SettingsState>,
    Query(filter): Query<SettingsFilter>,
) -> Result<Json<Vec<Setting>>, ApiError> {
    Ok(Json(state.settings.search(filter).await?))
}

/// GET /api/settings/top
async fn top_handler(State(state): State<SettingsState>) -> Result<Json<Vec<Setting>>, ApiError> {
    Ok(Json(state.settings.top().await?))
}

/// GET /api/settings/:id
async fn get_handler(
    State(state): State<SettingsState>,
    Path(id): Path<i64>,
) -> Result<Json<Setting>, ApiError> {
    Ok(Json(state.settings.get(id).await?))
}

/// POST /api/settings
async fn create_handler(
    State(state): State<SettingsState>,
    headers: HeaderMap,
    Json(req): Json<CreateSettingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = bearer_identity(&headers)?;
    let id = state.settings.create(user.id, req).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// PUT /api/settings/:id
async fn update_handler(
    State(state): State<SettingsState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateSettingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = bearer_identity(&headers)?;
    state.settings.update(user.id, id, req).await?;
    Ok(Json(json!({ "message": "updated" })))
}

/// DELETE /api/settings/:id
async fn delete_handler(
    State(state): State<SettingsState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = bearer_identity(&headers)?;
    state.settings.delete(user.id, id).await?;
    Ok(Json(json!({ "message": "deleted" })))
}

/// POST /api/settings/:id/vote
async fn vote_handler(
    State(state): State<SettingsState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = bearer_identity(&headers)?;
    let value = req
        .value
        .ok_or_else(|| ApiError::validation("value is required"))?;
    let score = state.settings.vote(user.id, id, value).await?;
    Ok(Json(json!({ "score": score.score, "total": score.total })))
}

/// GET /api/profile/settings
async fn profile_handler(
    State(state): State<SettingsState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Setting>>, ApiError> {
    let user = bearer_identity(&headers)?;
    Ok(Json(state.settings.for_user(user.id).await?))
}

/// Creates the settings router (includes the profile listing)
pub fn create_settings_router(state: SettingsState) -> Router {
    Router::new()
        .route("/settings", get(search_handler).post(create_handler))
        .route("/settings/top", get(top_handler))
        .route(
            "/settings/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/settings/:id/vote", post(vote_handler))
        .route("/profile/settings", get(profile_handler))
        .with_state(state)
}

// ============================================================================
// Tests
// ============================================================================
