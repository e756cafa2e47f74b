//! # Laserscribe
//!
//! A community-driven database of laser cutting settings. Users register,
//! browse machine and material reference data, submit their proven
//! power/speed/passes configurations, and vote settings up or down.
//!
//! ## Core Components
//!
//! - **API**: HTTP JSON routing via Axum
//! - **Auth**: registration/login with Argon2id hashing and the bearer
//!   identity gate
//! - **Catalog**: read-only brand/model/material/operation reference data
//! - **Settings**: search, CRUD with ownership scoping, and vote scoring
//! - **Store**: SQLite persistence with an embedded schema bootstrap

pub mod api;
pub mod auth;
pub mod catalog;
pub mod db;
pub mod error;
pub mod settings;

pub use error::{ApiError, ApiResult};
