//! HTTP API for the spy-cat agency.
//!
//! Handlers decode and validate requests, make exactly one store call (run
//! on the blocking pool), and wrap the result in the JSON envelope:
//!
//! ```text
//! {"status": "OK", ...fields}
//! {"status": "Error", "error": "<message>"}
//! ```
//!
//! Routes live under `/api/v1`: `spy-cats`, `missions`,
//! `missions/{mission_id}/targets`, and `breeds`.

mod agents;
mod error;
mod missions;
mod targets;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;

use crate::breeds::BreedCache;
use crate::storage::{self, Storage};

pub use error::ApiError;

/// Longest accepted agent name, breed, target name, or country.
const MAX_NAME_CHARS: usize = 100;

const MAX_NOTES_CHARS: usize = 500;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    storage: Arc<Storage>,
    breeds: BreedCache,
}

impl AppState {
    pub fn new(storage: Arc<Storage>, breeds: BreedCache) -> Self {
        Self { storage, breeds }
    }

    /// Runs a store operation on the blocking pool.
    async fn store<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Storage) -> storage::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        Ok(tokio::task::spawn_blocking(move || op(&storage)).await??)
    }
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/spy-cats", get(agents::list).post(agents::create))
        .route(
            "/api/v1/spy-cats/{id}",
            get(agents::get).patch(agents::patch).delete(agents::delete),
        )
        .route(
            "/api/v1/missions",
            get(missions::list).post(missions::create),
        )
        .route(
            "/api/v1/missions/{id}",
            get(missions::get)
                .patch(missions::patch)
                .delete(missions::delete),
        )
        .route("/api/v1/missions/{mission_id}/targets", post(targets::add))
        .route(
            "/api/v1/missions/{mission_id}/targets/{target_id}",
            axum::routing::patch(targets::patch)
                .put(targets::replace)
                .delete(targets::delete),
        )
        .route("/api/v1/breeds", get(list_breeds))
        .fallback(|| async { ApiError::not_found("no such route") })
        .with_state(state)
}

/// Success body: `status: "OK"` alongside the fields of `body`.
#[derive(Serialize)]
struct Envelope<T> {
    status: &'static str,
    #[serde(flatten)]
    body: T,
}

fn ok<T: Serialize>(body: T) -> Json<Envelope<T>> {
    Json(Envelope { status: "OK", body })
}

/// An `OK` envelope with no other fields.
fn done() -> Json<Envelope<serde_json::Value>> {
    ok(json!({}))
}

async fn list_breeds(State(state): State<AppState>) -> Json<Envelope<serde_json::Value>> {
    let snapshot = state.breeds.snapshot();
    ok(json!({
        "breeds": snapshot.names,
        "refreshed_at": snapshot.refreshed_at,
    }))
}

fn check_id(what: &str, id: i64) -> Result<i64, ApiError> {
    if id < 1 {
        return Err(ApiError::bad_request(format!("invalid {what} id")));
    }
    Ok(id)
}

/// Requires between 1 and `max` characters.
fn check_text(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(ApiError::bad_request(format!(
            "{field} must be between 1 and {max} characters"
        )));
    }
    Ok(())
}

fn check_notes(notes: &str) -> Result<(), ApiError> {
    if notes.chars().count() > MAX_NOTES_CHARS {
        return Err(ApiError::bad_request(format!(
            "notes must be at most {MAX_NOTES_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_target_fields(name: &str, country: &str, notes: &str) -> Result<(), ApiError> {
    check_text("name", name, MAX_NAME_CHARS)?;
    check_text("country", country, MAX_NAME_CHARS)?;
    check_notes(notes)
}
