//! `/api/v1/missions/{mission_id}/targets` handlers.
//!
//! A target addressed under a mission it doesn't belong to is reported as
//! not found.

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::model::TargetUpdate;

use super::{ApiError, AppState, check_id, check_notes, check_target_fields, done, ok};

#[derive(Debug, Deserialize)]
pub struct AddTarget {
    name: String,
    country: String,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Deserialize)]
pub struct PatchTarget {
    notes: Option<String>,
    complete: Option<bool>,
}

/// Validates both path ids and confirms the target sits under the mission.
async fn locate(
    state: &AppState,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<i64, ApiError> {
    let Path((mission_id, target_id)) = path?;
    let mission_id = check_id("mission", mission_id)?;
    let target_id = check_id("target", target_id)?;

    let target = state.store(move |s| s.get_target(target_id)).await?;
    match target {
        Some(t) if t.mission_id == mission_id => Ok(target_id),
        _ => Err(ApiError::not_found(format!(
            "target {target_id} not found in mission {mission_id}"
        ))),
    }
}

pub async fn add(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<AddTarget>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(mission_id) = path?;
    let mission_id = check_id("mission", mission_id)?;
    let Json(req) = payload?;
    check_target_fields(&req.name, &req.country, &req.notes)?;

    let id = state
        .store(move |s| s.add_target(mission_id, &req.name, &req.country, &req.notes))
        .await?;

    tracing::info!(id, mission_id, "target added");
    Ok((StatusCode::CREATED, ok(json!({ "id": id }))))
}

/// Applies `notes` first, then `complete`. Both land or neither does.
pub async fn patch(
    State(state): State<AppState>,
    path: Result<Path<(i64, i64)>, PathRejection>,
    payload: Result<Json<PatchTarget>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = locate(&state, path).await?;
    let Json(req) = payload?;
    if let Some(notes) = &req.notes {
        check_notes(notes)?;
    }

    match (req.notes, req.complete) {
        (None, None) => return Err(ApiError::bad_request("no update fields provided")),
        (Some(notes), None) => {
            state
                .store(move |s| s.update_target_notes(id, &notes))
                .await?;
            tracing::info!(id, "target notes updated");
        }
        (None, Some(complete)) => {
            state
                .store(move |s| s.update_target_complete(id, complete))
                .await?;
            tracing::info!(id, complete, "target completion updated");
        }
        (Some(notes), Some(complete)) => {
            state
                .store(move |s| s.patch_target(id, Some(&notes), Some(complete)))
                .await?;
            tracing::info!(id, complete, "target notes and completion updated");
        }
    }

    Ok(done())
}

pub async fn replace(
    State(state): State<AppState>,
    path: Result<Path<(i64, i64)>, PathRejection>,
    payload: Result<Json<TargetUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = locate(&state, path).await?;
    let Json(update) = payload?;
    check_target_fields(&update.name, &update.country, &update.notes)?;

    state.store(move |s| s.update_target(id, &update)).await?;

    tracing::info!(id, "target replaced");
    Ok(done())
}

pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = locate(&state, path).await?;

    state.store(move |s| s.delete_target(id)).await?;

    tracing::info!(id, "target deleted");
    Ok(done())
}
