//! `/api/v1/missions` handlers.

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

use crate::model::{NewMission, NewTarget};
use crate::storage::Storage;

use super::{ApiError, AppState, check_id, check_target_fields, done, ok};

#[derive(Debug, Deserialize)]
pub struct CreateMission {
    #[serde(default)]
    cat_id: Option<i64>,
    targets: Vec<NewTarget>,
    #[serde(default)]
    complete: bool,
}

/// Exactly one field must be present.
#[derive(Debug, Deserialize)]
pub struct PatchMission {
    complete: Option<bool>,
    cat_id: Option<i64>,
}

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let missions = state.store(Storage::list_missions).await?;
    Ok(ok(json!({ "missions": missions })))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateMission>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    if let Some(cat_id) = req.cat_id {
        check_id("spy cat", cat_id)?;
    }
    for target in &req.targets {
        check_target_fields(&target.name, &target.country, &target.notes)?;
    }

    let mission = NewMission {
        agent_id: req.cat_id,
        targets: req.targets,
        complete: req.complete,
    };
    let id = state.store(move |s| s.create_mission(&mission)).await?;

    tracing::info!(id, "mission created");
    Ok((StatusCode::CREATED, ok(json!({ "id": id }))))
}

pub async fn get(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let id = check_id("mission", id)?;

    let mission = state
        .store(move |s| s.get_mission(id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("mission not found: {id}")))?;
    Ok(ok(json!({ "mission": mission })))
}

pub async fn patch(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<PatchMission>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let id = check_id("mission", id)?;
    let Json(req) = payload?;

    match (req.complete, req.cat_id) {
        (None, None) => Err(ApiError::bad_request("no update fields provided")),
        (Some(_), Some(_)) => Err(ApiError::bad_request(
            "cannot update both complete status and cat_id at the same time",
        )),
        (Some(complete), None) => {
            state
                .store(move |s| s.set_mission_complete(id, complete))
                .await?;
            tracing::info!(id, complete, "mission completion updated");
            Ok(done())
        }
        (None, Some(cat_id)) => {
            let cat_id = check_id("spy cat", cat_id)?;
            state.store(move |s| s.assign_agent(id, cat_id)).await?;
            tracing::info!(id, cat_id, "spy cat assigned to mission");
            Ok(done())
        }
    }
}

pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let id = check_id("mission", id)?;

    state.store(move |s| s.delete_mission(id)).await?;

    tracing::info!(id, "mission deleted");
    Ok(done())
}
