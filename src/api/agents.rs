//! `/api/v1/spy-cats` handlers.

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

use crate::model::NewAgent;
use crate::storage::Storage;

use super::{ApiError, AppState, MAX_NAME_CHARS, check_id, check_text, done, ok};

#[derive(Debug, Deserialize)]
pub struct CreateAgent {
    name: String,
    years_of_experience: i64,
    breed: String,
    salary: f64,
}

#[derive(Debug, Deserialize)]
pub struct PatchAgent {
    salary: f64,
}

fn check_salary(salary: f64) -> Result<(), ApiError> {
    if !salary.is_finite() || salary <= 0.0 {
        return Err(ApiError::bad_request("salary must be greater than 0"));
    }
    Ok(())
}

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let cats = state.store(Storage::list_agents).await?;
    Ok(ok(json!({ "cats": cats })))
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateAgent>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    check_text("name", &req.name, MAX_NAME_CHARS)?;
    check_text("breed", &req.breed, MAX_NAME_CHARS)?;
    let years_of_experience = u32::try_from(req.years_of_experience)
        .map_err(|_| ApiError::bad_request("years_of_experience must be 0 or more"))?;
    check_salary(req.salary)?;

    if !state.breeds.is_valid_breed(&req.breed) {
        tracing::debug!(breed = %req.breed, "rejected unknown breed");
        return Err(ApiError::bad_request("invalid breed"));
    }

    let agent = NewAgent {
        name: req.name,
        years_of_experience,
        breed: req.breed,
        salary: req.salary,
    };
    let id = state.store(move |s| s.create_agent(&agent)).await?;

    tracing::info!(id, "spy cat created");
    Ok((StatusCode::CREATED, ok(json!({ "id": id }))))
}

pub async fn get(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let id = check_id("spy cat", id)?;

    let cat = state
        .store(move |s| s.get_agent(id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("spy cat not found: {id}")))?;
    Ok(ok(json!({ "cat": cat })))
}

pub async fn patch(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<PatchAgent>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let id = check_id("spy cat", id)?;
    let Json(req) = payload?;
    check_salary(req.salary)?;

    state
        .store(move |s| s.update_salary(id, req.salary))
        .await?;

    tracing::info!(id, salary = req.salary, "spy cat salary updated");
    Ok(done())
}

pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = path?;
    let id = check_id("spy cat", id)?;

    state.store(move |s| s.delete_agent(id)).await?;

    tracing::info!(id, "spy cat deleted");
    Ok(done())
}
