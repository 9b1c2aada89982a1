//! `/images` handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AppError;
use super::pagination::{PageQuery, resolve};
use crate::state::AppState;
use crate::types::{ImageRecord, Page};

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub id: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub id: Uuid,
}

pub async fn list_images(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ImageRecord>>, AppError> {
    let (page, limit) = resolve(&query, &state.pagination);
    Ok(Json(state.orchestrator.list_page(page, limit).await?))
}

pub async fn create_image(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Json<ImageRecord>, AppError> {
    let Json(req) = body?;
    let url = required(req.url, "url")?;
    Ok(Json(state.orchestrator.create(&url).await?))
}

pub async fn update_image(
    State(state): State<AppState>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<ImageRecord>, AppError> {
    let Json(req) = body?;
    let id = parse_id(req.id)?;
    let url = required(req.url, "url")?;
    Ok(Json(state.orchestrator.update(id, &url).await?))
}

pub async fn delete_image(
    State(state): State<AppState>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>, AppError> {
    let Json(req) = body?;
    let id = parse_id(req.id)?;
    let id = state.orchestrator.delete(id).await?;
    Ok(Json(DeleteResponse { id }))
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))
}

fn parse_id(raw: Option<String>) -> Result<Uuid, AppError> {
    let raw = required(raw, "id")?;
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::Validation(format!("invalid id '{raw}'")))
}
