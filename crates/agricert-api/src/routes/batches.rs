//! # Batch API
//!
//! - `POST /api/batches`: register a batch (exporter)
//! - `GET /api/batches`: role-scoped, paginated listing
//! - `GET /api/batches/{id}`: batch with inspection and attachments
//! - `PUT /api/batches/{id}`: edit a submitted batch (owner)
//! - `DELETE /api/batches/{id}`: soft-delete (owner or admin)
//! - `POST /api/batches/{id}/assign-qa`: assign a QA agency (admin)
//! - `POST /api/batches/{id}/attachments`: record an uploaded document

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use agricert_core::{ActorId, BatchId};
use agricert_state::{BatchPatch, NewAttachment, NewBatch};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, Validate};
use crate::lifecycle::BatchQuery;
use crate::state::AppState;

use super::{parse_id, respond, ApiResponse};

// ── Request DTOs ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignQaRequest {
    pub qa_agency_id: Option<i64>,
}

impl Validate for AssignQaRequest {
    fn validate(&self) -> Result<(), Vec<String>> {
        match self.qa_agency_id {
            Some(_) => Ok(()),
            None => Err(vec!["QA agency ID is required".to_string()]),
        }
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/batches", get(list_batches).post(create_batch))
        .route(
            "/api/batches/{id}",
            get(get_batch).put(update_batch).delete(delete_batch),
        )
        .route("/api/batches/{id}/assign-qa", post(assign_qa))
        .route("/api/batches/{id}/attachments", post(add_attachment))
}

fn batch_id(raw: &str) -> Result<BatchId, AppError> {
    parse_id(raw, "Batch").map(BatchId)
}

// ── Handlers ────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/batches",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Batch created", body = ApiResponse),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not an exporter", body = crate::error::ErrorBody),
    ),
    tag = "batches"
)]
async fn create_batch(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<NewBatch>, JsonRejection>,
) -> Result<Response, AppError> {
    let input = extract_json(body)?;
    let batch = state.lifecycle.create_batch(&caller, input).await?;
    respond(StatusCode::CREATED, "Batch created successfully", batch)
}

#[utoipa::path(
    get,
    path = "/api/batches",
    params(BatchQuery),
    responses(
        (status = 200, description = "Page of batches visible to the caller", body = ApiResponse),
    ),
    tag = "batches"
)]
async fn list_batches(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<BatchQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = extract_query(query)?;
    let page = state.lifecycle.list_batches(&caller, &query)?;
    respond(StatusCode::OK, "Batches retrieved successfully", page)
}

#[utoipa::path(
    get,
    path = "/api/batches/{id}",
    params(("id" = i64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch detail", body = ApiResponse),
        (status = 403, description = "Not the owner or assigned agency", body = crate::error::ErrorBody),
        (status = 404, description = "Batch not found", body = crate::error::ErrorBody),
    ),
    tag = "batches"
)]
async fn get_batch(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let detail = state.lifecycle.get_batch(&caller, batch_id(&id)?).await?;
    respond(StatusCode::OK, "Batch retrieved successfully", detail)
}

#[utoipa::path(
    put,
    path = "/api/batches/{id}",
    params(("id" = i64, Path, description = "Batch ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Batch updated", body = ApiResponse),
        (status = 400, description = "Empty patch, bad value, or batch no longer submitted", body = crate::error::ErrorBody),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
    ),
    tag = "batches"
)]
async fn update_batch(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<BatchPatch>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = batch_id(&id)?;
    let patch = extract_json(body)?;
    let batch = state.lifecycle.update_batch(&caller, id, patch).await?;
    respond(StatusCode::OK, "Batch updated successfully", batch)
}

#[utoipa::path(
    delete,
    path = "/api/batches/{id}",
    params(("id" = i64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch deleted", body = ApiResponse),
        (status = 400, description = "Batch is not submitted", body = crate::error::ErrorBody),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
    ),
    tag = "batches"
)]
async fn delete_batch(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    state.lifecycle.delete_batch(&caller, batch_id(&id)?).await?;
    respond(StatusCode::OK, "Batch deleted successfully", serde_json::Value::Null)
}

#[utoipa::path(
    post,
    path = "/api/batches/{id}/assign-qa",
    params(("id" = i64, Path, description = "Batch ID")),
    request_body = AssignQaRequest,
    responses(
        (status = 200, description = "QA agency assigned", body = ApiResponse),
        (status = 400, description = "Missing id, non-QA actor, or wrong batch status", body = crate::error::ErrorBody),
        (status = 404, description = "Batch or agency not found", body = crate::error::ErrorBody),
    ),
    tag = "batches"
)]
async fn assign_qa(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<AssignQaRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = batch_id(&id)?;
    let req = extract_validated_json(body)?;
    let qa = ActorId(req.qa_agency_id.unwrap_or_default());
    let batch = state.lifecycle.assign_qa(&caller, id, qa).await?;
    respond(StatusCode::OK, "QA agency assigned successfully", batch)
}

#[utoipa::path(
    post,
    path = "/api/batches/{id}/attachments",
    params(("id" = i64, Path, description = "Batch ID")),
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Attachment recorded", body = ApiResponse),
        (status = 400, description = "Validation error or batch closed to attachments", body = crate::error::ErrorBody),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
    ),
    tag = "batches"
)]
async fn add_attachment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<NewAttachment>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = batch_id(&id)?;
    let input = extract_json(body)?;
    let attachment = state.lifecycle.add_attachment(&caller, id, input).await?;
    respond(StatusCode::CREATED, "Attachment added successfully", attachment)
}
