//! # Actor API (admin)
//!
//! Profiles of exporters and QA agencies. Their details become the
//! issuer and holder claims of issued credentials.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use agricert_core::ActorId;
use agricert_state::{ActorPatch, NewActor, Role};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::state::AppState;

use super::{parse_id, respond, ApiResponse};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActorQuery {
    /// `exporter`, `qa_agency` or `admin`.
    pub role: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/actors", get(list_actors).post(register_actor))
        .route("/api/actors/{id}", get(get_actor).put(update_actor))
}

fn actor_id(raw: &str) -> Result<ActorId, AppError> {
    parse_id(raw, "Actor").map(ActorId)
}

#[utoipa::path(
    post,
    path = "/api/actors",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Actor registered", body = ApiResponse),
        (status = 400, description = "Validation error", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "actors"
)]
async fn register_actor(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<NewActor>, JsonRejection>,
) -> Result<Response, AppError> {
    let input = extract_json(body)?;
    let profile = state.lifecycle.register_actor(&caller, input).await?;
    respond(StatusCode::CREATED, "Actor registered successfully", profile)
}

#[utoipa::path(
    get,
    path = "/api/actors",
    params(ActorQuery),
    responses(
        (status = 200, description = "Actor profiles", body = ApiResponse),
        (status = 400, description = "Unknown role filter", body = crate::error::ErrorBody),
    ),
    tag = "actors"
)]
async fn list_actors(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<ActorQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = extract_query(query)?;
    let role = query.role.as_deref().map(str::parse::<Role>).transpose()?;
    let actors = state.lifecycle.list_actors(&caller, role)?;
    respond(StatusCode::OK, "Actors retrieved successfully", actors)
}

#[utoipa::path(
    get,
    path = "/api/actors/{id}",
    params(("id" = i64, Path, description = "Actor ID")),
    responses(
        (status = 200, description = "Actor profile", body = ApiResponse),
        (status = 404, description = "Actor not found", body = crate::error::ErrorBody),
    ),
    tag = "actors"
)]
async fn get_actor(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let profile = state.lifecycle.get_actor(&caller, actor_id(&id)?)?;
    respond(StatusCode::OK, "Actor retrieved successfully", profile)
}

#[utoipa::path(
    put,
    path = "/api/actors/{id}",
    params(("id" = i64, Path, description = "Actor ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Actor updated", body = ApiResponse),
        (status = 404, description = "Actor not found", body = crate::error::ErrorBody),
    ),
    tag = "actors"
)]
async fn update_actor(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<ActorPatch>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = actor_id(&id)?;
    let patch = extract_json(body)?;
    let profile = state.lifecycle.update_actor(&caller, id, patch).await?;
    respond(StatusCode::OK, "Actor updated successfully", profile)
}
