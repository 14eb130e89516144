//! # Inspection API
//!
//! - `POST /api/inspections`: start inspecting an assigned batch
//! - `GET /api/inspections/pending`: the caller's queue, oldest first
//! - `GET /api/inspections/{id}`: one inspection
//! - `PUT /api/inspections/{id}`: record findings before submission
//! - `POST /api/inspections/{id}/submit`: submit the result
//! - `GET /api/inspections/batch/{batchId}`: inspection of a batch

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use agricert_core::{BatchId, InspectionId};
use agricert_state::{BatchRecord, InspectionPatch, InspectionRecord, InspectionResult};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::state::AppState;

use super::{parse_id, respond, ApiResponse};

// ── Request/Response DTOs ───────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartInspectionRequest {
    pub batch_id: Option<i64>,
}

impl Validate for StartInspectionRequest {
    fn validate(&self) -> Result<(), Vec<String>> {
        match self.batch_id {
            Some(_) => Ok(()),
            None => Err(vec!["Batch ID is required".to_string()]),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitResultRequest {
    /// `passed`, `failed` or `conditional`.
    pub result: Option<String>,
}

impl SubmitResultRequest {
    fn parse(&self) -> Result<InspectionResult, AppError> {
        match self.result.as_deref() {
            Some(raw) => Ok(raw.parse()?),
            None => Err(AppError::Validation(vec!["Result is required".to_string()])),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmittedInspection {
    inspection: InspectionRecord,
    batch: BatchRecord,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/inspections", post(start_inspection))
        .route("/api/inspections/pending", get(pending_inspections))
        .route(
            "/api/inspections/{id}",
            get(get_inspection).put(update_inspection),
        )
        .route("/api/inspections/{id}/submit", post(submit_result))
        .route("/api/inspections/batch/{batchId}", get(inspection_for_batch))
}

fn inspection_id(raw: &str) -> Result<InspectionId, AppError> {
    parse_id(raw, "Inspection").map(InspectionId)
}

// ── Handlers ────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/inspections",
    request_body = StartInspectionRequest,
    responses(
        (status = 201, description = "Inspection started", body = ApiResponse),
        (status = 400, description = "Batch not under inspection or already started", body = crate::error::ErrorBody),
        (status = 403, description = "Batch not assigned to the caller", body = crate::error::ErrorBody),
    ),
    tag = "inspections"
)]
async fn start_inspection(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<StartInspectionRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = extract_validated_json(body)?;
    let batch = BatchId(req.batch_id.unwrap_or_default());
    let inspection = state.lifecycle.start_inspection(&caller, batch).await?;
    respond(StatusCode::CREATED, "Inspection started successfully", inspection)
}

#[utoipa::path(
    get,
    path = "/api/inspections/pending",
    responses(
        (status = 200, description = "Batches awaiting the caller's result", body = ApiResponse),
        (status = 403, description = "Caller is not a QA agency", body = crate::error::ErrorBody),
    ),
    tag = "inspections"
)]
async fn pending_inspections(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Response, AppError> {
    let pending = state.lifecycle.pending_inspections(&caller)?;
    respond(StatusCode::OK, "Pending inspections retrieved successfully", pending)
}

#[utoipa::path(
    get,
    path = "/api/inspections/{id}",
    params(("id" = i64, Path, description = "Inspection ID")),
    responses(
        (status = 200, description = "Inspection", body = ApiResponse),
        (status = 404, description = "Inspection not found", body = crate::error::ErrorBody),
    ),
    tag = "inspections"
)]
async fn get_inspection(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let inspection = state.lifecycle.get_inspection(&caller, inspection_id(&id)?)?;
    respond(StatusCode::OK, "Inspection retrieved successfully", inspection)
}

#[utoipa::path(
    put,
    path = "/api/inspections/{id}",
    params(("id" = i64, Path, description = "Inspection ID")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Findings recorded", body = ApiResponse),
        (status = 400, description = "Out-of-range value or result already submitted", body = crate::error::ErrorBody),
        (status = 403, description = "Not the performing agency", body = crate::error::ErrorBody),
    ),
    tag = "inspections"
)]
async fn update_inspection(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<InspectionPatch>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = inspection_id(&id)?;
    let patch = extract_json(body)?;
    let inspection = state.lifecycle.update_inspection(&caller, id, patch).await?;
    respond(StatusCode::OK, "Inspection updated successfully", inspection)
}

#[utoipa::path(
    post,
    path = "/api/inspections/{id}/submit",
    params(("id" = i64, Path, description = "Inspection ID")),
    request_body = SubmitResultRequest,
    responses(
        (status = 200, description = "Result submitted; batch moved to certified or rejected", body = ApiResponse),
        (status = 400, description = "Invalid result, incomplete findings, or already submitted", body = crate::error::ErrorBody),
        (status = 403, description = "Not the performing agency", body = crate::error::ErrorBody),
    ),
    tag = "inspections"
)]
async fn submit_result(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<SubmitResultRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let id = inspection_id(&id)?;
    let result = extract_json(body)?.parse()?;
    let (inspection, batch) = state.lifecycle.submit_result(&caller, id, result).await?;
    respond(
        StatusCode::OK,
        "Inspection result submitted successfully",
        SubmittedInspection { inspection, batch },
    )
}

#[utoipa::path(
    get,
    path = "/api/inspections/batch/{batchId}",
    params(("batchId" = i64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Inspection of the batch", body = ApiResponse),
        (status = 404, description = "No inspection found for this batch", body = crate::error::ErrorBody),
    ),
    tag = "inspections"
)]
async fn inspection_for_batch(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(batch_id): Path<String>,
) -> Result<Response, AppError> {
    let batch = parse_id(&batch_id, "Batch").map(BatchId)?;
    let inspection = state.lifecycle.inspection_for_batch(&caller, batch)?;
    respond(StatusCode::OK, "Inspection retrieved successfully", inspection)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    /// Create a batch as the exporter and assign it to QA agency 2.
    async fn assigned_batch(app: &axum::Router) -> i64 {
        let (_, body) = call(
            app,
            "POST",
            "/api/batches",
            Some(&exporter()),
            Some(json!({
                "productType": "spice",
                "productName": "Turmeric",
                "quantity": 300.0,
                "unit": "kg",
                "originLocation": "Erode",
                "destinationCountry": "DE"
            })),
        )
        .await;
        let id = body["data"]["id"].as_i64().unwrap();
        let (status, _) = call(
            app,
            "POST",
            &format!("/api/batches/{id}/assign-qa"),
            Some(&admin()),
            Some(json!({"qaAgencyId": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        id
    }

    #[tokio::test]
    async fn assigned_agency_starts_inspection_once() {
        let (app, _) = test_app().await;
        let batch = assigned_batch(&app).await;

        let (status, _) = call(&app, "GET", "/api/inspections/pending", Some(&qa()), None).await;
        assert_eq!(status, StatusCode::OK);

        let start = json!({"batchId": batch});
        let (status, body) =
            call(&app, "POST", "/api/inspections", Some(&qa()), Some(start.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["batchId"], batch);

        let (status, _) = call(&app, "POST", "/api/inspections", Some(&qa()), Some(start)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "GET",
            &format!("/api/inspections/batch/{batch}"),
            Some(&exporter()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["qaAgencyId"], 2);
    }

    #[tokio::test]
    async fn unassigned_agency_is_forbidden() {
        let (app, _) = test_app().await;
        let batch = assigned_batch(&app).await;
        let other = bearer(agricert_state::Role::QaAgency, Some(agricert_core::ActorId(3)));
        let (status, _) = call(
            &app,
            "POST",
            "/api/inspections",
            Some(&other),
            Some(json!({"batchId": batch})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_result_value_is_rejected() {
        let (app, _) = test_app().await;
        let batch = assigned_batch(&app).await;
        let (_, body) = call(
            &app,
            "POST",
            "/api/inspections",
            Some(&qa()),
            Some(json!({"batchId": batch})),
        )
        .await;
        let id = body["data"]["id"].as_i64().unwrap();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/inspections/{id}/submit"),
            Some(&qa()),
            Some(json!({"result": "excellent"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Invalid result. Must be: passed, failed, or conditional"
        );
    }

    #[tokio::test]
    async fn missing_batch_id_is_a_validation_error() {
        let (app, _) = test_app().await;
        let (status, body) =
            call(&app, "POST", "/api/inspections", Some(&qa()), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
}
