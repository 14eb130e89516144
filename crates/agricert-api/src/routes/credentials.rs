//! # Credential API
//!
//! Authenticated:
//!
//! - `POST /api/credentials/issue`: issue for a passed inspection (QA agency)
//! - `GET /api/credentials`: filtered listing (QA agency, admin)
//! - `GET /api/credentials/statistics`: totals (admin)
//! - `GET /api/credentials/{id}`: one credential, by `VC-…` id or row key
//! - `GET /api/credentials/{id}/qr`: the stored QR artifact
//! - `GET /api/credentials/{id}/revocation-status`
//! - `GET /api/credentials/{id}/verifications`: verification history
//! - `POST /api/credentials/{id}/revoke`: revoke (issuer, admin)
//! - `POST /api/credentials/{id}/regenerate-qr`: re-render the QR
//! - `GET /api/credentials/batch/{batchId}`: every credential of a batch
//!
//! Public:
//!
//! - `POST /api/credentials/verify`: verify a presented document
//! - `GET /api/credentials/batch/{batchId}/document`: the signed document a
//!   QR code points at

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use agricert_core::{BatchId, InspectionId};
use agricert_state::VerifierContext;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, Validate};
use crate::lifecycle::{CredentialQuery, Provenance};
use crate::state::AppState;

use super::{parse_id, respond, ApiResponse};

const QR_CACHE_CONTROL: &str = "public, max-age=3600";

// ── Request DTOs ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredentialRequest {
    pub batch_id: Option<i64>,
    pub inspection_id: Option<i64>,
}

impl Validate for IssueCredentialRequest {
    fn validate(&self) -> Result<(), Vec<String>> {
        if self.batch_id.is_some() && self.inspection_id.is_some() {
            Ok(())
        } else {
            Err(vec!["Batch ID and Inspection ID are required".to_string()])
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeCredentialRequest {
    pub reason: Option<String>,
}

/// A presented document plus the verifier's self-declared context.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCredentialRequest {
    #[schema(value_type = Option<Object>)]
    pub credential: Option<Value>,
    /// Accepted as an alias of `credential`.
    #[schema(value_type = Option<Object>)]
    pub vc_data: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub verifier: Option<VerifierContext>,
    /// `api` when absent; scanners send `qr_scan`.
    pub method: Option<String>,
}

impl Validate for VerifyCredentialRequest {
    fn validate(&self) -> Result<(), Vec<String>> {
        match (&self.credential, &self.vc_data) {
            (Some(_), _) | (None, Some(_)) => Ok(()),
            (None, None) => Err(vec!["Credential data is required".to_string()]),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DocumentQuery {
    /// QR checksum; selects an older credential of the batch.
    pub checksum: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Most recent entries to return (default 50).
    pub limit: Option<usize>,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/credentials", get(list_credentials))
        .route("/api/credentials/issue", post(issue_credential))
        .route("/api/credentials/statistics", get(credential_statistics))
        .route("/api/credentials/{id}", get(get_credential))
        .route("/api/credentials/{id}/qr", get(credential_qr))
        .route(
            "/api/credentials/{id}/revocation-status",
            get(revocation_status),
        )
        .route(
            "/api/credentials/{id}/verifications",
            get(verification_history),
        )
        .route("/api/credentials/{id}/revoke", post(revoke_credential))
        .route("/api/credentials/{id}/regenerate-qr", post(regenerate_qr))
        .route(
            "/api/credentials/batch/{batchId}",
            get(credentials_for_batch),
        )
}

/// Routes reachable without a bearer token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/credentials/verify", post(verify_credential))
        .route(
            "/api/credentials/batch/{batchId}/document",
            get(public_document),
        )
}

// ── Handlers ────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/api/credentials/issue",
    request_body = IssueCredentialRequest,
    responses(
        (status = 201, description = "Credential issued; data holds the record, signed document, QR and URL", body = ApiResponse),
        (status = 400, description = "Inspection not passed or not linked to the batch", body = crate::error::ErrorBody),
        (status = 403, description = "Not the inspecting agency", body = crate::error::ErrorBody),
        (status = 409, description = "An active credential already exists", body = crate::error::ErrorBody),
        (status = 502, description = "Signer or QR encoder failed", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn issue_credential(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<IssueCredentialRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = extract_validated_json(body)?;
    let (Some(batch), Some(inspection)) = (req.batch_id, req.inspection_id) else {
        return Err(AppError::Validation(vec![
            "Batch ID and Inspection ID are required".to_string(),
        ]));
    };
    let issued = state
        .lifecycle
        .issue_credential(&caller, BatchId(batch), InspectionId(inspection))
        .await?;
    respond(StatusCode::CREATED, "Credential issued successfully", issued)
}

#[utoipa::path(
    get,
    path = "/api/credentials",
    params(CredentialQuery),
    responses(
        (status = 200, description = "Page of credentials", body = ApiResponse),
        (status = 403, description = "Caller is an exporter", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn list_credentials(
    State(state): State<AppState>,
    caller: CallerIdentity,
    query: Result<Query<CredentialQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = extract_query(query)?;
    let page = state.lifecycle.list_credentials(&caller, &query)?;
    respond(StatusCode::OK, "Credentials retrieved successfully", page)
}

#[utoipa::path(
    get,
    path = "/api/credentials/statistics",
    responses(
        (status = 200, description = "Total, active, revoked and expired counts", body = ApiResponse),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn credential_statistics(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Response, AppError> {
    let stats = state.lifecycle.credential_statistics(&caller)?;
    respond(StatusCode::OK, "Statistics retrieved successfully", stats)
}

#[utoipa::path(
    get,
    path = "/api/credentials/{id}",
    params(("id" = String, Path, description = "Credential id (VC-…) or row key")),
    responses(
        (status = 200, description = "Credential", body = ApiResponse),
        (status = 404, description = "Credential not found", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn get_credential(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let credential = state.lifecycle.get_credential(&id)?;
    respond(StatusCode::OK, "Credential retrieved successfully", credential)
}

#[utoipa::path(
    get,
    path = "/api/credentials/{id}/qr",
    params(("id" = String, Path, description = "Credential id (VC-…) or row key")),
    responses(
        (status = 200, description = "QR artifact, cacheable for an hour", body = ApiResponse),
        (status = 404, description = "Credential not found", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn credential_qr(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let qr = state.lifecycle.credential_qr(&id)?;
    let mut response = respond(StatusCode::OK, "QR code retrieved successfully", qr)?;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(QR_CACHE_CONTROL),
    );
    Ok(response)
}

#[utoipa::path(
    get,
    path = "/api/credentials/{id}/revocation-status",
    params(("id" = String, Path, description = "Credential id (VC-…) or row key")),
    responses(
        (status = 200, description = "Revocation status", body = ApiResponse),
        (status = 404, description = "Credential not found", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn revocation_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let status = state.lifecycle.revocation_status(&id)?;
    respond(StatusCode::OK, "Revocation status retrieved successfully", status)
}

#[utoipa::path(
    get,
    path = "/api/credentials/{id}/verifications",
    params(
        ("id" = String, Path, description = "Credential id (VC-…) or row key"),
        HistoryQuery,
    ),
    responses(
        (status = 200, description = "Verification statistics and recent log entries", body = ApiResponse),
        (status = 403, description = "Caller is an exporter", body = crate::error::ErrorBody),
        (status = 404, description = "Credential not found", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn verification_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = extract_query(query)?;
    let history = state
        .lifecycle
        .verification_history(&caller, &id, query.limit)
        .await?;
    respond(StatusCode::OK, "Verification history retrieved successfully", history)
}

#[utoipa::path(
    post,
    path = "/api/credentials/{id}/revoke",
    params(("id" = String, Path, description = "Credential id (VC-…) or row key")),
    request_body = RevokeCredentialRequest,
    responses(
        (status = 200, description = "Credential and batch revoked", body = ApiResponse),
        (status = 400, description = "Missing reason or already revoked", body = crate::error::ErrorBody),
        (status = 403, description = "Not the issuer or an admin", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn revoke_credential(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<RevokeCredentialRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = extract_json(body)?;
    let reason = req.reason.unwrap_or_default();
    let credential = state
        .lifecycle
        .revoke_credential(&caller, &id, &reason)
        .await?;
    respond(StatusCode::OK, "Credential revoked successfully", credential)
}

#[utoipa::path(
    post,
    path = "/api/credentials/{id}/regenerate-qr",
    params(("id" = String, Path, description = "Credential id (VC-…) or row key")),
    responses(
        (status = 200, description = "QR re-rendered from the stored document", body = ApiResponse),
        (status = 404, description = "Credential not found", body = crate::error::ErrorBody),
        (status = 403, description = "Not the issuer or an admin", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn regenerate_qr(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let qr = state.lifecycle.regenerate_qr(&caller, &id).await?;
    respond(StatusCode::OK, "QR code regenerated successfully", qr)
}

#[utoipa::path(
    get,
    path = "/api/credentials/batch/{batchId}",
    params(("batchId" = i64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Credentials of the batch, newest first", body = ApiResponse),
        (status = 404, description = "Batch not found", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn credentials_for_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<Response, AppError> {
    let batch = parse_id(&batch_id, "Batch").map(BatchId)?;
    let credentials = state.lifecycle.credentials_for_batch(batch)?;
    respond(StatusCode::OK, "Credentials retrieved successfully", credentials)
}

#[utoipa::path(
    get,
    path = "/api/credentials/batch/{batchId}/document",
    params(("batchId" = i64, Path, description = "Batch ID"), DocumentQuery),
    responses(
        (status = 200, description = "Signed document, checksum and revocation flag", body = ApiResponse),
        (status = 400, description = "Malformed checksum", body = crate::error::ErrorBody),
        (status = 404, description = "No credential for the batch", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn public_document(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    query: Result<Query<DocumentQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let batch = parse_id(&batch_id, "Batch").map(BatchId)?;
    let query = extract_query(query)?;
    let document = state
        .lifecycle
        .public_document(batch, query.checksum.as_deref())?;
    respond(StatusCode::OK, "Credential document retrieved successfully", document)
}

#[utoipa::path(
    post,
    path = "/api/credentials/verify",
    request_body = VerifyCredentialRequest,
    responses(
        (status = 200, description = "Verification report; `valid` is false for invalid, expired or revoked documents", body = ApiResponse),
        (status = 400, description = "No document supplied", body = crate::error::ErrorBody),
    ),
    tag = "credentials"
)]
async fn verify_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<VerifyCredentialRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = extract_validated_json(body)?;
    let provenance = Provenance {
        ip_address: forwarded_for(&headers),
        user_agent: header_str(&headers, header::USER_AGENT.as_str()),
        method: req.method,
    };
    let Some(document) = req.credential.or(req.vc_data) else {
        return Err(AppError::Validation(vec!["Credential data is required".to_string()]));
    };
    let report = state
        .lifecycle
        .verify_credential(&document, req.verifier.unwrap_or_default(), provenance)
        .await?;
    respond(StatusCode::OK, "Verification completed", report)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First hop of `x-forwarded-for`: the original client.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
}
