//! # OpenAPI Document Assembly
//!
//! Collects every utoipa-documented route into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AgriCert API",
        version = "0.1.0",
        description = "Export batch certification: batch submission, quality inspection, verifiable credential issuance, revocation and public verification."
    ),
    paths(
        // Batches
        crate::routes::batches::create_batch,
        crate::routes::batches::list_batches,
        crate::routes::batches::get_batch,
        crate::routes::batches::update_batch,
        crate::routes::batches::delete_batch,
        crate::routes::batches::assign_qa,
        crate::routes::batches::add_attachment,
        // Inspections
        crate::routes::inspections::start_inspection,
        crate::routes::inspections::pending_inspections,
        crate::routes::inspections::get_inspection,
        crate::routes::inspections::update_inspection,
        crate::routes::inspections::submit_result,
        crate::routes::inspections::inspection_for_batch,
        // Credentials
        crate::routes::credentials::issue_credential,
        crate::routes::credentials::list_credentials,
        crate::routes::credentials::credential_statistics,
        crate::routes::credentials::get_credential,
        crate::routes::credentials::credential_qr,
        crate::routes::credentials::revocation_status,
        crate::routes::credentials::verification_history,
        crate::routes::credentials::revoke_credential,
        crate::routes::credentials::regenerate_qr,
        crate::routes::credentials::credentials_for_batch,
        crate::routes::credentials::verify_credential,
        crate::routes::credentials::public_document,
        // Actors
        crate::routes::actors::register_actor,
        crate::routes::actors::list_actors,
        crate::routes::actors::get_actor,
        crate::routes::actors::update_actor,
    ),
    components(schemas(
        crate::routes::ApiResponse,
        crate::error::ErrorBody,
        crate::routes::batches::AssignQaRequest,
        crate::routes::inspections::StartInspectionRequest,
        crate::routes::inspections::SubmitResultRequest,
        crate::routes::credentials::IssueCredentialRequest,
        crate::routes::credentials::RevokeCredentialRequest,
        crate::routes::credentials::VerifyCredentialRequest,
    )),
    tags(
        (name = "batches", description = "Export batch submission and administration"),
        (name = "inspections", description = "Quality inspection by assigned QA agencies"),
        (name = "credentials", description = "Credential issuance, revocation and verification"),
        (name = "actors", description = "Exporter and QA agency profiles"),
    )
)]
pub struct ApiDoc;

/// Router serving the OpenAPI document.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
