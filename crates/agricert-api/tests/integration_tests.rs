//! # Integration Tests for agricert-api
//!
//! Drives the full router: the certification scenario from batch
//! submission to revocation, concurrent double issuance, atomicity of
//! multi-record transitions under injected faults, and public
//! verification of presented documents.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use agricert_api::state::{AppConfig, AppState};
use agricert_api::store::{FaultPlan, Ledger};

const SECRET: &str = "integration-secret";

struct Harness {
    app: Router,
    state: AppState,
    exporter: String,
    qa: String,
    admin: String,
}

/// Build an auth-enabled app and register one exporter and one QA agency
/// through the admin API.
async fn harness() -> Harness {
    let config = AppConfig {
        auth_token: Some(SECRET.to_string()),
        ..AppConfig::default()
    };
    let state = AppState::build(config, Ledger::in_memory()).unwrap();
    let app = agricert_api::app(state.clone());
    let admin = format!("Bearer {SECRET}");

    let (status, body) = send(
        &app,
        "POST",
        "/api/actors",
        Some(&admin),
        Some(json!({"role": "exporter", "name": "Delta Exports", "country": "IN"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let exporter_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/actors",
        Some(&admin),
        Some(json!({"role": "qa_agency", "name": "Grain Lab", "licenseNumber": "QA-7"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let qa_id = body["data"]["id"].as_i64().unwrap();

    Harness {
        app,
        state,
        exporter: format!("Bearer exporter:{exporter_id}:{SECRET}"),
        qa: format!("Bearer qa_agency:{qa_id}:{SECRET}"),
        admin,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        req = req.header("authorization", auth);
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

impl Harness {
    async fn batch_status(&self, batch: i64) -> String {
        let (status, body) =
            send(&self.app, "GET", &format!("/api/batches/{batch}"), Some(&self.admin), None).await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["status"].as_str().unwrap().to_string()
    }

    /// Create a rice batch, assign it, start the inspection and record
    /// `findings`. Returns `(batch_id, inspection_id)`.
    async fn inspected(&self, findings: Value) -> (i64, i64) {
        let qa_id: i64 = self.qa.split(':').nth(1).unwrap().parse().unwrap();
        let (status, body) = send(
            &self.app,
            "POST",
            "/api/batches",
            Some(&self.exporter),
            Some(json!({
                "productType": "grain",
                "productName": "Rice",
                "quantity": 1000.0,
                "unit": "kg",
                "originLocation": "Punjab",
                "destinationCountry": "AE"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let batch = body["data"]["id"].as_i64().unwrap();

        let (status, _) = send(
            &self.app,
            "POST",
            &format!("/api/batches/{batch}/assign-qa"),
            Some(&self.admin),
            Some(json!({"qaAgencyId": qa_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &self.app,
            "POST",
            "/api/inspections",
            Some(&self.qa),
            Some(json!({"batchId": batch})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let inspection = body["data"]["id"].as_i64().unwrap();

        let (status, _) = send(
            &self.app,
            "PUT",
            &format!("/api/inspections/{inspection}"),
            Some(&self.qa),
            Some(findings),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (batch, inspection)
    }

    async fn passed(&self) -> (i64, i64) {
        let (batch, inspection) = self.inspected(complete_findings()).await;
        let (status, _) = self.submit(inspection, "passed").await;
        assert_eq!(status, StatusCode::OK);
        (batch, inspection)
    }

    async fn submit(&self, inspection: i64, result: &str) -> (StatusCode, Value) {
        send(
            &self.app,
            "POST",
            &format!("/api/inspections/{inspection}/submit"),
            Some(&self.qa),
            Some(json!({"result": result})),
        )
        .await
    }

    async fn issue(&self, batch: i64, inspection: i64) -> (StatusCode, Value) {
        send(
            &self.app,
            "POST",
            "/api/credentials/issue",
            Some(&self.qa),
            Some(json!({"batchId": batch, "inspectionId": inspection})),
        )
        .await
    }

    async fn verify(&self, document: &Value) -> Value {
        let (status, body) = send(
            &self.app,
            "POST",
            "/api/credentials/verify",
            None,
            Some(json!({"credential": document})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["data"].clone()
    }
}

fn complete_findings() -> Value {
    json!({
        "moistureLevel": 12.5,
        "pesticideContent": 0.01,
        "grainQualityScore": 95.0,
        "inspectorName": "A. Inspector",
        "inspectorLicense": "LIC-42"
    })
}

// -- End-to-end scenario ------------------------------------------------------

#[tokio::test]
async fn rice_batch_is_certified_then_revoked() {
    let h = harness().await;
    let (batch, inspection) = h.inspected(complete_findings()).await;
    assert_eq!(h.batch_status(batch).await, "under_inspection");

    let (status, body) = h.submit(inspection, "passed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["batch"]["status"], "certified");
    assert_eq!(h.batch_status(batch).await, "certified");

    let (status, body) = h.issue(batch, inspection).await;
    assert_eq!(status, StatusCode::CREATED);
    let credential = &body["data"]["credential"];
    assert_eq!(credential["isActive"], true);
    let id = credential["credentialId"].as_str().unwrap().to_string();
    assert_eq!(h.batch_status(batch).await, "certified");

    let (status, body) = send(
        &h.app,
        "POST",
        &format!("/api/credentials/{id}/revoke"),
        Some(&h.admin),
        Some(json!({"reason": "re-inspection failed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isRevoked"], true);
    assert_eq!(h.batch_status(batch).await, "revoked");

    let (status, body) = send(
        &h.app,
        "GET",
        &format!("/api/credentials/{id}/revocation-status"),
        Some(&h.exporter),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["revocationReason"], "re-inspection failed");

    let (status, _) = send(
        &h.app,
        "POST",
        &format!("/api/credentials/{id}/revoke"),
        Some(&h.admin),
        Some(json!({"reason": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn passed_result_requires_inspector_name() {
    let h = harness().await;
    let (batch, inspection) = h
        .inspected(json!({
            "moistureLevel": 12.5,
            "pesticideContent": 0.01,
            "grainQualityScore": 95.0
        }))
        .await;
    let (status, _) = h.submit(inspection, "passed").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.batch_status(batch).await, "under_inspection");
}

#[tokio::test]
async fn submitted_inspection_is_frozen() {
    let h = harness().await;
    let (_, inspection) = h.passed().await;

    let (status, _) = send(
        &h.app,
        "PUT",
        &format!("/api/inspections/{inspection}"),
        Some(&h.qa),
        Some(json!({"remarks": "late note"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.submit(inspection, "failed").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_inspection_cannot_be_certified() {
    let h = harness().await;
    let (batch, inspection) = h.inspected(complete_findings()).await;
    let (status, _) = h.submit(inspection, "failed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.batch_status(batch).await, "rejected");

    let (status, body) = h.issue(batch, inspection).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot issue credential for failed inspection");
}

// -- Concurrency --------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issuance_yields_one_credential() {
    let h = harness().await;
    let (batch, inspection) = h.passed().await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = h.app.clone();
        let qa = h.qa.clone();
        handles.push(tokio::spawn(async move {
            send(
                &app,
                "POST",
                "/api/credentials/issue",
                Some(&qa),
                Some(json!({"batchId": batch, "inspectionId": inspection})),
            )
            .await
            .0
        }));
    }
    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }

    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let conflicts = statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count();
    assert_eq!(created, 1, "statuses: {statuses:?}");
    assert_eq!(conflicts, statuses.len() - 1);

    let (_, body) = send(
        &h.app,
        "GET",
        &format!("/api/credentials/batch/{batch}"),
        Some(&h.admin),
        None,
    )
    .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

// -- Atomicity under faults ---------------------------------------------------

#[tokio::test]
async fn interrupted_submission_changes_nothing() {
    let h = harness().await;
    let (batch, inspection) = h.inspected(complete_findings()).await;

    h.state.ledger().inject_fault(FaultPlan { after_writes: 1 });
    let (status, _) = h.submit(inspection, "passed").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.batch_status(batch).await, "under_inspection");

    let (_, body) = send(
        &h.app,
        "GET",
        &format!("/api/inspections/{inspection}"),
        Some(&h.admin),
        None,
    )
    .await;
    assert!(body["data"]["result"].is_null());

    let (status, _) = h.submit(inspection, "passed").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn interrupted_revocation_changes_nothing() {
    let h = harness().await;
    let (batch, inspection) = h.passed().await;
    let (_, body) = h.issue(batch, inspection).await;
    let id = body["data"]["credential"]["credentialId"]
        .as_str()
        .unwrap()
        .to_string();

    h.state.ledger().inject_fault(FaultPlan { after_writes: 1 });
    let (status, _) = send(
        &h.app,
        "POST",
        &format!("/api/credentials/{id}/revoke"),
        Some(&h.admin),
        Some(json!({"reason": "recall"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.batch_status(batch).await, "certified");

    let (_, body) = send(
        &h.app,
        "GET",
        &format!("/api/credentials/{id}"),
        Some(&h.admin),
        None,
    )
    .await;
    assert_eq!(body["data"]["isRevoked"], false);
}

// -- Verification -------------------------------------------------------------

#[tokio::test]
async fn presented_documents_are_classified() {
    let h = harness().await;
    let (batch, inspection) = h.passed().await;
    let (_, body) = h.issue(batch, inspection).await;
    let document = body["data"]["signedDocument"].clone();
    let id = body["data"]["credential"]["credentialId"]
        .as_str()
        .unwrap()
        .to_string();

    let report = h.verify(&document).await;
    assert_eq!(report["valid"], true);
    assert_eq!(report["issuer"], document["issuer"]);
    assert_eq!(report["expirationDate"], document["expirationDate"]);

    let mut tampered = document.clone();
    tampered["credentialSubject"]["quantity"] = json!(5000);
    let report = h.verify(&tampered).await;
    assert_eq!(report["valid"], false);
    assert_eq!(report["outcome"], "invalid");

    let report = h.verify(&json!({"type": ["VerifiableCredential"]})).await;
    assert_eq!(report["outcome"], "invalid");

    send(
        &h.app,
        "POST",
        &format!("/api/credentials/{id}/revoke"),
        Some(&h.qa),
        Some(json!({"reason": "aflatoxin retest"})),
    )
    .await;
    let report = h.verify(&document).await;
    assert_eq!(report["valid"], false);
    assert_eq!(report["outcome"], "revoked");

    let (_, body) = send(
        &h.app,
        "GET",
        &format!("/api/credentials/{id}/verifications?limit=1"),
        Some(&h.qa),
        None,
    )
    .await;
    assert_eq!(body["data"]["statistics"]["validCount"], 1);
    assert_eq!(body["data"]["statistics"]["revokedCount"], 1);
    assert_eq!(body["data"]["logs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn verify_needs_no_token_but_other_routes_do() {
    let h = harness().await;
    let (status, _) = send(&h.app, "GET", "/api/credentials/statistics", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &h.app,
        "POST",
        "/api/credentials/verify",
        None,
        Some(json!({"credential": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
