//! # API Route Modules
//!
//! - `batches`: batch CRUD, QA assignment, attachments.
//! - `inspections`: inspection start/update/submit and the pending queue.
//! - `credentials`: issuance, revocation, QR, statistics, and the public
//!   verification endpoint.
//! - `actors`: admin-managed actor profiles.
//!
//! Every success response uses the `{status: "success", message, data}`
//! envelope; failures use [`ErrorBody`](crate::error::ErrorBody).

pub mod actors;
pub mod batches;
pub mod credentials;
pub mod inspections;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Success envelope.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse {
    /// Always `"success"`.
    pub status: String,
    pub message: String,
    pub data: serde_json::Value,
}

/// Wrap `data` in the success envelope.
pub fn respond(
    status: StatusCode,
    message: &str,
    data: impl Serialize,
) -> Result<Response, AppError> {
    let data = serde_json::to_value(data)
        .map_err(|e| AppError::Internal(format!("response serialization: {e}")))?;
    let body = ApiResponse {
        status: "success".to_string(),
        message: message.to_string(),
        data,
    };
    Ok((status, Json(body)).into_response())
}

/// Parse a numeric path id, 404 on garbage.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<i64, AppError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| AppError::NotFound(format!("{what} not found")))
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Router harness shared by route tests.

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use agricert_core::ActorId;
    use agricert_state::{ActorProfile, NewActor, Role};

    use crate::state::{AppConfig, AppState};
    use crate::store::{Ledger, Write};

    pub const TOKEN: &str = "test-secret";

    /// App with auth enabled and four seeded actors:
    /// exporter 1, QA agency 2, QA agency 3, exporter 4.
    pub async fn test_app() -> (Router, AppState) {
        let config = AppConfig {
            auth_token: Some(TOKEN.to_string()),
            ..AppConfig::default()
        };
        let state = AppState::build(config, Ledger::in_memory()).unwrap();
        let mut uow = state.ledger().begin();
        for (role, name) in [
            (Role::Exporter, "Delta Exports"),
            (Role::QaAgency, "Grain Lab"),
            (Role::QaAgency, "Other Lab"),
            (Role::Exporter, "Rival Trading"),
        ] {
            let profile = ActorProfile::create(
                state.ledger().next_actor_id(),
                NewActor {
                    role: Some(role),
                    name: Some(name.into()),
                    ..NewActor::default()
                },
            )
            .unwrap();
            uow.stage(Write::InsertActor(profile));
        }
        uow.commit().await.unwrap();
        (crate::app(state.clone()), state)
    }

    pub fn bearer(role: Role, actor: Option<ActorId>) -> String {
        match actor {
            Some(id) => format!("Bearer {}:{}:{TOKEN}", role.as_str(), id.get()),
            None => format!("Bearer {TOKEN}"),
        }
    }

    pub fn exporter() -> String {
        bearer(Role::Exporter, Some(ActorId(1)))
    }

    pub fn qa() -> String {
        bearer(Role::QaAgency, Some(ActorId(2)))
    }

    pub fn admin() -> String {
        bearer(Role::Admin, None)
    }

    /// Send a request and decode the JSON body (`Null` when empty).
    pub async fn call(
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
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}
