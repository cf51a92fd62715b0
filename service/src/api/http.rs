//! REST handlers. Errors always serialize as `{"error": message}`.

use std::sync::Arc;

use axum::{
    extract::{Path, State as AxumState},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use sabot_engine::{CreateTableRequest, EngineError};
use sabot_types::{ErrorBody, PlayerIdentity};

use crate::auth::bearer_token;
use crate::Service;

#[derive(Serialize)]
pub(super) struct HealthzResponse {
    ok: bool,
}

pub(super) async fn healthz() -> Json<HealthzResponse> {
    Json(HealthzResponse { ok: true })
}

pub(super) async fn ws_metrics(
    AxumState(service): AxumState<Arc<Service>>,
) -> impl IntoResponse {
    Json(service.metrics.snapshot())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateTableBody {
    name: Option<String>,
    max_seats: u8,
    min_bet: u64,
    max_bet: u64,
    code: Option<String>,
}

/// The code echoes back to the creator only; listings never carry it.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResponse {
    id: String,
    private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

pub(super) async fn create_table(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    Json(body): Json<CreateTableBody>,
) -> Response {
    let identity = match authenticate(&service, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let request = CreateTableRequest {
        name: body.name,
        max_seats: body.max_seats,
        min_bet: body.min_bet,
        max_bet: body.max_bet,
        access_code: body.code.clone(),
    };
    match service.registry.create_table(identity, request).await {
        Ok(created) => (
            StatusCode::CREATED,
            Json(CreatedResponse {
                id: created.id,
                private: body.code.is_some(),
                code: body.code,
            }),
        )
            .into_response(),
        Err(error) => engine_error_response(error),
    }
}

pub(super) async fn list_tables(AxumState(service): AxumState<Arc<Service>>) -> Response {
    Json(service.registry.list_tables().await).into_response()
}

pub(super) async fn get_table(
    AxumState(service): AxumState<Arc<Service>>,
    Path(id): Path<String>,
) -> Response {
    match service.registry.table_summary(&id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(error) => engine_error_response(error),
    }
}

#[derive(Serialize)]
struct ClosedResponse {
    closed: bool,
}

pub(super) async fn delete_table(
    AxumState(service): AxumState<Arc<Service>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let identity = match authenticate(&service, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match service.registry.close_table(identity, &id).await {
        Ok(()) => Json(ClosedResponse { closed: true }).into_response(),
        Err(error) => engine_error_response(error),
    }
}

fn authenticate(service: &Service, headers: &HeaderMap) -> Result<PlayerIdentity, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(bearer_token)
        .transpose()
        .ok()
        .flatten();
    let verified = token.and_then(|token| service.auth.verify(token).ok());
    match verified {
        Some(identity) => Ok(identity),
        None => {
            service.metrics.auth_failure();
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::new("jeton invalide ou manquant")),
            )
                .into_response())
        }
    }
}

fn engine_error_response(error: EngineError) -> Response {
    let status = if error == EngineError::table_unavailable() {
        StatusCode::NOT_FOUND
    } else {
        match error {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Authorization(_) => StatusCode::FORBIDDEN,
            EngineError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            EngineError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };
    (status, Json(ErrorBody::new(error.to_string()))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (EngineError::validation("x"), StatusCode::BAD_REQUEST),
            (EngineError::authorization("x"), StatusCode::FORBIDDEN),
            (EngineError::table_unavailable(), StatusCode::NOT_FOUND),
            (EngineError::InsufficientFunds, StatusCode::PAYMENT_REQUIRED),
            (
                EngineError::Fatal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(engine_error_response(error).status(), expected);
        }
    }
}
