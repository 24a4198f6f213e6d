use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::AppState;
use engine::{RunFailure, RunRequest, RunStatus};
use nodes::{Credentials, ExecutionContext};
use queue::{QueueError, ScheduleAck};

#[derive(Deserialize)]
pub struct ScheduleDto {
    pub request: RunRequest,
    #[serde(default)]
    pub delay_seconds: u64,
}

/// Body returned for a run that ended in `failed`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FailedRunDto {
    pub run_id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub error: String,
    pub failed_step: Option<String>,
    pub execution_order: Vec<String>,
    pub context: ExecutionContext,
}

impl From<RunFailure> for FailedRunDto {
    fn from(failure: RunFailure) -> Self {
        Self {
            error: failure.error.to_string(),
            failed_step: failure.error.failed_step().map(str::to_owned),
            run_id: failure.report.run_id,
            workflow_id: failure.report.workflow_id,
            status: failure.report.status,
            execution_order: failure.report.execution_order,
            context: failure.report.context,
        }
    }
}

/// Copy `x-<service>-token` headers into the credentials bundle.
fn merge_header_credentials(headers: &HeaderMap, credentials: &mut Credentials) {
    for (name, value) in headers {
        let service = name
            .as_str()
            .strip_prefix("x-")
            .and_then(|n| n.strip_suffix("-token"))
            .filter(|s| !s.is_empty());
        if let (Some(service), Ok(token)) = (service, value.to_str()) {
            credentials.insert(service, token);
        }
    }
}

pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<RunRequest>,
) -> Response {
    merge_header_credentials(&headers, &mut request.credentials);

    match state.engine.submit(request).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(failure) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(FailedRunDto::from(failure)),
        )
            .into_response(),
    }
}

pub async fn schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ScheduleDto>,
) -> Result<(StatusCode, Json<ScheduleAck>), StatusCode> {
    let mut request = payload.request;
    merge_header_credentials(&headers, &mut request.credentials);

    match state
        .scheduler
        .schedule(request, Duration::from_secs(payload.delay_seconds))
        .await
    {
        Ok(ack) => Ok((StatusCode::ACCEPTED, Json(ack))),
        Err(QueueError::Delay(_)) => Err(StatusCode::BAD_REQUEST),
        Err(e) => {
            error!("failed to schedule run: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
