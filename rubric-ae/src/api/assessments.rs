//! Assignment, submission and report endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::growth::{GrowthSummary, DEFAULT_PERCENT_PER_LEVEL};
use crate::services::{AssignmentStatistics, NewSubmission};
use crate::AppState;
use rubric_common::{AssessmentResult, Assignment, AssignmentConfig};

/// POST /assignments request body
#[derive(Debug, Deserialize)]
pub struct CreateAssignmentRequest {
    pub title: String,
    #[serde(flatten)]
    pub config: AssignmentConfig,
}

/// POST /assignments
pub async fn create_assignment(
    State(state): State<AppState>,
    Json(request): Json<CreateAssignmentRequest>,
) -> ApiResult<(StatusCode, Json<Assignment>)> {
    let assignment = state
        .service
        .create_assignment(&request.title, request.config)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// GET /assignments/:id
pub async fn get_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> ApiResult<Json<Assignment>> {
    Ok(Json(state.service.assignment(&assignment_id).await?))
}

/// POST /assignments/:id/submissions
///
/// The assessment runs on its own task, so a caller that disconnects does
/// not cancel an assessment already in flight.
pub async fn submit(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
    Json(submission): Json<NewSubmission>,
) -> ApiResult<Json<AssessmentResult>> {
    info!(assignment = %assignment_id, student = %submission.student_key, "Submission received");

    let service = state.service.clone();
    let task = tokio::spawn(async move { service.submit(&assignment_id, submission).await });

    match task.await {
        Ok(Ok(result)) => Ok(Json(result)),
        Ok(Err(e)) => {
            if !matches!(
                e,
                rubric_common::Error::InvalidRubric(_)
                    | rubric_common::Error::InvalidInput(_)
                    | rubric_common::Error::NotFound(_)
            ) {
                state.record_error(e.to_string()).await;
            }
            Err(ApiError::from(e))
        }
        Err(join_error) => {
            state.record_error(join_error.to_string()).await;
            Err(ApiError::Internal("assessment task failed".to_string()))
        }
    }
}

/// GET /assignments/:id/statistics
pub async fn statistics(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> ApiResult<Json<AssignmentStatistics>> {
    Ok(Json(state.service.statistics(&assignment_id).await?))
}

/// GET /students/:key/growth response
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthResponse {
    pub student_key: String,
    #[serde(flatten)]
    pub summary: GrowthSummary,
    /// Improvement rate as a percentage (25% per level step)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_percent: Option<f64>,
}

/// GET /students/:key/growth
pub async fn growth(
    State(state): State<AppState>,
    Path(student_key): Path<String>,
) -> ApiResult<Json<GrowthResponse>> {
    let summary = state.service.growth(&student_key).await?;
    let improvement_percent = summary.improvement_percent(DEFAULT_PERCENT_PER_LEVEL);

    Ok(Json(GrowthResponse {
        student_key,
        summary,
        improvement_percent,
    }))
}

/// Build assessment routes
pub fn assessment_routes() -> Router<AppState> {
    Router::new()
        .route("/assignments", post(create_assignment))
        .route("/assignments/:id", get(get_assignment))
        .route("/assignments/:id/submissions", post(submit))
        .route("/assignments/:id/statistics", get(statistics))
        .route("/students/:key/growth", get(growth))
}
