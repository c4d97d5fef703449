use axum::extract::State;
use std::sync::Arc;

use crate::{
    errors::AppError,
    extractors::{Data, DataJson},
    models::assessment::{AssessmentsResponse, ListAssessmentsRequest},
    services::{assessment_service::AssessmentService, AppState},
};

/// POST /api/admin/get-assessments - every assessment, newest first
pub async fn list_all_assessments(
    State(state): State<Arc<AppState>>,
    DataJson(query): DataJson<ListAssessmentsRequest>,
) -> Result<Data<AssessmentsResponse>, AppError> {
    let assessments = AssessmentService::from_state(&state)
        .list_all(query.finished)
        .await?;

    Ok(Data(AssessmentsResponse { assessments }))
}
