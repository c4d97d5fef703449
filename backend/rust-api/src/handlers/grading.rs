use axum::{extract::State, Extension};
use std::sync::Arc;

use crate::{
    errors::AppError,
    extractors::{Data, DataJson},
    middlewares::auth::IdentityClaims,
    models::{
        assessment::{AssessmentIdRequest, AudioGradeRequest, OkResponse},
        student_response::StudentResponsesView,
    },
    services::{assessment_service::AssessmentService, AppState},
};

/// POST /api/get-assessment-student-responses (also served as get-assessment-answers)
pub async fn get_student_responses(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(payload): DataJson<AssessmentIdRequest>,
) -> Result<Data<StudentResponsesView>, AppError> {
    let view = AssessmentService::from_state(&state)
        .student_responses(&claims, &payload.assessment_id)
        .await?;

    Ok(Data(view))
}

/// POST /api/submit-audio-grade
pub async fn submit_audio_grade(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(payload): DataJson<AudioGradeRequest>,
) -> Result<Data<OkResponse>, AppError> {
    AssessmentService::from_state(&state)
        .submit_grade(&claims, payload)
        .await?;

    Ok(Data(OkResponse::ok()))
}
