use axum::{extract::State, http::StatusCode, Extension};
use std::sync::Arc;

use crate::{
    errors::AppError,
    extractors::{Data, DataJson, DataWithStatus},
    middlewares::auth::IdentityClaims,
    models::assessment::{
        AssessmentIdRequest, AssessmentsResponse, AudioAnswerRequest, CreateAssessmentRequest,
        CreateAssessmentResponse, ListAssessmentsRequest, McAnswerRequest, OkResponse,
    },
    services::{assessment_service::AssessmentService, AppState},
};

/// POST /api/create-assessment
pub async fn create_assessment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(payload): DataJson<CreateAssessmentRequest>,
) -> Result<DataWithStatus<CreateAssessmentResponse>, AppError> {
    let id = AssessmentService::from_state(&state)
        .create(&claims, payload)
        .await?;

    Ok(DataWithStatus(
        StatusCode::CREATED,
        CreateAssessmentResponse { id },
    ))
}

/// POST /api/get-assessments
pub async fn get_assessments(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(payload): DataJson<ListAssessmentsRequest>,
) -> Result<Data<AssessmentsResponse>, AppError> {
    let assessments = AssessmentService::from_state(&state)
        .list_own(&claims, payload.finished)
        .await?;

    Ok(Data(AssessmentsResponse { assessments }))
}

/// POST /api/submit-mc-answer
pub async fn submit_mc_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(payload): DataJson<McAnswerRequest>,
) -> Result<Data<OkResponse>, AppError> {
    AssessmentService::from_state(&state)
        .submit_mc_answer(&claims, payload)
        .await?;

    Ok(Data(OkResponse::ok()))
}

/// POST /api/submit-audio-answer
pub async fn submit_audio_answer(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(payload): DataJson<AudioAnswerRequest>,
) -> Result<Data<OkResponse>, AppError> {
    AssessmentService::from_state(&state)
        .submit_audio_answer(&claims, payload)
        .await?;

    Ok(Data(OkResponse::ok()))
}

/// POST /api/finish-assessment
pub async fn finish_assessment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(payload): DataJson<AssessmentIdRequest>,
) -> Result<Data<OkResponse>, AppError> {
    AssessmentService::from_state(&state)
        .finish(&claims, &payload.assessment_id)
        .await?;

    Ok(Data(OkResponse::ok()))
}
