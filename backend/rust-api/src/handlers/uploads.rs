use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Extension,
};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    errors::AppError,
    extractors::DataWithStatus,
    metrics::AUDIO_UPLOADS_TOTAL,
    middlewares::auth::IdentityClaims,
    services::{
        assessment_service::{AssessmentService, AudioUpload},
        AppState,
    },
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAudioResponse {
    pub gs_uri: String,
}

#[derive(Default)]
struct UploadForm {
    assessment_id: Option<String>,
    section: Option<String>,
    question: Option<String>,
    audio: Option<AudioUpload>,
}

/// POST /api/upload-audio (multipart: assessmentId, section, question, audio)
pub async fn upload_audio(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    multipart: Multipart,
) -> Result<DataWithStatus<UploadAudioResponse>, AppError> {
    let result = async {
        let form = read_form(multipart).await?;

        let assessment_id = form
            .assessment_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::bad_request("assessmentId is required"))?;
        let section = parse_index("section", form.section)?;
        let question = parse_index("question", form.question)?;
        let audio = form
            .audio
            .ok_or_else(|| AppError::bad_request("audio file is required"))?;

        AssessmentService::from_state(&state)
            .upload_recording(&claims, &assessment_id, section, question, audio)
            .await
    }
    .await;

    let status = if result.is_ok() { "success" } else { "error" };
    AUDIO_UPLOADS_TOTAL.with_label_values(&[status]).inc();

    Ok(DataWithStatus(
        StatusCode::CREATED,
        UploadAudioResponse { gs_uri: result? },
    ))
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read multipart field", e))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "audio" {
            let content_type = field.content_type().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| multipart_error("Failed to read audio upload", e))?;
            form.audio = Some(AudioUpload {
                content_type,
                file_name,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| multipart_error(&format!("Failed to read field {}", name), e))?;

        match name.as_str() {
            "assessmentId" => form.assessment_id = Some(text),
            "section" => form.section = Some(text),
            "question" => form.question = Some(text),
            other => tracing::debug!("Ignoring unknown upload field {}", other),
        }
    }

    Ok(form)
}

/// Body limit violations answer 413; anything else is a malformed form.
fn multipart_error(context: &str, error: MultipartError) -> AppError {
    tracing::warn!("{}: {}", context, error);
    let message = format!("{}: {}", context, error.body_text());
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large(message)
    } else {
        AppError::bad_request(message)
    }
}

fn parse_index(field: &str, value: Option<String>) -> Result<i64, AppError> {
    value
        .as_deref()
        .map(str::trim)
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|index| *index >= 0)
        .ok_or_else(|| AppError::bad_request(format!("{} must be a non-negative integer", field)))
}
