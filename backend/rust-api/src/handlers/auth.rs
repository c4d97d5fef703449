use axum::extract::State;
use std::sync::Arc;

use crate::{
    errors::AppError,
    extractors::{Data, DataJson},
    models::{
        assessment::OkResponse,
        user::{LoginRequest, LoginResponse, SetPasswordRequest},
    },
    services::AppState,
};

/// POST /api/auth/login - exchange email and password for an identity token
pub async fn login(
    State(state): State<Arc<AppState>>,
    DataJson(req): DataJson<LoginRequest>,
) -> Result<Data<LoginResponse>, AppError> {
    let response = state.identity.login(&req.email, &req.password).await?;
    Ok(Data(response))
}

/// POST /api/auth/set-password - consume a reset link token
pub async fn set_password(
    State(state): State<Arc<AppState>>,
    DataJson(req): DataJson<SetPasswordRequest>,
) -> Result<Data<OkResponse>, AppError> {
    state
        .identity
        .complete_password_reset(&req.token, &req.password)
        .await?;
    Ok(Data(OkResponse::ok()))
}
