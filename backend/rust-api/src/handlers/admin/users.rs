use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use std::sync::Arc;

use crate::{
    errors::AppError,
    extractors::{Data, DataJson, DataWithStatus},
    middlewares::auth::IdentityClaims,
    models::user::{
        CreateUserResponse, EmailRequest, RemoveUserResponse, ResetLinkResponse, UsersResponse,
    },
    services::{user_management_service::UserManagementService, AppState},
};

fn service(state: &AppState) -> UserManagementService {
    UserManagementService::new(state.identity.clone())
}

/// POST /api/admin/get-users
pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<Data<UsersResponse>, AppError> {
    let users = service(&state).list_users().await?;
    Ok(Data(UsersResponse { users }))
}

/// POST /api/admin/create-user - account without password plus its reset link
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(req): DataJson<EmailRequest>,
) -> Result<DataWithStatus<CreateUserResponse>, AppError> {
    let created = service(&state).create_user(&claims.email, &req.email).await?;
    Ok(DataWithStatus(StatusCode::CREATED, created))
}

/// POST /api/admin/reset-password
pub async fn reset_user_password(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(req): DataJson<EmailRequest>,
) -> Result<Data<ResetLinkResponse>, AppError> {
    let link = service(&state)
        .reset_password(&claims.email, &req.email)
        .await?;
    Ok(Data(link))
}

/// POST /api/admin/remove-user
pub async fn remove_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<IdentityClaims>,
    DataJson(req): DataJson<EmailRequest>,
) -> Result<Data<RemoveUserResponse>, AppError> {
    let removed = service(&state).remove_user(&claims.email, &req.email).await?;
    Ok(Data(removed))
}
