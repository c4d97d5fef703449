use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{assessment::not_blank, bson_datetime_as_chrono, bson_datetime_as_chrono_option};

/// User account stored in the "users" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "_id")]
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    /// None until the user follows a reset link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token_hash: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub reset_expires_at: Option<DateTime<Utc>>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

/// User as listed to administrators (no credentials)
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub uid: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<UserRecord> for UserSummary {
    fn from(user: UserRecord) -> Self {
        UserSummary {
            uid: user.uid,
            email: user.email,
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

/// `admin/create-user`, `admin/reset-password`, `admin/remove-user`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserResponse {
    pub uid: String,
    pub email: String,
    pub reset_link: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetLinkResponse {
    pub email: String,
    pub reset_link: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveUserResponse {
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(custom(function = "not_blank", message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub id_token: String,
    pub expires_in: i64,
    pub user: UserSummary,
}

/// Completes a reset link: sets the first or a new password
#[derive(Debug, Deserialize, Validate)]
pub struct SetPasswordRequest {
    #[validate(custom(function = "not_blank", message = "token is required"))]
    pub token: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// Normalised form used for lookups; addresses are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
