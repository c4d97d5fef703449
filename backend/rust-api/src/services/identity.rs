use std::sync::Arc;

use anyhow::{anyhow, Context};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::user_directory::UserDirectory;
use crate::config::Config;
use crate::errors::AppError;
use crate::metrics::LOGINS_TOTAL;
use crate::middlewares::auth::{AuthError, IdentityClaims, JwtService};
use crate::models::user::{normalize_email, LoginResponse, UserRecord, UserSummary};

/// Issues and verifies identity tokens and owns account credentials.
pub struct IdentityService {
    directory: Arc<dyn UserDirectory>,
    jwt_service: JwtService,
    id_token_ttl_seconds: i64,
    password_hash_cost: u32,
    password_reset_ttl_seconds: i64,
    public_base_url: String,
}

/// A freshly issued reset link for one account.
#[derive(Debug, Clone)]
pub struct IssuedResetLink {
    pub user: UserRecord,
    pub link: String,
}

impl IdentityService {
    pub fn new(directory: Arc<dyn UserDirectory>, config: &Config) -> Self {
        Self {
            directory,
            jwt_service: JwtService::new(&config.jwt_secret),
            id_token_ttl_seconds: config.id_token_ttl_seconds,
            password_hash_cost: config.password_hash_cost,
            password_reset_ttl_seconds: config.password_reset_ttl_seconds,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        self.jwt_service.validate_token(token)
    }

    pub fn issue_token(&self, user: &UserRecord) -> Result<String, AppError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.id_token_ttl_seconds);

        let claims = IdentityClaims {
            sub: user.uid.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        self.jwt_service
            .generate_token(&claims)
            .map_err(|e| AppError::Internal(anyhow!("Failed to generate token: {}", e)))
    }

    /// Password sign-in. Unknown accounts, accounts without a password and
    /// wrong passwords all answer with the same 401.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, AppError> {
        let email = normalize_email(email);
        let user = self.directory.find_by_email(&email).await?;

        let verified = match user.as_ref().and_then(|u| u.password_hash.as_deref()) {
            Some(stored) => verify(password, stored).context("Failed to verify password")?,
            None => false,
        };

        let user = match user {
            Some(user) if verified => user,
            _ => {
                LOGINS_TOTAL.with_label_values(&["failure"]).inc();
                tracing::warn!("Failed login attempt for {}", email);
                return Err(AppError::Unauthorized("Invalid email or password".to_string()));
            }
        };

        let id_token = self.issue_token(&user)?;
        LOGINS_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!("User {} signed in", user.email);

        Ok(LoginResponse {
            id_token,
            expires_in: self.id_token_ttl_seconds,
            user: UserSummary::from(user),
        })
    }

    pub async fn find_user(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        Ok(self.directory.find_by_email(&normalize_email(email)).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<UserRecord>, AppError> {
        Ok(self.directory.list().await?)
    }

    /// Creates an account. With no password the user has to follow a reset
    /// link before signing in.
    pub async fn create_user(
        &self,
        email: &str,
        password: Option<&str>,
        is_admin: bool,
    ) -> Result<UserRecord, AppError> {
        let email = normalize_email(email);
        if self.directory.find_by_email(&email).await?.is_some() {
            return Err(AppError::conflict(format!(
                "User with email {} already exists",
                email
            )));
        }

        let password_hash = password.map(|p| self.hash_password(p)).transpose()?;
        let now = Utc::now();
        let user = UserRecord {
            uid: Uuid::new_v4().to_string(),
            email,
            is_admin,
            password_hash,
            reset_token_hash: None,
            reset_expires_at: None,
            created_at: now,
            updated_at: now,
        };

        // A concurrent create can pass the lookup above; the directory has the last word
        if !self.directory.insert(&user).await? {
            return Err(AppError::conflict(format!(
                "User with email {} already exists",
                user.email
            )));
        }
        tracing::info!("Created user {} (admin: {})", user.email, user.is_admin);
        Ok(user)
    }

    /// Stores a fresh reset token for the account, replacing any earlier one.
    pub async fn issue_reset_link(&self, email: &str) -> Result<IssuedResetLink, AppError> {
        let mut user = self
            .find_user(email)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let token = hex::encode(rand::random::<[u8; 32]>());
        let now = Utc::now();
        user.reset_token_hash = Some(hash_reset_token(&token));
        user.reset_expires_at = Some(now + Duration::seconds(self.password_reset_ttl_seconds));
        user.updated_at = now;

        if !self.directory.replace(&user).await? {
            return Err(AppError::not_found("User not found"));
        }

        let link = format!("{}/reset-password?token={}", self.public_base_url, token);
        Ok(IssuedResetLink { user, link })
    }

    /// Consumes a reset token and sets the new password.
    pub async fn complete_password_reset(
        &self,
        token: &str,
        password: &str,
    ) -> Result<UserRecord, AppError> {
        let invalid = || AppError::bad_request("Invalid or expired reset link");

        let mut user = self
            .directory
            .find_by_reset_token_hash(&hash_reset_token(token.trim()))
            .await?
            .ok_or_else(invalid)?;

        let now = Utc::now();
        if user.reset_expires_at.map_or(true, |expires| expires < now) {
            tracing::warn!("Expired reset link used for {}", user.email);
            return Err(invalid());
        }

        user.password_hash = Some(self.hash_password(password)?);
        user.reset_token_hash = None;
        user.reset_expires_at = None;
        user.updated_at = now;

        if !self.directory.replace(&user).await? {
            return Err(invalid());
        }

        tracing::info!("Password set for {}", user.email);
        Ok(user)
    }

    pub async fn delete_user(&self, email: &str) -> Result<UserRecord, AppError> {
        let user = self
            .find_user(email)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if !self.directory.delete(&user.uid).await? {
            return Err(AppError::not_found("User not found"));
        }

        tracing::info!("Deleted user {}", user.email);
        Ok(user)
    }

    fn hash_password(&self, password: &str) -> Result<String, AppError> {
        Ok(hash(password, self.password_hash_cost).context("Failed to hash password")?)
    }
}

/// Only the SHA-256 of a reset token is stored.
fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
