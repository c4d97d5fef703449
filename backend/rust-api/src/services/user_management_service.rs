use std::sync::Arc;

use super::identity::IdentityService;
use crate::errors::AppError;
use crate::metrics::record_admin_action;
use crate::models::user::{
    CreateUserResponse, RemoveUserResponse, ResetLinkResponse, UserSummary,
};

/// Administrator actions on accounts. Every action is logged with the
/// acting admin and counted by outcome.
pub struct UserManagementService {
    identity: Arc<IdentityService>,
}

impl UserManagementService {
    pub fn new(identity: Arc<IdentityService>) -> Self {
        Self { identity }
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, AppError> {
        let users = self.identity.list_users().await?;
        Ok(users.into_iter().map(UserSummary::from).collect())
    }

    /// Creates a password-less account and hands back the link that sets it.
    pub async fn create_user(&self, actor: &str, email: &str) -> Result<CreateUserResponse, AppError> {
        let result = async {
            let user = self.identity.create_user(email, None, false).await?;
            let issued = self.identity.issue_reset_link(&user.email).await?;
            Ok::<_, AppError>(CreateUserResponse {
                uid: issued.user.uid,
                email: issued.user.email,
                reset_link: issued.link,
            })
        }
        .await;

        audit("create_user", actor, email, &result);
        result
    }

    pub async fn reset_password(&self, actor: &str, email: &str) -> Result<ResetLinkResponse, AppError> {
        let result = self
            .identity
            .issue_reset_link(email)
            .await
            .map(|issued| ResetLinkResponse {
                email: issued.user.email,
                reset_link: issued.link,
            });

        audit("reset_password", actor, email, &result);
        result
    }

    pub async fn remove_user(&self, actor: &str, email: &str) -> Result<RemoveUserResponse, AppError> {
        let result = self
            .identity
            .delete_user(email)
            .await
            .map(|user| RemoveUserResponse { email: user.email });

        audit("remove_user", actor, email, &result);
        result
    }
}

fn audit<T>(action: &str, actor: &str, target: &str, result: &Result<T, AppError>) {
    record_admin_action(action, result.is_ok());
    match result {
        Ok(_) => tracing::info!(action, actor, target, "Admin user action succeeded"),
        Err(e) => tracing::warn!(action, actor, target, error = %e, "Admin user action failed"),
    }
}
