use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

use super::identity::IdentityService;
use crate::config::Config;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperuserSeed {
    pub email: String,
    /// Plain-text password from the seed file (hashed before storage)
    pub password: Option<String>,
    #[serde(default = "default_is_admin")]
    pub is_admin: bool,
}

fn default_is_admin() -> bool {
    true
}

pub async fn bootstrap(config: &Config, identity: &IdentityService) -> Result<()> {
    let path = match &config.superuser_seed_file {
        Some(path) if !path.is_empty() => Path::new(path),
        _ => {
            tracing::debug!("No superuser seed file configured, skipping bootstrap");
            return Ok(());
        }
    };

    if !path.exists() {
        tracing::warn!(
            "Superuser seed file {} not found, skipping bootstrap",
            path.display()
        );
        return Ok(());
    }

    let contents = fs::read_to_string(path)
        .await
        .context("Failed to read superuser seed file")?;

    let seed: SuperuserSeed =
        serde_json::from_str(&contents).context("Failed to deserialize superuser seed payload")?;

    apply(seed, identity).await
}

/// Creates the seeded account unless one with that email exists.
pub async fn apply(seed: SuperuserSeed, identity: &IdentityService) -> Result<()> {
    if identity.find_user(&seed.email).await?.is_some() {
        tracing::info!("Superuser {} already exists, seed skipped", seed.email);
        return Ok(());
    }

    let user = identity
        .create_user(&seed.email, seed.password.as_deref(), seed.is_admin)
        .await?;
    tracing::info!("Superuser {} inserted; remove seed file to prevent rerun", user.email);

    if seed.password.is_none() {
        let issued = identity.issue_reset_link(&user.email).await?;
        tracing::info!("Superuser password can be set at {}", issued.link);
    }

    Ok(())
}
