use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mongodb::Client as MongoClient;

use crate::config::{Config, StoreBackend};
use memory_store::InMemoryAssessmentStore;
use mongo_store::MongoAssessmentStore;
use object_storage::{BlobStore, InMemoryBlobStore, ObjectStorageClient};
use store::AssessmentStore;
use user_directory::{InMemoryUserDirectory, MongoUserDirectory, UserDirectory};

pub mod assessment_service;
pub mod identity;
pub mod memory_store;
pub mod mongo_store;
pub mod object_storage;
pub mod store;
pub mod superuser_seed;
pub mod user_directory;
pub mod user_management_service;

const LOCAL_BUCKET: &str = "local-recordings";

pub struct AppState {
    pub config: Config,
    pub assessments: Arc<dyn AssessmentStore>,
    pub identity: Arc<identity::IdentityService>,
    pub blobs: Arc<dyn BlobStore>,
}

impl AppState {
    /// Wires the backends selected by `store.backend` and `object_storage`.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let (assessments, users): (Arc<dyn AssessmentStore>, Arc<dyn UserDirectory>) =
            match config.store_backend {
                StoreBackend::Memory => {
                    tracing::warn!("Using in-memory document store; data is lost on restart");
                    (
                        Arc::new(InMemoryAssessmentStore::new()),
                        Arc::new(InMemoryUserDirectory::new()),
                    )
                }
                StoreBackend::Mongo => {
                    tracing::info!("Connecting to MongoDB...");
                    let client = MongoClient::with_uri_str(&config.mongo_uri)
                        .await
                        .context("Failed to create MongoDB client")?;
                    let mongo = client.database(&config.mongo_database);

                    let store = MongoAssessmentStore::new(mongo.clone());
                    tokio::time::timeout(Duration::from_secs(10), store.ping())
                        .await
                        .map_err(|_| anyhow::anyhow!("MongoDB ping timeout after 10s"))??;
                    store.ensure_indexes().await?;

                    let directory = MongoUserDirectory::new(mongo);
                    directory.ensure_indexes().await?;

                    tracing::info!("MongoDB connection established successfully");
                    (Arc::new(store), Arc::new(directory))
                }
            };

        let blobs: Arc<dyn BlobStore> = match config.object_storage.clone() {
            Some(settings) => {
                let client = ObjectStorageClient::new(settings, config.is_production())?;
                tracing::info!("Audio recordings stored in S3-compatible object storage");
                Arc::new(client)
            }
            None => {
                tracing::warn!("No object storage configured; audio kept in process memory");
                Arc::new(InMemoryBlobStore::new(LOCAL_BUCKET, "audio"))
            }
        };

        Ok(Self::from_parts(config, assessments, users, blobs))
    }

    /// Fully in-process state; used by the test suites.
    pub fn in_memory(config: Config) -> Self {
        Self::from_parts(
            config,
            Arc::new(InMemoryAssessmentStore::new()),
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(InMemoryBlobStore::new(LOCAL_BUCKET, "audio")),
        )
    }

    pub fn from_parts(
        config: Config,
        assessments: Arc<dyn AssessmentStore>,
        users: Arc<dyn UserDirectory>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let identity = Arc::new(identity::IdentityService::new(users, &config));
        Self {
            config,
            assessments,
            identity,
            blobs,
        }
    }
}
