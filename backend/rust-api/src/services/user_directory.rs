use std::sync::RwLock;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Collection, Database, IndexModel,
};

use crate::metrics::track_db_operation;
use crate::models::user::UserRecord;

pub const USERS_COLLECTION: &str = "users";

/// Account storage behind the identity provider.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `email` must already be normalised.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_by_reset_token_hash(&self, token_hash: &str) -> Result<Option<UserRecord>>;

    /// Returns false when the email is already taken.
    async fn insert(&self, user: &UserRecord) -> Result<bool>;

    /// Replaces the stored record with the same uid. Returns false if none matched.
    async fn replace(&self, user: &UserRecord) -> Result<bool>;

    /// Returns false if no record matched.
    async fn delete(&self, uid: &str) -> Result<bool>;

    /// Ordered by email.
    async fn list(&self) -> Result<Vec<UserRecord>>;
}

pub struct MongoUserDirectory {
    mongo: Database,
}

impl MongoUserDirectory {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn users(&self) -> Collection<UserRecord> {
        self.mongo.collection::<UserRecord>(USERS_COLLECTION)
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .context("Failed to create users email index")?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MongoUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        track_db_operation("find_one", USERS_COLLECTION, async {
            self.users()
                .find_one(doc! { "email": email })
                .await
                .context("Failed to query user")
        })
        .await
    }

    async fn find_by_reset_token_hash(&self, token_hash: &str) -> Result<Option<UserRecord>> {
        track_db_operation("find_one", USERS_COLLECTION, async {
            self.users()
                .find_one(doc! { "resetTokenHash": token_hash })
                .await
                .context("Failed to query user by reset token")
        })
        .await
    }

    async fn insert(&self, user: &UserRecord) -> Result<bool> {
        track_db_operation("insert", USERS_COLLECTION, async {
            match self.users().insert_one(user).await {
                Ok(_) => Ok(true),
                Err(e) if is_duplicate_key(&e) => {
                    tracing::warn!("Unique email index rejected {}", user.email);
                    Ok(false)
                }
                Err(e) => Err(anyhow!(e).context("Failed to insert user")),
            }
        })
        .await
    }

    async fn replace(&self, user: &UserRecord) -> Result<bool> {
        track_db_operation("update", USERS_COLLECTION, async {
            let result = self
                .users()
                .replace_one(doc! { "_id": &user.uid }, user)
                .await
                .context("Failed to update user")?;
            Ok(result.matched_count > 0)
        })
        .await
    }

    async fn delete(&self, uid: &str) -> Result<bool> {
        track_db_operation("delete", USERS_COLLECTION, async {
            let result = self
                .users()
                .delete_one(doc! { "_id": uid })
                .await
                .context("Failed to delete user")?;
            Ok(result.deleted_count > 0)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        track_db_operation("find", USERS_COLLECTION, async {
            let mut cursor = self
                .users()
                .find(doc! {})
                .sort(doc! { "email": 1 })
                .await
                .context("Failed to query users")?;

            let mut users = Vec::new();
            while cursor.advance().await.context("Failed to advance cursor")? {
                users.push(
                    cursor
                        .deserialize_current()
                        .context("Failed to deserialize user")?,
                );
            }
            Ok(users)
        })
        .await
    }
}

// E11000: a concurrent insert won the unique email index.
fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        *error.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write_error)) if write_error.code == 11000
    )
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<Vec<UserRecord>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Vec<UserRecord>) -> T) -> Result<T> {
        let guard = self
            .users
            .read()
            .map_err(|_| anyhow!("User directory lock poisoned"))?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Vec<UserRecord>) -> T) -> Result<T> {
        let mut guard = self
            .users
            .write()
            .map_err(|_| anyhow!("User directory lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.read(|users| users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_reset_token_hash(&self, token_hash: &str) -> Result<Option<UserRecord>> {
        self.read(|users| {
            users
                .iter()
                .find(|u| u.reset_token_hash.as_deref() == Some(token_hash))
                .cloned()
        })
    }

    async fn insert(&self, user: &UserRecord) -> Result<bool> {
        self.write(|users| {
            if users.iter().any(|u| u.email == user.email) {
                return Ok(false);
            }
            if users.iter().any(|u| u.uid == user.uid) {
                return Err(anyhow!("User id {} already exists", user.uid));
            }
            users.push(user.clone());
            Ok(true)
        })?
    }

    async fn replace(&self, user: &UserRecord) -> Result<bool> {
        self.write(|users| match users.iter_mut().find(|u| u.uid == user.uid) {
            Some(existing) => {
                *existing = user.clone();
                true
            }
            None => false,
        })
    }

    async fn delete(&self, uid: &str) -> Result<bool> {
        self.write(|users| {
            let before = users.len();
            users.retain(|u| u.uid != uid);
            users.len() < before
        })
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        let mut users = self.read(|users| users.clone())?;
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }
}
