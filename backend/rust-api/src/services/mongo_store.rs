use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::IndexOptions,
    Collection, Database, IndexModel,
};

use super::store::{AssessmentStore, ASSESSMENTS_COLLECTION, STUDENT_RESPONSES_COLLECTION};
use crate::metrics::track_db_operation;
use crate::models::{
    assessment::Assessment,
    student_response::{ResponseUpdate, StudentResponseRecord},
};
use crate::utils::time::chrono_to_bson;

pub struct MongoAssessmentStore {
    mongo: Database,
}

impl MongoAssessmentStore {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn assessments(&self) -> Collection<Assessment> {
        self.mongo.collection::<Assessment>(ASSESSMENTS_COLLECTION)
    }

    fn responses(&self) -> Collection<StudentResponseRecord> {
        self.mongo
            .collection::<StudentResponseRecord>(STUDENT_RESPONSES_COLLECTION)
    }

    /// Indexes backing the list and lookup queries. Safe to call on every start.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.assessments()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "creatorEmail": 1, "createdAt": -1 })
                    .build(),
            )
            .await
            .context("Failed to create assessments index")?;

        self.responses()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "assessment-id": 1, "section": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("assessment_section".to_string())
                            .build(),
                    )
                    .build(),
            )
            .await
            .context("Failed to create studentResponses index")?;

        tracing::info!("Document store indexes ensured");
        Ok(())
    }
}

fn inserted_object_id(inserted: mongodb::bson::Bson) -> Result<ObjectId> {
    inserted
        .as_object_id()
        .ok_or_else(|| anyhow!("Inserted document has no ObjectId"))
}

#[async_trait]
impl AssessmentStore for MongoAssessmentStore {
    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("Document store ping failed")?;
        Ok(())
    }

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<ObjectId> {
        track_db_operation("insert", ASSESSMENTS_COLLECTION, async {
            let result = self
                .assessments()
                .insert_one(assessment)
                .await
                .context("Failed to insert assessment")?;
            inserted_object_id(result.inserted_id)
        })
        .await
    }

    async fn get_assessment(&self, id: &str) -> Result<Option<Assessment>> {
        let Ok(object_id) = ObjectId::parse_str(id) else {
            return Ok(None);
        };

        track_db_operation("find_one", ASSESSMENTS_COLLECTION, async {
            self.assessments()
                .find_one(doc! { "_id": object_id })
                .await
                .context("Failed to query assessment")
        })
        .await
    }

    async fn list_assessments(
        &self,
        creator_email: Option<&str>,
        finished: Option<bool>,
    ) -> Result<Vec<Assessment>> {
        let mut filter = Document::new();
        if let Some(email) = creator_email {
            filter.insert("creatorEmail", email);
        }
        if let Some(finished) = finished {
            filter.insert("finished", finished);
        }

        track_db_operation("find", ASSESSMENTS_COLLECTION, async {
            let mut cursor = self
                .assessments()
                .find(filter)
                .sort(doc! { "createdAt": -1 })
                .await
                .context("Failed to query assessments")?;

            let mut assessments = Vec::new();
            while cursor.advance().await.context("Failed to advance cursor")? {
                assessments.push(
                    cursor
                        .deserialize_current()
                        .context("Failed to deserialize assessment")?,
                );
            }
            Ok(assessments)
        })
        .await
    }

    async fn update_progress(
        &self,
        id: &str,
        section: i64,
        question: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Ok(object_id) = ObjectId::parse_str(id) else {
            return Ok(false);
        };

        track_db_operation("update", ASSESSMENTS_COLLECTION, async {
            let result = self
                .assessments()
                .update_one(
                    doc! { "_id": object_id },
                    doc! { "$set": {
                        "currentSection": section,
                        "currentQuestion": question,
                        "updatedAt": chrono_to_bson(now),
                    }},
                )
                .await
                .context("Failed to update assessment progress")?;
            Ok(result.matched_count > 0)
        })
        .await
    }

    async fn mark_finished(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let Ok(object_id) = ObjectId::parse_str(id) else {
            return Ok(false);
        };

        track_db_operation("update", ASSESSMENTS_COLLECTION, async {
            let result = self
                .assessments()
                .update_one(
                    doc! { "_id": object_id },
                    doc! { "$set": {
                        "finished": true,
                        "finishedAt": chrono_to_bson(now),
                        "updatedAt": chrono_to_bson(now),
                    }},
                )
                .await
                .context("Failed to finish assessment")?;
            Ok(result.matched_count > 0)
        })
        .await
    }

    async fn find_response(
        &self,
        assessment_id: &str,
        section: i64,
    ) -> Result<Option<StudentResponseRecord>> {
        track_db_operation("find_one", STUDENT_RESPONSES_COLLECTION, async {
            self.responses()
                .find_one(doc! { "assessment-id": assessment_id, "section": section })
                .sort(doc! { "_id": 1 })
                .await
                .context("Failed to query student responses")
        })
        .await
    }

    async fn insert_response(&self, record: &StudentResponseRecord) -> Result<ObjectId> {
        track_db_operation("insert", STUDENT_RESPONSES_COLLECTION, async {
            let result = self
                .responses()
                .insert_one(record)
                .await
                .context("Failed to insert student responses")?;
            inserted_object_id(result.inserted_id)
        })
        .await
    }

    async fn update_response(
        &self,
        response_id: &ObjectId,
        update: &ResponseUpdate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut set = Document::new();
        for (path, value) in update.set_fields() {
            set.insert(path, value);
        }
        set.insert("updatedAt", chrono_to_bson(now));

        track_db_operation("update", STUDENT_RESPONSES_COLLECTION, async {
            let result = self
                .responses()
                .update_one(doc! { "_id": *response_id }, doc! { "$set": set })
                .await
                .context("Failed to update student responses")?;
            if result.matched_count == 0 {
                return Err(anyhow!("Response record {} not found", response_id));
            }
            Ok(())
        })
        .await
    }

    async fn list_responses(&self, assessment_id: &str) -> Result<Vec<StudentResponseRecord>> {
        track_db_operation("find", STUDENT_RESPONSES_COLLECTION, async {
            let mut cursor = self
                .responses()
                .find(doc! { "assessment-id": assessment_id })
                .sort(doc! { "section": 1, "_id": 1 })
                .await
                .context("Failed to query student responses")?;

            let mut records = Vec::new();
            while cursor.advance().await.context("Failed to advance cursor")? {
                records.push(
                    cursor
                        .deserialize_current()
                        .context("Failed to deserialize student responses")?,
                );
            }
            Ok(records)
        })
        .await
    }
}
