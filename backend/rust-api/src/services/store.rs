use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

use crate::models::{
    assessment::Assessment,
    student_response::{ResponseUpdate, StudentResponseRecord},
};

pub const ASSESSMENTS_COLLECTION: &str = "assessments";
pub const STUDENT_RESPONSES_COLLECTION: &str = "studentResponses";

/// Document-store operations behind the assessment endpoints.
///
/// Each call is a single read or write. Nothing here spans two documents,
/// so callers that write a response record and then the progress cursor
/// can leave them out of step if the second write fails.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<ObjectId>;

    /// `None` both for unknown ids and ids that are not valid ObjectIds.
    async fn get_assessment(&self, id: &str) -> Result<Option<Assessment>>;

    /// Newest first. `creator_email = None` lists every assessment.
    async fn list_assessments(
        &self,
        creator_email: Option<&str>,
        finished: Option<bool>,
    ) -> Result<Vec<Assessment>>;

    /// Returns false when no assessment matched.
    async fn update_progress(
        &self,
        id: &str,
        section: i64,
        question: i64,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Returns false when no assessment matched.
    async fn mark_finished(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Oldest record matching both filters, if any.
    async fn find_response(
        &self,
        assessment_id: &str,
        section: i64,
    ) -> Result<Option<StudentResponseRecord>>;

    async fn insert_response(&self, record: &StudentResponseRecord) -> Result<ObjectId>;

    async fn update_response(
        &self,
        response_id: &ObjectId,
        update: &ResponseUpdate,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Ordered by section, then oldest first; the first per section is the
    /// one `find_response` returns.
    async fn list_responses(&self, assessment_id: &str) -> Result<Vec<StudentResponseRecord>>;
}
