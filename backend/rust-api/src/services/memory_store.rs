use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;

use super::store::AssessmentStore;
use crate::models::{
    assessment::Assessment,
    student_response::{ResponseUpdate, StudentResponseRecord},
};

#[derive(Default)]
struct Collections {
    assessments: Vec<Assessment>,
    responses: Vec<StudentResponseRecord>,
}

/// Process-local store for tests and `store.backend = "memory"`.
#[derive(Default)]
pub struct InMemoryAssessmentStore {
    inner: RwLock<Collections>,
}

impl InMemoryAssessmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Collections) -> T) -> Result<T> {
        let guard = self
            .inner
            .read()
            .map_err(|_| anyhow!("In-memory store lock poisoned"))?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Collections) -> T) -> Result<T> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| anyhow!("In-memory store lock poisoned"))?;
        Ok(f(&mut guard))
    }
}

fn parse_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id).ok()
}

#[async_trait]
impl AssessmentStore for InMemoryAssessmentStore {
    async fn ping(&self) -> Result<()> {
        self.read(|_| ())
    }

    async fn insert_assessment(&self, assessment: &Assessment) -> Result<ObjectId> {
        let id = ObjectId::new();
        let mut stored = assessment.clone();
        stored.id = Some(id);
        self.write(|c| c.assessments.push(stored))?;
        Ok(id)
    }

    async fn get_assessment(&self, id: &str) -> Result<Option<Assessment>> {
        let Some(oid) = parse_id(id) else {
            return Ok(None);
        };
        self.read(|c| c.assessments.iter().find(|a| a.id == Some(oid)).cloned())
    }

    async fn list_assessments(
        &self,
        creator_email: Option<&str>,
        finished: Option<bool>,
    ) -> Result<Vec<Assessment>> {
        let mut found = self.read(|c| {
            c.assessments
                .iter()
                .filter(|a| creator_email.map_or(true, |email| a.creator_email == email))
                .filter(|a| finished.map_or(true, |flag| a.finished == flag))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update_progress(
        &self,
        id: &str,
        section: i64,
        question: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(oid) = parse_id(id) else {
            return Ok(false);
        };
        self.write(|c| match c.assessments.iter_mut().find(|a| a.id == Some(oid)) {
            Some(assessment) => {
                assessment.current_section = section;
                assessment.current_question = question;
                assessment.updated_at = Some(now);
                true
            }
            None => false,
        })
    }

    async fn mark_finished(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let Some(oid) = parse_id(id) else {
            return Ok(false);
        };
        self.write(|c| match c.assessments.iter_mut().find(|a| a.id == Some(oid)) {
            Some(assessment) => {
                assessment.finished = true;
                assessment.finished_at = Some(now);
                assessment.updated_at = Some(now);
                true
            }
            None => false,
        })
    }

    async fn find_response(
        &self,
        assessment_id: &str,
        section: i64,
    ) -> Result<Option<StudentResponseRecord>> {
        self.read(|c| {
            c.responses
                .iter()
                .find(|r| r.assessment_id == assessment_id && r.section == section)
                .cloned()
        })
    }

    async fn insert_response(&self, record: &StudentResponseRecord) -> Result<ObjectId> {
        let id = ObjectId::new();
        let mut stored = record.clone();
        stored.id = Some(id);
        self.write(|c| c.responses.push(stored))?;
        Ok(id)
    }

    async fn update_response(
        &self,
        response_id: &ObjectId,
        update: &ResponseUpdate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.write(|c| {
            c.responses
                .iter_mut()
                .find(|r| r.id.as_ref() == Some(response_id))
                .map(|record| record.apply(update, now))
                .ok_or_else(|| anyhow!("Response record {} not found", response_id))
        })?
    }

    async fn list_responses(&self, assessment_id: &str) -> Result<Vec<StudentResponseRecord>> {
        let mut found = self.read(|c| {
            c.responses
                .iter()
                .filter(|r| r.assessment_id == assessment_id)
                .cloned()
                .collect::<Vec<_>>()
        })?;
        // Stable sort keeps insertion order within a section
        found.sort_by_key(|r| r.section);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        assessment::CreateAssessmentRequest, student_response::ResponseKind,
    };
    use chrono::Duration;

    fn assessment(creator: &str, created_at: DateTime<Utc>) -> Assessment {
        let req: CreateAssessmentRequest = serde_json::from_value(serde_json::json!({
            "name": "Mei", "age": 9, "grade": "P4", "school": "Kowloon"
        }))
        .unwrap();
        Assessment::from_request(req, creator, created_at)
    }

    #[tokio::test]
    async fn lists_newest_first_with_filters() {
        let store = InMemoryAssessmentStore::new();
        let now = Utc::now();
        let older = store
            .insert_assessment(&assessment("a@x.com", now - Duration::minutes(5)))
            .await
            .unwrap();
        let newer = store.insert_assessment(&assessment("a@x.com", now)).await.unwrap();
        store.insert_assessment(&assessment("b@x.com", now)).await.unwrap();
        store.mark_finished(&older.to_hex(), now).await.unwrap();

        let mine = store.list_assessments(Some("a@x.com"), None).await.unwrap();
        assert_eq!(
            mine.iter().map(|a| a.id.unwrap()).collect::<Vec<_>>(),
            vec![newer, older]
        );

        let unfinished = store
            .list_assessments(Some("a@x.com"), Some(false))
            .await
            .unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(store.list_assessments(None, None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn invalid_ids_are_simply_missing() {
        let store = InMemoryAssessmentStore::new();
        assert!(store.get_assessment("not-an-object-id").await.unwrap().is_none());
        assert!(!store.mark_finished("not-an-object-id", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn update_response_errors_for_unknown_record() {
        let store = InMemoryAssessmentStore::new();
        let update = ResponseUpdate::Grade { question: 0, grade: 3 };
        assert!(store
            .update_response(&ObjectId::new(), &update, Utc::now())
            .await
            .is_err());

        let record = StudentResponseRecord::empty("a1", 2, ResponseKind::Audio, Utc::now());
        let id = store.insert_response(&record).await.unwrap();
        store.update_response(&id, &update, Utc::now()).await.unwrap();

        let stored = store.find_response("a1", 2).await.unwrap().unwrap();
        assert_eq!(stored.grades.unwrap()["0"], 3);
    }

    #[tokio::test]
    async fn duplicate_section_records_read_oldest_first() {
        let store = InMemoryAssessmentStore::new();
        let now = Utc::now();
        let first = store
            .insert_response(&StudentResponseRecord::empty("a1", 1, ResponseKind::Audio, now))
            .await
            .unwrap();
        store
            .insert_response(&StudentResponseRecord::empty("a1", 0, ResponseKind::MultipleChoice, now))
            .await
            .unwrap();
        let second = store
            .insert_response(&StudentResponseRecord::empty("a1", 1, ResponseKind::Audio, now))
            .await
            .unwrap();

        let found = store.find_response("a1", 1).await.unwrap().unwrap();
        assert_eq!(found.id, Some(first));

        let listed = store.list_responses("a1").await.unwrap();
        assert_eq!(
            listed.iter().map(|r| (r.section, r.id)).collect::<Vec<_>>(),
            vec![(0, listed[0].id), (1, Some(first)), (1, Some(second))]
        );
    }
}
