use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::{object_storage::object_path_from_reference, store::AssessmentStore, AppState};
use crate::errors::AppError;
use crate::metrics::{
    ANSWERS_SUBMITTED_TOTAL, ASSESSMENTS_CREATED_TOTAL, ASSESSMENTS_FINISHED_TOTAL,
    GRADES_SUBMITTED_TOTAL, SIGNED_URL_FAILURES_TOTAL,
};
use crate::middlewares::auth::IdentityClaims;
use crate::models::{
    assessment::{
        Assessment, AssessmentView, AudioAnswerRequest, AudioGradeRequest,
        CreateAssessmentRequest, McAnswerRequest,
    },
    student_response::{
        ResponseKind, ResponseUpdate, SectionResponses, StudentResponseRecord,
        StudentResponsesView,
    },
};
use crate::services::object_storage::BlobStore;

const DEFAULT_AUDIO_EXTENSION: &str = "webm";

/// A recording received from the client, not yet stored.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub content_type: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl AudioUpload {
    /// Extension from the file name, `webm` when it has none usable.
    fn extension(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| {
                !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .unwrap_or_else(|| DEFAULT_AUDIO_EXTENSION.to_string())
    }
}

/// Cursor position after answering `question`; checked before anything is written.
fn next_question(question: i64) -> Result<i64, AppError> {
    question
        .checked_add(1)
        .ok_or_else(|| AppError::bad_request("question index out of range"))
}

/// Assessment lifecycle: intake, answers, finishing and grading.
pub struct AssessmentService {
    store: Arc<dyn AssessmentStore>,
    blobs: Arc<dyn BlobStore>,
    signed_url_ttl: Duration,
}

impl AssessmentService {
    pub fn new(
        store: Arc<dyn AssessmentStore>,
        blobs: Arc<dyn BlobStore>,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            store,
            blobs,
            signed_url_ttl,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.assessments.clone(),
            state.blobs.clone(),
            Duration::from_secs(state.config.signed_url_ttl_seconds),
        )
    }

    pub async fn create(
        &self,
        caller: &IdentityClaims,
        req: CreateAssessmentRequest,
    ) -> Result<String, AppError> {
        let assessment = Assessment::from_request(req, &caller.email, Utc::now());
        let id = self.store.insert_assessment(&assessment).await?;

        ASSESSMENTS_CREATED_TOTAL.inc();
        tracing::info!(assessment_id = %id, creator = %caller.email, "Assessment created");

        Ok(id.to_hex())
    }

    /// Assessments created by the caller, newest first.
    pub async fn list_own(
        &self,
        caller: &IdentityClaims,
        finished: Option<bool>,
    ) -> Result<Vec<AssessmentView>, AppError> {
        let assessments = self
            .store
            .list_assessments(Some(&caller.email), finished)
            .await?;
        Ok(assessments.into_iter().map(AssessmentView::from).collect())
    }

    pub async fn list_all(&self, finished: Option<bool>) -> Result<Vec<AssessmentView>, AppError> {
        let assessments = self.store.list_assessments(None, finished).await?;
        Ok(assessments.into_iter().map(AssessmentView::from).collect())
    }

    /// Loads an assessment the caller may act on: its creator or an admin.
    pub async fn load_accessible(
        &self,
        caller: &IdentityClaims,
        assessment_id: &str,
    ) -> Result<Assessment, AppError> {
        let assessment = self
            .store
            .get_assessment(assessment_id.trim())
            .await?
            .ok_or_else(|| AppError::not_found("Assessment not found"))?;

        if !caller.is_admin && !assessment.is_owned_by(&caller.email) {
            tracing::warn!(
                assessment_id = %assessment_id,
                caller = %caller.email,
                "Access to another user's assessment denied"
            );
            return Err(AppError::forbidden(
                "You do not have access to this assessment",
            ));
        }

        Ok(assessment)
    }

    pub async fn submit_mc_answer(
        &self,
        caller: &IdentityClaims,
        req: McAnswerRequest,
    ) -> Result<(), AppError> {
        let assessment = self.load_accessible(caller, &req.assessment_id).await?;
        let next = next_question(req.question)?;
        let update = ResponseUpdate::McAnswer {
            question: req.question,
            answer: req.answer,
        };

        self.record_answer(&assessment, req.section, ResponseKind::MultipleChoice, &update)
            .await?;
        self.advance_cursor(&assessment, req.section, next).await?;

        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[ResponseKind::MultipleChoice.as_str()])
            .inc();
        Ok(())
    }

    pub async fn submit_audio_answer(
        &self,
        caller: &IdentityClaims,
        req: AudioAnswerRequest,
    ) -> Result<(), AppError> {
        let assessment = self.load_accessible(caller, &req.assessment_id).await?;
        let next = next_question(req.question)?;
        let update = ResponseUpdate::AudioAnswer {
            question: req.question,
            file: req.gs_uri.trim().to_string(),
            transcript: req.transcript,
        };

        self.record_answer(&assessment, req.section, ResponseKind::Audio, &update)
            .await?;
        // Audio answers move the cursor the same way MC answers do
        self.advance_cursor(&assessment, req.section, next).await?;

        ANSWERS_SUBMITTED_TOTAL
            .with_label_values(&[ResponseKind::Audio.as_str()])
            .inc();
        Ok(())
    }

    /// Find-or-create the section record, then write the keyed value.
    ///
    /// Two concurrent first answers for one section can both miss the
    /// lookup and create two records; reads then see the first one.
    async fn record_answer(
        &self,
        assessment: &Assessment,
        section: i64,
        kind: ResponseKind,
        update: &ResponseUpdate,
    ) -> Result<(), AppError> {
        let assessment_id = assessment.id_hex();
        let now = Utc::now();

        let response_id = match self.store.find_response(&assessment_id, section).await? {
            Some(existing) if existing.kind != kind => {
                return Err(AppError::bad_request(format!(
                    "Section {} holds {} answers",
                    section,
                    existing.kind.as_str()
                )));
            }
            Some(existing) => existing.id,
            None => None,
        };

        let response_id = match response_id {
            Some(id) => id,
            None => {
                let record = StudentResponseRecord::empty(&assessment_id, section, kind, now);
                self.store.insert_response(&record).await?
            }
        };

        self.store.update_response(&response_id, update, now).await?;
        Ok(())
    }

    async fn advance_cursor(
        &self,
        assessment: &Assessment,
        section: i64,
        next_question: i64,
    ) -> Result<(), AppError> {
        let updated = self
            .store
            .update_progress(&assessment.id_hex(), section, next_question, Utc::now())
            .await?;
        if !updated {
            return Err(AppError::not_found("Assessment not found"));
        }
        Ok(())
    }

    /// Marks the assessment finished. Finishing twice keeps the first `finishedAt`.
    pub async fn finish(&self, caller: &IdentityClaims, assessment_id: &str) -> Result<(), AppError> {
        let assessment = self.load_accessible(caller, assessment_id).await?;
        if assessment.finished {
            tracing::debug!(assessment_id = %assessment.id_hex(), "Assessment already finished");
            return Ok(());
        }

        if !self.store.mark_finished(&assessment.id_hex(), Utc::now()).await? {
            return Err(AppError::not_found("Assessment not found"));
        }

        ASSESSMENTS_FINISHED_TOTAL.inc();
        tracing::info!(assessment_id = %assessment.id_hex(), "Assessment finished");
        Ok(())
    }

    /// The assessment with every section's answers, audio files as signed URLs.
    pub async fn student_responses(
        &self,
        caller: &IdentityClaims,
        assessment_id: &str,
    ) -> Result<StudentResponsesView, AppError> {
        let assessment = self.load_accessible(caller, assessment_id).await?;
        let records = self.store.list_responses(&assessment.id_hex()).await?;

        let mut by_section = BTreeMap::new();
        for record in records {
            let key = record.section.to_string();
            if by_section.contains_key(&key) {
                tracing::warn!(
                    assessment_id = %record.assessment_id,
                    section = record.section,
                    "Duplicate response record for section ignored"
                );
                continue;
            }
            by_section.insert(key, self.section_view(record));
        }

        Ok(StudentResponsesView {
            assessment: AssessmentView::from(assessment),
            student_responses_by_section: by_section,
        })
    }

    fn section_view(&self, record: StudentResponseRecord) -> SectionResponses {
        match record.kind {
            ResponseKind::MultipleChoice => SectionResponses::MultipleChoice {
                student_responses: record.student_responses.unwrap_or_default(),
            },
            ResponseKind::Audio => SectionResponses::Audio {
                files: record
                    .files
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(question, reference)| {
                        let url = self.signed_url(&reference);
                        (question, url)
                    })
                    .collect(),
                transcripts: record.transcripts.unwrap_or_default(),
                grades: record.grades,
            },
        }
    }

    /// Empty string when the reference cannot be parsed or signed.
    fn signed_url(&self, reference: &str) -> String {
        let Some(path) = object_path_from_reference(reference) else {
            SIGNED_URL_FAILURES_TOTAL.inc();
            tracing::error!("Unparsable blob reference {:?}", reference);
            return String::new();
        };

        match self.blobs.presign_get(path, self.signed_url_ttl) {
            Ok(url) => url,
            Err(e) => {
                SIGNED_URL_FAILURES_TOTAL.inc();
                tracing::error!("Failed to generate signed URL for {}: {:#}", reference, e);
                String::new()
            }
        }
    }

    /// Stores a recording for one question and returns its blob reference.
    pub async fn upload_recording(
        &self,
        caller: &IdentityClaims,
        assessment_id: &str,
        section: i64,
        question: i64,
        audio: AudioUpload,
    ) -> Result<String, AppError> {
        if !audio.content_type.starts_with("audio/") {
            return Err(AppError::bad_request(format!(
                "Unsupported content type {:?}; audio/* expected",
                audio.content_type
            )));
        }
        if audio.bytes.is_empty() {
            return Err(AppError::bad_request("audio file is empty"));
        }

        let assessment = self.load_accessible(caller, assessment_id).await?;
        let key = self
            .blobs
            .audio_key(&assessment.id_hex(), section, question, &audio.extension());
        let size = audio.bytes.len();

        self.blobs
            .put_object(&key, audio.bytes, &audio.content_type)
            .await?;

        tracing::info!(
            assessment_id = %assessment.id_hex(),
            section,
            question,
            size,
            "Audio recording stored at {}",
            key
        );
        Ok(self.blobs.reference_for(&key))
    }

    pub async fn submit_grade(
        &self,
        caller: &IdentityClaims,
        req: AudioGradeRequest,
    ) -> Result<(), AppError> {
        let assessment = self.load_accessible(caller, &req.assessment_id).await?;

        let record = self
            .store
            .find_response(&assessment.id_hex(), req.section)
            .await?
            .ok_or_else(|| AppError::not_found("No responses recorded for this section"))?;

        if record.kind != ResponseKind::Audio {
            return Err(AppError::bad_request("Only audio sections can be graded"));
        }

        let response_id = record
            .id
            .ok_or_else(|| anyhow::anyhow!("Response record without _id"))?;
        let update = ResponseUpdate::Grade {
            question: req.question,
            grade: req.grade,
        };
        self.store.update_response(&response_id, &update, Utc::now()).await?;

        GRADES_SUBMITTED_TOTAL
            .with_label_values(&[&req.grade.to_string()])
            .inc();
        tracing::info!(
            assessment_id = %assessment.id_hex(),
            section = req.section,
            question = req.question,
            grade = req.grade,
            grader = %caller.email,
            "Audio answer graded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{memory_store::InMemoryAssessmentStore, object_storage::InMemoryBlobStore};
    use axum::http::StatusCode;
    use serde_json::json;

    fn caller(email: &str, is_admin: bool) -> IdentityClaims {
        IdentityClaims {
            sub: email.to_string(),
            email: email.to_string(),
            is_admin,
            exp: 0,
            iat: 0,
        }
    }

    fn service() -> (AssessmentService, Arc<InMemoryBlobStore>) {
        let blobs = Arc::new(InMemoryBlobStore::new("recordings", "audio"));
        let service = AssessmentService::new(
            Arc::new(InMemoryAssessmentStore::new()),
            blobs.clone(),
            Duration::from_secs(60),
        );
        (service, blobs)
    }

    async fn create(service: &AssessmentService, owner: &IdentityClaims) -> String {
        let req = serde_json::from_value(json!({
            "name": "Mei", "age": 9, "grade": "P4", "school": "Kowloon"
        }))
        .unwrap();
        service.create(owner, req).await.unwrap()
    }

    fn mc(id: &str, section: i64, question: i64, answer: i64) -> McAnswerRequest {
        serde_json::from_value(json!({
            "assessmentId": id, "section": section, "question": question, "answer": answer
        }))
        .unwrap()
    }

    fn audio(id: &str, section: i64, question: i64, uri: &str) -> AudioAnswerRequest {
        serde_json::from_value(json!({
            "assessmentId": id, "section": section, "question": question,
            "transcript": "hello", "gsUri": uri
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn mc_answers_overwrite_and_move_cursor() {
        let (service, _) = service();
        let owner = caller("t@example.com", false);
        let id = create(&service, &owner).await;

        service.submit_mc_answer(&owner, mc(&id, 0, 3, 1)).await.unwrap();
        service.submit_mc_answer(&owner, mc(&id, 0, 3, 2)).await.unwrap();

        let view = service.student_responses(&owner, &id).await.unwrap();
        assert_eq!(
            serde_json::to_value(&view.student_responses_by_section["0"]).unwrap(),
            json!({ "type": "mc", "studentResponses": { "3": 2 } })
        );
        assert_eq!(view.assessment.current_section, 0);
        assert_eq!(view.assessment.current_question, 4);
    }

    #[tokio::test]
    async fn last_question_index_is_rejected_before_writing() {
        let (service, _) = service();
        let owner = caller("t@example.com", false);
        let id = create(&service, &owner).await;

        let err = service
            .submit_mc_answer(&owner, mc(&id, 0, i64::MAX, 1))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let view = service.student_responses(&owner, &id).await.unwrap();
        assert!(view.student_responses_by_section.is_empty());
        assert_eq!(view.assessment.current_question, 0);
    }

    #[tokio::test]
    async fn mixing_kinds_in_one_section_is_rejected() {
        let (service, _) = service();
        let owner = caller("t@example.com", false);
        let id = create(&service, &owner).await;

        service.submit_mc_answer(&owner, mc(&id, 1, 0, 1)).await.unwrap();
        let err = service
            .submit_audio_answer(&owner, audio(&id, 1, 1, "s3://recordings/audio/x.webm"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_teachers_are_denied_but_admins_pass() {
        let (service, _) = service();
        let owner = caller("t@example.com", false);
        let id = create(&service, &owner).await;

        let err = service
            .load_accessible(&caller("other@example.com", false), &id)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        assert!(service
            .load_accessible(&caller("root@example.com", true), &id)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn finishing_twice_keeps_first_timestamp() {
        let (service, _) = service();
        let owner = caller("t@example.com", false);
        let id = create(&service, &owner).await;

        service.finish(&owner, &id).await.unwrap();
        let first = service.load_accessible(&owner, &id).await.unwrap().finished_at;
        service.finish(&owner, &id).await.unwrap();
        let second = service.load_accessible(&owner, &id).await.unwrap();

        assert!(second.finished);
        assert_eq!(second.finished_at, first);
    }

    #[tokio::test]
    async fn unsignable_files_become_empty_strings() {
        let (service, blobs) = service();
        let owner = caller("t@example.com", false);
        let id = create(&service, &owner).await;

        let key = blobs.audio_key(&id, 2, 0, "webm");
        blobs.put_object(&key, vec![0], "audio/webm").await.unwrap();
        let stored = blobs.reference_for(&key);

        service.submit_audio_answer(&owner, audio(&id, 2, 0, &stored)).await.unwrap();
        service
            .submit_audio_answer(&owner, audio(&id, 2, 1, "s3://recordings/audio/missing.webm"))
            .await
            .unwrap();
        service
            .submit_audio_answer(&owner, audio(&id, 2, 2, "garbage"))
            .await
            .unwrap();

        let view = service.student_responses(&owner, &id).await.unwrap();
        match &view.student_responses_by_section["2"] {
            SectionResponses::Audio { files, transcripts, grades } => {
                assert!(files["0"].starts_with("memory://recordings/"));
                assert_eq!(files["1"], "");
                assert_eq!(files["2"], "");
                assert_eq!(transcripts["0"], "hello");
                assert!(grades.is_none());
            }
            other => panic!("unexpected section payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn uploads_accept_audio_only() {
        let (service, blobs) = service();
        let owner = caller("t@example.com", false);
        let id = create(&service, &owner).await;

        let upload = |content_type: &str, file_name: Option<&str>| AudioUpload {
            content_type: content_type.to_string(),
            file_name: file_name.map(str::to_string),
            bytes: vec![1, 2, 3],
        };

        let err = service
            .upload_recording(&owner, &id, 1, 0, upload("text/plain", Some("a.txt")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let reference = service
            .upload_recording(&owner, &id, 1, 0, upload("audio/ogg", Some("take.OGG")))
            .await
            .unwrap();
        assert_eq!(reference, format!("s3://recordings/audio/{}/1/0.ogg", id));
        assert!(blobs.contains(&format!("audio/{}/1/0.ogg", id)));

        let reference = service
            .upload_recording(&owner, &id, 1, 1, upload("audio/webm", None))
            .await
            .unwrap();
        assert!(reference.ends_with("/1/1.webm"));
    }

    #[tokio::test]
    async fn grading_requires_an_audio_record() {
        let (service, _) = service();
        let owner = caller("t@example.com", false);
        let id = create(&service, &owner).await;

        let grade = |section: i64| -> AudioGradeRequest {
            serde_json::from_value(json!({
                "assessmentId": id, "section": section, "question": 0, "grade": 4
            }))
            .unwrap()
        };

        let err = service.submit_grade(&owner, grade(5)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        service.submit_mc_answer(&owner, mc(&id, 0, 0, 1)).await.unwrap();
        let err = service.submit_grade(&owner, grade(0)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        service
            .submit_audio_answer(&owner, audio(&id, 1, 0, "s3://recordings/a.webm"))
            .await
            .unwrap();
        service.submit_grade(&owner, grade(1)).await.unwrap();

        let view = service.student_responses(&owner, &id).await.unwrap();
        match &view.student_responses_by_section["1"] {
            SectionResponses::Audio { grades, .. } => {
                assert_eq!(grades.as_ref().unwrap()["0"], 4)
            }
            other => panic!("unexpected section payload: {:?}", other),
        }
    }
}
