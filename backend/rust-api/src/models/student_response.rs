use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{assessment::AssessmentView, bson_datetime_as_chrono, bson_datetime_as_chrono_option};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResponseKind {
    #[serde(rename = "mc")]
    MultipleChoice,
    #[serde(rename = "audio")]
    Audio,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::MultipleChoice => "mc",
            ResponseKind::Audio => "audio",
        }
    }
}

/// One document per assessment × section in "studentResponses".
///
/// Question indices are map keys, stored as decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResponseRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "assessment-id")]
    pub assessment_id: String,
    pub section: i64,
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_responses: Option<BTreeMap<String, i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcripts: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grades: Option<BTreeMap<String, i64>>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StudentResponseRecord {
    /// Empty record created on the first answer of a section.
    pub fn empty(assessment_id: &str, section: i64, kind: ResponseKind, now: DateTime<Utc>) -> Self {
        let (student_responses, files, transcripts) = match kind {
            ResponseKind::MultipleChoice => (Some(BTreeMap::new()), None, None),
            ResponseKind::Audio => (None, Some(BTreeMap::new()), Some(BTreeMap::new())),
        };
        StudentResponseRecord {
            id: None,
            assessment_id: assessment_id.to_string(),
            section,
            kind,
            student_responses,
            files,
            transcripts,
            grades: None,
            created_at: now,
            updated_at: None,
        }
    }

    /// Applies an update the way the document store does with `$set` on dotted paths.
    pub fn apply(&mut self, update: &ResponseUpdate, now: DateTime<Utc>) {
        match update {
            ResponseUpdate::McAnswer { question, answer } => {
                self.student_responses
                    .get_or_insert_with(BTreeMap::new)
                    .insert(question.to_string(), *answer);
            }
            ResponseUpdate::AudioAnswer {
                question,
                file,
                transcript,
            } => {
                self.files
                    .get_or_insert_with(BTreeMap::new)
                    .insert(question.to_string(), file.clone());
                self.transcripts
                    .get_or_insert_with(BTreeMap::new)
                    .insert(question.to_string(), transcript.clone());
            }
            ResponseUpdate::Grade { question, grade } => {
                self.grades
                    .get_or_insert_with(BTreeMap::new)
                    .insert(question.to_string(), *grade);
            }
        }
        self.updated_at = Some(now);
    }
}

/// A single keyed write into a response record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseUpdate {
    McAnswer {
        question: i64,
        answer: i64,
    },
    AudioAnswer {
        question: i64,
        file: String,
        transcript: String,
    },
    Grade {
        question: i64,
        grade: i64,
    },
}

impl ResponseUpdate {
    /// `(dotted path, value)` pairs for a document-store `$set`.
    pub fn set_fields(&self) -> Vec<(String, mongodb::bson::Bson)> {
        use mongodb::bson::Bson;
        match self {
            ResponseUpdate::McAnswer { question, answer } => vec![(
                format!("studentResponses.{}", question),
                Bson::Int64(*answer),
            )],
            ResponseUpdate::AudioAnswer {
                question,
                file,
                transcript,
            } => vec![
                (format!("files.{}", question), Bson::String(file.clone())),
                (
                    format!("transcripts.{}", question),
                    Bson::String(transcript.clone()),
                ),
            ],
            ResponseUpdate::Grade { question, grade } => {
                vec![(format!("grades.{}", question), Bson::Int64(*grade))]
            }
        }
    }
}

/// Section payload of the grading view, discriminated by `type`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum SectionResponses {
    #[serde(rename = "mc", rename_all = "camelCase")]
    MultipleChoice {
        student_responses: BTreeMap<String, i64>,
    },
    #[serde(rename = "audio")]
    Audio {
        files: BTreeMap<String, String>,
        transcripts: BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        grades: Option<BTreeMap<String, i64>>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResponsesView {
    pub assessment: AssessmentView,
    pub student_responses_by_section: BTreeMap<String, SectionResponses>,
}
