use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};
use crate::utils::{coerce::int_or_string, time::iso_timestamp};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cantonese,
    Mandarin,
    English,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LanguageEntry {
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_specify: Option<String>,
}

/// Assessment document stored in the "assessments" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    pub grade: String,
    pub school: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother_tongue: Option<LanguageEntry>,
    #[serde(default)]
    pub other_languages: Vec<LanguageEntry>,
    pub creator_email: String,
    pub current_section: i64,
    pub current_question: i64,
    pub finished: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Assessment {
    /// New record from the intake form, with a zeroed progress cursor.
    pub fn from_request(req: CreateAssessmentRequest, creator_email: &str, now: DateTime<Utc>) -> Self {
        Assessment {
            id: None,
            name: req.name.trim().to_string(),
            age: req.age,
            birth_date: req.birth_date.map(|value| value.trim().to_string()),
            gender: req.gender,
            grade: req.grade.trim().to_string(),
            school: req.school.trim().to_string(),
            mother_tongue: req.mother_tongue,
            other_languages: req.other_languages,
            creator_email: creator_email.to_string(),
            current_section: 0,
            current_question: 0,
            finished: false,
            created_at: now,
            updated_at: None,
            finished_at: None,
        }
    }

    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }

    pub fn is_owned_by(&self, email: &str) -> bool {
        self.creator_email == email
    }
}

/// Assessment as returned to the client (id as hex, ISO creation time)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    pub grade: String,
    pub school: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mother_tongue: Option<LanguageEntry>,
    pub other_languages: Vec<LanguageEntry>,
    pub creator_email: String,
    pub current_section: i64,
    pub current_question: i64,
    pub finished: bool,
    pub created_at_iso_timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at_iso_timestamp: Option<String>,
}

impl From<Assessment> for AssessmentView {
    fn from(assessment: Assessment) -> Self {
        AssessmentView {
            id: assessment.id_hex(),
            name: assessment.name,
            age: assessment.age,
            birth_date: assessment.birth_date,
            gender: assessment.gender,
            grade: assessment.grade,
            school: assessment.school,
            mother_tongue: assessment.mother_tongue,
            other_languages: assessment.other_languages,
            creator_email: assessment.creator_email,
            current_section: assessment.current_section,
            current_question: assessment.current_question,
            finished: assessment.finished,
            created_at_iso_timestamp: iso_timestamp(assessment.created_at),
            finished_at_iso_timestamp: assessment.finished_at.map(iso_timestamp),
        }
    }
}

/// Intake form payload for `create-assessment`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_age_or_birth_date"))]
pub struct CreateAssessmentRequest {
    #[validate(custom(function = "not_blank", message = "name is required"))]
    pub name: String,
    #[validate(range(min = 0, max = 150, message = "age must be between 0 and 150"))]
    pub age: Option<i64>,
    #[validate(custom(function = "valid_birth_date"))]
    pub birth_date: Option<String>,
    pub gender: Option<Gender>,
    #[validate(custom(function = "not_blank", message = "grade is required"))]
    pub grade: String,
    #[validate(custom(function = "not_blank", message = "school is required"))]
    pub school: String,
    pub mother_tongue: Option<LanguageEntry>,
    #[serde(default)]
    pub other_languages: Vec<LanguageEntry>,
}

#[derive(Debug, Serialize)]
pub struct CreateAssessmentResponse {
    pub id: String,
}

/// `get-assessments`: the caller's assessments, optionally by finished flag
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListAssessmentsRequest {
    pub finished: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct AssessmentsResponse {
    pub assessments: Vec<AssessmentView>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentIdRequest {
    #[validate(custom(function = "not_blank", message = "assessmentId is required"))]
    pub assessment_id: String,
}

/// `submit-mc-answer`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct McAnswerRequest {
    #[validate(custom(function = "not_blank", message = "assessmentId is required"))]
    pub assessment_id: String,
    #[serde(deserialize_with = "int_or_string")]
    #[validate(range(min = 0, max = 2147483647, message = "section must be between 0 and 2147483647"))]
    pub section: i64,
    #[serde(deserialize_with = "int_or_string")]
    #[validate(range(min = 0, max = 2147483647, message = "question must be between 0 and 2147483647"))]
    pub question: i64,
    #[serde(deserialize_with = "int_or_string")]
    #[validate(range(min = 0, max = 2147483647, message = "answer must be between 0 and 2147483647"))]
    pub answer: i64,
}

/// `submit-audio-answer`: the recording itself is already in blob storage
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AudioAnswerRequest {
    #[validate(custom(function = "not_blank", message = "assessmentId is required"))]
    pub assessment_id: String,
    #[serde(deserialize_with = "int_or_string")]
    #[validate(range(min = 0, max = 2147483647, message = "section must be between 0 and 2147483647"))]
    pub section: i64,
    #[serde(deserialize_with = "int_or_string")]
    #[validate(range(min = 0, max = 2147483647, message = "question must be between 0 and 2147483647"))]
    pub question: i64,
    #[serde(default)]
    pub transcript: String,
    #[validate(custom(function = "not_blank", message = "gsUri is required"))]
    pub gs_uri: String,
}

/// `submit-audio-grade`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AudioGradeRequest {
    #[validate(custom(function = "not_blank", message = "assessmentId is required"))]
    pub assessment_id: String,
    #[serde(deserialize_with = "int_or_string")]
    #[validate(range(min = 0, max = 2147483647, message = "section must be between 0 and 2147483647"))]
    pub section: i64,
    #[serde(deserialize_with = "int_or_string")]
    #[validate(range(min = 0, max = 2147483647, message = "question must be between 0 and 2147483647"))]
    pub question: i64,
    #[serde(deserialize_with = "int_or_string")]
    #[validate(range(min = 0, max = 5, message = "grade must be between 0 and 5"))]
    pub grade: i64,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        OkResponse { ok: true }
    }
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

fn valid_birth_date(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    let parsed = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d"));
    match parsed {
        Ok(date) if date <= Utc::now().date_naive() => Ok(()),
        _ => Err(ValidationError::new("birth_date")
            .with_message("birthDate must be YYYY-MM or YYYY-MM-DD and not in the future".into())),
    }
}

fn validate_age_or_birth_date(req: &CreateAssessmentRequest) -> Result<(), ValidationError> {
    if req.age.is_none() && req.birth_date.is_none() {
        return Err(ValidationError::new("age_or_birth_date")
            .with_message("either age or birthDate is required".into()));
    }
    Ok(())
}
