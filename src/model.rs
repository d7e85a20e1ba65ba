use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub level: u8,
    pub description: String,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: String,
    pub name: String,
    pub points: i64,
    pub levels: Vec<Level>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    pub id: String,
    pub title: String,
    pub total_points: i64,
    pub criteria: Vec<Criterion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionScore {
    pub criterion_id: String,
    pub level: Option<u8>,
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricScore {
    pub id: String,
    pub submission_id: String,
    pub rubric_id: String,
    pub scores: Vec<CriterionScore>,
    pub total: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    NotSubmitted,
    Draft,
    Submitted,
    Late,
    Resubmitted,
    Excused,
    Graded,
    ReturnedForRevision,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 8] = [
        SubmissionStatus::NotSubmitted,
        SubmissionStatus::Draft,
        SubmissionStatus::Submitted,
        SubmissionStatus::Late,
        SubmissionStatus::Resubmitted,
        SubmissionStatus::Excused,
        SubmissionStatus::Graded,
        SubmissionStatus::ReturnedForRevision,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::NotSubmitted => "not_submitted",
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Late => "late",
            SubmissionStatus::Resubmitted => "resubmitted",
            SubmissionStatus::Excused => "excused",
            SubmissionStatus::Graded => "graded",
            SubmissionStatus::ReturnedForRevision => "returned_for_revision",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|s| s.as_str() == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub status: SubmissionStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
    pub grader_id: Option<String>,
    pub attempt_count: u32,
    pub is_draft: bool,
    pub feedback_requested: bool,
    pub rubric_score_id: Option<String>,
}

impl Submission {
    pub fn new(id: String, assignment_id: String, student_id: String) -> Self {
        Self {
            id,
            assignment_id,
            student_id,
            status: SubmissionStatus::NotSubmitted,
            submitted_at: None,
            score: None,
            feedback: None,
            graded_at: None,
            grader_id: None,
            attempt_count: 0,
            is_draft: false,
            feedback_requested: false,
            rubric_score_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub class_id: String,
    pub title: String,
    pub category: Option<String>,
    pub total_points: f64,
    pub weight: f64,
    pub due_date: Option<DateTime<Utc>>,
    pub rubric_id: Option<String>,
}
