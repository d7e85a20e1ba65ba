use crate::aggregate::{assignment_average, class_average, weighted_average, WeightedScore};
use crate::bucket::{achievement_level_for_percentage, letter_grade_on_scale, LetterGrade};
use crate::config::GradingConfig;
use crate::distribution::{analyze, compute_median, DistributionSummary};
use crate::model::{Assignment, Submission, SubmissionStatus};
use crate::submission::{counted_percentage, is_late};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CalcError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("cannot {action} a submission that is {}", .from.as_str())]
    IllegalTransition {
        from: SubmissionStatus,
        action: &'static str,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Storage(String),
}

impl CalcError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CalcError::InvalidInput(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CalcError::NotFound(what.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            CalcError::InvalidInput(_) => "bad_params",
            CalcError::IllegalTransition { .. } => "illegal_transition",
            CalcError::NotFound(_) => "not_found",
            CalcError::Storage(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CalcError::IllegalTransition { from, .. } => {
                Some(serde_json::json!({ "status": from.as_str() }))
            }
            _ => None,
        }
    }
}

impl From<anyhow::Error> for CalcError {
    fn from(e: anyhow::Error) -> Self {
        CalcError::Storage(format!("{e:#}"))
    }
}

/// 1-decimal rounding for displayed marks: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStats {
    pub assignment_id: String,
    pub title: String,
    pub category: Option<String>,
    pub total_points: f64,
    pub weight: f64,
    pub graded_count: usize,
    pub pending_count: usize,
    pub excused_count: usize,
    pub missing_count: usize,
    pub late_count: usize,
    pub average_percent: Option<f64>,
    pub median_percent: Option<f64>,
    pub letter: Option<LetterGrade>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFinal {
    pub student_id: String,
    pub final_percent: Option<f64>,
    pub letter: Option<LetterGrade>,
    pub achievement_level: Option<u8>,
    pub graded_count: usize,
    pub excused_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub class_id: String,
    pub class_average: Option<f64>,
    pub letter: Option<LetterGrade>,
    pub per_assignment: Vec<AssignmentStats>,
    pub per_student: Vec<StudentFinal>,
    pub distribution: Option<DistributionSummary>,
}

fn letter_for(percent: Option<f64>, cfg: &GradingConfig) -> Result<Option<LetterGrade>, CalcError> {
    percent
        .map(|p| letter_grade_on_scale(p, cfg.letter_scale))
        .transpose()
}

pub fn compute_assignment_stats(
    assignment: &Assignment,
    submissions: &[Submission],
    cfg: &GradingConfig,
) -> Result<AssignmentStats, CalcError> {
    let mut graded: Vec<f64> = Vec::new();
    let mut pending_count = 0;
    let mut excused_count = 0;
    let mut missing_count = 0;
    let mut late_count = 0;

    for s in submissions.iter().filter(|s| s.assignment_id == assignment.id) {
        if is_late(s, assignment) {
            late_count += 1;
        }
        match s.status {
            SubmissionStatus::Excused => excused_count += 1,
            SubmissionStatus::NotSubmitted | SubmissionStatus::Draft => missing_count += 1,
            SubmissionStatus::Graded => match counted_percentage(s, assignment) {
                Some(p) => graded.push(p),
                None => pending_count += 1,
            },
            _ => pending_count += 1,
        }
    }

    let average = assignment_average(graded.iter().copied())?.map(round_off_1_decimal);
    graded.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let median = compute_median(&graded).map(round_off_1_decimal);

    Ok(AssignmentStats {
        assignment_id: assignment.id.clone(),
        title: assignment.title.clone(),
        category: assignment.category.clone(),
        total_points: assignment.total_points,
        weight: assignment.weight,
        graded_count: graded.len(),
        pending_count,
        excused_count,
        missing_count,
        late_count,
        average_percent: average,
        median_percent: median,
        letter: letter_for(average, cfg)?,
    })
}

/// Each student's weighted mark over the assignments they were graded on.
pub fn compute_student_final(
    student_id: &str,
    assignments: &[Assignment],
    submissions: &[Submission],
    cfg: &GradingConfig,
) -> Result<StudentFinal, CalcError> {
    let by_assignment: HashMap<&str, &Submission> = submissions
        .iter()
        .filter(|s| s.student_id == student_id)
        .map(|s| (s.assignment_id.as_str(), s))
        .collect();

    let mut entries: Vec<WeightedScore> = Vec::new();
    let mut excused_count = 0;
    for a in assignments {
        let Some(s) = by_assignment.get(a.id.as_str()) else {
            continue;
        };
        if s.status == SubmissionStatus::Excused {
            excused_count += 1;
            continue;
        }
        if let Some(p) = counted_percentage(s, a) {
            entries.push(WeightedScore::new(p, a.weight));
        }
    }

    let final_percent = weighted_average(&entries)?.map(round_off_1_decimal);
    Ok(StudentFinal {
        student_id: student_id.to_string(),
        final_percent,
        letter: letter_for(final_percent, cfg)?,
        achievement_level: final_percent
            .map(|p| achievement_level_for_percentage(p, cfg.achievement_table))
            .transpose()?,
        graded_count: entries.len(),
        excused_count,
    })
}

/// Class rollup: assignment averages weighted by assignment weight, plus
/// per-student finals and their distribution.
pub fn compute_class_summary(
    class_id: &str,
    assignments: &[Assignment],
    submissions: &[Submission],
    student_ids: &[String],
    cfg: &GradingConfig,
) -> Result<ClassSummary, CalcError> {
    let per_assignment = assignments
        .iter()
        .map(|a| compute_assignment_stats(a, submissions, cfg))
        .collect::<Result<Vec<_>, _>>()?;

    let class_avg = class_average(
        per_assignment
            .iter()
            .map(|s| (s.average_percent, s.weight)),
    )?
    .map(round_off_1_decimal);

    let per_student = student_ids
        .iter()
        .map(|id| compute_student_final(id, assignments, submissions, cfg))
        .collect::<Result<Vec<_>, _>>()?;

    let finals: Vec<f64> = per_student.iter().filter_map(|s| s.final_percent).collect();
    let distribution = analyze(&finals, 100.0)?;

    Ok(ClassSummary {
        class_id: class_id.to_string(),
        class_average: class_avg,
        letter: letter_for(class_avg, cfg)?,
        per_assignment,
        per_student,
        distribution,
    })
}
