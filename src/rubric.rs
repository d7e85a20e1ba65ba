use crate::calc::CalcError;
use crate::model::{Criterion, CriterionScore, Level, Rubric, RubricScore};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// Share of a criterion's points earned at levels 1..=4. Fixed for every rubric.
pub const LEVEL_PERCENTS: [u8; 4] = [50, 65, 80, 100];

pub const DEFAULT_LEVEL_DESCRIPTIONS: [&str; 4] = [
    "Limited effectiveness",
    "Some effectiveness",
    "Considerable effectiveness",
    "High degree of effectiveness",
];

pub fn level_percent(level: u8) -> Result<u8, CalcError> {
    match level {
        1..=4 => Ok(LEVEL_PERCENTS[(level - 1) as usize]),
        _ => Err(CalcError::invalid(format!("level must be 1..=4 (got {level})"))),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionDraft {
    pub name: String,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub level_descriptions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricDraft {
    pub title: String,
    pub total_points: i64,
    pub criteria: Vec<CriterionDraft>,
}

/// Validates a draft and assigns ids. Allocations that do not add up to the
/// rubric total are kept as entered; scoring ignores them anyway.
pub fn build_rubric<F>(draft: RubricDraft, mut new_id: F) -> Result<Rubric, CalcError>
where
    F: FnMut() -> String,
{
    let title = draft.title.trim().to_string();
    if title.is_empty() {
        return Err(CalcError::invalid("rubric title must not be empty"));
    }
    if draft.total_points < 0 {
        return Err(CalcError::invalid("totalPoints must not be negative"));
    }

    let default_points = draft.total_points / (draft.criteria.len().max(1) as i64);
    let mut criteria = Vec::with_capacity(draft.criteria.len());
    for (i, c) in draft.criteria.into_iter().enumerate() {
        let name = c.name.trim().to_string();
        if name.is_empty() {
            return Err(CalcError::invalid(format!("criteria[{i}].name must not be empty")));
        }
        if c.level_descriptions.len() > LEVEL_PERCENTS.len() {
            return Err(CalcError::invalid(format!(
                "criteria[{i}] has {} levels; at most 4 are allowed",
                c.level_descriptions.len()
            )));
        }
        let points = c.points.unwrap_or(default_points);
        if points < 0 {
            return Err(CalcError::invalid(format!("criteria[{i}].points must not be negative")));
        }
        let levels = LEVEL_PERCENTS
            .iter()
            .enumerate()
            .map(|(idx, percent)| Level {
                level: (idx + 1) as u8,
                description: c
                    .level_descriptions
                    .get(idx)
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| DEFAULT_LEVEL_DESCRIPTIONS[idx].to_string()),
                percent: *percent,
            })
            .collect();
        criteria.push(Criterion {
            id: new_id(),
            name,
            points,
            levels,
        });
    }

    let rubric = Rubric {
        id: new_id(),
        title,
        total_points: draft.total_points,
        criteria,
    };
    let allocated = allocated_points(&rubric);
    if !rubric.criteria.is_empty() && allocated != rubric.total_points {
        tracing::warn!(
            rubric = %rubric.title,
            total_points = rubric.total_points,
            allocated,
            "criterion allocations do not sum to rubric total"
        );
    }
    Ok(rubric)
}

pub fn allocated_points(rubric: &Rubric) -> i64 {
    rubric.criteria.iter().map(|c| c.points).sum()
}

/// Truncating division: a 100-point rubric with 3 criteria gives 33 per criterion.
pub fn points_per_criterion(rubric: &Rubric) -> i64 {
    if rubric.criteria.is_empty() {
        return 0;
    }
    rubric.total_points / rubric.criteria.len() as i64
}

fn check_selections(rubric: &Rubric, selections: &HashMap<String, u8>) -> Result<(), CalcError> {
    if rubric.total_points < 0 {
        return Err(CalcError::invalid("rubric totalPoints must not be negative"));
    }
    for (criterion_id, level) in selections {
        let Some(criterion) = rubric.criteria.iter().find(|c| &c.id == criterion_id) else {
            return Err(CalcError::invalid(format!(
                "criterion {criterion_id} is not part of rubric {}",
                rubric.id
            )));
        };
        level_percent(*level)?;
        if !criterion.levels.iter().any(|l| l.level == *level) {
            return Err(CalcError::invalid(format!(
                "criterion {} has no level {level}",
                criterion.name
            )));
        }
    }
    Ok(())
}

/// Per-criterion breakdown in rubric order. Unselected criteria score 0.
pub fn criterion_scores(
    rubric: &Rubric,
    selections: &HashMap<String, u8>,
    comments: &HashMap<String, String>,
) -> Result<Vec<CriterionScore>, CalcError> {
    check_selections(rubric, selections)?;
    let per_criterion = points_per_criterion(rubric);

    let mut out = Vec::with_capacity(rubric.criteria.len());
    for c in &rubric.criteria {
        let level = selections.get(&c.id).copied();
        let score = match level {
            Some(l) => per_criterion * i64::from(level_percent(l)?) / 100,
            None => 0,
        };
        out.push(CriterionScore {
            criterion_id: c.id.clone(),
            level,
            score,
            comment: comments
                .get(&c.id)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        });
    }
    Ok(out)
}

pub fn score(rubric: &Rubric, selections: &HashMap<String, u8>) -> Result<i64, CalcError> {
    Ok(criterion_scores(rubric, selections, &HashMap::new())?
        .iter()
        .map(|c| c.score)
        .sum())
}

pub fn build_rubric_score(
    id: String,
    rubric: &Rubric,
    submission_id: &str,
    selections: &HashMap<String, u8>,
    comments: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> Result<RubricScore, CalcError> {
    let scores = criterion_scores(rubric, selections, comments)?;
    let total = scores.iter().map(|c| c.score).sum();
    Ok(RubricScore {
        id,
        submission_id: submission_id.to_string(),
        rubric_id: rubric.id.clone(),
        scores,
        total,
        created_at: now,
    })
}

/// Deep copy with fresh ids, used when an assignment is duplicated.
pub fn duplicate_rubric<F>(rubric: &Rubric, mut new_id: F) -> Rubric
where
    F: FnMut() -> String,
{
    let criteria = rubric
        .criteria
        .iter()
        .map(|c| Criterion {
            id: new_id(),
            name: c.name.clone(),
            points: c.points,
            levels: c.levels.clone(),
        })
        .collect();
    Rubric {
        id: new_id(),
        title: rubric.title.clone(),
        total_points: rubric.total_points,
        criteria,
    }
}
