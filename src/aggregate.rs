use crate::calc::CalcError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedScore {
    pub score: f64,
    pub weight: f64,
}

impl WeightedScore {
    pub fn new(score: f64, weight: f64) -> Self {
        Self { score, weight }
    }
}

/// `sum(score * weight) / sum(weight)`, or `None` for an empty set or zero total weight.
pub fn weighted_average(entries: &[WeightedScore]) -> Result<Option<f64>, CalcError> {
    let mut sum = 0.0_f64;
    let mut denom = 0.0_f64;
    for (i, e) in entries.iter().enumerate() {
        if !e.score.is_finite() || e.score < 0.0 {
            return Err(CalcError::invalid(format!(
                "entries[{i}].score must be a non-negative number"
            )));
        }
        if !e.weight.is_finite() || e.weight < 0.0 {
            return Err(CalcError::invalid(format!(
                "entries[{i}].weight must be a non-negative number"
            )));
        }
        sum += e.score * e.weight;
        denom += e.weight;
    }
    if denom > 0.0 {
        Ok(Some(sum / denom))
    } else {
        Ok(None)
    }
}

/// Inner rollup: every graded submission counts once.
pub fn assignment_average<I>(percentages: I) -> Result<Option<f64>, CalcError>
where
    I: IntoIterator<Item = f64>,
{
    let entries: Vec<WeightedScore> = percentages
        .into_iter()
        .map(|p| WeightedScore::new(p, 1.0))
        .collect();
    weighted_average(&entries)
}

/// Outer rollup over `(assignment average, assignment weight)`. Assignments
/// without an average are left out rather than counted as zero.
pub fn class_average<I>(assignment_averages: I) -> Result<Option<f64>, CalcError>
where
    I: IntoIterator<Item = (Option<f64>, f64)>,
{
    let entries: Vec<WeightedScore> = assignment_averages
        .into_iter()
        .filter_map(|(avg, weight)| avg.map(|a| WeightedScore::new(a, weight)))
        .collect();
    weighted_average(&entries)
}
