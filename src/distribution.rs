use crate::bucket::{letter_grade, LetterGrade};
use crate::calc::CalcError;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const HEALTHY_MIN_PASSING_PERCENT: f64 = 80.0;
pub const HEALTHY_MAX_STD_DEV: f64 = 15.0;

// Percentages are compared for the mode at 1e-4 resolution.
const MODE_KEY_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub grade: LetterGrade,
    pub count: usize,
}

/// Cohort statistics. All values are percentages of the context's total points.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub mode: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub buckets: Vec<BucketCount>,
}

impl DistributionSummary {
    pub fn bucket_count(&self, grade: LetterGrade) -> usize {
        self.buckets
            .iter()
            .find(|b| b.grade == grade)
            .map(|b| b.count)
            .unwrap_or(0)
    }

    pub fn passing_count(&self) -> usize {
        self.count - self.bucket_count(LetterGrade::F)
    }

    pub fn passing_percentage(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        100.0 * self.passing_count() as f64 / self.count as f64
    }

    pub fn is_healthy(&self) -> bool {
        self.passing_percentage() >= HEALTHY_MIN_PASSING_PERCENT && self.std_dev < HEALTHY_MAX_STD_DEV
    }
}

pub fn compute_median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Most frequent value; `None` when nothing repeats. Ties go to the lowest value.
pub fn compute_mode(values: &[f64]) -> Option<f64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for v in values {
        *counts.entry((v * MODE_KEY_SCALE).round() as i64).or_insert(0) += 1;
    }
    let mut best: Option<(i64, usize)> = None;
    for (key, count) in counts {
        if best.map(|(_, c)| count > c).unwrap_or(true) {
            best = Some((key, count));
        }
    }
    match best {
        Some((key, count)) if count > 1 => Some(key as f64 / MODE_KEY_SCALE),
        _ => None,
    }
}

/// Population standard deviation around `mean`.
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Returns `None` for an empty score set.
pub fn analyze(scores: &[f64], total_points: f64) -> Result<Option<DistributionSummary>, CalcError> {
    if !total_points.is_finite() || total_points <= 0.0 {
        return Err(CalcError::invalid("totalPoints must be > 0"));
    }
    let mut percentages = Vec::with_capacity(scores.len());
    for (i, s) in scores.iter().enumerate() {
        if !s.is_finite() || *s < 0.0 {
            return Err(CalcError::invalid(format!(
                "scores[{i}] must be a non-negative number"
            )));
        }
        percentages.push(100.0 * s / total_points);
    }
    if percentages.is_empty() {
        return Ok(None);
    }

    let mut counts = [0_usize; 13];
    for p in &percentages {
        counts[letter_grade(*p)?.index()] += 1;
    }

    percentages.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let count = percentages.len();
    let mean = percentages.iter().sum::<f64>() / count as f64;

    Ok(Some(DistributionSummary {
        count,
        mean,
        median: compute_median(&percentages).unwrap_or(0.0),
        std_dev: population_std_dev(&percentages, mean),
        mode: compute_mode(&percentages),
        min: percentages[0],
        max: percentages[count - 1],
        buckets: LetterGrade::ALL
            .iter()
            .map(|g| BucketCount {
                grade: *g,
                count: counts[g.index()],
            })
            .collect(),
    }))
}
