use crate::calc::CalcError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LetterGrade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D-")]
    DMinus,
    #[serde(rename = "F")]
    F,
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive lower bounds, highest first. Anything below the last bound is F.
pub const LETTER_THRESHOLDS: [(f64, LetterGrade); 12] = [
    (97.0, LetterGrade::APlus),
    (93.0, LetterGrade::A),
    (90.0, LetterGrade::AMinus),
    (87.0, LetterGrade::BPlus),
    (83.0, LetterGrade::B),
    (80.0, LetterGrade::BMinus),
    (77.0, LetterGrade::CPlus),
    (73.0, LetterGrade::C),
    (70.0, LetterGrade::CMinus),
    (67.0, LetterGrade::DPlus),
    (63.0, LetterGrade::D),
    (60.0, LetterGrade::DMinus),
];

impl LetterGrade {
    /// Bucket order used by distributions, A+ first, F last.
    pub const ALL: [LetterGrade; 13] = [
        LetterGrade::APlus,
        LetterGrade::A,
        LetterGrade::AMinus,
        LetterGrade::BPlus,
        LetterGrade::B,
        LetterGrade::BMinus,
        LetterGrade::CPlus,
        LetterGrade::C,
        LetterGrade::CMinus,
        LetterGrade::DPlus,
        LetterGrade::D,
        LetterGrade::DMinus,
        LetterGrade::F,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::AMinus => "A-",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::BMinus => "B-",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::CMinus => "C-",
            LetterGrade::DPlus => "D+",
            LetterGrade::D => "D",
            LetterGrade::DMinus => "D-",
            LetterGrade::F => "F",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Collapses the fine grade onto the coarse A/B/C/D/F scale.
    pub fn base(self) -> LetterGrade {
        match self {
            LetterGrade::APlus | LetterGrade::A | LetterGrade::AMinus => LetterGrade::A,
            LetterGrade::BPlus | LetterGrade::B | LetterGrade::BMinus => LetterGrade::B,
            LetterGrade::CPlus | LetterGrade::C | LetterGrade::CMinus => LetterGrade::C,
            LetterGrade::DPlus | LetterGrade::D | LetterGrade::DMinus => LetterGrade::D,
            LetterGrade::F => LetterGrade::F,
        }
    }

    pub fn is_passing(self) -> bool {
        self != LetterGrade::F
    }

    /// 4.0 scale.
    pub fn gpa_points(self) -> f64 {
        match self {
            LetterGrade::APlus | LetterGrade::A => 4.0,
            LetterGrade::AMinus => 3.7,
            LetterGrade::BPlus => 3.3,
            LetterGrade::B => 3.0,
            LetterGrade::BMinus => 2.7,
            LetterGrade::CPlus => 2.3,
            LetterGrade::C => 2.0,
            LetterGrade::CMinus => 1.7,
            LetterGrade::DPlus => 1.3,
            LetterGrade::D => 1.0,
            LetterGrade::DMinus => 0.7,
            LetterGrade::F => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LetterScale {
    #[default]
    Fine,
    Coarse,
}

/// Lower bounds (percent) for levels 2, 3 and 4. Below the first bound is level 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AchievementThresholds {
    pub level2: f64,
    pub level3: f64,
    pub level4: f64,
}

pub const STANDARD_ACHIEVEMENT: AchievementThresholds = AchievementThresholds {
    level2: 60.0,
    level3: 75.0,
    level4: 90.0,
};

pub const ALTERNATE_ACHIEVEMENT: AchievementThresholds = AchievementThresholds {
    level2: 60.0,
    level3: 70.0,
    level4: 85.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AchievementTable {
    #[default]
    Standard,
    Alternate,
}

impl AchievementTable {
    pub fn thresholds(self) -> AchievementThresholds {
        match self {
            AchievementTable::Standard => STANDARD_ACHIEVEMENT,
            AchievementTable::Alternate => ALTERNATE_ACHIEVEMENT,
        }
    }
}

fn check_percentage(percentage: f64) -> Result<(), CalcError> {
    if !percentage.is_finite() {
        return Err(CalcError::invalid("percentage must be a finite number"));
    }
    if percentage < 0.0 {
        return Err(CalcError::invalid(format!(
            "percentage must not be negative (got {percentage})"
        )));
    }
    Ok(())
}

/// Values above 100 (bonus marks) land in A+. Negative or non-finite input is rejected.
pub fn letter_grade(percentage: f64) -> Result<LetterGrade, CalcError> {
    check_percentage(percentage)?;
    Ok(LETTER_THRESHOLDS
        .iter()
        .find(|(lower, _)| percentage >= *lower)
        .map(|(_, g)| *g)
        .unwrap_or(LetterGrade::F))
}

pub fn letter_grade_on_scale(percentage: f64, scale: LetterScale) -> Result<LetterGrade, CalcError> {
    let fine = letter_grade(percentage)?;
    Ok(match scale {
        LetterScale::Fine => fine,
        LetterScale::Coarse => fine.base(),
    })
}

pub fn achievement_level_for_percentage(
    percentage: f64,
    table: AchievementTable,
) -> Result<u8, CalcError> {
    check_percentage(percentage)?;
    let t = table.thresholds();
    Ok(if percentage >= t.level4 {
        4
    } else if percentage >= t.level3 {
        3
    } else if percentage >= t.level2 {
        2
    } else {
        1
    })
}

pub fn achievement_level(score: f64, total_points: f64, table: AchievementTable) -> Result<u8, CalcError> {
    if !total_points.is_finite() || total_points <= 0.0 {
        return Err(CalcError::invalid("totalPoints must be > 0"));
    }
    if !score.is_finite() || score < 0.0 {
        return Err(CalcError::invalid("score must be a non-negative number"));
    }
    achievement_level_for_percentage(100.0 * score / total_points, table)
}
