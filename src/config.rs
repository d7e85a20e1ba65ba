use crate::bucket::{AchievementTable, LetterScale};
use serde::{Deserialize, Serialize};

pub const SETTINGS_KEY: &str = "grading.config";

/// Workspace-wide grading choices. Threshold tables are picked once per
/// workspace, never per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingConfig {
    pub letter_scale: LetterScale,
    pub achievement_table: AchievementTable,
    pub allow_override: bool,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            letter_scale: LetterScale::Fine,
            achievement_table: AchievementTable::Standard,
            allow_override: true,
        }
    }
}

impl GradingConfig {
    /// Applies a partial JSON patch; unknown keys are rejected.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<GradingConfig, String> {
        let Some(obj) = patch.as_object() else {
            return Err("settings patch must be an object".to_string());
        };
        let mut current = serde_json::to_value(self).map_err(|e| e.to_string())?;
        for (k, v) in obj {
            if current.get(k).is_none() {
                return Err(format!("unknown setting: {k}"));
            }
            current[k] = v.clone();
        }
        serde_json::from_value(current).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg: GradingConfig = serde_json::from_value(json!({ "letterScale": "coarse" })).expect("parse");
        assert_eq!(cfg.letter_scale, LetterScale::Coarse);
        assert_eq!(cfg.achievement_table, AchievementTable::Standard);
        assert!(cfg.allow_override);
    }

    #[test]
    fn merge_rejects_unknown_and_bad_values() {
        let cfg = GradingConfig::default();
        let merged = cfg
            .merged(&json!({ "achievementTable": "alternate", "allowOverride": false }))
            .expect("merge");
        assert_eq!(merged.achievement_table, AchievementTable::Alternate);
        assert!(!merged.allow_override);

        assert!(cfg.merged(&json!({ "roundTo": 2 })).is_err());
        assert!(cfg.merged(&json!({ "letterScale": "percent" })).is_err());
        assert!(cfg.merged(&json!(["fine"])).is_err());
    }
}
