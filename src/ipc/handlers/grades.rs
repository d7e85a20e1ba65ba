use crate::aggregate::{weighted_average, WeightedScore};
use crate::bucket::{
    achievement_level, achievement_level_for_percentage, letter_grade, letter_grade_on_scale,
    LetterScale,
};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{optional_f64, required_f64};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_letter(state: &mut AppState, req: &Request) -> serde_json::Value {
    let percentage = match required_f64(req, "percentage") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scale = match req.params.get("scale") {
        None => state.config.letter_scale,
        Some(v) if v.is_null() => state.config.letter_scale,
        Some(v) => match serde_json::from_value::<LetterScale>(v.clone()) {
            Ok(s) => s,
            Err(_) => return err(&req.id, "bad_params", "scale must be 'fine' or 'coarse'", None),
        },
    };
    let fine = match letter_grade(percentage) {
        Ok(g) => g,
        Err(e) => return calc_err(&req.id, &e),
    };
    let letter = match letter_grade_on_scale(percentage, scale) {
        Ok(g) => g,
        Err(e) => return calc_err(&req.id, &e),
    };
    ok(
        &req.id,
        json!({
            "letter": letter,
            "scale": scale,
            "gpaPoints": fine.gpa_points(),
            "passing": fine.is_passing(),
        }),
    )
}

/// Either `{score, totalPoints}` or `{percentage}`.
fn handle_achievement_level(state: &mut AppState, req: &Request) -> serde_json::Value {
    let table = state.config.achievement_table;
    let percentage = match optional_f64(req, "percentage") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let level = match percentage {
        Some(p) => achievement_level_for_percentage(p, table),
        None => {
            let score = match required_f64(req, "score") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let total_points = match required_f64(req, "totalPoints") {
                Ok(v) => v,
                Err(e) => return e,
            };
            achievement_level(score, total_points, table)
        }
    };
    match level {
        Ok(l) => ok(&req.id, json!({ "level": l, "table": table })),
        Err(e) => calc_err(&req.id, &e),
    }
}

fn handle_weighted_average(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("entries") else {
        return err(&req.id, "bad_params", "missing entries", None);
    };
    let entries: Vec<WeightedScore> = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("entries must be [{{score, weight}}]: {e}"),
                None,
            )
        }
    };
    match weighted_average(&entries) {
        Ok(avg) => ok(&req.id, json!({ "average": avg, "count": entries.len() })),
        Err(e) => calc_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.letter" => Some(handle_letter(state, req)),
        "grades.achievementLevel" => Some(handle_achievement_level(state, req)),
        "grades.weightedAverage" => Some(handle_weighted_average(state, req)),
        _ => None,
    }
}
