use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{db_conn, db_err, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Rubric;
use crate::rubric::{self, RubricDraft};
use crate::store::GradebookStore;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

/// `{ criterionId: level }`. Levels outside 1..=4 are left to the engine to reject.
pub fn parse_selections(req: &Request) -> Result<HashMap<String, u8>, serde_json::Value> {
    let Some(obj) = req.params.get("selections").and_then(|v| v.as_object()) else {
        return Err(err(&req.id, "bad_params", "missing selections object", None));
    };
    let mut out = HashMap::with_capacity(obj.len());
    for (criterion_id, v) in obj {
        let Some(level) = v.as_u64().and_then(|n| u8::try_from(n).ok()) else {
            return Err(err(
                &req.id,
                "bad_params",
                "selection levels must be integers 1-4",
                Some(json!({ "criterionId": criterion_id })),
            ));
        };
        out.insert(criterion_id.clone(), level);
    }
    Ok(out)
}

pub fn parse_comments(req: &Request) -> Result<HashMap<String, String>, serde_json::Value> {
    let Some(raw) = req.params.get("comments") else {
        return Ok(HashMap::new());
    };
    if raw.is_null() {
        return Ok(HashMap::new());
    }
    let Some(obj) = raw.as_object() else {
        return Err(err(&req.id, "bad_params", "comments must be an object", None));
    };
    let mut out = HashMap::with_capacity(obj.len());
    for (criterion_id, v) in obj {
        let Some(text) = v.as_str() else {
            return Err(err(
                &req.id,
                "bad_params",
                "comments must map criterion ids to strings",
                Some(json!({ "criterionId": criterion_id })),
            ));
        };
        out.insert(criterion_id.clone(), text.to_string());
    }
    Ok(out)
}

/// A rubric total becomes `Submission.score`, which is read against the
/// assignment's `totalPoints`, so the two must agree.
pub fn check_rubric_scale(
    req: &Request,
    rubric: &Rubric,
    assignment_total: f64,
) -> Result<(), serde_json::Value> {
    if rubric.total_points as f64 == assignment_total {
        return Ok(());
    }
    Err(err(
        &req.id,
        "bad_params",
        "rubric totalPoints must match the assignment's totalPoints",
        Some(json!({
            "rubricId": rubric.id,
            "rubricTotalPoints": rubric.total_points,
            "assignmentTotalPoints": assignment_total,
        })),
    ))
}

fn handle_rubrics_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let draft: RubricDraft = match serde_json::from_value(req.params.clone()) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let assignment_id = match optional_str(req, "assignmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut assignment = match &assignment_id {
        None => None,
        Some(aid) => match conn.get_assignment(aid) {
            Ok(Some(a)) => Some(a),
            Ok(None) => return err(&req.id, "not_found", "assignment not found", None),
            Err(e) => return db_err(req, format!("{e:#}")),
        },
    };

    let built = match rubric::build_rubric(draft, || Uuid::new_v4().to_string()) {
        Ok(r) => r,
        Err(e) => return calc_err(&req.id, &e),
    };
    if let Some(a) = assignment.as_ref() {
        if let Err(e) = check_rubric_scale(req, &built, a.total_points) {
            return e;
        }
    }
    if let Err(e) = conn.save_rubric(&built) {
        return db_err(req, format!("{e:#}"));
    }
    if let Some(a) = assignment.as_mut() {
        a.rubric_id = Some(built.id.clone());
        if let Err(e) = conn.save_assignment(a) {
            return db_err(req, format!("{e:#}"));
        }
    }

    ok(
        &req.id,
        json!({
            "rubricId": built.id,
            "rubric": built,
            "allocatedPoints": rubric::allocated_points(&built),
            "pointsPerCriterion": rubric::points_per_criterion(&built),
        }),
    )
}

fn handle_rubrics_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let rubric_id = match required_str(req, "rubricId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match conn.get_rubric(&rubric_id) {
        Ok(Some(r)) => ok(&req.id, json!({ "rubric": r })),
        Ok(None) => err(&req.id, "not_found", "rubric not found", None),
        Err(e) => db_err(req, format!("{e:#}")),
    }
}

/// Scores selections against a stored rubric without saving anything.
fn handle_rubrics_score(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let rubric_id = match required_str(req, "rubricId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let selections = match parse_selections(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rubric = match conn.get_rubric(&rubric_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "rubric not found", None),
        Err(e) => return db_err(req, format!("{e:#}")),
    };
    let total = match rubric::score(&rubric, &selections) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, &e),
    };
    let breakdown = match rubric::criterion_scores(&rubric, &selections, &HashMap::new()) {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, &e),
    };

    ok(
        &req.id,
        json!({
            "rubricId": rubric.id,
            "total": total,
            "totalPoints": rubric.total_points,
            "pointsPerCriterion": rubric::points_per_criterion(&rubric),
            "criteria": breakdown,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rubrics.create" => Some(handle_rubrics_create(state, req)),
        "rubrics.get" => Some(handle_rubrics_get(state, req)),
        "rubrics.score" => Some(handle_rubrics_score(state, req)),
        _ => None,
    }
}
