use crate::config::{GradingConfig, SETTINGS_KEY};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, db_err};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

/// Stored config, or defaults when absent or unreadable. A workspace must
/// still open if the settings row is damaged.
pub fn load_config(conn: &Connection) -> GradingConfig {
    match db::settings_get_json(conn, SETTINGS_KEY) {
        Ok(Some(v)) => match serde_json::from_value::<GradingConfig>(v) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "stored grading config is invalid; using defaults");
                GradingConfig::default()
            }
        },
        Ok(None) => GradingConfig::default(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read grading config; using defaults");
            GradingConfig::default()
        }
    }
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "config": state.config }))
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(patch) = req.params.get("patch") else {
        return err(&req.id, "bad_params", "missing patch", None);
    };
    let next = match state.config.merged(patch) {
        Ok(cfg) => cfg,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let value = match serde_json::to_value(next) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if let Err(e) = db::settings_set_json(conn, SETTINGS_KEY, &value) {
        return db_err(req, e);
    }
    if next != state.config {
        tracing::info!(config = %value, "grading config changed");
    }
    state.config = next;
    ok(&req.id, json!({ "config": state.config }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
