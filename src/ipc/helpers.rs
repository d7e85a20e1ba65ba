use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    let v = req
        .params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
    if v.is_empty() {
        return Err(err(&req.id, "bad_params", format!("{} must not be empty", key), None));
    }
    Ok(v)
}

pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) => Ok(Some(s.to_string())),
            None => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be a string or null", key),
                None,
            )),
        },
    }
}

pub fn required_f64(req: &Request, key: &str) -> Result<f64, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing numeric {}", key), None))
}

pub fn optional_f64(req: &Request, key: &str) -> Result<Option<f64>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a number", key),
                None,
            )
        }),
    }
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be an integer", key),
                None,
            )
        }),
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (end of day, UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let t = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|naive| naive.and_utc())
}

pub fn optional_timestamp(req: &Request, key: &str) -> Result<Option<DateTime<Utc>>, serde_json::Value> {
    let Some(raw) = optional_str(req, key)? else {
        return Ok(None);
    };
    parse_timestamp(&raw).map(Some).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("{} must be an RFC 3339 timestamp or YYYY-MM-DD", key),
            None,
        )
    })
}

/// Resolves `params.override` against the workspace policy.
pub fn override_flag(state: &AppState, req: &Request) -> Result<bool, serde_json::Value> {
    let requested = req
        .params
        .get("override")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if requested && !state.config.allow_override {
        return Err(err(
            &req.id,
            "override_disabled",
            "status overrides are disabled for this workspace",
            None,
        ));
    }
    Ok(requested)
}

/// `params.now` lets callers pin the clock; defaults to the current time.
pub fn request_now(req: &Request) -> Result<DateTime<Utc>, serde_json::Value> {
    Ok(optional_timestamp(req, "now")?.unwrap_or_else(Utc::now))
}

pub fn db_err(req: &Request, e: impl std::fmt::Display) -> serde_json::Value {
    err(&req.id, "db_query_failed", e.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_accept_dates_and_rfc3339() {
        let d = parse_timestamp("2026-02-01").expect("date");
        assert_eq!(d, Utc.with_ymd_and_hms(2026, 2, 1, 23, 59, 59).single().expect("t"));
        let t = parse_timestamp("2026-02-01T08:30:00-05:00").expect("rfc3339");
        assert_eq!(t, Utc.with_ymd_and_hms(2026, 2, 1, 13, 30, 0).single().expect("t"));
        assert_eq!(parse_timestamp("next tuesday"), None);
    }
}
