use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::settings::load_config;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn target_workspace(state: &AppState, req: &Request) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace_path = match target_workspace(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };

    // No-op unless the database runs in WAL mode.
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
            tracing::warn!(error = %e, "wal checkpoint before export failed");
        }
    }

    let out = PathBuf::from(&out_path);
    let export = match backup::export_workspace_bundle(&workspace_path, &out) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(path = %out_path, error = %format!("{e:#}"), "bundle export failed");
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            );
        }
    };

    ok(
        &req.id,
        json!({
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "dbSha256": export.db_sha256,
        }),
    )
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match required_str(req, "inPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace_path = match target_workspace(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }
    if let Err(e) = std::fs::create_dir_all(&workspace_path) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": workspace_path.to_string_lossy() })),
        );
    }

    // Drop open handle before replacing file.
    state.db = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(path = %in_path, error = %format!("{e:#}"), "bundle import failed");
            // Import writes through a temp file, so the previous database is intact.
            if let Some(ws) = state.workspace.clone() {
                match db::open_db(&ws) {
                    Ok(conn) => state.db = Some(conn),
                    Err(reopen) => {
                        tracing::error!(error = %reopen, "failed to reopen workspace after import error")
                    }
                }
            }
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": src.to_string_lossy() })),
            );
        }
    };

    match db::open_db(&workspace_path) {
        Ok(conn) => {
            state.config = load_config(&conn);
            state.workspace = Some(workspace_path.clone());
            state.db = Some(conn);
            tracing::info!(
                workspace = %workspace_path.to_string_lossy(),
                sha256 = %import.db_sha256,
                "workspace bundle imported"
            );
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace_path.to_string_lossy(),
                    "bundleFormatDetected": import.bundle_format_detected,
                    "dbSha256": import.db_sha256,
                    "config": state.config,
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
