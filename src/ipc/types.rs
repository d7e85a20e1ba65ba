use std::path::PathBuf;

use crate::config::GradingConfig;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: GradingConfig,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            config: GradingConfig::default(),
        }
    }
}
