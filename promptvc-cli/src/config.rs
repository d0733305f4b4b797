use confy::ConfyError;
use promptvc_core::sqlite_storage::{DEFAULT_DB_PATH, SqliteStorage, StorageConfig};
use serde::{Deserialize, Serialize};
use std::env::home_dir;
use std::path::PathBuf;

pub const PROMPTVC_CLI: &str = "promptvc";

#[derive(Serialize, Deserialize)]
pub struct PromptvcCliConfig {
    pub db_path: String,
}

impl Default for PromptvcCliConfig {
    fn default() -> Self {
        let db_path = home_dir()
            .map(|p| p.join("promptvc").join("prompts.db"))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        Self {
            db_path: db_path.display().to_string(),
        }
    }
}

/// Builds the store from `--db-path` when given, otherwise from the persisted config.
pub fn get_storage(db_path: Option<PathBuf>) -> SqliteStorage {
    let db_path = match db_path {
        Some(path) => path,
        None => PathBuf::from(load_config().db_path),
    };
    SqliteStorage::new(StorageConfig::new(db_path))
}

fn load_config() -> PromptvcCliConfig {
    let config: Result<PromptvcCliConfig, ConfyError> = confy::load(PROMPTVC_CLI, None);
    match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Problem loading config ({}). Exiting...", e);
            std::process::exit(exitcode::CONFIG);
        }
    }
}
