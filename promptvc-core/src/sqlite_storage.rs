//! # SQLite Storage
//!
//! This module provides a [`PromptRegistry`] implementation backed by a single SQLite database file.
//!
//! All versions live in one `prompt_versions` table. Every operation opens its own connection
//! and drops it before returning, so no handle outlives a call. Operations that run more than
//! one statement do so inside a transaction.
//!
//! The location of the database is injected through [`StorageConfig`].
//!
//! # Examples
//!
//! ```rust
//! use promptvc_core::prompt::SaveOptions;
//! use promptvc_core::registry::PromptRegistry;
//! use promptvc_core::sqlite_storage::{SqliteStorage, StorageConfig};
//! use tempfile::TempDir;
//!
//! let temp_dir = TempDir::new().unwrap();
//! let storage = SqliteStorage::new(StorageConfig::new(temp_dir.path().join("prompts.db")));
//! storage.initialize().expect("Failed to initialize storage");
//!
//! let version = storage
//!     .save("rag", "gpt-4", "Q: {{ question }}", SaveOptions::default())
//!     .expect("Failed to save prompt");
//! assert_eq!(1, version);
//! ```

use crate::prompt::{PromptVersion, SaveOptions};
use crate::registry::PromptRegistry;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Database location used when none is configured.
pub const DEFAULT_DB_PATH: &str = "data/prompts.db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS prompt_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    problem TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    prompt TEXT NOT NULL,
    model_name TEXT NOT NULL,
    score REAL,
    comment TEXT,
    production BOOLEAN DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_prompt_versions_pair
    ON prompt_versions (problem, model_name, version);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{0} must not be empty")]
    EmptyIdentifier(&'static str),

    #[error("Prompt version not found: {problem}/{model_name} v{version}")]
    VersionNotFound {
        problem: String,
        model_name: String,
        version: u32,
    },
}

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl StorageConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DB_PATH)
    }
}

/// A SQLite-backed store of prompt versions.
pub struct SqliteStorage {
    config: StorageConfig,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.config.db_path)?)
    }
}

fn validate_identifiers(problem: &str, model_name: &str) -> Result<(), StoreError> {
    if problem.is_empty() {
        return Err(StoreError::EmptyIdentifier("problem"));
    }
    if model_name.is_empty() {
        return Err(StoreError::EmptyIdentifier("model_name"));
    }
    Ok(())
}

impl PromptRegistry for SqliteStorage {
    type Error = StoreError;

    /// Creates the `prompt_versions` table.
    ///
    /// The parent directory of the database file is created first if it doesn't exist.
    /// Calling this on an initialized database changes nothing.
    fn initialize(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        debug!(db_path = %self.config.db_path.display(), "Initialized prompt store");
        Ok(())
    }

    /// Saves a new version of a prompt.
    ///
    /// The version number is one past the highest version stored for `(problem, model_name)`,
    /// or 1 if there is none. Reading the current maximum and inserting happen in one transaction.
    ///
    /// # Returns
    ///
    /// * `Ok(u32)` - The assigned version number.
    /// * `StoreError::EmptyIdentifier` - If `problem` or `model_name` is empty.
    fn save(
        &self,
        problem: &str,
        model_name: &str,
        prompt: &str,
        options: SaveOptions,
    ) -> Result<u32, StoreError> {
        validate_identifiers(problem, model_name)?;

        if options.production {
            warn!(
                problem,
                model_name, "Saving with the production flag set does not demote other versions"
            );
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let latest: Option<u32> = tx.query_row(
            "SELECT MAX(version) FROM prompt_versions WHERE problem = ?1 AND model_name = ?2",
            params![problem, model_name],
            |row| row.get(0),
        )?;
        let version = latest.unwrap_or(0) + 1;

        tx.execute(
            "INSERT INTO prompt_versions (problem, model_name, version, prompt, score, comment, production)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                problem,
                model_name,
                version,
                prompt,
                options.score,
                options.comment,
                options.production
            ],
        )?;
        tx.commit()?;

        info!(problem, model_name, version, "Saved prompt version");
        Ok(version)
    }

    /// Promotes a version to production.
    ///
    /// Existence is checked before any flag is touched, so promoting a missing version
    /// leaves the current production version in place.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If `version` is now the only production version of its pair.
    /// * `StoreError::VersionNotFound` - If `version` doesn't exist.
    fn set_production(&self, problem: &str, model_name: &str, version: u32) -> Result<(), StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let matches: i64 = tx.query_row(
            "SELECT COUNT(*) FROM prompt_versions WHERE problem = ?1 AND model_name = ?2 AND version = ?3",
            params![problem, model_name, version],
            |row| row.get(0),
        )?;
        if matches == 0 {
            return Err(StoreError::VersionNotFound {
                problem: problem.to_string(),
                model_name: model_name.to_string(),
                version,
            });
        }

        tx.execute(
            "UPDATE prompt_versions SET production = FALSE WHERE problem = ?1 AND model_name = ?2",
            params![problem, model_name],
        )?;
        tx.execute(
            "UPDATE prompt_versions SET production = TRUE
             WHERE problem = ?1 AND model_name = ?2 AND version = ?3",
            params![problem, model_name, version],
        )?;
        tx.commit()?;

        info!(problem, model_name, version, "Promoted prompt version to production");
        Ok(())
    }

    fn get_production(&self, problem: &str, model_name: &str) -> Result<Option<String>, StoreError> {
        let conn = self.connect()?;
        let prompt = conn
            .query_row(
                "SELECT prompt FROM prompt_versions
                 WHERE problem = ?1 AND model_name = ?2 AND production = TRUE
                 ORDER BY version DESC LIMIT 1",
                params![problem, model_name],
                |row| row.get(0),
            )
            .optional()?;

        debug!(problem, model_name, found = prompt.is_some(), "Looked up production prompt");
        Ok(prompt)
    }

    fn get_all(&self, problem: &str, model_name: &str) -> Result<Vec<PromptVersion>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT problem, model_name, version, prompt, score, comment, production
             FROM prompt_versions
             WHERE problem = ?1 AND model_name = ?2
             ORDER BY version DESC",
        )?;

        let versions = stmt
            .query_map(params![problem, model_name], |row| {
                Ok(PromptVersion {
                    problem: row.get(0)?,
                    model_name: row.get(1)?,
                    version: row.get(2)?,
                    prompt: row.get(3)?,
                    score: row.get(4)?,
                    comment: row.get(5)?,
                    production: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(versions)
    }

    fn update_score(
        &self,
        problem: &str,
        model_name: &str,
        version: u32,
        score: f64,
        comment: Option<&str>,
    ) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE prompt_versions SET score = ?1, comment = ?2
             WHERE problem = ?3 AND model_name = ?4 AND version = ?5",
            params![score, comment, problem, model_name, version],
        )?;

        if updated > 0 {
            info!(problem, model_name, version, score, "Updated prompt score");
        }
        Ok(updated > 0)
    }

    fn get_prompt(&self, problem: &str, model_name: &str, version: u32) -> Result<Option<String>, StoreError> {
        let conn = self.connect()?;
        let prompt = conn
            .query_row(
                "SELECT prompt FROM prompt_versions WHERE problem = ?1 AND model_name = ?2 AND version = ?3",
                params![problem, model_name, version],
                |row| row.get(0),
            )
            .optional()?;
        Ok(prompt)
    }

    fn delete(&self, problem: &str, model_name: &str, version: u32) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM prompt_versions WHERE problem = ?1 AND model_name = ?2 AND version = ?3",
            params![problem, model_name, version],
        )?;

        if removed == 0 {
            debug!(problem, model_name, version, "No prompt version to delete");
        } else {
            info!(problem, model_name, version, "Deleted prompt version");
        }
        Ok(())
    }

    fn delete_all(&self, problem: &str, model_name: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM prompt_versions WHERE problem = ?1 AND model_name = ?2",
            params![problem, model_name],
        )?;

        info!(problem, model_name, removed, "Deleted all prompt versions");
        Ok(())
    }

    /// Removes the database file. The store has to be initialized again before further use.
    fn reset(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.config.db_path) {
            Ok(()) => {
                info!(db_path = %self.config.db_path.display(), "Removed prompt store");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_storage(temp_dir: &TempDir) -> SqliteStorage {
        let storage = SqliteStorage::new(StorageConfig::new(temp_dir.path().join("prompts.db")));
        storage.initialize().expect("Failed to initialize storage");
        storage
    }

    #[test]
    fn test_default_config_path() {
        assert_eq!(PathBuf::from("data/prompts.db"), StorageConfig::default().db_path);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "v1", SaveOptions::default()).unwrap();

        storage.initialize().expect("Second initialize should succeed");

        assert_eq!(1, storage.get_all("rag", "gpt-4").unwrap().len());
    }

    #[test]
    fn test_initialize_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_dir = temp_dir.path().join("nested").join("data");
        let storage = SqliteStorage::new(StorageConfig::new(db_dir.join("prompts.db")));

        assert!(!db_dir.exists());
        storage.initialize().unwrap();

        assert!(db_dir.is_dir());
        assert!(storage.db_path().exists());
    }

    #[test]
    fn test_save_assigns_sequential_versions() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);

        for expected in 1..=5 {
            let version = storage
                .save("rag", "gpt-4", &format!("prompt {}", expected), SaveOptions::default())
                .unwrap();
            assert_eq!(expected, version);
        }
    }

    #[test]
    fn test_save_versions_are_per_pair() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);

        assert_eq!(1, storage.save("rag", "gpt-4", "a", SaveOptions::default()).unwrap());
        assert_eq!(1, storage.save("rag", "llama", "b", SaveOptions::default()).unwrap());
        assert_eq!(2, storage.save("rag", "gpt-4", "c", SaveOptions::default()).unwrap());
        assert_eq!(1, storage.save("summarize", "gpt-4", "d", SaveOptions::default()).unwrap());
        assert_eq!(2, storage.save("rag", "llama", "e", SaveOptions::default()).unwrap());
    }

    #[test]
    fn test_save_rejects_empty_identifiers() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);

        let result = storage.save("", "gpt-4", "prompt", SaveOptions::default());
        assert!(matches!(result, Err(StoreError::EmptyIdentifier("problem"))));

        let result = storage.save("rag", "", "prompt", SaveOptions::default());
        assert!(matches!(result, Err(StoreError::EmptyIdentifier("model_name"))));
    }

    #[test]
    fn test_save_accepts_empty_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);

        let version = storage.save("rag", "gpt-4", "", SaveOptions::default()).unwrap();
        assert_eq!(Some(String::new()), storage.get_prompt("rag", "gpt-4", version).unwrap());
    }

    #[test]
    fn test_save_with_options() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);

        let options = SaveOptions::default().with_score(0.9).with_comment("initial");
        storage.save("rag", "gpt-4", "prompt", options).unwrap();

        let versions = storage.get_all("rag", "gpt-4").unwrap();
        assert_eq!(Some(0.9), versions[0].score);
        assert_eq!(Some("initial".to_string()), versions[0].comment);
        assert!(!versions[0].production);
    }

    #[test]
    fn test_save_with_production_flag_does_not_demote_siblings() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);

        storage.save("rag", "gpt-4", "first", SaveOptions::default()).unwrap();
        storage.set_production("rag", "gpt-4", 1).unwrap();
        storage
            .save("rag", "gpt-4", "second", SaveOptions::default().with_production(true))
            .unwrap();

        let production_count = storage
            .get_all("rag", "gpt-4")
            .unwrap()
            .iter()
            .filter(|v| v.production)
            .count();
        assert_eq!(2, production_count);
        assert_eq!(Some("second".to_string()), storage.get_production("rag", "gpt-4").unwrap());
    }

    #[test]
    fn test_set_production_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        for i in 1..=3 {
            storage.save("rag", "gpt-4", &format!("v{}", i), SaveOptions::default()).unwrap();
        }

        storage.set_production("rag", "gpt-4", 1).unwrap();
        storage.set_production("rag", "gpt-4", 3).unwrap();
        storage.set_production("rag", "gpt-4", 2).unwrap();

        let versions = storage.get_all("rag", "gpt-4").unwrap();
        let production: Vec<u32> = versions.iter().filter(|v| v.production).map(|v| v.version).collect();
        assert_eq!(vec![2], production);
        assert_eq!(Some("v2".to_string()), storage.get_production("rag", "gpt-4").unwrap());
    }

    #[test]
    fn test_set_production_does_not_touch_other_pairs() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "rag prompt", SaveOptions::default()).unwrap();
        storage.save("rag", "llama", "llama prompt", SaveOptions::default()).unwrap();

        storage.set_production("rag", "llama", 1).unwrap();
        storage.set_production("rag", "gpt-4", 1).unwrap();

        assert_eq!(Some("llama prompt".to_string()), storage.get_production("rag", "llama").unwrap());
        assert_eq!(Some("rag prompt".to_string()), storage.get_production("rag", "gpt-4").unwrap());
    }

    #[test]
    fn test_set_production_missing_version_keeps_current() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "v1", SaveOptions::default()).unwrap();
        storage.set_production("rag", "gpt-4", 1).unwrap();

        let result = storage.set_production("rag", "gpt-4", 7);
        match result {
            Err(StoreError::VersionNotFound { version, .. }) => assert_eq!(7, version),
            other => panic!("Expected VersionNotFound, got {:?}", other),
        }

        assert_eq!(Some("v1".to_string()), storage.get_production("rag", "gpt-4").unwrap());
    }

    #[test]
    fn test_get_production_none_marked() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "v1", SaveOptions::default()).unwrap();

        assert_eq!(None, storage.get_production("rag", "gpt-4").unwrap());
        assert_eq!(None, storage.get_production("unknown", "gpt-4").unwrap());
    }

    #[test]
    fn test_get_all_orders_by_version_descending() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        for i in 1..=3 {
            storage.save("rag", "gpt-4", &format!("v{}", i), SaveOptions::default()).unwrap();
        }
        storage.save("rag", "llama", "other", SaveOptions::default()).unwrap();

        let versions = storage.get_all("rag", "gpt-4").unwrap();
        let numbers: Vec<u32> = versions.iter().map(|v| v.version).collect();
        assert_eq!(vec![3, 2, 1], numbers);
        assert!(versions.iter().all(|v| v.problem == "rag" && v.model_name == "gpt-4"));
        assert_eq!("v3", versions[0].prompt);
    }

    #[test]
    fn test_get_all_unknown_pair_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);

        assert!(storage.get_all("rag", "gpt-4").unwrap().is_empty());
    }

    #[test]
    fn test_update_score() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "v1", SaveOptions::default()).unwrap();

        assert!(storage.update_score("rag", "gpt-4", 1, 0.4, Some("low precision")).unwrap());
        let first = storage.get_all("rag", "gpt-4").unwrap();

        assert!(storage.update_score("rag", "gpt-4", 1, 0.4, Some("low precision")).unwrap());
        let second = storage.get_all("rag", "gpt-4").unwrap();

        assert_eq!(first, second);
        assert_eq!(Some(0.4), second[0].score);
        assert_eq!(Some("low precision".to_string()), second[0].comment);
    }

    #[test]
    fn test_update_score_clears_comment() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        let options = SaveOptions::default().with_comment("old");
        storage.save("rag", "gpt-4", "v1", options).unwrap();

        assert!(storage.update_score("rag", "gpt-4", 1, 0.8, None).unwrap());

        let versions = storage.get_all("rag", "gpt-4").unwrap();
        assert_eq!(Some(0.8), versions[0].score);
        assert_eq!(None, versions[0].comment);
    }

    #[test]
    fn test_update_score_missing_version() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "v1", SaveOptions::default()).unwrap();

        assert!(!storage.update_score("rag", "gpt-4", 2, 0.5, None).unwrap());
        assert!(!storage.update_score("rag", "llama", 1, 0.5, None).unwrap());
    }

    #[test]
    fn test_get_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "first", SaveOptions::default()).unwrap();
        storage.save("rag", "gpt-4", "second", SaveOptions::default()).unwrap();

        assert_eq!(Some("first".to_string()), storage.get_prompt("rag", "gpt-4", 1).unwrap());
        assert_eq!(Some("second".to_string()), storage.get_prompt("rag", "gpt-4", 2).unwrap());
        assert_eq!(None, storage.get_prompt("rag", "gpt-4", 3).unwrap());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "first", SaveOptions::default()).unwrap();
        storage.save("rag", "gpt-4", "second", SaveOptions::default()).unwrap();

        storage.delete("rag", "gpt-4", 1).unwrap();
        storage.delete("rag", "gpt-4", 1).unwrap();
        storage.delete("rag", "gpt-4", 42).unwrap();

        let versions = storage.get_all("rag", "gpt-4").unwrap();
        assert_eq!(1, versions.len());
        assert_eq!(2, versions[0].version);
    }

    #[test]
    fn test_delete_keeps_lower_version_numbers() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        for i in 1..=3 {
            storage.save("rag", "gpt-4", &format!("v{}", i), SaveOptions::default()).unwrap();
        }

        storage.delete("rag", "gpt-4", 2).unwrap();

        assert_eq!(4, storage.save("rag", "gpt-4", "v4", SaveOptions::default()).unwrap());
    }

    #[test]
    fn test_delete_all() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "first", SaveOptions::default()).unwrap();
        storage.save("rag", "gpt-4", "second", SaveOptions::default()).unwrap();
        storage.set_production("rag", "gpt-4", 2).unwrap();
        storage.save("rag", "llama", "other", SaveOptions::default()).unwrap();

        storage.delete_all("rag", "gpt-4").unwrap();
        storage.delete_all("rag", "gpt-4").unwrap();

        assert!(storage.get_all("rag", "gpt-4").unwrap().is_empty());
        assert_eq!(None, storage.get_production("rag", "gpt-4").unwrap());
        assert_eq!(1, storage.get_all("rag", "llama").unwrap().len());
    }

    #[test]
    fn test_reset_removes_database() {
        let temp_dir = TempDir::new().unwrap();
        let storage = new_storage(&temp_dir);
        storage.save("rag", "gpt-4", "first", SaveOptions::default()).unwrap();

        storage.reset().unwrap();
        assert!(!storage.db_path().exists());

        storage.reset().expect("Resetting a missing store should succeed");

        storage.initialize().unwrap();
        assert!(storage.get_all("rag", "gpt-4").unwrap().is_empty());
    }

    #[test]
    fn test_operations_before_initialize_fail() {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(StorageConfig::new(temp_dir.path().join("prompts.db")));

        let result = storage.save("rag", "gpt-4", "prompt", SaveOptions::default());
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }
}
