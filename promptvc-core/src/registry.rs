//! # Prompt Registry
//!
//! This module defines the storage interface for versioned prompts.
//!
//! Versions are grouped by `(problem, model_name)`. Within a pair:
//! - version numbers are assigned sequentially, one past the highest stored version;
//! - at most one version is marked as production when promotions go through
//!   [`PromptRegistry::set_production`].

use crate::prompt::{PromptVersion, SaveOptions};

pub trait PromptRegistry {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates the backing structure for prompt versions. Safe to call repeatedly.
    fn initialize(&self) -> Result<(), Self::Error>;

    /// Stores a new version and returns its assigned version number.
    fn save(
        &self,
        problem: &str,
        model_name: &str,
        prompt: &str,
        options: SaveOptions,
    ) -> Result<u32, Self::Error>;

    /// Marks `version` as the only production version of its pair.
    fn set_production(&self, problem: &str, model_name: &str, version: u32) -> Result<(), Self::Error>;

    /// Returns the prompt text of the production version, if one is marked.
    fn get_production(&self, problem: &str, model_name: &str) -> Result<Option<String>, Self::Error>;

    /// Returns every version of the pair, most recent first.
    fn get_all(&self, problem: &str, model_name: &str) -> Result<Vec<PromptVersion>, Self::Error>;

    /// Overwrites score and comment of a version. Returns `false` if the version doesn't exist.
    fn update_score(
        &self,
        problem: &str,
        model_name: &str,
        version: u32,
        score: f64,
        comment: Option<&str>,
    ) -> Result<bool, Self::Error>;

    /// Returns the prompt text of a specific version.
    fn get_prompt(&self, problem: &str, model_name: &str, version: u32) -> Result<Option<String>, Self::Error>;

    /// Removes a single version. Removing a missing version is a no-op.
    fn delete(&self, problem: &str, model_name: &str, version: u32) -> Result<(), Self::Error>;

    /// Removes every version of the pair. Removing a missing pair is a no-op.
    fn delete_all(&self, problem: &str, model_name: &str) -> Result<(), Self::Error>;

    /// Destroys all stored state.
    fn reset(&self) -> Result<(), Self::Error>;
}
