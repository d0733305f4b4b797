//! # Prompt Versions
//!
//! Core data structures for versioned prompts.
//!
//! A [`PromptVersion`] is one stored revision of a prompt template for a given
//! `(problem, model_name)` pair. New revisions are described with [`SaveOptions`].

use serde::{Deserialize, Serialize};

/// A single stored revision of a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptVersion {
    /// Use case the prompt belongs to, e.g. `rag`.
    pub problem: String,
    /// Target model the prompt was written for.
    pub model_name: String,
    /// Sequential version number, starting at 1 for each `(problem, model_name)`.
    pub version: u32,
    /// Raw template text.
    pub prompt: String,
    /// Evaluation score, absent until set.
    pub score: Option<f64>,
    /// Free-text annotation, absent until set.
    pub comment: Option<String>,
    /// Whether this is the production version of its pair.
    pub production: bool,
}

/// Optional attributes of a newly saved prompt version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOptions {
    /// Initial evaluation score. Defaults to none.
    pub score: Option<f64>,
    /// Initial comment. Defaults to none.
    pub comment: Option<String>,
    /// Initial production flag. Defaults to `false`.
    ///
    /// Setting this does not clear the flag on sibling versions. Use
    /// [`PromptRegistry::set_production`](crate::registry::PromptRegistry::set_production)
    /// to promote a version exclusively.
    pub production: bool,
}

impl SaveOptions {
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }
}
