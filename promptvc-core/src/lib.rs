//! # promptvc Core
//!
//! This crate provides the core functionality for promptvc, a versioned prompt store.
//!
//! Prompts are grouped by the problem they solve and the model they target. Every save creates
//! a new numbered version, versions can be scored and commented, and one of them can be promoted
//! to production. Stored prompts are Jinja-style templates rendered by a sandboxed renderer.
//!
//! # Modules
//!
//! - [`prompt`] - Prompt version records and save options
//! - [`registry`] - The storage interface for prompt versions
//! - [`sqlite_storage`] - SQLite-backed implementation of the registry
//! - [`template`] - Template compilation and rendering
//! - [`filters`] - The `require` filter and custom filter support
//! - [`snapshot`] - Markdown export and import of prompt versions
//!
//! # Examples
//!
//! ```rust
//! use promptvc_core::prompt::SaveOptions;
//! use promptvc_core::registry::PromptRegistry;
//! use promptvc_core::sqlite_storage::{SqliteStorage, StorageConfig};
//! use promptvc_core::template::Renderer;
//! use serde_json::json;
//! use tempfile::TempDir;
//!
//! let temp_dir = TempDir::new().unwrap();
//! let storage = SqliteStorage::new(StorageConfig::new(temp_dir.path().join("prompts.db")));
//! storage.initialize().expect("Failed to initialize storage");
//!
//! let version = storage
//!     .save("qa", "gpt-4", "Answer: {{ question | require(\"question\") }}", SaveOptions::default())
//!     .unwrap();
//! storage.set_production("qa", "gpt-4", version).unwrap();
//!
//! let text = storage.get_production("qa", "gpt-4").unwrap().unwrap();
//! let template = Renderer::new().compile(&text).unwrap();
//! assert_eq!("Answer: why?", template.render(&json!({ "question": "why?" })).unwrap());
//! ```

pub mod filters;
pub mod prompt;
pub mod registry;
pub mod snapshot;
pub mod sqlite_storage;
pub mod template;
