//! # Snapshots
//!
//! Exports prompt versions to Markdown files with YAML front matter and imports them back.
//!
//! Each version becomes one `v{version}.md` file:
//!
//! ```text
//! ---
//! problem: rag
//! model_name: gpt-4
//! version: 2
//! score: 0.4
//! comment: low precision
//! production: true
//! exported_at: 2025-01-01T00:00:00Z
//! ---
//! Q: {{ question }}
//! ```
//!
//! The body after the closing `---` line is the prompt text, byte for byte. Fences may end with
//! `\n` or `\r\n`.
//!
//! Importing saves every file through a [`PromptRegistry`], so the target store assigns fresh
//! version numbers (in the original order) and production is set through
//! [`PromptRegistry::set_production`].

use crate::prompt::SaveOptions;
use crate::registry::PromptRegistry;
use chrono::{DateTime, Utc};
use nom::IResult;
use nom::Parser;
use nom::bytes::complete::tag;
use nom::character::complete::{line_ending, not_line_ending};
use nom::combinator::{not, recognize};
use nom::multi::many0;
use nom::sequence::{pair, preceded, terminated};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

const FENCE: &str = "---\n";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to walk snapshot directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid snapshot file {}: {message}", path.display())]
    InvalidFile { path: PathBuf, message: String },

    #[error("Registry error: {0}")]
    Registry(#[source] Box<dyn Error + Send + Sync>),
}

fn registry_error<E: Error + Send + Sync + 'static>(err: E) -> SnapshotError {
    SnapshotError::Registry(Box::new(err))
}

/// Front matter of an exported prompt version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub problem: String,
    pub model_name: String,
    pub version: u32,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub production: bool,
    pub exported_at: DateTime<Utc>,
}

/// Writes every version of `(problem, model_name)` into `dir`.
///
/// `dir` is created if it doesn't exist. Existing files with the same names are overwritten.
///
/// # Returns
///
/// * `Ok(usize)` - The number of files written.
pub fn export_snapshot<R: PromptRegistry>(
    registry: &R,
    problem: &str,
    model_name: &str,
    dir: &Path,
) -> Result<usize, SnapshotError> {
    let versions = registry.get_all(problem, model_name).map_err(registry_error)?;
    fs::create_dir_all(dir)?;

    let exported_at = Utc::now();
    for version in &versions {
        let metadata = SnapshotMetadata {
            problem: version.problem.clone(),
            model_name: version.model_name.clone(),
            version: version.version,
            score: version.score,
            comment: version.comment.clone(),
            production: version.production,
            exported_at,
        };
        let file_path = dir.join(format!("v{}.md", version.version));
        fs::write(&file_path, render_snapshot(&metadata, &version.prompt)?)?;
        debug!(path = %file_path.display(), "Exported prompt version");
    }

    info!(problem, model_name, count = versions.len(), dir = %dir.display(), "Exported snapshot");
    Ok(versions.len())
}

/// Imports every `.md` snapshot file found under `dir`, recursively.
///
/// Files are saved in `(problem, model_name, version)` order. Files marked as production are
/// promoted after all versions of their pair are saved.
///
/// # Returns
///
/// * `Ok(usize)` - The number of versions imported.
/// * `SnapshotError::InvalidFile` - If a file has no front matter. Nothing is imported in that case.
/// * `SnapshotError::Walk` - If `dir` or one of its entries can't be read.
pub fn import_snapshot<R: PromptRegistry>(registry: &R, dir: &Path) -> Result<usize, SnapshotError> {
    let mut entries = Vec::new();
    for entry in get_md_files(dir)? {
        let content = fs::read_to_string(entry.path())?;
        entries.push(parse_snapshot(entry.path(), &content)?);
    }

    entries.sort_by(|(a, _), (b, _)| {
        (&a.problem, &a.model_name, a.version).cmp(&(&b.problem, &b.model_name, b.version))
    });

    let mut promotions = Vec::new();
    for (metadata, prompt) in &entries {
        let options = SaveOptions {
            score: metadata.score,
            comment: metadata.comment.clone(),
            production: false,
        };
        let version = registry
            .save(&metadata.problem, &metadata.model_name, prompt, options)
            .map_err(registry_error)?;
        if metadata.production {
            promotions.push((metadata.problem.as_str(), metadata.model_name.as_str(), version));
        }
    }

    for (problem, model_name, version) in promotions {
        registry
            .set_production(problem, model_name, version)
            .map_err(registry_error)?;
    }

    info!(count = entries.len(), dir = %dir.display(), "Imported snapshot");
    Ok(entries.len())
}

fn get_md_files(dir: &Path) -> Result<Vec<walkdir::DirEntry>, SnapshotError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "md") {
            files.push(entry);
        }
    }
    Ok(files)
}

fn render_snapshot(metadata: &SnapshotMetadata, prompt: &str) -> Result<String, SnapshotError> {
    let front_matter = serde_yaml::to_string(metadata)?;
    Ok(format!("{FENCE}{front_matter}{FENCE}{prompt}"))
}

fn fence(input: &str) -> IResult<&str, &str> {
    terminated(tag("---"), line_ending).parse(input)
}

fn front_matter(input: &str) -> IResult<&str, &str> {
    recognize(many0(preceded(not(fence), recognize(pair(not_line_ending, line_ending))))).parse(input)
}

fn parse_snapshot(path: &Path, content: &str) -> Result<(SnapshotMetadata, String), SnapshotError> {
    let invalid = |message: &str| SnapshotError::InvalidFile {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let (input, _) = fence(content).map_err(|_| invalid("missing front matter"))?;
    let (input, yaml) = front_matter(input).map_err(|_| invalid("unreadable front matter"))?;
    let (body, _) = fence(input).map_err(|_| invalid("front matter is never closed"))?;

    let metadata: SnapshotMetadata = serde_yaml::from_str(yaml)?;
    Ok((metadata, body.to_string()))
}
