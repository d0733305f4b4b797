//! # Templates
//!
//! Compiles prompt text into reusable [`Template`]s and renders them against a set of variables.
//!
//! Templates are Jinja templates evaluated by `minijinja`, configured with `trim_blocks` and
//! `lstrip_blocks` and without auto-escaping. A template only sees the context it is rendered
//! with plus the engine's pure built-ins: there are no host functions, no loader for includes
//! and imports, and attribute lookups never leave the context values.
//!
//! # Examples
//!
//! ```rust
//! use promptvc_core::template::{Renderer, TemplateError};
//! use serde_json::json;
//!
//! let renderer = Renderer::new();
//! let template = renderer
//!     .compile("Question: {{ question | require(\"question\") }}")
//!     .expect("Failed to compile template");
//!
//! let prompt = template.render(&json!({ "question": "ques" })).unwrap();
//! assert_eq!("Question: ques", prompt);
//!
//! let missing = template.render(&json!({}));
//! assert!(matches!(missing, Err(TemplateError::RequiredVariableMissing { .. })));
//! ```

use crate::filters;
use minijinja::value::Rest;
use minijinja::{AutoEscape, Environment, ErrorKind};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const TEMPLATE_NAME: &str = "prompt";

/// Signature of a custom filter: the filtered value and the call arguments in, a value out.
pub type FilterFn = dyn Fn(&Value, &[Value]) -> Result<Value, TemplateError> + Send + Sync;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("Variable {name} is required")]
    RequiredVariableMissing { name: String },

    #[error("Filter '{name}' failed: {message}")]
    Filter { name: String, message: String },

    #[error("Invalid filter name '{0}'")]
    InvalidFilterName(String),

    #[error("Filter '{0}' is already registered")]
    DuplicateFilter(String),

    #[error("Template render error: {0}")]
    Render(String),

    #[error("Template context must be an object, got {0}")]
    InvalidContext(&'static str),

    #[error("Failed to serialize template context: {0}")]
    Context(#[from] serde_json::Error),
}

impl TemplateError {
    /// Whether the error was raised while compiling rather than rendering.
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, TemplateError::Syntax { .. })
    }
}

/// Compiles templates and holds the filters they may use.
///
/// A new renderer knows `require` plus the engine's built-in filters (`default`, `upper`,
/// `lower`, `trim`, `length`, `join` and the rest of the Jinja set).
#[derive(Debug, Clone)]
pub struct Renderer {
    env: Environment<'static>,
    custom_filters: BTreeSet<String>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("require", filters::require);

        Self {
            env,
            custom_filters: BTreeSet::new(),
        }
    }

    /// Adds a filter callable from templates as `value | name` or `value | name(args)`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the filter was registered.
    /// * `TemplateError::InvalidFilterName` - If `name` isn't an identifier starting with a letter.
    /// * `TemplateError::DuplicateFilter` - If a filter with that name exists, built-ins included.
    pub fn register_filter<F>(&mut self, name: &str, filter: F) -> Result<(), TemplateError>
    where
        F: Fn(&Value, &[Value]) -> Result<Value, TemplateError> + Send + Sync + 'static,
    {
        if !is_valid_filter_name(name) {
            return Err(TemplateError::InvalidFilterName(name.to_string()));
        }
        if self.has_filter(name) {
            return Err(TemplateError::DuplicateFilter(name.to_string()));
        }

        let filter: Arc<FilterFn> = Arc::new(filter);
        let filter_name = name.to_string();
        self.env.add_filter(
            name.to_string(),
            move |value: minijinja::Value, args: Rest<minijinja::Value>| {
                filters::call_custom(&filter_name, filter.as_ref(), value, &args.0)
            },
        );
        self.custom_filters.insert(name.to_string());

        debug!(filter = name, "Registered template filter");
        Ok(())
    }

    pub fn has_filter(&self, name: &str) -> bool {
        filters::BUILTIN_FILTERS.contains(&name) || self.custom_filters.contains(name)
    }

    /// Compiles template text.
    ///
    /// The compiled template keeps the filters known at this point; filters registered
    /// afterwards are not visible to it.
    pub fn compile(&self, source: &str) -> Result<Template, TemplateError> {
        let mut env = self.env.clone();
        env.add_template_owned(TEMPLATE_NAME, source.to_string())
            .map_err(syntax_error)?;
        debug!(bytes = source.len(), "Compiled template");

        Ok(Template { env })
    }
}

fn is_valid_filter_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// A compiled template, reusable across any number of renders.
#[derive(Debug, Clone)]
pub struct Template {
    env: Environment<'static>,
}

impl Template {
    /// Renders the template.
    ///
    /// `context` must serialize to a JSON object (or to null, which is treated as no variables).
    /// Variables missing from the context render as empty text and count as false in conditions.
    /// A single trailing newline of the template is dropped, nothing else is trimmed.
    pub fn render<C: Serialize + ?Sized>(&self, context: &C) -> Result<String, TemplateError> {
        let context = match serde_json::to_value(context)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(TemplateError::InvalidContext(kind_of(&other))),
        };

        let template = self.env.get_template(TEMPLATE_NAME).map_err(render_error)?;
        template.render(&context).map_err(render_error)
    }
}

fn syntax_error(err: minijinja::Error) -> TemplateError {
    TemplateError::Syntax {
        line: err.line().unwrap_or_default(),
        message: err
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| err.kind().to_string()),
    }
}

/// Recovers errors raised by our own filters from the engine error's source chain.
fn render_error(err: minijinja::Error) -> TemplateError {
    let mut source: Option<&(dyn StdError + 'static)> = Some(&err);
    while let Some(current) = source {
        match current.downcast_ref::<TemplateError>() {
            Some(TemplateError::RequiredVariableMissing { name }) => {
                return TemplateError::RequiredVariableMissing { name: name.clone() };
            }
            Some(TemplateError::Filter { name, message }) => {
                return TemplateError::Filter {
                    name: name.clone(),
                    message: message.clone(),
                };
            }
            _ => source = current.source(),
        }
    }

    if matches!(err.kind(), ErrorKind::SyntaxError) {
        return syntax_error(err);
    }
    TemplateError::Render(err.to_string())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "none",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
