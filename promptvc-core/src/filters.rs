//! Template filters beyond the engine's built-ins, and the bridge for custom filters.

use crate::template::{FilterFn, TemplateError};
use minijinja::{Error, ErrorKind, Value};

/// Filter names a custom filter may not take: the engine's built-ins plus `require`.
pub(crate) const BUILTIN_FILTERS: &[&str] = &[
    "abs", "attr", "batch", "bool", "capitalize", "center", "chain", "count", "d", "default",
    "dictsort", "e", "escape", "filesizeformat", "first", "float", "format", "groupby", "indent",
    "int", "items", "join", "last", "length", "lines", "list", "lower", "map", "max", "min",
    "pprint", "reject", "rejectattr", "replace", "require", "reverse", "round", "safe", "select",
    "selectattr", "slice", "sort", "split", "string", "striptags", "sum", "title", "tojson",
    "trim", "truncate", "unique", "upper", "urlencode", "wordcount", "wordwrap", "zip",
];

/// `value | require("name")`: passes `value` through if it is truthy.
pub fn require(value: Value, name: String) -> Result<Value, Error> {
    if value.is_true() {
        Ok(value)
    } else {
        Err(engine_error(TemplateError::RequiredVariableMissing { name }))
    }
}

/// Wraps one of our errors so it can be recovered once the render fails.
pub(crate) fn engine_error(err: TemplateError) -> Error {
    Error::new(ErrorKind::InvalidOperation, err.to_string()).with_source(err)
}

pub(crate) fn call_custom(
    name: &str,
    filter: &FilterFn,
    value: Value,
    args: &[Value],
) -> Result<Value, Error> {
    let failure = |message: String| {
        engine_error(TemplateError::Filter {
            name: name.to_string(),
            message,
        })
    };

    let value = to_json(&value).map_err(|err| failure(err.to_string()))?;
    let args = args
        .iter()
        .map(to_json)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| failure(err.to_string()))?;

    match filter(&value, &args) {
        Ok(output) => Ok(Value::from_serialize(&output)),
        Err(err @ TemplateError::RequiredVariableMissing { .. }) => Err(engine_error(err)),
        Err(err @ TemplateError::Filter { .. }) => Err(engine_error(err)),
        Err(err) => Err(failure(err.to_string())),
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, serde_json::Error> {
    if value.is_undefined() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::to_value(value)
}
