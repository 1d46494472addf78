//! Closed parameter schemas for oracle-facing tools.
//!
//! A [`ToolSchema`] is both the contract shown to the reasoning oracle (as
//! JSON Schema plus usage guidance) and the validator applied at the registry
//! boundary. Arguments that fail validation never reach a tool.

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    Reject,
    Clamp,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParamKind {
    Text { min_len: usize, max_len: usize },
    Integer { min: i64, max: i64, default: Option<i64>, overflow: Overflow },
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    /// A string, number or boolean. The tool interprets it by context.
    Scalar,
    Choice { values: &'static [&'static str], default: Option<&'static str> },
    List { item: Box<ParamKind>, max_items: usize },
    Object { fields: Vec<ParamSpec> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self { name, description, kind, required: true }
    }

    pub fn optional(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self { name, description, kind, required: false }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    /// When to use the tool and when not to.
    pub usage: &'static str,
    pub params: Vec<ParamSpec>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("arguments must be a JSON object")]
    NotAnObject,
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
    #[error("missing required parameter `{0}`")]
    MissingParameter(String),
    #[error("parameter `{param}` must be {expected}")]
    WrongType { param: String, expected: &'static str },
    #[error("parameter `{param}` must be in range {min}..={max}")]
    OutOfRange { param: String, min: String, max: String },
    #[error("parameter `{param}` must be {min}..={max} characters long")]
    TextLength { param: String, min: usize, max: usize },
    #[error("parameter `{param}` has invalid value `{value}` (allowed: {allowed})")]
    InvalidChoice { param: String, value: String, allowed: String },
    #[error("parameter `{param}` accepts at most {max} items")]
    TooManyItems { param: String, max: usize },
}

impl ToolSchema {
    /// Validates raw oracle arguments and returns a normalized copy with
    /// defaults filled in, integers clamped where allowed, and choices folded
    /// to their canonical spelling.
    pub fn validate(&self, arguments: &Value) -> Result<Value, ValidationError> {
        match arguments {
            Value::Null => validate_object(&self.params, &Map::new(), ""),
            Value::Object(map) => validate_object(&self.params, map, ""),
            _ => Err(ValidationError::NotAnObject),
        }
    }

    pub fn to_json_schema(&self) -> Value {
        object_schema(&self.params)
    }

    /// Description shown to the oracle: purpose followed by usage guidance.
    pub fn guidance(&self) -> String {
        format!("{}\n\n{}", self.description, self.usage)
    }
}

fn path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn validate_object(
    specs: &[ParamSpec],
    map: &Map<String, Value>,
    prefix: &str,
) -> Result<Value, ValidationError> {
    if let Some(unknown) = map.keys().find(|key| !specs.iter().any(|spec| spec.name == *key)) {
        return Err(ValidationError::UnknownParameter(path(prefix, unknown)));
    }

    let mut normalized = Map::new();
    for spec in specs {
        let param = path(prefix, spec.name);
        match map.get(spec.name).filter(|value| !value.is_null()) {
            Some(value) => {
                normalized.insert(spec.name.to_string(), validate_value(&spec.kind, value, &param)?);
            }
            None => {
                if let Some(default) = default_for(&spec.kind) {
                    normalized.insert(spec.name.to_string(), default);
                } else if spec.required {
                    return Err(ValidationError::MissingParameter(param));
                }
            }
        }
    }
    Ok(Value::Object(normalized))
}

fn default_for(kind: &ParamKind) -> Option<Value> {
    match kind {
        ParamKind::Integer { default: Some(default), .. } => Some(json!(default)),
        ParamKind::Choice { default: Some(default), .. } => Some(json!(default)),
        _ => None,
    }
}

fn validate_value(kind: &ParamKind, value: &Value, param: &str) -> Result<Value, ValidationError> {
    match kind {
        ParamKind::Text { min_len, max_len } => {
            let text = value.as_str().ok_or_else(|| ValidationError::WrongType {
                param: param.to_string(),
                expected: "a string",
            })?;
            let trimmed = text.trim();
            let length = trimmed.chars().count();
            if length < *min_len || length > *max_len {
                return Err(ValidationError::TextLength {
                    param: param.to_string(),
                    min: *min_len,
                    max: *max_len,
                });
            }
            Ok(Value::String(trimmed.to_string()))
        }
        ParamKind::Integer { min, max, overflow, .. } => {
            let number = as_integer(value).ok_or_else(|| ValidationError::WrongType {
                param: param.to_string(),
                expected: "an integer",
            })?;
            if (*min..=*max).contains(&number) {
                return Ok(json!(number));
            }
            match overflow {
                Overflow::Clamp => Ok(json!(number.clamp(*min, *max))),
                Overflow::Reject => Err(ValidationError::OutOfRange {
                    param: param.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                }),
            }
        }
        ParamKind::Number { min, max } => {
            let number = value.as_f64().ok_or_else(|| ValidationError::WrongType {
                param: param.to_string(),
                expected: "a number",
            })?;
            let below = min.map(|min| number < min).unwrap_or(false);
            let above = max.map(|max| number > max).unwrap_or(false);
            if below || above {
                return Err(ValidationError::OutOfRange {
                    param: param.to_string(),
                    min: min.map(|v| v.to_string()).unwrap_or_else(|| "-inf".to_string()),
                    max: max.map(|v| v.to_string()).unwrap_or_else(|| "inf".to_string()),
                });
            }
            Ok(value.clone())
        }
        ParamKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(ValidationError::WrongType { param: param.to_string(), expected: "a boolean" }),
        },
        ParamKind::Scalar => match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(value.clone()),
            _ => Err(ValidationError::WrongType {
                param: param.to_string(),
                expected: "a string, number or boolean",
            }),
        },
        ParamKind::Choice { values, .. } => {
            let raw = value.as_str().ok_or_else(|| ValidationError::WrongType {
                param: param.to_string(),
                expected: "a string",
            })?;
            let wanted = raw.trim();
            values
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(wanted))
                .map(|candidate| json!(candidate))
                .ok_or_else(|| ValidationError::InvalidChoice {
                    param: param.to_string(),
                    value: raw.to_string(),
                    allowed: values.join("|"),
                })
        }
        ParamKind::List { item, max_items } => {
            let entries = value.as_array().ok_or_else(|| ValidationError::WrongType {
                param: param.to_string(),
                expected: "an array",
            })?;
            if entries.len() > *max_items {
                return Err(ValidationError::TooManyItems {
                    param: param.to_string(),
                    max: *max_items,
                });
            }
            entries
                .iter()
                .enumerate()
                .map(|(index, entry)| validate_value(item, entry, &format!("{param}[{index}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        ParamKind::Object { fields } => {
            let map = value.as_object().ok_or_else(|| ValidationError::WrongType {
                param: param.to_string(),
                expected: "an object",
            })?;
            validate_object(fields, map, param)
        }
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    if let Some(number) = value.as_i64() {
        return Some(number);
    }
    // Oracles sometimes emit `5.0` for integers.
    value.as_f64().filter(|number| number.fract() == 0.0 && number.is_finite()).map(|n| n as i64)
}

fn object_schema(specs: &[ParamSpec]) -> Value {
    let mut properties = Map::new();
    for spec in specs {
        let mut schema = kind_schema(&spec.kind);
        if let Value::Object(fields) = &mut schema {
            fields.insert("description".to_string(), json!(spec.description));
        }
        properties.insert(spec.name.to_string(), schema);
    }
    let required = specs.iter().filter(|spec| spec.required).map(|spec| spec.name).collect::<Vec<_>>();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn kind_schema(kind: &ParamKind) -> Value {
    match kind {
        ParamKind::Text { min_len, max_len } => {
            json!({ "type": "string", "minLength": min_len, "maxLength": max_len })
        }
        ParamKind::Integer { min, max, default, .. } => {
            let mut schema = json!({ "type": "integer", "minimum": min, "maximum": max });
            if let (Some(default), Value::Object(fields)) = (default, &mut schema) {
                fields.insert("default".to_string(), json!(default));
            }
            schema
        }
        ParamKind::Number { min, max } => {
            let mut schema = Map::new();
            schema.insert("type".to_string(), json!("number"));
            if let Some(min) = min {
                schema.insert("minimum".to_string(), json!(min));
            }
            if let Some(max) = max {
                schema.insert("maximum".to_string(), json!(max));
            }
            Value::Object(schema)
        }
        ParamKind::Boolean => json!({ "type": "boolean" }),
        ParamKind::Scalar => json!({ "type": ["string", "number", "boolean"] }),
        ParamKind::Choice { values, default } => {
            let mut schema = json!({ "type": "string", "enum": values });
            if let (Some(default), Value::Object(fields)) = (default, &mut schema) {
                fields.insert("default".to_string(), json!(default));
            }
            schema
        }
        ParamKind::List { item, max_items } => {
            json!({ "type": "array", "items": kind_schema(item), "maxItems": max_items })
        }
        ParamKind::Object { fields } => object_schema(fields),
    }
}
