// src/generate/schema.rs
//! Coercion of free-form model output into the fixed relief-template schema.
//!
//! The repair pass asks the model to re-key its own draft against `JSON_TEMPLATE`;
//! this module then parses and validates field by field, so a missing or mistyped
//! field surfaces as a typed `SchemaError` instead of a runtime panic.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use thiserror::Error;

/// The exact target shape the repair prompt pins the model to.
pub const JSON_TEMPLATE: &str = r#"{
    "relief_title": "",
    "description": "",
    "monetary_goal": "",
    "inkind_donation": [
        {
            "item": "",
            "item_desc": "",
            "quantity": ""
        }
    ],
    "deployment_date": ""
}"#;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("repaired draft is not valid JSON: {0}")]
    Unparseable(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` has the wrong type, expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `{field}` is invalid: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InkindItem {
    pub item: String,
    pub item_desc: String,
    pub quantity: i64,
}

/// A fully validated relief-effort template, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliefTemplate {
    pub relief_title: String,
    pub description: String,
    pub monetary_goal: i64,
    pub deployment_date: NaiveDate,
    pub inkind: Vec<InkindItem>,
}

/// The model wraps JSON in markdown fences more often than not.
pub fn strip_code_fences(raw: &str) -> &str {
    let s = raw.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

/// Parse + validate a repaired draft into a `ReliefTemplate`.
pub fn parse_template(raw: &str) -> Result<ReliefTemplate, SchemaError> {
    let value: Value = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| SchemaError::Unparseable(e.to_string()))?;
    let obj = value.as_object().ok_or(SchemaError::WrongType {
        field: "$",
        expected: "object",
    })?;

    let relief_title = string_field(obj, "relief_title")?;
    let description = string_field(obj, "description")?;

    let monetary_goal = int_field(obj, "monetary_goal")?;
    if monetary_goal < 0 {
        return Err(SchemaError::InvalidValue {
            field: "monetary_goal",
            reason: format!("must be non-negative, got {monetary_goal}"),
        });
    }

    let deployment_date = date_field(obj, "deployment_date")?;

    let items_value = obj
        .get("inkind_donation")
        .ok_or(SchemaError::MissingField("inkind_donation"))?;
    let items = items_value.as_array().ok_or(SchemaError::WrongType {
        field: "inkind_donation",
        expected: "array",
    })?;
    if items.is_empty() {
        return Err(SchemaError::InvalidValue {
            field: "inkind_donation",
            reason: "at least one in-kind item is required".into(),
        });
    }

    let mut inkind = Vec::with_capacity(items.len());
    for entry in items {
        let item_obj = entry.as_object().ok_or(SchemaError::WrongType {
            field: "inkind_donation",
            expected: "array of objects",
        })?;
        let quantity = int_field(item_obj, "quantity")?;
        if quantity <= 0 {
            return Err(SchemaError::InvalidValue {
                field: "quantity",
                reason: format!("must be positive, got {quantity}"),
            });
        }
        inkind.push(InkindItem {
            item: string_field(item_obj, "item")?,
            item_desc: string_field(item_obj, "item_desc")?,
            quantity,
        });
    }

    Ok(ReliefTemplate {
        relief_title,
        description,
        monetary_goal,
        deployment_date,
        inkind,
    })
}

fn string_field(obj: &Map<String, Value>, field: &'static str) -> Result<String, SchemaError> {
    let value = obj.get(field).ok_or(SchemaError::MissingField(field))?;
    let s = value.as_str().ok_or(SchemaError::WrongType {
        field,
        expected: "string",
    })?;
    let s = s.trim();
    if s.is_empty() {
        return Err(SchemaError::InvalidValue {
            field,
            reason: "must not be empty".into(),
        });
    }
    Ok(s.to_string())
}

/// Integers arrive as numbers or as numeric strings (sometimes with thousands
/// separators); both are accepted.
fn int_field(obj: &Map<String, Value>, field: &'static str) -> Result<i64, SchemaError> {
    let value = obj.get(field).ok_or(SchemaError::MissingField(field))?;
    match value {
        Value::Number(n) => n.as_i64().ok_or(SchemaError::WrongType {
            field,
            expected: "integer",
        }),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| *c != ',' && *c != ' ').collect();
            cleaned
                .parse::<i64>()
                .map_err(|_| SchemaError::InvalidValue {
                    field,
                    reason: format!("'{s}' is not an integer"),
                })
        }
        _ => Err(SchemaError::WrongType {
            field,
            expected: "integer",
        }),
    }
}

fn date_field(obj: &Map<String, Value>, field: &'static str) -> Result<NaiveDate, SchemaError> {
    let value = obj.get(field).ok_or(SchemaError::MissingField(field))?;
    let s = value.as_str().ok_or(SchemaError::WrongType {
        field,
        expected: "date string",
    })?;
    let s = s.trim();
    // ISO first; the model occasionally falls back to long-form dates.
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%B %d, %Y"))
        .map_err(|_| SchemaError::InvalidValue {
            field,
            reason: format!("'{s}' is not a date"),
        })
}
