//! Core value types for conditions and queries
//!
//! Includes the tagged `Value` union carried by every field, and the declared
//! `FieldType` used to coerce raw literals into the type a mapping expects.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::{QueryError, Result};
use crate::params::Param;

// ============================================================================
// Values
// ============================================================================

/// A value held by a field: a scalar, a list, a JSON structure, a placeholder,
/// or the operand conditions of a composite condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// JSON structure consumed verbatim (e.g. an embedded object literal)
    Json(serde_json::Value),
    Array(Vec<Value>),
    /// Placeholder resolved at bind time; never serialized
    #[serde(skip)]
    Param(Param),
    /// Single operand of a NOT condition
    Condition(Box<Condition>),
    /// Operands of an AND / OR condition
    Conditions(Vec<Condition>),
}

impl Value {
    /// Whether this value can be iterated as a list of elements
    pub fn is_iterable(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Json(serde_json::Value::Array(_)))
    }

    /// Element view of an iterable value
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.clone()),
            Value::Json(serde_json::Value::Array(items)) => {
                Some(items.iter().cloned().map(Value::from).collect())
            }
            _ => None,
        }
    }

    /// Whether this value, or anything nested in it, is an unresolved placeholder
    pub fn has_params(&self) -> bool {
        match self {
            Value::Param(_) => true,
            Value::Array(items) => items.iter().any(Value::has_params),
            Value::Condition(c) => c.has_params(),
            Value::Conditions(cs) => cs.iter().any(Condition::has_params),
            _ => false,
        }
    }

    /// Replace every placeholder with its bound value
    pub fn resolve(&self) -> Result<Value> {
        match self {
            Value::Param(param) => param.get(),
            Value::Array(items) => Ok(Value::Array(
                items.iter().map(Value::resolve).collect::<Result<_>>()?,
            )),
            Value::Condition(c) => Ok(Value::Condition(Box::new(c.resolve()?))),
            Value::Conditions(cs) => Ok(Value::Conditions(
                cs.iter().map(Condition::resolve).collect::<Result<_>>()?,
            )),
            other => Ok(other.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a plain JSON value; placeholders must be bound
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Decimal(d) => serde_json::Value::String(d.to_string()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.to_string()),
            Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::Json(json) => json.clone(),
            Value::Array(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_>>()?,
            ),
            Value::Param(param) => param.get()?.to_json()?,
            Value::Condition(c) => serde_json::to_value(c)?,
            Value::Conditions(cs) => serde_json::to_value(cs)?,
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Date(d) => write!(f, "\"{}\"", d),
            Value::DateTime(dt) => write!(f, "\"{}\"", dt.to_rfc3339()),
            Value::Json(json) => write!(f, "{}", json),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Param(param) => write!(f, "@{}", param.name()),
            Value::Condition(c) => write!(f, "{}", c),
            Value::Conditions(cs) => {
                let parts: Vec<String> = cs.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            object @ serde_json::Value::Object(_) => Value::Json(object),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    u32 => Int,
    f64 => Float,
    Decimal => Decimal,
    String => String,
    &str => String,
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<Condition> for Value {
    fn from(condition: Condition) -> Self {
        Value::Condition(Box::new(condition))
    }
}

impl From<Param> for Value {
    fn from(param: Param) -> Self {
        Value::Param(param)
    }
}

// ============================================================================
// Declared field types
// ============================================================================

/// Declared storage type of a mapped field, used to coerce raw literals
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Json,
}

impl FieldType {
    /// Parse a type name as written in a `convert(value, type)` call
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "string" | "text" => Some(FieldType::String),
            "integer" | "int" | "long" => Some(FieldType::Integer),
            "float" | "double" => Some(FieldType::Float),
            "decimal" => Some(FieldType::Decimal),
            "boolean" | "bool" => Some(FieldType::Boolean),
            "date" => Some(FieldType::Date),
            "datetime" | "timestamp" => Some(FieldType::DateTime),
            "json" => Some(FieldType::Json),
            _ => None,
        }
    }

    /// Coerce a value into this type
    ///
    /// Lists are coerced element-wise; nulls and unresolved placeholders pass
    /// through untouched.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (_, param @ Value::Param(_)) => Ok(param),
            (FieldType::Json, v) => Ok(Value::Json(v.to_json()?)),
            (t, Value::Array(items)) => Ok(Value::Array(
                items
                    .into_iter()
                    .map(|v| t.coerce(v))
                    .collect::<Result<_>>()?,
            )),

            (FieldType::String, Value::String(s)) => Ok(Value::String(s)),
            (FieldType::String, v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                Ok(Value::String(v.to_string()))
            }
            (FieldType::String, Value::Decimal(d)) => Ok(Value::String(d.to_string())),

            (FieldType::Integer, Value::Int(n)) => Ok(Value::Int(n)),
            (FieldType::Integer, Value::Float(f)) if f.fract() == 0.0 => Ok(Value::Int(f as i64)),
            (FieldType::Integer, Value::Decimal(d)) => d
                .to_i64()
                .map(Value::Int)
                .ok_or_else(|| QueryError::conversion(format!("Cannot convert {} to integer", d))),
            (FieldType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| QueryError::conversion(format!("Cannot convert '{}' to integer", s))),

            (FieldType::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (FieldType::Float, Value::Int(n)) => Ok(Value::Float(n as f64)),
            (FieldType::Float, Value::Decimal(d)) => d
                .to_f64()
                .map(Value::Float)
                .ok_or_else(|| QueryError::conversion(format!("Cannot convert {} to float", d))),
            (FieldType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| QueryError::conversion(format!("Cannot convert '{}' to float", s))),

            (FieldType::Decimal, Value::Decimal(d)) => Ok(Value::Decimal(d)),
            (FieldType::Decimal, Value::Int(n)) => Ok(Value::Decimal(Decimal::from(n))),
            (FieldType::Decimal, Value::Float(f)) => Decimal::try_from(f)
                .map(Value::Decimal)
                .map_err(|e| QueryError::conversion(format!("Cannot convert {} to decimal: {}", f, e))),
            (FieldType::Decimal, Value::String(s)) => s
                .trim()
                .parse::<Decimal>()
                .map(Value::Decimal)
                .map_err(|_| QueryError::conversion(format!("Cannot convert '{}' to decimal", s))),

            (FieldType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (FieldType::Boolean, Value::Int(n)) if n == 0 || n == 1 => Ok(Value::Bool(n == 1)),
            (FieldType::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(QueryError::conversion(format!("Cannot convert '{}' to boolean", s))),
            },

            (FieldType::Date, Value::Date(d)) => Ok(Value::Date(d)),
            (FieldType::Date, Value::DateTime(dt)) => Ok(Value::Date(dt.date_naive())),
            (FieldType::Date, Value::String(s)) => parse_date(&s).map(Value::Date),

            (FieldType::DateTime, Value::DateTime(dt)) => Ok(Value::DateTime(dt)),
            (FieldType::DateTime, Value::Date(d)) => d
                .and_hms_opt(0, 0, 0)
                .map(|naive| Value::DateTime(naive.and_utc()))
                .ok_or_else(|| QueryError::conversion(format!("Cannot convert {} to datetime", d))),
            (FieldType::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| QueryError::conversion(format!("Invalid datetime '{}': {}", s, e))),

            (t, v) => Err(QueryError::conversion(format!(
                "Type mismatch: expected {:?}, got {}",
                t, v
            ))),
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.date_naive()))
        .map_err(|e| QueryError::conversion(format!("Invalid date '{}': {}", s, e)))
}
