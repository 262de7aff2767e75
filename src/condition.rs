//! Condition algebra
//!
//! A condition is a named field tagged with an operator. Leaf conditions compare
//! a field with a value; composite conditions keep their operands in a field
//! named by a reserved sentinel (`_AND`, `_OR`, `_NOT`).
//!
//! Composition rules:
//! - `and` on an AND condition (or `or` on an OR condition) appends the new
//!   operand to the existing list, so chains stay flat and ordered.
//! - Mixing kinds wraps both sides in a fresh binary condition.
//! - `negate` on a NOT condition returns the wrapped operand.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::types::Value;

/// Reserved field name holding the operands of an AND condition
pub const AND_FIELD: &str = "_AND";
/// Reserved field name holding the operands of an OR condition
pub const OR_FIELD: &str = "_OR";
/// Reserved field name holding the operand of a NOT condition
pub const NOT_FIELD: &str = "_NOT";

/// Condition operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    GreaterThan,
    GreaterEqualsThan,
    LesserThan,
    LesserEqualsThan,
    Like,
    In,
    Between,
    And,
    Or,
    Not,
}

impl Operator {
    /// Textual symbol used when rendering leaf conditions
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::GreaterThan => ">",
            Operator::GreaterEqualsThan => ">=",
            Operator::LesserThan => "<",
            Operator::LesserEqualsThan => "<=",
            Operator::Like => "LIKE",
            Operator::In => "IN",
            Operator::Between => "BETWEEN",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Not)
    }
}

/// A named value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An immutable predicate over one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    field: Field,
    operator: Operator,
}

impl Condition {
    fn leaf(field: Field, operator: Operator) -> Self {
        Self { field, operator }
    }

    pub fn eq(field: Field) -> Self {
        Self::leaf(field, Operator::Equals)
    }

    pub fn gt(field: Field) -> Self {
        Self::leaf(field, Operator::GreaterThan)
    }

    pub fn gte(field: Field) -> Self {
        Self::leaf(field, Operator::GreaterEqualsThan)
    }

    pub fn lt(field: Field) -> Self {
        Self::leaf(field, Operator::LesserThan)
    }

    pub fn lte(field: Field) -> Self {
        Self::leaf(field, Operator::LesserEqualsThan)
    }

    pub fn like(field: Field) -> Self {
        Self::leaf(field, Operator::Like)
    }

    /// IN condition; the value must be iterable
    ///
    /// A bare placeholder is accepted here and checked once it is resolved.
    pub fn in_(field: Field) -> Result<Self> {
        validate_in(&field)?;
        Ok(Self::leaf(field, Operator::In))
    }

    /// BETWEEN condition; the value must be an iterable of exactly two items
    pub fn between(field: Field) -> Result<Self> {
        validate_between(&field)?;
        Ok(Self::leaf(field, Operator::Between))
    }

    /// IN condition over an explicit list of values
    pub fn in_list(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self::leaf(Field::new(name, Value::Array(values)), Operator::In)
    }

    /// BETWEEN condition over an explicit pair
    pub fn between_pair(name: impl Into<String>, low: Value, high: Value) -> Self {
        Self::leaf(Field::new(name, Value::Array(vec![low, high])), Operator::Between)
    }

    /// Build a leaf condition for any non-composite operator
    pub fn of(field: Field, operator: Operator) -> Result<Self> {
        match operator {
            Operator::In => Self::in_(field),
            Operator::Between => Self::between(field),
            op if op.is_composite() => Err(QueryError::illegal_argument(format!(
                "{:?} is not a leaf operator",
                op
            ))),
            _ => Ok(Self::leaf(field, operator)),
        }
    }

    fn composite(name: &str, operator: Operator, conditions: Vec<Condition>) -> Self {
        Self {
            field: Field::new(name, Value::Conditions(conditions)),
            operator,
        }
    }

    /// Combine with AND, flattening when this is already an AND
    pub fn and(&self, other: Condition) -> Condition {
        self.combine(other, Operator::And, AND_FIELD)
    }

    /// Combine with OR, flattening when this is already an OR
    pub fn or(&self, other: Condition) -> Condition {
        self.combine(other, Operator::Or, OR_FIELD)
    }

    fn combine(&self, other: Condition, operator: Operator, name: &str) -> Condition {
        match (&self.operator, &self.field.value) {
            (op, Value::Conditions(operands)) if *op == operator => {
                let mut operands = operands.clone();
                operands.push(other);
                Self::composite(name, operator, operands)
            }
            _ => Self::composite(name, operator, vec![self.clone(), other]),
        }
    }

    /// Negate; a NOT condition unwraps to its operand
    pub fn negate(&self) -> Condition {
        if let (Operator::Not, Value::Condition(inner)) = (&self.operator, &self.field.value) {
            return inner.as_ref().clone();
        }
        Self {
            field: Field::new(NOT_FIELD, Value::Condition(Box::new(self.clone()))),
            operator: Operator::Not,
        }
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn value(&self) -> &Value {
        &self.field.value
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Operands of an AND / OR condition
    pub fn operands(&self) -> Option<&[Condition]> {
        match (&self.operator, &self.field.value) {
            (Operator::And | Operator::Or, Value::Conditions(operands)) => Some(operands),
            _ => None,
        }
    }

    /// Operand of a NOT condition
    pub fn negated(&self) -> Option<&Condition> {
        match (&self.operator, &self.field.value) {
            (Operator::Not, Value::Condition(inner)) => Some(inner),
            _ => None,
        }
    }

    pub fn has_params(&self) -> bool {
        self.field.value.has_params()
    }

    /// Copy of this condition with every placeholder replaced by its bound value
    ///
    /// IN and BETWEEN invariants are checked again, since a placeholder can only
    /// be validated once it holds a value.
    pub fn resolve(&self) -> Result<Condition> {
        let field = Field {
            name: self.field.name.clone(),
            value: self.field.value.resolve()?,
        };
        match self.operator {
            Operator::In => validate_in(&field)?,
            Operator::Between => validate_between(&field)?,
            _ => {}
        }
        Ok(Self {
            field,
            operator: self.operator,
        })
    }
}

fn validate_in(field: &Field) -> Result<()> {
    if field.value.is_iterable() || matches!(field.value, Value::Param(_)) {
        return Ok(());
    }
    Err(QueryError::illegal_argument(format!(
        "IN condition on '{}' requires an iterable value, got {}",
        field.name, field.value
    )))
}

fn validate_between(field: &Field) -> Result<()> {
    match field.value.elements() {
        Some(items) if items.len() == 2 => Ok(()),
        Some(items) => Err(QueryError::illegal_argument(format!(
            "BETWEEN condition on '{}' requires exactly two elements, got {}",
            field.name,
            items.len()
        ))),
        None => Err(QueryError::illegal_argument(format!(
            "BETWEEN condition on '{}' requires an iterable of two elements, got {}",
            field.name, field.value
        ))),
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::And | Operator::Or => {
                let operands = self.operands().unwrap_or(&[]);
                let parts: Vec<String> = operands.iter().map(|c| format!("({})", c)).collect();
                let sep = format!(" {} ", self.operator.symbol());
                write!(f, "{}", parts.join(&sep))
            }
            Operator::Not => match self.negated() {
                Some(inner) => write!(f, "NOT ({})", inner),
                None => write!(f, "NOT ({})", self.field.value),
            },
            Operator::Between => match self.field.value.elements() {
                Some(items) if items.len() == 2 => {
                    write!(f, "{} BETWEEN {} AND {}", self.field.name, items[0], items[1])
                }
                _ => write!(f, "{} BETWEEN {}", self.field.name, self.field.value),
            },
            op => write!(f, "{} {} {}", self.field.name, op.symbol(), self.field.value),
        }
    }
}
