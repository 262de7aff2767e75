//! Parsed form of a query string
//!
//! Names here are still the tokens written in the query; storage names are
//! resolved when the statement is converted into query objects.

use std::time::Duration;

use crate::condition::Operator;
use crate::query::Sort;
use crate::types::{FieldType, Value};

/// A value as written in a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Literal(Value),
    /// `@name`
    Param(String),
    Array(Vec<QueryValue>),
    /// `{...}` object literal
    Json(serde_json::Value),
    /// `convert(value, type)`
    Convert { value: Box<QueryValue>, to: FieldType },
}

impl QueryValue {
    pub fn has_params(&self) -> bool {
        match self {
            QueryValue::Param(_) => true,
            QueryValue::Array(items) => items.iter().any(QueryValue::has_params),
            QueryValue::Convert { value, .. } => value.has_params(),
            QueryValue::Literal(_) | QueryValue::Json(_) => false,
        }
    }
}

/// A where-clause predicate tree
///
/// `And` / `Or` nodes are built left to right as they are read, without
/// precedence between the two.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereCondition {
    /// `field <op> value` for `=`, `>`, `>=`, `<`, `<=` and `like`
    Compare {
        field: String,
        operator: Operator,
        value: QueryValue,
    },
    In {
        field: String,
        value: QueryValue,
    },
    Between {
        field: String,
        low: QueryValue,
        high: QueryValue,
    },
    Not(Box<WhereCondition>),
    And(Box<WhereCondition>, Box<WhereCondition>),
    Or(Box<WhereCondition>, Box<WhereCondition>),
}

/// Values written by insert and update statements
#[derive(Debug, Clone, PartialEq)]
pub enum Assignments {
    Fields(Vec<(String, QueryValue)>),
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub entity: String,
    /// Projected fields; empty for `*`
    pub fields: Vec<String>,
    pub condition: Option<WhereCondition>,
    pub sorts: Vec<Sort>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub entity: String,
    pub fields: Vec<String>,
    pub condition: Option<WhereCondition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub entity: String,
    pub values: Assignments,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub entity: String,
    pub values: Assignments,
}

/// Any parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Delete(DeleteStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
}

impl Statement {
    pub fn entity(&self) -> &str {
        match self {
            Statement::Select(s) => &s.entity,
            Statement::Delete(s) => &s.entity,
            Statement::Insert(s) => &s.entity,
            Statement::Update(s) => &s.entity,
        }
    }
}
