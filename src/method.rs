//! Query derivation from repository method names
//!
//! A method name such as `findByAgeGreaterThanAndNameOrderByNameDesc` is split
//! into a subject, a predicate and an optional ordering. Every predicate part
//! becomes one condition with `@` placeholders, so the derived query goes
//! through the same conversion and binding path as a string query.
//!
//! Parts are folded strictly left to right: `AAndBOrC` reads as `(A and B) or C`.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::condition::Operator;
use crate::error::{QueryError, Result};
use crate::mapping::{ClassMapping, MappingObserver};
use crate::pagination::Pagination;
use crate::params::Params;
use crate::parser::{DeleteStatement, QueryValue, SelectStatement, Statement, WhereCondition};
use crate::query::{Direction, Sort};
use crate::statement::{self, Command, ConvertedStatement};
use crate::types::Value;

static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<subject>find|delete|count|exists)(?:All)?(?:By(?P<predicate>.+?))?(?:OrderBy(?P<order>.+))?$",
    )
    .expect("method name pattern is valid")
});

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_|[A-Z][a-z0-9]*|[a-z0-9]+").expect("word pattern is valid"));

/// Operator keywords, longest first so `GreaterThanEqual` wins over `GreaterThan`
const KEYWORDS: &[(&[&str], Operator)] = &[
    (&["Greater", "Than", "Equal"], Operator::GreaterEqualsThan),
    (&["Less", "Than", "Equal"], Operator::LesserEqualsThan),
    (&["Greater", "Than"], Operator::GreaterThan),
    (&["Less", "Than"], Operator::LesserThan),
    (&["Between"], Operator::Between),
    (&["Equals"], Operator::Equals),
    (&["Like"], Operator::Like),
    (&["In"], Operator::In),
];

/// What a derived method does with the matching entities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Find,
    Delete,
    Count,
    Exists,
}

impl Subject {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "find" => Some(Subject::Find),
            "delete" => Some(Subject::Delete),
            "count" => Some(Subject::Count),
            "exists" => Some(Subject::Exists),
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Find => write!(f, "find"),
            Subject::Delete => write!(f, "delete"),
            Subject::Count => write!(f, "count"),
            Subject::Exists => write!(f, "exists"),
        }
    }
}

/// A query derived from a repository method name
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryMethod {
    name: String,
    subject: Subject,
    statement: Statement,
}

impl RepositoryMethod {
    /// Derive the query for `method_name` over `entity`
    ///
    /// Property names stay as written in the method; storage names are
    /// resolved when the method is converted against a mapping.
    pub fn parse(method_name: &str, entity: &str) -> Result<Self> {
        let captures = METHOD_RE.captures(method_name).ok_or_else(|| {
            QueryError::query(format!(
                "Method '{}' does not start with find, delete, count or exists",
                method_name
            ))
        })?;

        let subject = captures
            .name("subject")
            .and_then(|m| Subject::from_prefix(m.as_str()))
            .ok_or_else(|| QueryError::query(format!("Unknown subject in '{}'", method_name)))?;

        let condition = match captures.name("predicate") {
            Some(predicate) => Some(PredicateReader::default().read(predicate.as_str())?),
            None => None,
        };
        let sorts = match captures.name("order") {
            Some(order) => read_order(order.as_str())?,
            None => Vec::new(),
        };

        let statement = match subject {
            Subject::Delete => {
                if !sorts.is_empty() {
                    return Err(QueryError::query(format!(
                        "Method '{}' cannot order a delete",
                        method_name
                    )));
                }
                Statement::Delete(DeleteStatement {
                    entity: entity.to_string(),
                    fields: Vec::new(),
                    condition,
                })
            }
            Subject::Find | Subject::Count | Subject::Exists => Statement::Select(SelectStatement {
                entity: entity.to_string(),
                fields: Vec::new(),
                condition,
                sorts,
                skip: None,
                limit: None,
            }),
        };

        debug!(method = method_name, subject = %subject, "Derived repository method");

        Ok(Self {
            name: method_name.to_string(),
            subject,
            statement,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    /// The derived statement, with property names as written in the method
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Resolve names through `mapping` and register the placeholders
    pub fn convert(&self, mapping: &dyn ClassMapping) -> Result<ConvertedStatement> {
        statement::convert(&self.statement, &MappingObserver::new(mapping))
    }

    /// Convert and bind positional arguments, ready for a manager
    pub fn prepare(&self, mapping: &dyn ClassMapping, args: &[MethodArg]) -> Result<Command> {
        let converted = self.convert(mapping)?;
        let bound = ParamsBinder::bind(&converted.params, args, Some(mapping))?;

        let command = converted.command.resolve()?;
        Ok(match command {
            Command::Select(query) => {
                let query = if bound.sorts.is_empty() {
                    query
                } else {
                    let sorts = bound
                        .sorts
                        .iter()
                        .map(|s| Sort::new(mapping.field_name(&s.name), s.direction));
                    query.with_sorts(sorts)
                };
                let query = match &bound.pagination {
                    Some(pagination) => query.with_pagination(pagination),
                    None => query,
                };
                Command::Select(query)
            }
            other => other,
        })
    }
}

/// An argument passed to a derived repository method
#[derive(Debug, Clone, PartialEq)]
pub enum MethodArg {
    Value(Value),
    Pagination(Pagination),
    Sort(Sort),
}

impl From<Pagination> for MethodArg {
    fn from(pagination: Pagination) -> Self {
        MethodArg::Pagination(pagination)
    }
}

impl From<Sort> for MethodArg {
    fn from(sort: Sort) -> Self {
        MethodArg::Sort(sort)
    }
}

impl MethodArg {
    pub fn value(value: impl Into<Value>) -> Self {
        MethodArg::Value(value.into())
    }

    pub fn pagination(pagination: Pagination) -> Self {
        MethodArg::Pagination(pagination)
    }

    pub fn sort(sort: Sort) -> Self {
        MethodArg::Sort(sort)
    }
}

/// Special arguments collected while binding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    pub pagination: Option<Pagination>,
    pub sorts: Vec<Sort>,
}

/// Binds method arguments to placeholders by position
pub struct ParamsBinder;

impl ParamsBinder {
    /// Bind the N-th value argument to the N-th registered placeholder
    ///
    /// `Pagination` and `Sort` arguments are collected apart and never count
    /// as placeholder values. Extra value arguments are ignored.
    pub fn bind(
        params: &Params,
        args: &[MethodArg],
        mapping: Option<&dyn ClassMapping>,
    ) -> Result<BoundArgs> {
        let mut bound = BoundArgs::default();
        let mut values = Vec::new();
        for arg in args {
            match arg {
                MethodArg::Value(value) => values.push(value),
                MethodArg::Pagination(pagination) => bound.pagination = Some(*pagination),
                MethodArg::Sort(sort) => bound.sorts.push(sort.clone()),
            }
        }

        for index in 0..params.len() {
            let value = values.get(index).ok_or(QueryError::IndexOutOfBounds {
                index,
                len: values.len(),
            })?;
            params.bind_at(index, (*value).clone(), mapping)?;
        }
        Ok(bound)
    }
}

fn words(text: &str) -> Vec<&str> {
    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// `Address_City` -> `address.city`
fn property_path(words: &[&str]) -> String {
    words
        .join("")
        .split('_')
        .map(decapitalize)
        .collect::<Vec<_>>()
        .join(".")
}

/// Lowercase the first letter unless the segment opens with an acronym,
/// so `FirstName` -> `firstName` but `URL` stays `URL`
fn decapitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => {
            segment.to_string()
        }
        (Some(first), _) => first.to_lowercase().chain(segment.chars().skip(1)).collect(),
        (None, _) => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connector {
    And,
    Or,
}

#[derive(Default)]
struct PredicateReader {
    /// Uses of each property so far, for unique placeholder names
    uses: HashMap<String, usize>,
}

impl PredicateReader {
    fn read(&mut self, predicate: &str) -> Result<WhereCondition> {
        let mut parts: Vec<(Option<Connector>, Vec<&str>)> = vec![(None, Vec::new())];
        for word in words(predicate) {
            let connector = match word {
                "And" => Some(Connector::And),
                "Or" => Some(Connector::Or),
                _ => None,
            };
            if connector.is_some() {
                parts.push((connector, Vec::new()));
            } else if let Some((_, current)) = parts.last_mut() {
                current.push(word);
            }
        }

        let mut combined: Option<WhereCondition> = None;
        for (connector, part) in parts {
            let condition = self.part(&part, predicate)?;
            combined = Some(match (combined, connector) {
                (None, _) => condition,
                (Some(left), Some(Connector::Or)) => {
                    WhereCondition::Or(Box::new(left), Box::new(condition))
                }
                (Some(left), _) => WhereCondition::And(Box::new(left), Box::new(condition)),
            });
        }
        combined.ok_or_else(|| QueryError::query(format!("Empty predicate '{}'", predicate)))
    }

    fn part(&mut self, words: &[&str], predicate: &str) -> Result<WhereCondition> {
        let mut rest = words;
        let mut operator = Operator::Equals;
        for (keyword, op) in KEYWORDS {
            if rest.len() > keyword.len() && rest.ends_with(keyword) {
                rest = &rest[..rest.len() - keyword.len()];
                operator = *op;
                break;
            }
        }
        let negated = rest.len() > 1 && rest.last() == Some(&"Not");
        if negated {
            rest = &rest[..rest.len() - 1];
        }

        let field = property_path(rest);
        if field.is_empty() || field.split('.').any(str::is_empty) {
            return Err(QueryError::query(format!(
                "Missing property name in predicate '{}'",
                predicate
            )));
        }

        let condition = match operator {
            Operator::Between => {
                let low = self.placeholder(&field);
                let high = self.placeholder(&field);
                WhereCondition::Between { field, low, high }
            }
            Operator::In => {
                let value = self.placeholder(&field);
                WhereCondition::In { field, value }
            }
            operator => {
                let value = self.placeholder(&field);
                WhereCondition::Compare {
                    field,
                    operator,
                    value,
                }
            }
        };

        Ok(if negated {
            WhereCondition::Not(Box::new(condition))
        } else {
            condition
        })
    }

    fn placeholder(&mut self, field: &str) -> QueryValue {
        let uses = self.uses.entry(field.to_string()).or_insert(0);
        let name = match *uses {
            0 => field.to_string(),
            n => format!("{}_{}", field, n),
        };
        *uses += 1;
        QueryValue::Param(name)
    }
}

/// `NameAscAgeDesc` -> `[name asc, age desc]`
fn read_order(order: &str) -> Result<Vec<Sort>> {
    let mut sorts = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in words(order) {
        let direction = match word {
            "Asc" => Some(Direction::Asc),
            "Desc" => Some(Direction::Desc),
            "And" => None,
            _ => {
                current.push(word);
                continue;
            }
        };
        if current.is_empty() {
            return Err(QueryError::query(format!(
                "Missing property name in ordering '{}'",
                order
            )));
        }
        sorts.push(Sort::new(
            property_path(&current),
            direction.unwrap_or_default(),
        ));
        current.clear();
    }
    if !current.is_empty() {
        sorts.push(Sort::asc(property_path(&current)));
    }
    Ok(sorts)
}
