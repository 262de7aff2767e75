//! Query objects and builders
//!
//! Includes Query (select), DeleteQuery, InsertQuery, UpdateQuery and the
//! builders that compose their conditions field by field.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, Field};
use crate::pagination::Pagination;
use crate::types::Value;

// ============================================================================
// Sorting
// ============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// A sort on one field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sort {
    pub name: String,
    pub direction: Direction,
}

impl Sort {
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    pub fn asc(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Asc)
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self::new(name, Direction::Desc)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{} asc", self.name),
            Direction::Desc => write!(f, "{} desc", self.name),
        }
    }
}

// ============================================================================
// Condition building
// ============================================================================

/// How a new leaf condition joins the condition already on a builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    Where,
    And,
    Or,
}

/// A builder that can receive conditions
pub trait Conditional: Sized {
    /// Attach a condition to this builder
    fn attach(self, condition: Condition, conjunction: Conjunction) -> Self;
}

fn compose(
    current: Option<Condition>,
    condition: Condition,
    conjunction: Conjunction,
) -> Option<Condition> {
    Some(match (current, conjunction) {
        (Some(existing), Conjunction::And) => existing.and(condition),
        (Some(existing), Conjunction::Or) => existing.or(condition),
        // `and` / `or` before any `where` behave like `where`
        (_, _) => condition,
    })
}

/// Condition builder scoped to one field name
///
/// The terminal operator call attaches the condition and hands the parent
/// builder back.
#[derive(Debug)]
pub struct FieldFilter<B> {
    builder: B,
    name: String,
    conjunction: Conjunction,
    negated: bool,
}

impl<B: Conditional> FieldFilter<B> {
    fn new(builder: B, name: String, conjunction: Conjunction) -> Self {
        Self {
            builder,
            name,
            conjunction,
            negated: false,
        }
    }

    /// Negate the condition produced by the next operator call
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    fn finish(self, condition: Condition) -> B {
        let condition = if self.negated {
            condition.negate()
        } else {
            condition
        };
        self.builder.attach(condition, self.conjunction)
    }

    fn field(&self, value: impl Into<Value>) -> Field {
        Field::new(self.name.clone(), value)
    }

    pub fn eq(self, value: impl Into<Value>) -> B {
        let condition = Condition::eq(self.field(value));
        self.finish(condition)
    }

    pub fn gt(self, value: impl Into<Value>) -> B {
        let condition = Condition::gt(self.field(value));
        self.finish(condition)
    }

    pub fn gte(self, value: impl Into<Value>) -> B {
        let condition = Condition::gte(self.field(value));
        self.finish(condition)
    }

    pub fn lt(self, value: impl Into<Value>) -> B {
        let condition = Condition::lt(self.field(value));
        self.finish(condition)
    }

    pub fn lte(self, value: impl Into<Value>) -> B {
        let condition = Condition::lte(self.field(value));
        self.finish(condition)
    }

    pub fn like(self, value: impl Into<Value>) -> B {
        let condition = Condition::like(self.field(value));
        self.finish(condition)
    }

    pub fn in_<I, T>(self, values: I) -> B
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let condition = Condition::in_list(self.name.clone(), values);
        self.finish(condition)
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> B {
        let condition = Condition::between_pair(self.name.clone(), low.into(), high.into());
        self.finish(condition)
    }
}

/// Builder step returned by `order_by`
#[derive(Debug)]
pub struct OrderBy {
    builder: QueryBuilder,
    name: String,
}

impl OrderBy {
    pub fn asc(mut self) -> QueryBuilder {
        self.builder.sorts.push(Sort::asc(self.name));
        self.builder
    }

    pub fn desc(mut self) -> QueryBuilder {
        self.builder.sorts.push(Sort::desc(self.name));
        self.builder
    }
}

// ============================================================================
// Select
// ============================================================================

/// A finished select query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    entity_name: String,
    condition: Option<Condition>,
    sorts: Vec<Sort>,
    /// Number of entities to skip; 0 means none
    skip: u64,
    /// Maximum number of entities; `None` means unbounded, `Some(0)` means none
    limit: Option<u64>,
    fields: Vec<String>,
}

impl Query {
    /// Start a query over an entity
    pub fn builder(entity_name: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(entity_name.into())
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Projected fields; empty means all
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Copy of this query with its window replaced by the pagination's
    pub fn with_pagination(&self, pagination: &Pagination) -> Query {
        Query {
            skip: pagination.skip(),
            limit: Some(pagination.limit()),
            ..self.clone()
        }
    }

    /// Copy of this query with extra sorts appended
    pub fn with_sorts(&self, sorts: impl IntoIterator<Item = Sort>) -> Query {
        let mut query = self.clone();
        query.sorts.extend(sorts);
        query
    }

    /// Copy of this query with every placeholder resolved
    pub fn resolve(&self) -> crate::Result<Query> {
        Ok(Query {
            condition: self.condition.as_ref().map(Condition::resolve).transpose()?,
            ..self.clone()
        })
    }

    pub fn has_params(&self) -> bool {
        self.condition.as_ref().is_some_and(Condition::has_params)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fields.is_empty() {
            write!(f, "select * from {}", self.entity_name)?;
        } else {
            write!(f, "select {} from {}", self.fields.join(", "), self.entity_name)?;
        }
        if let Some(condition) = &self.condition {
            write!(f, " where {}", condition)?;
        }
        if self.skip > 0 {
            write!(f, " skip {}", self.skip)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " limit {}", limit)?;
        }
        if !self.sorts.is_empty() {
            let sorts: Vec<String> = self.sorts.iter().map(|s| s.to_string()).collect();
            write!(f, " order by {}", sorts.join(", "))?;
        }
        Ok(())
    }
}

/// Accumulates select query state before `build`
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    entity_name: String,
    condition: Option<Condition>,
    sorts: Vec<Sort>,
    skip: u64,
    limit: Option<u64>,
    fields: Vec<String>,
}

impl QueryBuilder {
    fn new(entity_name: String) -> Self {
        Self {
            entity_name,
            condition: None,
            sorts: Vec::new(),
            skip: 0,
            limit: None,
            fields: Vec::new(),
        }
    }

    /// Project only these fields
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Start the where clause on a field
    pub fn where_(self, name: impl Into<String>) -> FieldFilter<Self> {
        FieldFilter::new(self, name.into(), Conjunction::Where)
    }

    /// AND a condition on a field with the current condition
    pub fn and(self, name: impl Into<String>) -> FieldFilter<Self> {
        FieldFilter::new(self, name.into(), Conjunction::And)
    }

    /// OR a condition on a field with the current condition
    pub fn or(self, name: impl Into<String>) -> FieldFilter<Self> {
        FieldFilter::new(self, name.into(), Conjunction::Or)
    }

    /// Set a prebuilt condition, replacing any current one
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn order_by(self, name: impl Into<String>) -> OrderBy {
        OrderBy {
            builder: self,
            name: name.into(),
        }
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Freeze into an immutable query
    pub fn build(self) -> Query {
        Query {
            entity_name: self.entity_name,
            condition: self.condition,
            sorts: self.sorts,
            skip: self.skip,
            limit: self.limit,
            fields: self.fields,
        }
    }

    /// Build with the pagination window, overriding any skip/limit set before
    pub fn build_paged(self, pagination: &Pagination) -> Query {
        self.skip(pagination.skip())
            .limit(pagination.limit())
            .build()
    }
}

impl Conditional for QueryBuilder {
    fn attach(mut self, condition: Condition, conjunction: Conjunction) -> Self {
        self.condition = compose(self.condition.take(), condition, conjunction);
        self
    }
}

// ============================================================================
// Delete
// ============================================================================

/// A finished delete query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteQuery {
    entity_name: String,
    condition: Option<Condition>,
    fields: Vec<String>,
}

impl DeleteQuery {
    pub fn builder(entity_name: impl Into<String>) -> DeleteQueryBuilder {
        DeleteQueryBuilder {
            entity_name: entity_name.into(),
            condition: None,
            fields: Vec::new(),
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Fields to remove; empty means the whole entity
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn resolve(&self) -> crate::Result<DeleteQuery> {
        Ok(DeleteQuery {
            condition: self.condition.as_ref().map(Condition::resolve).transpose()?,
            ..self.clone()
        })
    }

    pub fn has_params(&self) -> bool {
        self.condition.as_ref().is_some_and(Condition::has_params)
    }
}

impl fmt::Display for DeleteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delete ")?;
        if !self.fields.is_empty() {
            write!(f, "{} ", self.fields.join(", "))?;
        }
        write!(f, "from {}", self.entity_name)?;
        if let Some(condition) = &self.condition {
            write!(f, " where {}", condition)?;
        }
        Ok(())
    }
}

/// Accumulates delete query state before `build`
#[derive(Debug, Clone)]
pub struct DeleteQueryBuilder {
    entity_name: String,
    condition: Option<Condition>,
    fields: Vec<String>,
}

impl DeleteQueryBuilder {
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn where_(self, name: impl Into<String>) -> FieldFilter<Self> {
        FieldFilter::new(self, name.into(), Conjunction::Where)
    }

    pub fn and(self, name: impl Into<String>) -> FieldFilter<Self> {
        FieldFilter::new(self, name.into(), Conjunction::And)
    }

    pub fn or(self, name: impl Into<String>) -> FieldFilter<Self> {
        FieldFilter::new(self, name.into(), Conjunction::Or)
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn build(self) -> DeleteQuery {
        DeleteQuery {
            entity_name: self.entity_name,
            condition: self.condition,
            fields: self.fields,
        }
    }
}

impl Conditional for DeleteQueryBuilder {
    fn attach(mut self, condition: Condition, conjunction: Conjunction) -> Self {
        self.condition = compose(self.condition.take(), condition, conjunction);
        self
    }
}

// ============================================================================
// Insert / Update
// ============================================================================

/// Values written by an insert or update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Payload {
    /// `field = value` pairs, an EQUALS condition or an AND of them
    Fields(Condition),
    /// A JSON object consumed verbatim
    Json(serde_json::Value),
}

impl Payload {
    /// The assigned fields, in the order they were written
    pub fn fields(&self) -> Vec<&Field> {
        match self {
            Payload::Fields(condition) => match condition.operands() {
                Some(operands) => operands.iter().map(Condition::field).collect(),
                None => vec![condition.field()],
            },
            Payload::Json(_) => Vec::new(),
        }
    }

    /// Render as a JSON object; placeholders must be bound
    pub fn to_json(&self) -> crate::Result<serde_json::Value> {
        match self {
            Payload::Json(json) => Ok(json.clone()),
            Payload::Fields(_) => {
                let mut object = serde_json::Map::new();
                for field in self.fields() {
                    object.insert(field.name.clone(), field.value.to_json()?);
                }
                Ok(serde_json::Value::Object(object))
            }
        }
    }

    fn resolve(&self) -> crate::Result<Payload> {
        match self {
            Payload::Fields(condition) => Ok(Payload::Fields(condition.resolve()?)),
            Payload::Json(json) => Ok(Payload::Json(json.clone())),
        }
    }

    fn has_params(&self) -> bool {
        match self {
            Payload::Fields(condition) => condition.has_params(),
            Payload::Json(_) => false,
        }
    }
}

/// A finished insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertQuery {
    pub entity_name: String,
    pub values: Payload,
    /// Time to live of the inserted entity
    pub ttl: Option<Duration>,
}

impl InsertQuery {
    pub fn resolve(&self) -> crate::Result<InsertQuery> {
        Ok(InsertQuery {
            values: self.values.resolve()?,
            ..self.clone()
        })
    }

    pub fn has_params(&self) -> bool {
        self.values.has_params()
    }
}

/// A finished update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateQuery {
    pub entity_name: String,
    pub values: Payload,
}

impl UpdateQuery {
    pub fn resolve(&self) -> crate::Result<UpdateQuery> {
        Ok(UpdateQuery {
            values: self.values.resolve()?,
            ..self.clone()
        })
    }

    pub fn has_params(&self) -> bool {
        self.values.has_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;

    #[test]
    fn test_builder_without_condition() {
        let query = Query::builder("God").build();

        assert_eq!(query.entity_name(), "God");
        assert!(query.condition().is_none());
        assert_eq!(query.skip(), 0);
        assert_eq!(query.limit(), None);
        assert!(query.sorts().is_empty());
    }

    #[test]
    fn test_where_eq() {
        let query = Query::builder("God").where_("name").eq("Diana").build();

        let condition = query.condition().unwrap();
        assert_eq!(condition, &Condition::eq(Field::new("name", "Diana")));
    }

    #[test]
    fn test_where_and_flattens() {
        let query = Query::builder("God")
            .where_("name")
            .eq("Diana")
            .and("age")
            .gt(10)
            .and("power")
            .lte(5)
            .build();

        let condition = query.condition().unwrap();
        assert_eq!(condition.operator(), Operator::And);
        let operands = condition.operands().unwrap();
        assert_eq!(operands.len(), 3);
        assert_eq!(operands[1], Condition::gt(Field::new("age", 10)));
    }

    #[test]
    fn test_where_and_then_or_wraps() {
        let query = Query::builder("God")
            .where_("a")
            .eq(1)
            .and("b")
            .eq(2)
            .or("c")
            .eq(3)
            .build();

        let condition = query.condition().unwrap();
        assert_eq!(condition.operator(), Operator::Or);
        let operands = condition.operands().unwrap();
        assert_eq!(operands[0].operator(), Operator::And);
        assert_eq!(operands[1], Condition::eq(Field::new("c", 3)));
    }

    #[test]
    fn test_not_in_between() {
        let query = Query::builder("God")
            .where_("age")
            .not()
            .between(10, 20)
            .and("name")
            .in_(["Diana", "Apollo"])
            .build();

        let operands = query.condition().unwrap().operands().unwrap();
        assert_eq!(operands[0].operator(), Operator::Not);
        assert_eq!(
            operands[0].negated().unwrap().value(),
            &Value::from(vec![10, 20])
        );
        assert_eq!(operands[1].operator(), Operator::In);
    }

    #[test]
    fn test_order_by_skip_limit() {
        let query = Query::builder("God")
            .order_by("name")
            .asc()
            .order_by("age")
            .desc()
            .skip(5)
            .limit(10)
            .build();

        assert_eq!(query.sorts(), &[Sort::asc("name"), Sort::desc("age")]);
        assert_eq!(query.skip(), 5);
        assert_eq!(query.limit(), Some(10));
    }

    #[test]
    fn test_zero_limit_is_not_unbounded() {
        let query = Query::builder("God").limit(0).build();
        assert_eq!(query.limit(), Some(0));
    }

    #[test]
    fn test_build_paged_overrides_window() {
        let pagination = Pagination::new(3, 10).unwrap();
        let query = Query::builder("God")
            .skip(1)
            .limit(2)
            .build_paged(&pagination);

        assert_eq!(query.skip(), 20);
        assert_eq!(query.limit(), Some(10));
    }

    #[test]
    fn test_query_display() {
        let query = Query::builder("God")
            .fields(["name"])
            .where_("age")
            .gt(10)
            .order_by("name")
            .desc()
            .limit(5)
            .build();

        assert_eq!(
            query.to_string(),
            "select name from God where age > 10 limit 5 order by name desc"
        );
    }

    #[test]
    fn test_delete_builder() {
        let query = DeleteQuery::builder("God")
            .fields(["age"])
            .where_("name")
            .eq("Diana")
            .or("name")
            .like("Apo%")
            .build();

        assert_eq!(query.entity_name(), "God");
        assert_eq!(query.fields(), &["age".to_string()]);
        assert_eq!(query.condition().unwrap().operator(), Operator::Or);
        assert_eq!(
            query.to_string(),
            "delete age from God where (name = \"Diana\") OR (name LIKE \"Apo%\")"
        );
    }

    #[test]
    fn test_payload_fields_and_json() {
        let payload = Payload::Fields(
            Condition::eq(Field::new("name", "Diana")).and(Condition::eq(Field::new("age", 10))),
        );
        let names: Vec<&str> = payload.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "age"]);
        assert_eq!(
            payload.to_json().unwrap(),
            serde_json::json!({"name": "Diana", "age": 10})
        );
    }

    #[test]
    fn test_query_serialization() {
        let query = Query::builder("God").where_("name").eq("Diana").build();
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["entity_name"], "God");

        let back: Query = serde_json::from_value(json).unwrap();
        assert_eq!(back, query);
    }
}
