//! Conversion of parsed statements into query objects
//!
//! Entity and field tokens go through a `QueryObserver`; every `@name` token
//! becomes a placeholder registered in a fresh `Params`, in reading order.

use crate::condition::{Condition, Field};
use crate::error::{QueryError, Result};
use crate::mapping::QueryObserver;
use crate::params::Params;
use crate::parser::{Assignments, QueryValue, Statement, WhereCondition};
use crate::query::{
    DeleteQuery, InsertQuery, Payload, Query, Sort, UpdateQuery,
};
use crate::types::Value;

/// A query object ready for a manager
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Select(Query),
    Delete(DeleteQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
}

impl Command {
    pub fn has_params(&self) -> bool {
        match self {
            Command::Select(q) => q.has_params(),
            Command::Delete(q) => q.has_params(),
            Command::Insert(q) => q.has_params(),
            Command::Update(q) => q.has_params(),
        }
    }

    /// Copy with every placeholder replaced by its bound value
    pub fn resolve(&self) -> Result<Command> {
        Ok(match self {
            Command::Select(q) => Command::Select(q.resolve()?),
            Command::Delete(q) => Command::Delete(q.resolve()?),
            Command::Insert(q) => Command::Insert(q.resolve()?),
            Command::Update(q) => Command::Update(q.resolve()?),
        })
    }

    pub fn entity_name(&self) -> &str {
        match self {
            Command::Select(q) => q.entity_name(),
            Command::Delete(q) => q.entity_name(),
            Command::Insert(q) => &q.entity_name,
            Command::Update(q) => &q.entity_name,
        }
    }
}

/// A converted statement and the placeholders it created
#[derive(Debug)]
pub struct ConvertedStatement {
    pub command: Command,
    pub params: Params,
}

/// Convert a parsed statement, resolving names through the observer
pub fn convert(statement: &Statement, observer: &dyn QueryObserver) -> Result<ConvertedStatement> {
    let mut converter = Converter {
        observer,
        entity: observer.fire_entity(statement.entity()),
        params: Params::new(),
    };
    let command = converter.command(statement)?;
    Ok(ConvertedStatement {
        command,
        params: converter.params,
    })
}

struct Converter<'o> {
    observer: &'o dyn QueryObserver,
    /// Resolved entity name
    entity: String,
    params: Params,
}

impl Converter<'_> {
    fn field_name(&self, token: &str) -> String {
        self.observer.fire_field(&self.entity, token)
    }

    fn command(&mut self, statement: &Statement) -> Result<Command> {
        match statement {
            Statement::Select(select) => {
                let mut builder = Query::builder(self.entity.clone()).fields(
                    select
                        .fields
                        .iter()
                        .map(|f| self.field_name(f))
                        .collect::<Vec<_>>(),
                );
                if let Some(condition) = &select.condition {
                    builder = builder.condition(self.condition(condition)?);
                }
                for sort in &select.sorts {
                    builder = builder.sort(Sort::new(self.field_name(&sort.name), sort.direction));
                }
                if let Some(skip) = select.skip {
                    builder = builder.skip(skip);
                }
                if let Some(limit) = select.limit {
                    builder = builder.limit(limit);
                }
                Ok(Command::Select(builder.build()))
            }
            Statement::Delete(delete) => {
                let mut builder = DeleteQuery::builder(self.entity.clone()).fields(
                    delete
                        .fields
                        .iter()
                        .map(|f| self.field_name(f))
                        .collect::<Vec<_>>(),
                );
                if let Some(condition) = &delete.condition {
                    builder = builder.condition(self.condition(condition)?);
                }
                Ok(Command::Delete(builder.build()))
            }
            Statement::Insert(insert) => Ok(Command::Insert(InsertQuery {
                entity_name: self.entity.clone(),
                values: self.payload(&insert.values)?,
                ttl: insert.ttl,
            })),
            Statement::Update(update) => Ok(Command::Update(UpdateQuery {
                entity_name: self.entity.clone(),
                values: self.payload(&update.values)?,
            })),
        }
    }

    /// Each `field = value` pair is an EQUALS condition, ANDed left to right
    fn payload(&mut self, assignments: &Assignments) -> Result<Payload> {
        match assignments {
            Assignments::Json(json) => Ok(Payload::Json(json.clone())),
            Assignments::Fields(fields) => {
                let mut combined: Option<Condition> = None;
                for (token, value) in fields {
                    let name = self.field_name(token);
                    let value = self.value(value, &name)?;
                    let condition = Condition::eq(Field::new(name, value));
                    combined = Some(match combined {
                        Some(existing) => existing.and(condition),
                        None => condition,
                    });
                }
                combined
                    .map(Payload::Fields)
                    .ok_or_else(|| QueryError::query("Expected at least one field assignment"))
            }
        }
    }

    fn condition(&mut self, condition: &WhereCondition) -> Result<Condition> {
        match condition {
            WhereCondition::Compare {
                field,
                operator,
                value,
            } => {
                let name = self.field_name(field);
                let value = self.value(value, &name)?;
                Condition::of(Field::new(name, value), *operator)
            }
            WhereCondition::In { field, value } => {
                let name = self.field_name(field);
                let value = self.value(value, &name)?;
                Condition::in_(Field::new(name, value))
            }
            WhereCondition::Between { field, low, high } => {
                let name = self.field_name(field);
                let low = self.value(low, &name)?;
                let high = self.value(high, &name)?;
                Condition::between(Field::new(name, Value::Array(vec![low, high])))
            }
            WhereCondition::Not(inner) => Ok(self.condition(inner)?.negate()),
            WhereCondition::And(left, right) => {
                let left = self.condition(left)?;
                Ok(left.and(self.condition(right)?))
            }
            WhereCondition::Or(left, right) => {
                let left = self.condition(left)?;
                Ok(left.or(self.condition(right)?))
            }
        }
    }

    fn value(&mut self, value: &QueryValue, field: &str) -> Result<Value> {
        match value {
            QueryValue::Literal(v) => Ok(v.clone()),
            QueryValue::Param(name) => {
                Ok(self
                    .params
                    .add_for_field(name, field, self.observer.mapping()))
            }
            QueryValue::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.value(item, field))
                    .collect::<Result<_>>()?,
            )),
            QueryValue::Json(json) => Ok(Value::Json(json.clone())),
            QueryValue::Convert { value, to } => match value.as_ref() {
                QueryValue::Param(name) => Ok(self
                    .params
                    .add_cast(name, field, self.observer.mapping(), *to)),
                other => {
                    let inner = self.value(other, field)?;
                    to.coerce(inner)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;
    use crate::mapping::{EntityMapping, FieldMapping, IdentityObserver, MappingObserver};
    use crate::parser::parse;
    use crate::types::FieldType;
    use std::time::Duration;

    fn convert_str(query: &str) -> ConvertedStatement {
        convert(&parse(query).unwrap(), &IdentityObserver).unwrap()
    }

    #[test]
    fn test_insert_with_ttl() {
        let converted = convert_str("insert God (name = \"Diana\") 10 day");
        let Command::Insert(insert) = converted.command else {
            panic!("Expected insert");
        };
        assert_eq!(insert.entity_name, "God");
        assert_eq!(
            insert.values,
            Payload::Fields(Condition::eq(Field::new("name", "Diana")))
        );
        assert_eq!(insert.ttl, Some(Duration::from_secs(10 * 86_400)));
        assert!(converted.params.is_empty());
    }

    #[test]
    fn test_insert_pairs_fold_with_and() {
        let converted = convert_str("insert God (name = \"Diana\", age = 10, power = 3)");
        let Command::Insert(insert) = converted.command else {
            panic!("Expected insert");
        };
        let Payload::Fields(condition) = insert.values else {
            panic!("Expected fields");
        };
        assert_eq!(condition.operator(), Operator::And);
        assert_eq!(
            condition.operands().unwrap(),
            &[
                Condition::eq(Field::new("name", "Diana")),
                Condition::eq(Field::new("age", 10)),
                Condition::eq(Field::new("power", 3)),
            ]
        );
    }

    #[test]
    fn test_insert_param_then_bind() {
        let converted = convert_str("insert God (age = @age)");
        assert_eq!(converted.params.names(), vec!["age"]);
        assert!(converted.command.has_params());

        converted.params.bind("age", 10).unwrap();
        let Command::Insert(insert) = converted.command.resolve().unwrap() else {
            panic!("Expected insert");
        };
        assert_eq!(
            insert.values,
            Payload::Fields(Condition::eq(Field::new("age", 10)))
        );
    }

    #[test]
    fn test_unbound_resolve_fails() {
        let converted = convert_str("select * from God where age = @age");
        let err = converted.command.resolve().unwrap_err();
        assert!(matches!(err, QueryError::UnboundParameter(_)));
    }

    #[test]
    fn test_select_conversion() {
        let converted = convert_str(
            "select name from God where age between 10 and 20 or not name = \"Ares\" skip 1 limit 2 order by age desc",
        );
        let Command::Select(query) = converted.command else {
            panic!("Expected select");
        };
        assert_eq!(query.fields(), &["name".to_string()]);
        assert_eq!(query.skip(), 1);
        assert_eq!(query.limit(), Some(2));
        assert_eq!(query.sorts(), &[Sort::desc("age")]);

        let condition = query.condition().unwrap();
        assert_eq!(condition.operator(), Operator::Or);
        let operands = condition.operands().unwrap();
        assert_eq!(operands[0].operator(), Operator::Between);
        assert_eq!(operands[1], Condition::eq(Field::new("name", "Ares")).negate());
    }

    #[test]
    fn test_between_params() {
        let converted = convert_str("select * from God where age between @low and @high");
        assert_eq!(converted.params.names(), vec!["low", "high"]);
        converted.params.bind("low", 1).unwrap();
        converted.params.bind("high", 9).unwrap();

        let resolved = converted.command.resolve().unwrap();
        let Command::Select(query) = resolved else {
            panic!("Expected select");
        };
        assert_eq!(
            query.condition().unwrap(),
            &Condition::between(Field::new("age", vec![1, 9])).unwrap()
        );
    }

    #[test]
    fn test_in_with_scalar_literal_is_rejected_by_algebra() {
        // `in` needs a list; a JSON object is not iterable
        let err = convert(
            &parse("select * from God where age in {}").unwrap(),
            &IdentityObserver,
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::IllegalArgument(_)));
    }

    #[test]
    fn test_observer_renames() {
        let mapping = EntityMapping::new("Person")
            .field(FieldMapping::new("id", FieldType::Integer).id())
            .field(FieldMapping::new("job.city", FieldType::String).named("city"));
        let observer = MappingObserver::new(&mapping);

        let converted = convert(
            &parse("select * from person where id = 1 and job.city = \"Rome\" order by id").unwrap(),
            &observer,
        )
        .unwrap();
        let Command::Select(query) = converted.command else {
            panic!("Expected select");
        };
        assert_eq!(query.entity_name(), "Person");
        let operands = query.condition().unwrap().operands().unwrap();
        assert_eq!(operands[0].name(), "_id");
        assert_eq!(operands[1].name(), "city");
        assert_eq!(query.sorts(), &[Sort::asc("_id")]);
    }

    #[test]
    fn test_convert_literal_and_param() {
        let converted = convert_str("update God (age = convert(\"20\", integer), rank = convert(@rank, integer))");
        converted.params.bind("rank", "7").unwrap();

        let Command::Update(update) = converted.command.resolve().unwrap() else {
            panic!("Expected update");
        };
        let fields = update.values.fields();
        assert_eq!(fields[0].value, Value::Int(20));
        assert_eq!(fields[1].value, Value::Int(7));
    }

    #[test]
    fn test_delete_conversion() {
        let converted = convert_str("delete from God where name = @name");
        let Command::Delete(delete) = &converted.command else {
            panic!("Expected delete");
        };
        assert_eq!(delete.entity_name(), "God");
        assert_eq!(converted.params.len(), 1);
    }
}
