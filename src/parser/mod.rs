//! String query parsing
//!
//! Parses `select`, `delete`, `insert` and `update` statements into a
//! [`Statement`]. The grammar lives in `query.pest`; this module walks the
//! resulting pairs into the [`ast`] types. Parsing is stateless.
//!
//! ```text
//! select name, age from God where age > 10 and name like "D%" skip 2 limit 5 order by name desc
//! delete from God where name in ("Diana", "Apollo")
//! insert God (name = "Diana", address = {"city": "Rome"}) 10 day
//! update God (name = @name)
//! ```

pub mod ast;

use std::time::Duration;

use pest::Parser;
use pest_derive::Parser;

use crate::condition::Operator;
use crate::error::{QueryError, Result};
use crate::query::{Direction, Sort};
use crate::types::{FieldType, Value};

pub use ast::{
    Assignments, DeleteStatement, InsertStatement, QueryValue, SelectStatement, Statement,
    UpdateStatement, WhereCondition,
};

#[derive(Parser)]
#[grammar = "parser/query.pest"]
struct QueryGrammar;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

/// Something that turns query text into a statement
pub trait StatementParser: Send + Sync {
    fn parse(&self, query: &str) -> Result<Statement>;
}

/// Parser for the string query language
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParser;

impl QueryParser {
    pub fn new() -> Self {
        Self
    }
}

impl StatementParser for QueryParser {
    fn parse(&self, query: &str) -> Result<Statement> {
        let pairs = QueryGrammar::parse(Rule::query, query)
            .map_err(|e| QueryError::query(format!("Parse error: {}", e)))?;

        for pair in pairs {
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::select_stmt => return select(inner).map(Statement::Select),
                    Rule::delete_stmt => return delete(inner).map(Statement::Delete),
                    Rule::insert_stmt => return insert(inner).map(Statement::Insert),
                    Rule::update_stmt => return update(inner).map(Statement::Update),
                    Rule::EOI => {}
                    _ => return Err(unexpected(&inner)),
                }
            }
        }
        Err(QueryError::query(
            "Expected 'select', 'delete', 'insert' or 'update'",
        ))
    }
}

/// Parse a query string
pub fn parse(query: &str) -> Result<Statement> {
    QueryParser.parse(query)
}

// ==================== Pair helpers ====================

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_select
            | Rule::kw_delete
            | Rule::kw_insert
            | Rule::kw_update
            | Rule::kw_from
            | Rule::kw_where
            | Rule::kw_skip
            | Rule::kw_limit
            | Rule::kw_order
            | Rule::kw_by
            | Rule::kw_asc
            | Rule::kw_desc
            | Rule::kw_and
            | Rule::kw_or
            | Rule::kw_not
            | Rule::kw_like
            | Rule::kw_between
            | Rule::kw_in
            | Rule::kw_convert
    )
}

/// Inner pairs without the keywords that introduced them
fn children(pair: Pair<'_>) -> impl Iterator<Item = Pair<'_>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn next<'i>(parts: &mut impl Iterator<Item = Pair<'i>>, what: &str) -> Result<Pair<'i>> {
    parts
        .next()
        .ok_or_else(|| QueryError::query(format!("Expected {}", what)))
}

fn unexpected(pair: &Pair<'_>) -> QueryError {
    let (line, col) = pair.line_col();
    QueryError::query(format!(
        "Unexpected {:?} '{}' at line {}, column {}",
        pair.as_rule(),
        pair.as_str(),
        line,
        col
    ))
}

fn duplicate(clause: &str) -> QueryError {
    QueryError::query(format!("Duplicate '{}' clause", clause))
}

fn name(pair: Pair<'_>) -> String {
    pair.as_str().to_string()
}

fn unsigned(pair: Pair<'_>) -> Result<u64> {
    let text = pair.as_str();
    text.parse::<u64>()
        .map_err(|e| QueryError::query(format!("Invalid count '{}': {}", text, e)))
}

// ==================== Statements ====================

fn select(pair: Pair<'_>) -> Result<SelectStatement> {
    let mut statement = SelectStatement {
        entity: String::new(),
        fields: Vec::new(),
        condition: None,
        sorts: Vec::new(),
        skip: None,
        limit: None,
    };

    for part in children(pair) {
        match part.as_rule() {
            Rule::field_list => statement.fields = part.into_inner().map(name).collect(),
            Rule::ident => statement.entity = name(part),
            Rule::where_clause => {
                if statement.condition.is_some() {
                    return Err(duplicate("where"));
                }
                statement.condition = Some(where_clause(part)?);
            }
            Rule::skip_clause => {
                if statement.skip.is_some() {
                    return Err(duplicate("skip"));
                }
                statement.skip = Some(unsigned(next(&mut children(part), "a skip count")?)?);
            }
            Rule::limit_clause => {
                if statement.limit.is_some() {
                    return Err(duplicate("limit"));
                }
                statement.limit = Some(unsigned(next(&mut children(part), "a limit")?)?);
            }
            Rule::order_clause => {
                if !statement.sorts.is_empty() {
                    return Err(duplicate("order by"));
                }
                statement.sorts = children(part).map(sort).collect();
            }
            _ => return Err(unexpected(&part)),
        }
    }
    Ok(statement)
}

fn sort(pair: Pair<'_>) -> Sort {
    let mut parts = pair.into_inner();
    let field = parts.next().map(name).unwrap_or_default();
    let direction = match parts.next() {
        Some(direction) if direction.as_str().eq_ignore_ascii_case("desc") => Direction::Desc,
        _ => Direction::Asc,
    };
    Sort::new(field, direction)
}

fn delete(pair: Pair<'_>) -> Result<DeleteStatement> {
    let mut statement = DeleteStatement {
        entity: String::new(),
        fields: Vec::new(),
        condition: None,
    };
    for part in children(pair) {
        match part.as_rule() {
            Rule::field_list => statement.fields = part.into_inner().map(name).collect(),
            Rule::ident => statement.entity = name(part),
            Rule::where_clause => statement.condition = Some(where_clause(part)?),
            _ => return Err(unexpected(&part)),
        }
    }
    Ok(statement)
}

fn insert(pair: Pair<'_>) -> Result<InsertStatement> {
    let mut parts = children(pair);
    let entity = name(next(&mut parts, "an entity name")?);
    let values = assignments(next(&mut parts, "values")?)?;
    let ttl = parts.next().map(ttl).transpose()?;
    Ok(InsertStatement {
        entity,
        values,
        ttl,
    })
}

fn update(pair: Pair<'_>) -> Result<UpdateStatement> {
    let mut parts = children(pair);
    let entity = name(next(&mut parts, "an entity name")?);
    let values = assignments(next(&mut parts, "values")?)?;
    Ok(UpdateStatement { entity, values })
}

fn assignments(pair: Pair<'_>) -> Result<Assignments> {
    match pair.as_rule() {
        Rule::json_object => Ok(Assignments::Json(serde_json::from_str(pair.as_str())?)),
        Rule::field_assignments => {
            let mut fields = Vec::new();
            for assignment in pair.into_inner() {
                let mut parts = assignment.into_inner();
                let field = name(next(&mut parts, "a field name")?);
                fields.push((field, value(next(&mut parts, "a value")?)?));
            }
            Ok(Assignments::Fields(fields))
        }
        _ => Err(unexpected(&pair)),
    }
}

fn ttl(pair: Pair<'_>) -> Result<Duration> {
    let mut parts = pair.into_inner();
    let amount = unsigned(next(&mut parts, "a TTL")?)?;
    let unit = next(&mut parts, "a TTL unit")?.as_str().to_lowercase();
    let unit = unit.strip_suffix('s').unwrap_or(&unit);
    let duration = match unit {
        "day" => Duration::from_secs(amount.saturating_mul(86_400)),
        "hour" => Duration::from_secs(amount.saturating_mul(3_600)),
        "minute" => Duration::from_secs(amount.saturating_mul(60)),
        "second" => Duration::from_secs(amount),
        "millisecond" => Duration::from_millis(amount),
        "nanosecond" => Duration::from_nanos(amount),
        other => {
            return Err(QueryError::query(format!(
                "Unknown TTL unit '{}'; expected day, hour, minute, second, millisecond or nanosecond",
                other
            )));
        }
    };
    Ok(duration)
}

// ==================== Conditions ====================

fn where_clause(pair: Pair<'_>) -> Result<WhereCondition> {
    condition(next(&mut children(pair), "a condition")?)
}

fn condition(pair: Pair<'_>) -> Result<WhereCondition> {
    let mut parts = pair.into_inner();
    let mut left = unary(next(&mut parts, "a condition")?)?;
    while let Some(op) = parts.next() {
        let right = Box::new(unary(next(&mut parts, "a condition")?)?);
        left = if op.as_str().eq_ignore_ascii_case("and") {
            WhereCondition::And(Box::new(left), right)
        } else {
            WhereCondition::Or(Box::new(left), right)
        };
    }
    Ok(left)
}

fn unary(pair: Pair<'_>) -> Result<WhereCondition> {
    match pair.as_rule() {
        Rule::condition => condition(pair),
        Rule::negation => {
            let inner = unary(next(&mut children(pair), "a condition")?)?;
            Ok(WhereCondition::Not(Box::new(inner)))
        }
        Rule::comparison => {
            let mut parts = pair.into_inner();
            let field = name(next(&mut parts, "a field name")?);
            let operator = compare_operator(&next(&mut parts, "an operator")?)?;
            let value = value(next(&mut parts, "a value")?)?;
            Ok(WhereCondition::Compare {
                field,
                operator,
                value,
            })
        }
        Rule::between => {
            let mut parts = children(pair);
            let field = name(next(&mut parts, "a field name")?);
            let low = value(next(&mut parts, "a lower bound")?)?;
            let high = value(next(&mut parts, "an upper bound")?)?;
            Ok(WhereCondition::Between { field, low, high })
        }
        Rule::membership => {
            let mut parts = children(pair);
            let field = name(next(&mut parts, "a field name")?);
            let value = value(next(&mut parts, "a list of values")?)?;
            Ok(WhereCondition::In { field, value })
        }
        _ => Err(unexpected(&pair)),
    }
}

fn compare_operator(pair: &Pair<'_>) -> Result<Operator> {
    match pair.as_str() {
        "=" => Ok(Operator::Equals),
        ">" => Ok(Operator::GreaterThan),
        ">=" => Ok(Operator::GreaterEqualsThan),
        "<" => Ok(Operator::LesserThan),
        "<=" => Ok(Operator::LesserEqualsThan),
        op if op.eq_ignore_ascii_case("like") => Ok(Operator::Like),
        _ => Err(unexpected(pair)),
    }
}

// ==================== Values ====================

fn value(pair: Pair<'_>) -> Result<QueryValue> {
    let value = match pair.as_rule() {
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
            Value::String(unescape(raw))
        }
        Rule::number => number(pair.as_str())?,
        Rule::boolean => Value::Bool(pair.as_str().eq_ignore_ascii_case("true")),
        Rule::null_value => Value::Null,
        Rule::param => {
            let text = pair.as_str();
            return Ok(QueryValue::Param(text.strip_prefix('@').unwrap_or(text).to_string()));
        }
        Rule::json_object => return Ok(QueryValue::Json(serde_json::from_str(pair.as_str())?)),
        Rule::array | Rule::in_list => {
            let items = pair.into_inner().map(value).collect::<Result<Vec<_>>>()?;
            return Ok(QueryValue::Array(items));
        }
        Rule::convert => return convert(pair),
        _ => return Err(unexpected(&pair)),
    };
    Ok(QueryValue::Literal(value))
}

fn convert(pair: Pair<'_>) -> Result<QueryValue> {
    let mut parts = children(pair);
    let inner = value(next(&mut parts, "a value")?)?;
    let type_name = next(&mut parts, "a type name")?;
    let to = FieldType::from_name(type_name.as_str()).ok_or_else(|| {
        QueryError::query(format!("Unknown type '{}' in convert", type_name.as_str()))
    })?;
    Ok(QueryValue::Convert {
        value: Box::new(inner),
        to,
    })
}

fn number(text: &str) -> Result<Value> {
    let invalid = |e: &dyn std::fmt::Display| {
        QueryError::query(format!("Invalid number '{}': {}", text, e))
    };
    if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().map(Value::Float).map_err(|e| invalid(&e))
    } else {
        text.parse::<i64>().map(Value::Int).map_err(|e| invalid(&e))
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(query: &str) -> SelectStatement {
        match parse(query).unwrap() {
            Statement::Select(s) => s,
            other => panic!("Expected select, got {:?}", other),
        }
    }

    fn lit(value: impl Into<Value>) -> QueryValue {
        QueryValue::Literal(value.into())
    }

    // ==================== Select ====================

    #[test]
    fn test_select_all() {
        let s = select("select * from God");
        assert_eq!(s.entity, "God");
        assert!(s.fields.is_empty());
        assert!(s.condition.is_none());
        assert_eq!(s.skip, None);
        assert_eq!(s.limit, None);
    }

    #[test]
    fn test_select_fields_and_clauses() {
        let s = select("SELECT name, age FROM God WHERE age > 10 SKIP 2 LIMIT 5 ORDER BY name DESC, age");
        assert_eq!(s.fields, vec!["name", "age"]);
        assert_eq!(s.skip, Some(2));
        assert_eq!(s.limit, Some(5));
        assert_eq!(s.sorts, vec![Sort::desc("name"), Sort::asc("age")]);
        assert_eq!(
            s.condition,
            Some(WhereCondition::Compare {
                field: "age".into(),
                operator: Operator::GreaterThan,
                value: lit(10),
            })
        );
    }

    #[test]
    fn test_clauses_in_any_order() {
        let s = select("select * from God order by name limit 3 skip 1");
        assert_eq!(s.limit, Some(3));
        assert_eq!(s.skip, Some(1));
        assert!(parse("select * from God limit 1 limit 2").is_err());
    }

    #[test]
    fn test_and_or_fold_left_to_right() {
        let s = select("select * from God where a = 1 and b = 2 or c = 3");
        match s.condition.unwrap() {
            WhereCondition::Or(left, right) => {
                assert!(matches!(*left, WhereCondition::And(_, _)));
                assert!(matches!(*right, WhereCondition::Compare { .. }));
            }
            other => panic!("Expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_not_and_grouping() {
        let s = select("select * from God where not (a = 1 or b = 2)");
        match s.condition.unwrap() {
            WhereCondition::Not(inner) => assert!(matches!(*inner, WhereCondition::Or(_, _))),
            other => panic!("Expected Not, got {:?}", other),
        }
    }

    #[test]
    fn test_between_in_like() {
        let s = select(
            "select * from God where age between 10 and 30 and name in (\"Diana\", 'Apollo') and name like \"D%\"",
        );
        let WhereCondition::And(left, like) = s.condition.unwrap() else {
            panic!("Expected And");
        };
        let WhereCondition::And(between, in_) = *left else {
            panic!("Expected And");
        };
        assert_eq!(
            *between,
            WhereCondition::Between {
                field: "age".into(),
                low: lit(10),
                high: lit(30)
            }
        );
        assert_eq!(
            *in_,
            WhereCondition::In {
                field: "name".into(),
                value: QueryValue::Array(vec![lit("Diana"), lit("Apollo")])
            }
        );
        assert!(matches!(
            *like,
            WhereCondition::Compare { operator: Operator::Like, .. }
        ));
    }

    #[test]
    fn test_in_param_and_arrays() {
        let s = select("select * from God where name in @names");
        assert_eq!(
            s.condition,
            Some(WhereCondition::In {
                field: "name".into(),
                value: QueryValue::Param("names".into())
            })
        );

        let s = select("select * from God where age in {1, 2}");
        assert_eq!(
            s.condition,
            Some(WhereCondition::In {
                field: "age".into(),
                value: QueryValue::Array(vec![lit(1), lit(2)])
            })
        );
        assert!(parse("select * from God where age in 3").is_err());
    }

    // ==================== Insert / Update ====================

    #[test]
    fn test_insert_with_ttl() {
        let statement = parse("insert God (name = \"Diana\") 10 day").unwrap();
        let Statement::Insert(insert) = statement else {
            panic!("Expected insert");
        };
        assert_eq!(insert.entity, "God");
        assert_eq!(
            insert.values,
            Assignments::Fields(vec![("name".into(), lit("Diana"))])
        );
        assert_eq!(insert.ttl, Some(Duration::from_secs(10 * 86_400)));
    }

    #[test]
    fn test_ttl_units() {
        let cases = [
            ("2 hours", Duration::from_secs(7_200)),
            ("3 minute", Duration::from_secs(180)),
            ("4 seconds", Duration::from_secs(4)),
            ("5 millisecond", Duration::from_millis(5)),
            ("6 nanoseconds", Duration::from_nanos(6)),
        ];
        for (suffix, expected) in cases {
            let Statement::Insert(insert) = parse(&format!("insert God (a = 1) {}", suffix)).unwrap()
            else {
                panic!("Expected insert");
            };
            assert_eq!(insert.ttl, Some(expected));
        }
        assert!(parse("insert God (a = 1) 10 weeks").is_err());
    }

    #[test]
    fn test_insert_json_literals() {
        let Statement::Insert(insert) =
            parse(r#"insert God (name = "Diana", address = {"city": "Rome", "zip": [1, 2]})"#).unwrap()
        else {
            panic!("Expected insert");
        };
        let Assignments::Fields(fields) = insert.values else {
            panic!("Expected fields");
        };
        assert_eq!(
            fields[1].1,
            QueryValue::Json(serde_json::json!({"city": "Rome", "zip": [1, 2]}))
        );

        let Statement::Insert(insert) = parse(r#"insert God {"name": "Diana"} 1 second"#).unwrap()
        else {
            panic!("Expected insert");
        };
        assert_eq!(
            insert.values,
            Assignments::Json(serde_json::json!({"name": "Diana"}))
        );
        assert_eq!(insert.ttl, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_update_with_param_and_convert() {
        let Statement::Update(update) =
            parse("update God (age = convert(\"20\", integer), name = @name, ok = true)").unwrap()
        else {
            panic!("Expected update");
        };
        let Assignments::Fields(fields) = update.values else {
            panic!("Expected fields");
        };
        assert_eq!(
            fields[0].1,
            QueryValue::Convert {
                value: Box::new(lit("20")),
                to: FieldType::Integer
            }
        );
        assert_eq!(fields[1].1, QueryValue::Param("name".into()));
        assert_eq!(fields[2].1, lit(true));
    }

    // ==================== Delete ====================

    #[test]
    fn test_delete() {
        let Statement::Delete(delete) = parse("delete age, power from God where name = @name").unwrap()
        else {
            panic!("Expected delete");
        };
        assert_eq!(delete.fields, vec!["age", "power"]);
        assert!(delete.condition.is_some());

        let Statement::Delete(delete) = parse("delete from God").unwrap() else {
            panic!("Expected delete");
        };
        assert!(delete.fields.is_empty());
        assert!(delete.condition.is_none());
    }

    // ==================== Errors ====================

    #[test]
    fn test_malformed_queries() {
        for query in [
            "",
            "drop God",
            "select from God",
            "select * God",
            "select * from God where",
            "select * from God where age >",
            "select * from God where age ! 3",
            "select * from God skip -1",
            "insert God ()",
            "insert God (name = )",
            "update God [1]",
            "select * from God extra",
            "insert God (a = unknown(1))",
            "insert God (a = convert(1, widget))",
        ] {
            let err = parse(query).unwrap_err();
            assert!(
                matches!(err, QueryError::Query(_)),
                "expected query error for {:?}, got {:?}",
                query,
                err
            );
        }
    }

    #[test]
    fn test_malformed_json() {
        let err = parse(r#"insert God {"name": }"#).unwrap_err();
        assert!(matches!(err, QueryError::Query(_)));

        // well-formed to the grammar but not to serde_json
        let err = parse(r#"insert God {"name": "\q"}"#).unwrap_err();
        assert!(matches!(err, QueryError::Json(_)));
    }

    #[test]
    fn test_exponent_numbers() {
        let s = select("select * from God where age > 1.5e3 and power < -2E-2 and rank = 3e2");
        let WhereCondition::And(left, rank) = s.condition.unwrap() else {
            panic!("Expected And");
        };
        let WhereCondition::And(age, power) = *left else {
            panic!("Expected And");
        };
        assert!(matches!(*age, WhereCondition::Compare { ref value, .. } if *value == lit(1500.0)));
        assert!(matches!(*power, WhereCondition::Compare { ref value, .. } if *value == lit(-0.02)));
        assert!(matches!(*rank, WhereCondition::Compare { ref value, .. } if *value == lit(300.0)));
        assert!(parse("select * from God where age > 1e").is_err());
    }

    #[test]
    fn test_strings_and_escapes() {
        let s = select(r#"select * from God where name = 'it\'s' or name = "a\tb" or name = """#);
        let WhereCondition::Or(left, empty) = s.condition.unwrap() else {
            panic!("Expected Or");
        };
        let WhereCondition::Or(quoted, tabbed) = *left else {
            panic!("Expected Or");
        };
        assert!(matches!(*quoted, WhereCondition::Compare { ref value, .. } if *value == lit("it's")));
        assert!(matches!(*tabbed, WhereCondition::Compare { ref value, .. } if *value == lit("a\tb")));
        assert!(matches!(*empty, WhereCondition::Compare { ref value, .. } if *value == lit("")));
        assert!(parse("select * from God where name = \"open").is_err());
    }

    #[test]
    fn test_keywords_inside_names() {
        let s = select("select fromage, notes from Order where index = 1 order by ordinal desc");
        assert_eq!(s.fields, vec!["fromage", "notes"]);
        assert_eq!(s.entity, "Order");
        assert_eq!(s.sorts, vec![Sort::desc("ordinal")]);
        assert!(matches!(
            s.condition,
            Some(WhereCondition::Compare { ref field, .. }) if field == "index"
        ));
    }
}
