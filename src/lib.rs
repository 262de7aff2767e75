//! # nosql-query
//!
//! Query core for mapping entities onto NoSQL stores.
//!
//! This crate builds driver-independent query objects: a condition algebra, a
//! fluent query builder, a small string query language with `@name`
//! placeholders, and queries derived from repository method names. Finished
//! queries are handed to a [`Manager`], which owns the actual data store.
//!
//! ## Features
//!
//! - **Condition Algebra**: EQUALS, comparisons, LIKE, IN, BETWEEN, AND/OR/NOT with flattening
//! - **Fluent Builder**: `where_`/`and`/`or`, ordering, skip/limit and pagination
//! - **String Queries**: `select`, `delete`, `insert` and `update` statements
//! - **Placeholders**: `@name` values bound by name or by position
//! - **Method Names**: `findByAgeGreaterThanOrderByNameDesc` style derivation
//! - **Query Cache**: parsed statements memoized by query text
//!
//! ## Quick Start
//!
//! ```rust
//! use nosql_query::{Condition, Field, Pagination, Query};
//!
//! let query = Query::builder("God")
//!     .where_("age").gt(10)
//!     .and("name").like("D%")
//!     .order_by("name").desc()
//!     .build_paged(&Pagination::new(2, 10)?);
//!
//! assert_eq!(query.skip(), 10);
//! assert_eq!(query.limit(), Some(10));
//!
//! let age = Condition::gt(Field::new("age", 10));
//! assert_eq!(query.condition().unwrap().operands().unwrap()[0], age);
//! # Ok::<(), nosql_query::QueryError>(())
//! ```
//!
//! ## String Queries
//!
//! ```rust
//! use nosql_query::{IdentityObserver, QueryRunner};
//!
//! let runner = QueryRunner::default();
//! let mut prepared = runner.prepare("select * from God where name = @name", &IdentityObserver)?;
//! prepared.bind("name", "Diana")?;
//! let command = prepared.command()?;
//! # Ok::<(), nosql_query::QueryError>(())
//! ```
//!
//! Running a query that still has placeholders through [`QueryRunner::execute`]
//! fails with [`QueryError::ParameterizedQuery`] before the manager is called.
//!
//! ## Configuration
//!
//! ```rust
//! use nosql_query::QueryConfig;
//!
//! let config = QueryConfig::builder()
//!     .cache_queries(true)  // Memoize parsed query text (default)
//!     .id_field("_id")      // Storage name for id properties (default)
//!     .build();
//! ```

pub mod cache;
pub mod condition;
pub mod config;
pub mod error;
pub mod mapping;
pub mod method;
pub mod pagination;
pub mod params;
pub mod parser;
pub mod query;
pub mod runner;
pub mod statement;
pub mod types;

// Re-export main types for convenience
pub use cache::QueryCache;
pub use condition::{Condition, Field, Operator};
pub use config::{QueryConfig, QueryConfigBuilder};
pub use error::{QueryError, Result};
pub use mapping::{
    ClassMapping, EntityMapping, FieldMapping, IdentityObserver, MappingObserver, QueryObserver,
    TypeConverter,
};
pub use method::{BoundArgs, MethodArg, ParamsBinder, RepositoryMethod, Subject};
pub use pagination::{PaginatedQuery, Pagination};
pub use params::{Param, Params};
pub use parser::{QueryParser, Statement, StatementParser, parse};
pub use query::{
    DeleteQuery, DeleteQueryBuilder, Direction, InsertQuery, Payload, Query, QueryBuilder, Sort,
    UpdateQuery,
};
pub use runner::{Manager, Outcome, PreparedStatement, QueryRunner};
pub use statement::{Command, ConvertedStatement, convert};
pub use types::{FieldType, Value};
