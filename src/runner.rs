//! Running queries against a manager
//!
//! A [`Manager`] executes finished query objects against a data store. The
//! [`QueryRunner`] turns query text into those objects and refuses to run text
//! with `@` placeholders outside of a [`PreparedStatement`].

use std::sync::Arc;

use tracing::debug;

use crate::cache::QueryCache;
use crate::config::QueryConfig;
use crate::error::{QueryError, Result};
use crate::mapping::{ClassMapping, QueryObserver};
use crate::method::{MethodArg, RepositoryMethod, Subject};
use crate::params::Params;
use crate::parser::{QueryParser, Statement, StatementParser};
use crate::query::{DeleteQuery, InsertQuery, Query, UpdateQuery};
use crate::statement::{self, Command};
use crate::types::Value;

/// Executes finished queries against a data store
pub trait Manager {
    type Entity;

    fn select(&self, query: &Query) -> Result<Vec<Self::Entity>>;

    fn delete(&self, query: &DeleteQuery) -> Result<()>;

    fn insert(&self, query: &InsertQuery) -> Result<Self::Entity>;

    fn update(&self, query: &UpdateQuery) -> Result<Self::Entity>;

    fn count(&self, query: &Query) -> Result<u64> {
        Ok(self.select(query)?.len() as u64)
    }
}

/// What running a statement produced
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<E> {
    Entities(Vec<E>),
    Entity(E),
    Deleted,
    Count(u64),
    Exists(bool),
}

impl<E> Outcome<E> {
    pub fn into_entities(self) -> Vec<E> {
        match self {
            Outcome::Entities(entities) => entities,
            Outcome::Entity(entity) => vec![entity],
            Outcome::Deleted | Outcome::Count(_) | Outcome::Exists(_) => Vec::new(),
        }
    }
}

fn run<M: Manager>(command: &Command, manager: &M) -> Result<Outcome<M::Entity>> {
    debug!(entity = command.entity_name(), "Running query");
    match command {
        Command::Select(query) => manager.select(query).map(Outcome::Entities),
        Command::Delete(query) => manager.delete(query).map(|_| Outcome::Deleted),
        Command::Insert(query) => manager.insert(query).map(Outcome::Entity),
        Command::Update(query) => manager.update(query).map(Outcome::Entity),
    }
}

/// Parses, converts and runs string queries
pub struct QueryRunner<P: StatementParser = QueryParser> {
    config: QueryConfig,
    cache: QueryCache<P>,
}

impl QueryRunner<QueryParser> {
    pub fn new(config: QueryConfig) -> Self {
        Self::with_cache(config, QueryCache::new())
    }
}

impl Default for QueryRunner<QueryParser> {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

impl<P: StatementParser> QueryRunner<P> {
    pub fn with_cache(config: QueryConfig, cache: QueryCache<P>) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache<P> {
        &self.cache
    }

    fn statement(&self, query: &str) -> Result<Arc<Statement>> {
        if self.config.cache_queries {
            self.cache.get(query)
        } else {
            crate::parser::parse(query).map(Arc::new)
        }
    }

    /// Run a query that has no placeholders
    pub fn execute<M: Manager>(
        &self,
        query: &str,
        manager: &M,
        observer: &dyn QueryObserver,
    ) -> Result<Outcome<M::Entity>> {
        let statement = self.statement(query)?;
        let converted = statement::convert(&statement, observer)?;
        if !converted.params.is_empty() {
            return Err(QueryError::ParameterizedQuery);
        }
        run(&converted.command, manager)
    }

    /// Parse a query whose placeholders will be bound before running
    pub fn prepare(&self, query: &str, observer: &dyn QueryObserver) -> Result<PreparedStatement> {
        let statement = self.statement(query)?;
        let converted = statement::convert(&statement, observer)?;
        debug!(query, params = ?converted.params.names(), "Prepared statement");
        Ok(PreparedStatement {
            command: converted.command,
            params: converted.params,
        })
    }
}

impl<P: StatementParser> std::fmt::Debug for QueryRunner<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRunner")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

/// A query whose placeholders are bound by name before it runs
///
/// Prepare the text again for an independent set of bindings.
#[derive(Debug)]
pub struct PreparedStatement {
    command: Command,
    params: Params,
}

impl PreparedStatement {
    pub fn bind(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.params.bind(name, value)?;
        Ok(self)
    }

    /// Bind with the value coerced to the declared type of its field
    pub fn bind_mapped(
        &mut self,
        name: &str,
        value: impl Into<Value>,
        mapping: &dyn ClassMapping,
    ) -> Result<&mut Self> {
        self.params.bind_mapped(name, value, mapping)?;
        Ok(self)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The query with every placeholder replaced by its bound value
    pub fn command(&self) -> Result<Command> {
        self.command.resolve()
    }

    pub fn execute<M: Manager>(&self, manager: &M) -> Result<Outcome<M::Entity>> {
        let command = self.command()?;
        run(&command, manager)
    }
}

impl RepositoryMethod {
    /// Bind `args` and run the derived query
    pub fn execute<M: Manager>(
        &self,
        manager: &M,
        mapping: &dyn ClassMapping,
        args: &[MethodArg],
    ) -> Result<Outcome<M::Entity>> {
        let command = self.prepare(mapping, args)?;
        debug!(method = self.name(), "Running repository method");
        match (self.subject(), &command) {
            (Subject::Count, Command::Select(query)) => manager.count(query).map(Outcome::Count),
            (Subject::Exists, Command::Select(query)) => {
                manager.count(query).map(|n| Outcome::Exists(n > 0))
            }
            _ => run(&command, manager),
        }
    }
}
