//! Memoized query parsing
//!
//! Parsed statements are keyed by the exact query text and kept for the life of
//! the cache. Name resolution through an observer happens after the lookup, so
//! one cached statement serves every mapping.

use std::sync::Arc;

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::error::{QueryError, Result};
use crate::parser::{QueryParser, Statement, StatementParser};

/// Unbounded parse cache, safe to share between threads
pub struct QueryCache<P: StatementParser = QueryParser> {
    parser: P,
    entries: Cache<String, Arc<Statement>>,
}

impl QueryCache<QueryParser> {
    pub fn new() -> Self {
        Self::with_parser(QueryParser)
    }
}

impl Default for QueryCache<QueryParser> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: StatementParser> QueryCache<P> {
    pub fn with_parser(parser: P) -> Self {
        Self {
            parser,
            entries: Cache::builder().build(),
        }
    }

    /// Return the parsed statement for `query`, parsing it on first use
    ///
    /// Concurrent misses on the same text wait for a single parse. Parse
    /// errors are returned to every waiter and not cached.
    pub fn get(&self, query: &str) -> Result<Arc<Statement>> {
        if let Some(statement) = self.entries.get(query) {
            trace!(query, "Query cache hit");
            return Ok(statement);
        }

        self.entries
            .try_get_with(query.to_string(), || {
                debug!(query, "Query cache miss, parsing");
                self.parser.parse(query).map(Arc::new)
            })
            .map_err(|e| {
                Arc::try_unwrap(e).unwrap_or_else(|shared| QueryError::query(shared.to_string()))
            })
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }
}

impl<P: StatementParser> std::fmt::Debug for QueryCache<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("len", &self.entries.entry_count())
            .finish()
    }
}
