//! Page-number / page-size windows over a query

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::query::Query;

/// A one-based page of a fixed size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    page: u64,
    size: u64,
}

impl Pagination {
    /// Create a pagination; both page number and size start at 1
    pub fn new(page: u64, size: u64) -> Result<Self> {
        if page < 1 {
            return Err(QueryError::illegal_argument(format!(
                "Page number must be at least 1, got {}",
                page
            )));
        }
        if size < 1 {
            return Err(QueryError::illegal_argument(format!(
                "Page size must be at least 1, got {}",
                size
            )));
        }
        if (page - 1).checked_mul(size).is_none() {
            return Err(QueryError::illegal_argument(format!(
                "Page {} of size {} is past the last addressable entity",
                page, size
            )));
        }
        Ok(Self { page, size })
    }

    /// First page of the given size
    pub fn first(size: u64) -> Result<Self> {
        Self::new(1, size)
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of entities before this page
    pub fn skip(&self) -> u64 {
        // bounded by the check in `new`
        (self.page - 1) * self.size
    }

    pub fn limit(&self) -> u64 {
        self.size
    }

    /// The following page, same size
    ///
    /// Fails once the next window would start past `u64::MAX`.
    pub fn next(&self) -> Result<Pagination> {
        let page = self.page.checked_add(1).ok_or_else(|| {
            QueryError::illegal_argument(format!("Page {} has no next page", self.page))
        })?;
        Self::new(page, self.size)
    }
}

/// A query bound to a page
///
/// The pagination always wins over any skip/limit set on the wrapped query.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedQuery {
    query: Query,
    pagination: Pagination,
}

impl PaginatedQuery {
    pub fn of(query: &Query, pagination: Pagination) -> Self {
        Self {
            query: query.with_pagination(&pagination),
            pagination,
        }
    }

    /// The same query over the next page
    pub fn next(&self) -> Result<PaginatedQuery> {
        Ok(Self::of(&self.query, self.pagination.next()?))
    }

    /// The query with this page's window applied
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero() {
        assert!(Pagination::new(0, 10).is_err());
        assert!(Pagination::new(1, 0).is_err());
    }

    #[test]
    fn test_rejects_overflowing_window() {
        let err = Pagination::new(u64::MAX, 2).unwrap_err();
        assert!(matches!(err, QueryError::IllegalArgument(_)));

        // the very last addressable windows are still fine
        let last = Pagination::new(u64::MAX, 1).unwrap();
        assert_eq!(last.skip(), u64::MAX - 1);
        assert!(matches!(last.next(), Err(QueryError::IllegalArgument(_))));

        let edge = Pagination::new(u64::MAX / 2 + 1, 2).unwrap();
        assert_eq!(edge.skip(), u64::MAX - 1);
        assert!(edge.next().is_err());

        let query = Query::builder("God").build();
        let paged = PaginatedQuery::of(&query, edge);
        assert!(paged.next().is_err());
    }

    #[test]
    fn test_window() {
        let pagination = Pagination::new(3, 25).unwrap();
        assert_eq!(pagination.skip(), 50);
        assert_eq!(pagination.limit(), 25);

        let first = Pagination::first(10).unwrap();
        assert_eq!(first.skip(), 0);
    }

    #[test]
    fn test_next() {
        for (page, size) in [(1, 1), (2, 10), (7, 3)] {
            let p = Pagination::new(page, size).unwrap();
            let next = p.next().unwrap();
            assert_eq!(next.page(), p.page() + 1);
            assert_eq!(next.size(), p.size());
            // the receiver is unchanged
            assert_eq!(p.page(), page);
        }
    }

    #[test]
    fn test_paginated_query_overrides_window() {
        let query = Query::builder("God")
            .where_("age")
            .gt(10)
            .order_by("name")
            .asc()
            .skip(3)
            .limit(4)
            .build();

        let paged = PaginatedQuery::of(&query, Pagination::new(2, 5).unwrap());
        assert_eq!(paged.query().skip(), 5);
        assert_eq!(paged.query().limit(), Some(5));
        assert_eq!(paged.query().condition(), query.condition());
        assert_eq!(paged.query().sorts(), query.sorts());
    }

    #[test]
    fn test_paginated_query_next() {
        let query = Query::builder("God").where_("name").eq("Diana").build();
        let first = PaginatedQuery::of(&query, Pagination::first(10).unwrap());
        let second = first.next().unwrap();

        assert_eq!(second.pagination().page(), 2);
        assert_eq!(second.query().skip(), 10);
        assert_eq!(second.query().limit(), Some(10));
        assert_eq!(second.query().entity_name(), first.query().entity_name());
        assert_eq!(second.query().condition(), first.query().condition());
        assert_eq!(second.query().sorts(), first.query().sorts());
    }
}
