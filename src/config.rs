//! Configuration for query parsing and execution
//!
//! Provides a builder pattern for configuring the query runner and mappings.

/// Configuration for the query core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Whether parsed query strings are memoized (default: true)
    pub cache_queries: bool,
    /// Storage name of id properties that are not renamed explicitly (default: "_id")
    pub id_field: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl QueryConfig {
    /// Create a new configuration builder
    pub fn builder() -> QueryConfigBuilder {
        QueryConfigBuilder::new()
    }
}

/// Builder for QueryConfig
#[derive(Debug)]
pub struct QueryConfigBuilder {
    cache_queries: bool,
    id_field: String,
}

impl Default for QueryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryConfigBuilder {
    pub fn new() -> Self {
        Self {
            cache_queries: true,
            id_field: "_id".to_string(),
        }
    }

    /// Enable or disable the parsed-query cache (default: true)
    pub fn cache_queries(mut self, enabled: bool) -> Self {
        self.cache_queries = enabled;
        self
    }

    /// Disable the parsed-query cache
    pub fn without_cache(mut self) -> Self {
        self.cache_queries = false;
        self
    }

    /// Set the storage name used for id properties (default: "_id")
    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = name.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> QueryConfig {
        QueryConfig {
            cache_queries: self.cache_queries,
            id_field: self.id_field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueryConfig::default();

        assert!(config.cache_queries);
        assert_eq!(config.id_field, "_id");
        assert_eq!(config, QueryConfig::builder().build());
    }

    #[test]
    fn test_without_cache() {
        let config = QueryConfig::builder().without_cache().build();
        assert!(!config.cache_queries);

        let config = QueryConfig::builder().cache_queries(false).build();
        assert!(!config.cache_queries);
    }

    #[test]
    fn test_custom_id_field() {
        let config = QueryConfig::builder()
            .id_field(String::from("key"))
            .build();
        assert_eq!(config.id_field, "key");
    }

    #[test]
    fn test_builder_order_independence() {
        let config1 = QueryConfig::builder().without_cache().id_field("pk").build();
        let config2 = QueryConfig::builder().id_field("pk").without_cache().build();
        assert_eq!(config1, config2);
    }

    #[test]
    fn test_builder_debug() {
        let debug_str = format!("{:?}", QueryConfig::builder());
        assert!(debug_str.contains("QueryConfigBuilder"));
    }
}
