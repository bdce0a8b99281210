//! Configuration for SchemaService
//!
//! Provides a builder pattern for configuring the schema service.

use crate::dialect::Engine;

/// Default upper bound for `QueryRequest::take`
pub const DEFAULT_MAX_TAKE: u32 = 1000;

/// Default token meaning "the connection's current schema"
pub const DEFAULT_CURRENT_SCHEMA_TOKEN: &str = "_";

/// Configuration for the schema service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Database URL used by the bundled drivers
    pub database_url: String,
    /// Explicit engine; inferred from the URL scheme when `None`
    pub engine: Option<Engine>,
    /// Upper bound for the page size of data queries (default: 1000)
    pub max_take: u32,
    /// Schema argument meaning "current schema" (default: "_")
    pub current_schema_token: String,
    /// Pool size for the bundled drivers (default: 5)
    pub max_connections: u32,
}

impl ServiceConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> ServiceConfigBuilder {
        ServiceConfigBuilder::new(database_url)
    }

    /// The configured engine, or the one implied by the URL scheme
    pub fn resolved_engine(&self) -> Option<Engine> {
        self.engine
            .clone()
            .or_else(|| Engine::from_url(&self.database_url))
    }
}

/// Builder for ServiceConfig
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    database_url: String,
    engine: Option<Engine>,
    max_take: u32,
    current_schema_token: String,
    max_connections: u32,
}

impl ServiceConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            engine: None,
            max_take: DEFAULT_MAX_TAKE,
            current_schema_token: DEFAULT_CURRENT_SCHEMA_TOKEN.to_string(),
            max_connections: 5,
        }
    }

    /// Set the engine explicitly instead of inferring it from the URL
    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the largest accepted page size (default: 1000)
    pub fn max_take(mut self, max_take: u32) -> Self {
        self.max_take = max_take.max(1);
        self
    }

    /// Set the token that stands for the current schema (default: "_")
    pub fn current_schema_token(mut self, token: impl Into<String>) -> Self {
        self.current_schema_token = token.into();
        self
    }

    /// Set the pool size for the bundled drivers (default: 5)
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ServiceConfig {
        ServiceConfig {
            database_url: self.database_url,
            engine: self.engine,
            max_take: self.max_take,
            current_schema_token: self.current_schema_token,
            max_connections: self.max_connections,
        }
    }
}
