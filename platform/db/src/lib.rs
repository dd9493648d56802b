//! Database primitives and the SQL-backed deal store.

mod store;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub use store::{DbDealStore, StageChange};

/// Shared connection pool alias.
pub type DbPool = DatabaseConnection;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://pipeline.db?mode=rwc";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing (set {0})")]
    MissingUrl(String),
    #[error("failed to connect to database: {0}")]
    Connect(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Where to find the database URL.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_key")]
    env_key: String,
    #[serde(default)]
    fallback_url: Option<String>,
}

fn default_url_key() -> String {
    "DATABASE_URL".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DatabaseSettings {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
            fallback_url: None,
        }
    }

    /// `DATABASE_URL`, falling back to a local SQLite file.
    pub fn from_env() -> Self {
        Self::new(default_url_key()).with_fallback(DEFAULT_DATABASE_URL)
    }

    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    pub fn env_key(&self) -> &str {
        &self.env_key
    }

    /// Reads the URL from the process environment.
    pub fn database_url(&self) -> DbResult<String> {
        self.resolve_url(|key| std::env::var(key).ok())
    }

    pub fn resolve_url(&self, lookup: impl Fn(&str) -> Option<String>) -> DbResult<String> {
        match lookup(&self.env_key) {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => self
                .fallback_url
                .clone()
                .ok_or_else(|| DbError::MissingUrl(self.env_key.clone())),
        }
    }
}

pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let url = settings.database_url()?;
    connect_url(&url).await
}

pub async fn connect_url(url: &str) -> DbResult<DbPool> {
    let mut options = ConnectOptions::new(url.to_string());
    options.sqlx_logging(false);
    if url.starts_with("sqlite::memory:") {
        // Each pooled connection would otherwise get its own empty database.
        options.max_connections(1).min_connections(1);
    }
    let pool = Database::connect(options).await?;
    info!(backend = ?pool.get_database_backend(), "database connected");
    Ok(pool)
}
