//! Store connection configuration
//!
//! Resolves where dispatch state lives:
//! 1. A remote SurrealDB instance with credentials (`DISPATCH_DB_ENDPOINT` + user/password)
//! 2. A plain connection URL (`DISPATCH_DB_URL`, e.g. `mem://` or `ws://localhost:8000`)
//! 3. Local persistence under `.dispatch/db`

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::Result;

/// Default namespace for dispatch tables
pub const DEFAULT_NAMESPACE: &str = "dispatch";
/// Default database for dispatch tables
pub const DEFAULT_DATABASE: &str = "main";
/// Local persistence directory used when nothing else is configured
pub const LOCAL_DB_PATH: &str = ".dispatch/db";

/// Credentials for a remote SurrealDB endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

/// Where and how to connect to the dispatch store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Connection URL understood by `surrealdb::engine::any`
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub credentials: Option<Credentials>,
}

impl StoreConfig {
    /// Configuration for an explicit URL without credentials
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            credentials: None,
        }
    }

    /// In-process, non-persistent store
    pub fn in_memory() -> Self {
        Self::new("mem://")
    }

    /// Local SurrealKV persistence under [`LOCAL_DB_PATH`]
    pub fn local() -> Self {
        Self::new(format!("surrealkv://{}", LOCAL_DB_PATH))
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Attach sign-in credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        is_root: bool,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
            is_root,
        });
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - DISPATCH_DB_ENDPOINT, DISPATCH_DB_USERNAME, DISPATCH_DB_PASSWORD
    ///   (remote, all three required)
    /// - DISPATCH_DB_ROOT (optional, default: "false") - set to "true" for root users
    /// - DISPATCH_DB_URL (used when no remote endpoint is configured)
    /// - DISPATCH_DB_NAMESPACE (optional, default: "dispatch")
    /// - DISPATCH_DB_DATABASE (optional, default: "main")
    ///
    /// Falls back to [`StoreConfig::local`] when neither endpoint nor URL is set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same resolution as [`StoreConfig::from_env`] over an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let remote = match (
            lookup("DISPATCH_DB_ENDPOINT"),
            lookup("DISPATCH_DB_USERNAME"),
            lookup("DISPATCH_DB_PASSWORD"),
        ) {
            (Some(endpoint), Some(username), Some(password)) => {
                let is_root = lookup("DISPATCH_DB_ROOT")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                Some(Self::new(endpoint).with_credentials(username, password, is_root))
            }
            _ => None,
        };

        let mut config = remote
            .or_else(|| lookup("DISPATCH_DB_URL").map(Self::new))
            .unwrap_or_else(Self::local);

        if let Some(ns) = lookup("DISPATCH_DB_NAMESPACE") {
            config = config.with_namespace(ns);
        }
        if let Some(db) = lookup("DISPATCH_DB_DATABASE") {
            config = config.with_database(db);
        }
        config
    }

    fn is_local_surrealkv(&self) -> bool {
        self.url.starts_with("surrealkv://")
    }
}

/// Open a connection, sign in if credentials are set, and select ns/db.
#[instrument(
    skip(config),
    fields(url = %config.url, namespace = %config.namespace, database = %config.database)
)]
pub async fn open(config: &StoreConfig) -> Result<Surreal<Any>> {
    if config.is_local_surrealkv() {
        let path = config.url.trim_start_matches("surrealkv://");
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path, e
            ))
        })?;
    }

    let db = surrealdb::engine::any::connect(&config.url)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.url, e))
        })?;

    if let Some(creds) = &config.credentials {
        if creds.is_root {
            db.signin(Root {
                username: &creds.username,
                password: &creds.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &creds.username,
                password: &creds.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
        }
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    info!("dispatch store connected");
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_local_persistence() {
        let config = StoreConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, StoreConfig::local());
        assert_eq!(config.url, "surrealkv://.dispatch/db");
        assert!(config.credentials.is_none());
    }

    #[test]
    fn url_is_used_without_endpoint() {
        let config = StoreConfig::from_lookup(lookup_from(&[("DISPATCH_DB_URL", "mem://")]));
        assert_eq!(config.url, "mem://");
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn endpoint_with_credentials_wins_over_url() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("DISPATCH_DB_ENDPOINT", "wss://db.example.com"),
            ("DISPATCH_DB_USERNAME", "ops"),
            ("DISPATCH_DB_PASSWORD", "secret"),
            ("DISPATCH_DB_ROOT", "TRUE"),
            ("DISPATCH_DB_URL", "mem://"),
            ("DISPATCH_DB_NAMESPACE", "fleet"),
        ]));
        assert_eq!(config.url, "wss://db.example.com");
        assert_eq!(config.namespace, "fleet");
        let creds = config.credentials.expect("credentials");
        assert_eq!(creds.username, "ops");
        assert!(creds.is_root);
    }

    #[test]
    fn partial_credentials_are_ignored() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("DISPATCH_DB_ENDPOINT", "wss://db.example.com"),
            ("DISPATCH_DB_USERNAME", "ops"),
        ]));
        assert_eq!(config, StoreConfig::local());
    }
}
