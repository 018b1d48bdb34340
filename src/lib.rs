//! analytics-sync
//!
//! Incremental replication of operational data into the analytics schema.
//!
//! # Pipelines
//!
//! - `analytics_sync_mongodb_hash_source` - MongoDB collection, change
//!   detection by content fingerprint
//! - `analytics_sync_postgresql_watermark_source` - PostgreSQL tables, change
//!   detection by updated/deleted timestamp markers
//!
//! Both write through `analytics_sync_postgresql::PostgresTarget` and commit
//! their checkpoint row in the same transaction as their data.
//!
//! # CLI Usage
//!
//! ```bash
//! # Hash-diff sync of the users collection
//! analytics-sync mongodb --mongo-uri mongodb://localhost:27017
//!
//! # Watermark sync of one configured table
//! analytics-sync postgresql --table savings_plan
//!
//! # Both pipelines, classify only
//! analytics-sync --config analytics-sync.toml --dry-run all
//! ```

use analytics_sync_postgresql::{parse_ssl_mode, ConnectConfig};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use sync_core::DocumentSyncConfig;

pub mod checkpoint;
pub mod config;
pub mod mongodb;
pub mod postgresql;

pub use config::AppConfig;

/// MongoDB source options
#[derive(Parser, Clone, Debug)]
pub struct MongoOpts {
    /// MongoDB connection URI
    #[arg(long, default_value = "mongodb://localhost:27017", env = "MONGO_URI")]
    pub mongo_uri: String,

    /// Source database, overriding the configuration file
    #[arg(long, env = "MONGO_DB")]
    pub mongo_db: Option<String>,

    /// Source collection, overriding the configuration file
    #[arg(long, env = "MONGO_COLLECTION")]
    pub mongo_collection: Option<String>,
}

impl MongoOpts {
    /// Apply the database/collection overrides to `config`.
    pub fn apply(&self, config: &mut DocumentSyncConfig) {
        if let Some(database) = &self.mongo_db {
            config.database = database.clone();
        }
        if let Some(collection) = &self.mongo_collection {
            config.collection = collection.clone();
        }
    }
}

/// PostgreSQL connection options, shared by the source and the target
#[derive(Parser, Clone)]
pub struct PostgresOpts {
    /// PostgreSQL host
    #[arg(long, default_value = "localhost", env = "PG_HOST")]
    pub pg_host: String,

    /// PostgreSQL port
    #[arg(long, default_value_t = 5432, env = "PG_PORT")]
    pub pg_port: u16,

    /// PostgreSQL database
    #[arg(long, default_value = "postgres", env = "PG_DB")]
    pub pg_db: String,

    /// PostgreSQL user
    #[arg(long, default_value = "postgres", env = "PG_USER")]
    pub pg_user: String,

    /// PostgreSQL password
    #[arg(long, default_value = "", env = "PG_PASSWORD", hide_env_values = true)]
    pub pg_password: String,

    /// libpq sslmode (disable, allow, prefer, require, verify-ca, verify-full)
    #[arg(long, default_value = "require", env = "PG_SSLMODE")]
    pub pg_sslmode: String,

    /// PEM root certificate(s) for sslmode=verify-ca/verify-full; the
    /// bundled web PKI roots are used when unset
    #[arg(long, env = "PG_SSLROOTCERT")]
    pub pg_sslrootcert: Option<PathBuf>,

    /// Full connection string; takes precedence over the individual options
    #[arg(long, env = "PG_CONNECTION_STRING", hide_env_values = true)]
    pub pg_connection_string: Option<String>,
}

impl PostgresOpts {
    /// A connection string keeps its own `sslmode`.
    pub fn to_config(&self) -> anyhow::Result<ConnectConfig> {
        let mut connect = match &self.pg_connection_string {
            Some(connection_string) => {
                let config: tokio_postgres::Config = connection_string
                    .parse()
                    .context("Invalid PostgreSQL connection string")?;
                ConnectConfig::from(config)
            }
            None => {
                let mut config = tokio_postgres::Config::new();
                config
                    .host(&self.pg_host)
                    .port(self.pg_port)
                    .dbname(&self.pg_db)
                    .user(&self.pg_user);
                if !self.pg_password.is_empty() {
                    config.password(&self.pg_password);
                }
                ConnectConfig::new(config, parse_ssl_mode(&self.pg_sslmode)?)
            }
        };
        if let Some(root_cert) = &self.pg_sslrootcert {
            connect = connect.with_root_cert(root_cert);
        }
        Ok(connect)
    }
}
