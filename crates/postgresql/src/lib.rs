//! PostgreSQL support for analytics-sync
//!
//! - [`PostgresTarget`] - the analytical target: batched upserts, fingerprint
//!   snapshots and the checkpoint table, all inside one `BEGIN ... COMMIT`
//! - [`row_to_record`] - result rows to [`sync_core::Record`], shared with the
//!   watermark source
//! - [`new_postgresql_client`] - connection setup, plain or over rustls per
//!   [`TlsMode`]

mod client;
pub mod sql;
mod target;
mod value;

pub use client::{
    build_tls_config, new_postgresql_client, new_shared_client, parse_ssl_mode, ConnectConfig,
    TlsMode,
};
pub use target::{PostgresTarget, PostgresTransaction, DEFAULT_CHECKPOINT_TABLE};
pub use value::{convert_postgres_value, row_to_record, to_sql_param, SqlParam, ValueError};
