//! SQL text for upserts and the checkpoint table.

use analytics_sink::UpsertBatch;

/// Maximum number of bind parameters in one PostgreSQL statement.
pub const MAX_BIND_PARAMETERS: usize = 65_535;

/// Quote a possibly schema-qualified identifier (`analytics.raw_users` ->
/// `"analytics"."raw_users"`).
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Rows per statement such that no statement exceeds [`MAX_BIND_PARAMETERS`].
pub fn rows_per_statement(column_count: usize) -> usize {
    if column_count == 0 {
        return 0;
    }
    (MAX_BIND_PARAMETERS / column_count).max(1)
}

/// `INSERT ... VALUES (...), ... ON CONFLICT (pk) DO UPDATE SET c = EXCLUDED.c`
/// for `row_count` rows of `batch`'s column set.
///
/// Insert-only columns are left out of the `SET` list. If nothing is left to
/// update the conflict action is `DO NOTHING`.
pub fn upsert_statement(batch: &UpsertBatch, row_count: usize) -> String {
    let columns = batch.columns();
    let col_count = columns.len();

    let mut placeholders: Vec<String> = Vec::with_capacity(row_count);
    let mut param_idx = 1;
    for _ in 0..row_count {
        let row_placeholders: Vec<String> = (0..col_count)
            .map(|_| {
                let p = format!("${param_idx}");
                param_idx += 1;
                p
            })
            .collect();
        placeholders.push(format!("({})", row_placeholders.join(", ")));
    }

    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let update_columns = batch.update_columns();
    let conflict_action = if update_columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let assignments = update_columns
            .iter()
            .map(|c| {
                let c = quote_ident(c);
                format!("{c} = EXCLUDED.{c}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("DO UPDATE SET {assignments}")
    };

    format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) {}",
        quote_ident(batch.table()),
        column_list,
        placeholders.join(", "),
        quote_ident(batch.primary_key()),
        conflict_action
    )
}

/// Snapshot of `identity -> fingerprint`, both read as text.
pub fn fingerprint_query(table: &str, identity_column: &str, fingerprint_column: &str) -> String {
    format!(
        "SELECT {}::text, {}::text FROM {}",
        quote_ident(identity_column),
        quote_ident(fingerprint_column),
        quote_ident(table)
    )
}

/// Checkpoint statements against one checkpoint table.
///
/// Timestamps are cast through `timestamptz` so the table may declare its
/// columns either with or without time zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSql {
    pub select_one: String,
    pub select_all: String,
    pub upsert: String,
    pub seed: String,
}

impl CheckpointSql {
    pub fn new(table: &str) -> Self {
        let table = quote_ident(table);
        let columns = "source_name::text, last_extracted_timestamp::timestamptz, \
                       last_extraction_status::text, records_extracted::bigint, \
                       updated_at::timestamptz";
        Self {
            select_one: format!("SELECT {columns} FROM {table} WHERE source_name = $1"),
            select_all: format!("SELECT {columns} FROM {table} ORDER BY source_name"),
            upsert: format!(
                "INSERT INTO {table} \
                 (source_name, last_extracted_timestamp, last_extraction_status, records_extracted, updated_at) \
                 VALUES ($1::text, $2::timestamptz, $3::text, $4::bigint, $5::timestamptz) \
                 ON CONFLICT (source_name) DO UPDATE SET \
                 last_extracted_timestamp = EXCLUDED.last_extracted_timestamp, \
                 last_extraction_status = EXCLUDED.last_extraction_status, \
                 records_extracted = EXCLUDED.records_extracted, \
                 updated_at = EXCLUDED.updated_at"
            ),
            seed: format!(
                "INSERT INTO {table} (source_name) VALUES ($1::text) \
                 ON CONFLICT (source_name) DO NOTHING"
            ),
        }
    }
}
