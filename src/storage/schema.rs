//! SQLite schema for the receipt store.

/// Feeless anchoring receipts. Append-only. `timestamp` holds epoch seconds.
pub const CREATE_BLOCKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS blocks (
    digest TEXT NOT NULL,
    timestamp INTEGER NOT NULL
)
";

pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_blocks_timestamp ON blocks(timestamp DESC)
";

/// Rewrite `YYYY-MM-DD HH:MM:SS` text rows from older databases as epoch
/// seconds, so every row sorts numerically.
pub const MIGRATE_TEXT_TIMESTAMPS: &str = r"
UPDATE blocks
SET timestamp = CAST(strftime('%s', timestamp) AS INTEGER)
WHERE typeof(timestamp) = 'text' AND strftime('%s', timestamp) IS NOT NULL
";

/// All schema statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_BLOCKS_TABLE,
    CREATE_TIMESTAMP_INDEX,
    MIGRATE_TEXT_TIMESTAMPS,
];
