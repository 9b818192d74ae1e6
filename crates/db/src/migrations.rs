/// Inline SQL migrations for the burntop database schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained.
///
/// Conventions: UUIDs and calendar dates are TEXT, instants are INTEGER
/// Unix seconds, and monetary columns are INTEGER ten-thousandths of a
/// USD (4 fractional digits of precision, exact accumulation).
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: users table (soft delete via deleted_at)
    r#"
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    username      TEXT NOT NULL UNIQUE,
    display_name  TEXT,
    bio           TEXT,
    location      TEXT,
    region        TEXT,
    website       TEXT,
    image         TEXT,
    is_public     INTEGER NOT NULL DEFAULT 1,
    password_hash TEXT,
    created_at    INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at    INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    deleted_at    INTEGER
);
"#,
    // Migration 2: bearer sessions (auth collaborator)
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    token      TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);"#,
    // Migration 3: message-level dedup
    r#"
CREATE TABLE IF NOT EXISTS synced_message_ids (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    source     TEXT NOT NULL,
    message_id TEXT NOT NULL,
    synced_at  INTEGER NOT NULL,
    UNIQUE(user_id, source, message_id)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_synced_message_ids_synced_at ON synced_message_ids(synced_at);"#,
    // Migration 4: canonical daily usage buckets. Token columns accumulate
    // across syncs; SQLite INTEGER is 64-bit.
    r#"
CREATE TABLE IF NOT EXISTS usage_records (
    id                 TEXT PRIMARY KEY,
    user_id            TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    date               TEXT NOT NULL,
    source             TEXT NOT NULL,
    model              TEXT NOT NULL,
    machine_id         TEXT NOT NULL DEFAULT 'default',
    input_tokens       INTEGER NOT NULL DEFAULT 0 CHECK (input_tokens >= 0),
    output_tokens      INTEGER NOT NULL DEFAULT 0 CHECK (output_tokens >= 0),
    cache_read_tokens  INTEGER NOT NULL DEFAULT 0 CHECK (cache_read_tokens >= 0),
    cache_write_tokens INTEGER NOT NULL DEFAULT 0 CHECK (cache_write_tokens >= 0),
    reasoning_tokens   INTEGER NOT NULL DEFAULT 0 CHECK (reasoning_tokens >= 0),
    cost               INTEGER NOT NULL DEFAULT 0 CHECK (cost >= 0),
    usage_timestamp    INTEGER,
    synced_at          INTEGER,
    created_at         INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at         INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE(user_id, date, source, model, machine_id)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_usage_records_user_date ON usage_records(user_id, date);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_usage_records_date ON usage_records(date);"#,
    // Migration 5: one streak row per user
    r#"
CREATE TABLE IF NOT EXISTS streaks (
    id               TEXT PRIMARY KEY,
    user_id          TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
    current_streak   INTEGER NOT NULL DEFAULT 0 CHECK (current_streak >= 0),
    longest_streak   INTEGER NOT NULL DEFAULT 0 CHECK (longest_streak >= 0),
    last_active_date TEXT,
    timezone         TEXT NOT NULL DEFAULT 'UTC',
    created_at       INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at       INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
"#,
    // Migration 6: derived leaderboard cache, wholly rebuilt each minute
    r#"
CREATE TABLE IF NOT EXISTS leaderboard_cache (
    id           TEXT PRIMARY KEY,
    user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    period       TEXT NOT NULL,
    rank         INTEGER NOT NULL,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    total_cost   INTEGER,
    streak_days  INTEGER,
    rank_change  INTEGER,
    created_at   INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at   INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE(user_id, period)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_leaderboard_cache_period_rank ON leaderboard_cache(period, rank);"#,
    // Migration 7: community benchmarks, one row per period
    r#"
CREATE TABLE IF NOT EXISTS community_benchmarks (
    id                     TEXT PRIMARY KEY,
    period                 TEXT NOT NULL UNIQUE,
    total_users            INTEGER NOT NULL DEFAULT 0,
    avg_tokens             INTEGER,
    median_tokens          INTEGER,
    total_community_tokens INTEGER,
    avg_cost               INTEGER,
    avg_streak             INTEGER,
    avg_unique_tools       INTEGER,
    avg_cache_efficiency   REAL,
    created_at             INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at             INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
"#,
];
