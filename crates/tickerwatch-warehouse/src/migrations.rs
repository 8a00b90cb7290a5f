use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_mentions",
        sql: r#"
CREATE TYPE submission_type AS ENUM ('POST', 'COMMENT', 'REPLY');

CREATE SEQUENCE IF NOT EXISTS mention_id_seq START 1;

CREATE TABLE IF NOT EXISTS mentions (
    id BIGINT PRIMARY KEY DEFAULT nextval('mention_id_seq'),
    run_id TEXT NOT NULL,
    ticker TEXT NOT NULL,
    submission_id TEXT NOT NULL,
    author TEXT NOT NULL,
    subreddit TEXT NOT NULL,
    score BIGINT NOT NULL,
    "type" submission_type NOT NULL,
    created_utc TIMESTAMPTZ NOT NULL,
    inserted_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(run_id, submission_id, "type", ticker)
);
"#,
    },
    Migration {
        version: "0002_run_log",
        sql: r#"
CREATE TABLE IF NOT EXISTS run_log (
    run_id TEXT PRIMARY KEY,
    subreddit TEXT NOT NULL,
    status TEXT NOT NULL,
    registry_source TEXT NOT NULL,
    posts BIGINT NOT NULL,
    comments BIGINT NOT NULL,
    replies BIGINT NOT NULL,
    mentions BIGINT NOT NULL,
    duplicates BIGINT NOT NULL,
    errors_skipped BIGINT NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    finished_at TIMESTAMPTZ NOT NULL
);
"#,
    },
    Migration {
        version: "0003_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_mentions_ticker ON mentions(ticker);
CREATE INDEX IF NOT EXISTS idx_mentions_subreddit_created ON mentions(subreddit, created_utc);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
