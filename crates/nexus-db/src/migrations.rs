use anyhow::{Result, bail};
use rusqlite::Connection;
use tracing::info;

/// Every column the queries depend on, per table. `verify` refuses to hand
/// out a `Database` whose schema is missing any of them.
const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("users", &["id", "username", "password", "role", "created_at"]),
    ("user_status", &["user_id", "is_online", "last_seen"]),
    ("conversations", &["id", "user1_id", "user2_id", "created_at"]),
    (
        "messages",
        &[
            "id",
            "conversation_id",
            "sender_id",
            "content",
            "sent_at",
            "edited",
            "edited_at",
            "is_read",
            "is_unsent",
        ],
    ),
];

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('member', 'admin')),
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS user_status (
                user_id     INTEGER PRIMARY KEY REFERENCES users(id),
                is_online   INTEGER NOT NULL DEFAULT 0,
                last_seen   TEXT NOT NULL
            );

            -- One row per unordered pair: the pair is stored low id first.
            CREATE TABLE IF NOT EXISTS conversations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user1_id    INTEGER NOT NULL REFERENCES users(id),
                user2_id    INTEGER NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL,
                CHECK (user1_id < user2_id),
                UNIQUE (user1_id, user2_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(id),
                sender_id       INTEGER NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                sent_at         TEXT NOT NULL,
                edited          INTEGER NOT NULL DEFAULT 0,
                edited_at       TEXT,
                is_read         INTEGER NOT NULL DEFAULT 0,
                is_unsent       INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, sent_at, id);

            CREATE INDEX IF NOT EXISTS idx_messages_unread
                ON messages(sender_id, is_read);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

/// Checks the live schema against `REQUIRED_COLUMNS`.
pub fn verify(conn: &Connection) -> Result<()> {
    for (table, columns) in REQUIRED_COLUMNS {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let present = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if present.is_empty() {
            bail!("Schema mismatch: table '{}' does not exist", table);
        }
        for column in *columns {
            if !present.iter().any(|c| c.as_str() == *column) {
                bail!("Schema mismatch: table '{}' is missing column '{}'", table, column);
            }
        }
    }
    Ok(())
}
