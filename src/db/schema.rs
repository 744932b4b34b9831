// Database schema: table creation, migrations, and lookup-table seeding.
//
// A `schema_version` table tracks which migrations have run; each migration
// is a function that executes SQL statements.
//
// Lookup rows are inserted with explicit ids taken from the label enums, so
// `tone.id` / `hate.id` always equal `index + 1` on a freshly seeded database.
// `verify_lookup_seed` detects databases where that no longer holds.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::labels::{HateCategory, ToneLabel};

/// Create all tables if they don't exist yet.
///
/// This is idempotent: safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Tone lookup (Insult / Neutral / Positive), id = class index + 1
        CREATE TABLE IF NOT EXISTS tone (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        -- Hate category lookup (No abuse ... Other), id = class index + 1
        CREATE TABLE IF NOT EXISTS hate (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        -- One row per classified comment
        CREATE TABLE IF NOT EXISTS comment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL,
            tone_id INTEGER NOT NULL REFERENCES tone(id),
            hate_id INTEGER NOT NULL REFERENCES hate(id),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_comment_tone ON comment(tone_id);
        CREATE INDEX IF NOT EXISTS idx_comment_hate ON comment(hate_id);
        ",
    )
    .context("Failed to create database tables")?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: remember where each comment came from (youtube,
    // telegram, file name, ...). Null for rows without a source column.
    run_migration(conn, 2, |c| {
        c.execute_batch("ALTER TABLE comment ADD COLUMN source TEXT;")
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Insert one lookup row per label, in enumeration order. Existing rows are
/// left alone.
pub fn seed_lookup_tables(conn: &Connection) -> Result<()> {
    for tone in ToneLabel::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO tone (id, name) VALUES (?1, ?2)",
            params![tone.db_id(), tone.name()],
        )
        .with_context(|| format!("Failed to seed tone '{}'", tone.name()))?;
    }
    for hate in HateCategory::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO hate (id, name) VALUES (?1, ?2)",
            params![hate.db_id(), hate.name()],
        )
        .with_context(|| format!("Failed to seed hate category '{}'", hate.name()))?;
    }
    Ok(())
}

/// Check that every lookup row sits at `index + 1` with its canonical name,
/// and that there are no extra rows.
pub fn verify_lookup_seed(conn: &Connection) -> Result<()> {
    let tones: Vec<(i64, &str)> = ToneLabel::ALL.iter().map(|t| (t.db_id(), t.name())).collect();
    let hates: Vec<(i64, &str)> = HateCategory::ALL.iter().map(|h| (h.db_id(), h.name())).collect();
    verify_table(conn, "tone", &tones)?;
    verify_table(conn, "hate", &hates)?;
    Ok(())
}

fn verify_table(conn: &Connection, table: &str, expected: &[(i64, &str)]) -> Result<()> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    if count != expected.len() as i64 {
        anyhow::bail!(
            "Lookup table '{table}' has {count} rows, expected {}. Re-run `tonescope init` on a fresh database.",
            expected.len()
        );
    }

    let mut stmt = conn.prepare(&format!("SELECT name FROM {table} WHERE id = ?1"))?;
    for (id, name) in expected {
        let stored: Option<String> = stmt.query_row([id], |row| row.get(0)).optional()?;
        match stored {
            Some(ref s) if s == name => {}
            Some(s) => anyhow::bail!(
                "Lookup table '{table}' row {id} is '{s}', expected '{name}'"
            ),
            None => anyhow::bail!("Lookup table '{table}' is missing row {id} ('{name}')"),
        }
    }
    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
