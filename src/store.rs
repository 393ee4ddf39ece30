use crate::app_dirs::AppDirs;
use crate::result::TestResult;
use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Result};
use std::error::Error;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// Destination for finalized results. At-most-once delivery is attempted per
/// completed session; receivers deduplicate on `session_id`.
pub trait ResultSink {
    fn submit(&self, result: &TestResult) -> std::result::Result<(), Box<dyn Error>>;
}

/// Local result history backed by SQLite.
///
/// `created_at` and `username` are assigned here, on insert; the engine never
/// sets them. Inserts are keyed on `session_id` so retried submissions are
/// idempotent.
#[derive(Debug)]
pub struct ResultsDb {
    conn: Connection,
    username: String,
}

impl ResultsDb {
    /// Open (or create) the database at the default state-dir path.
    pub fn new(username: &str) -> Result<Self> {
        let db_path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("typerate_results.db"));

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }

        Self::with_path(&db_path, username)
    }

    pub fn with_path<P: AsRef<Path>>(path: P, username: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, username)
    }

    /// In-memory database for tests.
    pub fn open_in_memory(username: &str) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, username)
    }

    fn from_connection(conn: Connection, username: &str) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL,
                wpm INTEGER NOT NULL,
                accuracy INTEGER NOT NULL,
                time_elapsed INTEGER NOT NULL,
                total_characters INTEGER NOT NULL,
                correct_characters INTEGER NOT NULL,
                incorrect_characters INTEGER NOT NULL,
                text_sample TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_results_created_at ON results(created_at)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_results_wpm ON results(wpm)",
            [],
        )?;

        Ok(ResultsDb {
            conn,
            username: username.to_string(),
        })
    }

    /// Insert a result for an explicit user at an explicit instant.
    /// Returns false when the `session_id` was already recorded.
    pub fn insert_as(
        &self,
        username: &str,
        created_at: DateTime<Local>,
        result: &TestResult,
    ) -> Result<bool> {
        let inserted = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO results
            (session_id, username, wpm, accuracy, time_elapsed,
             total_characters, correct_characters, incorrect_characters,
             text_sample, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                result.session_id,
                username,
                result.wpm,
                result.accuracy,
                result.time_elapsed,
                result.total_characters,
                result.correct_characters,
                result.incorrect_characters,
                result.text_sample,
                created_at.to_rfc3339(),
            ],
        )?;

        Ok(inserted > 0)
    }

    /// Most recent results first.
    pub fn fetch_recent(&self, limit: usize) -> Result<Vec<TestResult>> {
        self.fetch(
            "SELECT session_id, username, wpm, accuracy, time_elapsed,
                    total_characters, correct_characters, incorrect_characters,
                    text_sample, created_at
             FROM results ORDER BY created_at DESC LIMIT ?1",
            Some(limit),
        )
    }

    /// Fastest results first; ties go to the earlier attempt, matching
    /// `analytics::best_n` so local and stored views agree.
    pub fn fetch_best(&self, limit: usize) -> Result<Vec<TestResult>> {
        self.fetch(
            "SELECT session_id, username, wpm, accuracy, time_elapsed,
                    total_characters, correct_characters, incorrect_characters,
                    text_sample, created_at
             FROM results ORDER BY wpm DESC, created_at ASC LIMIT ?1",
            Some(limit),
        )
    }

    pub fn fetch_all(&self) -> Result<Vec<TestResult>> {
        self.fetch(
            "SELECT session_id, username, wpm, accuracy, time_elapsed,
                    total_characters, correct_characters, incorrect_characters,
                    text_sample, created_at
             FROM results ORDER BY created_at DESC",
            None,
        )
    }

    fn fetch(&self, sql: &str, limit: Option<usize>) -> Result<Vec<TestResult>> {
        let mut stmt = self.conn.prepare(sql)?;

        let map = |row: &rusqlite::Row| -> Result<TestResult> {
            let created_at_str: String = row.get(9)?;
            let created_at = DateTime::parse_from_rfc3339(&created_at_str)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        9,
                        "created_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);

            Ok(TestResult {
                session_id: row.get(0)?,
                username: Some(row.get(1)?),
                wpm: row.get(2)?,
                accuracy: row.get(3)?,
                time_elapsed: row.get(4)?,
                total_characters: row.get(5)?,
                correct_characters: row.get(6)?,
                incorrect_characters: row.get(7)?,
                text_sample: row.get(8)?,
                created_at: Some(created_at),
            })
        };

        let rows = match limit {
            Some(n) => stmt.query_map([n], map)?,
            None => stmt.query_map([], map)?,
        };

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}

impl ResultSink for ResultsDb {
    fn submit(&self, result: &TestResult) -> std::result::Result<(), Box<dyn Error>> {
        self.insert_as(&self.username, Local::now(), result)?;
        Ok(())
    }
}

/// Append one finished run to the human-readable log in the config dir.
pub fn append_log(result: &TestResult) -> std::result::Result<(), csv::Error> {
    if let Some(config_dir) = AppDirs::config_dir() {
        std::fs::create_dir_all(&config_dir)?;
        let log_path = config_dir.join("log.csv");

        // If the log doesn't exist, we need to emit a header
        let needs_header = !log_path.exists();

        let log_file = OpenOptions::new().append(true).create(true).open(log_path)?;
        let mut writer = csv::Writer::from_writer(log_file);

        if needs_header {
            writer.write_record([
                "date",
                "wpm",
                "accuracy",
                "elapsed_secs",
                "total_chars",
                "correct",
                "incorrect",
            ])?;
        }

        writer.write_record(&[
            Local::now().format("%c").to_string(),
            result.wpm.to_string(),
            result.accuracy.to_string(),
            result.time_elapsed.to_string(),
            result.total_characters.to_string(),
            result.correct_characters.to_string(),
            result.incorrect_characters.to_string(),
        ])?;
        writer.flush()?;
    }

    Ok(())
}

/// Dump a result collection as CSV with the wire field names.
pub fn export_csv<W: io::Write>(
    results: &[TestResult],
    out: W,
) -> std::result::Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);

    writer.write_record([
        "createdAt",
        "username",
        "wpm",
        "accuracy",
        "timeElapsed",
        "totalCharacters",
        "correctCharacters",
        "incorrectCharacters",
        "sessionId",
        "textSample",
    ])?;

    for result in results {
        writer.write_record(&[
            result
                .created_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            result.username.clone().unwrap_or_default(),
            result.wpm.to_string(),
            result.accuracy.to_string(),
            result.time_elapsed.to_string(),
            result.total_characters.to_string(),
            result.correct_characters.to_string(),
            result.incorrect_characters.to_string(),
            result.session_id.clone(),
            result.text_sample.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
