//! SQLite persistence for journal entries and their blobs.
//!
//! The store only ever sees sealed entry text; encryption happens in
//! [`crate::Journal`]. Each operation opens its own connection and closes it
//! when done, so no connection state outlives a call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use crate::error::{JournalError, Result};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// Calendar dates are keyed by this text form.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One stored entry, text still sealed.
#[derive(Debug)]
pub struct EntryRow {
    id: i64,
    date: NaiveDate,
    sealed_text: String,
    photos: Vec<Vec<u8>>,
    attachments: Vec<Vec<u8>>,
}

impl EntryRow {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sealed_text(&self) -> &str {
        &self.sealed_text
    }

    pub fn photos(&self) -> &[Vec<u8>] {
        &self.photos
    }

    pub fn attachments(&self) -> &[Vec<u8>] {
        &self.attachments
    }

    /// Splits off the photo and attachment blobs.
    pub fn into_blobs(self) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        (self.photos, self.attachments)
    }
}

#[derive(Debug, Clone)]
pub struct EntryStore {
    path: PathBuf,
}

impl EntryStore {
    /// Opens (creating if absent) the store at `path` and applies pending
    /// schema migrations. Safe to call on an already initialized store.
    ///
    /// # Errors
    ///
    /// `StorageInit` if the file cannot be opened or is not a database.
    pub fn initialize(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };

        let mut conn = store.connect().map_err(JournalError::StorageInit)?;
        migrate(&mut conn).map_err(JournalError::StorageInit)?;

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Inserts one entry with all of its blobs in a single transaction and
    /// returns the new entry id. Nothing is kept if any insert fails.
    pub fn insert_entry(
        &self,
        date: NaiveDate,
        sealed_text: &str,
        photos: &[Vec<u8>],
        attachments: &[Vec<u8>],
    ) -> Result<i64> {
        let mut conn = self.connect().map_err(JournalError::StorageWrite)?;
        write_entry(&mut conn, date, sealed_text, photos, attachments)
            .map_err(JournalError::StorageWrite)
    }

    /// The most recently saved entry for `date`, if any.
    pub fn latest_entry(&self, date: NaiveDate) -> Result<Option<EntryRow>> {
        let conn = self.connect().map_err(JournalError::StorageRead)?;
        read_latest(&conn, date).map_err(JournalError::StorageRead)
    }

    /// Dates of all entry rows, one per row, in insertion order.
    pub fn entry_dates(&self) -> Result<Vec<NaiveDate>> {
        let conn = self.connect().map_err(JournalError::StorageRead)?;

        let raw = {
            let mut stmt = conn
                .prepare("SELECT date FROM journal_entries ORDER BY id")
                .map_err(JournalError::StorageRead)?;
            stmt.query_map([], |row| row.get::<_, String>(0))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(JournalError::StorageRead)?
        };

        raw.iter().map(|s| parse_date(s)).collect()
    }

    /// First photo of the latest entry of every date whose latest entry has
    /// photos.
    pub fn photo_covers(&self) -> Result<BTreeMap<NaiveDate, Vec<u8>>> {
        let conn = self.connect().map_err(JournalError::StorageRead)?;

        let raw = {
            let mut stmt = conn
                .prepare(
                    "SELECT e.date, p.photo
                     FROM journal_entries e
                     JOIN entry_photos p ON p.entry_id = e.id
                     WHERE e.id = (SELECT MAX(id) FROM journal_entries WHERE date = e.date)
                       AND p.rowid = (SELECT MIN(rowid) FROM entry_photos WHERE entry_id = e.id)",
                )
                .map_err(JournalError::StorageRead)?;
            stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(JournalError::StorageRead)?
        };

        raw.into_iter()
            .map(|(date, photo)| parse_date(&date).map(|date| (date, photo)))
            .collect()
    }
}

/// Run schema migrations
fn migrate(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let current: i32 = tx.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current < 1 {
        migrate_v1(&tx)?;
        info!(version = 1, "applied journal schema migration");
    }

    tx.commit()?;
    debug!(from = current, to = SCHEMA_VERSION, "journal schema ready");
    Ok(())
}

/// Schema version 1. Dates are deliberately not unique.
fn migrate_v1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS journal_entries (
            id INTEGER PRIMARY KEY,
            date TEXT NOT NULL,
            entry TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_journal_entries_date ON journal_entries(date);

        CREATE TABLE IF NOT EXISTS entry_photos (
            id INTEGER PRIMARY KEY,
            entry_id INTEGER NOT NULL,
            photo BLOB NOT NULL,
            FOREIGN KEY (entry_id) REFERENCES journal_entries(id)
        );

        CREATE INDEX IF NOT EXISTS idx_entry_photos_entry_id ON entry_photos(entry_id);

        CREATE TABLE IF NOT EXISTS entry_attachments (
            id INTEGER PRIMARY KEY,
            entry_id INTEGER NOT NULL,
            attachment BLOB NOT NULL,
            FOREIGN KEY (entry_id) REFERENCES journal_entries(id)
        );

        CREATE INDEX IF NOT EXISTS idx_entry_attachments_entry_id ON entry_attachments(entry_id);

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )
}

fn write_entry(
    conn: &mut Connection,
    date: NaiveDate,
    sealed_text: &str,
    photos: &[Vec<u8>],
    attachments: &[Vec<u8>],
) -> rusqlite::Result<i64> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT INTO journal_entries (date, entry) VALUES (?1, ?2)",
        params![date_key(date), sealed_text],
    )?;
    let entry_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare("INSERT INTO entry_photos (entry_id, photo) VALUES (?1, ?2)")?;
        for photo in photos {
            stmt.execute(params![entry_id, photo.as_slice()])?;
        }

        let mut stmt =
            tx.prepare("INSERT INTO entry_attachments (entry_id, attachment) VALUES (?1, ?2)")?;
        for attachment in attachments {
            stmt.execute(params![entry_id, attachment.as_slice()])?;
        }
    }

    tx.commit()?;
    Ok(entry_id)
}

fn read_latest(conn: &Connection, date: NaiveDate) -> rusqlite::Result<Option<EntryRow>> {
    let found: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, entry FROM journal_entries WHERE date = ?1 ORDER BY id DESC LIMIT 1",
            params![date_key(date)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, sealed_text)) = found else {
        return Ok(None);
    };

    let photos = read_blobs(
        conn,
        "SELECT photo FROM entry_photos WHERE entry_id = ?1 ORDER BY rowid",
        id,
    )?;
    let attachments = read_blobs(
        conn,
        "SELECT attachment FROM entry_attachments WHERE entry_id = ?1 ORDER BY rowid",
        id,
    )?;

    Ok(Some(EntryRow {
        id,
        date,
        sealed_text,
        photos,
        attachments,
    }))
}

fn read_blobs(conn: &Connection, sql: &str, entry_id: i64) -> rusqlite::Result<Vec<Vec<u8>>> {
    let mut stmt = conn.prepare(sql)?;
    let blobs = stmt
        .query_map(params![entry_id], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(blobs)
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| JournalError::InvalidDate(raw.into()))
}
