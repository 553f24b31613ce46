//! Encrypted local store for a calendar journal.
//!
//! Entries are keyed by calendar date. Their text is sealed with an
//! authenticated cipher before it reaches SQLite; photos and attachments are
//! stored as given. The key lives in a key file managed by [`KeyFile`].

mod crypto;
mod error;
mod format;
mod keyfile;
mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use directories::ProjectDirs;
use tracing::{debug, warn};
use zeroize::Zeroizing;

pub use crate::crypto::{
    Cipher, KEY_LEN, KdfParams, Key, derive_key_from_passphrase, derive_key_with_params,
};
pub use crate::error::{BlobKind, JournalError, Result};
pub use crate::keyfile::{KeyFile, load_or_create_key};
pub use crate::store::{DATE_FORMAT, EntryRow, EntryStore};

/// Default cap on a single photo or attachment (32 MiB).
pub const DEFAULT_MAX_BLOB_BYTES: usize = 32 * 1024 * 1024;

/// Size cap applied to every blob before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobLimits {
    max_blob_bytes: usize,
}

impl Default for BlobLimits {
    fn default() -> Self {
        Self {
            max_blob_bytes: DEFAULT_MAX_BLOB_BYTES,
        }
    }
}

impl BlobLimits {
    pub fn new(max_blob_bytes: usize) -> Self {
        Self { max_blob_bytes }
    }

    pub fn max_blob_bytes(&self) -> usize {
        self.max_blob_bytes
    }

    fn check(&self, kind: BlobKind, blobs: &[Vec<u8>]) -> Result<()> {
        match blobs.iter().find(|b| b.len() > self.max_blob_bytes) {
            Some(blob) => Err(JournalError::BlobTooLarge {
                kind,
                size: blob.len(),
                limit: self.max_blob_bytes,
            }),
            None => Ok(()),
        }
    }
}

/// Where the journal lives and how it is bounded.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub db_path: PathBuf,
    pub key_path: PathBuf,
    pub limits: BlobLimits,
}

impl JournalConfig {
    pub fn new(db_path: PathBuf, key_path: PathBuf) -> Self {
        Self {
            db_path,
            key_path,
            limits: BlobLimits::default(),
        }
    }
}

/// `journal.db` and `key.key` in the platform data directory.
pub fn default_config() -> Option<JournalConfig> {
    let project_dirs = ProjectDirs::from("", "", "diarium")?;
    let data_dir = project_dirs.data_dir();

    Some(JournalConfig::new(
        data_dir.join("journal.db"),
        data_dir.join("key.key"),
    ))
}

/// A decrypted journal entry.
pub struct JournalEntry {
    date: NaiveDate,
    text: Zeroizing<String>,
    photos: Vec<Vec<u8>>,
    attachments: Vec<Vec<u8>>,
}

impl JournalEntry {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn photos(&self) -> &[Vec<u8>] {
        &self.photos
    }

    pub fn attachments(&self) -> &[Vec<u8>] {
        &self.attachments
    }
}

/// The encrypted record store: an entry store plus the cipher for its key.
pub struct Journal {
    store: EntryStore,
    cipher: Cipher,
    limits: BlobLimits,
}

impl Journal {
    /// Loads (or creates) the key file and initializes the store.
    pub fn open(config: &JournalConfig) -> Result<Self> {
        let key = load_or_create_key(&config.key_path)?;
        Self::open_with_key(&config.db_path, key, config.limits)
    }

    /// Initializes the store at `db_path`, sealing entries under `key`.
    pub fn open_with_key(db_path: impl Into<PathBuf>, key: Key, limits: BlobLimits) -> Result<Self> {
        let store = EntryStore::initialize(db_path)?;

        Ok(Self {
            store,
            cipher: Cipher::new(key),
            limits,
        })
    }

    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    /// Seals `text` and stores it with its blobs as a new entry for `date`.
    ///
    /// Always inserts: saving the same date twice keeps both entries, and
    /// [`Journal::get_entry`] returns the later one.
    pub fn save_entry(
        &self,
        date: NaiveDate,
        text: &str,
        photos: &[Vec<u8>],
        attachments: &[Vec<u8>],
    ) -> Result<()> {
        self.limits.check(BlobKind::Photo, photos)?;
        self.limits.check(BlobKind::Attachment, attachments)?;

        let sealed = self.cipher.seal_text(text)?;
        let entry_id = self.store.insert_entry(date, &sealed, photos, attachments)?;

        debug!(
            %date,
            entry_id,
            photos = photos.len(),
            attachments = attachments.len(),
            "saved journal entry"
        );
        Ok(())
    }

    /// The latest entry for `date`, decrypted, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// `Decryption` if the entry was sealed under a different key or has been
    /// altered.
    pub fn get_entry(&self, date: NaiveDate) -> Result<Option<JournalEntry>> {
        let Some(row) = self.store.latest_entry(date)? else {
            debug!(%date, "no journal entry");
            return Ok(None);
        };

        let text = self.cipher.open_text(row.sealed_text()).inspect_err(|_| {
            warn!(
                %date,
                entry_id = row.id(),
                "journal entry failed to decrypt; key file may not match this store"
            )
        })?;

        let date = row.date();
        let (photos, attachments) = row.into_blobs();
        Ok(Some(JournalEntry {
            date,
            text,
            photos,
            attachments,
        }))
    }

    /// Every date with an entry, one element per stored entry.
    pub fn list_entry_dates(&self) -> Result<Vec<NaiveDate>> {
        self.store.entry_dates()
    }

    /// The calendar background photo of each date that has one.
    pub fn photo_covers(&self) -> Result<BTreeMap<NaiveDate, Vec<u8>>> {
        self.store.photo_covers()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn journal_in(dir: &Path) -> Journal {
        Journal::open(&JournalConfig::new(
            dir.join("journal.db"),
            dir.join("key.key"),
        ))
        .unwrap()
    }

    #[test]
    fn save_and_get_roundtrip() {
        let dir = tempdir().unwrap();
        let journal = journal_in(dir.path());

        let long = "x".repeat(100_000);
        for (i, text) in ["", "hello world", "多行\n日记 ✓", long.as_str()]
            .iter()
            .enumerate()
        {
            let date = day(2024, 6, 1 + i as u32);
            journal.save_entry(date, text, &[], &[]).unwrap();

            let entry = journal.get_entry(date).unwrap().unwrap();
            assert_eq!(entry.text(), *text);
            assert_eq!(entry.date(), date);
        }
    }

    #[test]
    fn example_entry_with_photo() {
        let dir = tempdir().unwrap();
        let journal = journal_in(dir.path());
        let date = day(2024, 1, 1);
        let png = b"\x89PNG\r\n\x1a\n...".to_vec();

        journal
            .save_entry(date, "hello world", &[png.clone()], &[])
            .unwrap();

        let entry = journal.get_entry(date).unwrap().unwrap();
        assert_eq!(entry.text(), "hello world");
        assert_eq!(entry.photos(), &[png]);
        assert!(entry.attachments().is_empty());
    }

    #[test]
    fn blobs_come_back_byte_identical() {
        let dir = tempdir().unwrap();
        let journal = journal_in(dir.path());
        let date = day(2024, 7, 4);

        let photos: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i; 1000 + i as usize]).collect();
        let attachments: Vec<Vec<u8>> = vec![b"%PDF-1.7".to_vec(), (0..=255u8).collect()];
        journal
            .save_entry(date, "blobs", &photos, &attachments)
            .unwrap();

        let entry = journal.get_entry(date).unwrap().unwrap();
        assert_eq!(entry.photos().len(), 3);
        assert_eq!(entry.attachments().len(), 2);
        for photo in &photos {
            assert!(entry.photos().contains(photo));
        }
        for attachment in &attachments {
            assert!(entry.attachments().contains(attachment));
        }
    }

    #[test]
    fn text_is_not_stored_in_the_clear() {
        let dir = tempdir().unwrap();
        let journal = journal_in(dir.path());
        let date = day(2024, 1, 2);

        journal.save_entry(date, "meet at the pier", &[], &[]).unwrap();
        journal.save_entry(date, "meet at the pier", &[], &[]).unwrap();

        let conn = rusqlite::Connection::open(journal.store_path()).unwrap();
        let stored: Vec<String> = conn
            .prepare("SELECT entry FROM journal_entries")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();

        assert_eq!(stored.len(), 2);
        assert_ne!(stored[0], stored[1]);
        assert!(stored.iter().all(|s| !s.contains("pier")));
    }

    #[test]
    fn wrong_key_fails_closed() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("journal.db");
        let date = day(2024, 1, 1);

        let k1 = Key::generate().unwrap();
        Journal::open_with_key(&db, k1, BlobLimits::default())
            .unwrap()
            .save_entry(date, "private", &[], &[])
            .unwrap();

        let k2 = Key::generate().unwrap();
        let other = Journal::open_with_key(&db, k2, BlobLimits::default()).unwrap();
        assert!(matches!(
            other.get_entry(date),
            Err(JournalError::Decryption)
        ));
    }

    #[test]
    fn regenerated_key_after_wipe_cannot_read_old_entries() {
        let dir = tempdir().unwrap();
        let date = day(2024, 8, 8);
        journal_in(dir.path())
            .save_entry(date, "before wipe", &[], &[])
            .unwrap();

        KeyFile::new(dir.path().join("key.key")).clear().unwrap();

        let journal = journal_in(dir.path());
        assert!(matches!(
            journal.get_entry(date),
            Err(JournalError::Decryption)
        ));
    }

    #[test]
    fn passphrase_key_reopens_journal() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("journal.db");
        let kdf = KdfParams::new(1024, 1, 1).unwrap();
        let date = day(2023, 12, 24);

        let key = derive_key_with_params("correct horse", kdf).unwrap();
        Journal::open_with_key(&db, key, BlobLimits::default())
            .unwrap()
            .save_entry(date, "eve", &[], &[])
            .unwrap();

        let again = derive_key_with_params("correct horse", kdf).unwrap();
        let journal = Journal::open_with_key(&db, again, BlobLimits::default()).unwrap();
        assert_eq!(journal.get_entry(date).unwrap().unwrap().text(), "eve");
    }

    #[test]
    fn missing_date_is_not_found() {
        let dir = tempdir().unwrap();
        let journal = journal_in(dir.path());
        journal.save_entry(day(2024, 1, 1), "x", &[], &[]).unwrap();

        assert!(journal.get_entry(day(2099, 12, 31)).unwrap().is_none());
    }

    #[test]
    fn latest_save_for_a_date_wins() {
        let dir = tempdir().unwrap();
        let journal = journal_in(dir.path());
        let date = day(2024, 2, 29);

        journal
            .save_entry(date, "draft", &[b"a".to_vec()], &[])
            .unwrap();
        journal.save_entry(date, "final", &[], &[]).unwrap();

        let entry = journal.get_entry(date).unwrap().unwrap();
        assert_eq!(entry.text(), "final");
        assert!(entry.photos().is_empty());
    }

    #[test]
    fn list_dates_has_one_element_per_entry() {
        let dir = tempdir().unwrap();
        let journal = journal_in(dir.path());
        let a = day(2024, 1, 1);
        let b = day(2024, 1, 5);

        assert!(journal.list_entry_dates().unwrap().is_empty());

        journal.save_entry(a, "1", &[], &[]).unwrap();
        journal.save_entry(b, "2", &[], &[]).unwrap();
        journal.save_entry(a, "3", &[], &[]).unwrap();

        let mut dates = journal.list_entry_dates().unwrap();
        dates.sort();
        assert_eq!(dates, vec![a, a, b]);
    }

    #[test]
    fn oversized_blob_is_rejected_before_writing() {
        let dir = tempdir().unwrap();
        let mut config = JournalConfig::new(dir.path().join("journal.db"), dir.path().join("key.key"));
        config.limits = BlobLimits::new(8);
        let journal = Journal::open(&config).unwrap();
        let date = day(2024, 4, 1);

        match journal.save_entry(date, "big", &[], &[vec![0u8; 9]]) {
            Err(JournalError::BlobTooLarge { kind, size, limit }) => {
                assert_eq!(kind, BlobKind::Attachment);
                assert_eq!(size, 9);
                assert_eq!(limit, 8);
            }
            other => panic!("expected BlobTooLarge, got: {other:?}"),
        }
        assert!(journal.list_entry_dates().unwrap().is_empty());

        journal.save_entry(date, "fits", &[vec![0u8; 8]], &[]).unwrap();
    }

    #[test]
    fn photo_covers_follow_latest_entries() {
        let dir = tempdir().unwrap();
        let journal = journal_in(dir.path());
        let a = day(2024, 9, 1);
        let b = day(2024, 9, 2);

        journal
            .save_entry(a, "a", &[b"cover".to_vec(), b"second".to_vec()], &[])
            .unwrap();
        journal.save_entry(b, "b", &[], &[b"att".to_vec()]).unwrap();

        let covers = journal.photo_covers().unwrap();
        assert_eq!(covers.len(), 1);
        assert_eq!(covers.get(&a).map(Vec::as_slice), Some(&b"cover"[..]));
    }

    #[test]
    fn open_is_idempotent_and_keeps_the_key() {
        let dir = tempdir().unwrap();
        let date = day(2024, 10, 10);

        journal_in(dir.path()).save_entry(date, "kept", &[], &[]).unwrap();
        let reopened = journal_in(dir.path());

        assert_eq!(reopened.get_entry(date).unwrap().unwrap().text(), "kept");
    }
}
