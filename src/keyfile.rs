//! Key file persistence.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::crypto::{Key, secure_random};
use crate::error::{JournalError, Result};

/// The file holding the journal key.
///
/// Presence of the file decides first-run versus later-run behavior. The
/// provisioning utility may truncate it after a session; an empty file is
/// treated the same as a missing one.
#[derive(Debug, Clone)]
pub struct KeyFile {
    path: PathBuf,
}

impl KeyFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the key file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `InvalidKey` if it does not hold a key.
    pub fn load(&self) -> Result<Key> {
        let data = Zeroizing::new(fs::read(&self.path).map_err(|e| self.io(e))?);
        Key::from_file_bytes(&data)
    }

    /// Returns the stored key, or generates and stores a new one when the
    /// file is missing or empty.
    pub fn load_or_create(&self) -> Result<Key> {
        let data = match fs::read(&self.path) {
            Ok(data) => Zeroizing::new(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no key file found; generating a new key");
                return self.create();
            }
            Err(e) => return Err(self.io(e)),
        };

        if data.trim_ascii().is_empty() {
            warn!(
                path = %self.path.display(),
                "key file is empty; generating a new key, earlier entries will not decrypt"
            );
            return self.create();
        }

        Key::from_file_bytes(&data)
    }

    fn create(&self) -> Result<Key> {
        let key = Key::generate()?;
        self.save(&key)?;
        Ok(key)
    }

    /// Writes the key in text form, replacing any existing file.
    ///
    /// Data goes to a temporary file in the same directory which is synced
    /// and then renamed over the target, so a crash leaves either the old or
    /// the new key, never a partial one. The parent directory must exist.
    pub fn save(&self, key: &Key) -> Result<()> {
        let text = key.to_text();
        let tmp_path = self.random_tmp_path()?;

        let mut tmp_file = open_private(&tmp_path).map_err(|e| JournalError::io(&tmp_path, e))?;

        let written = tmp_file
            .write_all(text.as_bytes())
            .and_then(|_| tmp_file.sync_all());
        drop(tmp_file);

        if let Err(e) = written.and_then(|_| self.atomic_replace(&tmp_path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(self.io(e));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)
                .and_then(|dir| dir.sync_all())
                .map_err(|e| JournalError::io(parent, e))?;
        }

        info!(path = %self.path.display(), "key file written");
        Ok(())
    }

    /// Truncates the key file to zero length.
    pub fn clear(&self) -> Result<()> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .and_then(|file| file.sync_all())
            .map_err(|e| self.io(e))?;

        info!(path = %self.path.display(), "key file cleared");
        Ok(())
    }

    fn io(&self, source: io::Error) -> JournalError {
        JournalError::io(&self.path, source)
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        secure_random(&mut buf)?;

        let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "key".to_string());

        Ok(self
            .path
            .with_file_name(format!("{file_name}.tmp.{rand_string}")))
    }

    /// Atomically replaces the key file with the temporary file.
    ///
    /// Uses Windows `ReplaceFileW` with `REPLACEFILE_WRITE_THROUGH` when the
    /// target already exists, plain rename otherwise.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> io::Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            return fs::rename(tmp_path, &self.path);
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// On Unix, `rename()` is atomic when both paths are on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> io::Result<()> {
        fs::rename(tmp_path, &self.path)
    }
}

/// Creates a new file readable only by the owner where the platform allows it.
fn open_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

/// Loads the key at `path`, creating one on first run.
pub fn load_or_create_key(path: impl Into<PathBuf>) -> Result<Key> {
    KeyFile::new(path.into()).load_or_create()
}
