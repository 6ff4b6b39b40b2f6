//! # Thread Cursor Store
//!
//! Durable per-thread reading position. One file per watched thread, named by
//! the MD5 hex digest of its canonical address, holding two newline-separated
//! integers: the watermark and the last page processed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, WatchError};
use crate::forum::ThreadAddress;
use crate::utils::content_hash;

/// Extension of cursor files inside the saves directory.
pub const CURSOR_EXTENSION: &str = "save";

/// Reading position of one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Highest message sequence number already processed.
    pub last_message_seq: u64,
    /// Highest page fully scanned; `0` means unknown.
    pub last_page_processed: u32,
}

impl Default for Cursor {
    /// Position of a thread never read before. Message #1 counts as seen.
    fn default() -> Self {
        Self {
            last_message_seq: 1,
            last_page_processed: 0,
        }
    }
}

impl Cursor {
    pub fn new(last_message_seq: u64, last_page_processed: u32) -> Self {
        Self {
            last_message_seq,
            last_page_processed,
        }
    }

    /// Page a sweep should start from.
    pub fn start_page(&self) -> u32 {
        self.last_page_processed.max(1)
    }

    fn encode(&self) -> String {
        format!("{}\n{}", self.last_message_seq, self.last_page_processed)
    }

    /// Parses the on-disk form. Surrounding whitespace and a trailing newline
    /// are tolerated.
    fn decode(text: &str, path: &Path) -> Result<Self> {
        let corrupt = |reason: String| WatchError::CorruptCursor {
            path: path.to_path_buf(),
            reason,
        };

        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let (Some(seq), Some(page)) = (lines.next(), lines.next()) else {
            return Err(corrupt("expected two lines".to_string()));
        };
        let last_message_seq = seq
            .parse()
            .map_err(|_| corrupt(format!("bad sequence number {seq:?}")))?;
        let last_page_processed = page
            .parse()
            .map_err(|_| corrupt(format!("bad page number {page:?}")))?;

        Ok(Self::new(last_message_seq, last_page_processed))
    }
}

/// Directory of cursor files.
#[derive(Debug, Clone)]
pub struct CursorStore {
    dir: PathBuf,
}

impl CursorStore {
    /// Opens the store, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the cursor file for `address`.
    pub fn path_for(&self, address: &ThreadAddress) -> PathBuf {
        self.dir
            .join(format!("{}.{CURSOR_EXTENSION}", content_hash(address.as_str())))
    }

    /// Reads the cursor for `address`. `Ok(None)` when nothing was saved yet.
    ///
    /// # Errors
    /// [`WatchError::CorruptCursor`] when the file exists but cannot be parsed,
    /// [`WatchError::Io`] on read failures.
    pub fn load(&self, address: &ThreadAddress) -> Result<Option<Cursor>> {
        let path = self.path_for(address);
        match fs::read_to_string(&path) {
            Ok(text) => Cursor::decode(&text, &path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replaces the cursor for `address`. Readers see either the
    /// previous pair or the new one.
    pub fn save(&self, address: &ThreadAddress, cursor: &Cursor) -> Result<()> {
        let path = self.path_for(address);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(cursor.encode().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| WatchError::Io(e.error))?;

        debug!(thread = %address, seq = cursor.last_message_seq, page = cursor.last_page_processed, "cursor saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ThreadAddress {
        ThreadAddress::parse("https://www.mediavida.com/foro/mafia/fortaleza-frontera-iv-remake-710835").unwrap()
    }

    #[test]
    fn round_trips_a_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path()).unwrap();
        store.save(&address(), &Cursor::new(42, 7)).unwrap();
        assert_eq!(store.load(&address()).unwrap(), Some(Cursor::new(42, 7)));

        store.save(&address(), &Cursor::new(43, 8)).unwrap();
        assert_eq!(store.load(&address()).unwrap(), Some(Cursor::new(43, 8)));
    }

    #[test]
    fn missing_file_means_never_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("nested")).unwrap();
        assert_eq!(store.load(&address()).unwrap(), None);
        assert_eq!(Cursor::default(), Cursor::new(1, 0));
        assert_eq!(Cursor::default().start_page(), 1);
    }

    #[test]
    fn file_name_is_the_address_digest() {
        let store = CursorStore::new(tempfile::tempdir().unwrap().path()).unwrap();
        let name = store.path_for(&address());
        let name = name.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, format!("{}.save", content_hash(address().as_str())));
        assert_eq!(name.len(), 32 + ".save".len());
    }

    #[test]
    fn reads_files_written_with_a_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path()).unwrap();
        fs::write(store.path_for(&address()), "120\n9\n").unwrap();
        assert_eq!(store.load(&address()).unwrap(), Some(Cursor::new(120, 9)));
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path()).unwrap();
        for garbage in ["", "12", "twelve\n3", "12\n-1"] {
            fs::write(store.path_for(&address()), garbage).unwrap();
            assert!(
                matches!(store.load(&address()), Err(WatchError::CorruptCursor { .. })),
                "{garbage:?}"
            );
        }
    }
}
