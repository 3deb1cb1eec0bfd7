use std::fmt;
use std::io::{self, Read};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use coffer_store::Entry;

/// Permission bits reported for every file: read-only for the owner.
pub const FILE_MODE: u32 = 0o400;

/// An open, read-only file. Reads yield the plaintext content.
pub struct ImmutableFile {
    reader: Box<dyn Read + Send>,
    entry: Entry,
}

impl ImmutableFile {
    pub(crate) fn new(reader: Box<dyn Read + Send>, entry: Entry) -> Self {
        Self { reader, entry }
    }

    pub fn stat(&self) -> FileInfo {
        FileInfo {
            name: self.entry.name.clone(),
            size: self.entry.size,
            modified: to_system_time(self.entry.ts),
        }
    }

    /// The entry this file was opened from.
    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

impl Read for ImmutableFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ImmutableFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmutableFile")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

/// Metadata of an [`ImmutableFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    name: String,
    size: u64,
    modified: SystemTime,
}

impl FileInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mode(&self) -> u32 {
        FILE_MODE
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn is_dir(&self) -> bool {
        false
    }
}

fn to_system_time(ts: i64) -> SystemTime {
    let offset = Duration::from_secs(ts.unsigned_abs());
    if ts >= 0 {
        UNIX_EPOCH + offset
    } else {
        UNIX_EPOCH - offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_reflects_entry() {
        let entry = Entry {
            id: 3,
            name: "hello2.txt".to_string(),
            size: 12,
            ts: 1_646_149_434,
            owner_id: 2,
            checksum: "7f83".to_string(),
        };
        let file = ImmutableFile::new(Box::new(io::empty()), entry);
        let info = file.stat();

        assert_eq!(info.name(), "hello2.txt");
        assert_eq!(info.size(), 12);
        assert_eq!(info.mode(), 0o400);
        assert!(!info.is_dir());
        assert_eq!(
            info.modified(),
            UNIX_EPOCH + Duration::from_secs(1_646_149_434)
        );
        assert_eq!(file.entry().id, 3);
    }

    #[test]
    fn test_negative_timestamp() {
        assert_eq!(
            to_system_time(-60),
            UNIX_EPOCH - Duration::from_secs(60)
        );
    }
}
