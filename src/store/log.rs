//! Central append-only log of archived messages.
//!
//! One line per message, seven tab-separated columns:
//!
//! ```text
//! uniq \t message-id \t time \t from \t to \t in-reply-to \t subject \n
//! ```
//!
//! A record is identified by the byte offset of its line ([`MsgId`]), which
//! is what the monthly reports store.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use tracing::{debug, trace};

use crate::arena::{Arena, Slot};
use crate::error::{Result, SmakError};
use crate::model::mail::{LogRecord, MsgId};
use crate::store::lock::FileLock;
use crate::store::set_mode;

/// File name of the log inside the store directory.
pub const LOG_FILE: &str = "log";

/// Directory holding the monthly reports inside the store directory.
pub const REPORT_DIR: &str = "report";

const COLUMNS: usize = 7;

/// Handle to the store directory and its log.
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
    path: PathBuf,
}

impl LogStore {
    /// Create the store directory and its `report/` subdirectory if needed.
    pub fn init(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let reports = dir.join(REPORT_DIR);
        if !reports.is_dir() {
            std::fs::create_dir_all(&reports).map_err(|e| SmakError::io(&reports, e))?;
            set_mode(&dir, 0o750)?;
            set_mode(&reports, 0o750)?;
            debug!(path = %dir.display(), "Initialized store directory");
        }
        let path = dir.join(LOG_FILE);
        Ok(Self { dir, path })
    }

    /// The store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the report directory.
    pub fn report_dir(&self) -> PathBuf {
        self.dir.join(REPORT_DIR)
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and return its identifier.
    ///
    /// The log is locked from reading the end offset until the line is
    /// written, so the offset names this record even with other writers.
    pub fn append(&self, record: &LogRecord<'_>) -> Result<MsgId> {
        let line = encode_line(record);
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| SmakError::io(&self.path, e))?;
        set_mode(&self.path, 0o640)?;
        let mut lock = FileLock::exclusive(file, &self.path)?;
        let offset = lock
            .file()
            .seek(SeekFrom::End(0))
            .map_err(|e| SmakError::io(&self.path, e))?;
        lock.file()
            .write_all(&line)
            .map_err(|e| SmakError::io(&self.path, e))?;
        trace!(offset, len = line.len(), "Appended log record");
        Ok(MsgId(offset))
    }

    /// Map the current contents of the log for reading.
    pub fn snapshot(&self) -> Result<LogSnapshot> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LogSnapshot { map: None })
            }
            Err(e) => return Err(SmakError::io(&self.path, e)),
        };
        let len = file
            .metadata()
            .map_err(|e| SmakError::io(&self.path, e))?
            .len();
        if len == 0 {
            return Ok(LogSnapshot { map: None });
        }
        // SAFETY: the log is only ever appended to, so the mapped prefix is
        // never modified while we hold it.
        let map = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| SmakError::io(&self.path, e))?;
        Ok(LogSnapshot { map: Some(map) })
    }

    /// Read one record, copying its columns into `arena`.
    pub fn read(&self, id: MsgId, arena: &mut Arena) -> Result<ArenaRecord> {
        self.snapshot()?.read_into(id, arena)
    }

    /// All records in log order.
    pub fn records(&self) -> Result<Vec<(MsgId, OwnedRecord)>> {
        let snapshot = self.snapshot()?;
        snapshot
            .iter()
            .map(|r| r.map(|(id, rec)| (id, OwnedRecord::from(&rec))))
            .collect()
    }
}

/// A read-only mapping of the log.
#[derive(Debug)]
pub struct LogSnapshot {
    map: Option<Mmap>,
}

impl LogSnapshot {
    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or_default()
    }

    /// Length of the mapped log in bytes.
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Whether the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the record at `id` from the mapping.
    pub fn get(&self, id: MsgId) -> Result<LogRecord<'_>> {
        let log = self.bytes();
        let start = usize::try_from(id.0)
            .ok()
            .filter(|&s| s < log.len())
            .ok_or_else(|| SmakError::InvalidRecord(format!("offset {id} is past end of log")))?;
        if start > 0 && log[start - 1] != b'\n' {
            return Err(SmakError::InvalidRecord(format!(
                "offset {id} is not the start of a record"
            )));
        }
        decode_line(log, start).map(|(record, _)| record)
    }

    /// Copy the record at `id` into `arena`.
    pub fn read_into(&self, id: MsgId, arena: &mut Arena) -> Result<ArenaRecord> {
        let record = self.get(id)?;
        Ok(ArenaRecord {
            uniq: arena.alloc_copy(record.uniq)?,
            message_id: arena.alloc_copy(record.message_id)?,
            time: record.time,
            from: arena.alloc_copy(record.from)?,
            to: arena.alloc_copy(record.to)?,
            in_reply_to: arena.alloc_copy(record.in_reply_to)?,
            subject: arena.alloc_copy(record.subject)?,
        })
    }

    /// Iterate every record with its identifier.
    pub fn iter(&self) -> impl Iterator<Item = Result<(MsgId, LogRecord<'_>)>> + '_ {
        let log = self.bytes();
        let mut pos = 0;
        std::iter::from_fn(move || {
            if pos >= log.len() {
                return None;
            }
            let start = pos;
            match decode_line(log, start) {
                Ok((record, next)) => {
                    pos = next;
                    Some(Ok((MsgId(start as u64), record)))
                }
                Err(e) => {
                    pos = log.len();
                    Some(Err(e))
                }
            }
        })
    }
}

/// A log record whose columns live in an [`Arena`].
#[derive(Debug, Clone, Copy)]
pub struct ArenaRecord {
    pub uniq: Slot,
    pub message_id: Slot,
    pub time: Option<i64>,
    pub from: Slot,
    pub to: Slot,
    pub in_reply_to: Slot,
    pub subject: Slot,
}

impl ArenaRecord {
    /// Borrow the columns back out of the arena. `None` once the arena has
    /// been reset or rewound past the allocation.
    pub fn resolve<'a>(&self, arena: &'a Arena) -> Option<LogRecord<'a>> {
        Some(LogRecord {
            uniq: arena.get(self.uniq)?,
            message_id: arena.get(self.message_id)?,
            time: self.time,
            from: arena.get(self.from)?,
            to: arena.get(self.to)?,
            in_reply_to: arena.get(self.in_reply_to)?,
            subject: arena.get(self.subject)?,
        })
    }
}

/// Owned copy of a log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRecord {
    pub uniq: Vec<u8>,
    pub message_id: Vec<u8>,
    pub time: Option<i64>,
    pub from: Vec<u8>,
    pub to: Vec<u8>,
    pub in_reply_to: Vec<u8>,
    pub subject: Vec<u8>,
}

impl OwnedRecord {
    /// Borrow as a [`LogRecord`].
    pub fn as_record(&self) -> LogRecord<'_> {
        LogRecord {
            uniq: &self.uniq,
            message_id: &self.message_id,
            time: self.time,
            from: &self.from,
            to: &self.to,
            in_reply_to: &self.in_reply_to,
            subject: &self.subject,
        }
    }
}

impl From<&LogRecord<'_>> for OwnedRecord {
    fn from(r: &LogRecord<'_>) -> Self {
        Self {
            uniq: r.uniq.to_vec(),
            message_id: r.message_id.to_vec(),
            time: r.time,
            from: r.from.to_vec(),
            to: r.to.to_vec(),
            in_reply_to: r.in_reply_to.to_vec(),
            subject: r.subject.to_vec(),
        }
    }
}

fn encode_line(record: &LogRecord<'_>) -> Vec<u8> {
    let time = record.time.map(|t| t.to_string()).unwrap_or_default();
    let columns: [&[u8]; COLUMNS] = [
        record.uniq,
        record.message_id,
        time.as_bytes(),
        record.from,
        record.to,
        record.in_reply_to,
        record.subject,
    ];
    let mut line = Vec::with_capacity(columns.iter().map(|c| c.len() + 1).sum());
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            line.push(b'\t');
        }
        line.extend(column.iter().map(|&b| match b {
            b'\t' | b'\r' | b'\n' => b' ',
            other => other,
        }));
    }
    line.push(b'\n');
    line
}

/// Decode the line starting at `start`. Returns the record and the offset of
/// the following line.
fn decode_line(log: &[u8], start: usize) -> Result<(LogRecord<'_>, usize)> {
    let corrupt = || SmakError::CorruptLog {
        offset: start as u64,
    };
    let mut columns: [&[u8]; COLUMNS] = [&[]; COLUMNS];
    let mut cursor = start;
    for (i, column) in columns.iter_mut().enumerate() {
        let delim = if i == COLUMNS - 1 { b'\n' } else { b'\t' };
        let end = memchr::memchr(delim, &log[cursor..])
            .map(|n| cursor + n)
            .ok_or_else(corrupt)?;
        let value = &log[cursor..end];
        // A record never spans lines.
        if memchr::memchr(b'\n', value).is_some() {
            return Err(corrupt());
        }
        *column = value;
        cursor = end + 1;
    }
    let time = match columns[2] {
        [] => None,
        digits => Some(
            std::str::from_utf8(digits)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(corrupt)?,
        ),
    };
    let record = LogRecord {
        uniq: columns[0],
        message_id: columns[1],
        time,
        from: columns[3],
        to: columns[4],
        in_reply_to: columns[5],
        subject: columns[6],
    };
    Ok((record, cursor))
}
