//! Monthly report files: the time-ordered list of messages in each month.
//!
//! A report is replaced as a whole by writing a temporary file and renaming
//! it into place. Writers serialize on a lock file in the report directory
//! and merge their inserts into whatever is on disk at that point, so two
//! runs filing into the same month do not lose each other's entries.

use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, SmakError};
use crate::index::format::{Month, ReportEntry, ENTRY_SIZE};
use crate::model::mail::MsgId;
use crate::store::lock::FileLock;
use crate::store::set_mode;

/// Lock file shared by all writers of a report directory.
pub const LOCK_FILE: &str = ".lock";

/// A month's report, loaded in full.
#[derive(Debug)]
pub struct Report {
    dir: PathBuf,
    path: PathBuf,
    month: Month,
    entries: Vec<ReportEntry>,
    /// Inserted since the last write.
    pending: Vec<ReportEntry>,
}

impl Report {
    /// Load the report for `month` from `dir`. A missing file is an empty
    /// report.
    pub fn open(dir: &Path, month: Month) -> Result<Self> {
        let path = dir.join(month.to_string());
        let entries = read_entries(&path)?;
        debug!(path = %path.display(), count = entries.len(), "Loaded report");
        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            month,
            entries,
            pending: Vec::new(),
        })
    }

    pub fn month(&self) -> Month {
        self.month
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert after every entry not newer than `time`. The entry reaches the
    /// file on the next [`write`](Self::write).
    pub fn insert(&mut self, time: i64, msg: MsgId) {
        let entry = ReportEntry { time, msg };
        insert_sorted(&mut self.entries, entry);
        self.pending.push(entry);
    }

    /// Merge the pending inserts into the report on disk and replace it.
    ///
    /// Afterwards [`entries`](Self::entries) reflects the file as written,
    /// including entries other writers added since this report was opened.
    pub fn write(&mut self) -> Result<()> {
        let _lock = FileLock::create(self.dir.join(LOCK_FILE))?;
        let mut entries = read_entries(&self.path)?;
        for &entry in &self.pending {
            insert_sorted(&mut entries, entry);
        }

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| SmakError::io(&self.dir, e))?;
        {
            let mut w = BufWriter::new(&mut tmp);
            for entry in &entries {
                entry
                    .write_to(&mut w)
                    .map_err(|e| SmakError::io(&self.path, e))?;
            }
            w.flush().map_err(|e| SmakError::io(&self.path, e))?;
        }
        set_mode(tmp.path(), 0o640)?;
        tmp.persist(&self.path)
            .map_err(|e| SmakError::io(&self.path, e.error))?;
        debug!(
            path = %self.path.display(),
            count = entries.len(),
            merged = self.pending.len(),
            "Wrote report"
        );

        self.entries = entries;
        self.pending.clear();
        Ok(())
    }
}

fn insert_sorted(entries: &mut Vec<ReportEntry>, entry: ReportEntry) {
    let idx = entries.partition_point(|e| e.time <= entry.time);
    entries.insert(idx, entry);
}

fn read_entries(path: &Path) -> Result<Vec<ReportEntry>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SmakError::io(path, e)),
    };
    if data.len() % ENTRY_SIZE != 0 {
        return Err(SmakError::CorruptReport {
            path: path.to_path_buf(),
            reason: format!("length {} is not a multiple of {ENTRY_SIZE}", data.len()),
        });
    }
    let count = data.len() / ENTRY_SIZE;
    let mut cursor = Cursor::new(data);
    (0..count)
        .map(|_| ReportEntry::read_from(&mut cursor))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| SmakError::io(path, e))
}

/// Months that have a report in `dir`, oldest first.
pub fn months(dir: &Path) -> Result<Vec<Month>> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SmakError::io(dir, e)),
    };
    let mut months = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| SmakError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            warn!(name = ?name, "Ignoring unexpected file in report directory");
            continue;
        };
        // The lock file and in-flight temporary files.
        if name.starts_with('.') {
            continue;
        }
        match name.parse::<Month>() {
            Ok(month) => months.push(month),
            Err(_) => warn!(name, "Ignoring unexpected file in report directory"),
        }
    }
    months.sort_unstable();
    Ok(months)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN: Month = Month {
        year: 2024,
        month: 1,
    };

    #[test]
    fn test_insert_keeps_time_order_and_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = Report::open(dir.path(), JAN).unwrap();
        assert!(report.is_empty());
        report.insert(30, MsgId(1));
        report.insert(10, MsgId(2));
        report.insert(30, MsgId(3));
        report.insert(20, MsgId(4));
        let msgs: Vec<u64> = report.entries().iter().map(|e| e.msg.0).collect();
        assert_eq!(msgs, [2, 4, 1, 3]);
    }

    #[test]
    fn test_write_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = Report::open(dir.path(), JAN).unwrap();
        report.insert(5, MsgId(100));
        report.insert(1, MsgId(0));
        report.write().unwrap();
        assert_eq!(
            std::fs::metadata(dir.path().join("2024-01")).unwrap().len(),
            32
        );

        let reopened = Report::open(dir.path(), JAN).unwrap();
        assert_eq!(reopened.entries(), report.entries());
        assert_eq!(reopened.month(), JAN);
    }

    #[test]
    fn test_two_writers_keep_both_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = Report::open(dir.path(), JAN).unwrap();
        let mut b = Report::open(dir.path(), JAN).unwrap();

        a.insert(10, MsgId(0));
        a.write().unwrap();
        b.insert(20, MsgId(100));
        b.write().unwrap();

        let times: Vec<i64> = b.entries().iter().map(|e| e.time).collect();
        assert_eq!(times, [10, 20]);
        let reopened = Report::open(dir.path(), JAN).unwrap();
        assert_eq!(reopened.entries(), b.entries());
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writers: Vec<_> = (0..4u64)
            .map(|w| {
                let dir = dir.path().to_path_buf();
                std::thread::spawn(move || {
                    for i in 0..25u64 {
                        let mut report = Report::open(&dir, JAN).unwrap();
                        report.insert(i as i64, MsgId(w * 1000 + i));
                        report.write().unwrap();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let report = Report::open(dir.path(), JAN).unwrap();
        assert_eq!(report.len(), 100);
        assert!(report.entries().windows(2).all(|p| p[0].time <= p[1].time));
    }

    #[test]
    fn test_write_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = Report::open(dir.path(), JAN).unwrap();
        report.insert(1, MsgId(0));
        report.write().unwrap();
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, [LOCK_FILE, "2024-01"]);
        assert_eq!(months(dir.path()).unwrap(), [JAN]);
    }

    #[test]
    fn test_truncated_report_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("2024-01"), [0u8; 17]).unwrap();
        assert!(matches!(
            Report::open(dir.path(), JAN),
            Err(SmakError::CorruptReport { .. })
        ));
    }

    #[test]
    fn test_months_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2024-02", "2023-12", "2024-01", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let found: Vec<String> = months(dir.path())
            .unwrap()
            .iter()
            .map(Month::to_string)
            .collect();
        assert_eq!(found, ["2023-12", "2024-01", "2024-02"]);
        assert!(months(&dir.path().join("missing")).unwrap().is_empty());
    }
}
