//! Batch driver over a maildir.
//!
//! Every file in `new/` is parsed, published as a page, appended to the log
//! and filed in its month's report, then moved to `cur/` with an `a`
//! (archived) or `e` (error) info flag. A file whose name cannot become a
//! page name is skipped and left in `new/`. Month pages touched by the batch
//! and the index page are regenerated at the end.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::MmapOptions;
use tracing::{debug, info, warn};

use crate::arena::Arena;
use crate::config::Config;
use crate::error::{ParseError, Result, SmakError};
use crate::export::html::Site;
use crate::index::format::Month;
use crate::index::report::{self, Report};
use crate::model::mail::{LogRecord, MsgId};
use crate::parser::eml::{parse_message, ParseOptions};
use crate::store::log::LogStore;

/// Info suffix for a message that was archived.
const ARCHIVED_SUFFIX: &str = ":2,a";
/// Info suffix for a message that could not be parsed.
const REJECTED_SUFFIX: &str = ":2,e";

/// What happened to one message.
#[derive(Debug)]
pub enum MessageOutcome {
    Archived { id: MsgId, month: Month },
    Rejected(ParseError),
    /// The file name is unusable; the file was not read.
    Skipped(String),
}

/// Totals for one run of [`Archiver::process_new_dir`].
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    pub archived: usize,
    pub rejected: usize,
    /// Files left in `new/` because of their name.
    pub skipped: usize,
    /// Bytes of mail read.
    pub bytes: u64,
    /// Months that received new messages.
    pub months: BTreeSet<Month>,
}

/// Archives a maildir into its store and www directories.
#[derive(Debug)]
pub struct Archiver {
    new_dir: PathBuf,
    cur_dir: PathBuf,
    store: LogStore,
    site: Site,
    arena: Arena,
    options: ParseOptions,
}

impl Archiver {
    /// Open the maildir at `root`, creating the store and www directories.
    pub fn open(root: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let root = root.as_ref();
        let new_dir = root.join("new");
        let cur_dir = root.join("cur");
        if !new_dir.is_dir() || !cur_dir.is_dir() {
            return Err(SmakError::NotAMaildir(root.to_path_buf()));
        }
        let store = LogStore::init(root.join(&config.archive.store_dir))?;
        let site = Site::open(root.join(&config.archive.www_dir), config)?;
        debug!(
            root = %root.display(),
            arena = config.archive.arena_capacity,
            "Opened maildir"
        );
        Ok(Self {
            new_dir,
            cur_dir,
            store,
            site,
            arena: Arena::with_capacity(config.archive.arena_capacity),
            options: ParseOptions {
                strict_dates: config.archive.strict_dates,
            },
        })
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Names of the files waiting in `new/`, in name order.
    pub fn pending(&self) -> Result<Vec<OsString>> {
        let read_dir =
            std::fs::read_dir(&self.new_dir).map_err(|e| SmakError::io(&self.new_dir, e))?;
        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| SmakError::io(&self.new_dir, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| SmakError::io(entry.path(), e))?;
            let name = entry.file_name();
            if !file_type.is_file() || name.to_string_lossy().starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Archive everything in `new/`.
    pub fn process_new_dir(&mut self) -> Result<BatchStats> {
        self.process_new_dir_with(|_, _| {})
    }

    /// Archive everything in `new/`, reporting `(done, total)` after each
    /// message.
    pub fn process_new_dir_with(
        &mut self,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<BatchStats> {
        let names = self.pending()?;
        let total = names.len();
        let mut stats = BatchStats::default();
        info!(dir = %self.new_dir.display(), count = total, "Processing new messages");

        for (i, name) in names.iter().enumerate() {
            let path = self.new_dir.join(name);
            stats.bytes += std::fs::metadata(&path)
                .map_err(|e| SmakError::io(&path, e))?
                .len();

            let suffix = match self.process_message(&path, name)? {
                MessageOutcome::Archived { id, month } => {
                    debug!(path = %path.display(), %id, %month, "Archived message");
                    stats.archived += 1;
                    stats.months.insert(month);
                    ARCHIVED_SUFFIX
                }
                MessageOutcome::Rejected(e) => {
                    warn!(path = %path.display(), error = %e, "Rejected message");
                    stats.rejected += 1;
                    REJECTED_SUFFIX
                }
                MessageOutcome::Skipped(reason) => {
                    warn!(path = %path.display(), reason = %reason, "Skipped message");
                    stats.skipped += 1;
                    progress(i + 1, total);
                    continue;
                }
            };
            let mut cur_name = name.clone();
            cur_name.push(suffix);
            let cur_path = self.cur_dir.join(cur_name);
            std::fs::rename(&path, &cur_path).map_err(|e| SmakError::io(&path, e))?;
            progress(i + 1, total);
        }

        self.publish_months(&stats.months)?;
        info!(
            archived = stats.archived,
            rejected = stats.rejected,
            skipped = stats.skipped,
            months = stats.months.len(),
            "Batch complete"
        );
        Ok(stats)
    }

    /// Archive one message file named `name`. Parse failures are returned as
    /// [`MessageOutcome::Rejected`] and unusable names as
    /// [`MessageOutcome::Skipped`]; only store and page errors are `Err`.
    pub fn process_message(&mut self, path: &Path, name: &OsString) -> Result<MessageOutcome> {
        self.arena.reset();

        let Some(uniq) = name.to_str() else {
            return Ok(MessageOutcome::Skipped(format!(
                "message name {name:?} is not UTF-8"
            )));
        };
        if let Err(e) = self.site.message_page_name(uniq.as_bytes()) {
            return Ok(MessageOutcome::Skipped(e.to_string()));
        }

        let file = File::open(path).map_err(|e| SmakError::io(path, e))?;
        let len = file.metadata().map_err(|e| SmakError::io(path, e))?.len();
        if len == 0 {
            return Ok(MessageOutcome::Rejected(ParseError::NoHeaderBoundary));
        }
        // SAFETY: the mapping is private; writes stay in our copy and a
        // concurrent writer to the file cannot invalidate it.
        let mut map = unsafe { MmapOptions::new().map_copy(&file) }
            .map_err(|e| SmakError::io(path, e))?;
        drop(file);

        let msg = match parse_message(&mut map[..], self.options) {
            Ok(msg) => msg,
            Err(e) => return Ok(MessageOutcome::Rejected(e)),
        };
        self.site.publish_message(uniq.as_bytes(), &msg)?;

        let time = msg.date.map(|d| d.timestamp());
        let fields = [
            self.arena.alloc_copy(msg.message_id)?,
            self.arena.alloc_copy(msg.from)?,
            self.arena.alloc_copy(msg.to)?,
            self.arena.alloc_copy(msg.in_reply_to)?,
            self.arena.alloc_copy(msg.subject)?,
        ];
        drop(map);

        let lost = || SmakError::InvalidRecord(format!("fields of {uniq} lost from arena"));
        let [message_id, from, to, in_reply_to, subject] =
            fields.map(|slot| self.arena.get(slot));
        let record = LogRecord {
            uniq: uniq.as_bytes(),
            message_id: message_id.ok_or_else(lost)?,
            time,
            from: from.ok_or_else(lost)?,
            to: to.ok_or_else(lost)?,
            in_reply_to: in_reply_to.ok_or_else(lost)?,
            subject: subject.ok_or_else(lost)?,
        };
        let id = self.store.append(&record)?;

        // Undated mail is filed at the epoch.
        let report_time = time.unwrap_or(0);
        let month = Month::from_time(report_time)
            .ok_or_else(|| SmakError::InvalidRecord(format!("time {report_time} out of range")))?;
        let mut report = Report::open(&self.store.report_dir(), month)?;
        report.insert(report_time, id);
        report.write()?;

        Ok(MessageOutcome::Archived { id, month })
    }

    /// Rebuild every month page and the index page. Returns the number of
    /// months.
    pub fn regenerate_pages(&mut self) -> Result<usize> {
        let months: BTreeSet<Month> = report::months(&self.store.report_dir())?
            .into_iter()
            .collect();
        self.publish_months(&months)?;
        Ok(months.len())
    }

    fn publish_months(&mut self, months: &BTreeSet<Month>) -> Result<()> {
        let log = self.store.snapshot()?;
        self.arena.reset();
        for &month in months {
            let report = Report::open(&self.store.report_dir(), month)?;
            self.site.publish_month(&report, &log, &mut self.arena)?;
        }
        let all = report::months(&self.store.report_dir())?;
        self.site.publish_index(&all)?;
        Ok(())
    }
}
