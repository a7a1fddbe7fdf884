//! Binary monthly report format.
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ ENTRY 0 (16 bytes)                   │
//! │  time: i64 (LE, Unix seconds)        │
//! │  msg:  u64 (LE, offset into the log) │
//! ├──────────────────────────────────────┤
//! │ ENTRY 1 ...                          │
//! └──────────────────────────────────────┘
//! ```
//!
//! There is no header. Entries are sorted by `time`, and entries with equal
//! times keep insertion order. The file for a month is named `YYYY-MM`.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike};

use crate::model::mail::MsgId;

/// Size of one serialized [`ReportEntry`].
pub const ENTRY_SIZE: usize = 16;

/// One report entry: when the message was sent and where its log record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportEntry {
    pub time: i64,
    pub msg: MsgId,
}

impl ReportEntry {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i64::<LittleEndian>(self.time)?;
        w.write_u64::<LittleEndian>(self.msg.0)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let time = r.read_i64::<LittleEndian>()?;
        let msg = MsgId(r.read_u64::<LittleEndian>()?);
        Ok(Self { time, msg })
    }
}

/// A calendar month, the unit reports and month pages are kept in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    pub year: i32,
    /// 1-based.
    pub month: u32,
}

impl Month {
    /// The UTC month containing `time`. `None` outside chrono's range.
    pub fn from_time(time: i64) -> Option<Self> {
        let date = DateTime::from_timestamp(time, 0)?;
        Some(Self {
            year: date.year(),
            month: date.month(),
        })
    }

    /// Name of the month page in the www directory.
    pub fn page_name(&self) -> String {
        format!("{self}.html")
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .filter(|(y, m)| y.len() == 4 && m.len() == 2)
            .ok_or_else(|| format!("'{s}' is not YYYY-MM"))?;
        let year: i32 = year.parse().map_err(|_| format!("bad year in '{s}'"))?;
        let month: u32 = month.parse().map_err(|_| format!("bad month in '{s}'"))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range in '{s}'"));
        }
        Ok(Self { year, month })
    }
}
