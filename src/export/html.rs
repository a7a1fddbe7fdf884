//! HTML pages for the archive: one per message, one per month, and an index.
//!
//! Pages are written to a temporary file in the www directory and renamed
//! over the target, so a reader never sees a half-written page.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use percent_encoding::{percent_encode, AsciiSet, CONTROLS};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::arena::Arena;
use crate::config::Config;
use crate::error::{Result, SmakError};
use crate::index::format::Month;
use crate::index::report::Report;
use crate::model::mail::{DecodedMessage, LogRecord};
use crate::parser::span::{cspan, ByteSet};
use crate::store::log::LogSnapshot;
use crate::store::set_mode;

/// Name of the index page.
pub const INDEX_PAGE: &str = "index.html";

/// Bytes that cannot be copied into a page verbatim.
const UNSAFE: ByteSet = ByteSet::new(&[
    b'<', b'>', b'&', b'"', 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x0b, 0x0c,
    0x0e, 0x0f, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c,
    0x1d, 0x1e, 0x1f,
]);

/// Bytes of a message name that must be percent-encoded in a relative link.
/// The result needs no further HTML escaping.
const HREF: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// Write `text` with HTML metacharacters escaped. Control bytes other than
/// tab, newline and carriage return become `?`.
pub fn escape_html<W: Write>(w: &mut W, text: &[u8]) -> io::Result<()> {
    let mut rest = text;
    loop {
        let run = cspan(rest, &UNSAFE);
        w.write_all(&rest[..run])?;
        let Some((&byte, tail)) = rest[run..].split_first() else {
            return Ok(());
        };
        w.write_all(match byte {
            b'<' => b"&lt;",
            b'>' => b"&gt;",
            b'&' => b"&amp;",
            b'"' => b"&quot;",
            _ => b"?",
        })?;
        rest = tail;
    }
}

/// Renders pages into a www directory.
#[derive(Debug, Clone)]
pub struct Site {
    dir: PathBuf,
    title: String,
    footer: String,
    date_format: String,
    max_filename_length: usize,
}

impl Site {
    /// Create the www directory if needed.
    pub fn open(dir: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| SmakError::io(&dir, e))?;
        Ok(Self {
            dir,
            title: config.html.title.clone(),
            footer: config.html.footer.clone(),
            date_format: config.general.checked_date_format(),
            max_filename_length: config.archive.max_filename_length,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name of the page for message `uniq`.
    pub fn message_page_name(&self, uniq: &[u8]) -> Result<String> {
        let uniq = std::str::from_utf8(uniq)
            .map_err(|_| SmakError::InvalidRecord("message name is not UTF-8".into()))?;
        if uniq.is_empty() || uniq.contains(['/', '\0']) || uniq.starts_with('.') {
            return Err(SmakError::InvalidRecord(format!(
                "'{uniq}' cannot be used as a page name"
            )));
        }
        let name = format!("{uniq}.html");
        if name.len() > self.max_filename_length {
            return Err(SmakError::InvalidRecord(format!(
                "page name for '{uniq}' is too long"
            )));
        }
        Ok(name)
    }

    /// Publish the page for a freshly decoded message as `<uniq>.html`.
    pub fn publish_message(&self, uniq: &[u8], msg: &DecodedMessage<'_>) -> Result<PathBuf> {
        let name = self.message_page_name(uniq)?;
        self.publish(&name, |w, target| {
            self.write_message_page(w, msg)
                .map_err(|e| SmakError::io(target, e))
        })
    }

    /// Publish the page listing `report`, newest first. Each row is read
    /// from the log through `arena`, which is left as it was found.
    pub fn publish_month(
        &self,
        report: &Report,
        log: &LogSnapshot,
        arena: &mut Arena,
    ) -> Result<PathBuf> {
        let title = report.month().to_string();
        self.publish(&report.month().page_name(), |w, target| {
            let io_err = |e| SmakError::io(target, e);
            self.header(w, title.as_bytes()).map_err(io_err)?;
            w.write_all(b"<table>\n<tr>\n<th>Date</th>\n<th>Subject</th>\n<th>Author</th>\n</tr>\n")
                .map_err(io_err)?;
            for entry in report.entries().iter().rev() {
                let checkpoint = arena.checkpoint();
                let slots = log.read_into(entry.msg, arena)?;
                let record = slots.resolve(arena).ok_or_else(|| {
                    SmakError::InvalidRecord(format!("record {} lost from arena", entry.msg))
                })?;
                self.write_month_row(w, &record).map_err(io_err)?;
                arena.rewind(checkpoint);
            }
            w.write_all(b"</table>\n").map_err(io_err)?;
            self.footer(w).map_err(io_err)
        })
    }

    /// Publish the index page linking every month, newest first.
    pub fn publish_index(&self, months: &[Month]) -> Result<PathBuf> {
        self.publish(INDEX_PAGE, |w, target| {
            self.write_index_page(w, months)
                .map_err(|e| SmakError::io(target, e))
        })
    }

    fn write_message_page<W: Write>(&self, w: &mut W, msg: &DecodedMessage<'_>) -> io::Result<()> {
        self.header(w, msg.subject)?;
        w.write_all(b"<h1>")?;
        escape_html(w, msg.subject)?;
        w.write_all(b"</h1>\n<b>From:</b> ")?;
        escape_html(w, msg.from)?;
        w.write_all(b"<br/>\n<b>Date:</b> ")?;
        self.date(w, msg.date)?;
        w.write_all(b"<br/>\n<hr/>\n<pre>")?;
        escape_html(w, msg.body)?;
        w.write_all(b"</pre>\n")?;
        self.footer(w)
    }

    fn write_month_row<W: Write>(&self, w: &mut W, record: &LogRecord<'_>) -> io::Result<()> {
        w.write_all(b"<tr>\n<td>")?;
        self.date(w, record.date())?;
        write!(
            w,
            "</td>\n<td><a href=\"{}.html\">",
            percent_encode(record.uniq, HREF)
        )?;
        escape_html(w, record.subject)?;
        w.write_all(b"</a></td>\n<td>")?;
        escape_html(w, record.from)?;
        w.write_all(b"</td>\n</tr>\n")
    }

    fn write_index_page<W: Write>(&self, w: &mut W, months: &[Month]) -> io::Result<()> {
        self.header(w, self.title.as_bytes())?;
        w.write_all(b"<h1>")?;
        escape_html(w, self.title.as_bytes())?;
        w.write_all(b"</h1>\n<ul>\n")?;
        for month in months.iter().rev() {
            writeln!(w, "<li><a href=\"{}\">{month}</a></li>", month.page_name())?;
        }
        w.write_all(b"</ul>\n")?;
        self.footer(w)
    }

    fn header<W: Write>(&self, w: &mut W, title: &[u8]) -> io::Result<()> {
        w.write_all(b"<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n<title>")?;
        escape_html(w, title)?;
        w.write_all(b"</title>\n</head>\n<body>\n")
    }

    fn footer<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(b"\n<hr/>\n<small>")?;
        escape_html(w, self.footer.as_bytes())?;
        w.write_all(b"</small>\n</body>\n</html>\n")
    }

    fn date<W: Write>(&self, w: &mut W, date: Option<DateTime<Utc>>) -> io::Result<()> {
        match date {
            Some(d) => {
                let text = d.format(&self.date_format).to_string();
                escape_html(w, text.as_bytes())
            }
            None => w.write_all(b"unknown"),
        }
    }

    /// Write a page to a temporary file and atomically move it into place.
    fn publish<F>(&self, name: &str, render: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut BufWriter<&mut NamedTempFile>, &Path) -> Result<()>,
    {
        let target = self.dir.join(name);
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| SmakError::io(&self.dir, e))?;
        {
            let mut w = BufWriter::new(&mut tmp);
            render(&mut w, &target)?;
            w.flush().map_err(|e| SmakError::io(&target, e))?;
        }
        set_mode(tmp.path(), 0o640)?;
        tmp.persist(&target)
            .map_err(|e| SmakError::io(&target, e.error))?;
        debug!(path = %target.display(), "Published page");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::eml::{parse_message, ParseOptions};
    use crate::store::log::LogStore;

    fn escaped(text: &[u8]) -> String {
        let mut out = Vec::new();
        escape_html(&mut out, text).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escaped(b"plain"), "plain");
        assert_eq!(
            escaped(b"<a href=\"x\">&</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
        assert_eq!(escaped(b"a\0b\x1bc\td\r\ne"), "a?b?c\td\r\ne");
        assert_eq!(escaped(b""), "");
        assert_eq!(escaped("Café".as_bytes()), "Café");
    }

    #[test]
    fn test_message_page() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::open(dir.path().join("www"), &Config::default()).unwrap();
        let mut buf = b"Subject: <hi>\nFrom: a@b\nDate: 4 Jan 2024 10:00 +0000\n\nbody & more".to_vec();
        let msg = parse_message(&mut buf, ParseOptions::default()).unwrap();

        let path = site.publish_message(b"123.M1.host", &msg).unwrap();
        assert_eq!(path, dir.path().join("www/123.M1.host.html"));
        let page = std::fs::read_to_string(&path).unwrap();
        assert!(page.contains("<title>&lt;hi&gt;</title>"));
        assert!(page.contains("<b>From:</b> a@b"));
        assert!(page.contains("<b>Date:</b> 2024-01-04 10:00:00"));
        assert!(page.contains("<pre>body &amp; more</pre>"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o640);
        }
    }

    #[test]
    fn test_page_names_are_checked() {
        let mut config = Config::default();
        config.archive.max_filename_length = 12;
        let dir = tempfile::tempdir().unwrap();
        let site = Site::open(dir.path(), &config).unwrap();
        assert_eq!(site.message_page_name(b"short").unwrap(), "short.html");
        assert!(site.message_page_name(b"much-too-long").is_err());
        assert!(site.message_page_name(b"../etc").is_err());
        assert!(site.message_page_name(b"").is_err());
    }

    #[test]
    fn test_month_page_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::init(dir.path().join("smak")).unwrap();
        let site = Site::open(dir.path().join("www"), &Config::default()).unwrap();
        let month = Month {
            year: 2024,
            month: 1,
        };
        let mut report = Report::open(&store.report_dir(), month).unwrap();
        for (uniq, subject, time) in [
            (&b"old"[..], &b"Older"[..], 1_704_103_200),
            (b"new", b"Newer & better", 1_704_362_400),
        ] {
            let id = store
                .append(&LogRecord {
                    uniq,
                    message_id: b"",
                    time: Some(time),
                    from: b"x@y",
                    to: b"",
                    in_reply_to: b"",
                    subject,
                })
                .unwrap();
            report.insert(time, id);
        }

        let mut arena = Arena::with_capacity(256);
        let snapshot = store.snapshot().unwrap();
        let path = site.publish_month(&report, &snapshot, &mut arena).unwrap();
        assert_eq!(arena.used(), 0);

        let page = std::fs::read_to_string(path).unwrap();
        let newer = page.find("<a href=\"new.html\">Newer &amp; better</a>").unwrap();
        let older = page.find("<a href=\"old.html\">Older</a>").unwrap();
        assert!(newer < older);
        assert!(page.contains("<td>2024-01-04 10:00:00</td>"));
    }

    #[test]
    fn test_month_page_links_are_percent_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::init(dir.path().join("smak")).unwrap();
        let site = Site::open(dir.path().join("www"), &Config::default()).unwrap();
        let month = Month {
            year: 2024,
            month: 1,
        };
        let mut report = Report::open(&store.report_dir(), month).unwrap();
        for (i, uniq) in ["a#b?c%d", "x:y&z", "café"].iter().enumerate() {
            let id = store
                .append(&LogRecord {
                    uniq: uniq.as_bytes(),
                    message_id: b"",
                    time: Some(1_704_103_200 + i as i64),
                    from: b"",
                    to: b"",
                    in_reply_to: b"",
                    subject: b"s",
                })
                .unwrap();
            report.insert(1_704_103_200 + i as i64, id);
        }

        let mut arena = Arena::with_capacity(256);
        let snapshot = store.snapshot().unwrap();
        let path = site.publish_month(&report, &snapshot, &mut arena).unwrap();
        let page = std::fs::read_to_string(path).unwrap();
        assert!(page.contains("<a href=\"a%23b%3Fc%25d.html\">"));
        assert!(page.contains("<a href=\"x%3Ay%26z.html\">"));
        assert!(page.contains("<a href=\"caf%C3%A9.html\">"));
    }

    #[test]
    fn test_index_page_lists_months_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::open(dir.path(), &Config::default()).unwrap();
        let months = [
            Month {
                year: 2023,
                month: 12,
            },
            Month {
                year: 2024,
                month: 1,
            },
        ];
        let page = std::fs::read_to_string(site.publish_index(&months).unwrap()).unwrap();
        let jan = page.find("2024-01.html").unwrap();
        let dec = page.find("2023-12.html").unwrap();
        assert!(jan < dec);
        assert!(page.contains("<h1>Mail archive</h1>"));
    }

    #[test]
    fn test_bad_date_format_falls_back() {
        let mut config = Config::default();
        config.general.date_format = "%Q broken".into();
        let dir = tempfile::tempdir().unwrap();
        let site = Site::open(dir.path(), &config).unwrap();
        let mut out = Vec::new();
        site.date(&mut out, DateTime::from_timestamp(0, 0)).unwrap();
        assert_eq!(out, b"1970-01-01 00:00:00");
    }
}
