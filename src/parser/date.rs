//! RFC 822 / RFC 2822 `Date:` parsing.
//!
//! Grammar: `[weekday ","] day month year hour ":" minute [":" second] zone`.
//! The weekday is skipped without validation. The zone is a signed four digit
//! `±HHMM` offset or one of the obsolete RFC 822 zone names.

use std::ops::Range;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::DateError;
use crate::parser::token::{Token, TokenError, Tokenizer};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Obsolete zone names and their offsets in `HHMM` form.
const NAMED_ZONES: [(&str, i32); 11] = [
    ("UT", 0),
    ("GMT", 0),
    ("Z", 0),
    ("EST", -500),
    ("EDT", -400),
    ("CST", -600),
    ("CDT", -500),
    ("MST", -700),
    ("MDT", -600),
    ("PST", -800),
    ("PDT", -700),
];

/// Calendar fields as read from a `Date:` header.
///
/// `hour` and `minute` are already shifted to UTC by the zone offset and may
/// therefore be outside their usual ranges, including negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFields {
    pub year: i32,
    /// 1-based month.
    pub month: u32,
    pub day: u32,
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
    /// The zone offset as written, e.g. `200` for `+0200`.
    pub zone: i32,
}

impl DateFields {
    /// Convert to an instant, normalizing out-of-range fields the way
    /// `timegm` does: day 31 of a 30-day month is the 1st of the next, minute
    /// -30 is half an hour into the previous hour, and so on across month and
    /// year boundaries.
    pub fn to_utc(&self) -> Result<DateTime<Utc>, DateError> {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .ok_or(DateError::Unrepresentable)?;
        let offset = Duration::days(i64::from(self.day) - 1)
            + Duration::hours(i64::from(self.hour))
            + Duration::minutes(i64::from(self.minute))
            + Duration::seconds(i64::from(self.second));
        let midnight = first.and_hms_opt(0, 0, 0).ok_or(DateError::Unrepresentable)?;
        let naive = midnight
            .checked_add_signed(offset)
            .ok_or(DateError::Unrepresentable)?;
        Ok(naive.and_utc())
    }
}

/// Parse a raw `Date:` value into a UTC instant.
///
/// The buffer is scratch space for the tokenizer and may be modified.
pub fn parse_date(value: &mut [u8]) -> Result<DateTime<Utc>, DateError> {
    parse_date_fields(value)?.to_utc()
}

/// Parse a raw `Date:` value into calendar fields.
pub fn parse_date_fields(value: &mut [u8]) -> Result<DateFields, DateError> {
    let mut tok = DateTokens(Tokenizer::new(value));

    // Weekday, if the first atom is not a day number.
    let mut atom = tok.atom("day")?;
    if !tok.text(&atom).first().is_some_and(u8::is_ascii_digit) {
        tok.special(b',')?;
        atom = tok.atom("day")?;
    }
    let day = read_decimal(tok.text(&atom), 1, 31, "day")?;

    let atom = tok.atom("month")?;
    let name = tok.text(&atom);
    let month = MONTHS
        .iter()
        .position(|m| name.eq_ignore_ascii_case(m.as_bytes()))
        .ok_or_else(|| DateError::UnknownMonth(String::from_utf8_lossy(name).into_owned()))?;

    let year = tok.decimal(1900, 9999, "year")?;
    let mut hour = tok.decimal(0, 23, "hour")?;
    tok.special(b':')?;
    let mut minute = tok.decimal(0, 59, "minute")?;

    // Seconds are optional; 60 allows for leap seconds.
    let mut second = 0;
    let mut next = tok.next()?;
    if next == Token::Special(b':') {
        second = tok.decimal(0, 60, "second")?;
        next = tok.next()?;
    }

    let Token::Atom(zone_atom) = next else {
        return Err(DateError::Syntax("expected time zone".into()));
    };
    let zone = read_zone(tok.text(&zone_atom))?;
    hour -= zone / 100;
    minute -= zone % 100;

    if tok.next()? != Token::End {
        return Err(DateError::TrailingInput);
    }

    Ok(DateFields {
        year,
        month: month as u32 + 1,
        day: day as u32,
        hour,
        minute,
        second,
        zone,
    })
}

/// Tokenizer wrapper that reports errors in date terms.
struct DateTokens<'a>(Tokenizer<'a>);

impl DateTokens<'_> {
    fn next(&mut self) -> Result<Token, DateError> {
        self.0
            .next_token()
            .map_err(|e: TokenError| DateError::Syntax(e.to_string()))
    }

    fn text(&self, range: &Range<usize>) -> &[u8] {
        self.0.text(range)
    }

    fn atom(&mut self, what: &str) -> Result<Range<usize>, DateError> {
        match self.next()? {
            Token::Atom(r) => Ok(r),
            _ => Err(DateError::Syntax(format!("expected {what}"))),
        }
    }

    fn special(&mut self, c: u8) -> Result<(), DateError> {
        match self.next()? {
            Token::Special(s) if s == c => Ok(()),
            _ => Err(DateError::Syntax(format!("expected '{}'", c as char))),
        }
    }

    fn decimal(&mut self, min: i32, max: i32, field: &'static str) -> Result<i32, DateError> {
        let atom = self.atom(field)?;
        read_decimal(self.text(&atom), min, max, field)
    }
}

/// Read an unsigned decimal within `min..=max`.
fn read_decimal(text: &[u8], min: i32, max: i32, field: &'static str) -> Result<i32, DateError> {
    if text.is_empty() || text.len() > 9 || !text.iter().all(u8::is_ascii_digit) {
        return Err(DateError::Syntax(format!("{field} is not a number")));
    }
    let value = text
        .iter()
        .fold(0i32, |acc, &d| acc * 10 + i32::from(d - b'0'));
    if value < min || value > max {
        return Err(DateError::OutOfRange { field });
    }
    Ok(value)
}

/// Read `±HHMM` or an obsolete zone name.
fn read_zone(text: &[u8]) -> Result<i32, DateError> {
    if let Some((_, offset)) = NAMED_ZONES
        .iter()
        .find(|(name, _)| text.eq_ignore_ascii_case(name.as_bytes()))
    {
        return Ok(*offset);
    }
    let (sign, digits) = match text {
        [b'+', rest @ ..] => (1, rest),
        [b'-', rest @ ..] => (-1, rest),
        _ => return Err(DateError::Syntax("time zone needs a sign".into())),
    };
    if digits.len() != 4 {
        return Err(DateError::Syntax("time zone needs four digits".into()));
    }
    let value = read_decimal(digits, 0, 9999, "zone")?;
    if value % 100 >= 60 {
        return Err(DateError::OutOfRange { field: "zone" });
    }
    Ok(sign * value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(input: &str) -> Result<DateTime<Utc>, DateError> {
        let mut buf = input.as_bytes().to_vec();
        parse_date(&mut buf)
    }

    fn iso(input: &str) -> String {
        date(input).unwrap().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    #[test]
    fn test_rfc2822_with_weekday() {
        assert_eq!(iso("Mon, 15 Jan 2024 10:30:00 +0200"), "2024-01-15T08:30:00Z");
    }

    #[test]
    fn test_without_weekday_or_seconds() {
        assert_eq!(iso("4 Jan 2024 10:00 +0000"), "2024-01-04T10:00:00Z");
        assert_eq!(iso("04 jan 2024 10:00:05 -0000"), "2024-01-04T10:00:05Z");
    }

    #[test]
    fn test_comments_and_folding() {
        assert_eq!(
            iso("Thu, 04 Jan 2024\r\n 10:00:00 +0000 (UTC)"),
            "2024-01-04T10:00:00Z"
        );
    }

    #[test]
    fn test_negative_zone_crosses_year_end() {
        assert_eq!(iso("Tue, 31 Dec 2024 22:30:00 -0145"), "2025-01-01T00:15:00Z");
    }

    #[test]
    fn test_positive_zone_crosses_into_leap_day() {
        assert_eq!(iso("1 Mar 2024 01:00:00 +0130"), "2024-02-29T23:30:00Z");
        assert_eq!(iso("1 Mar 2023 01:00:00 +0130"), "2023-02-28T23:30:00Z");
        assert_eq!(iso("1 Jan 2024 00:00:00 +1400"), "2023-12-31T10:00:00Z");
    }

    #[test]
    fn test_day_overflow_and_leap_second_normalize() {
        assert_eq!(iso("31 Feb 2023 00:00:00 +0000"), "2023-03-03T00:00:00Z");
        assert_eq!(iso("31 Dec 2016 23:59:60 +0000"), "2017-01-01T00:00:00Z");
    }

    #[test]
    fn test_named_zones() {
        assert_eq!(iso("Thu, 04 Jan 2024 10:00:00 EST"), "2024-01-04T15:00:00Z");
        assert_eq!(iso("Thu, 04 Jan 2024 10:00:00 GMT"), "2024-01-04T10:00:00Z");
    }

    #[test]
    fn test_fields_keep_unnormalized_hour() {
        let mut buf = b"1 Jan 2024 00:10 +0130".to_vec();
        let fields = parse_date_fields(&mut buf).unwrap();
        assert_eq!(fields.hour, -1);
        assert_eq!(fields.minute, -20);
        assert_eq!(fields.zone, 130);
    }

    #[test]
    fn test_grammar_violations() {
        assert!(matches!(date(""), Err(DateError::Syntax(_))));
        assert!(matches!(date("Mon 15 Jan 2024 10:30 +0000"), Err(DateError::Syntax(_))));
        assert!(matches!(date("15 Foo 2024 10:30 +0000"), Err(DateError::UnknownMonth(m)) if m == "Foo"));
        assert!(matches!(date("15 January 2024 10:30 +0000"), Err(DateError::UnknownMonth(_))));
        assert!(matches!(date("15 Jan 2024 10:30"), Err(DateError::Syntax(_))));
        assert!(matches!(date("15 Jan 2024 10:30 0200"), Err(DateError::Syntax(_))));
        assert!(matches!(date("15 Jan 2024 10:30 +020"), Err(DateError::Syntax(_))));
        assert!(matches!(
            date("15 Jan 2024 10:30 +0000 extra"),
            Err(DateError::TrailingInput)
        ));
        assert!(matches!(date("15 Jan 2024 10-30 +0000"), Err(DateError::Syntax(_))));
    }

    #[test]
    fn test_range_checks() {
        assert_eq!(
            date("32 Jan 2024 10:30 +0000"),
            Err(DateError::OutOfRange { field: "day" })
        );
        assert_eq!(
            date("0 Jan 2024 10:30 +0000"),
            Err(DateError::OutOfRange { field: "day" })
        );
        assert_eq!(
            date("1 Jan 1899 10:30 +0000"),
            Err(DateError::OutOfRange { field: "year" })
        );
        assert_eq!(
            date("1 Jan 2024 24:00 +0000"),
            Err(DateError::OutOfRange { field: "hour" })
        );
        assert_eq!(
            date("1 Jan 2024 10:60 +0000"),
            Err(DateError::OutOfRange { field: "minute" })
        );
        assert_eq!(
            date("1 Jan 2024 10:30:61 +0000"),
            Err(DateError::OutOfRange { field: "second" })
        );
        assert_eq!(
            date("1 Jan 2024 10:30 +0075"),
            Err(DateError::OutOfRange { field: "zone" })
        );
    }
}
