//! Wire framing checks and the text grammars used by both protocol roles.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use regex::Regex;

/// Mailbox grammar: `dot-string "@" domain`, where the domain is either
/// at least two dot-joined sub-domains or a bracketed IPv4 literal.
const MAILBOX_PATTERN: &str = concat!(
    r"^[A-Za-z0-9][A-Za-z0-9-]*(\.[A-Za-z0-9][A-Za-z0-9-]*)*",
    r"@",
    r"([A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)+",
    r"|\[[1-9][0-9]{1,2}(\.[1-9][0-9]{1,2}){3}\])$",
);

const IPV4_PATTERN: &str = r"^[0-9]{1,3}(\.[0-9]{1,3}){3}$";

/// Date grammar: mandatory day-of-week, 1-2 digit day, English month
/// abbreviation, 4-digit year, HH:MM with optional seconds, numeric zone.
const DATE_PATTERN: &str = concat!(
    r"^(Mon|Tue|Wed|Thu|Fri|Sat|Sun),?\s([0-9]{1,2})",
    r"\s(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)",
    r"\s([0-9]{4})\s([0-9]{2}):([0-9]{2})(:([0-9]{2}))?",
    r"\s([+\-][0-9]{4})\s?$",
);

static MAILBOX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(MAILBOX_PATTERN).unwrap());
static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(IPV4_PATTERN).unwrap());
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(DATE_PATTERN).unwrap());

/// Check whether a wire unit carries the mandatory CRLF terminator.
pub fn is_smtp_message(msg: &str) -> bool {
    msg.ends_with("\r\n")
}

/// Encode an ASCII message into its base64 wire form.
pub fn encode_base64(message: &str) -> String {
    BASE64.encode(message.as_bytes())
}

/// Decode a base64 wire form back into an ASCII message.
///
/// Returns `None` for invalid base64 and for payloads that are not ASCII.
pub fn decode_base64(encoded: &str) -> Option<String> {
    let bytes = BASE64.decode(encoded.as_bytes()).ok()?;
    if !bytes.is_ascii() {
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Check a mailbox address against the dialect's dot-string@domain grammar.
pub fn is_valid_address(addr: &str) -> bool {
    MAILBOX_RE.is_match(addr)
}

/// Check the EHLO argument shape (a dotted IPv4 literal).
pub fn is_ipv4_literal(s: &str) -> bool {
    IPV4_RE.is_match(s)
}

/// Parse an RFC 5322 date header value.
///
/// Returns `None` when the text does not satisfy the grammar or names an
/// impossible calendar date or zone.
pub fn parse_rfc5322_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    let caps = DATE_RE.captures(raw)?;

    let day: u32 = caps[2].parse().ok()?;
    let month = month_number(&caps[3])?;
    let year: i32 = caps[4].parse().ok()?;
    let hour: u32 = caps[5].parse().ok()?;
    let minute: u32 = caps[6].parse().ok()?;
    let second: u32 = match caps.get(8) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };

    let zone = &caps[9];
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let zone_hours: i32 = zone[1..3].parse().ok()?;
    let zone_minutes: i32 = zone[3..5].parse().ok()?;
    let offset = FixedOffset::east_opt(sign * (zone_hours * 3600 + zone_minutes * 60))?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    offset.from_local_datetime(&date.and_time(time)).single()
}

fn month_number(name: &str) -> Option<u32> {
    let number = match name {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    Some(number)
}
