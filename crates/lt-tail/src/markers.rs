//! Recognition of the few log lines the core itself cares about.
//!
//! The core does not interpret event payloads, but it needs three kinds of
//! lines to reason about a file:
//!
//! - the **creation line** (first line of every generation):
//!   `Log file open, 10/18/26 14:03:11`
//! - **session-start lines**, which open a new map/session:
//!   `[2026.10.18-14.05.02:417][  0]LogLoad: LoadMap: /Game/Maps/Town/Town?Scenario=Scenario_Town_Checkpoint_Security`
//! - **controller-poll lines**, written whenever an external controller queries
//!   the process: `[2026.10.18-14.05.30:001][812]LogRcon: 127.0.0.1:51234 << listplayers`
//!
//! All timestamps are interpreted as UTC.

use std::io::{self, SeekFrom};

use camino::Utf8Path;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};

/// Literal prefix of a creation line.
pub const CREATION_PREFIX: &str = "Log file open, ";

/// Tag identifying a session-start line.
pub const SESSION_TAG: &str = "LogLoad: LoadMap: ";

/// Tag identifying a controller-poll line.
pub const CONTROLLER_TAG: &str = "LogRcon:";

const CREATION_FORMAT: &str = "%m/%d/%y %H:%M:%S";
const LINE_TIMESTAMP_FORMAT: &str = "%Y.%m.%d-%H.%M.%S";
const BYTE_ORDER_MARK: char = '\u{feff}';

/// Upper bound on how much of a file is read looking for the creation line.
const MAX_FIRST_LINE: u64 = 4 * 1024;

/// Block size used when reading a file backwards.
const TAIL_CHUNK: u64 = 8 * 1024;

/// A session-start line located in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMarker {
    /// Map name (last path segment of the map URL).
    pub map: String,
    /// Scenario label, empty if the line names none.
    pub scenario: String,
    /// Timestamp of the line.
    pub timestamp: DateTime<Utc>,
    /// Position counted back from the end of the file; the last line is 1.
    pub lines_from_end: usize,
    /// Byte offset of the start of the line.
    pub byte_offset: u64,
}

/// Parses a creation line, tolerating a leading byte-order mark and trailing
/// whitespace.
///
/// # Examples
///
/// ```
/// use lt_tail::markers::parse_creation_line;
///
/// let ts = parse_creation_line("\u{feff}Log file open, 10/18/26 14:03:11 \t\r\n").unwrap();
/// assert_eq!(ts.to_rfc3339(), "2026-10-18T14:03:11+00:00");
/// assert!(parse_creation_line("[2026.10.18-14.03.11:000]LogInit: hello").is_none());
/// ```
#[must_use]
pub fn parse_creation_line(line: &str) -> Option<DateTime<Utc>> {
    let line = line
        .trim_start_matches(BYTE_ORDER_MARK)
        .trim_end_matches([' ', '\t', '\r', '\n']);
    let stamp = line.strip_prefix(CREATION_PREFIX)?.trim();
    NaiveDateTime::parse_from_str(stamp, CREATION_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parses the `[YYYY.MM.DD-HH.MM.SS:mmm]` prefix of a regular log line.
///
/// The fraction is one to three digits of milliseconds; anything else makes
/// the line unstamped.
#[must_use]
pub fn parse_line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let rest = line.trim_start_matches(BYTE_ORDER_MARK).strip_prefix('[')?;
    let stamp = &rest[..rest.find(']')?];
    let (whole, millis) = stamp.rsplit_once(':').unwrap_or((stamp, "0"));
    if millis.is_empty() || millis.len() > 3 || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(whole, LINE_TIMESTAMP_FORMAT).ok()?;
    let millis: i64 = millis.parse().ok()?;
    naive
        .and_utc()
        .checked_add_signed(TimeDelta::milliseconds(millis))
}

/// Parses a session-start line into `(map, scenario, timestamp)`.
///
/// The map is the last segment of the map URL before its options; the
/// scenario is the `Scenario=` option, falling back to `Name=`.
#[must_use]
pub fn parse_session_line(line: &str) -> Option<(String, String, DateTime<Utc>)> {
    let start = line.find(SESSION_TAG)?;
    let timestamp = parse_line_timestamp(line)?;
    let url = line[start + SESSION_TAG.len()..].trim();

    let mut parts = url.split('?');
    let map = parts
        .next()?
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|m| !m.is_empty())?
        .to_owned();

    let mut scenario = None;
    let mut name = None;
    for option in parts {
        if let Some((key, value)) = option.split_once('=') {
            if key.eq_ignore_ascii_case("scenario") {
                scenario = Some(value);
            } else if key.eq_ignore_ascii_case("name") {
                name = Some(value);
            }
        }
    }
    let scenario = scenario.or(name).unwrap_or_default().to_owned();

    Some((map, scenario, timestamp))
}

/// Reads the creation marker from the first line of `path`.
///
/// Returns `Ok(None)` if the file is empty or its first line is not a
/// creation line.
///
/// # Errors
///
/// Returns any I/O error from opening or reading the file.
pub async fn extract_creation_marker(path: &Utf8Path) -> io::Result<Option<DateTime<Utc>>> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file.take(MAX_FIRST_LINE));
    let mut first = Vec::new();
    reader.read_until(b'\n', &mut first).await?;
    Ok(parse_creation_line(&String::from_utf8_lossy(&first)))
}

/// Finds the most recent session-start line whose timestamp is at or before
/// `as_of`.
///
/// Scans backwards in blocks and stops at the first match, so the cost is
/// proportional to how far back the session started.
///
/// # Errors
///
/// Returns any I/O error from opening, seeking, or reading the file.
pub async fn find_last_session_marker(
    path: &Utf8Path,
    as_of: DateTime<Utc>,
) -> io::Result<Option<SessionMarker>> {
    let mut file = File::open(path).await?;
    let mut pos = file.metadata().await?.len();
    // Head of a line that continues into the block read before this one.
    let mut carry: Vec<u8> = Vec::new();
    let mut lines_from_end = 0usize;

    while pos > 0 {
        let chunk = TAIL_CHUNK.min(pos);
        pos -= chunk;
        file.seek(SeekFrom::Start(pos)).await?;
        #[allow(clippy::cast_possible_truncation)] // chunk <= TAIL_CHUNK
        let mut block = vec![0u8; chunk as usize];
        file.read_exact(&mut block).await?;
        block.extend_from_slice(&carry);

        // `block` holds bytes [pos, pos + block.len()); walk its lines last to first.
        let mut end = block.len();
        while end > 0 {
            let start = match block[..end - 1].iter().rposition(|&b| b == b'\n') {
                Some(newline) => newline + 1,
                None if pos == 0 => 0,
                None => break,
            };
            lines_from_end += 1;
            if let Some(marker) =
                session_marker_at(&block[start..end], as_of, pos + start as u64, lines_from_end)
            {
                return Ok(Some(marker));
            }
            end = start;
        }
        block.truncate(end);
        carry = block;
    }

    Ok(None)
}

fn session_marker_at(
    raw: &[u8],
    as_of: DateTime<Utc>,
    byte_offset: u64,
    lines_from_end: usize,
) -> Option<SessionMarker> {
    let line = String::from_utf8_lossy(raw);
    if !line.contains(SESSION_TAG) {
        return None;
    }
    let (map, scenario, timestamp) = parse_session_line(&line)?;
    (timestamp <= as_of).then_some(SessionMarker {
        map,
        scenario,
        timestamp,
        lines_from_end,
        byte_offset,
    })
}

/// Returns up to the last `max_lines` lines of `path`, oldest first.
///
/// Reads backwards in fixed-size blocks so the cost is proportional to the
/// tail, not the file.
///
/// # Errors
///
/// Returns any I/O error from opening, seeking, or reading the file.
pub async fn read_tail_lines(path: &Utf8Path, max_lines: usize) -> io::Result<Vec<String>> {
    if max_lines == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path).await?;
    let mut pos = file.metadata().await?.len();
    let mut buf: Vec<u8> = Vec::new();

    while pos > 0 {
        let chunk = TAIL_CHUNK.min(pos);
        pos -= chunk;
        file.seek(SeekFrom::Start(pos)).await?;
        #[allow(clippy::cast_possible_truncation)] // chunk <= TAIL_CHUNK
        let mut block = vec![0u8; chunk as usize];
        file.read_exact(&mut block).await?;
        block.extend_from_slice(&buf);
        buf = block;

        // One extra newline guarantees the oldest kept line is complete.
        if buf.iter().filter(|&&b| b == b'\n').count() > max_lines {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(max_lines);
    Ok(lines[skip..].iter().map(|l| (*l).to_owned()).collect())
}

/// Returns `true` if any of `lines` is a controller-poll line no older than
/// `window` relative to `now`.
#[must_use]
pub fn controller_recently_polled(
    lines: &[String],
    now: DateTime<Utc>,
    window: std::time::Duration,
) -> bool {
    let Ok(window) = TimeDelta::from_std(window) else {
        return false;
    };
    lines
        .iter()
        .filter(|line| line.contains(CONTROLLER_TAG))
        .filter_map(|line| parse_line_timestamp(line))
        .any(|ts| now.signed_duration_since(ts) <= window)
}
