//! Line-by-line delivery of a byte range to the line applier.
//!
//! Shared by real-time read passes and catch-up replay. Only complete,
//! `\n`-terminated lines are delivered and consumed: an unterminated last line
//! is left for the next pass, once the writer has finished it.

use std::io::{self, SeekFrom};

use camino::Utf8Path;
use lt_core::{ApplyContext, LineApplier};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tracing::warn;

/// Block size used when scanning backwards for a line end.
const SCAN_CHUNK: u64 = 8 * 1024;

/// Result of delivering a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Complete lines consumed (including rejected and blank ones).
    pub lines: usize,
    /// Lines the applier rejected.
    pub failed: usize,
    /// Offset just past the last consumed line.
    pub end_offset: u64,
}

impl ReadOutcome {
    const fn empty(at: u64) -> Self {
        Self {
            lines: 0,
            failed: 0,
            end_offset: at,
        }
    }
}

/// Delivers every complete line in `[from, until)` of `path` to `applier`, in
/// file order.
///
/// A line the applier rejects is logged and skipped; it never stops the
/// remaining lines.
///
/// # Errors
///
/// Returns I/O errors from opening, seeking, or reading. Lines delivered
/// before the error are not rolled back; the caller simply does not persist
/// the offset.
pub async fn apply_lines(
    path: &Utf8Path,
    from: u64,
    until: u64,
    applier: &dyn LineApplier,
    ctx: &ApplyContext,
) -> io::Result<ReadOutcome> {
    let mut outcome = ReadOutcome::empty(from);
    if until <= from {
        return Ok(outcome);
    }

    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(from)).await?;
    let mut reader = BufReader::new(file.take(until - from));
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).await?;
        if read == 0 || buf.last() != Some(&b'\n') {
            break;
        }

        let raw = String::from_utf8_lossy(&buf);
        let line = raw.trim_end_matches(['\r', '\n']);
        if !line.is_empty() {
            if let Err(err) = applier.apply(ctx, line).await {
                outcome.failed += 1;
                warn!(
                    source = %ctx.source_id,
                    offset = outcome.end_offset,
                    catchup = ctx.is_catchup(),
                    error = %err,
                    "Skipping line the applier rejected"
                );
            }
        }

        outcome.lines += 1;
        outcome.end_offset += read as u64;
    }

    Ok(outcome)
}

/// Returns the offset just past the last `\n` in `[0, until)` of `path`, or 0
/// if that range holds no complete line.
///
/// This is where a reader that stops at `until` would resume, so a cursor
/// placed here never splits a line.
///
/// # Errors
///
/// Returns I/O errors from opening, seeking, or reading.
pub async fn complete_lines_end(path: &Utf8Path, until: u64) -> io::Result<u64> {
    let mut file = File::open(path).await?;
    let mut pos = until.min(file.metadata().await?.len());
    let mut block = Vec::new();

    while pos > 0 {
        let chunk = SCAN_CHUNK.min(pos);
        pos -= chunk;
        file.seek(SeekFrom::Start(pos)).await?;
        #[allow(clippy::cast_possible_truncation)] // chunk <= SCAN_CHUNK
        block.resize(chunk as usize, 0);
        file.read_exact(&mut block).await?;
        if let Some(newline) = block.iter().rposition(|&b| b == b'\n') {
            return Ok(pos + newline as u64 + 1);
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingApplier;
    use lt_core::SourceId;
    use tempfile::TempDir;

    fn fixture(contents: &str) -> (TempDir, camino::Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("alpha.log")).unwrap();
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_apply_lines_in_order() {
        let (_dir, path) = fixture("one\r\ntwo\nthree\n");
        let applier = RecordingApplier::default();
        let ctx = ApplyContext::realtime(SourceId::new("alpha"), path.clone());

        let outcome = apply_lines(&path, 0, 15, &applier, &ctx).await.unwrap();

        assert_eq!(outcome.lines, 3);
        assert_eq!(outcome.end_offset, 15);
        assert_eq!(applier.lines(), vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_apply_lines_leaves_partial_line() {
        let (_dir, path) = fixture("one\ntwo\nthr");
        let applier = RecordingApplier::default();
        let ctx = ApplyContext::realtime(SourceId::new("alpha"), path.clone());

        let outcome = apply_lines(&path, 0, 11, &applier, &ctx).await.unwrap();

        assert_eq!(outcome.lines, 2);
        assert_eq!(outcome.end_offset, 8);
        assert_eq!(applier.lines(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_apply_lines_stops_at_bound() {
        let (_dir, path) = fixture("one\ntwo\nthree\n");
        let applier = RecordingApplier::default();
        let ctx = ApplyContext::catchup(SourceId::new("alpha"), path.clone());

        let outcome = apply_lines(&path, 4, 8, &applier, &ctx).await.unwrap();

        assert_eq!(outcome.end_offset, 8);
        assert_eq!(applier.lines(), vec!["two"]);
        assert_eq!(applier.catchup_lines(), 1);
    }

    #[tokio::test]
    async fn test_apply_lines_skips_rejected_line() {
        let (_dir, path) = fixture("good\nbad\ngood again\n\n");
        let applier = RecordingApplier::rejecting("bad");
        let ctx = ApplyContext::realtime(SourceId::new("alpha"), path.clone());

        let outcome = apply_lines(&path, 0, 21, &applier, &ctx).await.unwrap();

        assert_eq!(outcome.lines, 4);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.end_offset, 21);
        assert_eq!(applier.lines(), vec!["good", "good again"]);
    }

    #[tokio::test]
    async fn test_complete_lines_end() {
        let (_dir, path) = fixture("old\nhalf a li");
        assert_eq!(complete_lines_end(&path, 13).await.unwrap(), 4);
        assert_eq!(complete_lines_end(&path, 4).await.unwrap(), 4);
        assert_eq!(complete_lines_end(&path, 3).await.unwrap(), 0);
        assert_eq!(complete_lines_end(&path, 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_complete_lines_end_spans_blocks() {
        let mut contents = "first\n".to_owned();
        contents.push_str(&"x".repeat(20_000));
        let (_dir, path) = fixture(&contents);

        let end = complete_lines_end(&path, contents.len() as u64).await.unwrap();
        assert_eq!(end, 6);
    }

    #[tokio::test]
    async fn test_apply_lines_empty_range() {
        let (_dir, path) = fixture("one\n");
        let applier = RecordingApplier::default();
        let ctx = ApplyContext::realtime(SourceId::new("alpha"), path.clone());

        let outcome = apply_lines(&path, 4, 4, &applier, &ctx).await.unwrap();
        assert_eq!(outcome.lines, 0);
        assert_eq!(outcome.end_offset, 4);
    }
}
