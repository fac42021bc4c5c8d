use std::io::Write;
use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tempfile::NamedTempFile;

/// Replace `path` with `content` without ever exposing a partial file.
///
/// The temp file is created in the destination directory so the final
/// rename stays on one filesystem.
pub fn atomic_write_str(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Calendar day of an epoch timestamp in `tz`.
///
/// Returns `None` for non-finite or out-of-range values.
pub fn local_date_of_timestamp(ts: f64, tz: Tz) -> Option<NaiveDate> {
    if !ts.is_finite() {
        return None;
    }
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9) as u32;
    let utc: DateTime<Utc> = DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))?;
    Some(tz.from_utc_datetime(&utc.naive_utc()).date_naive())
}

/// `YYYY-MM-DD`, the only day format used in documents and state files.
pub fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
