//! Capture-date lookup for image files.

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Reader, Tag};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Source of capture dates. The scan asks it once per candidate file.
pub trait CaptureDateSource: Sync {
    fn capture_time(&self, path: &Path) -> Result<NaiveDateTime>;
}

/// Reads `DateTimeOriginal`, then `DateTimeDigitized`, then `DateTime` from the file's EXIF block.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExifDateSource;

impl CaptureDateSource for ExifDateSource {
    fn capture_time(&self, path: &Path) -> Result<NaiveDateTime> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let exif = Reader::new()
            .read_from_container(&mut reader)
            .with_context(|| format!("read EXIF from {}", path.display()))?;

        for tag in [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime] {
            if let Some(field) = exif.get_field(tag, In::PRIMARY) {
                let val = field.display_value().to_string();
                if let Some(dt) = parse_exif_datetime(&val) {
                    return Ok(dt);
                }
            }
        }
        Err(anyhow!("no EXIF date for file: {}", path.display()))
    }
}

/// Parse `YYYY:MM:DD HH:MM:SS`. Accepts `-`, `/`, `\` and `.` as separators and date-only values.
/// EXIF dates carry no timezone; the value is kept as-is.
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s
        .trim()
        .trim_matches('"')
        .replace(['-', '/', '\\', '.'], ":");

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    let date_part = cleaned.split(' ').next()?;
    NaiveDate::parse_from_str(date_part, "%Y:%m:%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
}

/// `(timestamp, sort key)` for a capture time: seconds since epoch and `YYYYMMDD`.
pub fn capture_keys(dt: &NaiveDateTime) -> (i64, String) {
    (dt.and_utc().timestamp(), dt.format("%Y%m%d").to_string())
}

/// Keys for an undated file: the real current instant and today's local `YYYYMMDD`.
pub fn now_keys() -> (i64, String) {
    let now = chrono::Local::now();
    (now.timestamp(), now.format("%Y%m%d").to_string())
}
