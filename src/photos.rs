//! Photo enumeration and ordering

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use image::ImageFormat;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

/// Files starting with this character are hidden or OS metadata (`.DS_Store`, `._IMG.jpg`)
const HIDDEN_MARKER: char = '.';

/// Photo ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub enum SortMode {
    /// Case-insensitive file name, ascending
    #[default]
    Name = 0,
    /// Capture time (EXIF, then filesystem), ascending
    CaptureDate = 1,
}

impl FromStr for SortMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(SortMode::Name),
            "date" | "capture-date" => Ok(SortMode::CaptureDate),
            other => Err(crate::Error::validation(format!("unknown sort mode: {other}"))),
        }
    }
}

/// List the photos of `folder` in directory order.
///
/// Only regular JPEG files are returned; hidden and metadata files are skipped.
pub fn try_enumerate<P: AsRef<Path>>(folder: P) -> std::io::Result<Vec<PathBuf>> {
    let mut photos = Vec::new();
    for entry in fs::read_dir(folder.as_ref())? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(HIDDEN_MARKER) {
            continue;
        }
        let path = entry.path();
        if !matches!(ImageFormat::from_path(&path), Ok(ImageFormat::Jpeg)) {
            continue;
        }
        // follows symlinks
        if fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false) {
            photos.push(path);
        }
    }
    Ok(photos)
}

/// Like [`try_enumerate`], but an unreadable folder yields an empty list.
pub fn enumerate<P: AsRef<Path>>(folder: P) -> Vec<PathBuf> {
    let folder = folder.as_ref();
    try_enumerate(folder).unwrap_or_else(|e| {
        tracing::warn!(folder = %folder.display(), error = %e, "cannot read photo folder");
        Vec::new()
    })
}

/// Number of valid photos in `folder`
pub fn count_photos<P: AsRef<Path>>(folder: P) -> usize {
    enumerate(folder).len()
}

/// Sort photos. The sort is stable: equal keys keep their input order.
pub fn sort(mut photos: Vec<PathBuf>, mode: SortMode) -> Vec<PathBuf> {
    match mode {
        SortMode::Name => photos.sort_by_cached_key(|p| name_key(p)),
        SortMode::CaptureDate => photos.sort_by_cached_key(|p| capture_timestamp(p)),
    }
    photos
}

/// Enumerate and sort in one step
pub fn scan<P: AsRef<Path>>(folder: P, mode: SortMode) -> Vec<PathBuf> {
    sort(enumerate(folder), mode)
}

fn name_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Best-effort capture time of a photo.
///
/// Precedence: EXIF `DateTimeOriginal`, `DateTimeDigitized`, `DateTime`; then the file's
/// creation time; then its modification time; then the Unix epoch.
pub fn capture_timestamp<P: AsRef<Path>>(path: P) -> DateTime<Utc> {
    let path = path.as_ref();
    exif_timestamp(path)
        .or_else(|| filesystem_timestamp(path))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn exif_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let file = fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    [
        exif::Tag::DateTimeOriginal,
        exif::Tag::DateTimeDigitized,
        exif::Tag::DateTime,
    ]
    .into_iter()
    .filter_map(|tag| exif.get_field(tag, exif::In::PRIMARY))
    .find_map(|field| match field.value {
        exif::Value::Ascii(ref vec) => vec.first().and_then(|raw| parse_exif_datetime(raw)),
        _ => None,
    })
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` value as local time
fn parse_exif_datetime(raw: &[u8]) -> Option<DateTime<Utc>> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    let naive = NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?
        .and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn filesystem_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let meta = fs::metadata(path).ok()?;
    let time: SystemTime = meta.created().or_else(|_| meta.modified()).ok()?;
    Some(DateTime::<Utc>::from(time))
}
