use crate::core::model::GeoPoint;
use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error: {0}")]
    Parse(#[from] exif::Error),
}

/// Capture metadata pulled from a photo's EXIF block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExifSummary {
    pub taken_at: Option<NaiveDateTime>,
    pub location: Option<GeoPoint>,
}

/// Service for extracting capture timestamps and GPS coordinates from
/// image files.
pub struct ExifService;

impl ExifService {
    pub fn new() -> Self {
        Self
    }

    /// Extract capture metadata from an image file.
    ///
    /// Unreadable files and files without an EXIF block yield `Ok(None)`;
    /// only IO errors on an opened container are surfaced.
    pub fn extract(&self, file_path: &Path) -> Result<Option<ExifSummary>, ExifError> {
        let file = match File::open(file_path) {
            Ok(f) => f,
            Err(_) => return Ok(None),
        };

        let mut buf_reader = BufReader::new(file);

        let exif_reader = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(reader) => reader,
            Err(_) => return Ok(None), // no EXIF block or unsupported container
        };

        let mut taken_at = None;
        // DateTimeOriginal is the shutter time; DateTime may reflect later edits.
        if let Some(field) = exif_reader.get_field(Tag::DateTimeOriginal, In::PRIMARY) {
            if let Some(datetime_str) = field_to_string(&field.value) {
                taken_at = parse_exif_datetime(&datetime_str);
            }
        }
        if taken_at.is_none() {
            if let Some(field) = exif_reader.get_field(Tag::DateTime, In::PRIMARY) {
                if let Some(datetime_str) = field_to_string(&field.value) {
                    taken_at = parse_exif_datetime(&datetime_str);
                }
            }
        }

        let location = extract_location(&exif_reader);

        if taken_at.is_some() || location.is_some() {
            Ok(Some(ExifSummary { taken_at, location }))
        } else {
            Ok(None)
        }
    }
}

impl Default for ExifService {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_location(exif: &exif::Exif) -> Option<GeoPoint> {
    let latitude = dms_field(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)?;
    let longitude = dms_field(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef)?;
    Some(GeoPoint {
        latitude,
        longitude,
    })
}

fn dms_field(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let dms = match &field.value {
        Value::Rational(parts) if parts.len() >= 3 => {
            [parts[0].to_f64(), parts[1].to_f64(), parts[2].to_f64()]
        }
        _ => return None,
    };
    let hemisphere = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|f| field_to_string(&f.value))
        .unwrap_or_default();
    Some(dms_to_decimal(dms, &hemisphere))
}

/// Convert degrees/minutes/seconds to a signed decimal coordinate.
fn dms_to_decimal(dms: [f64; 3], hemisphere: &str) -> f64 {
    let decimal = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    match hemisphere.trim() {
        "S" | "W" => -decimal,
        _ => decimal,
    }
}

fn field_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) => vec.first().map(|ascii_val| {
            String::from_utf8_lossy(ascii_val)
                .trim_end_matches('\0')
                .to_string()
        }),
        Value::Undefined(data, _) => Some(
            String::from_utf8_lossy(data)
                .trim_end_matches('\0')
                .to_string(),
        ),
        _ => None,
    }
}

/// Parse the EXIF datetime format "YYYY:MM:DD HH:MM:SS".
fn parse_exif_datetime(datetime_str: &str) -> Option<NaiveDateTime> {
    let trimmed = datetime_str.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y:%m:%d %H:%M:%S") {
        Some(dt)
    } else if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        Some(dt)
    } else {
        log::warn!("Failed to parse EXIF datetime: {}", datetime_str);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_extract_no_file() {
        let exif_service = ExifService::new();
        let non_existent = Path::new("/non/existent/file.jpg");

        let result = exif_service.extract(non_existent);
        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_extract_no_exif_data() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("no_exif.txt");

        fs::write(&file_path, b"This is not an image file").unwrap();

        let exif_service = ExifService::new();
        let result = exif_service.extract(&file_path);

        assert!(result.is_ok());
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_parse_exif_datetime() {
        let dt = parse_exif_datetime("2023:12:25 14:30:45").unwrap();
        assert_eq!(dt.year(), 2023);
        assert_eq!(dt.month(), 12);
        assert_eq!(dt.day(), 25);
        assert_eq!(dt.hour(), 14);
        assert_eq!(dt.minute(), 30);
        assert_eq!(dt.second(), 45);

        let dashed = parse_exif_datetime("2023-12-25 14:30:45").unwrap();
        assert_eq!(dashed, dt);

        assert!(parse_exif_datetime("not a date").is_none());
    }

    #[test]
    fn test_dms_to_decimal() {
        let north = dms_to_decimal([48.0, 51.0, 24.0], "N");
        assert!((north - 48.856_666).abs() < 1e-4);

        let south = dms_to_decimal([33.0, 52.0, 4.0], "S");
        assert!(south < 0.0);
        assert!((south + 33.867_777).abs() < 1e-4);

        let west = dms_to_decimal([122.0, 25.0, 9.0], "W");
        assert!(west < 0.0);
    }
}
