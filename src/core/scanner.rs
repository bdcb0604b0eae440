use crate::core::exif::ExifService;
use crate::core::model::ImageRecord;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the initial image listing for a pipeline run.
///
/// Walks the top level of a directory, keeps files with an allowed image
/// extension, and enriches each record with EXIF capture metadata.
pub struct Scanner {
    allowed_extensions: HashSet<String>,
    exif_service: ExifService,
}

impl Scanner {
    pub fn new() -> Self {
        let allowed_extensions = ["jpg", "jpeg", "png", "gif", "webp"]
            .iter()
            .map(|ext| ext.to_string())
            .collect();

        Self {
            allowed_extensions,
            exif_service: ExifService::new(),
        }
    }

    pub fn is_supported_format(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .map(|ext| {
                self.allowed_extensions
                    .contains(&ext.to_string_lossy().to_lowercase())
            })
            .unwrap_or(false)
    }

    /// List the images directly under `dir` as pipeline-ready records,
    /// in deterministic file-name order.
    pub fn scan(&self, dir: &Path) -> Result<Vec<ImageRecord>, ScanError> {
        if !dir.exists() || !dir.is_dir() {
            return Err(ScanError::InvalidPath {
                path: dir.to_string_lossy().to_string(),
            });
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file() && self.is_supported_format(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect();
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            let mut record = ImageRecord::new(&path);

            match self.exif_service.extract(&path) {
                Ok(Some(summary)) => {
                    record.taken_at = summary.taken_at;
                    record.location = summary.location;
                }
                Ok(None) => {}
                Err(e) => {
                    log::debug!("Failed to read EXIF from {}: {}", path.display(), e);
                }
            }

            records.push(record);
        }

        log::info!("Discovered {} images under {}", records.len(), dir.display());
        Ok(records)
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_image(path: &Path, width: u32, height: u32) {
        use image::{ImageBuffer, Rgb};

        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x + y) % 256) as u8;
            Rgb([intensity, intensity, intensity])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_scan_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = Scanner::new();

        let records = scanner.scan(temp_dir.path()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_scan_invalid_path() {
        let scanner = Scanner::new();
        let result = scanner.scan(Path::new("/does/not/exist"));
        assert!(matches!(result, Err(ScanError::InvalidPath { .. })));
    }

    #[test]
    fn test_scan_filters_by_extension() {
        let temp_dir = TempDir::new().unwrap();

        create_test_image(&temp_dir.path().join("keep.jpg"), 32, 32);
        create_test_image(&temp_dir.path().join("keep_too.png"), 32, 32);
        fs::write(temp_dir.path().join("skip.txt"), b"not an image").unwrap();

        let scanner = Scanner::new();
        let records = scanner.scan(temp_dir.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.file_name != "skip.txt"));
    }

    #[test]
    fn test_scan_order_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();

        create_test_image(&temp_dir.path().join("b.jpg"), 16, 16);
        create_test_image(&temp_dir.path().join("a.jpg"), 16, 16);
        create_test_image(&temp_dir.path().join("c.jpg"), 16, 16);

        let scanner = Scanner::new();
        let records = scanner.scan(temp_dir.path()).unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_scan_without_exif_leaves_fields_empty() {
        let temp_dir = TempDir::new().unwrap();
        create_test_image(&temp_dir.path().join("plain.png"), 16, 16);

        let scanner = Scanner::new();
        let records = scanner.scan(temp_dir.path()).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].taken_at.is_none());
        assert!(records[0].location.is_none());
    }

    #[test]
    fn test_supported_format_detection() {
        let scanner = Scanner::new();

        assert!(scanner.is_supported_format(Path::new("test.jpg")));
        assert!(scanner.is_supported_format(Path::new("test.JPEG")));
        assert!(scanner.is_supported_format(Path::new("test.webp")));
        assert!(!scanner.is_supported_format(Path::new("test.txt")));
        assert!(!scanner.is_supported_format(Path::new("test")));
    }
}
