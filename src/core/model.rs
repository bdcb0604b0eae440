use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Decimal GPS coordinates extracted from EXIF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Fixed-width perceptual fingerprint of an image's visual content.
///
/// Small Hamming distance between two fingerprints means the images are
/// visual near-duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(pub Vec<u8>);

impl Fingerprint {
    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        assert_eq!(self.0.len(), other.0.len(), "fingerprint widths differ");
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// One photograph flowing through a pipeline run.
///
/// Records are created from the raw file listing and progressively enriched:
/// quality/fingerprint by the duplicate filter, embedding/cluster id by the
/// clusterer, category by the assigner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub file_name: String,
    pub taken_at: Option<NaiveDateTime>,
    pub location: Option<GeoPoint>,
    pub quality: Option<f64>,
    pub fingerprint: Option<Fingerprint>,
    /// Unit-length vision embedding. Not serialized: reports carry the
    /// derived fields, not the raw vectors.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub cluster_id: Option<u64>,
    pub category: Option<String>,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            file_name,
            taken_at: None,
            location: None,
            quality: None,
            fingerprint: None,
            embedding: None,
            cluster_id: None,
            category: None,
        }
    }

    pub fn with_taken_at(mut self, taken_at: NaiveDateTime) -> Self {
        self.taken_at = Some(taken_at);
        self
    }

    /// Calendar date of capture, if a timestamp is known.
    pub fn capture_day(&self) -> Option<NaiveDate> {
        self.taken_at.map(|ts| ts.date())
    }
}

/// Why an image was removed from further processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    DecodeError,
    Duplicate,
    Blurry,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::DecodeError => "decode_error",
            RejectReason::Duplicate => "duplicate",
            RejectReason::Blurry => "blurry",
        }
    }
}

/// An image removed by the duplicate filter, kept in a side-list for
/// reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedImage {
    pub record: ImageRecord,
    pub reason: RejectReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RejectedImage {
    pub fn new(record: ImageRecord, reason: RejectReason) -> Self {
        Self {
            record,
            reason,
            detail: None,
        }
    }

    pub fn with_detail(record: ImageRecord, reason: RejectReason, detail: String) -> Self {
        Self {
            record,
            reason,
            detail: Some(detail),
        }
    }

    pub fn path(&self) -> &Path {
        &self.record.path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    /// Formed by the windowed similarity scan.
    Grouped,
    /// Catch-all for images the scan could not attach ("others").
    Leftover,
}

/// A group of images from one capture day.
///
/// Ids are unique across the whole run, not just within a day. `day` is
/// `None` only for the dateless leftover cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u64,
    pub day: Option<NaiveDate>,
    pub kind: ClusterKind,
    pub members: Vec<ImageRecord>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Run-global cluster id allocator, passed explicitly through the
/// clustering calls so ids never repeat across day buckets.
#[derive(Debug, Default)]
pub struct ClusterIdCounter {
    next: u64,
}

impl ClusterIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}
