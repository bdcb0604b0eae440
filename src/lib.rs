pub mod core;

pub use crate::core::categorize::{
    Category, CategoryAssigner, CategoryError, CategoryReference, ResolvedCategory,
    default_categories,
};
pub use crate::core::cluster::{ClusterOutcome, SkippedImage, TemporalClusterer};
pub use crate::core::duplicate::{DuplicateFilter, FilterOutcome};
pub use crate::core::embedding::{EmbedError, Embedder, cosine_similarity, normalize};
pub use crate::core::exif::{ExifError, ExifService, ExifSummary};
pub use crate::core::hasher::{HashError, Hasher, ImageHasher, WORKING_SIZE};
pub use crate::core::model::{
    Cluster, ClusterIdCounter, ClusterKind, Fingerprint, GeoPoint, ImageRecord, RejectReason,
    RejectedImage,
};
pub use crate::core::pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineReport, SortedEntry};
pub use crate::core::scanner::{ScanError, Scanner};
