use crate::core::categorize::{Category, CategoryAssigner, CategoryError};
use crate::core::cluster::{SkippedImage, TemporalClusterer};
use crate::core::duplicate::DuplicateFilter;
use crate::core::embedding::Embedder;
use crate::core::hasher::Hasher;
use crate::core::model::{Cluster, ClusterIdCounter, ClusterKind, ImageRecord, RejectedImage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Category configuration error: {0}")]
    Category(#[from] CategoryError),
}

/// Tunable parameters of a pipeline run. Batch size only controls
/// embedding call granularity and has no semantic effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub blur_threshold: f64,
    pub phash_threshold: u32,
    pub similarity_threshold: f32,
    pub window_size: usize,
    pub reject_margin: f32,
    pub min_cluster_size: usize,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_threshold: 100.0,
            phash_threshold: 20,
            similarity_threshold: 0.6,
            window_size: 3,
            reject_margin: 0.1,
            min_cluster_size: 1,
            batch_size: 10,
        }
    }
}

/// Final placement of one surviving image, ready for the foldering layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortedEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub cluster_id: u64,
    pub category: String,
}

/// Everything a pipeline run produced: one entry per surviving image plus
/// the side-lists of rejected and embedding-skipped images.
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub entries: Vec<SortedEntry>,
    pub rejected: Vec<RejectedImage>,
    pub skipped: Vec<SkippedImage>,
    pub clusters: Vec<Cluster>,
}

impl PipelineReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Sequences the three stages: duplicate/blur filtering, temporal-visual
/// clustering, and category assignment. Stages run strictly one after the
/// other, each consuming the full output of the previous one.
pub struct Pipeline<'a, H: Hasher + ?Sized, E: Embedder + ?Sized> {
    hasher: &'a H,
    embedder: &'a E,
    config: PipelineConfig,
}

impl<'a, H: Hasher + ?Sized, E: Embedder + ?Sized> Pipeline<'a, H, E> {
    pub fn new(hasher: &'a H, embedder: &'a E, config: PipelineConfig) -> Self {
        Self {
            hasher,
            embedder,
            config,
        }
    }

    pub fn run(
        &self,
        images: Vec<ImageRecord>,
        categories: &[Category],
    ) -> Result<PipelineReport, PipelineError> {
        let total = images.len();

        // Resolve category references first: if the configuration is bad
        // or the backend cannot embed the labels, fail before any image
        // work is done.
        let assigner = CategoryAssigner::new(
            self.embedder,
            self.config.reject_margin,
            self.config.min_cluster_size,
            self.config.batch_size,
        );
        let resolved = assigner.resolve(categories)?;

        log::info!("Stage 1/3: duplicate and blur filtering {} images", total);
        let filter = DuplicateFilter::new(
            self.hasher,
            self.config.blur_threshold,
            self.config.phash_threshold,
        );
        let filtered = filter.filter(images);
        let survivors = filtered.retained.len();

        log::info!("Stage 2/3: clustering {} surviving images", survivors);
        let clusterer = TemporalClusterer::new(
            self.embedder,
            self.config.similarity_threshold,
            self.config.window_size,
            self.config.batch_size,
        );
        let mut counter = ClusterIdCounter::new();
        let mut outcome = clusterer.cluster(filtered.retained, &mut counter);

        // Dateless survivors get one leftover cluster of their own rather
        // than a fabricated capture day.
        if !outcome.undated.is_empty() {
            let id = counter.next_id();
            let mut members = outcome.undated;
            for member in &mut members {
                member.cluster_id = Some(id);
            }
            outcome.clusters.push(Cluster {
                id,
                day: None,
                kind: ClusterKind::Leftover,
                members,
            });
        }

        let clustered: usize = outcome.clusters.iter().map(Cluster::len).sum();
        assert_eq!(
            clustered + outcome.skipped.len(),
            survivors,
            "every surviving image must be in exactly one cluster"
        );
        let ids: HashSet<u64> = outcome.clusters.iter().map(|c| c.id).collect();
        assert_eq!(
            ids.len(),
            outcome.clusters.len(),
            "cluster ids must be unique across the run"
        );

        log::info!("Stage 3/3: categorizing {} clusters", outcome.clusters.len());
        assigner.assign(&mut outcome.clusters, &resolved);

        let mut entries = Vec::with_capacity(clustered);
        for cluster in &outcome.clusters {
            for member in &cluster.members {
                let category = member
                    .category
                    .clone()
                    .expect("assigner labels every clustered image");
                entries.push(SortedEntry {
                    path: member.path.clone(),
                    file_name: member.file_name.clone(),
                    cluster_id: cluster.id,
                    category,
                });
            }
        }

        log::info!(
            "Pipeline done: {} sorted, {} rejected, {} skipped",
            entries.len(),
            filtered.rejected.len(),
            outcome.skipped.len()
        );

        Ok(PipelineReport {
            entries,
            rejected: filtered.rejected,
            skipped: outcome.skipped,
            clusters: outcome.clusters,
        })
    }
}
