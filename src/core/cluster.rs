use crate::core::embedding::{Embedder, cosine_similarity};
use crate::core::model::{Cluster, ClusterIdCounter, ClusterKind, ImageRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An image excluded from clustering because the embedding backend could
/// not produce a vector for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedImage {
    pub record: ImageRecord,
    pub reason: String,
}

/// Output of the clustering stage.
#[derive(Debug)]
pub struct ClusterOutcome {
    pub clusters: Vec<Cluster>,
    /// Images without a capture timestamp; the orchestrator routes these
    /// to a dateless leftover cluster.
    pub undated: Vec<ImageRecord>,
    pub skipped: Vec<SkippedImage>,
}

/// Groups images by capture day, then clusters each day with a windowed
/// greedy similarity scan.
///
/// The lookahead window is positional (the next `window_size` images by
/// bucket order), the scan is forward-only, and finalized clusters are
/// never merged or reopened. Cluster ids come from the run-global counter
/// passed by the caller.
pub struct TemporalClusterer<'a, E: Embedder + ?Sized> {
    embedder: &'a E,
    similarity_threshold: f32,
    window_size: usize,
    batch_size: usize,
}

struct Embedded {
    record: ImageRecord,
    vector: Vec<f32>,
}

impl<'a, E: Embedder + ?Sized> TemporalClusterer<'a, E> {
    pub fn new(
        embedder: &'a E,
        similarity_threshold: f32,
        window_size: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            similarity_threshold,
            window_size,
            batch_size: batch_size.max(1),
        }
    }

    pub fn cluster(
        &self,
        images: Vec<ImageRecord>,
        counter: &mut ClusterIdCounter,
    ) -> ClusterOutcome {
        let mut buckets: BTreeMap<NaiveDate, Vec<ImageRecord>> = BTreeMap::new();
        let mut undated = Vec::new();

        for record in images {
            match record.capture_day() {
                Some(day) => buckets.entry(day).or_default().push(record),
                None => undated.push(record),
            }
        }

        let mut clusters = Vec::new();
        let mut skipped = Vec::new();

        for (day, bucket) in buckets {
            log::info!("Clustering day {} with {} images", day, bucket.len());
            let embedded = self.embed_bucket(bucket, &mut skipped);
            self.cluster_bucket(day, embedded, counter, &mut clusters);
        }

        ClusterOutcome {
            clusters,
            undated,
            skipped,
        }
    }

    /// Fetch one normalized embedding per image, in `batch_size` chunks.
    /// Batch boundaries carry no meaning; per-image failures drop the
    /// image from the bucket and are reported.
    fn embed_bucket(
        &self,
        bucket: Vec<ImageRecord>,
        skipped: &mut Vec<SkippedImage>,
    ) -> Vec<Embedded> {
        let mut embedded = Vec::with_capacity(bucket.len());

        let mut pending = bucket;
        while !pending.is_empty() {
            let rest = pending.split_off(pending.len().min(self.batch_size));
            let batch = pending;
            pending = rest;

            let refs: Vec<&ImageRecord> = batch.iter().collect();
            let results = self.embedder.embed_images(&refs);
            debug_assert_eq!(results.len(), batch.len());

            for (record, result) in batch.into_iter().zip(results) {
                match result {
                    Ok(vector) => embedded.push(Embedded { record, vector }),
                    Err(e) => {
                        log::warn!("Failed to embed {}: {}", record.path.display(), e);
                        skipped.push(SkippedImage {
                            record,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        embedded
    }

    fn cluster_bucket(
        &self,
        day: NaiveDate,
        items: Vec<Embedded>,
        counter: &mut ClusterIdCounter,
        clusters: &mut Vec<Cluster>,
    ) {
        let n = items.len();
        if n == 0 {
            return;
        }

        let mut assigned = vec![false; n];
        let mut current: Vec<usize> = Vec::new();
        let mut finalized: Vec<(u64, Vec<usize>)> = Vec::new();

        for i in 0..n {
            if assigned[i] {
                continue;
            }

            // The scanned image joins (or starts) the current cluster.
            current.push(i);
            assigned[i] = true;

            let mut attached = false;
            let end = (i + self.window_size).min(n - 1);
            for j in (i + 1)..=end {
                if assigned[j] {
                    continue;
                }
                let sim = cosine_similarity(&items[i].vector, &items[j].vector);
                if sim > self.similarity_threshold {
                    current.push(j);
                    assigned[j] = true;
                    attached = true;
                }
            }

            // Nothing new attached: the run ends here and the open cluster
            // is sealed under a fresh global id.
            if !attached && !current.is_empty() {
                finalized.push((counter.next_id(), std::mem::take(&mut current)));
            }
        }

        if !current.is_empty() {
            finalized.push((counter.next_id(), std::mem::take(&mut current)));
        }

        let mut in_cluster = vec![false; n];
        for (_, member_indices) in &finalized {
            for &idx in member_indices {
                in_cluster[idx] = true;
            }
        }
        let leftover: Vec<usize> = (0..n).filter(|&idx| !in_cluster[idx]).collect();

        let mut slots: Vec<Option<Embedded>> = items.into_iter().map(Some).collect();
        let mut take = |idx: usize, id: u64| -> ImageRecord {
            let item = slots[idx].take().expect("image assigned to two clusters");
            let mut record = item.record;
            record.embedding = Some(item.vector);
            record.cluster_id = Some(id);
            record
        };

        for (id, member_indices) in finalized {
            let members = member_indices
                .into_iter()
                .map(|idx| take(idx, id))
                .collect();
            clusters.push(Cluster {
                id,
                day: Some(day),
                kind: ClusterKind::Grouped,
                members,
            });
        }

        if !leftover.is_empty() {
            let id = counter.next_id();
            let members = leftover.into_iter().map(|idx| take(idx, id)).collect();
            clusters.push(Cluster {
                id,
                day: Some(day),
                kind: ClusterKind::Leftover,
                members,
            });
        }
    }
}
