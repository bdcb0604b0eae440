use crate::core::embedding::{EmbedError, Embedder, cosine_similarity, normalize};
use crate::core::model::Cluster;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spread below which the similarity scores are considered degenerate and
/// min-max normalization is skipped.
const SCORE_SPREAD_EPSILON: f32 = 1e-8;

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("Category set is empty")]
    Empty,

    #[error("No category is marked as the fallback")]
    NoFallback,

    #[error("More than one category is marked as the fallback")]
    MultipleFallbacks,

    #[error("Failed to embed category references: {0}")]
    Embed(#[from] EmbedError),
}

/// How a category's reference embedding is obtained: from a descriptive
/// text embedded once per run, or from a caller-supplied vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CategoryReference {
    Text(String),
    Vector(Vec<f32>),
}

/// One entry of the fixed category configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub reference: CategoryReference,
    pub fallback: bool,
}

impl Category {
    pub fn text(name: &str, reference_text: &str) -> Self {
        Self {
            name: name.to_string(),
            reference: CategoryReference::Text(reference_text.to_string()),
            fallback: false,
        }
    }

    pub fn vector(name: &str, reference: Vec<f32>) -> Self {
        Self {
            name: name.to_string(),
            reference: CategoryReference::Vector(reference),
            fallback: false,
        }
    }

    pub fn as_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }
}

/// The stock category set. Reference texts are descriptive phrases rather
/// than bare labels; they match photo content better.
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::text("City", "city urban buildings street"),
        Category::text("Beach", "beach sea ocean sand"),
        Category::text("Hiking", "hiking trail forest path"),
        Category::text("Sports", "sports activity athletic"),
        Category::text("Museum", "museum exhibition art gallery"),
        Category::text("Food", "restaurant dining food meal"),
        Category::text("Travel", "travel vacation sightseeing"),
        Category::text("Nature", "nature wildlife environment flora fauna"),
        Category::text("Snow", "snow winter mountains ski"),
        Category::text("Building", "building architecture monument"),
        Category::text("Family and friends", "family and friends people together portrait"),
        Category::text("Animals", "animals pets wildlife"),
        Category::text("Other", "miscellaneous other").as_fallback(),
    ]
}

/// A category with its reference embedding resolved to a unit vector.
#[derive(Debug, Clone)]
pub struct ResolvedCategory {
    pub name: String,
    pub embedding: Vec<f32>,
    pub fallback: bool,
}

/// Assigns a category label to every member of every cluster.
///
/// The cluster, not the image, is the unit of classification: all members
/// share the centroid-derived label.
pub struct CategoryAssigner<'a, E: Embedder + ?Sized> {
    embedder: &'a E,
    reject_margin: f32,
    min_cluster_size: usize,
    batch_size: usize,
}

impl<'a, E: Embedder + ?Sized> CategoryAssigner<'a, E> {
    pub fn new(
        embedder: &'a E,
        reject_margin: f32,
        min_cluster_size: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            reject_margin,
            min_cluster_size,
            batch_size: batch_size.max(1),
        }
    }

    /// Validate the category configuration and resolve every reference to
    /// a unit embedding. Text references are embedded in one backend call.
    pub fn resolve(&self, categories: &[Category]) -> Result<Vec<ResolvedCategory>, CategoryError> {
        if categories.is_empty() {
            return Err(CategoryError::Empty);
        }
        match categories.iter().filter(|c| c.fallback).count() {
            0 => return Err(CategoryError::NoFallback),
            1 => {}
            _ => return Err(CategoryError::MultipleFallbacks),
        }

        let texts: Vec<&str> = categories
            .iter()
            .filter_map(|c| match &c.reference {
                CategoryReference::Text(t) => Some(t.as_str()),
                CategoryReference::Vector(_) => None,
            })
            .collect();
        let mut text_embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_texts(&texts)?
        }
        .into_iter();

        let mut resolved = Vec::with_capacity(categories.len());
        for category in categories {
            let mut embedding = match &category.reference {
                CategoryReference::Text(t) => {
                    text_embeddings.next().ok_or_else(|| EmbedError::Missing {
                        path: t.clone(),
                    })?
                }
                CategoryReference::Vector(v) => v.clone(),
            };
            normalize(&mut embedding);
            resolved.push(ResolvedCategory {
                name: category.name.clone(),
                embedding,
                fallback: category.fallback,
            });
        }
        Ok(resolved)
    }

    /// Label every member of every non-empty cluster. Members whose
    /// embedding is missing are embedded on demand; per-image failures
    /// only exclude the member from the centroid.
    pub fn assign(&self, clusters: &mut [Cluster], categories: &[ResolvedCategory]) {
        let fallback_idx = categories
            .iter()
            .position(|c| c.fallback)
            .expect("resolve() guarantees a fallback category");

        for cluster in clusters.iter_mut() {
            if cluster.is_empty() {
                continue;
            }

            self.embed_missing_members(cluster);

            let vectors: Vec<&Vec<f32>> = cluster
                .members
                .iter()
                .filter_map(|m| m.embedding.as_ref())
                .collect();

            let label = if vectors.is_empty() {
                // Nothing usable to classify with; the cluster falls back
                // rather than leaving its members unlabeled.
                log::warn!(
                    "Cluster {} has no usable embeddings; assigning fallback",
                    cluster.id
                );
                categories[fallback_idx].name.clone()
            } else {
                self.label_from_centroid(cluster, &vectors, categories, fallback_idx)
            };

            log::info!("Cluster {}: category = {}", cluster.id, label);
            for member in &mut cluster.members {
                member.category = Some(label.clone());
            }
        }
    }

    fn embed_missing_members(&self, cluster: &mut Cluster) {
        let missing: Vec<usize> = cluster
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.embedding.is_none())
            .map(|(idx, _)| idx)
            .collect();

        for chunk in missing.chunks(self.batch_size) {
            let refs: Vec<_> = chunk.iter().map(|&idx| &cluster.members[idx]).collect();
            let results = self.embedder.embed_images(&refs);
            for (&idx, result) in chunk.iter().zip(results) {
                match result {
                    Ok(vector) => cluster.members[idx].embedding = Some(vector),
                    Err(e) => log::warn!(
                        "Failed to embed {}: {}",
                        cluster.members[idx].path.display(),
                        e
                    ),
                }
            }
        }
    }

    fn label_from_centroid(
        &self,
        cluster: &Cluster,
        vectors: &[&Vec<f32>],
        categories: &[ResolvedCategory],
        fallback_idx: usize,
    ) -> String {
        let dim = vectors[0].len();
        let mut centroid = vec![0.0f32; dim];
        for v in vectors {
            for (acc, x) in centroid.iter_mut().zip(v.iter()) {
                *acc += x;
            }
        }
        for x in centroid.iter_mut() {
            *x /= vectors.len() as f32;
        }
        normalize(&mut centroid);

        let similarities: Vec<f32> = categories
            .iter()
            .map(|c| cosine_similarity(&centroid, &c.embedding))
            .collect();

        // Min-max normalize unless the scores are degenerate (all
        // categories equally (dis)similar).
        let min = similarities.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = similarities
            .iter()
            .cloned()
            .fold(f32::NEG_INFINITY, f32::max);
        let scores: Vec<f32> = if max - min > SCORE_SPREAD_EPSILON {
            similarities.iter().map(|s| (s - min) / (max - min)).collect()
        } else {
            similarities
        };

        let mut best_idx = 0;
        for (idx, score) in scores.iter().enumerate() {
            if *score > scores[best_idx] {
                best_idx = idx;
            }
        }
        let best_score = scores[best_idx];
        let fallback_score = scores[fallback_idx];

        // Small clusters are never trusted with a real category.
        if cluster.len() <= self.min_cluster_size {
            best_idx = fallback_idx;
        }

        let best = &categories[best_idx];
        if best.fallback || best_score - fallback_score < self.reject_margin {
            categories[fallback_idx].name.clone()
        } else {
            match cluster.day {
                Some(day) => format!("{}_{}", day.format("%Y_%m_%d"), best.name),
                None => best.name.clone(),
            }
        }
    }
}
