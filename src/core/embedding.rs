use crate::core::model::ImageRecord;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    #[error("Embedding backend failure: {message}")]
    Backend { message: String },

    #[error("No embedding produced for {path}")]
    Missing { path: String },
}

/// Capability interface over the vision/text embedding backend.
///
/// Implementations must return unit-length (L2-normalized) vectors of one
/// fixed dimension. The backend is an external collaborator; the pipeline
/// only ever calls it through this trait, so tests run on deterministic
/// stub vectors.
pub trait Embedder {
    /// One vector per image, in input order. Failures are per-image: a
    /// failed slot must not shift the others.
    fn embed_images(&self, images: &[&ImageRecord]) -> Vec<Result<Vec<f32>, EmbedError>>;

    /// One vector per label text, in input order. Labels either all embed
    /// or the call fails as a whole.
    fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Dot product of two equal-length vectors. For unit-length inputs this is
/// the cosine similarity.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "embedding dimensions differ");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale a vector to unit length. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_unit_vectors() {
        let v = vec![0.6, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    #[should_panic(expected = "embedding dimensions differ")]
    fn test_cosine_dimension_mismatch() {
        cosine_similarity(&[1.0], &[1.0, 0.0]);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
