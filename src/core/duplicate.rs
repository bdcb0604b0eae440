use crate::core::hasher::Hasher;
use crate::core::model::{Fingerprint, ImageRecord, RejectReason, RejectedImage};
use rayon::prelude::*;

/// Output of the duplicate/blur filter stage.
#[derive(Debug)]
pub struct FilterOutcome {
    pub retained: Vec<ImageRecord>,
    pub rejected: Vec<RejectedImage>,
}

/// Removes near-duplicate and blurry images.
///
/// Duplicate resolution is a single greedy pass over an accumulating list
/// of representatives and is deliberately input-order dependent: the first
/// representative within `phash_threshold` of a new image resolves the
/// pair, and reordering the input may change which of a near-duplicate
/// pair survives. This matches the product behavior and is pinned by
/// tests, not corrected.
pub struct DuplicateFilter<'a, H: Hasher + ?Sized> {
    hasher: &'a H,
    blur_threshold: f64,
    phash_threshold: u32,
}

struct Hashed {
    record: ImageRecord,
    fingerprint: Fingerprint,
    quality: f64,
}

impl Hashed {
    fn into_record(mut self) -> ImageRecord {
        self.record.fingerprint = Some(self.fingerprint);
        self.record.quality = Some(self.quality);
        self.record
    }

    fn into_rejected(self, reason: RejectReason) -> RejectedImage {
        RejectedImage::new(self.into_record(), reason)
    }
}

impl<'a, H: Hasher + ?Sized> DuplicateFilter<'a, H> {
    pub fn new(hasher: &'a H, blur_threshold: f64, phash_threshold: u32) -> Self {
        Self {
            hasher,
            blur_threshold,
            phash_threshold,
        }
    }

    /// Filter `images`, returning the retained survivors and every
    /// rejected image with its reason. Retained order is stable with
    /// respect to input order.
    pub fn filter(&self, images: Vec<ImageRecord>) -> FilterOutcome {
        let total = images.len();

        // Fingerprint and score every image up front; the greedy pass
        // below stays sequential because it is order-sensitive.
        let hashed: Vec<_> = images
            .into_par_iter()
            .map(|record| {
                let result = self.hasher.hash_and_quality(&record);
                (record, result)
            })
            .collect();

        let mut rejected = Vec::new();
        let mut representatives: Vec<Hashed> = Vec::new();

        for (record, result) in hashed {
            let candidate = match result {
                Ok((fingerprint, quality)) => Hashed {
                    record,
                    fingerprint,
                    quality,
                },
                Err(e) => {
                    log::warn!("Failed to decode {}: {}", record.path.display(), e);
                    rejected.push(RejectedImage::with_detail(
                        record,
                        RejectReason::DecodeError,
                        e.to_string(),
                    ));
                    continue;
                }
            };

            let matched = representatives.iter().position(|rep| {
                rep.fingerprint.hamming_distance(&candidate.fingerprint) < self.phash_threshold
            });

            match matched {
                Some(idx) => {
                    // Keep the sharper of the pair in the representative
                    // slot; the loser is rejected. Only the first matching
                    // representative is consulted.
                    if candidate.quality > representatives[idx].quality {
                        let loser = std::mem::replace(&mut representatives[idx], candidate);
                        rejected.push(loser.into_rejected(RejectReason::Duplicate));
                    } else {
                        rejected.push(candidate.into_rejected(RejectReason::Duplicate));
                    }
                }
                None => representatives.push(candidate),
            }
        }

        let mut retained = Vec::new();
        for rep in representatives {
            if rep.quality > self.blur_threshold {
                retained.push(rep.into_record());
            } else {
                rejected.push(rep.into_rejected(RejectReason::Blurry));
            }
        }

        log::info!(
            "Duplicate filter: {} in, {} retained, {} rejected",
            total,
            retained.len(),
            rejected.len()
        );

        FilterOutcome { retained, rejected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::HashError;
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Deterministic hasher: maps a path to preset (fingerprint, quality);
    /// unknown paths fail like an unreadable file.
    struct StubHasher {
        map: HashMap<PathBuf, (Fingerprint, f64)>,
    }

    impl StubHasher {
        fn new(entries: &[(&str, Vec<u8>, f64)]) -> Self {
            let map = entries
                .iter()
                .map(|(path, bytes, quality)| {
                    (PathBuf::from(path), (Fingerprint(bytes.clone()), *quality))
                })
                .collect();
            Self { map }
        }
    }

    impl Hasher for StubHasher {
        fn hash_and_quality(
            &self,
            record: &ImageRecord,
        ) -> Result<(Fingerprint, f64), HashError> {
            self.map.get(&record.path).cloned().ok_or_else(|| {
                HashError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such image",
                ))
            })
        }
    }

    fn records(paths: &[&str]) -> Vec<ImageRecord> {
        paths.iter().map(ImageRecord::new).collect()
    }

    fn retained_names(outcome: &FilterOutcome) -> Vec<String> {
        outcome
            .retained
            .iter()
            .map(|r| r.file_name.clone())
            .collect()
    }

    #[test]
    fn test_duplicate_pair_keeps_higher_quality() {
        // Fingerprints 5 bits apart, under the threshold of 20.
        let hasher = StubHasher::new(&[
            ("a.jpg", vec![0u8; 8], 120.0),
            ("b.jpg", vec![0b0001_1111, 0, 0, 0, 0, 0, 0, 0], 80.0),
        ]);
        let filter = DuplicateFilter::new(&hasher, 100.0, 20);

        let outcome = filter.filter(records(&["a.jpg", "b.jpg"]));

        assert_eq!(retained_names(&outcome), vec!["a.jpg"]);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].reason, RejectReason::Duplicate);
        assert_eq!(outcome.rejected[0].record.file_name, "b.jpg");
    }

    #[test]
    fn test_later_higher_quality_replaces_representative() {
        let hasher = StubHasher::new(&[
            ("a.jpg", vec![0u8; 8], 80.0),
            ("b.jpg", vec![0b0000_0111, 0, 0, 0, 0, 0, 0, 0], 150.0),
        ]);
        let filter = DuplicateFilter::new(&hasher, 100.0, 20);

        let outcome = filter.filter(records(&["a.jpg", "b.jpg"]));

        assert_eq!(retained_names(&outcome), vec!["b.jpg"]);
        assert_eq!(outcome.rejected[0].record.file_name, "a.jpg");
        assert_eq!(outcome.rejected[0].reason, RejectReason::Duplicate);
    }

    #[test]
    fn test_retained_plus_rejected_covers_all_inputs() {
        let hasher = StubHasher::new(&[
            ("a.jpg", vec![0u8; 8], 120.0),
            ("b.jpg", vec![0b0000_0001, 0, 0, 0, 0, 0, 0, 0], 90.0),
            ("c.jpg", vec![0xFF; 8], 40.0),
            ("d.jpg", vec![0xF0; 8], 200.0),
        ]);
        let filter = DuplicateFilter::new(&hasher, 100.0, 20);

        let outcome = filter.filter(records(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]));

        assert_eq!(outcome.retained.len() + outcome.rejected.len(), 4);
    }

    #[test]
    fn test_decode_failures_are_reported_not_retried() {
        let hasher = StubHasher::new(&[("a.jpg", vec![0u8; 8], 120.0)]);
        let filter = DuplicateFilter::new(&hasher, 100.0, 20);

        let outcome = filter.filter(records(&["a.jpg", "broken.jpg"]));

        assert_eq!(retained_names(&outcome), vec!["a.jpg"]);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].reason, RejectReason::DecodeError);
        assert!(outcome.rejected[0].detail.is_some());

        // Retained + non-decode rejections account for every decoded input.
        let decoded = 1;
        let non_decode = outcome
            .rejected
            .iter()
            .filter(|r| r.reason != RejectReason::DecodeError)
            .count();
        assert_eq!(outcome.retained.len() + non_decode, decoded);
    }

    #[test]
    fn test_blur_threshold_is_exclusive() {
        let hasher = StubHasher::new(&[
            ("sharp.jpg", vec![0u8; 8], 100.1),
            ("at_threshold.jpg", vec![0xFF; 8], 100.0),
            ("soft.jpg", vec![0x0F; 8], 12.0),
        ]);
        let filter = DuplicateFilter::new(&hasher, 100.0, 2);

        let outcome = filter.filter(records(&["sharp.jpg", "at_threshold.jpg", "soft.jpg"]));

        assert_eq!(retained_names(&outcome), vec!["sharp.jpg"]);
        assert!(outcome
            .rejected
            .iter()
            .all(|r| r.reason == RejectReason::Blurry));
        assert_eq!(outcome.rejected.len(), 2);
    }

    #[test]
    fn test_first_match_wins_not_best_match() {
        // c is 10 bits from a and 2 bits from b; a is scanned first, so a
        // resolves the pair even though b is the closer representative.
        let hasher = StubHasher::new(&[
            ("a.jpg", vec![0u8; 8], 300.0),
            ("b.jpg", vec![0xFF, 0xFF, 0xFF, 0, 0, 0, 0, 0], 200.0),
            ("c.jpg", vec![0b0011_1111, 0b1111_0000, 0, 0, 0, 0, 0, 0], 150.0),
        ]);
        // a-b distance 24 keeps them separate representatives.
        let filter = DuplicateFilter::new(&hasher, 100.0, 12);

        let outcome = filter.filter(records(&["a.jpg", "b.jpg", "c.jpg"]));

        assert_eq!(retained_names(&outcome), vec!["a.jpg", "b.jpg"]);
        assert_eq!(outcome.rejected[0].record.file_name, "c.jpg");
    }

    #[test]
    fn test_input_order_changes_survivor() {
        // a~b and b~c are near-duplicates, a and c are not. The winner set
        // depends on arrival order; both runs are internally consistent.
        let entries: [(&str, Vec<u8>, f64); 3] = [
            ("a.jpg", vec![0u8; 8], 150.0),
            ("b.jpg", vec![0b0000_1111, 0, 0, 0, 0, 0, 0, 0], 160.0),
            ("c.jpg", vec![0b1111_1111, 0b0000_0011, 0, 0, 0, 0, 0, 0], 170.0),
        ];
        let hasher = StubHasher::new(&entries);
        let filter = DuplicateFilter::new(&hasher, 100.0, 7);

        let forward = filter.filter(records(&["a.jpg", "b.jpg", "c.jpg"]));
        let backward = filter.filter(records(&["c.jpg", "b.jpg", "a.jpg"]));

        assert_ne!(retained_names(&forward), retained_names(&backward));
        assert_eq!(forward.retained.len() + forward.rejected.len(), 3);
        assert_eq!(backward.retained.len() + backward.rejected.len(), 3);
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let hasher = StubHasher::new(&[
            ("a.jpg", vec![0u8; 8], 150.0),
            ("b.jpg", vec![0b0000_0011, 0, 0, 0, 0, 0, 0, 0], 120.0),
            ("c.jpg", vec![0xFF; 8], 180.0),
        ]);
        let filter = DuplicateFilter::new(&hasher, 100.0, 10);

        let first = filter.filter(records(&["a.jpg", "b.jpg", "c.jpg"]));
        let second = filter.filter(first.retained.clone());

        assert!(second.rejected.is_empty());
        assert_eq!(retained_names(&second), retained_names(&first));
    }
}
