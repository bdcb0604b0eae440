use crate::core::model::{Fingerprint, ImageRecord};
use image::imageops::FilterType;
use image::{ImageBuffer, ImageReader, Luma};
use image_hasher::{HashAlg, HasherConfig};
use thiserror::Error;

/// All images are resized to this square working size before the sharpness
/// score and the fingerprint are computed, so both are comparable across
/// resolutions.
pub const WORKING_SIZE: u32 = 600;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Capability interface over the fingerprint/quality backend.
///
/// The pipeline treats this as a pure function per image, which keeps the
/// decision logic testable with deterministic stub values.
pub trait Hasher: Sync {
    fn hash_and_quality(&self, record: &ImageRecord) -> Result<(Fingerprint, f64), HashError>;
}

/// Default `Hasher` backed by the `image` and `image_hasher` crates.
///
/// Quality is the variance of the Laplacian over the resized grayscale
/// image (higher = sharper); the fingerprint is a 64-bit DCT mean hash of
/// the same resized image.
pub struct ImageHasher {
    hasher: image_hasher::Hasher,
}

impl ImageHasher {
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .hash_size(8, 8)
            .to_hasher();
        Self { hasher }
    }
}

impl Default for ImageHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for ImageHasher {
    fn hash_and_quality(&self, record: &ImageRecord) -> Result<(Fingerprint, f64), HashError> {
        let img = ImageReader::open(&record.path)?.decode()?;
        let resized = img.resize_exact(WORKING_SIZE, WORKING_SIZE, FilterType::Triangle);

        let gray = resized.to_luma8();
        let quality = laplacian_variance(&gray);

        let fingerprint = Fingerprint(self.hasher.hash_image(&resized).as_bytes().to_vec());

        Ok((fingerprint, quality))
    }
}

/// Variance of the 4-neighbor Laplacian response, a standard sharpness
/// proxy: blurry images have weak edges and a low variance.
fn laplacian_variance(image: &ImageBuffer<Luma<u8>, Vec<u8>>) -> f64 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0u64;

    for y in 1..(height - 1) {
        for x in 1..(width - 1) {
            let center = image.get_pixel(x, y)[0] as f64;
            let up = image.get_pixel(x, y - 1)[0] as f64;
            let down = image.get_pixel(x, y + 1)[0] as f64;
            let left = image.get_pixel(x - 1, y)[0] as f64;
            let right = image.get_pixel(x + 1, y)[0] as f64;

            let laplacian = 4.0 * center - up - down - left - right;
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    sum_sq / count as f64 - mean * mean
}
