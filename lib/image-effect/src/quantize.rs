use crate::{CancelToken, ImageEffectError, ImageEffectResult, cancel};
use derivative::Derivative;
use derive_setters::Setters;
use image::RgbImage;
use kmeans_colors::get_kmeans;
use palette::Srgb;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Colour quantization by k-means clustering in RGB space.
#[derive(Debug, Clone, Derivative, Setters)]
#[derivative(Default)]
#[setters(prefix = "with_")]
#[non_exhaustive]
pub struct KMeansConfig {
    #[derivative(Default(value = "10"))]
    k: usize,

    #[derivative(Default(value = "50"))]
    max_iterations: u32,

    // stop once no center moves farther than this
    #[derivative(Default(value = "0.01"))]
    epsilon: f32,

    // random restarts, the lowest compactness wins
    #[derivative(Default(value = "10"))]
    attempts: u32,

    #[setters(strip_option)]
    seed: Option<u64>,

    #[setters(strip_option)]
    cancel: Option<CancelToken>,
}

#[derive(Debug, Clone)]
pub struct QuantizationResult {
    pub centers: Vec<[u8; 3]>,
    pub labels: Vec<u32>,
    pub compactness: f64,
}

impl QuantizationResult {
    /// Every pixel replaced by the colour of its cluster.
    pub fn reconstruct(&self, width: u32, height: u32) -> ImageEffectResult<RgbImage> {
        if self.labels.len() != width as usize * height as usize {
            return Err(ImageEffectError::DimensionMismatch {
                expected: (width, height),
                actual: (self.labels.len() as u32, 1),
            });
        }

        let data = self
            .labels
            .iter()
            .flat_map(|&label| self.centers[label as usize])
            .collect::<Vec<u8>>();

        RgbImage::from_raw(width, height, data)
            .ok_or_else(|| ImageEffectError::Processing("Failed to rebuild image".to_string()))
    }
}

impl KMeansConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quantize(&self, image: &RgbImage) -> ImageEffectResult<QuantizationResult> {
        if self.k == 0 {
            return Err(ImageEffectError::Processing(
                "k-means needs at least one cluster".to_string(),
            ));
        }

        if image.width() == 0 || image.height() == 0 {
            return Err(ImageEffectError::Processing(
                "cannot quantize an empty image".to_string(),
            ));
        }

        if let Some(result) = self.distinct_palette(image) {
            log::debug!("quantize: {} distinct colors <= k={}", result.centers.len(), self.k);
            return Ok(result);
        }

        let points = image
            .pixels()
            .map(|p| p.0.map(|c| c as f32))
            .collect::<Vec<[f32; 3]>>();

        let mut rng = make_rng(self.seed);
        let clustering = kmeans(
            &points,
            self.k,
            self.max_iterations,
            self.epsilon,
            self.attempts,
            &mut rng,
            &self.cancel,
        )?;

        Ok(QuantizationResult {
            centers: clustering
                .centers
                .iter()
                .map(|center| center.map(|c| c.round().clamp(0.0, 255.0) as u8))
                .collect(),
            labels: clustering.labels,
            compactness: clustering.compactness,
        })
    }

    // Exact palette when the image already has no more than k colours.
    fn distinct_palette(&self, image: &RgbImage) -> Option<QuantizationResult> {
        let mut distinct = HashSet::new();
        for pixel in image.pixels() {
            distinct.insert(pixel.0);
            if distinct.len() > self.k {
                return None;
            }
        }

        let mut centers = distinct.into_iter().collect::<Vec<[u8; 3]>>();
        centers.sort_unstable();

        let index = centers
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, i as u32))
            .collect::<HashMap<[u8; 3], u32>>();

        let labels = image.pixels().map(|p| index[&p.0]).collect();

        Some(QuantizationResult {
            centers,
            labels,
            compactness: 0.0,
        })
    }
}

pub(crate) fn make_rng(seed: Option<u64>) -> StdRng {
    let seed = seed.unwrap_or_else(|| rand::rng().random::<u64>());
    log::debug!("rng seed: {seed}");
    StdRng::seed_from_u64(seed)
}

#[derive(Debug, Clone)]
pub(crate) struct Clustering {
    pub centers: Vec<[f32; 3]>,
    pub labels: Vec<u32>,
    pub compactness: f64,
}

/// Most clusters a single run can label.
pub const MAX_CLUSTERS: usize = u8::MAX as usize;

fn distance2(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    (0..3).map(|i| (a[i] - b[i]) * (a[i] - b[i])).sum()
}

/// Best of `attempts` k-means runs, each seeded from `rng`. Points and
/// centers are RGB in `[0, 255]`; compactness is the summed squared distance
/// of every point to its center.
pub(crate) fn kmeans(
    points: &[[f32; 3]],
    k: usize,
    max_iterations: u32,
    epsilon: f32,
    attempts: u32,
    rng: &mut StdRng,
    cancel: &Option<CancelToken>,
) -> ImageEffectResult<Clustering> {
    if k == 0 || points.len() < k {
        return Err(ImageEffectError::Processing(format!(
            "k-means needs 1 <= k <= {} points, got k={k}",
            points.len()
        )));
    }

    if k > MAX_CLUSTERS {
        return Err(ImageEffectError::Parameter(format!(
            "k-means supports at most {MAX_CLUSTERS} clusters, got k={k}"
        )));
    }

    let buffer = points
        .iter()
        .map(|p| Srgb::new(p[0] / 255.0, p[1] / 255.0, p[2] / 255.0))
        .collect::<Vec<Srgb>>();

    let mut best: Option<Clustering> = None;

    for attempt in 0..attempts.max(1) {
        cancel::check(cancel)?;

        let seed = rng.random::<u64>();
        let run = get_kmeans(
            k,
            max_iterations.max(1) as usize,
            epsilon / 255.0,
            false,
            &buffer,
            seed,
        );

        let centers = run
            .centroids
            .iter()
            .map(|c| [c.red * 255.0, c.green * 255.0, c.blue * 255.0])
            .collect::<Vec<[f32; 3]>>();
        let labels = run.indices.into_iter().map(u32::from).collect::<Vec<u32>>();

        let compactness = points
            .par_iter()
            .zip(labels.par_iter())
            .map(|(point, &label)| distance2(point, &centers[label as usize]) as f64)
            .sum::<f64>();
        log::debug!("k-means attempt {attempt}: score {:.4}, compactness {compactness:.1}", run.score);

        if best.as_ref().is_none_or(|b| compactness < b.compactness) {
            best = Some(Clustering {
                centers,
                labels,
                compactness,
            });
        }
    }

    best.ok_or_else(|| ImageEffectError::Processing("k-means produced no clustering".to_string()))
}

pub fn distinct_colors(image: &RgbImage) -> usize {
    image.pixels().map(|p| p.0).collect::<HashSet<[u8; 3]>>().len()
}

pub fn quantize_image(image: &RgbImage, config: &KMeansConfig) -> ImageEffectResult<RgbImage> {
    let (width, height) = image.dimensions();
    config.quantize(image)?.reconstruct(width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn two_tone(width: u32, height: u32, a: [u8; 3], b: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| if x < width / 2 { Rgb(a) } else { Rgb(b) })
    }

    fn gradient() -> RgbImage {
        RgbImage::from_fn(32, 32, |x, y| {
            Rgb([(x * 8) as u8, (y * 8) as u8, ((x * 3 + y * 5) % 256) as u8])
        })
    }

    #[test]
    fn test_single_cluster_is_mean_color() {
        let image = two_tone(8, 8, [10, 20, 30], [30, 60, 90]);
        let result = KMeansConfig::new().with_k(1).with_seed(7).quantize(&image).unwrap();

        assert_eq!(result.centers, vec![[20, 40, 60]]);
        let rebuilt = result.reconstruct(8, 8).unwrap();
        assert!(rebuilt.pixels().all(|p| p.0 == [20, 40, 60]));
    }

    #[test]
    fn test_few_colors_are_reproduced_exactly() {
        let image = RgbImage::from_fn(9, 3, |x, _| match x % 3 {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 128, 0]),
            _ => Rgb([1, 2, 3]),
        });

        let rebuilt = quantize_image(&image, &KMeansConfig::new().with_k(4)).unwrap();
        assert_eq!(rebuilt, image);
    }

    #[test]
    fn test_at_most_k_colors() {
        let image = gradient();
        let config = KMeansConfig::new().with_k(4).with_attempts(3).with_seed(1);
        let result = config.quantize(&image).unwrap();

        assert_eq!(result.labels.len(), 32 * 32);
        assert!(result.labels.iter().all(|&l| (l as usize) < result.centers.len()));

        let rebuilt = result.reconstruct(32, 32).unwrap();
        assert!(distinct_colors(&rebuilt) <= 4);
    }

    #[test]
    fn test_seed_makes_runs_repeatable() {
        let image = gradient();
        let config = KMeansConfig::new().with_k(5).with_attempts(2).with_seed(99);

        let a = config.quantize(&image).unwrap();
        let b = config.quantize(&image).unwrap();
        assert_eq!(a.centers, b.centers);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_zero_clusters_fail() {
        let image = gradient();
        assert!(matches!(
            KMeansConfig::new().with_k(0).quantize(&image),
            Err(ImageEffectError::Processing(_))
        ));
    }

    #[test]
    fn test_too_many_clusters_are_rejected() {
        let result = KMeansConfig::new().with_k(MAX_CLUSTERS + 1).quantize(&gradient());
        assert!(matches!(result, Err(ImageEffectError::Parameter(_))));

        // an image with few enough colours never reaches the clustering
        let image = two_tone(4, 4, [1, 1, 1], [9, 9, 9]);
        let result = KMeansConfig::new().with_k(1000).quantize(&image).unwrap();
        assert_eq!(result.centers.len(), 2);
    }

    #[test]
    fn test_more_attempts_never_worsen_compactness() {
        let image = gradient();
        let single = KMeansConfig::new().with_k(6).with_attempts(1).with_seed(5);
        let several = KMeansConfig::new().with_k(6).with_attempts(4).with_seed(5);

        let a = single.quantize(&image).unwrap();
        let b = several.quantize(&image).unwrap();
        assert!(b.compactness <= a.compactness);
    }

    #[test]
    fn test_cancelled_before_first_attempt() {
        let token = CancelToken::new();
        token.cancel();

        let result = KMeansConfig::new()
            .with_k(3)
            .with_cancel(token)
            .quantize(&gradient());
        assert!(matches!(result, Err(ImageEffectError::Cancelled)));
    }
}
