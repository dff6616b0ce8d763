use super::{
    SegmentationMask, Segmenter,
    graph_cut::{GridGraph, OFFSETS},
};
use crate::{
    CancelToken, ImageEffectError, ImageEffectResult, cancel,
    quantize::{self, make_rng},
};
use derivative::Derivative;
use derive_setters::Setters;
use image::RgbImage;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MattingLabel {
    Background = 0,
    Foreground,
    ProbablyBackground,
    ProbablyForeground,
}

impl MattingLabel {
    pub fn is_foreground(self) -> bool {
        matches!(
            self,
            MattingLabel::Foreground | MattingLabel::ProbablyForeground
        )
    }

    pub fn is_fixed(self) -> bool {
        matches!(self, MattingLabel::Background | MattingLabel::Foreground)
    }
}

/// Iterative foreground extraction seeded by an inset rectangle: everything
/// outside is background, everything inside starts as probable foreground.
/// Each pass re-learns colour mixtures for both sides and recomputes the
/// labels with a minimum graph cut.
#[derive(Debug, Clone, Derivative, Setters)]
#[derivative(Default)]
#[setters(prefix = "with_")]
#[non_exhaustive]
pub struct RectPriorMatting {
    #[derivative(Default(value = "50"))]
    margin: u32,

    #[derivative(Default(value = "5"))]
    iterations: u32,

    // mixture components per side
    #[derivative(Default(value = "5"))]
    components: usize,

    // smoothness weight
    #[derivative(Default(value = "50.0"))]
    gamma: f32,

    #[setters(strip_option)]
    seed: Option<u64>,

    #[setters(strip_option)]
    cancel: Option<CancelToken>,
}

impl RectPriorMatting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Half-open `(x0, y0, x1, y1)`. The margin shrinks to a quarter of the
    /// side when the image is too small for it.
    pub fn rect(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let inset = |side: u32| {
            if side > 2 * self.margin {
                self.margin
            } else {
                side / 4
            }
        };

        let (mx, my) = (inset(width), inset(height));
        (mx, my, width - mx, height - my)
    }

    pub fn initial_labels(&self, width: u32, height: u32) -> Vec<MattingLabel> {
        let (x0, y0, x1, y1) = self.rect(width, height);

        (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| {
                if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                    MattingLabel::ProbablyForeground
                } else {
                    MattingLabel::Background
                }
            })
            .collect()
    }

    pub fn labels(&self, image: &RgbImage) -> ImageEffectResult<Vec<MattingLabel>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageEffectError::Processing(
                "cannot segment an empty image".to_string(),
            ));
        }

        let mut labels = self.initial_labels(width, height);
        let points = image
            .pixels()
            .map(|p| p.0.map(|c| c as f32))
            .collect::<Vec<[f32; 3]>>();

        let foreground = labels.iter().filter(|l| l.is_foreground()).count();
        if foreground == 0 || foreground == labels.len() {
            log::debug!("matting: rectangle {:?} leaves one side empty", self.rect(width, height));
            return Ok(labels);
        }

        let mut rng = make_rng(self.seed);
        let mut components = self.initial_components(&points, &labels, &mut rng)?;
        let mut fg = Mixture::learn(&points, &labels, &components, true, self.components);
        let mut bg = Mixture::learn(&points, &labels, &components, false, self.components);

        let neighbours = NeighbourWeights::new(image, self.gamma);
        let fixed_weight = 8.0 * self.gamma + 1.0;

        for pass in 0..self.iterations {
            cancel::check(&self.cancel)?;

            if pass > 0 {
                let foreground = labels.iter().filter(|l| l.is_foreground()).count();
                if foreground == 0 || foreground == labels.len() {
                    log::debug!("matting: pass {pass} stopped, one side is empty");
                    break;
                }

                components = assign_components(&points, &labels, &fg, &bg);
                fg = Mixture::learn(&points, &labels, &components, true, self.components);
                bg = Mixture::learn(&points, &labels, &components, false, self.components);
            }

            let mut graph = GridGraph::new(width as usize, height as usize);
            let terminals = points
                .par_iter()
                .zip(labels.par_iter())
                .map(|(point, label)| match label {
                    MattingLabel::Background => (0.0, fixed_weight),
                    MattingLabel::Foreground => (fixed_weight, 0.0),
                    _ => {
                        let to_fg = fg.data_cost(point);
                        let to_bg = bg.data_cost(point);
                        let base = to_fg.min(to_bg);
                        // a pixel on the source side pays the sink capacity
                        ((to_bg - base) as f32, (to_fg - base) as f32)
                    }
                })
                .collect::<Vec<(f32, f32)>>();

            for (node, (source, sink)) in terminals.into_iter().enumerate() {
                graph.set_terminals(node, source, sink);
                for (dir, weight) in neighbours.weights[node].iter().enumerate() {
                    graph.set_edge(node, dir, *weight);
                }
            }

            let flow = graph.max_flow();
            let source_side = graph.source_side();

            for (label, is_fg) in labels.iter_mut().zip(source_side) {
                if !label.is_fixed() {
                    *label = if is_fg {
                        MattingLabel::ProbablyForeground
                    } else {
                        MattingLabel::ProbablyBackground
                    };
                }
            }

            log::debug!(
                "matting pass {pass}: flow {flow:.1}, {} foreground pixels",
                labels.iter().filter(|l| l.is_foreground()).count()
            );
        }

        Ok(labels)
    }

    /// 1.0 for (probable) foreground, 0.0 otherwise.
    pub fn matte(&self, image: &RgbImage) -> ImageEffectResult<SegmentationMask> {
        let (width, height) = image.dimensions();
        let data = self
            .labels(image)?
            .into_iter()
            .map(|label| if label.is_foreground() { 1.0 } else { 0.0 })
            .collect();

        SegmentationMask::new(width, height, data)
    }

    // k-means split of each side into colour clusters
    fn initial_components(
        &self,
        points: &[[f32; 3]],
        labels: &[MattingLabel],
        rng: &mut StdRng,
    ) -> ImageEffectResult<Vec<u32>> {
        let mut components = vec![0u32; points.len()];

        for side in [true, false] {
            let indices = (0..points.len())
                .filter(|&i| labels[i].is_foreground() == side)
                .collect::<Vec<usize>>();
            let samples = indices.iter().map(|&i| points[i]).collect::<Vec<[f32; 3]>>();

            let k = self.components.max(1).min(samples.len());
            let clustering = quantize::kmeans(&samples, k, 10, 0.0, 1, rng, &self.cancel)?;

            for (i, label) in indices.into_iter().zip(clustering.labels) {
                components[i] = label;
            }
        }

        Ok(components)
    }
}

impl Segmenter for RectPriorMatting {
    fn name(&self) -> &str {
        "rect-prior"
    }

    fn segment(&self, image: &RgbImage) -> ImageEffectResult<SegmentationMask> {
        self.matte(image)
    }
}

fn assign_components(
    points: &[[f32; 3]],
    labels: &[MattingLabel],
    fg: &Mixture,
    bg: &Mixture,
) -> Vec<u32> {
    points
        .par_iter()
        .zip(labels.par_iter())
        .map(|(point, label)| {
            if label.is_foreground() {
                fg.most_likely(point)
            } else {
                bg.most_likely(point)
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
struct Gaussian {
    component: u32,
    log_weight: f64,
    mean: [f64; 3],
    inverse: [[f64; 3]; 3],
    // -0.5 * ln det(cov) - 1.5 * ln(2 pi)
    log_norm: f64,
}

impl Gaussian {
    fn log_density(&self, point: &[f32; 3]) -> f64 {
        let d = [
            point[0] as f64 - self.mean[0],
            point[1] as f64 - self.mean[1],
            point[2] as f64 - self.mean[2],
        ];

        let mut mahalanobis = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                mahalanobis += d[i] * self.inverse[i][j] * d[j];
            }
        }

        self.log_weight + self.log_norm - 0.5 * mahalanobis
    }
}

/// Full-covariance Gaussian mixture over RGB.
#[derive(Debug, Clone)]
struct Mixture {
    gaussians: Vec<Gaussian>,
}

impl Mixture {
    const REGULARIZATION: f64 = 0.01;

    fn learn(
        points: &[[f32; 3]],
        labels: &[MattingLabel],
        components: &[u32],
        side: bool,
        count: usize,
    ) -> Self {
        let count = count.max(1);
        let mut n = vec![0usize; count];
        let mut sums = vec![[0f64; 3]; count];
        let mut products = vec![[[0f64; 3]; 3]; count];

        for ((point, label), component) in points.iter().zip(labels).zip(components) {
            if label.is_foreground() != side {
                continue;
            }

            let c = (*component as usize).min(count - 1);
            n[c] += 1;
            for i in 0..3 {
                sums[c][i] += point[i] as f64;
                for j in 0..3 {
                    products[c][i][j] += point[i] as f64 * point[j] as f64;
                }
            }
        }

        let total = n.iter().sum::<usize>() as f64;
        let mut gaussians = vec![];

        for c in 0..count {
            if n[c] == 0 {
                continue;
            }

            let size = n[c] as f64;
            let mean = sums[c].map(|s| s / size);
            let mut covariance = [[0f64; 3]; 3];
            for i in 0..3 {
                for j in 0..3 {
                    covariance[i][j] = products[c][i][j] / size - mean[i] * mean[j];
                }
                covariance[i][i] += Self::REGULARIZATION;
            }

            let Some((inverse, det)) = invert(&covariance) else {
                continue;
            };

            gaussians.push(Gaussian {
                component: c as u32,
                log_weight: (size / total).ln(),
                mean,
                inverse,
                log_norm: -0.5 * det.ln() - 1.5 * (2.0 * PI).ln(),
            });
        }

        Self { gaussians }
    }

    fn most_likely(&self, point: &[f32; 3]) -> u32 {
        self.gaussians
            .iter()
            .map(|g| (g.component, g.log_density(point)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(component, _)| component)
            .unwrap_or(0)
    }

    /// Negative log-likelihood of the whole mixture.
    fn data_cost(&self, point: &[f32; 3]) -> f64 {
        let densities = self
            .gaussians
            .iter()
            .map(|g| g.log_density(point))
            .collect::<Vec<f64>>();

        let Some(max) = densities.iter().copied().max_by(|a, b| a.total_cmp(b)) else {
            return f64::MAX / 4.0;
        };

        let sum = densities.iter().map(|d| (d - max).exp()).sum::<f64>();
        -(max + sum.ln())
    }
}

// Inverse and determinant of a 3x3 matrix.
fn invert(m: &[[f64; 3]; 3]) -> Option<([[f64; 3]; 3], f64)> {
    let cofactor = |r0: usize, r1: usize, c0: usize, c1: usize| {
        m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
    };

    let det = m[0][0] * cofactor(1, 2, 1, 2) - m[0][1] * cofactor(1, 2, 0, 2)
        + m[0][2] * cofactor(1, 2, 0, 1);
    if !det.is_finite() || det <= f64::EPSILON {
        return None;
    }

    let adjugate = [
        [
            cofactor(1, 2, 1, 2),
            -cofactor(0, 2, 1, 2),
            cofactor(0, 1, 1, 2),
        ],
        [
            -cofactor(1, 2, 0, 2),
            cofactor(0, 2, 0, 2),
            -cofactor(0, 1, 0, 2),
        ],
        [
            cofactor(1, 2, 0, 1),
            -cofactor(0, 2, 0, 1),
            cofactor(0, 1, 0, 1),
        ],
    ];

    Some((adjugate.map(|row| row.map(|v| v / det)), det))
}

/// Contrast sensitive pairwise weights `gamma * exp(-beta * |dz|^2) / dist`
/// for the four forward directions; `beta` comes from the mean neighbour
/// difference over the image.
struct NeighbourWeights {
    weights: Vec<[f32; 4]>,
}

impl NeighbourWeights {
    fn new(image: &RgbImage, gamma: f32) -> Self {
        let (width, height) = (image.width() as i64, image.height() as i64);
        let raw = image.as_raw();

        let diff2 = |x: i64, y: i64, dir: usize| -> Option<f64> {
            let (dx, dy) = OFFSETS[dir];
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                return None;
            }

            let a = ((y * width + x) * 3) as usize;
            let b = ((ny * width + nx) * 3) as usize;
            Some(
                (0..3)
                    .map(|c| {
                        let d = raw[a + c] as f64 - raw[b + c] as f64;
                        d * d
                    })
                    .sum(),
            )
        };

        let (mut total, mut pairs) = (0f64, 0usize);
        for y in 0..height {
            for x in 0..width {
                for dir in 0..4 {
                    if let Some(d) = diff2(x, y, dir) {
                        total += d;
                        pairs += 1;
                    }
                }
            }
        }

        let beta = if pairs == 0 || total <= f64::EPSILON {
            0.0
        } else {
            1.0 / (2.0 * total / pairs as f64)
        };
        log::debug!("matting: beta {beta:.6}");

        let weights = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| {
                let mut w = [0f32; 4];
                for (dir, weight) in w.iter_mut().enumerate() {
                    if let Some(d) = diff2(x, y, dir) {
                        let distance = if dir % 2 == 1 { 2f64.sqrt() } else { 1.0 };
                        *weight = (gamma as f64 * (-beta * d).exp() / distance) as f32;
                    }
                }
                w
            })
            .collect();

        Self { weights }
    }
}
