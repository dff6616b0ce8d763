use crate::{
    CancelToken, Effect, ImageEffectError, ImageEffectResult, blur,
    edge::{EDGE, EdgeMaskConfig},
    quantize::KMeansConfig,
};
use derivative::Derivative;
use derive_setters::Setters;
use image::{GrayImage, Rgb, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartoonComposite {
    /// Smoothed colour survives only where the edge mask is set.
    KeepEdges,

    /// Smoothed colour everywhere, edges painted black.
    InkLines,
}

/// Posterize, smooth and combine with an edge mask.
#[derive(Debug, Clone, Derivative, Setters)]
#[derivative(Default)]
#[setters(prefix = "with_")]
#[non_exhaustive]
pub struct CartoonConfig {
    #[derivative(Default(value = "10"))]
    colors: usize,

    #[derivative(Default(value = "EdgeMaskConfig::new()"))]
    edges: EdgeMaskConfig,

    #[derivative(Default(value = "7"))]
    bilateral_diameter: u32,

    #[derivative(Default(value = "250.0"))]
    sigma_color: f32,

    #[derivative(Default(value = "250.0"))]
    sigma_space: f32,

    #[derivative(Default(value = "CartoonComposite::KeepEdges"))]
    composite: CartoonComposite,

    #[setters(strip_option)]
    seed: Option<u64>,

    #[setters(strip_option)]
    cancel: Option<CancelToken>,
}

impl CartoonConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn composite(&self) -> CartoonComposite {
        self.composite
    }

    fn kmeans(&self) -> KMeansConfig {
        let mut config = KMeansConfig::new().with_k(self.colors);
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(cancel) = &self.cancel {
            config = config.with_cancel(cancel.clone());
        }
        config
    }
}

impl Effect for CartoonConfig {
    fn apply(&self, image: RgbImage) -> ImageEffectResult<RgbImage> {
        if self.colors == 0 {
            return Err(ImageEffectError::Parameter(
                "colors must be at least 1".to_string(),
            ));
        }

        let mask = self.edges.extract(&image);

        let (width, height) = image.dimensions();
        let quantized = self.kmeans().quantize(&image)?.reconstruct(width, height)?;

        let smoothed = blur::bilateral_filter(
            &quantized,
            self.bilateral_diameter,
            self.sigma_color,
            self.sigma_space,
        );

        Ok(composite(smoothed, &mask, self.composite))
    }
}

pub fn composite(mut smoothed: RgbImage, mask: &GrayImage, mode: CartoonComposite) -> RgbImage {
    for (pixel, edge) in smoothed.pixels_mut().zip(mask.pixels()) {
        let is_edge = edge[0] == EDGE;
        let keep = match mode {
            CartoonComposite::KeepEdges => is_edge,
            CartoonComposite::InkLines => !is_edge,
        };

        if !keep {
            *pixel = Rgb([0, 0, 0]);
        }
    }

    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::FLAT;
    use image::Luma;

    fn scene() -> RgbImage {
        RgbImage::from_fn(24, 16, |x, y| match (x < 12, y < 8) {
            (true, true) => Rgb([200, 40, 40]),
            (false, true) => Rgb([40, 200, 40]),
            (true, false) => Rgb([40, 40, 200]),
            (false, false) => Rgb([30, 30, 30]),
        })
    }

    #[test]
    fn test_composite_rules() {
        let smoothed = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([EDGE]));
        mask.put_pixel(1, 0, Luma([FLAT]));

        let kept = composite(smoothed.clone(), &mask, CartoonComposite::KeepEdges);
        assert_eq!(kept.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(kept.get_pixel(1, 0).0, [0, 0, 0]);

        let inked = composite(smoothed, &mask, CartoonComposite::InkLines);
        assert_eq!(inked.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(inked.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_flat_image_keep_edges_is_black() {
        let image = RgbImage::from_pixel(20, 20, Rgb([100, 150, 200]));
        let result = CartoonConfig::new().apply(image).unwrap();

        assert_eq!(result.dimensions(), (20, 20));
        assert!(result.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_ink_lines_keeps_palette_colors() {
        let image = scene();
        let result = CartoonConfig::new()
            .with_composite(CartoonComposite::InkLines)
            .with_seed(3)
            .apply(image.clone())
            .unwrap();

        assert_eq!(result.dimensions(), image.dimensions());
        // far from any border the colour block is unchanged
        assert_eq!(result.get_pixel(2, 2).0, [200, 40, 40]);
        assert_eq!(result.get_pixel(21, 2).0, [40, 200, 40]);
    }

    #[test]
    fn test_zero_colors_rejected() {
        let result = CartoonConfig::new().with_colors(0).apply(scene());
        assert!(matches!(result, Err(ImageEffectError::Parameter(_))));
    }
}
