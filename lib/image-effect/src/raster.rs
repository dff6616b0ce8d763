use crate::{ImageEffectError, ImageEffectResult};
use image::{RgbImage, RgbaImage};

/// Decoded raster: row-major, interleaved `R, G, B(, A)` samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> ImageEffectResult<Self> {
        if channels != 3 && channels != 4 {
            return Err(ImageEffectError::Parameter(format!(
                "unsupported channel count {channels}, expected 3 or 4"
            )));
        }

        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(ImageEffectError::Parameter(format!(
                "buffer holds {} samples, {width}x{height}x{channels} needs {expected}",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Solid color image, 3 channels.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels as usize;
        let offset = (y as usize * self.width as usize + x as usize) * c;
        &self.data[offset..offset + c]
    }

    pub fn pixels(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(self.channels as usize)
    }

    /// RGB copy; alpha, when present, is dropped.
    pub fn to_rgb8(&self) -> RgbImage {
        let data = match self.channels {
            3 => self.data.clone(),
            _ => self
                .pixels()
                .flat_map(|p| [p[0], p[1], p[2]])
                .collect::<Vec<u8>>(),
        };

        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    pub fn into_rgb8(self) -> RgbImage {
        match self.channels {
            3 => {
                let (width, height) = (self.width, self.height);
                RgbImage::from_raw(width, height, self.data)
                    .unwrap_or_else(|| RgbImage::new(width, height))
            }
            _ => self.to_rgb8(),
        }
    }

    /// RGBA copy; opaque alpha is added to 3-channel images.
    pub fn to_rgba8(&self) -> RgbaImage {
        let data = match self.channels {
            4 => self.data.clone(),
            _ => self
                .pixels()
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect::<Vec<u8>>(),
        };

        RgbaImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

impl From<RgbImage> for RasterImage {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: 3,
            data: image.into_raw(),
        }
    }
}

impl From<RgbaImage> for RasterImage {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            channels: 4,
            data: image.into_raw(),
        }
    }
}
