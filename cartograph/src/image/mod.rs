//! Pixel buffers produced by the raster renderer and consumed by raster symbolizers and markers.

use std::fmt::Debug;

use crate::color::Color;
use crate::error::CartographError;

#[cfg(feature = "image")]
mod codec;

#[cfg(feature = "image")]
pub use codec::{EncodeFormat, FormatOptions};

/// Type of a single pixel of an [`Image`].
pub trait Pixel: Copy + Default + Debug + PartialEq + Send + Sync + 'static {}

impl Pixel for [u8; 4] {}
impl Pixel for u8 {}
impl Pixel for u16 {}
impl Pixel for f32 {}

/// Row-major 2d pixel buffer.
///
/// Besides the pixels the image carries two flags: whether the color channels are premultiplied by
/// alpha, and whether anything has been painted into it since creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<P: Pixel> {
    width: u32,
    height: u32,
    data: Vec<P>,
    premultiplied: bool,
    painted: bool,
}

/// RGBA image with 8 bits per channel.
pub type ImageRgba8 = Image<[u8; 4]>;
/// Single channel image with 8 bits per pixel.
pub type ImageGray8 = Image<u8>;
/// Single channel image with 16 bits per pixel.
pub type ImageGray16 = Image<u16>;
/// Single channel image with float pixels.
pub type ImageGray32f = Image<f32>;

impl<P: Pixel> Image<P> {
    /// Creates a new image filled with default pixel value (transparent for RGBA images).
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![P::default(); width as usize * height as usize],
            premultiplied: false,
            painted: false,
        }
    }

    /// Creates an image from existing pixel data.
    pub fn from_data(width: u32, height: u32, data: Vec<P>) -> Result<Self, CartographError> {
        if data.len() != width as usize * height as usize {
            return Err(CartographError::Image(format!(
                "pixel data of length {} doesn't match image size {width}x{height}",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            data,
            premultiplied: false,
            painted: false,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns true if the image has zero pixels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel data in row-major order.
    pub fn data(&self) -> &[P] {
        &self.data
    }

    /// Mutable pixel data in row-major order.
    pub fn data_mut(&mut self) -> &mut [P] {
        &mut self.data
    }

    /// Pixel at the given position, `None` if the position is outside of the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<P> {
        if x >= self.width || y >= self.height {
            return None;
        }

        self.data.get(self.index(x, y)).copied()
    }

    /// Sets a pixel. Positions outside of the image are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: P) {
        if x < self.width && y < self.height {
            let index = self.index(x, y);
            self.data[index] = value;
        }
    }

    /// One row of pixels.
    pub fn row(&self, y: u32) -> &[P] {
        let start = y as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }

    /// One row of pixels, mutable.
    pub fn row_mut(&mut self, y: u32) -> &mut [P] {
        let start = y as usize * self.width as usize;
        let width = self.width as usize;
        &mut self.data[start..start + width]
    }

    /// Sets every pixel to the given value.
    pub fn fill(&mut self, value: P) {
        self.data.fill(value);
    }

    /// Returns true if the color channels are multiplied by alpha.
    pub fn is_premultiplied(&self) -> bool {
        self.premultiplied
    }

    /// Sets the premultiplied flag without touching the pixels.
    pub fn set_premultiplied(&mut self, premultiplied: bool) {
        self.premultiplied = premultiplied;
    }

    /// Returns true if something was painted into the image.
    pub fn painted(&self) -> bool {
        self.painted
    }

    /// Sets the painted flag.
    pub fn set_painted(&mut self, painted: bool) {
        self.painted = painted;
    }

    /// Copy of a rectangular part of the image. The rectangle is clipped to the image bounds.
    pub fn view(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x_end = (x.saturating_add(width)).min(self.width);
        let y_end = (y.saturating_add(height)).min(self.height);
        let width = x_end.saturating_sub(x);
        let height = y_end.saturating_sub(y);

        let mut data = Vec::with_capacity(width as usize * height as usize);
        if width > 0 {
            for row in y..y_end {
                data.extend_from_slice(&self.row(row)[x as usize..x_end as usize]);
            }
        }

        Self {
            width,
            height,
            data,
            premultiplied: self.premultiplied,
            painted: self.painted,
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl ImageRgba8 {
    /// Creates an image filled with the given color.
    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        let mut image = Self::new(width, height);
        image.set_background(color);
        image
    }

    /// Creates an image from RGBA bytes (4 bytes per pixel, not premultiplied).
    pub fn from_rgba_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self, CartographError> {
        if bytes.len() != width as usize * height as usize * 4 {
            return Err(CartographError::Image(format!(
                "{} bytes cannot be an RGBA image of size {width}x{height}",
                bytes.len()
            )));
        }

        let data = bytes
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Self::from_data(width, height, data)
    }

    /// Fills the image with the color, respecting the premultiplied flag.
    pub fn set_background(&mut self, color: Color) {
        let value = if self.premultiplied {
            color.to_premultiplied()
        } else {
            color.to_u8_array()
        };
        self.fill(value);
    }

    /// Multiplies color channels by alpha. Does nothing if the image is already premultiplied.
    pub fn premultiply(&mut self) {
        if self.premultiplied {
            return;
        }

        for pixel in &mut self.data {
            *pixel = Color::rgba(pixel[0], pixel[1], pixel[2], pixel[3]).to_premultiplied();
        }
        self.premultiplied = true;
    }

    /// Divides color channels by alpha. Does nothing if the image is not premultiplied.
    pub fn demultiply(&mut self) {
        if !self.premultiplied {
            return;
        }

        for pixel in &mut self.data {
            *pixel = Color::from_premultiplied(*pixel).to_u8_array();
        }
        self.premultiplied = false;
    }

    /// Color of the pixel (straight alpha) at the given position.
    pub fn color_at(&self, x: u32, y: u32) -> Option<Color> {
        let p = self.pixel(x, y)?;
        Some(if self.premultiplied {
            Color::from_premultiplied(p)
        } else {
            Color::rgba(p[0], p[1], p[2], p[3])
        })
    }

    /// Raw RGBA bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.iter().flatten().copied().collect()
    }

    /// Multiplies every pixel (all channels for premultiplied images, alpha only otherwise) by
    /// `opacity`.
    pub fn apply_opacity(&mut self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        let premultiplied = self.premultiplied;
        for pixel in &mut self.data {
            if premultiplied {
                for c in pixel.iter_mut() {
                    *c = (*c as f32 * opacity).round() as u8;
                }
            } else {
                pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pixel_access() {
        let mut image = ImageGray16::new(3, 2);
        image.set_pixel(2, 1, 42);
        image.set_pixel(3, 1, 1);
        assert_eq!(image.pixel(2, 1), Some(42));
        assert_eq!(image.pixel(3, 1), None);
        assert_eq!(image.row(1), &[0, 0, 42]);
        assert!(!image.painted());
    }

    #[test]
    fn view_is_clipped() {
        let data = (0..16u8).collect();
        let image = ImageGray8::from_data(4, 4, data).unwrap();
        let view = image.view(2, 2, 5, 5);
        assert_eq!((view.width(), view.height()), (2, 2));
        assert_eq!(view.data(), &[10, 11, 14, 15]);
    }

    #[test]
    fn premultiply_round_trip() {
        let mut image = ImageRgba8::filled(2, 2, Color::rgba(255, 0, 0, 128));
        image.premultiply();
        assert!(image.is_premultiplied());
        assert_eq!(image.pixel(0, 0), Some([128, 0, 0, 128]));
        assert_eq!(image.color_at(1, 1), Some(Color::rgba(255, 0, 0, 128)));

        image.demultiply();
        assert_eq!(image.pixel(0, 0), Some([255, 0, 0, 128]));
    }

    #[test]
    fn wrong_data_size() {
        assert_matches!(
            ImageGray32f::from_data(2, 2, vec![0.0; 3]),
            Err(CartographError::Image(_))
        );
    }
}
