use std::str::FromStr;

use crate::error::CartographError;
use crate::image::ImageRgba8;
use crate::Color;

/// Maps values of a single band raster to colors.
///
/// Written as `value:color` stops separated by spaces: `0:#0000ff 100:#00ff00 500:white`.
/// Values below the first stop are transparent, values at or above the last stop take its color,
/// values in between are interpolated linearly between the neighbouring stops.
#[derive(Debug, Clone, PartialEq)]
pub struct Colorizer {
    stops: Vec<(f64, Color)>,
}

impl Colorizer {
    /// Creates a colorizer from stops. Stops are sorted by value.
    pub fn new(mut stops: Vec<(f64, Color)>) -> Self {
        stops.retain(|(value, _)| value.is_finite());
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { stops }
    }

    /// Stops in increasing value order.
    pub fn stops(&self) -> &[(f64, Color)] {
        &self.stops
    }

    /// Color of the value.
    pub fn color(&self, value: f64) -> Color {
        if value.is_nan() {
            return Color::TRANSPARENT;
        }

        let index = self.stops.partition_point(|(v, _)| *v <= value);
        if index == 0 {
            return Color::TRANSPARENT;
        }
        if index == self.stops.len() {
            return self.stops[index - 1].1;
        }

        let (v0, c0) = self.stops[index - 1];
        let (v1, c1) = self.stops[index];
        let t = (value - v0) / (v1 - v0);
        let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;

        Color::rgba(
            lerp(c0.r(), c1.r()),
            lerp(c0.g(), c1.g()),
            lerp(c0.b(), c1.b()),
            lerp(c0.a(), c1.a()),
        )
    }

    /// Colors the band. Pixels equal to `nodata` are transparent. The result is premultiplied.
    pub fn apply(
        &self,
        width: u32,
        height: u32,
        values: &[f32],
        nodata: Option<f64>,
    ) -> ImageRgba8 {
        let mut image = ImageRgba8::new(width, height);
        image.set_premultiplied(true);
        for (pixel, value) in image.data_mut().iter_mut().zip(values) {
            let value = *value as f64;
            if nodata.is_some_and(|nodata| nodata == value) {
                continue;
            }
            *pixel = self.color(value).to_premultiplied();
        }

        image
    }
}

impl FromStr for Colorizer {
    type Err = CartographError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut stops = vec![];
        for stop in s.split_whitespace() {
            let parsed = stop.split_once(':').and_then(|(value, color)| {
                Some((value.parse::<f64>().ok()?, Color::parse(color)?))
            });
            match parsed {
                Some(stop) => stops.push(stop),
                None => {
                    return Err(CartographError::Config(format!(
                        "invalid colorizer stop '{stop}'"
                    )))
                }
            }
        }

        if stops.is_empty() {
            return Err(CartographError::Config("colorizer has no stops".into()));
        }

        Ok(Self::new(stops))
    }
}
