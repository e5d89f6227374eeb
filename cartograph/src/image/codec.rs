use std::str::FromStr;

use ::image::codecs::jpeg::JpegEncoder;
use ::image::codecs::png::{CompressionType, FilterType, PngEncoder};
use ::image::{ColorType, ImageEncoder};

use super::ImageRgba8;
use crate::error::CartographError;

/// Output format of an encoded image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EncodeFormat {
    /// PNG with RGBA pixels.
    Png {
        /// zlib compression level `0..=9`, `None` for the default level.
        compression: Option<u8>,
    },
    /// JPEG with the given quality `1..=100`. Alpha is dropped.
    Jpeg {
        /// Quality.
        quality: u8,
    },
}

/// Parsed format string of the `format[:key[=value]]...` form, e.g. `png:z=9` or `jpeg85`.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatOptions {
    /// Output format.
    pub format: EncodeFormat,
    /// Options that were recognized but are not supported by the encoder. They are ignored.
    pub ignored: Vec<String>,
}

const DEFAULT_JPEG_QUALITY: u8 = 85;

impl FromStr for FormatOptions {
    type Err = CartographError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split(':');
        let name = tokens.next().unwrap_or_default().trim().to_ascii_lowercase();

        let mut format = if let Some(rest) = name
            .strip_prefix("jpeg")
            .or_else(|| name.strip_prefix("jpg"))
        {
            let quality = if rest.is_empty() {
                DEFAULT_JPEG_QUALITY
            } else {
                parse_quality(rest)?
            };
            EncodeFormat::Jpeg { quality }
        } else if matches!(name.as_str(), "png" | "png8" | "png24" | "png32") {
            EncodeFormat::Png { compression: None }
        } else {
            return Err(CartographError::Image(format!(
                "unsupported image format '{name}'"
            )));
        };

        let mut ignored = vec![];
        if name == "png8" {
            ignored.push("png8".to_string());
        }

        for token in tokens.filter(|t| !t.is_empty()) {
            let (key, value) = match token.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (token.trim(), None),
            };

            match (&mut format, key, value) {
                (EncodeFormat::Png { compression }, "z", Some(value)) => {
                    let level: u8 = value.parse().map_err(|_| {
                        CartographError::Image(format!("invalid compression level '{value}'"))
                    })?;
                    *compression = Some(level.min(9));
                }
                (EncodeFormat::Jpeg { quality }, "quality", Some(value)) => {
                    *quality = parse_quality(value)?;
                }
                (EncodeFormat::Png { .. }, "colors" | "t" | "m" | "e" | "g" | "s", _) => {
                    ignored.push(token.to_string());
                }
                _ => {
                    log::warn!("Unknown image format option '{token}' in '{s}' is ignored");
                    ignored.push(token.to_string());
                }
            }
        }

        if !ignored.is_empty() {
            log::debug!("Palette image options are not supported, writing true color image: {ignored:?}");
        }

        Ok(Self { format, ignored })
    }
}

fn parse_quality(value: &str) -> Result<u8, CartographError> {
    match value.parse::<u8>() {
        Ok(q) if (1..=100).contains(&q) => Ok(q),
        _ => Err(CartographError::Image(format!(
            "invalid jpeg quality '{value}'"
        ))),
    }
}

impl ImageRgba8 {
    /// Encodes the image into the format described by the format string (see [`FormatOptions`]).
    ///
    /// Premultiplied images are demultiplied before encoding.
    pub fn encode(&self, format: &str) -> Result<Vec<u8>, CartographError> {
        let options: FormatOptions = format.parse()?;
        self.encode_with(&options)
    }

    /// Encodes the image with already parsed options.
    pub fn encode_with(&self, options: &FormatOptions) -> Result<Vec<u8>, CartographError> {
        let mut straight;
        let image = if self.is_premultiplied() {
            straight = self.clone();
            straight.demultiply();
            &straight
        } else {
            self
        };

        let mut buffer = vec![];
        match options.format {
            EncodeFormat::Png { compression } => {
                let compression = match compression {
                    None => CompressionType::Default,
                    Some(0..=3) => CompressionType::Fast,
                    Some(4..=6) => CompressionType::Default,
                    Some(_) => CompressionType::Best,
                };
                let encoder =
                    PngEncoder::new_with_quality(&mut buffer, compression, FilterType::Adaptive);
                encoder.write_image(
                    &image.to_bytes(),
                    image.width(),
                    image.height(),
                    ColorType::Rgba8,
                )?;
            }
            EncodeFormat::Jpeg { quality } => {
                let rgb: Vec<u8> = image
                    .data()
                    .iter()
                    .flat_map(|p| [p[0], p[1], p[2]])
                    .collect();
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
                encoder.write_image(&rgb, image.width(), image.height(), ColorType::Rgb8)?;
            }
        }

        Ok(buffer)
    }

    /// Decodes an image from a byte slice.
    ///
    /// Attempts to guess the format of the image from the data. Non-RGBA images
    /// will be converted to RGBA.
    pub fn decode(bytes: &[u8]) -> Result<Self, CartographError> {
        let decoded = ::image::load_from_memory(bytes)?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba_bytes(width, height, &rgba.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use assert_matches::assert_matches;

    #[test]
    fn parse_format_strings() {
        let options: FormatOptions = "png:z=9".parse().unwrap();
        assert_eq!(options.format, EncodeFormat::Png { compression: Some(9) });

        let options: FormatOptions = "jpeg70".parse().unwrap();
        assert_eq!(options.format, EncodeFormat::Jpeg { quality: 70 });

        let options: FormatOptions = "png8:colors=128:t=1".parse().unwrap();
        assert_eq!(options.format, EncodeFormat::Png { compression: None });
        assert_eq!(options.ignored.len(), 3);

        assert_matches!(
            "tiff".parse::<FormatOptions>(),
            Err(CartographError::Image(_))
        );
        assert_matches!(
            "jpeg:quality=0".parse::<FormatOptions>(),
            Err(CartographError::Image(_))
        );
    }

    #[test]
    fn png_round_trip() {
        let mut image = ImageRgba8::filled(4, 3, Color::rgba(10, 20, 30, 255));
        image.set_pixel(1, 1, [200, 100, 50, 128]);

        let bytes = image.encode("png").unwrap();
        let decoded = ImageRgba8::decode(&bytes).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.height(), 3);
        assert_eq!(decoded.data(), image.data());
    }

    #[test]
    fn jpeg_is_decodable() {
        let image = ImageRgba8::filled(8, 8, Color::WHITE);
        let bytes = image.encode("jpeg").unwrap();
        let decoded = ImageRgba8::decode(&bytes).unwrap();
        assert_eq!(decoded.width(), 8);
        assert!(decoded.pixel(4, 4).unwrap()[0] > 250);
    }

    #[test]
    fn decode_garbage() {
        assert_matches!(
            ImageRgba8::decode(&[1, 2, 3]),
            Err(CartographError::Image(_))
        );
    }
}
