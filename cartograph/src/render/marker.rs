//! Marker images and built-in marker shapes.

use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, OnceLock};

use cartograph_types::Box2d;
use lyon::math::point;
use lyon::path::Path;
use quick_cache::sync::Cache;

use crate::error::CartographError;
use crate::image::ImageRgba8;

/// Prefix of the built-in marker names.
pub const SHAPE_PREFIX: &str = "shape://";

/// Built-in vector marker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    /// `shape://ellipse`
    Ellipse,
    /// `shape://square`
    Square,
    /// `shape://arrow`, pointing along the X axis.
    Arrow,
}

impl Shape {
    /// Finds a shape by its `shape://` uri.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri.strip_prefix(SHAPE_PREFIX)? {
            "ellipse" => Some(Shape::Ellipse),
            "square" => Some(Shape::Square),
            "arrow" => Some(Shape::Arrow),
            _ => None,
        }
    }

    /// Outline of the shape in the unit box centered at the origin: `(-0.5, -0.5)..(0.5, 0.5)`.
    pub fn path(&self) -> Path {
        let mut builder = Path::builder();
        match self {
            Shape::Ellipse => {
                const SEGMENTS: usize = 32;
                for i in 0..SEGMENTS {
                    let angle = i as f32 / SEGMENTS as f32 * std::f32::consts::TAU;
                    let p = point(0.5 * angle.cos(), 0.5 * angle.sin());
                    if i == 0 {
                        builder.begin(p);
                    } else {
                        builder.line_to(p);
                    }
                }
                builder.end(true);
            }
            Shape::Square => {
                builder.begin(point(-0.5, -0.5));
                builder.line_to(point(0.5, -0.5));
                builder.line_to(point(0.5, 0.5));
                builder.line_to(point(-0.5, 0.5));
                builder.end(true);
            }
            Shape::Arrow => {
                builder.begin(point(-0.5, -0.2));
                builder.line_to(point(0.1, -0.2));
                builder.line_to(point(0.1, -0.5));
                builder.line_to(point(0.5, 0.0));
                builder.line_to(point(0.1, 0.5));
                builder.line_to(point(0.1, 0.2));
                builder.line_to(point(-0.5, 0.2));
                builder.end(true);
            }
        }

        builder.build()
    }
}

/// Marker symbol: a vector shape or a premultiplied image.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    /// Built-in shape, scaled to the marker width and height when drawn.
    Shape(Shape),
    /// Image drawn in its own size unless the symbolizer sets the size.
    Image(ImageRgba8),
}

impl Marker {
    /// Size of the image, `None` for shapes.
    pub fn image_size(&self) -> Option<(f64, f64)> {
        match self {
            Marker::Shape(_) => None,
            Marker::Image(image) => Some((image.width() as f64, image.height() as f64)),
        }
    }
}

/// Box of the given size centered at the origin.
pub fn centered_box(width: f64, height: f64) -> Box2d {
    Box2d::new(-width / 2.0, -height / 2.0, width / 2.0, height / 2.0)
}

/// Cache of marker images by their path.
///
/// Built-in `shape://` markers never touch the file system. Relative file paths are resolved
/// against the base path of the cache. Images can also be registered under any name with
/// [`MarkerCache::insert_image`].
pub struct MarkerCache {
    cache: Cache<String, Arc<Marker>>,
    base_path: Option<PathBuf>,
}

impl MarkerCache {
    /// Creates an empty cache holding up to `capacity` images.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Cache::new(capacity),
            base_path: None,
        }
    }

    /// Shared default cache.
    pub fn global() -> Arc<MarkerCache> {
        static INSTANCE: OnceLock<Arc<MarkerCache>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| {
                log::debug!("Initializing global marker cache");
                Arc::new(MarkerCache::default())
            })
            .clone()
    }

    /// Sets the directory relative marker paths are resolved against.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Registers an image under the given name. The image is premultiplied if it is not.
    pub fn insert_image(&self, name: impl Into<String>, mut image: ImageRgba8) {
        image.premultiply();
        self.cache.insert(name.into(), Arc::new(Marker::Image(image)));
    }

    /// Returns the marker, loading it from the file system if it is not cached yet.
    ///
    /// A missing or unreadable file is a configuration error.
    pub fn get(&self, uri: &str) -> Result<Arc<Marker>, CartographError> {
        if let Some(marker) = self.cache.get(uri) {
            return Ok(marker);
        }

        if uri.starts_with(SHAPE_PREFIX) {
            let shape = Shape::from_uri(uri)
                .ok_or_else(|| CartographError::Config(format!("unknown marker shape '{uri}'")))?;
            let marker = Arc::new(Marker::Shape(shape));
            self.cache.insert(uri.to_string(), marker.clone());
            return Ok(marker);
        }

        let marker = Arc::new(Marker::Image(self.load(uri)?));
        self.cache.insert(uri.to_string(), marker.clone());
        Ok(marker)
    }

    fn resolve(&self, uri: &str) -> PathBuf {
        let path = FsPath::new(uri);
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    #[cfg(feature = "image")]
    fn load(&self, uri: &str) -> Result<ImageRgba8, CartographError> {
        if uri.to_ascii_lowercase().ends_with(".svg") {
            return Err(CartographError::Config(format!(
                "svg marker files are not supported: '{uri}'"
            )));
        }

        let path = self.resolve(uri);
        let bytes = std::fs::read(&path).map_err(|err| {
            CartographError::Config(format!("marker file '{}' cannot be read: {err}", path.display()))
        })?;

        log::debug!("Loaded marker image {}", path.display());
        let mut image = ImageRgba8::decode(&bytes)?;
        image.premultiply();
        Ok(image)
    }

    #[cfg(not(feature = "image"))]
    fn load(&self, uri: &str) -> Result<ImageRgba8, CartographError> {
        let path = self.resolve(uri);
        Err(CartographError::Config(format!(
            "marker file '{}' cannot be loaded: image support is disabled",
            path.display()
        )))
    }
}

impl Default for MarkerCache {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for MarkerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerCache")
            .field("len", &self.cache.len())
            .field("base_path", &self.base_path)
            .finish()
    }
}
