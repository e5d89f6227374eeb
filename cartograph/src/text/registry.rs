use std::path::Path;
use std::sync::{Arc, OnceLock};

use ahash::{HashMap, HashMapExt};
use bytes::Bytes;
use cartograph_types::Vector2d;
use fontdb::{Database, FaceInfo, Style, ID};
use parking_lot::RwLock;
use rustybuzz::ttf_parser::{self, GlyphId};
use rustybuzz::UnicodeBuffer;

use super::outline::GlyphPathBuilder;
use super::{FaceId, FontError, FontSelector, ShapedGlyph, ShapedText, TextShaper};

static INSTANCE: OnceLock<Arc<FontRegistry>> = OnceLock::new();

struct LoadedFace {
    name: String,
    data: Arc<Vec<u8>>,
    index: u32,
}

/// Font faces and fontsets available for rendering.
///
/// All methods take `&self`, the registry is shared between renderers. Loading fonts takes a write
/// lock, so fonts should be loaded before rendering starts.
pub struct FontRegistry {
    db: RwLock<Database>,
    fontsets: RwLock<HashMap<String, Vec<String>>>,
    loaded: RwLock<Vec<LoadedFace>>,
    loaded_ids: RwLock<HashMap<ID, FaceId>>,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            db: RwLock::new(Database::new()),
            fontsets: RwLock::new(HashMap::new()),
            loaded: RwLock::new(vec![]),
            loaded_ids: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide registry. It is created empty on the first call.
    pub fn global() -> Arc<FontRegistry> {
        INSTANCE
            .get_or_init(|| {
                log::debug!("Initializing global font registry");
                Arc::new(Self::new())
            })
            .clone()
    }

    /// Loads all faces from the font file data. Returns the number of loaded faces.
    pub fn load_font_data(&self, data: Bytes) -> usize {
        let mut db = self.db.write();
        let before = db.len();
        db.load_font_data(data.to_vec());
        let loaded = db.len() - before;
        log::debug!("Loaded {loaded} font faces from binary data");

        loaded
    }

    /// Loads all font files from the folder and its subfolders. Returns the number of loaded faces.
    pub fn load_fonts_folder(&self, path: impl AsRef<Path>) -> Result<usize, FontError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(FontError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            )));
        }

        let mut db = self.db.write();
        let before = db.len();
        db.load_fonts_dir(path);
        let loaded = db.len() - before;
        log::debug!("Loaded {loaded} font faces from {}", path.display());

        Ok(loaded)
    }

    /// Loads fonts installed in the system.
    pub fn load_system_fonts(&self) {
        self.db.write().load_system_fonts();
    }

    /// Registers a fontset. A fontset with the same name is replaced.
    pub fn add_fontset(&self, name: impl Into<String>, faces: Vec<String>) {
        self.fontsets.write().insert(name.into(), faces);
    }

    /// Full names of all available faces.
    pub fn face_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.db.read().faces().map(full_name).collect();
        names.sort();
        names.dedup();
        names
    }

    fn find_face(&self, name: &str) -> Option<FaceId> {
        let id = self.db.read().faces().find(|info| face_matches(info, name))?.id;
        if let Some(face_id) = self.loaded_ids.read().get(&id) {
            return Some(*face_id);
        }

        let db = self.db.read();
        let info = db.face(id)?;
        let face_name = full_name(info);
        let (data, index) = db.with_face_data(id, |data, index| (Arc::new(data.to_vec()), index))?;

        let mut loaded = self.loaded.write();
        let face_id = FaceId(loaded.len());
        loaded.push(LoadedFace {
            name: face_name,
            data,
            index,
        });
        self.loaded_ids.write().insert(id, face_id);

        Some(face_id)
    }

    fn candidates(&self, font: &FontSelector) -> Result<Vec<FaceId>, FontError> {
        match font {
            FontSelector::Face(name) => self
                .find_face(name)
                .map(|id| vec![id])
                .ok_or_else(|| FontError::FaceNotFound(name.clone())),
            FontSelector::Fontset(name) => {
                let Some(faces) = self.fontsets.read().get(name).cloned() else {
                    return Err(FontError::FontsetNotFound(name.clone()));
                };

                let found: Vec<FaceId> = faces
                    .iter()
                    .filter_map(|face| {
                        let id = self.find_face(face);
                        if id.is_none() {
                            log::warn!("Face '{face}' of fontset '{name}' is not found");
                        }
                        id
                    })
                    .collect();

                if found.is_empty() {
                    Err(FontError::FaceNotFound(faces.join(", ")))
                } else {
                    Ok(found)
                }
            }
        }
    }

    /// Selects the face that has glyphs for the most characters of the text.
    fn best_match(&self, text: &str, candidates: &[FaceId]) -> Result<FaceId, FontError> {
        let loaded = self.loaded.read();
        let text_len = text.chars().count();
        let mut best: Option<(FaceId, usize)> = None;
        for &id in candidates {
            let face = &loaded[id.0];
            let parsed = ttf_parser::Face::parse(&face.data, face.index)?;
            let covered = text
                .chars()
                .filter(|c| c.is_whitespace() || parsed.glyph_index(*c).is_some())
                .count();

            if best.map_or(true, |(_, count)| count < covered) {
                best = Some((id, covered));
                if covered == text_len {
                    break;
                }
            }
        }

        best.map(|(id, _)| id).ok_or(FontError::NoFace)
    }
}

impl TextShaper for FontRegistry {
    fn shape(
        &self,
        text: &str,
        font: &FontSelector,
        size: f64,
    ) -> Result<ShapedText, FontError> {
        let candidates = self.candidates(font)?;
        let face_id = self.best_match(text, &candidates)?;

        let loaded = self.loaded.read();
        let loaded_face = &loaded[face_id.0];
        let face = ttf_parser::Face::parse(&loaded_face.data, loaded_face.index)?;
        let face = rustybuzz::Face::from_face(face);

        let scale = size / face.units_per_em() as f64;
        let ascender = face.ascender() as f64 * scale;
        let descender = face.descender() as f64 * scale;

        if text.is_empty() {
            return Ok(ShapedText {
                glyphs: vec![],
                ascender,
                descender,
            });
        }

        log::trace!("Shaping '{text}' with face '{}'", loaded_face.name);

        let mut buffer = UnicodeBuffer::new();
        buffer.push_str(text);
        buffer.guess_segment_properties();
        let glyph_buffer = rustybuzz::shape(&face, &[], buffer);

        let glyphs = glyph_buffer
            .glyph_infos()
            .iter()
            .zip(glyph_buffer.glyph_positions())
            .map(|(info, position)| ShapedGlyph {
                face: face_id,
                glyph_id: info.glyph_id as u16,
                character: text
                    .get(info.cluster as usize..)
                    .and_then(|s| s.chars().next())
                    .unwrap_or(' '),
                advance: position.x_advance as f64 * scale,
                offset: Vector2d::new(
                    position.x_offset as f64 * scale,
                    -(position.y_offset as f64) * scale,
                ),
            })
            .collect();

        Ok(ShapedText {
            glyphs,
            ascender,
            descender,
        })
    }

    fn glyph_path(&self, face: FaceId, glyph_id: u16, size: f64) -> Option<lyon::path::Path> {
        let loaded = self.loaded.read();
        let loaded_face = loaded.get(face.0)?;
        let parsed = ttf_parser::Face::parse(&loaded_face.data, loaded_face.index).ok()?;
        let scale = size / parsed.units_per_em() as f64;

        let mut builder = GlyphPathBuilder::new(scale as f32);
        parsed.outline_glyph(GlyphId(glyph_id), &mut builder)?;
        Some(builder.build())
    }
}

fn sub_family(info: &FaceInfo) -> &'static str {
    let bold = info.weight.0 >= 600;
    match (bold, info.style) {
        (false, Style::Normal) => "Book",
        (false, Style::Italic) => "Italic",
        (false, Style::Oblique) => "Oblique",
        (true, Style::Normal) => "Bold",
        (true, Style::Italic) => "Bold Italic",
        (true, Style::Oblique) => "Bold Oblique",
    }
}

fn family(info: &FaceInfo) -> &str {
    info.families.first().map(|(name, _)| name.as_str()).unwrap_or("")
}

fn full_name(info: &FaceInfo) -> String {
    format!("{} {}", family(info), sub_family(info))
}

fn face_matches(info: &FaceInfo, name: &str) -> bool {
    if info.post_script_name == name || full_name(info) == name {
        return true;
    }

    sub_family(info) == "Book"
        && info
            .families
            .iter()
            .any(|(family, _)| family == name || format!("{family} Regular") == name)
}
