//! Decoded external resources referenced by marks and external graphics.

use std::fmt;
use std::sync::Arc;

use image::GenericImageView;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Invalid SVG: {0}")]
    Svg(String),

    #[error("Font data could not be read")]
    Font,

    #[error("Invalid image: {0}")]
    Image(#[from] image::ImageError),
}

/// An SVG document, validated and measured at parse time.
///
/// The source text is kept so a renderer can rasterize it at the requested size.
#[derive(Debug, Clone, PartialEq)]
pub struct SvgResource {
    pub source: String,
    pub svg: String,
    pub width: f32,
    pub height: f32,
}

impl SvgResource {
    pub fn parse(source: impl Into<String>, text: &str) -> Result<Self, ResourceError> {
        let tree = usvg::Tree::from_str(text, &usvg::Options::default())
            .map_err(|e| ResourceError::Svg(e.to_string()))?;
        let size = tree.size();
        Ok(Self {
            source: source.into(),
            svg: text.to_string(),
            width: size.width(),
            height: size.height(),
        })
    }
}

/// A TrueType font used for glyph marks.
#[derive(Debug, Clone, PartialEq)]
pub struct FontResource {
    pub source: String,
    pub data: Arc<Vec<u8>>,
    pub glyph_count: usize,
}

impl FontResource {
    pub fn parse(source: impl Into<String>, data: Vec<u8>) -> Result<Self, ResourceError> {
        let font = rusttype::Font::try_from_vec(data.clone()).ok_or(ResourceError::Font)?;
        let glyph_count = font.glyph_count();
        Ok(Self {
            source: source.into(),
            data: Arc::new(data),
            glyph_count,
        })
    }
}

/// A decoded raster image.
#[derive(Clone)]
pub struct ImageResource {
    pub source: String,
    pub image: image::DynamicImage,
}

impl ImageResource {
    pub fn parse(source: impl Into<String>, data: &[u8]) -> Result<Self, ResourceError> {
        Ok(Self {
            source: source.into(),
            image: image::load_from_memory(data)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl fmt::Debug for ImageResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResource")
            .field("source", &self.source)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl PartialEq for ImageResource {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.width() == other.width()
            && self.height() == other.height()
            && self.image.as_bytes() == other.image.as_bytes()
    }
}
