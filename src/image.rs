use crate::properties::Color;

/// Handle to an image file used by a tileset, tile or image layer.
///
/// Pixels are never decoded here; only the size is needed, to lay out the
/// tiles of a grid tileset.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Path as written in the document, relative to it
    pub source: String,
    pub size: (u32, u32),
    /// Color key used as transparent
    pub trans: Option<Color>,
}

impl Image {
    pub fn new(source: impl Into<String>, size: (u32, u32)) -> Self {
        Self {
            source: source.into(),
            size,
            trans: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.size.0
    }

    pub fn height(&self) -> u32 {
        self.size.1
    }
}

/// A rectangle within an image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRegion {
    pub image: Image,
    pub pos: (u32, u32),
    pub size: (u32, u32),
}

impl ImageRegion {
    /// The whole image.
    pub fn full(image: Image) -> Self {
        let size = image.size;
        Self {
            image,
            pos: (0, 0),
            size,
        }
    }
}
