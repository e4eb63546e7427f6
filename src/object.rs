use crate::error::{MapError, Result};
use crate::layer::{next_token, LayerId};
use crate::named_list::{ItemPolicy, Named};
use crate::properties::Properties;
use crate::tile::{value_pixel_size, TileValue};
use crate::tileset_list::TilesetList;
use glam::Vec2;

/// Geometry of a map object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectShape {
    Rectangle { size: Vec2 },
    Ellipse { size: Vec2 },
    Point,
    /// Closed outline, points relative to the object position.
    Polygon { points: Vec<Vec2> },
    /// Open outline, points relative to the object position.
    Polyline { points: Vec<Vec2> },
    /// A tileset tile; its size is the tile's size.
    Tile { value: TileValue },
}

impl ObjectShape {
    pub fn type_name(&self) -> &'static str {
        match self {
            ObjectShape::Rectangle { .. } => "rectangle",
            ObjectShape::Ellipse { .. } => "ellipse",
            ObjectShape::Point => "point",
            ObjectShape::Polygon { .. } => "polygon",
            ObjectShape::Polyline { .. } => "polyline",
            ObjectShape::Tile { .. } => "tile",
        }
    }
}

/// An object placed on an object layer.
///
/// Objects compare by identity: a clone is the same object, two objects
/// built with equal fields are not.
#[derive(Debug, Clone)]
pub struct MapObject {
    /// Unique within the map; 0 until the object is added to one.
    pub id: u32,
    pub name: String,
    /// User-defined class (Tiled's `type`).
    pub class: String,
    /// Position in pixels. For tile objects this is the bottom-left corner.
    pub pixel_pos: Vec2,
    /// Clockwise rotation in degrees.
    pub rotation: f32,
    pub visible: bool,
    pub properties: Properties,
    shape: ObjectShape,
    layer: LayerId,
    token: u64,
}

impl MapObject {
    /// A new object for the layer with token `layer`. Tile shapes are
    /// validated when the object is added to a map.
    pub fn new(layer: LayerId, shape: ObjectShape) -> Self {
        Self {
            id: 0,
            name: String::new(),
            class: String::new(),
            pixel_pos: Vec2::ZERO,
            rotation: 0.0,
            visible: true,
            properties: Properties::new(),
            shape,
            layer,
            token: next_token(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn at(mut self, pixel_pos: Vec2) -> Self {
        self.pixel_pos = pixel_pos;
        self
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn shape(&self) -> &ObjectShape {
        &self.shape
    }

    /// Replace the geometry. Tile objects are changed through
    /// `Map::set_object_tile`, which checks the GID.
    pub fn set_shape(&mut self, shape: ObjectShape) -> Result<()> {
        if matches!(shape, ObjectShape::Tile { .. }) || self.value().is_some() {
            return Err(MapError::InvalidArgument(
                "tile objects can only be changed through the map".into(),
            ));
        }
        self.shape = shape;
        Ok(())
    }

    pub fn objtype(&self) -> &'static str {
        self.shape.type_name()
    }

    pub fn value(&self) -> Option<TileValue> {
        match self.shape {
            ObjectShape::Tile { value } => Some(value),
            _ => None,
        }
    }

    pub(crate) fn value_mut(&mut self) -> Option<&mut TileValue> {
        match &mut self.shape {
            ObjectShape::Tile { value } => Some(value),
            _ => None,
        }
    }

    pub(crate) fn set_value(&mut self, value: TileValue) {
        self.shape = ObjectShape::Tile { value };
    }

    /// Size in pixels. Points and outlines have no size.
    pub fn pixel_size(&self, tilesets: &TilesetList) -> Result<Vec2> {
        Ok(match &self.shape {
            ObjectShape::Rectangle { size } | ObjectShape::Ellipse { size } => *size,
            ObjectShape::Tile { value } => {
                let (w, h) = value_pixel_size(*value, tilesets.as_slice())?;
                Vec2::new(w as f32, h as f32)
            }
            _ => Vec2::ZERO,
        })
    }

    /// Resize a rectangle or ellipse. Other shapes only accept their
    /// current size.
    pub fn set_pixel_size(&mut self, size: Vec2, tilesets: &TilesetList) -> Result<()> {
        if let ObjectShape::Rectangle { size: s } | ObjectShape::Ellipse { size: s } = &mut self.shape {
            *s = size;
            return Ok(());
        }
        let current = self.pixel_size(tilesets)?;
        if current == size {
            Ok(())
        } else {
            Err(MapError::InvalidArgument(format!(
                "cannot resize {} object to {size}, its size is {current}",
                self.objtype()
            )))
        }
    }

    /// Position in tiles.
    pub fn pos(&self, tile_size: (u32, u32)) -> Vec2 {
        self.pixel_pos / Vec2::new(tile_size.0 as f32, tile_size.1 as f32)
    }

    pub fn set_pos(&mut self, pos: Vec2, tile_size: (u32, u32)) {
        self.pixel_pos = pos * Vec2::new(tile_size.0 as f32, tile_size.1 as f32);
    }
}

impl PartialEq for MapObject {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Named for MapObject {
    fn has_name(&self, name: &str) -> bool {
        self.name == name
    }
}

/// Object list policy: objects stay on the layer they were made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SameLayer(pub LayerId);

impl ItemPolicy<MapObject> for SameLayer {
    fn on_store(&self, object: MapObject) -> Result<MapObject> {
        if object.layer == self.0 {
            Ok(object)
        } else {
            Err(MapError::IncompatibleItem(format!(
                "object '{}' belongs to another layer",
                object.name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::map::Map;
    use crate::named_list::NamedList;
    use crate::tileset::Tileset;

    fn map() -> Map {
        let mut map = Map::new((2, 2), (16, 16));
        map.tilesets_mut()
            .push(Tileset::image_grid("t", (16, 24), Image::new("t.png", (32, 24))))
            .unwrap();
        map
    }

    #[test]
    fn tile_objects_take_their_size_from_the_tile() {
        let map = map();
        let tilesets = map.tilesets();
        let token = LayerId::fresh();
        let mut plain = MapObject::new(token, ObjectShape::Tile { value: TileValue::new(2) });
        assert_eq!(plain.pixel_size(tilesets).unwrap(), Vec2::new(16.0, 24.0));
        assert!(plain.set_pixel_size(Vec2::new(16.0, 24.0), tilesets).is_ok());
        assert!(matches!(
            plain.set_pixel_size(Vec2::new(32.0, 24.0), tilesets),
            Err(MapError::InvalidArgument(_))
        ));

        let mut flipped = TileValue::new(2);
        flipped.set_flipped_diagonally(true);
        plain.set_value(flipped);
        assert_eq!(plain.pixel_size(tilesets).unwrap(), Vec2::new(24.0, 16.0));
    }

    #[test]
    fn shapes_and_sizes() {
        let tilesets = &TilesetList::default();
        let token = LayerId::fresh();
        let mut rect = MapObject::new(token, ObjectShape::Rectangle { size: Vec2::new(4.0, 2.0) });
        rect.set_pixel_size(Vec2::new(8.0, 8.0), tilesets).unwrap();
        assert_eq!(rect.pixel_size(tilesets).unwrap(), Vec2::new(8.0, 8.0));
        assert_eq!(rect.objtype(), "rectangle");

        let mut line = MapObject::new(
            token,
            ObjectShape::Polyline {
                points: vec![Vec2::ZERO, Vec2::new(3.0, 4.0)],
            },
        );
        assert_eq!(line.pixel_size(tilesets).unwrap(), Vec2::ZERO);
        assert!(line.set_pixel_size(Vec2::ONE, tilesets).is_err());
        assert!(line.set_shape(ObjectShape::Point).is_ok());
        assert!(line
            .set_shape(ObjectShape::Tile { value: TileValue::new(1) })
            .is_err());

        rect.set_pos(Vec2::new(1.5, 2.0), (16, 16));
        assert_eq!(rect.pixel_pos, Vec2::new(24.0, 32.0));
        assert_eq!(rect.pos((16, 16)), Vec2::new(1.5, 2.0));
    }

    #[test]
    fn objects_stay_on_their_layer() {
        let home = LayerId::fresh();
        let mut objects = NamedList::with_policy(SameLayer(home));
        objects.push(MapObject::new(home, ObjectShape::Point)).unwrap();
        let stray = MapObject::new(LayerId::fresh(), ObjectShape::Point).with_name("stray");
        assert!(matches!(
            objects.push(stray),
            Err(MapError::IncompatibleItem(_))
        ));
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn membership_is_by_identity() {
        let home = LayerId::fresh();
        let mut objects = NamedList::with_policy(SameLayer(home));
        let stored = MapObject::new(home, ObjectShape::Point).with_name("spawn");
        let twin = MapObject::new(home, ObjectShape::Point).with_name("spawn");
        objects.push(stored.clone()).unwrap();

        assert!(objects.contains(&stored));
        assert!(!objects.contains(&twin));
    }
}
