use crate::codec::DataFormat;
use crate::error::{MapError, Result};
use crate::image::Image;
use crate::named_list::{ItemPolicy, Named, NamedList};
use crate::object::{MapObject, ObjectShape, SameLayer};
use crate::properties::{Color, Properties};
use crate::tile::TileValue;
use glam::Vec2;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Identity of a map, used to keep layers in the map that made them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(u64);

impl MapId {
    pub(crate) fn fresh() -> Self {
        Self(next_token())
    }
}

/// Identity of a layer, used to keep objects on the layer that made them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(u64);

impl LayerId {
    pub(crate) fn fresh() -> Self {
        Self(next_token())
    }
}

/// A dense grid of tile values, one per map cell, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    width: u32,
    height: u32,
    data: Vec<TileValue>,
    /// How the data is written when the map is saved.
    pub format: DataFormat,
}

impl TileLayer {
    pub(crate) fn new(size: (u32, u32)) -> Self {
        Self {
            width: size.0,
            height: size.1,
            data: vec![TileValue::EMPTY; size.0 as usize * size.1 as usize],
            format: DataFormat::default(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[TileValue] {
        &self.data
    }

    /// Raw words, as written to disk.
    pub fn raw_data(&self) -> Vec<u32> {
        self.data.iter().map(|v| v.raw()).collect()
    }

    /// Replace all values with raw words; the count must match the layer.
    pub(crate) fn set_raw_data(&mut self, raw: Vec<u32>) -> Result<()> {
        if raw.len() != self.data.len() {
            return Err(MapError::InvalidLayerData {
                expected: self.data.len(),
                actual: raw.len(),
            });
        }
        self.data = raw.into_iter().map(TileValue::new).collect();
        Ok(())
    }

    /// Position in `data` of cell `(x, y)`. Negative coordinates count from
    /// the far edge.
    pub(crate) fn index(&self, x: i64, y: i64) -> Result<usize> {
        let (w, h) = (i64::from(self.width), i64::from(self.height));
        let x = if x < 0 { x + w } else { x };
        let y = if y < 0 { y + h } else { y };
        if !(0..w).contains(&x) || !(0..h).contains(&y) {
            return Err(MapError::InvalidArgument(format!(
                "tile ({x}, {y}) is outside the {w}x{h} layer"
            )));
        }
        Ok((y * w + x) as usize)
    }

    pub(crate) fn cell(&self, index: usize) -> (u32, u32) {
        let w = self.width.max(1) as usize;
        ((index % w) as u32, (index / w) as u32)
    }

    pub fn value(&self, x: i64, y: i64) -> Result<TileValue> {
        Ok(self.data[self.index(x, y)?])
    }

    pub(crate) fn set_value(&mut self, x: i64, y: i64, value: TileValue) -> Result<()> {
        let i = self.index(x, y)?;
        self.data[i] = value;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawOrder {
    #[default]
    TopDown,
    Index,
}

impl DrawOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            DrawOrder::TopDown => "topdown",
            DrawOrder::Index => "index",
        }
    }

    pub(crate) fn parse(s: &str) -> Result<Self> {
        match s {
            "topdown" => Ok(DrawOrder::TopDown),
            "index" => Ok(DrawOrder::Index),
            other => Err(MapError::InvalidMap(format!("unknown draw order '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLayer {
    objects: NamedList<MapObject, SameLayer>,
    pub color: Option<Color>,
    pub draw_order: DrawOrder,
}

impl ObjectLayer {
    fn new(layer: LayerId) -> Self {
        Self {
            objects: NamedList::with_policy(SameLayer(layer)),
            color: None,
            draw_order: DrawOrder::default(),
        }
    }

    pub fn objects(&self) -> &NamedList<MapObject, SameLayer> {
        &self.objects
    }

    /// Direct list access. Tile objects added here skip the GID check of
    /// `Map::add_object`; `Map::check_consistency` still catches them.
    pub fn objects_mut(&mut self) -> &mut NamedList<MapObject, SameLayer> {
        &mut self.objects
    }

    /// A new object belonging to this layer, not yet added to it.
    pub fn new_object(&self, shape: ObjectShape) -> MapObject {
        MapObject::new(self.objects.policy().0, shape)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageLayer {
    pub image: Option<Image>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Tiles(TileLayer),
    Objects(ObjectLayer),
    Image(ImageLayer),
}

/// A layer of a map: common attributes plus one of the layer kinds.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    /// Layer id as stored in the document, if any.
    pub id: Option<u32>,
    pub visible: bool,
    opacity: f32,
    /// Drawing offset in pixels.
    pub offset: Vec2,
    pub properties: Properties,
    kind: LayerKind,
    map: MapId,
    token: LayerId,
}

impl Layer {
    pub(crate) fn new_tiles(map: MapId, name: String, size: (u32, u32)) -> Self {
        Self::with_kind(map, name, |_| LayerKind::Tiles(TileLayer::new(size)))
    }

    pub(crate) fn new_objects(map: MapId, name: String) -> Self {
        Self::with_kind(map, name, |token| LayerKind::Objects(ObjectLayer::new(token)))
    }

    pub(crate) fn new_image(map: MapId, name: String, image: Option<Image>) -> Self {
        Self::with_kind(map, name, |_| LayerKind::Image(ImageLayer { image }))
    }

    fn with_kind(map: MapId, name: String, kind: impl FnOnce(LayerId) -> LayerKind) -> Self {
        let token = LayerId::fresh();
        Self {
            name,
            id: None,
            visible: true,
            opacity: 1.0,
            offset: Vec2::ZERO,
            properties: Properties::new(),
            kind: kind(token),
            map,
            token,
        }
    }

    pub fn token(&self) -> LayerId {
        self.token
    }

    pub fn map_id(&self) -> MapId {
        self.map
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(MapError::InvalidArgument(format!(
                "opacity {opacity} is outside [0, 1]"
            )));
        }
        self.opacity = opacity;
        Ok(())
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// Tiled's name for the layer kind.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            LayerKind::Tiles(_) => "tilelayer",
            LayerKind::Objects(_) => "objectgroup",
            LayerKind::Image(_) => "imagelayer",
        }
    }

    pub fn as_tiles(&self) -> Option<&TileLayer> {
        match &self.kind {
            LayerKind::Tiles(t) => Some(t),
            _ => None,
        }
    }

    /// Tile values are written through the map; this gives access to the
    /// rest (such as the data format).
    pub fn as_tiles_mut(&mut self) -> Option<&mut TileLayer> {
        match &mut self.kind {
            LayerKind::Tiles(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_objects(&self) -> Option<&ObjectLayer> {
        match &self.kind {
            LayerKind::Objects(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_objects_mut(&mut self) -> Option<&mut ObjectLayer> {
        match &mut self.kind {
            LayerKind::Objects(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageLayer> {
        match &self.kind {
            LayerKind::Image(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_image_mut(&mut self) -> Option<&mut ImageLayer> {
        match &mut self.kind {
            LayerKind::Image(i) => Some(i),
            _ => None,
        }
    }

    /// Every tile value on this layer: grid cells or tile objects.
    pub fn tile_values(&self) -> Box<dyn Iterator<Item = TileValue> + '_> {
        match &self.kind {
            LayerKind::Tiles(t) => Box::new(t.data.iter().copied()),
            LayerKind::Objects(o) => Box::new(o.objects.iter().filter_map(MapObject::value)),
            LayerKind::Image(_) => Box::new(std::iter::empty()),
        }
    }

    pub(crate) fn tile_values_mut(&mut self) -> Box<dyn Iterator<Item = &mut TileValue> + '_> {
        match &mut self.kind {
            LayerKind::Tiles(t) => Box::new(t.data.iter_mut()),
            LayerKind::Objects(o) => Box::new(o.objects.iter_mut().filter_map(MapObject::value_mut)),
            LayerKind::Image(_) => Box::new(std::iter::empty()),
        }
    }
}

impl PartialEq for Layer {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

impl Named for Layer {
    fn has_name(&self, name: &str) -> bool {
        self.name == name
    }
}

/// Layer list policy: only layers made by this map, with its dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SameMap {
    pub(crate) map: MapId,
    pub(crate) size: (u32, u32),
}

impl ItemPolicy<Layer> for SameMap {
    fn on_store(&self, layer: Layer) -> Result<Layer> {
        if layer.map != self.map {
            return Err(MapError::IncompatibleItem(format!(
                "layer '{}' belongs to another map",
                layer.name
            )));
        }
        if let LayerKind::Tiles(tiles) = &layer.kind {
            if tiles.size() != self.size {
                return Err(MapError::IncompatibleItem(format!(
                    "layer '{}' is {:?} tiles, map is {:?}",
                    layer.name,
                    tiles.size(),
                    self.size
                )));
            }
        }
        Ok(layer)
    }
}

pub type LayerList = NamedList<Layer, SameMap>;

impl NamedList<Layer, SameMap> {
    /// Every tile value in every layer, in layer order.
    pub fn tile_values(&self) -> impl Iterator<Item = TileValue> + '_ {
        self.iter().flat_map(Layer::tile_values)
    }

    pub(crate) fn tile_values_mut(&mut self) -> impl Iterator<Item = &mut TileValue> + '_ {
        self.iter_mut().flat_map(Layer::tile_values_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coordinates_wrap() {
        let mut t = TileLayer::new((3, 2));
        t.set_value(-1, -1, TileValue::new(7)).unwrap();
        assert_eq!(t.value(2, 1).unwrap().gid(), 7);
        assert_eq!(t.raw_data(), [0, 0, 0, 0, 0, 7]);
        assert!(t.value(3, 0).is_err());
        assert!(t.value(0, -3).is_err());
        assert_eq!(t.cell(4), (1, 1));
    }

    #[test]
    fn raw_data_length_is_checked() {
        let mut t = TileLayer::new((2, 2));
        assert!(matches!(
            t.set_raw_data(vec![1, 2, 3]),
            Err(MapError::InvalidLayerData {
                expected: 4,
                actual: 3
            })
        ));
        t.set_raw_data(vec![1, 0, 0, 0x8000_0002]).unwrap();
        assert!(t.values()[3].flipped_horizontally());
    }

    #[test]
    fn list_rejects_foreign_and_misshapen_layers() {
        let map = MapId::fresh();
        let mut layers = LayerList::with_policy(SameMap { map, size: (4, 4) });
        layers.push(Layer::new_tiles(map, "ground".into(), (4, 4))).unwrap();
        layers.push(Layer::new_objects(map, "things".into())).unwrap();

        let other = Layer::new_tiles(MapId::fresh(), "foreign".into(), (4, 4));
        assert!(matches!(layers.push(other), Err(MapError::IncompatibleItem(_))));
        let small = Layer::new_tiles(map, "small".into(), (2, 2));
        assert!(matches!(layers.push(small), Err(MapError::IncompatibleItem(_))));
        assert_eq!(layers.len(), 2);
        assert_eq!(layers.get("things").unwrap().type_name(), "objectgroup");
    }

    #[test]
    fn opacity_range() {
        let mut layer = Layer::new_image(MapId::fresh(), "bg".into(), None);
        assert!(layer.set_opacity(0.5).is_ok());
        assert!(layer.set_opacity(1.5).is_err());
        assert_eq!(layer.opacity(), 0.5);
    }

    #[test]
    fn tile_values_cover_tile_objects() {
        let map = MapId::fresh();
        let mut layers = LayerList::with_policy(SameMap { map, size: (1, 1) });
        let mut ground = Layer::new_tiles(map, "ground".into(), (1, 1));
        ground.as_tiles_mut().unwrap().set_raw_data(vec![3]).unwrap();
        let mut things = Layer::new_objects(map, "things".into());
        let objects = things.as_objects_mut().unwrap();
        let obj = objects.new_object(ObjectShape::Tile { value: TileValue::new(5) });
        objects.objects_mut().push(obj).unwrap();
        layers.extend([ground, things]).unwrap();

        let gids: Vec<u32> = layers.tile_values().map(TileValue::gid).collect();
        assert_eq!(gids, [3, 5]);
        for v in layers.tile_values_mut() {
            v.set_gid(v.gid() + 1);
        }
        let gids: Vec<u32> = layers.tile_values().map(TileValue::gid).collect();
        assert_eq!(gids, [4, 6]);
    }
}
