use crate::cache::TilesetCache;
use crate::error::{MapError, Result};
use crate::image::Image;
use crate::layer::{Layer, LayerList, MapId, ObjectLayer, SameMap, TileLayer};
use crate::loader::{json_loader, json_writer};
use crate::named_list::Key;
use crate::object::MapObject;
use crate::properties::{Color, Properties};
use crate::tile::{MapTile, TileValue};
use crate::tileset::{TilesetRef, TilesetTile};
use crate::tileset_list::{TilesetList, TilesetsMut};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Orthogonal,
    Isometric,
    Staggered,
    Hexagonal,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Orthogonal => "orthogonal",
            Orientation::Isometric => "isometric",
            Orientation::Staggered => "staggered",
            Orientation::Hexagonal => "hexagonal",
        }
    }

    pub(crate) fn parse(s: &str) -> Result<Self> {
        match s {
            "orthogonal" => Ok(Orientation::Orthogonal),
            "isometric" => Ok(Orientation::Isometric),
            "staggered" => Ok(Orientation::Staggered),
            "hexagonal" => Ok(Orientation::Hexagonal),
            other => Err(MapError::InvalidMap(format!("unknown orientation '{other}'"))),
        }
    }
}

/// Where a new layer goes in the layer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement<'k> {
    #[default]
    End,
    Before(Key<'k>),
    After(Key<'k>),
}

/// A tile map: a grid size, tilesets and a stack of layers.
///
/// Layers belong to the map that created them. Tilesets are shared
/// handles; edits through [`Map::tilesets_mut`] keep every placed tile
/// pointing at the same tileset tile.
#[derive(Debug)]
pub struct Map {
    id: MapId,
    size: (u32, u32),
    tile_size: (u32, u32),
    pub orientation: Orientation,
    pub background_color: Option<Color>,
    pub properties: Properties,
    pub render_order: Option<String>,
    pub next_object_id: u32,
    pub next_layer_id: u32,
    pub tiled_version: Option<String>,
    pub stagger_axis: Option<String>,
    pub stagger_index: Option<String>,
    pub hex_side_length: Option<u32>,
    /// Directory relative paths in the map are resolved against.
    pub base_path: Option<PathBuf>,
    tilesets: TilesetList,
    layers: LayerList,
}

impl Map {
    /// An empty orthogonal map of `size` tiles, each `tile_size` pixels.
    pub fn new(size: (u32, u32), tile_size: (u32, u32)) -> Self {
        let id = MapId::fresh();
        Self {
            id,
            size,
            tile_size,
            orientation: Orientation::default(),
            background_color: None,
            properties: Properties::new(),
            render_order: None,
            next_object_id: 1,
            next_layer_id: 1,
            tiled_version: None,
            stagger_axis: None,
            stagger_index: None,
            hex_side_length: None,
            base_path: None,
            tilesets: TilesetList::default(),
            layers: LayerList::with_policy(SameMap { map: id, size }),
        }
    }

    /// Load a Tiled JSON map. External tilesets are shared only within this
    /// call; use [`Map::load_with_cache`] to share them between maps.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_cache(path, &mut TilesetCache::new())
    }

    pub fn load_with_cache(path: impl AsRef<Path>, cache: &mut TilesetCache) -> Result<Self> {
        json_loader::load_map(path.as_ref(), cache)
    }

    /// Parse a map document. Relative tileset sources resolve against
    /// `base_path`.
    pub fn from_json_str(json: &str, base_path: Option<&Path>, cache: &mut TilesetCache) -> Result<Self> {
        json_loader::parse_map(json, base_path, cache)
    }

    pub fn save(&self, path: impl AsRef<Path>, options: &json_writer::WriteOptions) -> Result<()> {
        json_writer::save_map(self, path.as_ref(), options)
    }

    pub fn to_json_string(&self, options: &json_writer::WriteOptions) -> Result<String> {
        json_writer::map_to_string(self, options)
    }

    pub fn id(&self) -> MapId {
        self.id
    }

    /// Size in tiles.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.0
    }

    pub fn height(&self) -> u32 {
        self.size.1
    }

    pub fn tile_size(&self) -> (u32, u32) {
        self.tile_size
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.size.0.saturating_mul(self.tile_size.0),
            self.size.1.saturating_mul(self.tile_size.1),
        )
    }

    pub fn tilesets(&self) -> &TilesetList {
        &self.tilesets
    }

    pub fn tilesets_mut(&mut self) -> TilesetsMut<'_> {
        TilesetsMut {
            tilesets: &mut self.tilesets,
            layers: &mut self.layers,
        }
    }

    pub fn layers(&self) -> &LayerList {
        &self.layers
    }

    /// The layer list. It only accepts layers created by this map.
    pub fn layers_mut(&mut self) -> &mut LayerList {
        &mut self.layers
    }

    /// Highest valid GID.
    pub fn end_gid(&self) -> u32 {
        self.tilesets.end_gid()
    }

    pub fn new_tile_layer(&self, name: impl Into<String>) -> Layer {
        Layer::new_tiles(self.id, name.into(), self.size)
    }

    pub fn new_object_layer(&self, name: impl Into<String>) -> Layer {
        Layer::new_objects(self.id, name.into())
    }

    pub fn new_image_layer(&self, name: impl Into<String>, image: Option<Image>) -> Layer {
        Layer::new_image(self.id, name.into(), image)
    }

    /// Insert a layer made by this map and return it.
    pub fn add_layer(&mut self, layer: Layer, placement: Placement<'_>) -> Result<&mut Layer> {
        let index = self.layers.transaction(|layers| {
            let index = match placement {
                Placement::End => layers.len(),
                Placement::Before(key) => layers.index_of(key)?,
                Placement::After(key) => layers.index_of(key)? + 1,
            };
            layers.insert(index, layer)?;
            Ok(index)
        })?;
        self.layers.get_mut(index)
    }

    pub fn add_tile_layer(&mut self, name: impl Into<String>, placement: Placement<'_>) -> Result<&mut Layer> {
        let layer = self.new_tile_layer(name);
        self.add_layer(layer, placement)
    }

    pub fn add_object_layer(&mut self, name: impl Into<String>, placement: Placement<'_>) -> Result<&mut Layer> {
        let layer = self.new_object_layer(name);
        self.add_layer(layer, placement)
    }

    pub fn add_image_layer(
        &mut self,
        name: impl Into<String>,
        image: Option<Image>,
        placement: Placement<'_>,
    ) -> Result<&mut Layer> {
        let layer = self.new_image_layer(name, image);
        self.add_layer(layer, placement)
    }

    fn tile_layer<'k>(&self, key: impl Into<Key<'k>>) -> Result<(usize, &TileLayer)> {
        let index = self.layers.index_of(key)?;
        let layer = self.layers.get(index)?;
        let tiles = layer
            .as_tiles()
            .ok_or_else(|| wrong_kind(layer, "tile"))?;
        Ok((index, tiles))
    }

    fn check_gid(&self, value: TileValue) -> Result<()> {
        if value.gid() > self.end_gid() {
            return Err(MapError::InvalidGid(value.gid()));
        }
        Ok(())
    }

    /// The tile at `pos` on a tile layer. Negative coordinates count from
    /// the far edge.
    pub fn tile<'k>(&self, layer: impl Into<Key<'k>>, pos: (i64, i64)) -> Result<MapTile<'_>> {
        let (index, tiles) = self.tile_layer(layer)?;
        let i = tiles.index(pos.0, pos.1)?;
        Ok(MapTile::new(self, index, tiles.cell(i), tiles.values()[i]))
    }

    /// Store a raw tile value. Its GID must be 0 or belong to one of the
    /// map's tilesets.
    pub fn set_tile<'k>(&mut self, layer: impl Into<Key<'k>>, pos: (i64, i64), value: TileValue) -> Result<()> {
        self.check_gid(value)?;
        let (index, _) = self.tile_layer(layer)?;
        let layer = self.layers.get_mut(index)?;
        match layer.as_tiles_mut() {
            Some(tiles) => tiles.set_value(pos.0, pos.1, value),
            None => Err(wrong_kind(layer, "tile")),
        }
    }

    /// Point a cell at a tileset tile, keeping the cell's flip flags. The
    /// tileset is appended to the map if it is not there yet.
    pub fn set_tileset_tile<'k>(
        &mut self,
        layer: impl Into<Key<'k>>,
        pos: (i64, i64),
        tile: &TilesetTile,
    ) -> Result<()> {
        let (index, tiles) = self.tile_layer(layer)?;
        tiles.index(pos.0, pos.1)?;
        self.ensure_tileset(tile.tileset())?;
        let old = self.tile(index, pos)?.value();
        let gid = tile.gid(self)?;
        self.set_tile(index, pos, old.with_gid(gid))
    }

    /// Clear a cell.
    pub fn clear_tile<'k>(&mut self, layer: impl Into<Key<'k>>, pos: (i64, i64)) -> Result<()> {
        self.set_tile(layer, pos, TileValue::EMPTY)
    }

    fn ensure_tileset(&mut self, tileset: &TilesetRef) -> Result<()> {
        if !self.tilesets.contains(tileset) {
            self.tilesets_mut().push(tileset.clone())?;
        }
        Ok(())
    }

    /// Add an object to an object layer, giving it an id if it has none.
    pub fn add_object<'k>(&mut self, layer: impl Into<Key<'k>>, mut object: MapObject) -> Result<&mut MapObject> {
        if let Some(value) = object.value() {
            self.check_gid(value)?;
        }
        if object.id == 0 {
            object.id = self.next_object_id;
        }
        let next = object
            .id
            .checked_add(1)
            .ok_or_else(|| MapError::InvalidArgument(format!("object id {} is out of range", object.id)))?;
        let index = self.layers.index_of(layer)?;
        self.object_layer_mut(index)?.objects_mut().push(object)?;
        self.next_object_id = self.next_object_id.max(next);
        self.object_layer_mut(index)?.objects_mut().get_mut(-1)
    }

    fn object_layer_mut<'k>(&mut self, key: impl Into<Key<'k>>) -> Result<&mut ObjectLayer> {
        let layer = self.layers.get_mut(key)?;
        if layer.as_objects().is_none() {
            return Err(wrong_kind(layer, "object"));
        }
        layer
            .as_objects_mut()
            .ok_or_else(|| MapError::InvalidArgument("not an object layer".into()))
    }

    /// Turn an object into a tile object showing `value`.
    pub fn set_object_tile<'k, 'o>(
        &mut self,
        layer: impl Into<Key<'k>>,
        object: impl Into<Key<'o>>,
        value: TileValue,
    ) -> Result<()> {
        self.check_gid(value)?;
        self.object_layer_mut(layer)?
            .objects_mut()
            .get_mut(object)?
            .set_value(value);
        Ok(())
    }

    /// Every non-empty cell of every tile layer, in layer order.
    pub fn all_tiles(&self) -> impl Iterator<Item = MapTile<'_>> + '_ {
        self.layers.iter().enumerate().flat_map(move |(index, layer)| {
            layer.as_tiles().into_iter().flat_map(move |tiles| {
                tiles
                    .values()
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_empty())
                    .map(move |(i, v)| MapTile::new(self, index, tiles.cell(i), *v))
            })
        })
    }

    pub fn all_objects(&self) -> impl Iterator<Item = &MapObject> + '_ {
        self.layers
            .iter()
            .filter_map(Layer::as_objects)
            .flat_map(|objects| objects.objects().iter())
    }

    /// The tile at `pos` on each tile layer, bottom to top.
    pub fn get_tiles(&self, pos: (i64, i64)) -> Result<Vec<MapTile<'_>>> {
        let mut out = Vec::new();
        for (index, layer) in self.layers.iter().enumerate() {
            if let Some(tiles) = layer.as_tiles() {
                let i = tiles.index(pos.0, pos.1)?;
                out.push(MapTile::new(self, index, tiles.cell(i), tiles.values()[i]));
            }
        }
        Ok(out)
    }

    /// Verify that every placed GID belongs to one of the map's tilesets.
    pub fn check_consistency(&self) -> Result<()> {
        let max_gid = self.end_gid();
        for layer in self.layers.iter() {
            if let Some(tiles) = layer.as_tiles() {
                if let Some(v) = tiles.values().iter().find(|v| v.gid() > max_gid) {
                    return Err(MapError::InvalidTileGid {
                        layer: layer.name.clone(),
                        gid: v.gid(),
                        max_gid,
                    });
                }
            }
            if let Some(objects) = layer.as_objects() {
                for obj in objects.objects().iter() {
                    match obj.value() {
                        Some(v) if v.gid() > max_gid => {
                            return Err(MapError::InvalidObjectGid {
                                layer: layer.name.clone(),
                                object_id: obj.id,
                                gid: v.gid(),
                                max_gid,
                            })
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Detach tilesets with no placed tiles; returns them.
    pub fn remove_unused_tilesets(&mut self) -> Result<Vec<TilesetRef>> {
        self.tilesets_mut().remove_unused()
    }
}

fn wrong_kind(layer: &Layer, kind: &str) -> MapError {
    MapError::InvalidArgument(format!("layer '{}' is not a {kind} layer", layer.name))
}
