//! Load, edit and save [Tiled](https://www.mapeditor.org/) tile maps.
//!
//! Placed tiles are stored as global tile ids (GIDs) whose meaning depends
//! on the order and size of the map's tilesets. Tileset edits made through
//! [`Map::tilesets_mut`] renumber every layer so each placed tile keeps
//! showing the same tileset tile; edits that would orphan a placed tile
//! fail and leave the map untouched.
//!
//! ```no_run
//! use tmxkit::{Map, WriteOptions};
//!
//! # fn main() -> tmxkit::Result<()> {
//! let mut map = Map::load("assets/level1.json")?;
//! map.tilesets_mut().move_item("decor", -1)?;
//! map.save("assets/level1.json", &WriteOptions::default())?;
//! # Ok(())
//! # }
//! ```

mod cache;
pub mod codec;
mod error;
mod image;
mod layer;
mod loader {
    pub mod json_loader;
    pub mod json_writer;
}
mod map;
mod named_list;
mod object;
mod properties;
mod tile;
mod tileset;
mod tileset_list;

pub use cache::{canonical_path, TilesetCache};
pub use codec::{Compression, DataFormat, Encoding};
pub use error::{MapError, Result};
pub use image::{Image, ImageRegion};
pub use layer::{
    DrawOrder, ImageLayer, Layer, LayerId, LayerKind, LayerList, MapId, ObjectLayer, SameMap,
    TileLayer,
};
pub use loader::json_loader::load_tileset;
pub use loader::json_writer::{save_tileset, WriteOptions};
pub use map::{Map, Orientation, Placement};
pub use named_list::{AnyItem, ItemPolicy, Key, Mutation, Named, NamedList, Slice};
pub use object::{MapObject, ObjectShape, SameLayer};
pub use properties::{Color, Properties, PropertyValue};
pub use tile::{MapTile, TileValue};
pub use tileset::{
    resolve, Terrain, TerrainList, TileAttributes, Tileset, TilesetKind, TilesetRef, TilesetTile,
};
pub use tileset_list::{GidLayout, TilesetList, TilesetsMut};
