//! Tilesets, their tiles, and GID arithmetic.
//!
//! A tileset has no GIDs of its own. Its first GID depends on where it
//! sits in a particular map's tileset list, and the same tileset can sit
//! in several maps at once (see [`TilesetRef`]).

use crate::error::{MapError, Result};
use crate::image::{Image, ImageRegion};
use crate::map::Map;
use crate::named_list::{Named, NamedList};
use crate::properties::Properties;
use crate::tile::{TileValue, GID_MASK};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::rc::Rc;

/// A terrain type, optionally represented by one of the tileset's tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct Terrain {
    pub name: String,
    pub tile: Option<u32>,
}

impl Terrain {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tile: None,
        }
    }
}

impl Named for Terrain {
    fn has_name(&self, name: &str) -> bool {
        self.name == name
    }
}

pub type TerrainList = NamedList<Terrain>;

/// Extra data attached to one tile of a tileset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileAttributes {
    pub properties: Properties,
    /// Weight used by editors when picking random tiles; 1.0 when unset.
    pub probability: Option<f64>,
    /// Terrain index per corner (top-left, top-right, bottom-left,
    /// bottom-right); -1 for none.
    pub terrain_indices: Vec<i32>,
}

/// How a tileset's tiles get their images.
#[derive(Debug, Clone, PartialEq)]
pub enum TilesetKind {
    /// One image cut into a regular grid.
    ImageGrid {
        image: Image,
        margin: u32,
        spacing: u32,
    },
    /// One image per tile. `None` slots are tiles without an image.
    Individual {
        images: Vec<Option<Image>>,
        columns: Option<u32>,
    },
}

const DEFAULT_INDIVIDUAL_COLUMNS: u32 = 5;

/// Tiles that fit along one axis of a grid image.
fn grid_cells(image: u32, tile: u32, margin: u32, spacing: u32) -> u32 {
    let usable = i64::from(image) - 2 * i64::from(margin) + i64::from(spacing);
    let step = i64::from(tile) + i64::from(spacing);
    if step == 0 || usable <= 0 {
        return 0;
    }
    u32::try_from(usable / step).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone)]
pub struct Tileset {
    pub name: String,
    pub tile_size: (u32, u32),
    pub kind: TilesetKind,
    pub properties: Properties,
    /// Canonical path of the file this tileset was loaded from. Tilesets
    /// with a source are written as external references.
    pub source: Option<PathBuf>,
    /// Drawing offset applied to every tile, in pixels.
    pub tile_offset: (i32, i32),
    pub terrains: TerrainList,
    pub tile_attributes: BTreeMap<u32, TileAttributes>,
}

impl Tileset {
    pub fn new(name: impl Into<String>, tile_size: (u32, u32), kind: TilesetKind) -> Self {
        Self {
            name: name.into(),
            tile_size,
            kind,
            properties: Properties::new(),
            source: None,
            tile_offset: (0, 0),
            terrains: TerrainList::default(),
            tile_attributes: BTreeMap::new(),
        }
    }

    /// A grid tileset over `image`, without margin or spacing.
    pub fn image_grid(name: impl Into<String>, tile_size: (u32, u32), image: Image) -> Self {
        Self::new(
            name,
            tile_size,
            TilesetKind::ImageGrid {
                image,
                margin: 0,
                spacing: 0,
            },
        )
    }

    /// An image-collection tileset with `count` tiles and no images yet.
    pub fn individual(name: impl Into<String>, tile_size: (u32, u32), count: usize) -> Self {
        Self::new(
            name,
            tile_size,
            TilesetKind::Individual {
                images: vec![None; count],
                columns: None,
            },
        )
    }

    pub fn column_count(&self) -> u32 {
        match &self.kind {
            TilesetKind::ImageGrid {
                image,
                margin,
                spacing,
            } => grid_cells(image.width(), self.tile_size.0, *margin, *spacing),
            TilesetKind::Individual { columns, .. } => {
                columns.unwrap_or(DEFAULT_INDIVIDUAL_COLUMNS)
            }
        }
    }

    pub fn row_count(&self) -> u32 {
        match &self.kind {
            TilesetKind::ImageGrid {
                image,
                margin,
                spacing,
            } => grid_cells(image.height(), self.tile_size.1, *margin, *spacing),
            TilesetKind::Individual { images, .. } => {
                let cols = self.column_count().max(1) as usize;
                match images.len() {
                    0 => 0,
                    n => u32::try_from((n - 1) / cols + 1).unwrap_or(u32::MAX),
                }
            }
        }
    }

    /// Number of tiles. Saturates at `u32::MAX`.
    pub fn len(&self) -> u32 {
        match &self.kind {
            TilesetKind::ImageGrid { .. } => {
                let n = u64::from(self.column_count()) * u64::from(self.row_count());
                u32::try_from(n).unwrap_or(u32::MAX)
            }
            TilesetKind::Individual { images, .. } => {
                u32::try_from(images.len()).unwrap_or(u32::MAX)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image area of tile `number`, if it has one.
    pub fn tile_image(&self, number: u32) -> Option<ImageRegion> {
        if number >= self.len() {
            return None;
        }
        match &self.kind {
            TilesetKind::ImageGrid {
                image,
                margin,
                spacing,
            } => {
                let cols = self.column_count();
                let (tw, th) = self.tile_size;
                let (col, row) = (number % cols, number / cols);
                Some(ImageRegion {
                    image: image.clone(),
                    pos: (
                        margin + col * (tw + spacing),
                        margin + row * (th + spacing),
                    ),
                    size: self.tile_size,
                })
            }
            TilesetKind::Individual { images, .. } => images
                .get(number as usize)?
                .clone()
                .map(ImageRegion::full),
        }
    }

    pub fn tile_pixel_size(&self, number: u32) -> (u32, u32) {
        match &self.kind {
            TilesetKind::Individual { images, .. } => images
                .get(number as usize)
                .and_then(Option::as_ref)
                .map_or(self.tile_size, |img| img.size),
            TilesetKind::ImageGrid { .. } => self.tile_size,
        }
    }

    /// Attributes of tile `number`, created on first access.
    pub fn attributes_mut(&mut self, number: u32) -> &mut TileAttributes {
        self.tile_attributes.entry(number).or_default()
    }
}

/// Shared handle to a [`Tileset`].
///
/// Clones point at the same tileset. Equality and hashing go by identity,
/// so two tilesets with identical content are still different tilesets.
#[derive(Clone)]
pub struct TilesetRef(Rc<RefCell<Tileset>>);

impl TilesetRef {
    pub fn new(tileset: Tileset) -> Self {
        Self(Rc::new(RefCell::new(tileset)))
    }

    pub fn borrow(&self) -> Ref<'_, Tileset> {
        self.0.borrow()
    }

    /// Edit the tileset in place. A change in tile count shifts the GIDs of
    /// every map using it; see `TilesetsMut::modify_tileset`.
    pub fn borrow_mut(&self) -> RefMut<'_, Tileset> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &TilesetRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn name(&self) -> String {
        self.borrow().name.clone()
    }

    pub fn len(&self) -> u32 {
        self.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live handles, including the one in a cache.
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn tile(&self, number: u32) -> Result<TilesetTile> {
        let len = self.len();
        if number >= len {
            return Err(MapError::NotFound(format!(
                "tile {number} in tileset '{}' ({len} tiles)",
                self.name()
            )));
        }
        Ok(TilesetTile {
            tileset: self.clone(),
            number,
        })
    }

    pub fn tiles(&self) -> impl Iterator<Item = TilesetTile> + '_ {
        (0..self.len()).map(|number| TilesetTile {
            tileset: self.clone(),
            number,
        })
    }

    /// GID of this tileset's first tile in `map`.
    pub fn first_gid(&self, map: &Map) -> Result<u32> {
        first_gid_in(map.tilesets().as_slice(), self)
    }

    /// One past the GID of this tileset's last tile in `map`.
    pub fn end_gid(&self, map: &Map) -> Result<u32> {
        Ok(self.first_gid(map)? + self.len())
    }
}

impl PartialEq for TilesetRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TilesetRef {}

impl Hash for TilesetRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for TilesetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(ts) => write!(f, "<Tileset '{}' ({} tiles)>", ts.name, ts.len()),
            Err(_) => f.write_str("<Tileset (borrowed)>"),
        }
    }
}

impl Named for TilesetRef {
    fn has_name(&self, name: &str) -> bool {
        self.borrow().name == name
    }
}

impl From<Tileset> for TilesetRef {
    fn from(tileset: Tileset) -> Self {
        Self::new(tileset)
    }
}

/// First GID of `tileset` within `tilesets`, found by identity.
pub(crate) fn first_gid_in(tilesets: &[TilesetRef], tileset: &TilesetRef) -> Result<u32> {
    let mut before = 0u64;
    for ts in tilesets {
        if ts.ptr_eq(tileset) {
            return u32::try_from(before + 1).map_err(|_| MapError::TooManyTiles {
                count: before,
                limit: GID_MASK,
            });
        }
        before += u64::from(ts.len());
    }
    Err(MapError::TilesetNotInMap(tileset.name()))
}

/// Resolve a GID against tilesets with the given lengths.
///
/// Lengths are passed separately so that GIDs can be read against an
/// earlier layout of tilesets whose size has changed since.
pub(crate) fn resolve_with_lengths<'a>(
    tilesets: impl IntoIterator<Item = (&'a TilesetRef, u32)>,
    gid: u32,
) -> Result<Option<TilesetTile>> {
    if gid == 0 {
        return Ok(None);
    }
    let mut n = gid - 1;
    for (tileset, len) in tilesets {
        if n < len {
            return Ok(Some(TilesetTile {
                tileset: tileset.clone(),
                number: n,
            }));
        }
        n -= len;
    }
    Err(MapError::InvalidGid(gid))
}

/// The tile a GID points to in `tilesets`, `None` for 0.
pub fn resolve(tilesets: &[TilesetRef], gid: u32) -> Result<Option<TilesetTile>> {
    resolve_with_lengths(tilesets.iter().map(|ts| (ts, ts.len())), gid)
}

/// One tile of a tileset, addressed by its 0-based number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TilesetTile {
    tileset: TilesetRef,
    number: u32,
}

impl TilesetTile {
    pub fn tileset(&self) -> &TilesetRef {
        &self.tileset
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// GID of this tile in `map`.
    pub fn gid(&self, map: &Map) -> Result<u32> {
        Ok(self.tileset.first_gid(map)? + self.number)
    }

    /// Unflipped tile value for this tile in `map`.
    pub fn value(&self, map: &Map) -> Result<TileValue> {
        Ok(TileValue::new(self.gid(map)?))
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        self.tileset.borrow().tile_pixel_size(self.number)
    }

    pub fn image(&self) -> Option<ImageRegion> {
        self.tileset.borrow().tile_image(self.number)
    }

    pub fn properties(&self) -> Properties {
        self.with_attributes(|a| a.properties.clone())
            .unwrap_or_default()
    }

    pub fn probability(&self) -> f64 {
        self.with_attributes(|a| a.probability)
            .flatten()
            .unwrap_or(1.0)
    }

    pub fn terrain_indices(&self) -> Vec<i32> {
        self.with_attributes(|a| a.terrain_indices.clone())
            .unwrap_or_default()
    }

    /// Terrain per corner; `None` where the index is unset or unknown.
    pub fn terrains(&self) -> Vec<Option<Terrain>> {
        let ts = self.tileset.borrow();
        self.terrain_indices()
            .into_iter()
            .map(|i| {
                usize::try_from(i)
                    .ok()
                    .and_then(|i| ts.terrains.find(i).cloned())
            })
            .collect()
    }

    fn with_attributes<R>(&self, f: impl FnOnce(&TileAttributes) -> R) -> Option<R> {
        self.tileset
            .borrow()
            .tile_attributes
            .get(&self.number)
            .map(f)
    }
}
