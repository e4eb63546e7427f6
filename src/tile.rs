//! Tile values: a GID plus flip flags packed into one `u32`.

use crate::error::{MapError, Result};
use crate::map::Map;
use crate::properties::Properties;
use crate::tileset::{TilesetRef, TilesetTile};

pub const FLIP_H: u32 = 0x8000_0000; // bit 31
pub const FLIP_V: u32 = 0x4000_0000; // bit 30
pub const FLIP_D: u32 = 0x2000_0000; // bit 29
pub const GID_MASK: u32 = 0x0FFF_FFFF; // bit 28 is reserved

/// Flag code permutation for one clockwise quarter turn, indexed by
/// `H << 2 | V << 1 | D`.
const ROTATE_CW: [u8; 8] = [5, 4, 1, 0, 7, 6, 3, 2];
const ROTATE_CCW: [u8; 8] = [3, 2, 7, 6, 1, 0, 5, 4];

/// The value stored for one placed tile.
///
/// Bits 0-27 hold the GID (0 is "no tile"), bits 29-31 the diagonal,
/// vertical and horizontal flip flags. Bit 28 is carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TileValue(u32);

impl TileValue {
    pub const EMPTY: TileValue = TileValue(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn gid(self) -> u32 {
        self.0 & GID_MASK
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.gid() == 0
    }

    /// Replace the GID, keeping the flag bits.
    pub fn set_gid(&mut self, gid: u32) {
        self.set_masked(GID_MASK, gid);
    }

    pub fn with_gid(mut self, gid: u32) -> Self {
        self.set_gid(gid);
        self
    }

    #[inline]
    fn flag(self, mask: u32) -> bool {
        self.0 & mask != 0
    }

    #[inline]
    fn set_flag(&mut self, mask: u32, on: bool) {
        self.set_masked(mask, if on { mask } else { 0 });
    }

    #[inline]
    fn set_masked(&mut self, mask: u32, bits: u32) {
        self.0 = (bits & mask) | (self.0 & !mask);
    }

    pub fn flipped_horizontally(self) -> bool {
        self.flag(FLIP_H)
    }

    pub fn set_flipped_horizontally(&mut self, on: bool) {
        self.set_flag(FLIP_H, on);
    }

    pub fn flipped_vertically(self) -> bool {
        self.flag(FLIP_V)
    }

    pub fn set_flipped_vertically(&mut self, on: bool) {
        self.set_flag(FLIP_V, on);
    }

    /// Axes swapped.
    pub fn flipped_diagonally(self) -> bool {
        self.flag(FLIP_D)
    }

    pub fn set_flipped_diagonally(&mut self, on: bool) {
        self.set_flag(FLIP_D, on);
    }

    pub fn hflip(&mut self) {
        self.0 ^= FLIP_H;
    }

    pub fn vflip(&mut self) {
        self.0 ^= FLIP_V;
    }

    fn flag_code(self) -> usize {
        (usize::from(self.flipped_horizontally()) << 2)
            | (usize::from(self.flipped_vertically()) << 1)
            | usize::from(self.flipped_diagonally())
    }

    fn set_flag_code(&mut self, code: u8) {
        self.set_flipped_horizontally(code & 0b100 != 0);
        self.set_flipped_vertically(code & 0b010 != 0);
        self.set_flipped_diagonally(code & 0b001 != 0);
    }

    /// Rotate clockwise by a multiple of 90 degrees (negative turns
    /// counter-clockwise).
    pub fn rotate(&mut self, degrees: i32) -> Result<()> {
        if degrees % 90 != 0 {
            return Err(MapError::InvalidArgument(format!(
                "can only rotate in 90 degree increments, got {degrees}"
            )));
        }
        let table = if degrees > 0 { &ROTATE_CW } else { &ROTATE_CCW };
        let steps = (degrees / 90).unsigned_abs() % 4;
        let mut code = self.flag_code() as u8;
        for _ in 0..steps {
            code = table[usize::from(code)];
        }
        self.set_flag_code(code);
        Ok(())
    }

    pub fn rotated(mut self, degrees: i32) -> Result<Self> {
        self.rotate(degrees)?;
        Ok(self)
    }
}

impl From<u32> for TileValue {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<TileValue> for u32 {
    fn from(value: TileValue) -> Self {
        value.0
    }
}

/// Pixel size of the tile a value points to, with axes swapped for
/// diagonal flips. Empty values are `(0, 0)`.
pub(crate) fn value_pixel_size(value: TileValue, tilesets: &[TilesetRef]) -> Result<(u32, u32)> {
    let Some(tile) = crate::tileset::resolve(tilesets, value.gid())? else {
        return Ok((0, 0));
    };
    let (w, h) = tile.pixel_size();
    Ok(if value.flipped_diagonally() { (h, w) } else { (w, h) })
}

/// Read view of one cell of a tile layer.
#[derive(Debug, Clone, Copy)]
pub struct MapTile<'m> {
    map: &'m Map,
    layer: usize,
    pos: (u32, u32),
    value: TileValue,
}

impl<'m> MapTile<'m> {
    pub(crate) fn new(map: &'m Map, layer: usize, pos: (u32, u32), value: TileValue) -> Self {
        Self {
            map,
            layer,
            pos,
            value,
        }
    }

    pub fn value(&self) -> TileValue {
        self.value
    }

    pub fn gid(&self) -> u32 {
        self.value.gid()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Position in tiles.
    pub fn pos(&self) -> (u32, u32) {
        self.pos
    }

    pub fn layer_index(&self) -> usize {
        self.layer
    }

    pub fn tileset_tile(&self) -> Result<Option<TilesetTile>> {
        self.map.tilesets().resolve(self.gid())
    }

    pub fn tileset(&self) -> Result<Option<TilesetRef>> {
        Ok(self.tileset_tile()?.map(|t| t.tileset().clone()))
    }

    /// Number of the referenced tile within its tileset, 0 when empty.
    pub fn number(&self) -> Result<u32> {
        Ok(self.tileset_tile()?.map_or(0, |t| t.number()))
    }

    pub fn pixel_size(&self) -> Result<(u32, u32)> {
        value_pixel_size(self.value, self.map.tilesets().as_slice())
    }

    /// Size in map tiles; a regular tile is `(1.0, 1.0)`.
    pub fn size(&self) -> Result<(f32, f32)> {
        let (pw, ph) = self.pixel_size()?;
        let (tw, th) = self.map.tile_size();
        Ok((pw as f32 / tw as f32, ph as f32 / th as f32))
    }

    /// Bottom-left corner of the cell, in pixels.
    pub fn pixel_pos(&self) -> (u32, u32) {
        let (tw, th) = self.map.tile_size();
        (self.pos.0 * tw, (self.pos.1 + 1) * th)
    }

    /// Properties of the referenced tileset tile (shared by every cell
    /// showing it).
    pub fn properties(&self) -> Result<Properties> {
        Ok(self
            .tileset_tile()?
            .map(|t| t.properties())
            .unwrap_or_default())
    }

    /// Map pixel coordinates within this cell to pixel coordinates within
    /// the tileset tile's image, undoing flips. Negative values count from
    /// the far edge.
    pub fn tile_to_image_coordinates(&self, x: i64, y: i64) -> Result<(i64, i64)> {
        let (w, h) = self.pixel_size()?;
        let (w, h) = (i64::from(w), i64::from(h));
        let mut x = if x < 0 { w + x } else { x };
        let mut y = if y < 0 { h + y } else { y };
        if self.value.flipped_vertically() {
            y = h - y - 1;
        }
        if self.value.flipped_horizontally() {
            x = w - x - 1;
        }
        if self.value.flipped_diagonally() {
            std::mem::swap(&mut x, &mut y);
        }
        Ok((x, y))
    }
}
