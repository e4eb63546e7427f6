//! The ordered tilesets of one map, and GID renumbering.
//!
//! GIDs are positions in the concatenation of a map's tilesets, so any
//! change to the list (or to the size of a tileset in it) moves them. Edits
//! go through [`TilesetsMut`], which rewrites every placed tile value so that
//! it keeps pointing at the same tileset tile, or rejects the edit and leaves
//! the list and all tiles as they were.

use crate::error::{MapError, Result};
use crate::layer::LayerList;
use crate::named_list::{Key, NamedList, Slice};
use crate::tile::GID_MASK;
use crate::tileset::{first_gid_in, resolve, resolve_with_lengths, Tileset, TilesetRef, TilesetTile};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Tileset order with each tileset's length at the time it was taken.
///
/// Needed to read old GIDs after a shared tileset changed size. Take one
/// with [`TilesetList::layout`] before the change, then hand it to
/// [`TilesetsMut::renumber_from`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GidLayout(Vec<(TilesetRef, u32)>);

impl GidLayout {
    pub fn of(tilesets: &[TilesetRef]) -> Self {
        Self(tilesets.iter().map(|ts| (ts.clone(), ts.len())).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total tile count.
    pub fn tile_count(&self) -> u64 {
        self.0.iter().map(|(_, len)| u64::from(*len)).sum()
    }

    pub fn resolve(&self, gid: u32) -> Result<Option<TilesetTile>> {
        resolve_with_lengths(self.0.iter().map(|(ts, len)| (ts, *len)), gid)
    }

    /// Whether `tilesets` starts with exactly this layout, so that every
    /// GID valid here means the same tile there.
    fn is_prefix_of(&self, tilesets: &[TilesetRef]) -> bool {
        self.0.len() <= tilesets.len()
            && self
                .0
                .iter()
                .zip(tilesets)
                .all(|((old, len), new)| old.ptr_eq(new) && *len == new.len())
    }
}

/// Tilesets attached to a map.
///
/// Read access is direct; edits go through `Map::tilesets_mut`.
#[derive(Debug, Clone, Default)]
pub struct TilesetList {
    list: NamedList<TilesetRef>,
}

impl TilesetList {
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TilesetRef> + '_ {
        self.list.iter()
    }

    pub fn as_slice(&self) -> &[TilesetRef] {
        self.list.as_slice()
    }

    pub fn get<'k>(&self, key: impl Into<Key<'k>>) -> Result<&TilesetRef> {
        self.list.get(key)
    }

    pub fn find<'k>(&self, key: impl Into<Key<'k>>) -> Option<&TilesetRef> {
        self.list.find(key)
    }

    pub fn index_of<'k>(&self, key: impl Into<Key<'k>>) -> Result<usize> {
        self.list.index_of(key)
    }

    /// Membership by identity.
    pub fn contains(&self, tileset: &TilesetRef) -> bool {
        self.list.contains(tileset)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.list.contains_name(name)
    }

    pub fn get_slice(&self, slice: Slice) -> Result<Vec<&TilesetRef>> {
        self.list.get_slice(slice)
    }

    /// Total number of tiles in all tilesets.
    pub fn tile_count(&self) -> u64 {
        self.iter().map(|ts| u64::from(ts.len())).sum()
    }

    /// Highest valid GID (0 when there are no tiles).
    pub fn end_gid(&self) -> u32 {
        u32::try_from(self.tile_count()).unwrap_or(u32::MAX)
    }

    pub fn layout(&self) -> GidLayout {
        GidLayout::of(self.as_slice())
    }

    pub fn resolve(&self, gid: u32) -> Result<Option<TilesetTile>> {
        resolve(self.as_slice(), gid)
    }
}

/// Check the tile budget, then move every placed GID from `previous` to
/// `current`. Nothing is written unless every GID can be moved.
pub(crate) fn renumber(
    previous: &GidLayout,
    current: &[TilesetRef],
    layers: &mut LayerList,
) -> Result<()> {
    let count: u64 = current.iter().map(|ts| u64::from(ts.len())).sum();
    if count > u64::from(GID_MASK) {
        return Err(MapError::TooManyTiles {
            count,
            limit: GID_MASK,
        });
    }
    if previous.is_prefix_of(current) {
        debug!("tileset edit kept existing GIDs, skipping renumber");
        return Ok(());
    }

    let mut remap: HashMap<u32, u32> = HashMap::new();
    for value in layers.tile_values() {
        let gid = value.gid();
        if gid == 0 || remap.contains_key(&gid) {
            continue;
        }
        let Some(tile) = previous.resolve(gid)? else {
            continue;
        };
        let tileset = tile.tileset();
        let new_gid = match first_gid_in(current, tileset) {
            Ok(first) if tile.number() < tileset.len() => first + tile.number(),
            Ok(_) | Err(MapError::TilesetNotInMap(_)) => {
                return Err(MapError::UsedTileset {
                    tileset: tileset.name(),
                })
            }
            Err(e) => return Err(e),
        };
        remap.insert(gid, new_gid);
    }

    let moved = remap.iter().filter(|(old, new)| old != new).count();
    debug!(
        "renumbering tiles: {} distinct GIDs in use, {} moved",
        remap.len(),
        moved
    );
    if moved > 0 {
        for value in layers.tile_values_mut() {
            if let Some(&gid) = remap.get(&value.gid()) {
                value.set_gid(gid);
            }
        }
    }
    Ok(())
}

/// Mutable access to a map's tilesets, renumbering its tiles on every edit.
pub struct TilesetsMut<'m> {
    pub(crate) tilesets: &'m mut TilesetList,
    pub(crate) layers: &'m mut LayerList,
}

impl TilesetsMut<'_> {
    /// Run several list operations as one edit: GIDs are renumbered once at
    /// the end, and any failure restores the list and every tile value.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut NamedList<TilesetRef>) -> Result<R>) -> Result<R> {
        let previous = self.tilesets.layout();
        let mut region = self.tilesets.list.begin();
        let out = f(&mut *region)?;
        if region.is_outermost() {
            renumber(&previous, region.as_slice(), self.layers)?;
        }
        region.commit();
        Ok(out)
    }

    pub fn push(&mut self, tileset: impl Into<TilesetRef>) -> Result<()> {
        let tileset = tileset.into();
        self.edit(|list| list.push(tileset))
    }

    pub fn insert<'k>(&mut self, key: impl Into<Key<'k>>, tileset: impl Into<TilesetRef>) -> Result<()> {
        let (key, tileset) = (key.into(), tileset.into());
        self.edit(|list| list.insert(key, tileset))
    }

    pub fn insert_after<'k>(&mut self, key: impl Into<Key<'k>>, tileset: impl Into<TilesetRef>) -> Result<()> {
        let (key, tileset) = (key.into(), tileset.into());
        self.edit(|list| list.insert_after(key, tileset))
    }

    /// Replace a tileset; fails if tiles of the old one are placed.
    pub fn set<'k>(&mut self, key: impl Into<Key<'k>>, tileset: impl Into<TilesetRef>) -> Result<TilesetRef> {
        let (key, tileset) = (key.into(), tileset.into());
        self.edit(|list| list.set(key, tileset))
    }

    pub fn remove<'k>(&mut self, key: impl Into<Key<'k>>) -> Result<TilesetRef> {
        let key = key.into();
        self.edit(|list| list.remove(key))
    }

    pub fn move_item<'k>(&mut self, key: impl Into<Key<'k>>, delta: isize) -> Result<usize> {
        let key = key.into();
        self.edit(|list| list.move_item(key, delta))
    }

    pub fn set_slice(&mut self, slice: Slice, tilesets: impl IntoIterator<Item = TilesetRef>) -> Result<()> {
        self.edit(|list| list.set_slice(slice, tilesets))
    }

    pub fn delete_slice(&mut self, slice: Slice) -> Result<Vec<TilesetRef>> {
        self.edit(|list| list.delete_slice(slice))
    }

    pub fn clear(&mut self) -> Result<Vec<TilesetRef>> {
        self.edit(|list| Ok(list.clear()))
    }

    /// Drop every tileset none of whose tiles are placed.
    pub fn remove_unused(&mut self) -> Result<Vec<TilesetRef>> {
        let mut used = HashSet::new();
        let mut seen = HashSet::new();
        for value in self.layers.tile_values() {
            if seen.insert(value.gid()) {
                if let Some(tile) = self.tilesets.resolve(value.gid())? {
                    used.insert(tile.tileset().clone());
                }
            }
        }
        self.edit(|list| {
            let mut removed = Vec::new();
            let mut i = 0;
            while i < list.len() {
                if used.contains(list.get(i)?) {
                    i += 1;
                } else {
                    removed.push(list.remove(i)?);
                }
            }
            Ok(removed)
        })
    }

    /// Change one tileset in place, then renumber this map. The tileset is
    /// restored if `f` or the renumbering fails.
    ///
    /// Other maps sharing the tileset must take a [`GidLayout`] first and
    /// call [`renumber_from`](Self::renumber_from) afterwards.
    pub fn modify_tileset<'k, R>(
        &mut self,
        key: impl Into<Key<'k>>,
        f: impl FnOnce(&mut Tileset) -> Result<R>,
    ) -> Result<R> {
        let tileset = self.tilesets.get(key)?.clone();
        let previous = self.tilesets.layout();
        let backup = tileset.borrow().clone();
        let changed = f(&mut tileset.borrow_mut());
        let result = changed.and_then(|out| {
            renumber(&previous, self.tilesets.as_slice(), self.layers)?;
            Ok(out)
        });
        if result.is_err() {
            *tileset.borrow_mut() = backup;
        }
        result
    }

    /// Renumber this map's tiles from GIDs that were valid under `previous`.
    pub fn renumber_from(&mut self, previous: &GidLayout) -> Result<()> {
        renumber(previous, self.tilesets.as_slice(), self.layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use crate::tileset::TilesetKind;

    fn grid(name: &str, tiles: u32) -> TilesetRef {
        Tileset::image_grid(name, (8, 8), Image::new("t.png", (8 * tiles, 8))).into()
    }

    #[test]
    fn layout_prefix_checks_identity_and_length() {
        let a = grid("a", 3);
        let b = grid("b", 2);
        let layout = GidLayout::of(&[a.clone()]);
        assert_eq!(layout.tile_count(), 3);
        assert!(layout.is_prefix_of(&[a.clone(), b.clone()]));
        assert!(!layout.is_prefix_of(&[b.clone(), a.clone()]));
        assert!(!layout.is_prefix_of(&[]));

        a.borrow_mut().kind = TilesetKind::ImageGrid {
            image: Image::new("t.png", (8, 8)),
            margin: 0,
            spacing: 0,
        };
        assert!(!layout.is_prefix_of(&[a.clone()]));

        // the old layout still reads GIDs by the old lengths
        let tile = layout.resolve(3).unwrap().unwrap();
        assert!(tile.tileset().ptr_eq(&a));
        assert_eq!(tile.number(), 2);
        assert!(layout.resolve(4).is_err());
    }
}
