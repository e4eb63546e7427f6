//! Sharing of external tileset files between maps.

use crate::error::{MapError, Result};
use crate::tileset::{Tileset, TilesetRef};
use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// External tilesets by canonical file path.
///
/// Every map loaded through the same cache gets the same [`TilesetRef`] for
/// the same file. Entries stay alive until [`release_unused`] drops the ones
/// no map holds anymore.
///
/// [`release_unused`]: TilesetCache::release_unused
#[derive(Debug, Default)]
pub struct TilesetCache {
    tilesets: HashMap<PathBuf, TilesetRef>,
}

/// Canonical form of `path`, used as the cache key.
pub fn canonical_path(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl TilesetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tilesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tilesets.is_empty()
    }

    /// The cached tileset for `path`, if the file was loaded before.
    pub fn get(&self, path: &Path) -> Option<TilesetRef> {
        let key = path.canonicalize().ok()?;
        self.tilesets.get(&key).cloned()
    }

    /// The tileset for `path`, loading it with `load` on first use. The
    /// loaded tileset records its canonical path as `source`.
    pub fn get_or_load(
        &mut self,
        path: &Path,
        load: impl FnOnce(&Path) -> Result<Tileset>,
    ) -> Result<TilesetRef> {
        let key = canonical_path(path)?;
        if let Some(tileset) = self.tilesets.get(&key) {
            debug!("tileset cache hit: {}", key.display());
            return Ok(tileset.clone());
        }
        let mut tileset = load(&key)?;
        tileset.source = Some(key.clone());
        let tileset = TilesetRef::new(tileset);
        self.tilesets.insert(key, tileset.clone());
        Ok(tileset)
    }

    /// Register an already loaded tileset under its `source` path.
    pub fn insert(&mut self, tileset: TilesetRef) -> Result<()> {
        let source = tileset.borrow().source.clone();
        let source = source.ok_or_else(|| {
            MapError::InvalidArgument(format!("tileset '{}' has no source file", tileset.name()))
        })?;
        self.tilesets.insert(canonical_path(&source)?, tileset);
        Ok(())
    }

    /// Drop tilesets that only the cache still holds. Returns how many were
    /// dropped.
    pub fn release_unused(&mut self) -> usize {
        let before = self.tilesets.len();
        self.tilesets.retain(|path, tileset| {
            let keep = tileset.strong_count() > 1;
            if !keep {
                debug!("releasing tileset {}", path.display());
            }
            keep
        });
        before - self.tilesets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Image;
    use std::fs;

    fn grid(name: &str) -> Tileset {
        Tileset::image_grid(name, (8, 8), Image::new("t.png", (16, 8)))
    }

    #[test]
    fn same_file_same_tileset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ts.json");
        fs::write(&path, "{}").unwrap();

        let mut cache = TilesetCache::new();
        let mut loads = 0;
        let a = cache
            .get_or_load(&path, |_| {
                loads += 1;
                Ok(grid("a"))
            })
            .unwrap();
        let dotted = dir.path().join(".").join("ts.json");
        let b = cache.get_or_load(&dotted, |_| Ok(grid("b"))).unwrap();
        assert_eq!(loads, 1);
        assert!(a.ptr_eq(&b));
        assert_eq!(a.borrow().source.as_deref(), Some(path.canonicalize().unwrap().as_path()));
        assert!(cache.get(&path).is_some());
    }

    #[test]
    fn release_drops_only_unreferenced() {
        let dir = tempfile::tempdir().unwrap();
        let (p1, p2) = (dir.path().join("one.json"), dir.path().join("two.json"));
        fs::write(&p1, "{}").unwrap();
        fs::write(&p2, "{}").unwrap();

        let mut cache = TilesetCache::new();
        let held = cache.get_or_load(&p1, |_| Ok(grid("one"))).unwrap();
        cache.get_or_load(&p2, |_| Ok(grid("two"))).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.release_unused(), 1);
        assert!(cache.get(&p1).is_some());
        assert!(cache.get(&p2).is_none());
        drop(held);
        assert_eq!(cache.release_unused(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut cache = TilesetCache::new();
        let err = cache.get_or_load(Path::new("/no/such/tileset.json"), |_| Ok(grid("x")));
        assert!(matches!(err, Err(MapError::Io { .. })));
    }
}
