//! Ordered lists whose items can also be looked up by name.
//!
//! Layers, tilesets, terrains and objects all live in a [`NamedList`]. Every
//! mutation runs inside a [`Mutation`] region: if the region is dropped
//! without [`Mutation::commit`], the list goes back to the items it had when
//! the outermost region was opened.

use crate::error::{MapError, Result};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Items that can be found by name.
pub trait Named {
    fn has_name(&self, name: &str) -> bool;
}

/// Hooks a list runs on items going in and coming out.
pub trait ItemPolicy<T> {
    /// Validate or transform an item before it is stored. An error rejects
    /// the whole mutation.
    fn on_store(&self, item: T) -> Result<T> {
        Ok(item)
    }

    /// Inverse of `on_store` for reads.
    fn on_retrieve<'a>(&self, item: &'a T) -> &'a T {
        item
    }
}

/// Policy that accepts every item unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnyItem;

impl<T> ItemPolicy<T> for AnyItem {}

/// Position or name of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key<'a> {
    /// Position; negative values count from the end.
    Index(isize),
    /// First item with this name.
    Name(&'a str),
}

impl From<usize> for Key<'_> {
    fn from(index: usize) -> Self {
        Key::Index(index as isize)
    }
}

impl From<isize> for Key<'_> {
    fn from(index: isize) -> Self {
        Key::Index(index)
    }
}

impl From<i32> for Key<'_> {
    fn from(index: i32) -> Self {
        Key::Index(index as isize)
    }
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(name: &'a str) -> Self {
        Key::Name(name)
    }
}

impl<'a> From<&'a String> for Key<'a> {
    fn from(name: &'a String) -> Self {
        Key::Name(name)
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "index {i}"),
            Key::Name(name) => write!(f, "name '{name}'"),
        }
    }
}

/// A `start:stop:step` range with the same rules as Python slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: isize,
}

impl Default for Slice {
    fn default() -> Self {
        Self::all()
    }
}

impl Slice {
    pub fn new(start: Option<isize>, stop: Option<isize>) -> Self {
        Self {
            start,
            stop,
            step: 1,
        }
    }

    pub fn all() -> Self {
        Self::new(None, None)
    }

    pub fn with_step(self, step: isize) -> Self {
        Self { step, ..self }
    }

    /// Clamped `(start, stop)` for a list of `len` items.
    fn bounds(&self, len: usize) -> Result<(isize, isize)> {
        if self.step == 0 {
            return Err(MapError::InvalidArgument("slice step cannot be zero".into()));
        }
        let len = len as isize;
        let (lower, upper) = if self.step > 0 { (0, len) } else { (-1, len - 1) };
        let clamp = |value: Option<isize>, default: isize| match value {
            None => default,
            Some(v) if v < 0 => (v + len).max(lower),
            Some(v) => v.min(upper),
        };
        let start = clamp(self.start, if self.step > 0 { lower } else { upper });
        let stop = clamp(self.stop, if self.step > 0 { upper } else { lower });
        Ok((start, stop))
    }

    /// The positions this slice selects in a list of `len` items, in order.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>> {
        let (start, stop) = self.bounds(len)?;
        let mut out = Vec::new();
        let mut i = start;
        while (self.step > 0 && i < stop) || (self.step < 0 && i > stop) {
            out.push(i as usize);
            i += self.step;
        }
        Ok(out)
    }
}

/// An ordered list with name lookup, storage hooks and rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedList<T, P = AnyItem> {
    items: Vec<T>,
    policy: P,
    depth: usize,
}

impl<T, P: Default> Default for NamedList<T, P> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            policy: P::default(),
            depth: 0,
        }
    }
}

impl<T: Named + Clone, P: ItemPolicy<T>> NamedList<T, P> {
    pub fn with_policy(policy: P) -> Self {
        Self {
            items: Vec::new(),
            policy,
            depth: 0,
        }
    }

    /// Build a list, passing every item through the policy.
    pub fn from_items(items: impl IntoIterator<Item = T>, policy: P) -> Result<Self> {
        let mut list = Self::with_policy(policy);
        list.extend(items)?;
        Ok(list)
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter().map(|item| self.policy.on_retrieve(item))
    }

    /// Mutable access to stored items. Items are edited in place, so the
    /// store hook does not run again.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Resolve a key to a position in the list.
    pub fn index_of<'k>(&self, key: impl Into<Key<'k>>) -> Result<usize> {
        match key.into() {
            Key::Index(i) => {
                let len = self.items.len() as isize;
                let wrapped = if i < 0 { i + len } else { i };
                if (0..len).contains(&wrapped) {
                    Ok(wrapped as usize)
                } else {
                    Err(MapError::NotFound(Key::Index(i).to_string()))
                }
            }
            Key::Name(name) => self
                .items
                .iter()
                .position(|item| self.policy.on_retrieve(item).has_name(name))
                .ok_or_else(|| MapError::NotFound(Key::Name(name).to_string())),
        }
    }

    /// Insertion position for a key: names must exist, indices are clamped.
    fn insertion_index(&self, key: Key<'_>) -> Result<usize> {
        match key {
            Key::Index(i) => {
                let len = self.items.len() as isize;
                let pos = if i < 0 { (i + len).max(0) } else { i.min(len) };
                Ok(pos as usize)
            }
            Key::Name(_) => self.index_of(key),
        }
    }

    pub fn get<'k>(&self, key: impl Into<Key<'k>>) -> Result<&T> {
        let index = self.index_of(key)?;
        Ok(self.policy.on_retrieve(&self.items[index]))
    }

    pub fn get_mut<'k>(&mut self, key: impl Into<Key<'k>>) -> Result<&mut T> {
        let index = self.index_of(key)?;
        Ok(&mut self.items[index])
    }

    /// Like [`get`](Self::get), but `None` when the key does not match.
    pub fn find<'k>(&self, key: impl Into<Key<'k>>) -> Option<&T> {
        self.get(key).ok()
    }

    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.items.iter().any(|stored| stored == item)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.index_of(name).is_ok()
    }

    /// Open a mutation region. See the module docs.
    pub fn begin(&mut self) -> Mutation<'_, T, P> {
        let snapshot = (self.depth == 0).then(|| self.items.clone());
        self.depth += 1;
        Mutation {
            list: self,
            snapshot,
        }
    }

    /// Run `f` inside a mutation region, committing only if it succeeds.
    pub fn transaction<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let mut region = self.begin();
        let out = f(&mut *region)?;
        region.commit();
        Ok(out)
    }

    /// Replace the item at `key`, returning the old one.
    pub fn set<'k>(&mut self, key: impl Into<Key<'k>>, item: T) -> Result<T> {
        let mut region = self.begin();
        let index = region.index_of(key)?;
        let stored = region.policy.on_store(item)?;
        let old = std::mem::replace(&mut region.items[index], stored);
        region.commit();
        Ok(old)
    }

    pub fn push(&mut self, item: T) -> Result<()> {
        let mut region = self.begin();
        let stored = region.policy.on_store(item)?;
        region.items.push(stored);
        region.commit();
        Ok(())
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) -> Result<()> {
        let mut region = self.begin();
        for item in items {
            let stored = region.policy.on_store(item)?;
            region.items.push(stored);
        }
        region.commit();
        Ok(())
    }

    /// Insert before `key`. Indices past either end are clamped.
    pub fn insert<'k>(&mut self, key: impl Into<Key<'k>>, item: T) -> Result<()> {
        let mut region = self.begin();
        let index = region.insertion_index(key.into())?;
        let stored = region.policy.on_store(item)?;
        region.items.insert(index, stored);
        region.commit();
        Ok(())
    }

    /// Insert right after `key`. Useful when addressing by name.
    pub fn insert_after<'k>(&mut self, key: impl Into<Key<'k>>, item: T) -> Result<()> {
        let mut region = self.begin();
        let index = match key.into() {
            Key::Index(i) if i >= region.items.len() as isize => region.items.len(),
            key => region.index_of(key)? + 1,
        };
        let stored = region.policy.on_store(item)?;
        region.items.insert(index, stored);
        region.commit();
        Ok(())
    }

    pub fn remove<'k>(&mut self, key: impl Into<Key<'k>>) -> Result<T> {
        let mut region = self.begin();
        let index = region.index_of(key)?;
        let item = region.items.remove(index);
        region.commit();
        Ok(item)
    }

    pub fn pop(&mut self) -> Result<T> {
        self.remove(-1)
    }

    /// Move an item by `delta` places, clamping at either end. Returns the
    /// item's new position.
    pub fn move_item<'k>(&mut self, key: impl Into<Key<'k>>, delta: isize) -> Result<usize> {
        let mut region = self.begin();
        let index = region.index_of(key)?;
        let last = region.items.len() as isize - 1;
        let target = (index as isize + delta).clamp(0, last) as usize;
        let item = region.items.remove(index);
        region.items.insert(target, item);
        region.commit();
        Ok(target)
    }

    pub fn get_slice(&self, slice: Slice) -> Result<Vec<&T>> {
        Ok(slice
            .indices(self.items.len())?
            .into_iter()
            .map(|i| self.policy.on_retrieve(&self.items[i]))
            .collect())
    }

    /// Assign to a slice. With step 1 the replacement may have any length;
    /// extended slices need exactly one item per selected position.
    pub fn set_slice(&mut self, slice: Slice, items: impl IntoIterator<Item = T>) -> Result<()> {
        let mut region = self.begin();
        let mut stored = Vec::new();
        for item in items {
            stored.push(region.policy.on_store(item)?);
        }
        if slice.step == 1 {
            let (start, stop) = slice.bounds(region.items.len())?;
            let start = start as usize;
            let stop = (stop as usize).max(start);
            region.items.splice(start..stop, stored);
        } else {
            let indices = slice.indices(region.items.len())?;
            if indices.len() != stored.len() {
                return Err(MapError::InvalidArgument(format!(
                    "attempt to assign {} items to an extended slice of size {}",
                    stored.len(),
                    indices.len()
                )));
            }
            for (i, item) in indices.into_iter().zip(stored) {
                region.items[i] = item;
            }
        }
        region.commit();
        Ok(())
    }

    /// Remove the items a slice selects, returning them in list order.
    pub fn delete_slice(&mut self, slice: Slice) -> Result<Vec<T>> {
        let mut region = self.begin();
        let mut indices = slice.indices(region.items.len())?;
        indices.sort_unstable();
        let mut removed = Vec::with_capacity(indices.len());
        for i in indices.into_iter().rev() {
            removed.push(region.items.remove(i));
        }
        removed.reverse();
        region.commit();
        Ok(removed)
    }

    pub fn clear(&mut self) -> Vec<T> {
        let mut region = self.begin();
        let removed = std::mem::take(&mut region.items);
        region.commit();
        removed
    }
}

/// A mutation region over a [`NamedList`].
///
/// Only the outermost region holds a snapshot; inner regions (opened
/// through this guard) join it.
pub struct Mutation<'a, T: Clone, P> {
    list: &'a mut NamedList<T, P>,
    snapshot: Option<Vec<T>>,
}

impl<T: Clone, P> Mutation<'_, T, P> {
    pub fn is_outermost(&self) -> bool {
        self.list.depth == 1
    }

    /// The items as they were when the outermost region was opened.
    pub fn snapshot(&self) -> Option<&[T]> {
        self.snapshot.as_deref()
    }

    /// Keep the changes made in this region.
    pub fn commit(mut self) {
        self.snapshot = None;
    }
}

impl<T: Clone, P> Deref for Mutation<'_, T, P> {
    type Target = NamedList<T, P>;

    fn deref(&self) -> &Self::Target {
        self.list
    }
}

impl<T: Clone, P> DerefMut for Mutation<'_, T, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.list
    }
}

impl<T: Clone, P> Drop for Mutation<'_, T, P> {
    fn drop(&mut self) {
        self.list.depth -= 1;
        if let Some(snapshot) = self.snapshot.take() {
            self.list.items = snapshot;
        }
    }
}
