//! Submodule storage of a compound module.
//!
//! Scalar submodules live in an ordered list; submodule vectors are named,
//! independently sized arrays whose empty slots are elements not yet created
//! (or already deleted). Newly inserted scalars go to the end of the list, and
//! every removal bumps a counter that position-based cursors compare against.

use crate::error::StructureError;
use crate::tree::ModuleRef;

/// A named submodule vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleVector {
    name: String,
    slots: Vec<Option<ModuleRef>>,
}

impl SubmoduleVector {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Element at `index`; `None` for holes and out-of-range indices.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<ModuleRef> {
        self.slots.get(index).copied().flatten()
    }

    fn first_occupied_from(&self, from: usize) -> Option<usize> {
        (from..self.slots.len()).find(|&i| self.slots[i].is_some())
    }
}

/// Position of an entry, used by cursors to resume a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StorePos {
    Scalar(usize),
    Vector { vector: usize, index: usize },
}

/// Store-level conflicts; the tree turns them into [`StructureError`]s once it
/// knows the parent's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreConflict {
    Duplicate,
    NoSuchVector,
    IndexOutOfRange { size: usize },
    Occupied,
    ShrinkOccupied { index: usize },
    VectorOccupied { index: usize },
    NotFound,
}

impl StoreConflict {
    pub(crate) fn into_error(
        self,
        parent: String,
        name: &str,
        index: Option<usize>,
        new_size: usize,
    ) -> StructureError {
        let name = name.to_string();
        let at = index.unwrap_or_default();
        match self {
            Self::Duplicate => StructureError::DuplicateSubmodule { parent, name },
            Self::NoSuchVector => StructureError::NoSuchSubmoduleVector { parent, name },
            Self::IndexOutOfRange { size } => StructureError::SubmoduleIndexOutOfRange {
                parent,
                name,
                index: at,
                size,
            },
            Self::Occupied => StructureError::SubmoduleSlotOccupied {
                parent,
                name,
                index: at,
            },
            Self::ShrinkOccupied { index } => StructureError::ShrinkOccupiedVector {
                parent,
                name,
                new_size,
                index,
            },
            Self::VectorOccupied { index } => StructureError::VectorStillOccupied {
                parent,
                name,
                index,
            },
            Self::NotFound => StructureError::NotASubmodule {
                parent,
                module: match index {
                    Some(i) => format!("{name}[{i}]"),
                    None => name,
                },
            },
        }
    }
}

/// Scalar submodules plus submodule vectors.
#[derive(Debug, Clone, Default)]
pub struct SubmoduleStore {
    scalars: Vec<(String, ModuleRef)>,
    vectors: Vec<SubmoduleVector>,
    removals: u64,
}

impl SubmoduleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `name` is taken by a scalar submodule or a submodule vector.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.scalars.iter().any(|(n, _)| n == name) || self.vector(name).is_some()
    }

    /// Submodule vector by name.
    #[must_use]
    pub fn vector(&self, name: &str) -> Option<&SubmoduleVector> {
        self.vectors.iter().find(|v| v.name == name)
    }

    fn vector_mut(&mut self, name: &str) -> Result<&mut SubmoduleVector, StoreConflict> {
        self.vectors
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or(StoreConflict::NoSuchVector)
    }

    /// Checks that `module` could be inserted as `name` / `name[index]`.
    pub(crate) fn check_insert(&self, name: &str, index: Option<usize>) -> Result<(), StoreConflict> {
        match index {
            None if self.contains_name(name) => Err(StoreConflict::Duplicate),
            None => Ok(()),
            Some(index) => {
                let vector = self.vector(name).ok_or(StoreConflict::NoSuchVector)?;
                if index >= vector.size() {
                    Err(StoreConflict::IndexOutOfRange {
                        size: vector.size(),
                    })
                } else if vector.get(index).is_some() {
                    Err(StoreConflict::Occupied)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Inserts `module` as `name` (scalar) or `name[index]` (vector element).
    pub(crate) fn insert(
        &mut self,
        name: &str,
        index: Option<usize>,
        module: ModuleRef,
    ) -> Result<(), StoreConflict> {
        match index {
            None => self.insert_scalar(name, module),
            Some(index) => self.insert_indexed(name, index, module),
        }
    }

    pub(crate) fn insert_scalar(&mut self, name: &str, module: ModuleRef) -> Result<(), StoreConflict> {
        self.check_insert(name, None)?;
        self.scalars.push((name.to_string(), module));
        Ok(())
    }

    pub(crate) fn insert_indexed(
        &mut self,
        name: &str,
        index: usize,
        module: ModuleRef,
    ) -> Result<(), StoreConflict> {
        self.check_insert(name, Some(index))?;
        self.vector_mut(name)?.slots[index] = Some(module);
        Ok(())
    }

    /// Removes `module` from its place. Order of the remaining scalars is kept.
    pub(crate) fn remove(
        &mut self,
        name: &str,
        index: Option<usize>,
        module: ModuleRef,
    ) -> Result<(), StoreConflict> {
        match index {
            None => {
                let pos = self
                    .scalars
                    .iter()
                    .position(|(_, m)| *m == module)
                    .ok_or(StoreConflict::NotFound)?;
                self.scalars.remove(pos);
            }
            Some(index) => {
                let slot = self
                    .vector_mut(name)?
                    .slots
                    .get_mut(index)
                    .filter(|slot| **slot == Some(module))
                    .ok_or(StoreConflict::NotFound)?;
                *slot = None;
            }
        }
        self.removals += 1;
        Ok(())
    }

    pub(crate) fn add_vector(&mut self, name: &str, size: usize) -> Result<(), StoreConflict> {
        if self.vector(name).is_some() {
            return Err(StoreConflict::Duplicate);
        }
        if self.scalars.iter().any(|(n, _)| n == name) {
            return Err(StoreConflict::Duplicate);
        }
        self.vectors.push(SubmoduleVector {
            name: name.to_string(),
            slots: vec![None; size],
        });
        Ok(())
    }

    pub(crate) fn delete_vector(&mut self, name: &str) -> Result<(), StoreConflict> {
        let pos = self
            .vectors
            .iter()
            .position(|v| v.name == name)
            .ok_or(StoreConflict::NoSuchVector)?;
        if let Some(index) = self.vectors[pos].first_occupied_from(0) {
            return Err(StoreConflict::VectorOccupied { index });
        }
        self.vectors.remove(pos);
        Ok(())
    }

    pub(crate) fn set_vector_size(&mut self, name: &str, new_size: usize) -> Result<(), StoreConflict> {
        let vector = self.vector_mut(name)?;
        if let Some(index) = vector.first_occupied_from(new_size) {
            return Err(StoreConflict::ShrinkOccupied { index });
        }
        vector.slots.resize(new_size, None);
        Ok(())
    }

    /// Scalar submodule (`index == None`) or vector element.
    #[must_use]
    pub fn get(&self, name: &str, index: Option<usize>) -> Option<ModuleRef> {
        match index {
            None => self
                .scalars
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, m)| *m),
            Some(index) => self.vector(name)?.get(index),
        }
    }

    #[must_use]
    pub fn vector_size(&self, name: &str) -> Option<usize> {
        self.vector(name).map(SubmoduleVector::size)
    }

    #[must_use]
    pub fn vector_names(&self) -> Vec<String> {
        self.vectors.iter().map(|v| v.name.clone()).collect()
    }

    /// Scalar names in insertion order, then vector names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.scalars
            .iter()
            .map(|(n, _)| n.clone())
            .chain(self.vectors.iter().map(|v| v.name.clone()))
            .collect()
    }

    /// True if at least one live submodule exists.
    #[must_use]
    pub fn has_submodules(&self) -> bool {
        !self.scalars.is_empty() || self.vectors.iter().any(|v| v.first_occupied_from(0).is_some())
    }

    /// Scalars first, then vector elements, skipping holes.
    pub fn iter(&self) -> impl Iterator<Item = ModuleRef> + '_ {
        self.scalars.iter().map(|(_, m)| *m).chain(
            self.vectors
                .iter()
                .flat_map(|v| v.slots.iter().filter_map(|slot| *slot)),
        )
    }

    /// Scalar submodules in order.
    pub fn scalars(&self) -> impl Iterator<Item = ModuleRef> + '_ {
        self.scalars.iter().map(|(_, m)| *m)
    }

    /// Occupied vector elements in vector order.
    pub fn vector_elements(&self) -> impl Iterator<Item = ModuleRef> + '_ {
        self.vectors
            .iter()
            .flat_map(|v| v.slots.iter().filter_map(|slot| *slot))
    }

    /// Number of removals so far.
    #[must_use]
    pub const fn removals(&self) -> u64 {
        self.removals
    }

    /// First entry strictly after `pos` (`None` starts from the beginning).
    #[must_use]
    pub fn entry_after(&self, pos: Option<StorePos>) -> Option<(StorePos, ModuleRef)> {
        let (mut vector, mut from) = match pos {
            None => {
                if let Some((_, m)) = self.scalars.first() {
                    return Some((StorePos::Scalar(0), *m));
                }
                (0, 0)
            }
            Some(StorePos::Scalar(i)) => {
                if let Some((_, m)) = self.scalars.get(i + 1) {
                    return Some((StorePos::Scalar(i + 1), *m));
                }
                (0, 0)
            }
            Some(StorePos::Vector { vector, index }) => (vector, index + 1),
        };
        while let Some(v) = self.vectors.get(vector) {
            if let Some(index) = v.first_occupied_from(from) {
                return v.get(index).map(|m| (StorePos::Vector { vector, index }, m));
            }
            vector += 1;
            from = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(i: u32) -> ModuleRef {
        ModuleRef::new(i, 0)
    }

    #[test]
    fn test_scalar_and_vector_names_are_unique() {
        let mut store = SubmoduleStore::new();
        store.insert_scalar("a", m(1)).unwrap();
        assert_eq!(store.add_vector("a", 2), Err(StoreConflict::Duplicate));
        store.add_vector("b", 3).unwrap();
        assert_eq!(store.insert_scalar("b", m(2)), Err(StoreConflict::Duplicate));
        assert_eq!(store.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_indexed_insert_checks() {
        let mut store = SubmoduleStore::new();
        assert_eq!(store.insert_indexed("v", 0, m(1)), Err(StoreConflict::NoSuchVector));
        store.add_vector("v", 2).unwrap();
        assert_eq!(
            store.insert_indexed("v", 2, m(1)),
            Err(StoreConflict::IndexOutOfRange { size: 2 })
        );
        store.insert_indexed("v", 1, m(1)).unwrap();
        assert_eq!(store.insert_indexed("v", 1, m(2)), Err(StoreConflict::Occupied));
        assert_eq!(store.get("v", Some(1)), Some(m(1)));
        assert_eq!(store.get("v", Some(0)), None);
    }

    #[test]
    fn test_vector_resize_and_delete_refuse_live_modules() {
        let mut store = SubmoduleStore::new();
        store.add_vector("v", 4).unwrap();
        store.insert_indexed("v", 2, m(7)).unwrap();
        assert_eq!(
            store.set_vector_size("v", 1),
            Err(StoreConflict::ShrinkOccupied { index: 2 })
        );
        assert_eq!(store.vector_size("v"), Some(4));
        store.set_vector_size("v", 3).unwrap();
        assert_eq!(
            store.delete_vector("v"),
            Err(StoreConflict::VectorOccupied { index: 2 })
        );
        store.remove("v", Some(2), m(7)).unwrap();
        store.delete_vector("v").unwrap();
        assert!(store.vector("v").is_none());
    }

    #[test]
    fn test_iteration_skips_holes_and_counts_removals() {
        let mut store = SubmoduleStore::new();
        store.insert_scalar("a", m(1)).unwrap();
        store.add_vector("v", 3).unwrap();
        store.insert_indexed("v", 0, m(2)).unwrap();
        store.insert_indexed("v", 2, m(3)).unwrap();
        store.insert_scalar("c", m(4)).unwrap();
        assert_eq!(store.iter().collect::<Vec<_>>(), vec![m(1), m(4), m(2), m(3)]);

        store.remove("a", None, m(1)).unwrap();
        assert_eq!(store.removals(), 1);
        assert_eq!(store.remove("a", None, m(1)), Err(StoreConflict::NotFound));
        assert!(store.has_submodules());
    }

    #[test]
    fn test_entry_after_walks_everything() {
        let mut store = SubmoduleStore::new();
        store.add_vector("v", 3).unwrap();
        store.add_vector("w", 0).unwrap();
        store.add_vector("x", 1).unwrap();
        store.insert_indexed("v", 1, m(2)).unwrap();
        store.insert_indexed("x", 0, m(3)).unwrap();
        store.insert_scalar("a", m(1)).unwrap();

        let mut pos = None;
        let mut seen = Vec::new();
        while let Some((p, module)) = store.entry_after(pos) {
            seen.push(module);
            pos = Some(p);
        }
        assert_eq!(seen, vec![m(1), m(2), m(3)]);
    }
}
