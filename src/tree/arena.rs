//! Generational arena owning every module of a tree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::module::Module;

/// Stable handle of a module.
///
/// Combines a slot index with a generation counter. A slot freed by a deleted
/// module is recycled with a bumped generation, so a stale handle never
/// resolves to the module that reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleRef {
    index: u32,
    generation: u32,
}

impl ModuleRef {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the arena.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}v{}", self.index, self.generation)
    }
}

struct ArenaSlot {
    generation: u32,
    module: Option<Module>,
}

/// Slot storage plus a free list of recycled indices.
#[derive(Default)]
pub(crate) struct ModuleArena {
    slots: Vec<ArenaSlot>,
    free: Vec<u32>,
    live: usize,
}

impl ModuleArena {
    /// Allocates a slot and stores the module built by `make` for its handle.
    pub fn insert_with(&mut self, make: impl FnOnce(ModuleRef) -> Module) -> ModuleRef {
        let handle = if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            ModuleRef::new(index, slot.generation)
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let index = self.slots.len() as u32;
            self.slots.push(ArenaSlot {
                generation: 0,
                module: None,
            });
            ModuleRef::new(index, 0)
        };
        self.slots[handle.index as usize].module = Some(make(handle));
        self.live += 1;
        handle
    }

    pub fn get(&self, handle: ModuleRef) -> Option<&Module> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.module.as_ref())
    }

    pub fn get_mut(&mut self, handle: ModuleRef) -> Option<&mut Module> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.module.as_mut())
    }

    pub fn contains(&self, handle: ModuleRef) -> bool {
        self.get(handle).is_some()
    }

    /// Takes a module out of the arena.
    ///
    /// # Panics
    ///
    /// Panics if the module is not marked as deleting: only the deletion
    /// protocol may destroy a module.
    pub fn remove(&mut self, handle: ModuleRef) -> Option<Module> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        if let Some(module) = slot.module.as_ref() {
            assert!(
                module.is_deleting(),
                "{}",
                LifecycleError::DirectDestruction {
                    module: module.full_name()
                }
            );
        }
        let module = slot.module.take()?;
        self.free.push(handle.index);
        self.live -= 1;
        Some(module)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Handles of all live modules in slot order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn handles(&self) -> impl Iterator<Item = ModuleRef> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.module
                .as_ref()
                .map(|_| ModuleRef::new(index as u32, slot.generation))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleTypeBuilder;
    use crate::registry::ComponentId;

    fn make(arena: &mut ModuleArena, name: &str) -> ModuleRef {
        let ty = ModuleTypeBuilder::new("T").build();
        arena.insert_with(|h| Module::new(h, ComponentId::new(0), name, None, ty))
    }

    #[test]
    fn test_recycled_slot_bumps_generation() {
        let mut arena = ModuleArena::default();
        let a = make(&mut arena, "a");
        arena.get_mut(a).unwrap().deleting = true;
        assert!(arena.remove(a).is_some());
        assert!(!arena.contains(a));

        let b = make(&mut arena, "b");
        assert_eq!(b.index(), a.index());
        assert_eq!(b.generation(), a.generation() + 1);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b).unwrap().name(), "b");
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.handles().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    #[should_panic(expected = "destroyed outside the deletion protocol")]
    fn test_direct_destruction_panics() {
        let mut arena = ModuleArena::default();
        let a = make(&mut arena, "a");
        let _ = arena.remove(a);
    }
}
