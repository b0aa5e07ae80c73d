//! Component registry: id allocation and lookup.
//!
//! The registry is an external collaborator from the tree's point of view. The
//! tree registers every module when it is created, deregisters and re-registers
//! it on reparenting (the id changes), and deregisters it on destruction. The
//! initialization driver uses `lookup_component` to notice that a module was
//! deleted by user code.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tree::ModuleRef;

/// Registry-assigned component id.
///
/// Unlike [`ModuleRef`], which is stable for the lifetime of the module, a
/// component id is reassigned whenever the module is moved to a new parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Creates a component id from a raw integer.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the underlying integer.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry contract used by [`crate::ModuleTree`].
pub trait ComponentRegistry {
    /// Allocates a fresh id for `module`.
    fn register_component(&mut self, module: ModuleRef) -> ComponentId;

    /// Releases `id`. Unknown ids are ignored.
    fn deregister_component(&mut self, id: ComponentId);

    /// Resolves `id` to the module currently holding it.
    fn lookup_component(&self, id: ComponentId) -> Option<ModuleRef>;

    /// Number of live registrations.
    fn registered_count(&self) -> usize;
}

/// Dense default registry.
///
/// Ids start at 1 and are never reused, so a stale id can never resolve to a
/// module created later.
#[derive(Debug, Default, Clone)]
pub struct ComponentTable {
    // Index 0 corresponds to id 1.
    slots: Vec<Option<ModuleRef>>,
    live: usize,
}

impl ComponentTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest id handed out so far (0 if none).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn last_id(&self) -> ComponentId {
        ComponentId(self.slots.len() as u32)
    }
}

impl ComponentRegistry for ComponentTable {
    fn register_component(&mut self, module: ModuleRef) -> ComponentId {
        self.slots.push(Some(module));
        self.live += 1;
        self.last_id()
    }

    fn deregister_component(&mut self, id: ComponentId) {
        let Some(index) = (id.0 as usize).checked_sub(1) else {
            return;
        };
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.take().is_some() {
                self.live -= 1;
            }
        }
    }

    fn lookup_component(&self, id: ComponentId) -> Option<ModuleRef> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.slots.get(index).copied().flatten()
    }

    fn registered_count(&self) -> usize {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_are_not_reused() {
        let mut table = ComponentTable::new();
        let a = table.register_component(ModuleRef::new(0, 0));
        let b = table.register_component(ModuleRef::new(1, 0));
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);

        table.deregister_component(a);
        assert_eq!(table.lookup_component(a), None);
        assert_eq!(table.lookup_component(b), Some(ModuleRef::new(1, 0)));

        let c = table.register_component(ModuleRef::new(0, 1));
        assert_eq!(c.raw(), 3);
        assert_eq!(table.registered_count(), 2);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut table = ComponentTable::new();
        table.deregister_component(ComponentId::new(0));
        table.deregister_component(ComponentId::new(42));
        assert_eq!(table.lookup_component(ComponentId::new(0)), None);
        assert_eq!(table.registered_count(), 0);
    }

    #[test]
    fn component_id_display() {
        assert_eq!(ComponentId::new(12).to_string(), "#12");
    }
}
