//! Structural iteration.
//!
//! Borrowing iterators (`gates`, `submodules`, `channels`) hold a shared borrow
//! of the tree, so the structure cannot change underneath them. Drivers that
//! call back into user code, which may mutate the tree, use the cursors
//! instead: a cursor stores only a position and re-reads the store on every
//! step, and reports whether anything was removed since it started.

use super::{ModuleRef, ModuleTree};
use crate::channel::Channel;
use crate::error::ModelResult;
use crate::gate::{Gate, GateRef};
use crate::module::StorePos;

impl ModuleTree {
    /// Gates of `module` in table order; empty if the module is gone.
    pub fn gates(&self, module: ModuleRef) -> impl Iterator<Item = &Gate> + '_ {
        self.arena
            .get(module)
            .into_iter()
            .flat_map(|m| m.gates.iter())
    }

    /// Owned snapshot of the gates of `module`, for walks that mutate.
    pub fn gate_refs(&self, module: ModuleRef) -> ModelResult<Vec<GateRef>> {
        Ok(self.node(module)?.gates.iter().map(Gate::gate_ref).collect())
    }

    /// Submodules of `parent`: scalars, then vector elements.
    pub fn submodules(&self, parent: ModuleRef) -> impl Iterator<Item = ModuleRef> + '_ {
        self.arena
            .get(parent)
            .into_iter()
            .flat_map(|m| m.submodules.iter())
    }

    /// Channels of the connections contained in `module`, with their source gate.
    pub fn channels(&self, module: ModuleRef) -> impl Iterator<Item = (GateRef, &Channel)> + '_ {
        self.arena
            .get(module)
            .into_iter()
            .flat_map(|m| m.channels.iter())
            .filter_map(|source| {
                let gate = self.resolve_gate(*source).ok()?;
                gate.channel().map(|channel| (*source, channel))
            })
    }
}

/// Restartable position in a module's submodule store.
#[derive(Debug, Clone)]
pub struct SubmoduleCursor {
    parent: ModuleRef,
    pos: Option<StorePos>,
    removals: u64,
}

impl SubmoduleCursor {
    #[must_use]
    pub fn new(tree: &ModuleTree, parent: ModuleRef) -> Self {
        Self {
            parent,
            pos: None,
            removals: removal_count(tree, parent),
        }
    }

    /// Next submodule after the current position.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self, tree: &ModuleTree) -> Option<ModuleRef> {
        let store = &tree.module(self.parent)?.submodules;
        let (pos, module) = store.entry_after(self.pos)?;
        self.pos = Some(pos);
        Some(module)
    }

    /// True if a submodule was removed (or the parent deleted) since the
    /// cursor started; positions may have shifted.
    #[must_use]
    pub fn is_stale(&self, tree: &ModuleTree) -> bool {
        !tree.contains(self.parent) || removal_count(tree, self.parent) != self.removals
    }

    /// Goes back to the beginning and accepts the current removal count.
    pub fn restart(&mut self, tree: &ModuleTree) {
        self.pos = None;
        self.removals = removal_count(tree, self.parent);
    }
}

fn removal_count(tree: &ModuleTree, parent: ModuleRef) -> u64 {
    tree.module(parent).map_or(0, |m| m.submodules.removals())
}

/// Restartable position in a module's channel list.
#[derive(Debug, Clone)]
pub struct ChannelCursor {
    module: ModuleRef,
    next: usize,
    removals: u64,
}

impl ChannelCursor {
    #[must_use]
    pub fn new(tree: &ModuleTree, module: ModuleRef) -> Self {
        Self {
            module,
            next: 0,
            removals: channel_removals(tree, module),
        }
    }

    /// Source gate of the next channel.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self, tree: &ModuleTree) -> Option<GateRef> {
        let source = *tree.module(self.module)?.channels.get(self.next)?;
        self.next += 1;
        Some(source)
    }

    #[must_use]
    pub fn is_stale(&self, tree: &ModuleTree) -> bool {
        !tree.contains(self.module) || channel_removals(tree, self.module) != self.removals
    }

    pub fn restart(&mut self, tree: &ModuleTree) {
        self.next = 0;
        self.removals = channel_removals(tree, self.module);
    }
}

fn channel_removals(tree: &ModuleTree, module: ModuleRef) -> u64 {
    tree.module(module).map_or(0, |m| m.channel_removals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateType;
    use crate::module::{ModuleType, ModuleTypeBuilder};
    use std::rc::Rc;

    fn compound() -> Rc<dyn ModuleType> {
        ModuleTypeBuilder::new("Net").build()
    }

    fn node() -> Rc<dyn ModuleType> {
        ModuleTypeBuilder::new("Node")
            .simple()
            .gate("in", GateType::Input, false)
            .gate("out", GateType::Output, false)
            .build()
    }

    #[test]
    fn test_submodule_cursor_detects_removal() {
        let mut tree = ModuleTree::default();
        let root = tree.create_module(&compound(), "net", None, None).unwrap();
        let a = tree.create_module(&node(), "a", Some(root), None).unwrap();
        let b = tree.create_module(&node(), "b", Some(root), None).unwrap();

        let mut cursor = SubmoduleCursor::new(&tree, root);
        assert_eq!(cursor.next(&tree), Some(a));
        assert!(!cursor.is_stale(&tree));

        tree.remove_submodule(root, a).unwrap();
        assert!(cursor.is_stale(&tree));
        cursor.restart(&tree);
        assert!(!cursor.is_stale(&tree));
        assert_eq!(cursor.next(&tree), Some(b));
        assert_eq!(cursor.next(&tree), None);
    }

    #[test]
    fn test_submodule_cursor_sees_appended_modules() {
        let mut tree = ModuleTree::default();
        let root = tree.create_module(&compound(), "net", None, None).unwrap();
        let a = tree.create_module(&node(), "a", Some(root), None).unwrap();
        let mut cursor = SubmoduleCursor::new(&tree, root);
        assert_eq!(cursor.next(&tree), Some(a));
        let b = tree.create_module(&node(), "b", Some(root), None).unwrap();
        assert_eq!(cursor.next(&tree), Some(b));
        assert!(!cursor.is_stale(&tree));
    }

    #[test]
    fn test_channel_cursor_and_snapshots() {
        let mut tree = ModuleTree::default();
        let root = tree.create_module(&compound(), "net", None, None).unwrap();
        let a = tree.create_module(&node(), "a", Some(root), None).unwrap();
        let b = tree.create_module(&node(), "b", Some(root), None).unwrap();
        let out = tree.gate(a, "out", None).unwrap();
        let inp = tree.gate(b, "in", None).unwrap();
        tree.connect(out, inp, Some(Channel::ideal())).unwrap();

        let mut cursor = ChannelCursor::new(&tree, root);
        assert_eq!(cursor.next(&tree), Some(out));
        assert_eq!(cursor.next(&tree), None);
        assert_eq!(tree.channels(root).count(), 1);

        tree.disconnect(out).unwrap();
        assert!(cursor.is_stale(&tree));
        assert_eq!(tree.channels(root).count(), 0);

        assert_eq!(tree.gate_refs(a).unwrap().len(), 2);
        assert_eq!(tree.gates(b).count(), 2);
        assert_eq!(tree.submodules(root).collect::<Vec<_>>(), vec![a, b]);
    }
}
