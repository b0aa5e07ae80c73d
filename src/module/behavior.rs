//! Module behavior, module types, and the callback context.
//!
//! A [`ModuleType`] describes how modules of a kind are declared and built; a
//! [`ModuleBehavior`] is the per-instance object whose callbacks the lifecycle
//! driver runs. Callbacks get a [`ModuleContext`], which dereferences to the
//! tree so user code can create, connect, and delete modules re-entrantly.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::error::ModelResult;
use crate::gate::GateType;
use crate::tree::{ModuleRef, ModuleTree};

/// Per-instance behavior of a module.
///
/// All callbacks default to doing nothing. Returning
/// [`crate::ModelError::SelfDeletion`] (usually by propagating the result of
/// [`ModuleContext::delete_self`] with `?`) is not a failure: the driver
/// completes the deletion once the callback has returned.
pub trait ModuleBehavior {
    /// Number of initialization stages this module takes part in.
    fn num_init_stages(&self) -> usize {
        1
    }

    fn initialize(&mut self, _ctx: &mut ModuleContext<'_>, _stage: usize) -> ModelResult<()> {
        Ok(())
    }

    fn finish(&mut self, _ctx: &mut ModuleContext<'_>) -> ModelResult<()> {
        Ok(())
    }

    /// Called before the subtree rooted at `root` is deleted.
    fn pre_delete(&mut self, _ctx: &mut ModuleContext<'_>, _root: ModuleRef) -> ModelResult<()> {
        Ok(())
    }

    /// Body of a simple module, run as the active execution context.
    fn activity(&mut self, _ctx: &mut ModuleContext<'_>) -> ModelResult<()> {
        Ok(())
    }
}

/// Behavior of compound modules without callbacks of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct Compound;

impl ModuleBehavior for Compound {}

/// A kind of module.
pub trait ModuleType {
    fn type_name(&self) -> &str;

    /// Simple modules have behavior of their own and no internal structure.
    fn is_simple(&self) -> bool {
        false
    }

    fn create_behavior(&self) -> Box<dyn ModuleBehavior> {
        Box::new(Compound)
    }

    /// Declares the gates of a freshly created module.
    fn add_gates(&self, _tree: &mut ModuleTree, _module: ModuleRef) -> ModelResult<()> {
        Ok(())
    }

    /// Parameter-finalization hook, invoked once before build.
    fn finalize_parameters(&self, _tree: &mut ModuleTree, _module: ModuleRef) -> ModelResult<()> {
        Ok(())
    }

    /// Creates submodules and internal connections. Invoked once per module.
    fn build_inside(&self, _tree: &mut ModuleTree, _module: ModuleRef) -> ModelResult<()> {
        Ok(())
    }
}

type BehaviorFactory = Box<dyn Fn() -> Box<dyn ModuleBehavior>>;
type TreeHook = Box<dyn Fn(&mut ModuleTree, ModuleRef) -> ModelResult<()>>;

#[derive(Debug, Clone)]
struct GateDecl {
    name: String,
    gate_type: GateType,
    is_vector: bool,
}

/// Builds closure-backed [`ModuleType`]s.
///
/// ```
/// use simtree::{GateType, ModuleType, ModuleTypeBuilder};
///
/// let host = ModuleTypeBuilder::new("Host")
///     .simple()
///     .gate("in", GateType::Input, false)
///     .gate("port", GateType::Inout, true)
///     .gate_vector_size("port", 2)
///     .build();
/// assert_eq!(host.type_name(), "Host");
/// assert!(host.is_simple());
/// ```
pub struct ModuleTypeBuilder {
    name: String,
    simple: bool,
    gates: Vec<GateDecl>,
    sizes: BTreeMap<String, usize>,
    behavior: Option<BehaviorFactory>,
    build: Option<TreeHook>,
    finalize: Option<TreeHook>,
}

impl ModuleTypeBuilder {
    /// Starts a compound module type named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            simple: false,
            gates: Vec::new(),
            sizes: BTreeMap::new(),
            behavior: None,
            build: None,
            finalize: None,
        }
    }

    /// Marks the type as a simple module.
    #[must_use]
    pub fn simple(mut self) -> Self {
        self.simple = true;
        self
    }

    /// Declares a gate, or a gate vector of size 0.
    #[must_use]
    pub fn gate(mut self, name: impl Into<String>, gate_type: GateType, is_vector: bool) -> Self {
        self.gates.push(GateDecl {
            name: name.into(),
            gate_type,
            is_vector,
        });
        self
    }

    /// Initial size of a declared gate vector.
    #[must_use]
    pub fn gate_vector_size(mut self, name: impl Into<String>, size: usize) -> Self {
        self.sizes.insert(name.into(), size);
        self
    }

    /// Factory for the per-instance callbacks.
    #[must_use]
    pub fn behavior<B, F>(mut self, factory: F) -> Self
    where
        B: ModuleBehavior + 'static,
        F: Fn() -> B + 'static,
    {
        self.behavior = Some(Box::new(move || Box::new(factory())));
        self
    }

    /// Hook run by `build_inside` once parameters are final.
    #[must_use]
    pub fn build_with(
        mut self,
        hook: impl Fn(&mut ModuleTree, ModuleRef) -> ModelResult<()> + 'static,
    ) -> Self {
        self.build = Some(Box::new(hook));
        self
    }

    /// Hook run by `finalize_parameters`.
    #[must_use]
    pub fn finalize_with(
        mut self,
        hook: impl Fn(&mut ModuleTree, ModuleRef) -> ModelResult<()> + 'static,
    ) -> Self {
        self.finalize = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> Rc<dyn ModuleType> {
        Rc::new(ClosureModuleType {
            name: self.name,
            simple: self.simple,
            gates: self.gates,
            sizes: self.sizes,
            behavior: self.behavior,
            build: self.build,
            finalize: self.finalize,
        })
    }
}

impl fmt::Debug for ModuleTypeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleTypeBuilder")
            .field("name", &self.name)
            .field("simple", &self.simple)
            .field("gates", &self.gates)
            .finish_non_exhaustive()
    }
}

struct ClosureModuleType {
    name: String,
    simple: bool,
    gates: Vec<GateDecl>,
    sizes: BTreeMap<String, usize>,
    behavior: Option<BehaviorFactory>,
    build: Option<TreeHook>,
    finalize: Option<TreeHook>,
}

impl ModuleType for ClosureModuleType {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn is_simple(&self) -> bool {
        self.simple
    }

    fn create_behavior(&self) -> Box<dyn ModuleBehavior> {
        match &self.behavior {
            Some(factory) => factory(),
            None => Box::new(Compound),
        }
    }

    fn add_gates(&self, tree: &mut ModuleTree, module: ModuleRef) -> ModelResult<()> {
        for decl in &self.gates {
            tree.add_gate(module, &decl.name, decl.gate_type, decl.is_vector)?;
            if let Some(&size) = self.sizes.get(&decl.name) {
                if decl.is_vector && size > 0 {
                    tree.set_gate_size(module, &decl.name, size)?;
                }
            }
        }
        Ok(())
    }

    fn finalize_parameters(&self, tree: &mut ModuleTree, module: ModuleRef) -> ModelResult<()> {
        self.finalize.as_ref().map_or(Ok(()), |hook| hook(tree, module))
    }

    fn build_inside(&self, tree: &mut ModuleTree, module: ModuleRef) -> ModelResult<()> {
        self.build.as_ref().map_or(Ok(()), |hook| hook(tree, module))
    }
}

/// The tree as seen from inside a callback of `module`.
pub struct ModuleContext<'a> {
    tree: &'a mut ModuleTree,
    module: ModuleRef,
}

impl<'a> ModuleContext<'a> {
    pub(crate) fn new(tree: &'a mut ModuleTree, module: ModuleRef) -> Self {
        Self { tree, module }
    }

    /// The module whose callback is running.
    #[must_use]
    pub const fn current(&self) -> ModuleRef {
        self.module
    }

    /// Deletes the running module.
    ///
    /// Always yields `Err(ModelError::SelfDeletion(..))` (unless the module is
    /// already gone); propagate it with `?` and the driver finishes the job.
    pub fn delete_self(&mut self) -> ModelResult<()> {
        self.tree.delete_module(self.module)
    }

    /// Full path of the running module.
    #[must_use]
    pub fn path(&self) -> String {
        self.tree.full_path(self.module)
    }
}

impl Deref for ModuleContext<'_> {
    type Target = ModuleTree;

    fn deref(&self) -> &ModuleTree {
        self.tree
    }
}

impl DerefMut for ModuleContext<'_> {
    fn deref_mut(&mut self) -> &mut ModuleTree {
        self.tree
    }
}
