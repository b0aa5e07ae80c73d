//! The module tree: arena, registry, listeners, and every structural operation.
//!
//! `ModuleTree` owns all modules in a generational arena. Parents refer to
//! children (and children to their parent) through [`ModuleRef`] handles, so
//! structural change never invalidates a handle that still names a live
//! module. All mutation goes through the tree, which keeps the registry, the
//! listener set and the cached paths consistent and emits a pre/post change
//! notification around each operation.

mod arena;
mod fingerprint;
mod iter;
mod lifecycle;
mod path;

use std::rc::Rc;

use log::{debug, trace, warn};

use crate::channel::Channel;
use crate::config::ModelConfig;
use crate::error::{DeleteRequest, LifecycleError, ModelError, ModelResult, StructureError};
use crate::gate::{
    Gate, GateDirection, GateId, GateLimits, GateRef, GateType, UnconnectedProbe,
};
use crate::module::{validate_name, Module, ModuleState, ModuleType, StoreConflict};
use crate::notify::{ListenerId, ModelListener, PostModelChange, PreModelChange};
use crate::registry::{ComponentId, ComponentRegistry, ComponentTable};

pub use arena::ModuleRef;
pub use iter::{ChannelCursor, SubmoduleCursor};
pub use lifecycle::ActivityOutcome;

pub(crate) use arena::ModuleArena;

/// What kind of code is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextType {
    /// Parameter finalization and `build_inside`.
    Build,
    /// Multi-stage initialization.
    Initialize,
    /// Event processing and activities.
    Event,
    /// `finish` callbacks.
    Finish,
    /// Network teardown; the only context that may delete the system module.
    Cleanup,
}

struct Subscription {
    id: ListenerId,
    module: ModuleRef,
    listener: Box<dyn ModelListener>,
}

/// Owner of a module hierarchy.
pub struct ModuleTree {
    config: ModelConfig,
    limits: GateLimits,
    arena: ModuleArena,
    registry: Box<dyn ComponentRegistry>,
    system: Option<ModuleRef>,
    context_type: ContextType,
    /// Modules whose callbacks are currently on the stack, innermost last.
    context: Vec<ModuleRef>,
    activity: Option<ModuleRef>,
    pending_deletions: Vec<DeleteRequest>,
    listeners: Vec<Subscription>,
    next_listener_id: u64,
    scan_epoch: u64,
}

impl Default for ModuleTree {
    fn default() -> Self {
        Self::build(ModelConfig::default(), Box::new(ComponentTable::new()))
    }
}

impl ModuleTree {
    /// Creates an empty tree after validating `config`.
    pub fn new(config: ModelConfig) -> ModelResult<Self> {
        Self::with_registry(config, Box::new(ComponentTable::new()))
    }

    /// Creates an empty tree that allocates component ids from `registry`.
    pub fn with_registry(
        config: ModelConfig,
        registry: Box<dyn ComponentRegistry>,
    ) -> ModelResult<Self> {
        config.validate()?;
        Ok(Self::build(config, registry))
    }

    fn build(config: ModelConfig, registry: Box<dyn ComponentRegistry>) -> Self {
        Self {
            limits: GateLimits::from_config(&config),
            config,
            arena: ModuleArena::default(),
            registry,
            system: None,
            context_type: ContextType::Build,
            context: Vec::new(),
            activity: None,
            pending_deletions: Vec::new(),
            listeners: Vec::new(),
            next_listener_id: 1,
            scan_epoch: 0,
        }
    }

    /// Configuration the tree was created with.
    #[must_use]
    pub const fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Gate limits derived from the configuration.
    #[must_use]
    pub const fn gate_limits(&self) -> GateLimits {
        self.limits
    }

    /// The root of the tree.
    #[must_use]
    pub const fn system_module(&self) -> Option<ModuleRef> {
        self.system
    }

    /// Kind of code currently running.
    #[must_use]
    pub const fn context_type(&self) -> ContextType {
        self.context_type
    }

    /// Module whose callback is innermost on the stack.
    #[must_use]
    pub fn context_module(&self) -> Option<ModuleRef> {
        self.context.last().copied()
    }

    /// Module whose activity is running.
    #[must_use]
    pub const fn activity_module(&self) -> Option<ModuleRef> {
        self.activity
    }

    /// Number of live modules, detached ones included.
    #[must_use]
    pub fn module_count(&self) -> usize {
        self.arena.len()
    }

    /// Module by handle; `None` once it was deleted.
    #[must_use]
    pub fn module(&self, module: ModuleRef) -> Option<&Module> {
        self.arena.get(module)
    }

    /// Whether `module` is still alive.
    #[must_use]
    pub fn contains(&self, module: ModuleRef) -> bool {
        self.arena.contains(module)
    }

    /// Registry that hands out component ids.
    #[must_use]
    pub fn registry(&self) -> &dyn ComponentRegistry {
        self.registry.as_ref()
    }

    /// Resolves a component id through the registry.
    #[must_use]
    pub fn lookup(&self, id: ComponentId) -> Option<ModuleRef> {
        self.registry.lookup_component(id)
    }

    pub(crate) fn node(&self, module: ModuleRef) -> ModelResult<&Module> {
        self.arena
            .get(module)
            .ok_or_else(|| LifecycleError::ModuleNotFound { module }.into())
    }

    pub(crate) fn node_mut(&mut self, module: ModuleRef) -> ModelResult<&mut Module> {
        self.arena
            .get_mut(module)
            .ok_or_else(|| LifecycleError::ModuleNotFound { module }.into())
    }

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    /// Subscribes `listener` at `module`; it sees events of the whole subtree.
    pub fn subscribe(
        &mut self,
        module: ModuleRef,
        listener: impl ModelListener + 'static,
    ) -> ModelResult<ListenerId> {
        self.node(module)?;
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push(Subscription {
            id,
            module,
            listener: Box::new(listener),
        });
        Ok(id)
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|s| s.id != id);
        self.listeners.len() != before
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn lineage(&self, module: ModuleRef) -> Vec<ModuleRef> {
        let mut chain = Vec::new();
        let mut current = Some(module);
        while let Some(m) = current {
            chain.push(m);
            current = self.arena.get(m).and_then(Module::parent);
        }
        chain
    }

    pub(crate) fn emit_pre(&mut self, at: ModuleRef, change: &PreModelChange) {
        if self.listeners.is_empty() {
            return;
        }
        let chain = self.lineage(at);
        for sub in self.listeners.iter_mut().filter(|s| chain.contains(&s.module)) {
            sub.listener.pre_model_change(change);
        }
    }

    pub(crate) fn emit_post(&mut self, at: ModuleRef, change: &PostModelChange) {
        if self.listeners.is_empty() {
            return;
        }
        let chain = self.lineage(at);
        for sub in self.listeners.iter_mut().filter(|s| chain.contains(&s.module)) {
            sub.listener.post_model_change(change);
        }
    }

    fn release_listeners(&mut self, module: ModuleRef) {
        self.listeners.retain(|s| s.module != module);
    }

    // ---------------------------------------------------------------------
    // Module creation and placement
    // ---------------------------------------------------------------------

    fn allocate(
        &mut self,
        module_type: &Rc<dyn ModuleType>,
        name: &str,
        index: Option<usize>,
    ) -> ModuleRef {
        let ty = Rc::clone(module_type);
        let handle = self
            .arena
            .insert_with(|h| Module::new(h, ComponentId::new(0), name, index, ty));
        let id = self.registry.register_component(handle);
        if let Some(node) = self.arena.get_mut(handle) {
            node.id = id;
        }
        handle
    }

    /// Undoes `allocate` (and `attach`) for a module whose creation failed.
    fn discard_unfinished(&mut self, handle: ModuleRef) {
        let Some(node) = self.arena.get_mut(handle) else {
            return;
        };
        node.deleting = true;
        let id = node.id;
        if self.system == Some(handle) {
            self.system = None;
        }
        if let Err(e) = self.detach(handle) {
            warn!("could not unlink unfinished module {handle}: {e}");
        }
        self.release_listeners(handle);
        self.registry.deregister_component(id);
        drop(self.arena.remove(handle));
        trace!("discarded unfinished module {handle} ({id})");
    }

    fn store_error(&self, parent: ModuleRef, conflict: StoreConflict, name: &str, index: Option<usize>) -> ModelError {
        conflict
            .into_error(self.full_path(parent), name, index, 0)
            .into()
    }

    /// Creates a module, inserts it under `parent` (or installs it as the
    /// system module when `parent` is `None`) and declares its gates.
    pub fn create_module(
        &mut self,
        module_type: &Rc<dyn ModuleType>,
        name: &str,
        parent: Option<ModuleRef>,
        index: Option<usize>,
    ) -> ModelResult<ModuleRef> {
        validate_name(name)?;
        match parent {
            Some(parent) => {
                self.node(parent)?
                    .submodules
                    .check_insert(name, index)
                    .map_err(|c| self.store_error(parent, c, name, index))?;
                self.emit_pre(
                    parent,
                    &PreModelChange::ModuleAdd {
                        parent: Some(parent),
                        type_name: module_type.type_name().to_string(),
                        name: name.to_string(),
                        index,
                    },
                );
            }
            None if self.system.is_some() => return Err(LifecycleError::SystemModuleExists.into()),
            None => {}
        }

        let handle = self.allocate(module_type, name, index);
        match parent {
            Some(parent) => {
                if let Err(e) = self.attach(parent, handle) {
                    self.discard_unfinished(handle);
                    return Err(e);
                }
            }
            None => {
                self.system = Some(handle);
                self.node_mut(handle)?.state = ModuleState::Inserted;
            }
        }
        if let Err(e) = Rc::clone(module_type).add_gates(self, handle) {
            self.discard_unfinished(handle);
            return Err(e);
        }
        debug!(
            "created module {} ({}) of type {}",
            self.full_path(handle),
            self.node(handle)?.id,
            module_type.type_name()
        );
        self.emit_post(handle, &PostModelChange::ModuleAdded { module: handle });
        Ok(handle)
    }

    /// Creates a module that has no parent yet; see [`ModuleTree::insert_submodule`].
    pub fn create_detached(
        &mut self,
        module_type: &Rc<dyn ModuleType>,
        name: &str,
        index: Option<usize>,
    ) -> ModelResult<ModuleRef> {
        validate_name(name)?;
        let handle = self.allocate(module_type, name, index);
        if let Err(e) = Rc::clone(module_type).add_gates(self, handle) {
            self.discard_unfinished(handle);
            return Err(e);
        }
        debug!("created detached module {name} of type {}", module_type.type_name());
        Ok(handle)
    }

    fn is_detached(&self, module: ModuleRef) -> ModelResult<bool> {
        Ok(self.node(module)?.parent.is_none() && self.system != Some(module))
    }

    /// Inserts a detached module under `parent`, at the place its name and
    /// index designate.
    pub fn insert_submodule(&mut self, parent: ModuleRef, child: ModuleRef) -> ModelResult<()> {
        self.node(parent)?;
        if !self.is_detached(child)? {
            return Err(LifecycleError::NotDetached {
                module: self.full_path(child),
            }
            .into());
        }
        if self.contains_module(child, parent) {
            return Err(StructureError::ReparentUnderDescendant {
                module: self.full_path(child),
            }
            .into());
        }
        let (name, index, type_name) = {
            let node = self.node(child)?;
            (node.name.clone(), node.index, node.type_name().to_string())
        };
        self.node(parent)?
            .submodules
            .check_insert(&name, index)
            .map_err(|c| self.store_error(parent, c, &name, index))?;
        self.emit_pre(
            parent,
            &PreModelChange::ModuleAdd {
                parent: Some(parent),
                type_name,
                name,
                index,
            },
        );
        self.attach(parent, child)?;
        self.emit_post(child, &PostModelChange::ModuleAdded { module: child });
        Ok(())
    }

    fn attach(&mut self, parent: ModuleRef, child: ModuleRef) -> ModelResult<()> {
        let (name, index) = {
            let node = self.node(child)?;
            (node.name.clone(), node.index)
        };
        let inserted = self.node_mut(parent)?.submodules.insert(&name, index, child);
        inserted.map_err(|c| self.store_error(parent, c, &name, index))?;
        let node = self.node_mut(child)?;
        node.parent = Some(parent);
        if node.state == ModuleState::Detached {
            node.state = ModuleState::Inserted;
        }
        self.invalidate_paths(child);
        Ok(())
    }

    fn detach(&mut self, child: ModuleRef) -> ModelResult<Option<ModuleRef>> {
        let (parent, name, index) = {
            let node = self.node(child)?;
            (node.parent, node.name.clone(), node.index)
        };
        if let Some(parent) = parent {
            let removed = self.node_mut(parent)?.submodules.remove(&name, index, child);
            removed.map_err(|c| self.store_error(parent, c, &name, index))?;
            self.node_mut(child)?.parent = None;
            self.invalidate_paths(child);
        }
        Ok(parent)
    }

    /// Takes `child` out of `parent` without deleting it.
    pub fn remove_submodule(&mut self, parent: ModuleRef, child: ModuleRef) -> ModelResult<()> {
        if self.node(child)?.parent != Some(parent) {
            return Err(StructureError::NotASubmodule {
                parent: self.full_path(parent),
                module: self.full_path(child),
            }
            .into());
        }
        self.detach(child)?;
        let node = self.node_mut(child)?;
        if node.state == ModuleState::Inserted {
            node.state = ModuleState::Detached;
        }
        debug!("removed {} from its parent", node.full_name());
        Ok(())
    }

    /// Moves `module` under `new_parent`.
    ///
    /// The module's gates must be unconnected on the outside, and the new
    /// parent must not lie in the module's subtree. Component ids of the whole
    /// subtree are reassigned.
    pub fn change_parent(&mut self, module: ModuleRef, new_parent: ModuleRef) -> ModelResult<()> {
        if self.system == Some(module) {
            return Err(LifecycleError::ReparentSystemModule.into());
        }
        self.node(new_parent)?;
        let node = self.node(module)?;
        if let Some(gate) = node.gates.iter().find(|g| g.is_connected_outside()) {
            return Err(StructureError::ReparentConnected {
                module: self.full_path(module),
                gate: node.gates.gate_full_name(gate.id()),
            }
            .into());
        }
        if self.contains_module(module, new_parent) {
            return Err(StructureError::ReparentUnderDescendant {
                module: self.full_path(module),
            }
            .into());
        }
        let Some(old_parent) = node.parent else {
            return Err(StructureError::NotASubmodule {
                parent: "(none)".to_string(),
                module: node.full_name(),
            }
            .into());
        };
        let (name, index) = (node.name.clone(), node.index);
        self.node(new_parent)?
            .submodules
            .check_insert(&name, index)
            .map_err(|c| self.store_error(new_parent, c, &name, index))?;

        self.emit_pre(new_parent, &PreModelChange::ModuleReparent { module, new_parent });
        self.detach(module)?;
        self.attach(new_parent, module)?;
        let old_id = self.node(module)?.id;
        self.reassign_ids(module);
        debug!(
            "moved module {} ({} -> {})",
            self.full_path(module),
            old_id,
            self.node(module)?.id
        );
        self.emit_post(
            new_parent,
            &PostModelChange::ModuleReparented {
                module,
                old_parent,
                old_id,
            },
        );
        Ok(())
    }

    fn reassign_ids(&mut self, module: ModuleRef) {
        let Some(node) = self.arena.get(module) else {
            return;
        };
        let old = node.id;
        let children: Vec<ModuleRef> = node.submodules.iter().collect();
        self.registry.deregister_component(old);
        let id = self.registry.register_component(module);
        if let Some(node) = self.arena.get_mut(module) {
            node.id = id;
        }
        for child in children {
            self.reassign_ids(child);
        }
    }

    /// Renames a module, keeping its vector index.
    pub fn set_name(&mut self, module: ModuleRef, name: &str) -> ModelResult<()> {
        let index = self.node(module)?.index;
        self.set_name_and_index(module, name, index)
    }

    /// Renames a module and changes its vector index in one step.
    pub fn set_name_and_index(
        &mut self,
        module: ModuleRef,
        name: &str,
        index: Option<usize>,
    ) -> ModelResult<()> {
        validate_name(name)?;
        let (parent, old_name, old_index) = {
            let node = self.node(module)?;
            (node.parent, node.name.clone(), node.index)
        };
        if let Some(parent) = parent {
            if (old_name.as_str(), old_index) != (name, index) {
                self.node(parent)?
                    .submodules
                    .check_insert(name, index)
                    .map_err(|c| self.store_error(parent, c, name, index))?;
            }
            self.detach(module)?;
        }
        {
            let node = self.node_mut(module)?;
            node.name = name.to_string();
            node.index = index;
        }
        if let Some(parent) = parent {
            self.attach(parent, module)?;
        }
        self.invalidate_paths(module);
        debug!("renamed module {old_name} to {}", self.full_path(module));
        Ok(())
    }

    /// Sets (or with `None`, clears) the display name.
    pub fn set_display_name(&mut self, module: ModuleRef, name: Option<&str>) -> ModelResult<()> {
        self.node_mut(module)?.display_name = name.map(str::to_string);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Submodule queries and vectors
    // ---------------------------------------------------------------------

    /// Adds an empty submodule vector of `size` slots.
    pub fn add_submodule_vector(&mut self, parent: ModuleRef, name: &str, size: usize) -> ModelResult<()> {
        validate_name(name)?;
        let result = self.node_mut(parent)?.submodules.add_vector(name, size);
        result.map_err(|c| self.store_error(parent, c, name, None))?;
        debug!("added submodule vector {}.{name}[{size}]", self.full_path(parent));
        Ok(())
    }

    /// Deletes an empty submodule vector.
    pub fn delete_submodule_vector(&mut self, parent: ModuleRef, name: &str) -> ModelResult<()> {
        let result = self.node_mut(parent)?.submodules.delete_vector(name);
        result.map_err(|c| self.store_error(parent, c, name, None))?;
        Ok(())
    }

    /// Resizes a submodule vector. Shrinking must not drop a live module.
    pub fn set_submodule_vector_size(&mut self, parent: ModuleRef, name: &str, size: usize) -> ModelResult<()> {
        let result = self.node_mut(parent)?.submodules.set_vector_size(name, size);
        result.map_err(|c| {
            ModelError::from(c.into_error(self.full_path(parent), name, None, size))
        })
    }

    /// Scalar submodule (`index == None`) or submodule vector element.
    #[must_use]
    /// Submodule `name` (or `name[index]`) of `parent`.
    pub fn get_submodule(&self, parent: ModuleRef, name: &str, index: Option<usize>) -> Option<ModuleRef> {
        self.arena.get(parent)?.submodules.get(name, index)
    }

    #[must_use]
    pub fn has_submodule(&self, parent: ModuleRef, name: &str, index: Option<usize>) -> bool {
        self.get_submodule(parent, name, index).is_some()
    }

    /// Component id of a submodule.
    #[must_use]
    pub fn find_submodule(&self, parent: ModuleRef, name: &str, index: Option<usize>) -> Option<ComponentId> {
        let child = self.get_submodule(parent, name, index)?;
        self.arena.get(child).map(Module::id)
    }

    #[must_use]
    pub fn has_submodules(&self, parent: ModuleRef) -> bool {
        self.arena
            .get(parent)
            .is_some_and(|m| m.submodules.has_submodules())
    }

    #[must_use]
    pub fn has_submodule_vector(&self, parent: ModuleRef, name: &str) -> bool {
        self.arena
            .get(parent)
            .is_some_and(|m| m.submodules.vector(name).is_some())
    }

    /// Size of submodule vector `name`, holes included.
    pub fn submodule_vector_size(&self, parent: ModuleRef, name: &str) -> ModelResult<usize> {
        self.node(parent)?.submodules.vector_size(name).ok_or_else(|| {
            StructureError::NoSuchSubmoduleVector {
                parent: self.full_path(parent),
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn submodule_vector_names(&self, parent: ModuleRef) -> ModelResult<Vec<String>> {
        Ok(self.node(parent)?.submodules.vector_names())
    }

    /// Scalar submodule names, then submodule vector names.
    pub fn submodule_names(&self, parent: ModuleRef) -> ModelResult<Vec<String>> {
        Ok(self.node(parent)?.submodules.names())
    }

    /// Size of the submodule vector `module` belongs to.
    #[must_use]
    pub fn vector_size(&self, module: ModuleRef) -> Option<usize> {
        let node = self.arena.get(module)?;
        node.index?;
        let parent = self.arena.get(node.parent?)?;
        parent.submodules.vector_size(&node.name)
    }

    /// True if `module` is `ancestor` or lies in its subtree.
    #[must_use]
    pub fn contains_module(&self, ancestor: ModuleRef, module: ModuleRef) -> bool {
        let mut current = Some(module);
        while let Some(m) = current {
            if m == ancestor {
                return true;
            }
            current = self.arena.get(m).and_then(Module::parent);
        }
        false
    }

    // ---------------------------------------------------------------------
    // Gates
    // ---------------------------------------------------------------------

    /// Adds a gate or gate vector. Returns the created gate for scalar input
    /// and output gates, `None` for inout gates and vectors.
    pub fn add_gate(
        &mut self,
        module: ModuleRef,
        name: &str,
        gate_type: GateType,
        is_vector: bool,
    ) -> ModelResult<Option<GateRef>> {
        self.node(module)?
            .gates
            .check_add(name, is_vector, &self.limits)?;
        self.emit_pre(
            module,
            &PreModelChange::GateAdd {
                module,
                name: name.to_string(),
                gate_type,
                is_vector,
            },
        );
        let slot = self.node_mut(module)?.gates.add(name, gate_type, is_vector);
        debug!(
            "added {gate_type} gate {}.{name}{}",
            self.full_path(module),
            if is_vector { "[]" } else { "" }
        );
        self.emit_post(
            module,
            &PostModelChange::GateAdded {
                module,
                name: name.to_string(),
            },
        );
        let created = match (is_vector, gate_type) {
            (false, GateType::Input) => Some(GateId::scalar(slot, GateDirection::Input)),
            (false, GateType::Output) => Some(GateId::scalar(slot, GateDirection::Output)),
            _ => None,
        };
        Ok(created.map(|id| GateRef::new(module, id)))
    }

    /// Grows or shrinks a gate vector. A shrink that would drop a connected
    /// gate fails and leaves the vector untouched.
    pub fn set_gate_size(&mut self, module: ModuleRef, name: &str, size: usize) -> ModelResult<()> {
        let (slot, old_size) = self
            .node(module)?
            .gates
            .check_resize(name, size, &self.limits)?;
        self.emit_pre(
            module,
            &PreModelChange::GateVectorResize {
                module,
                name: name.to_string(),
                new_size: size,
            },
        );
        self.node_mut(module)?.gates.resize(slot, size);
        debug!("resized gate vector {}.{name}[] {old_size} -> {size}", self.full_path(module));
        self.emit_post(
            module,
            &PostModelChange::GateVectorResized {
                module,
                name: name.to_string(),
                old_size,
            },
        );
        Ok(())
    }

    /// Deletes a scalar gate or a whole gate vector; all of its gates must be
    /// unconnected.
    pub fn delete_gate(&mut self, module: ModuleRef, name: &str) -> ModelResult<()> {
        let slot = self.node(module)?.gates.check_delete(name)?;
        self.dispose_gate_slot(module, slot)
    }

    fn dispose_gate_slot(&mut self, module: ModuleRef, slot: usize) -> ModelResult<()> {
        let (name, gate_type, is_vector, size) = {
            let Some(desc) = self.node(module)?.gates.desc(slot) else {
                return Ok(());
            };
            let Some(name) = desc.name() else {
                return Ok(());
            };
            (name.to_string(), desc.gate_type(), desc.is_vector(), desc.size())
        };
        self.emit_pre(
            module,
            &PreModelChange::GateDelete {
                module,
                name: name.clone(),
            },
        );
        self.node_mut(module)?.gates.dispose(slot);
        debug!("deleted gate {}.{name}", self.full_path(module));
        self.emit_post(
            module,
            &PostModelChange::GateDeleted {
                module,
                name,
                gate_type,
                is_vector,
                vector_size: is_vector.then_some(size),
            },
        );
        Ok(())
    }

    /// Looks up a gate by name (`$i`/`$o` accepted) and index.
    pub fn gate(&self, module: ModuleRef, name: &str, index: Option<usize>) -> ModelResult<GateRef> {
        let id = self.node(module)?.gates.lookup(name, index)?;
        Ok(GateRef::new(module, id))
    }

    /// Soft variant of [`ModuleTree::gate`].
    #[must_use]
    pub fn find_gate(&self, module: ModuleRef, name: &str, index: Option<usize>) -> Option<GateId> {
        self.arena.get(module)?.gates.find(name, index)
    }

    /// Resolves a gate id of `module`.
    pub fn gate_by_id(&self, module: ModuleRef, id: GateId) -> ModelResult<&Gate> {
        Ok(self.node(module)?.gates.gate(id)?)
    }

    /// Resolves a gate handle.
    pub fn resolve_gate(&self, gate: GateRef) -> ModelResult<&Gate> {
        self.gate_by_id(gate.module, gate.id)
    }

    fn gate_mut(&mut self, gate: GateRef) -> ModelResult<&mut Gate> {
        Ok(self.node_mut(gate.module)?.gates.gate_mut(gate.id)?)
    }

    /// Id of the first element (or the only gate) under `name`.
    pub fn gate_base_id(&self, module: ModuleRef, name: &str) -> ModelResult<GateId> {
        Ok(self.node(module)?.gates.base_id(name)?)
    }

    /// One half of a gate addressed by its base name.
    pub fn gate_half(
        &self,
        module: ModuleRef,
        name: &str,
        direction: GateDirection,
        index: Option<usize>,
    ) -> ModelResult<GateRef> {
        let id = self.node(module)?.gates.half(name, direction, index)?;
        Ok(GateRef::new(module, id))
    }

    #[must_use]
    pub fn has_gate(&self, module: ModuleRef, name: &str, index: Option<usize>) -> bool {
        self.arena
            .get(module)
            .is_some_and(|m| m.gates.has_gate(name, index))
    }

    #[must_use]
    pub fn has_gate_vector(&self, module: ModuleRef, name: &str) -> bool {
        self.arena
            .get(module)
            .is_some_and(|m| m.gates.has_gate_vector(name))
    }

    pub fn is_gate_vector(&self, module: ModuleRef, name: &str) -> ModelResult<bool> {
        Ok(self.node(module)?.gates.is_gate_vector(name)?)
    }

    pub fn gate_type(&self, module: ModuleRef, name: &str) -> ModelResult<GateType> {
        Ok(self.node(module)?.gates.gate_type(name)?)
    }

    pub fn gate_size(&self, module: ModuleRef, name: &str) -> ModelResult<usize> {
        Ok(self.node(module)?.gates.gate_size(name)?)
    }

    /// Base names of the gates, in declaration order.
    pub fn gate_names(&self, module: ModuleRef) -> ModelResult<Vec<String>> {
        Ok(self.node(module)?.gates.names())
    }

    /// Number of gates, counting each vector element and inout half.
    pub fn gate_count(&self, module: ModuleRef) -> ModelResult<usize> {
        Ok(self.node(module)?.gates.count())
    }

    /// The `k`-th gate in iteration order.
    #[must_use]
    pub fn gate_by_ordinal(&self, module: ModuleRef, k: usize) -> Option<GateRef> {
        self.arena.get(module)?.gates.by_ordinal(k).map(Gate::gate_ref)
    }

    #[must_use]
    pub fn has_gates(&self, module: ModuleRef) -> bool {
        self.arena.get(module).is_some_and(|m| m.gates.has_gates())
    }

    /// `module.path.gate[3]`.
    #[must_use]
    pub fn gate_full_path(&self, gate: GateRef) -> String {
        let name = self
            .arena
            .get(gate.module)
            .map(|m| m.gates.gate_full_name(gate.id))
            .unwrap_or_default();
        format!("{}.{name}", self.full_path(gate.module))
    }

    /// First gate of vector `name` that is unconnected on the given side.
    ///
    /// `suffix` selects the half of an inout vector when `name` carries none.
    /// With `expand`, a fully connected vector grows by one element and the
    /// new gate is returned; without it, `None` means no free gate exists.
    pub fn get_or_create_first_unconnected_gate(
        &mut self,
        module: ModuleRef,
        name: &str,
        suffix: Option<GateDirection>,
        inside: bool,
        expand: bool,
    ) -> ModelResult<Option<GateRef>> {
        let probe = self
            .node(module)?
            .gates
            .probe_unconnected(name, suffix, inside)?;
        let direction = probe.direction.unwrap_or(GateDirection::Input);
        let Some(index) = self.settle_probe(module, &probe, expand)? else {
            return Ok(None);
        };
        Ok(Some(GateRef::new(
            module,
            GateId::vector(probe.slot, direction, index),
        )))
    }

    /// Inout variant of [`ModuleTree::get_or_create_first_unconnected_gate`]:
    /// returns the first index where both halves are unconnected.
    pub fn get_or_create_first_unconnected_gate_pair(
        &mut self,
        module: ModuleRef,
        name: &str,
        inside: bool,
        expand: bool,
    ) -> ModelResult<Option<(GateRef, GateRef)>> {
        let probe = self
            .node(module)?
            .gates
            .probe_unconnected_pair(name, inside)?;
        let Some(index) = self.settle_probe(module, &probe, expand)? else {
            return Ok(None);
        };
        Ok(Some((
            GateRef::new(module, GateId::vector(probe.slot, GateDirection::Input, index)),
            GateRef::new(module, GateId::vector(probe.slot, GateDirection::Output, index)),
        )))
    }

    fn settle_probe(
        &mut self,
        module: ModuleRef,
        probe: &UnconnectedProbe,
        expand: bool,
    ) -> ModelResult<Option<usize>> {
        if let Some(index) = probe.hit {
            return Ok(Some(index));
        }
        if expand {
            self.set_gate_size(module, &probe.name, probe.size + 1)?;
            return Ok(Some(probe.size));
        }
        Ok(probe.fallback)
    }

    // ---------------------------------------------------------------------
    // Connections
    // ---------------------------------------------------------------------

    /// Module that contains a `from -> to` connection, or why there is none.
    fn connection_owner(&self, from: &Gate, to: &Gate) -> Result<ModuleRef, &'static str> {
        use GateDirection::{Input, Output};

        let (fm, tm) = (from.owner(), to.owner());
        let parent_of = |m: ModuleRef| self.arena.get(m).and_then(Module::parent);
        let (fd, td) = (from.direction(), to.direction());
        if fm == tm {
            return match (fd, td) {
                (Input, Output) => Ok(fm),
                _ => Err("a connection inside a module must lead from an input to an output gate"),
            };
        }
        if parent_of(tm) == Some(fm) {
            return match (fd, td) {
                (Input, Input) => Ok(fm),
                _ => Err("a parent-to-submodule connection must lead from an input to an input gate"),
            };
        }
        if parent_of(fm) == Some(tm) {
            return match (fd, td) {
                (Output, Output) => Ok(tm),
                _ => Err("a submodule-to-parent connection must lead from an output to an output gate"),
            };
        }
        match (parent_of(fm), parent_of(tm)) {
            (Some(a), Some(b)) if a == b => match (fd, td) {
                (Output, Input) => Ok(a),
                _ => Err("a connection between siblings must lead from an output to an input gate"),
            },
            _ => Err("gates are not in a parent, child, or sibling relation"),
        }
    }

    /// Connects `from` to `to`, attaching `channel` (if any) to the link.
    pub fn connect(&mut self, from: GateRef, to: GateRef, channel: Option<Channel>) -> ModelResult<()> {
        let owner = {
            let src = self.resolve_gate(from)?;
            let dst = self.resolve_gate(to)?;
            if src.next().is_some() {
                return Err(StructureError::GateAlreadyConnected {
                    gate: self.gate_full_path(from),
                }
                .into());
            }
            if dst.prev().is_some() {
                return Err(StructureError::GateAlreadyConnected {
                    gate: self.gate_full_path(to),
                }
                .into());
            }
            self.connection_owner(src, dst).map_err(|reason| {
                ModelError::from(StructureError::IllegalConnection {
                    from: self.gate_full_path(from),
                    to: self.gate_full_path(to),
                    reason: reason.to_string(),
                })
            })?
        };

        self.emit_pre(owner, &PreModelChange::GateConnect { from, to });
        self.gate_mut(from)?.set_next(Some(to));
        self.gate_mut(to)?.set_prev(Some(from));
        if let Some(mut channel) = channel {
            channel.set_owner(owner);
            self.gate_mut(from)?.set_channel(Some(channel));
            self.node_mut(owner)?.channels.push(from);
        }
        debug!("connected {} --> {}", self.gate_full_path(from), self.gate_full_path(to));
        self.emit_post(owner, &PostModelChange::GateConnected { from, to });
        Ok(())
    }

    /// Removes the link leaving `from`, together with its channel.
    pub fn disconnect(&mut self, from: GateRef) -> ModelResult<()> {
        let (to, owner) = {
            let src = self.resolve_gate(from)?;
            let Some(to) = src.next() else {
                return Err(StructureError::GateNotConnected {
                    gate: self.gate_full_path(from),
                }
                .into());
            };
            let owner = match src.channel().and_then(Channel::owner) {
                Some(owner) => owner,
                None => {
                    let dst = self.resolve_gate(to)?;
                    self.connection_owner(src, dst).unwrap_or(from.module)
                }
            };
            (to, owner)
        };

        self.emit_pre(owner, &PreModelChange::GateDisconnect { from, to });
        if let Some(channel) = self.gate_mut(from)?.channel_mut() {
            channel.pre_delete()?;
        }
        let channel = self.gate_mut(from)?.set_channel(None);
        self.gate_mut(from)?.set_next(None);
        if let Ok(dst) = self.gate_mut(to) {
            dst.set_prev(None);
        }
        if channel.is_some() {
            if let Some(node) = self.arena.get_mut(owner) {
                node.channels.retain(|g| *g != from);
                node.channel_removals += 1;
            }
        }
        debug!("disconnected {} --> {}", self.gate_full_path(from), self.gate_full_path(to));
        self.emit_post(owner, &PostModelChange::GateDisconnected { from, to });
        Ok(())
    }

    /// Checks that every gate of a compound module is connected inside and
    /// every gate of its submodules is connected outside.
    pub fn check_internal_connections(&self, module: ModuleRef) -> ModelResult<()> {
        let node = self.node(module)?;
        if !node.is_simple() {
            if let Some(gate) = node.gates.iter().find(|g| !g.is_connected_inside()) {
                return Err(StructureError::UnconnectedGate {
                    gate: self.gate_full_path(gate.gate_ref()),
                    side: "inside",
                }
                .into());
            }
        }
        for child in node.submodules.iter() {
            let Some(child_node) = self.arena.get(child) else {
                continue;
            };
            if let Some(gate) = child_node.gates.iter().find(|g| !g.is_connected_outside()) {
                return Err(StructureError::UnconnectedGate {
                    gate: self.gate_full_path(gate.gate_ref()),
                    side: "outside",
                }
                .into());
            }
        }
        Ok(())
    }

    pub(crate) fn channel_mut(&mut self, source: GateRef) -> Option<&mut Channel> {
        self.arena
            .get_mut(source.module)?
            .gates
            .gate_mut(source.id)
            .ok()?
            .channel_mut()
    }
}
