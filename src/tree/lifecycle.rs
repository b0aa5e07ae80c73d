//! Lifecycle drivers: parameter finalization, build, multi-stage initialize,
//! activity, finish, pre-delete and deletion.
//!
//! Every user callback runs through [`ModuleTree::with_behavior`]: the behavior
//! object is moved out of its node, the module is pushed on the context stack,
//! and after the call both are restored and any deletion that was deferred
//! because its subtree was busy is carried out.

use std::mem;
use std::rc::Rc;

use log::{debug, trace, warn};

use super::{ContextType, ModuleRef, ModuleTree, SubmoduleCursor};
use crate::error::{DeleteRequest, LifecycleError, ModelError, ModelResult};
use crate::gate::{GateDirection, GateRef};
use crate::module::{ModuleBehavior, ModuleContext, ModuleState};
use crate::notify::{DeletedModuleInfo, PostModelChange, PreModelChange};
use crate::registry::ComponentId;

/// How a [`ModuleTree::run_activity`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// The activity returned and its module still exists.
    Completed,
    /// The module was deleted (typically by itself); carries its former id.
    Deleted(ComponentId),
}

impl ModuleTree {
    fn switch_context_type(&mut self, context_type: ContextType) -> ContextType {
        mem::replace(&mut self.context_type, context_type)
    }

    /// Runs `call` with `module` on the context stack.
    ///
    /// A self-deletion whose target is gone once the stack unwound to here is
    /// consumed and reported as `Ok(None)`.
    fn in_context<R>(
        &mut self,
        module: ModuleRef,
        call: impl FnOnce(&mut Self) -> ModelResult<R>,
    ) -> ModelResult<Option<R>> {
        self.context.push(module);
        let result = call(self);
        self.context.pop();
        let flushed = self.flush_pending_deletions();
        let result = match result {
            Ok(value) => Ok(Some(value)),
            Err(ModelError::SelfDeletion(req)) if !self.contains(req.module) => {
                trace!("deletion of {} ({}) completed by driver", req.module, req.id);
                Ok(None)
            }
            Err(e) => Err(e),
        };
        let value = result?;
        flushed?;
        Ok(value)
    }

    /// Invokes a behavior callback of `module` with a [`ModuleContext`].
    ///
    /// Returns `Ok(None)` when the callback was skipped (the module's behavior
    /// is already running further up the stack) or when it ended in a
    /// completed self-deletion.
    pub(crate) fn with_behavior<R>(
        &mut self,
        module: ModuleRef,
        call: impl FnOnce(&mut dyn ModuleBehavior, &mut ModuleContext<'_>) -> ModelResult<R>,
    ) -> ModelResult<Option<R>> {
        let Some(mut behavior) = self.node_mut(module)?.behavior.take() else {
            warn!(
                "callback of module {} re-entered while already running, skipped",
                self.full_path(module)
            );
            return Ok(None);
        };
        self.in_context(module, |tree| {
            let result = {
                let mut ctx = ModuleContext::new(tree, module);
                call(behavior.as_mut(), &mut ctx)
            };
            if let Some(node) = tree.arena.get_mut(module) {
                node.behavior = Some(behavior);
            }
            result
        })
    }

    // ---------------------------------------------------------------------
    // Finalize and build
    // ---------------------------------------------------------------------

    /// Finalizes the module's parameters: applies a configured display name
    /// and calls the type's finalization hook. Allowed once.
    pub fn finalize_parameters(&mut self, module: ModuleRef) -> ModelResult<()> {
        if self.node(module)?.parameters_finalized {
            return Err(LifecycleError::AlreadyFinalized {
                module: self.full_path(module),
            }
            .into());
        }
        let path = self.full_path(module);
        if let Some(display) = self.config.display_names.get(&path).cloned() {
            self.node_mut(module)?.display_name = Some(display);
        }
        let module_type = Rc::clone(self.node(module)?.module_type());
        self.in_context(module, |tree| module_type.finalize_parameters(tree, module))?;
        if let Some(node) = self.arena.get_mut(module) {
            node.parameters_finalized = true;
        }
        Ok(())
    }

    /// Builds the module's internals through its type. Allowed once.
    pub fn build_inside(&mut self, module: ModuleRef) -> ModelResult<()> {
        let node = self.node(module)?;
        if node.built {
            return Err(LifecycleError::AlreadyBuilt {
                module: self.full_path(module),
            }
            .into());
        }
        if !node.parameters_finalized {
            self.finalize_parameters(module)?;
        }
        let module_type = Rc::clone(self.node(module)?.module_type());
        self.node_mut(module)?.built = true;
        self.in_context(module, |tree| module_type.build_inside(tree, module))?;
        let Some(node) = self.arena.get_mut(module) else {
            return Ok(());
        };
        node.state = ModuleState::Built;
        debug!("built module {}", self.full_path(module));
        self.emit_post(module, &PostModelChange::ModuleBuilt { module });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Initialization
    // ---------------------------------------------------------------------

    /// Initializes the subtree of `module`: channel stage k, then module
    /// stage k, for k = 0, 1, ... until neither side asks for more.
    pub fn call_initialize(&mut self, module: ModuleRef) -> ModelResult<()> {
        self.node(module)?;
        let previous = self.switch_context_type(ContextType::Initialize);
        let result = self.run_all_stages(module);
        self.context_type = previous;
        result
    }

    fn run_all_stages(&mut self, module: ModuleRef) -> ModelResult<()> {
        let (mut more_channels, mut more_modules) = (true, true);
        let mut stage = 0;
        while more_channels || more_modules {
            if more_channels {
                more_channels = self.initialize_channels(module, stage)?;
            }
            if more_modules {
                more_modules = self.initialize_modules(module, stage)?;
            }
            stage += 1;
        }
        Ok(())
    }

    /// Runs one initialization stage over the subtree. Returns true if more
    /// stages remain.
    pub fn call_initialize_stage(&mut self, module: ModuleRef, stage: usize) -> ModelResult<bool> {
        self.node(module)?;
        let previous = self.switch_context_type(ContextType::Initialize);
        let result = self.run_stage(module, stage);
        self.context_type = previous;
        result
    }

    fn run_stage(&mut self, module: ModuleRef, stage: usize) -> ModelResult<bool> {
        let more_channels = self.initialize_channels(module, stage)?;
        let more_modules = self.initialize_modules(module, stage)?;
        Ok(more_channels || more_modules)
    }

    fn initialize_channels(&mut self, module: ModuleRef, stage: usize) -> ModelResult<bool> {
        if !self.contains(module) {
            return Ok(false);
        }
        let mut more = false;
        let mut cursor = super::ChannelCursor::new(self, module);
        while let Some(source) = cursor.next(self) {
            if let Some(channel) = self.channel_mut(source) {
                more |= channel.initialize_stage(stage)?;
            }
        }
        let children: Vec<ModuleRef> = self.node(module)?.submodules.iter().collect();
        for child in children {
            more |= self.initialize_channels(child, stage)?;
        }
        Ok(more)
    }

    fn initialize_modules(&mut self, module: ModuleRef, stage: usize) -> ModelResult<bool> {
        if !self.contains(module) {
            return Ok(false);
        }
        if stage == 0 && !self.node(module)?.built {
            self.build_inside(module)?;
        }
        let Some(node) = self.arena.get(module) else {
            return Ok(false);
        };
        let (id, stages, initialized) = (node.id, node.num_init_stages(), node.initialized);
        if !initialized && stage < stages {
            self.node_mut(module)?.state = ModuleState::Initializing { stage };
            trace!("initialize({stage}) of {}", self.full_path(module));
            self.with_behavior(module, |behavior, ctx| behavior.initialize(ctx, stage))?;
            if self.lookup(id) != Some(module) {
                trace!("module {id} deleted during its own initialization");
                return Ok(false);
            }
        }

        let mut more = stage + 1 < stages;
        self.scan_epoch += 1;
        let epoch = self.scan_epoch;
        loop {
            let mut restart = false;
            let mut cursor = SubmoduleCursor::new(self, module);
            while let Some(child) = cursor.next(self) {
                let Some(node) = self.arena.get(child) else {
                    continue;
                };
                if node.scan_marker == epoch {
                    continue;
                }
                let child_id = node.id;
                more |= self.initialize_modules(child, stage)?;
                if self.lookup(child_id) != Some(child) {
                    restart = true;
                    break;
                }
                if let Some(node) = self.arena.get_mut(child) {
                    node.scan_marker = epoch;
                }
                if cursor.is_stale(self) {
                    restart = true;
                    break;
                }
            }
            if self.lookup(id) != Some(module) {
                return Ok(false);
            }
            if !restart {
                // Modules inserted into vector holes behind the cursor.
                let node = self.node(module)?;
                restart = node
                    .submodules
                    .iter()
                    .any(|c| self.arena.get(c).is_some_and(|n| n.scan_marker != epoch));
            }
            if !restart {
                break;
            }
            trace!("restarting submodule scan of {} at stage {stage}", self.full_path(module));
        }

        if !more {
            let node = self.node_mut(module)?;
            let first = !node.initialized;
            node.initialized = true;
            if first {
                node.state = ModuleState::Initialized;
                self.emit_post(module, &PostModelChange::ModuleInitialized { module });
            }
        }
        Ok(more)
    }

    // ---------------------------------------------------------------------
    // Run
    // ---------------------------------------------------------------------

    /// Switches to the event context and marks initialized modules running.
    pub fn begin_run(&mut self) {
        self.context_type = ContextType::Event;
        let handles: Vec<ModuleRef> = self.arena.handles().collect();
        for handle in handles {
            if let Some(node) = self.arena.get_mut(handle) {
                if node.initialized && node.state == ModuleState::Initialized {
                    node.state = ModuleState::Running;
                }
            }
        }
    }

    /// Runs the module's activity as the single active execution context.
    pub fn run_activity(&mut self, module: ModuleRef) -> ModelResult<ActivityOutcome> {
        let id = self.node(module)?.id;
        if let Some(active) = self.activity {
            return Err(LifecycleError::ActivityAlreadyActive {
                active: self.full_path(active),
                requested: self.full_path(module),
            }
            .into());
        }
        self.activity = Some(module);
        let result = self.with_behavior(module, |behavior, ctx| behavior.activity(ctx));
        self.activity = None;
        let flushed = self.flush_pending_deletions();
        match result {
            Err(ModelError::SelfDeletion(req)) if !self.contains(req.module) => {}
            other => {
                other?;
            }
        }
        flushed?;
        if self.contains(module) {
            Ok(ActivityOutcome::Completed)
        } else {
            debug!("activity of module {id} ended with its deletion");
            Ok(ActivityOutcome::Deleted(id))
        }
    }

    // ---------------------------------------------------------------------
    // Finish and pre-delete
    // ---------------------------------------------------------------------

    /// Calls `finish` post-order over the subtree.
    pub fn call_finish(&mut self, module: ModuleRef) -> ModelResult<()> {
        self.node(module)?;
        let previous = self.switch_context_type(ContextType::Finish);
        let result = self.finish_subtree(module);
        self.context_type = previous;
        result
    }

    fn finish_subtree(&mut self, module: ModuleRef) -> ModelResult<()> {
        let (sources, children) = self.channels_and_children(module)?;
        for source in sources {
            if let Some(channel) = self.channel_mut(source) {
                channel.finish()?;
            }
        }
        for child in children {
            if self.contains(child) {
                self.finish_subtree(child)?;
            }
        }
        let Some(node) = self.arena.get_mut(module) else {
            return Ok(());
        };
        node.state = ModuleState::Finishing;
        self.with_behavior(module, |behavior, ctx| behavior.finish(ctx))?;
        if let Some(node) = self.arena.get_mut(module) {
            node.state = ModuleState::Finished;
        }
        Ok(())
    }

    /// Calls `pre_delete(root)` post-order over the subtree.
    pub fn call_pre_delete(&mut self, module: ModuleRef, root: ModuleRef) -> ModelResult<()> {
        self.node(module)?;
        let previous = self.switch_context_type(ContextType::Cleanup);
        let result = self.pre_delete_subtree(module, root);
        self.context_type = previous;
        result
    }

    fn pre_delete_subtree(&mut self, module: ModuleRef, root: ModuleRef) -> ModelResult<()> {
        let (sources, children) = self.channels_and_children(module)?;
        for source in sources {
            if let Some(channel) = self.channel_mut(source) {
                channel.pre_delete()?;
            }
        }
        for child in children {
            if self.contains(child) {
                self.pre_delete_subtree(child, root)?;
            }
        }
        let Some(node) = self.arena.get_mut(module) else {
            return Ok(());
        };
        node.state = ModuleState::PreDeleting;
        self.with_behavior(module, |behavior, ctx| behavior.pre_delete(ctx, root))?;
        Ok(())
    }

    fn channels_and_children(&self, module: ModuleRef) -> ModelResult<(Vec<GateRef>, Vec<ModuleRef>)> {
        let node = self.node(module)?;
        Ok((node.channels.clone(), node.submodules.iter().collect()))
    }

    // ---------------------------------------------------------------------
    // Deletion
    // ---------------------------------------------------------------------

    fn is_busy(&self, module: ModuleRef) -> bool {
        self.context
            .iter()
            .chain(self.activity.iter())
            .any(|&m| self.contains_module(module, m))
    }

    /// Deletes `module` and its subtree.
    ///
    /// When the subtree contains a module whose callback or activity is
    /// running, the deletion is deferred and `Err(ModelError::SelfDeletion)`
    /// is returned; the caller should propagate it out of the callback.
    pub fn delete_module(&mut self, module: ModuleRef) -> ModelResult<()> {
        let node = self.node(module)?;
        if node.deleting {
            return Ok(());
        }
        if self.system == Some(module) && self.context_type != ContextType::Cleanup {
            return Err(LifecycleError::DeleteSystemModule {
                module: self.full_path(module),
            }
            .into());
        }
        let request = DeleteRequest {
            module,
            id: node.id,
        };
        if self.is_busy(module) {
            if !self.pending_deletions.iter().any(|r| r.module == module) {
                self.pending_deletions.push(request);
            }
            trace!("deletion of {} ({}) deferred to the enclosing driver", self.full_path(module), request.id);
            return Err(ModelError::SelfDeletion(request));
        }
        self.call_pre_delete(module, module)?;
        if self.contains(module) {
            self.do_delete(module)?;
        }
        Ok(())
    }

    /// Deletes the system module in the cleanup context.
    pub fn delete_network(&mut self) -> ModelResult<()> {
        let Some(system) = self.system else {
            return Ok(());
        };
        let previous = self.switch_context_type(ContextType::Cleanup);
        let result = self.delete_module(system);
        self.context_type = previous;
        result
    }

    /// Carries out deferred deletions whose subtree is no longer busy.
    pub(crate) fn flush_pending_deletions(&mut self) -> ModelResult<()> {
        loop {
            let arena = &self.arena;
            self.pending_deletions.retain(|r| arena.contains(r.module));
            let Some(pos) = self
                .pending_deletions
                .iter()
                .position(|r| !self.is_busy(r.module))
            else {
                return Ok(());
            };
            let request = self.pending_deletions.remove(pos);
            trace!("performing deferred deletion of {} ({})", request.module, request.id);
            self.delete_module(request.module)?;
        }
    }

    fn disconnect_links(&mut self, module: ModuleRef, outside_only: bool) -> ModelResult<()> {
        for gate in self.gate_refs(module)? {
            let Ok(resolved) = self.resolve_gate(gate) else {
                continue;
            };
            let (prev, next) = match (outside_only, resolved.direction()) {
                (false, _) => (resolved.prev(), resolved.next()),
                (true, GateDirection::Input) => (resolved.prev(), None),
                (true, GateDirection::Output) => (None, resolved.next()),
            };
            if next.is_some() {
                self.disconnect(gate)?;
            }
            if let Some(prev) = prev {
                self.disconnect(prev)?;
            }
        }
        Ok(())
    }

    fn do_delete(&mut self, module: ModuleRef) -> ModelResult<()> {
        self.node_mut(module)?.deleting = true;
        self.emit_pre(module, &PreModelChange::ModuleDelete { module });

        self.disconnect_links(module, true)?;

        let (scalars, elements): (Vec<ModuleRef>, Vec<ModuleRef>) = {
            let store = &self.node(module)?.submodules;
            (store.scalars().collect(), store.vector_elements().collect())
        };
        for child in scalars.into_iter().chain(elements) {
            if self.contains(child) {
                self.do_delete(child)?;
            }
        }

        self.disconnect_links(module, false)?;

        let slots = self.node(module)?.gates.descs().len();
        for slot in (0..slots).rev() {
            self.dispose_gate_slot(module, slot)?;
        }
        self.release_listeners(module);

        let info = {
            let node = self.node(module)?;
            DeletedModuleInfo {
                module,
                former_id: node.id,
                type_name: node.type_name().to_string(),
                name: node.name.clone(),
                parent: node.parent,
                vector_size: self.vector_size(module),
                index: node.index,
            }
        };
        let path = self.full_path(module);
        match info.parent {
            Some(_) => {
                self.detach(module)?;
            }
            None if self.system == Some(module) => self.system = None,
            None => {}
        }
        self.registry.deregister_component(info.former_id);

        self.context.push(module);
        let removed = self.arena.remove(module);
        self.context.pop();
        drop(removed);

        debug!("deleted module {path} ({})", info.former_id);
        if let Some(parent) = info.parent {
            self.emit_post(parent, &PostModelChange::ModuleDeleted(info));
        }
        Ok(())
    }
}
