use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::{ModuleBehavior, ModuleType, SubmoduleStore};
use crate::gate::{GateRef, GateTable};
use crate::registry::ComponentId;
use crate::tree::ModuleRef;

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleState {
    /// Created but not (yet) inserted under a parent.
    Detached,
    Inserted,
    Built,
    Initializing { stage: usize },
    Initialized,
    Running,
    Finishing,
    Finished,
    PreDeleting,
}

/// A node of the module tree.
pub struct Module {
    pub(crate) id: ComponentId,
    handle: ModuleRef,
    pub(crate) name: String,
    pub(crate) index: Option<usize>,
    pub(crate) display_name: Option<String>,
    pub(crate) parent: Option<ModuleRef>,
    module_type: Rc<dyn ModuleType>,
    pub(crate) behavior: Option<Box<dyn ModuleBehavior>>,
    pub(crate) gates: GateTable,
    pub(crate) submodules: SubmoduleStore,
    /// Source gates of the connections this module contains.
    pub(crate) channels: Vec<GateRef>,
    pub(crate) channel_removals: u64,
    pub(crate) state: ModuleState,
    pub(crate) parameters_finalized: bool,
    pub(crate) built: bool,
    pub(crate) initialized: bool,
    pub(crate) deleting: bool,
    pub(crate) scan_marker: u64,
    pub(crate) full_path: OnceCell<String>,
}

impl Module {
    pub(crate) fn new(
        handle: ModuleRef,
        id: ComponentId,
        name: &str,
        index: Option<usize>,
        module_type: Rc<dyn ModuleType>,
    ) -> Self {
        let behavior = module_type.create_behavior();
        Self {
            id,
            handle,
            name: name.to_string(),
            index,
            display_name: None,
            parent: None,
            module_type,
            behavior: Some(behavior),
            gates: GateTable::new(handle),
            submodules: SubmoduleStore::new(),
            channels: Vec::new(),
            channel_removals: 0,
            state: ModuleState::Detached,
            parameters_finalized: false,
            built: false,
            initialized: false,
            deleting: false,
            scan_marker: 0,
            full_path: OnceCell::new(),
        }
    }

    /// Registry id; changes when the module is reparented.
    #[must_use]
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// Arena handle; never changes.
    #[must_use]
    pub const fn handle(&self) -> ModuleRef {
        self.handle
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name`, or `name[index]` for vector elements.
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.index {
            Some(index) => format!("{}[{index}]", self.name),
            None => self.name.clone(),
        }
    }

    /// Index within its submodule vector.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        self.index
    }

    #[must_use]
    pub const fn is_vector(&self) -> bool {
        self.index.is_some()
    }

    #[must_use]
    pub const fn parent(&self) -> Option<ModuleRef> {
        self.parent
    }

    #[must_use]
    pub const fn state(&self) -> ModuleState {
        self.state
    }

    #[must_use]
    pub fn module_type(&self) -> &Rc<dyn ModuleType> {
        &self.module_type
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.module_type.type_name()
    }

    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.module_type.is_simple()
    }

    /// Display name, falling back to the plain name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub const fn parameters_finalized(&self) -> bool {
        self.parameters_finalized
    }

    #[must_use]
    pub const fn is_built(&self) -> bool {
        self.built
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub const fn is_deleting(&self) -> bool {
        self.deleting
    }

    #[must_use]
    pub const fn gates(&self) -> &GateTable {
        &self.gates
    }

    #[must_use]
    pub const fn submodules(&self) -> &SubmoduleStore {
        &self.submodules
    }

    /// Source gates of the connections contained in this module.
    #[must_use]
    pub fn channels(&self) -> &[GateRef] {
        &self.channels
    }

    pub(crate) fn num_init_stages(&self) -> usize {
        self.behavior.as_ref().map_or(0, |b| b.num_init_stages())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("name", &self.full_name())
            .field("type", &self.type_name())
            .field("parent", &self.parent)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
