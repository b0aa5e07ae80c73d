//! # simtree - hierarchical module/gate model for discrete-event simulation
//!
//! simtree holds the runtime structure of a simulation model: a tree of
//! modules, each with named gates (scalar or vector) that are linked into
//! connections carrying channels. It owns the lifecycle of that structure,
//! from creation and build through multi-stage initialization, running,
//! finish and deletion, and keeps it consistent while user callbacks mutate it.
//!
//! ## Core Concepts
//!
//! - **ModuleTree**: arena owning every module; all structural operations go through it
//! - **Module**: a tree node with a gate table and a submodule store
//! - **Gate**: a directional endpoint addressed by a packed 32-bit [`GateId`]
//! - **Channel**: the object mediating one connection, owned by its source gate
//! - **Notifications**: pre/post change events delivered to subscribed listeners
//!
//! ## Usage
//!
//! ```rust
//! use simtree::{GateType, ModuleTree, ModuleTypeBuilder};
//!
//! # fn main() -> simtree::ModelResult<()> {
//! let net = ModuleTypeBuilder::new("Net").build();
//! let host = ModuleTypeBuilder::new("Host")
//!     .simple()
//!     .gate("port", GateType::Inout, true)
//!     .gate_vector_size("port", 2)
//!     .build();
//!
//! let mut tree = ModuleTree::default();
//! let root = tree.create_module(&net, "net", None, None)?;
//! tree.add_submodule_vector(root, "host", 2)?;
//! let h0 = tree.create_module(&host, "host", Some(root), Some(0))?;
//! let h1 = tree.create_module(&host, "host", Some(root), Some(1))?;
//!
//! let out = tree.gate(h0, "port$o", Some(0))?;
//! let inp = tree.gate(h1, "port$i", Some(0))?;
//! tree.connect(out, inp, None)?;
//!
//! tree.call_initialize(root)?;
//! assert_eq!(tree.full_path(h1), "net.host[1]");
//! assert_eq!(tree.find_module("net.host[0]"), Some(h0));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod config;
pub mod error;
pub mod gate;
pub mod module;
pub mod notify;
pub mod registry;
pub mod tree;

// Re-export primary types at crate root for convenience
pub use channel::{Channel, ChannelBehavior, IdealChannel};
pub use config::ModelConfig;
pub use error::{
    DeleteRequest, GateIdError, LifecycleError, ModelError, ModelResult, PathError,
    StructureError,
};
pub use gate::{Gate, GateDirection, GateId, GateLimits, GateRef, GateTable, GateType};
pub use module::{
    Compound, Module, ModuleBehavior, ModuleContext, ModuleState, ModuleType, ModuleTypeBuilder,
};
pub use notify::{
    ChannelSink, DeletedModuleInfo, ListenerId, ModelChangeRecord, ModelListener,
    PostModelChange, PreModelChange,
};
pub use registry::{ComponentId, ComponentRegistry, ComponentTable};
pub use tree::{
    ActivityOutcome, ChannelCursor, ContextType, ModuleRef, ModuleTree, SubmoduleCursor,
};
