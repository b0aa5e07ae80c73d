//! Error types for simtree.
//!
//! All errors are strongly typed using thiserror. Structural conflicts, stale
//! identifiers, lifecycle violations and path failures are separate families so
//! callers can match on the condition they care about. Self-deletion is not a
//! failure at all: it is a control transfer consumed by the nearest driver.

use thiserror::Error;

use crate::gate::GateId;
use crate::registry::ComponentId;
use crate::tree::ModuleRef;

/// Structural conflicts: duplicate names, occupied or connected slots, and
/// connections that violate the module hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("'{name}' is not a valid name (expected an identifier)")]
    InvalidName { name: String },

    #[error("gate '{gate}' already present")]
    DuplicateGate { gate: String },

    #[error("wrong gate name '{gate}', must not contain the '$i' or '$o' suffix")]
    ReservedGateSuffix { gate: String },

    #[error("no such gate or gate vector: '{gate}'")]
    NoSuchGate { gate: String },

    #[error("gate '{gate}' is not a gate vector")]
    NotAGateVector { gate: String },

    #[error("scalar gate '{gate}' referenced with index {index}")]
    ScalarGateIndexed { gate: String, index: usize },

    #[error("no gate index specified when accessing vector gate '{gate}'")]
    MissingGateIndex { gate: String },

    #[error("gate index {index} out of range when accessing vector gate '{gate}[]' with size {size}")]
    GateIndexOutOfRange { gate: String, index: usize, size: usize },

    #[error("inout gate '{gate}' cannot be referenced without $i/$o suffix")]
    InoutWithoutSuffix { gate: String },

    #[error("cannot delete one half of an inout gate: '{gate}'")]
    HalfGateDelete { gate: String },

    #[error("cannot delete gate '{gate}', it is still connected")]
    GateStillConnected { gate: String },

    #[error("cannot shrink gate vector {gate}[] to size {new_size}, gate {gate}[{index}] still connected")]
    ShrinkConnectedGate { gate: String, new_size: usize, index: usize },

    #[error("cannot add gate '{gate}': too many {kind} gates (limit is {limit})")]
    TooManyGates { gate: String, kind: &'static str, limit: usize },

    #[error("vector size for gate {gate}[] too large ({size}), limit is {limit}")]
    GateVectorTooLarge { gate: String, size: usize, limit: usize },

    #[error("gate {gate} is already connected")]
    GateAlreadyConnected { gate: String },

    #[error("gate {gate} is not connected")]
    GateNotConnected { gate: String },

    #[error("illegal connection {from} --> {to}: {reason}")]
    IllegalConnection { from: String, to: String, reason: String },

    #[error("module '{parent}' already has a submodule or submodule vector named '{name}'")]
    DuplicateSubmodule { parent: String, name: String },

    #[error("module '{parent}' has no submodule vector named '{name}'")]
    NoSuchSubmoduleVector { parent: String, name: String },

    #[error("cannot insert '{name}[{index}]' into '{parent}': index is out of range (vector size is {size})")]
    SubmoduleIndexOutOfRange { parent: String, name: String, index: usize, size: usize },

    #[error("cannot insert '{name}[{index}]' into '{parent}': vector index already occupied")]
    SubmoduleSlotOccupied { parent: String, name: String, index: usize },

    #[error("cannot shrink submodule vector '{parent}.{name}[]' to size {new_size}: submodule '{name}[{index}]' still exists")]
    ShrinkOccupiedVector { parent: String, name: String, new_size: usize, index: usize },

    #[error("cannot delete submodule vector '{parent}.{name}[]': submodule '{name}[{index}]' still exists")]
    VectorStillOccupied { parent: String, name: String, index: usize },

    #[error("module '{module}' is not a submodule of '{parent}'")]
    NotASubmodule { parent: String, module: String },

    #[error("cannot move module '{module}' under one of its own submodules")]
    ReparentUnderDescendant { module: String },

    #[error("gates of module '{module}' must not be connected when reparenting ({gate} is connected)")]
    ReparentConnected { module: String, gate: String },

    #[error("gate '{gate}' is not connected {side}")]
    UnconnectedGate { gate: String, side: &'static str },
}

/// Gate identifier failures.
///
/// `Garbage` means the id can never have been produced by the table; `OutOfRange`
/// means the id is well-formed but the vector it points into has since shrunk
/// (or the index was computed past the end).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateIdError {
    #[error("invalid gate id {id}")]
    Garbage { id: GateId },

    #[error("invalid gate id {id}: size of '{gate}[]' is only {size}, so index {index} (deduced from the id) is out of bounds")]
    OutOfRange {
        id: GateId,
        gate: String,
        size: usize,
        index: usize,
    },
}

/// Operations attempted in the wrong lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("module {module} does not exist (deleted or never created)")]
    ModuleNotFound { module: ModuleRef },

    #[error("build_inside() already called for module '{module}'")]
    AlreadyBuilt { module: String },

    #[error("parameters of module '{module}' are already finalized")]
    AlreadyFinalized { module: String },

    #[error("a system module already exists")]
    SystemModuleExists,

    #[error("it is not allowed to delete the system module '{module}' during simulation")]
    DeleteSystemModule { module: String },

    #[error("module '{module}' is not detached")]
    NotDetached { module: String },

    #[error("the system module cannot be reparented")]
    ReparentSystemModule,

    #[error("activity of module '{active}' is already running, cannot start '{requested}'")]
    ActivityAlreadyActive { active: String, requested: String },

    #[error("module '{module}' was destroyed outside the deletion protocol")]
    DirectDestruction { module: String },
}

/// Path resolution failures. Soft lookups turn these into `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("module '{path}' not found")]
    NotFound { path: String },

    #[error("syntax error in path '{path}': {reason}")]
    Syntax { path: String, reason: String },
}

/// A deferred deletion: the target's subtree contains the active execution
/// context, so the deletion completes once control is back in an outer driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Root of the subtree to delete.
    pub module: ModuleRef,
    /// Its component id at the time of the request.
    pub id: ComponentId,
}

/// Top-level error type for simtree.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Structural conflict: {0}")]
    Structure(#[from] StructureError),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] GateIdError),

    #[error("Illegal lifecycle operation: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Path resolution failure: {0}")]
    Path(#[from] PathError),

    #[error("Deletion of module {} ({}) transferred to the enclosing driver", .0.id, .0.module)]
    SelfDeletion(DeleteRequest),

    #[error("Error in module '{module}': {message}")]
    Callback { module: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ModelError {
    /// Creates a callback error on behalf of user code.
    #[must_use]
    pub fn callback(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Callback {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true for structural conflicts.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Structure(_))
    }

    /// Returns true for invalid gate identifiers.
    #[must_use]
    pub const fn is_invalid_identifier(&self) -> bool {
        matches!(self, Self::InvalidIdentifier(_))
    }

    /// Returns true for lifecycle violations.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }

    /// Returns true for path resolution failures.
    #[must_use]
    pub const fn is_path(&self) -> bool {
        matches!(self, Self::Path(_))
    }

    /// Returns true if this value is a self-deletion control transfer rather
    /// than an error.
    #[must_use]
    pub const fn is_control_transfer(&self) -> bool {
        matches!(self, Self::SelfDeletion(_))
    }
}

/// Result type alias for simtree operations.
pub type ModelResult<T> = Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_error_shrink_message() {
        let err = StructureError::ShrinkConnectedGate {
            gate: "out".to_string(),
            new_size: 2,
            index: 3,
        };
        let msg = format!("{err}");
        assert!(msg.contains("out[3]"));
        assert!(msg.contains("size 2"));
    }

    #[test]
    fn test_gate_id_error_distinguishes_out_of_range() {
        let garbage = GateIdError::Garbage { id: GateId::from_raw(0xdead_beef) };
        let range = GateIdError::OutOfRange {
            id: GateId::from_raw(0x0010_0004),
            gate: "port".to_string(),
            size: 2,
            index: 4,
        };
        assert!(format!("{garbage}").starts_with("invalid gate id"));
        assert!(format!("{range}").contains("size of 'port[]' is only 2"));
        assert_ne!(garbage, GateIdError::Garbage { id: GateId::from_raw(1) });
    }

    #[test]
    fn test_model_error_from_structure() {
        let err: ModelError = StructureError::DuplicateGate { gate: "in".to_string() }.into();
        assert!(err.is_structural());
        assert!(!err.is_control_transfer());
        assert!(format!("{err}").contains("Structural conflict"));
    }

    #[test]
    fn test_model_error_from_lifecycle() {
        let err: ModelError = LifecycleError::AlreadyBuilt { module: "net.a".to_string() }.into();
        assert!(err.is_lifecycle());
        assert!(format!("{err}").contains("net.a"));
    }

    #[test]
    fn test_model_error_from_path() {
        let err: ModelError = PathError::NotFound { path: "net.x".to_string() }.into();
        assert!(err.is_path());
    }

    #[test]
    fn test_self_deletion_is_control_transfer() {
        let err = ModelError::SelfDeletion(DeleteRequest {
            module: ModuleRef::new(3, 0),
            id: ComponentId::new(7),
        });
        assert!(err.is_control_transfer());
        assert!(format!("{err}").contains("#7"));
    }

    #[test]
    fn test_callback_error() {
        let err = ModelError::callback("net.host", "boom");
        let msg = format!("{err}");
        assert!(msg.contains("net.host"));
        assert!(msg.contains("boom"));
    }
}
