//! Gates: bit-packed identifiers, descriptor slots, and the per-module table.

mod desc;
mod id;
mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tree::ModuleRef;

pub use desc::{capacity_for, Gate, GateDesc, GateDirection, GateName, GateType};
pub use id::{
    GateAddress, GateId, GATEID_LBITS, MAX_SCALAR_GATES, MAX_VECTOR_GATES, MAX_VECTOR_GATE_SIZE,
    PLAUSIBLE_INDEX_LIMIT,
};
pub use table::{GateLimits, GateTable};
pub(crate) use table::UnconnectedProbe;

/// Tree-wide handle of a gate: owning module plus gate id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GateRef {
    /// Module owning the gate.
    pub module: ModuleRef,
    /// Id within the module's gate table.
    pub id: GateId,
}

impl GateRef {
    #[must_use]
    pub const fn new(module: ModuleRef, id: GateId) -> Self {
        Self { module, id }
    }
}

impl fmt::Display for GateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.id)
    }
}
