//! Modules: tree nodes, their submodule storage, and the behavior/type seams.

mod behavior;
mod node;
mod submodules;

use std::sync::OnceLock;

use regex::Regex;

use crate::error::StructureError;

pub use behavior::{Compound, ModuleBehavior, ModuleContext, ModuleType, ModuleTypeBuilder};
pub use node::{Module, ModuleState};
pub use submodules::{StorePos, SubmoduleStore, SubmoduleVector};
pub(crate) use submodules::StoreConflict;

static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

fn identifier() -> &'static Regex {
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"))
}

/// Checks that `name` is usable as a module or gate name.
pub fn validate_name(name: &str) -> Result<(), StructureError> {
    if identifier().is_match(name) {
        Ok(())
    } else {
        Err(StructureError::InvalidName {
            name: name.to_string(),
        })
    }
}
