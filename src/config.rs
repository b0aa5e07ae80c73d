//! Model configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::gate::{MAX_SCALAR_GATES, MAX_VECTOR_GATES, MAX_VECTOR_GATE_SIZE};

/// Tunables of a [`crate::ModuleTree`].
///
/// Gate limits may be lowered below the hard caps imposed by the 32-bit gate id
/// layout, never raised above them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Cache full paths per module (invalidated on rename/reparent).
    pub cache_full_path: bool,
    /// Maximum number of gate slots a module may hold when adding a scalar gate.
    pub max_scalar_gates: usize,
    /// Maximum number of gate slots a module may hold when adding a gate vector.
    pub max_vector_gates: usize,
    /// Maximum size of a single gate vector.
    pub max_vector_gate_size: usize,
    /// Display names keyed by module full path, applied at parameter finalization.
    pub display_names: BTreeMap<String, String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cache_full_path: true,
            max_scalar_gates: MAX_SCALAR_GATES,
            max_vector_gates: MAX_VECTOR_GATES,
            max_vector_gate_size: MAX_VECTOR_GATE_SIZE,
            display_names: BTreeMap::new(),
        }
    }
}

impl ModelConfig {
    /// Validate limits against the gate id layout.
    pub fn validate(&self) -> ModelResult<()> {
        check_limit("max_scalar_gates", self.max_scalar_gates, MAX_SCALAR_GATES)?;
        check_limit("max_vector_gates", self.max_vector_gates, MAX_VECTOR_GATES)?;
        check_limit(
            "max_vector_gate_size",
            self.max_vector_gate_size,
            MAX_VECTOR_GATE_SIZE,
        )?;
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> ModelResult<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| ModelError::config(format!("invalid model config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ModelError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }
}

fn check_limit(field: &str, value: usize, cap: usize) -> ModelResult<()> {
    if value == 0 {
        return Err(ModelError::config(format!("{field} must be > 0")));
    }
    if value > cap {
        return Err(ModelError::config(format!(
            "{field} = {value} exceeds the gate id layout limit of {cap}"
        )));
    }
    Ok(())
}
