//! Gates and gate descriptor slots.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{GateId, GateRef};
use crate::channel::Channel;
use crate::tree::ModuleRef;

/// Declared type of a gate slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateType {
    Input,
    Output,
    /// A bidirectional pair, addressed as `name$i` / `name$o`.
    Inout,
}

impl GateType {
    /// True if slots of this type hold input gates.
    #[must_use]
    pub const fn has_input(self) -> bool {
        !matches!(self, Self::Output)
    }

    /// True if slots of this type hold output gates.
    #[must_use]
    pub const fn has_output(self) -> bool {
        !matches!(self, Self::Input)
    }

    /// True if gates of `direction` exist in slots of this type.
    #[must_use]
    pub const fn allows(self, direction: GateDirection) -> bool {
        match direction {
            GateDirection::Input => self.has_input(),
            GateDirection::Output => self.has_output(),
        }
    }

    /// Short tag used in fingerprints and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Inout => "inout",
        }
    }
}

/// Direction of a single gate object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateDirection {
    Input,
    Output,
}

impl GateDirection {
    pub(crate) fn from_suffix(suffix: char) -> Option<Self> {
        match suffix {
            'i' => Some(Self::Input),
            'o' => Some(Self::Output),
            _ => None,
        }
    }
}

/// Gate slot name plus the derived half names of inout gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateName {
    name: String,
    halves: Option<(String, String)>,
}

impl GateName {
    pub(crate) fn new(name: &str, gate_type: GateType) -> Self {
        let halves = matches!(gate_type, GateType::Inout)
            .then(|| (format!("{name}$i"), format!("{name}$o")));
        Self {
            name: name.to_string(),
            halves,
        }
    }

    /// The declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name$i` for inout slots.
    #[must_use]
    pub fn input_half(&self) -> Option<&str> {
        self.halves.as_ref().map(|(i, _)| i.as_str())
    }

    /// `name$o` for inout slots.
    #[must_use]
    pub fn output_half(&self) -> Option<&str> {
        self.halves.as_ref().map(|(_, o)| o.as_str())
    }

    pub(crate) fn matches(&self, name: &str, suffix: Option<GateDirection>) -> bool {
        match suffix {
            None => self.name == name,
            Some(GateDirection::Input) => self.input_half() == Some(name),
            Some(GateDirection::Output) => self.output_half() == Some(name),
        }
    }
}

/// A connection endpoint.
///
/// A gate knows its own id (which encodes its descriptor slot), its owner, and
/// the links to its neighbours on the connection path. The channel of a link is
/// stored in the link's source gate.
#[derive(Debug)]
pub struct Gate {
    id: GateId,
    owner: ModuleRef,
    prev: Option<GateRef>,
    next: Option<GateRef>,
    channel: Option<Channel>,
}

impl Gate {
    pub(crate) fn new(owner: ModuleRef, id: GateId) -> Self {
        Self {
            id,
            owner,
            prev: None,
            next: None,
            channel: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> GateId {
        self.id
    }

    #[must_use]
    pub const fn owner(&self) -> ModuleRef {
        self.owner
    }

    /// Handle of this gate.
    #[must_use]
    pub const fn gate_ref(&self) -> GateRef {
        GateRef::new(self.owner, self.id)
    }

    #[must_use]
    pub const fn direction(&self) -> GateDirection {
        self.id.decode().direction()
    }

    /// Vector index, `None` for scalar gates.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        match self.id.decode() {
            super::GateAddress::Vector { index, .. } => Some(index),
            super::GateAddress::Scalar { .. } => None,
        }
    }

    #[must_use]
    pub const fn prev(&self) -> Option<GateRef> {
        self.prev
    }

    #[must_use]
    pub const fn next(&self) -> Option<GateRef> {
        self.next
    }

    /// Channel originating at this gate, if any.
    #[must_use]
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Input gate: has a previous gate. Output gate: has a next gate.
    #[must_use]
    pub const fn is_connected_outside(&self) -> bool {
        match self.direction() {
            GateDirection::Input => self.prev.is_some(),
            GateDirection::Output => self.next.is_some(),
        }
    }

    /// Input gate: has a next gate. Output gate: has a previous gate.
    #[must_use]
    pub const fn is_connected_inside(&self) -> bool {
        match self.direction() {
            GateDirection::Input => self.next.is_some(),
            GateDirection::Output => self.prev.is_some(),
        }
    }

    /// True if either link is set.
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.prev.is_some() || self.next.is_some()
    }

    pub(crate) fn set_prev(&mut self, prev: Option<GateRef>) {
        self.prev = prev;
    }

    pub(crate) fn set_next(&mut self, next: Option<GateRef>) {
        self.next = next;
    }

    pub(crate) fn channel_mut(&mut self) -> Option<&mut Channel> {
        self.channel.as_mut()
    }

    pub(crate) fn set_channel(&mut self, channel: Option<Channel>) -> Option<Channel> {
        std::mem::replace(&mut self.channel, channel)
    }
}

/// Rounds a vector size up to the allocation granularity used for gate vectors.
#[must_use]
pub const fn capacity_for(size: usize) -> usize {
    if size < 8 {
        (size + 1) & !1
    } else if size < 32 {
        (size + 3) & !3
    } else if size < 256 {
        (size + 15) & !15
    } else {
        (size + 63) & !63
    }
}

#[derive(Debug)]
pub(crate) enum GateStorage {
    Scalar {
        input: Option<Gate>,
        output: Option<Gate>,
    },
    Vector {
        input: Vec<Gate>,
        output: Vec<Gate>,
        size: usize,
    },
}

/// One slot of a gate table: a scalar gate (pair) or a gate vector.
///
/// Deleted slots keep their position with the name cleared.
#[derive(Debug)]
pub struct GateDesc {
    name: Option<GateName>,
    gate_type: GateType,
    pub(crate) storage: GateStorage,
}

impl GateDesc {
    pub(crate) fn new(name: &str, gate_type: GateType, storage: GateStorage) -> Self {
        Self {
            name: Some(GateName::new(name, gate_type)),
            gate_type,
            storage,
        }
    }

    /// Slot name, `None` once the slot was deleted.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(GateName::name)
    }

    #[must_use]
    pub fn gate_name(&self) -> Option<&GateName> {
        self.name.as_ref()
    }

    /// Name of the half addressed by `direction` (`x$i`/`x$o` for inout slots).
    #[must_use]
    pub fn name_for(&self, direction: GateDirection) -> &str {
        let Some(name) = self.name.as_ref() else {
            return "";
        };
        let half = match direction {
            GateDirection::Input => name.input_half(),
            GateDirection::Output => name.output_half(),
        };
        half.unwrap_or_else(|| name.name())
    }

    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.name.is_some()
    }

    #[must_use]
    pub const fn gate_type(&self) -> GateType {
        self.gate_type
    }

    #[must_use]
    pub const fn is_vector(&self) -> bool {
        matches!(self.storage, GateStorage::Vector { .. })
    }

    /// Vector size, or 1 for scalar slots.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self.storage {
            GateStorage::Scalar { .. } => 1,
            GateStorage::Vector { size, .. } => size,
        }
    }

    /// Allocated element capacity of a vector slot.
    #[must_use]
    pub fn capacity(&self) -> usize {
        match &self.storage {
            GateStorage::Scalar { .. } => 1,
            GateStorage::Vector { input, output, .. } => input.capacity().max(output.capacity()),
        }
    }

    /// Gate of `direction` at `index` (`None` index for scalar slots).
    #[must_use]
    pub fn gate(&self, direction: GateDirection, index: Option<usize>) -> Option<&Gate> {
        match (&self.storage, index) {
            (GateStorage::Scalar { input, output }, None) => match direction {
                GateDirection::Input => input.as_ref(),
                GateDirection::Output => output.as_ref(),
            },
            (GateStorage::Vector { input, output, .. }, Some(i)) => match direction {
                GateDirection::Input => input.get(i),
                GateDirection::Output => output.get(i),
            },
            _ => None,
        }
    }

    pub(crate) fn gate_mut(
        &mut self,
        direction: GateDirection,
        index: Option<usize>,
    ) -> Option<&mut Gate> {
        match (&mut self.storage, index) {
            (GateStorage::Scalar { input, output }, None) => match direction {
                GateDirection::Input => input.as_mut(),
                GateDirection::Output => output.as_mut(),
            },
            (GateStorage::Vector { input, output, .. }, Some(i)) => match direction {
                GateDirection::Input => input.get_mut(i),
                GateDirection::Output => output.get_mut(i),
            },
            _ => None,
        }
    }

    /// Gates of one direction, in index order.
    pub fn gates(&self, direction: GateDirection) -> impl Iterator<Item = &Gate> + '_ {
        let (scalar, vector): (Option<&Gate>, &[Gate]) = match &self.storage {
            GateStorage::Scalar { input, output } => match direction {
                GateDirection::Input => (input.as_ref(), &[][..]),
                GateDirection::Output => (output.as_ref(), &[][..]),
            },
            GateStorage::Vector { input, output, .. } => match direction {
                GateDirection::Input => (None, input.as_slice()),
                GateDirection::Output => (None, output.as_slice()),
            },
        };
        scalar.into_iter().chain(vector.iter())
    }

    /// All gates of the slot: inputs first, then outputs.
    pub fn all_gates(&self) -> impl Iterator<Item = &Gate> + '_ {
        self.gates(GateDirection::Input)
            .chain(self.gates(GateDirection::Output))
    }

    /// Clears the name and drops the gates. The slot index stays reserved.
    pub(crate) fn kill(&mut self) {
        self.name = None;
        self.storage = match self.storage {
            GateStorage::Scalar { .. } => GateStorage::Scalar {
                input: None,
                output: None,
            },
            GateStorage::Vector { .. } => GateStorage::Vector {
                input: Vec::new(),
                output: Vec::new(),
                size: 0,
            },
        };
    }
}

impl fmt::Display for GateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_rounding() {
        assert_eq!(capacity_for(0), 0);
        assert_eq!(capacity_for(1), 2);
        assert_eq!(capacity_for(7), 8);
        assert_eq!(capacity_for(8), 8);
        assert_eq!(capacity_for(9), 12);
        assert_eq!(capacity_for(31), 32);
        assert_eq!(capacity_for(33), 48);
        assert_eq!(capacity_for(255), 256);
        assert_eq!(capacity_for(257), 320);
    }

    #[test]
    fn test_gate_name_halves() {
        let inout = GateName::new("port", GateType::Inout);
        assert!(inout.matches("port", None));
        assert!(inout.matches("port$i", Some(GateDirection::Input)));
        assert!(inout.matches("port$o", Some(GateDirection::Output)));

        let input = GateName::new("in", GateType::Input);
        assert!(input.input_half().is_none());
        assert!(!input.matches("in$i", Some(GateDirection::Input)));
    }

    #[test]
    fn test_gate_type_allows() {
        assert!(GateType::Inout.allows(GateDirection::Input));
        assert!(GateType::Inout.allows(GateDirection::Output));
        assert!(!GateType::Input.allows(GateDirection::Output));
        assert!(!GateType::Output.allows(GateDirection::Input));
    }

    #[test]
    fn test_connection_sides() {
        let owner = ModuleRef::new(0, 0);
        let other = GateRef::new(ModuleRef::new(1, 0), GateId::scalar(0, GateDirection::Output));

        let mut input = Gate::new(owner, GateId::scalar(0, GateDirection::Input));
        input.set_prev(Some(other));
        assert!(input.is_connected_outside());
        assert!(!input.is_connected_inside());

        let mut output = Gate::new(owner, GateId::scalar(1, GateDirection::Output));
        output.set_prev(Some(other));
        assert!(output.is_connected_inside());
        assert!(!output.is_connected_outside());
        assert_eq!(output.index(), None);
    }
}
