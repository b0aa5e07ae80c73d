//! Bit-packed gate identifiers.
//!
//! A `GateId` encodes the descriptor slot, the scalar/vector flag, the direction
//! and (for vectors) the element index, so lookup is a decode plus bounds check.
//!
//! ```text
//!   scalar:  [ 0 ....................... 0 | slot ............ | dir ]
//!             32-L high bits are zero         L-1 bits            1 bit
//!   vector:  [ slot + 1 (32-L bits)        | dir | element index (L-1 bits) ]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::GateDirection;

/// Number of low bits (direction + element index) in a vector gate id.
pub const GATEID_LBITS: u32 = 20;

const GATEID_LMASK: u32 = (1 << GATEID_LBITS) - 1;
const GATEID_HMASK: u32 = !GATEID_LMASK;
const GATEID_DIR_BIT: u32 = 1 << (GATEID_LBITS - 1);
const GATEID_INDEX_MASK: u32 = GATEID_LMASK >> 1;

/// Hard cap on gate slots when adding a scalar gate.
pub const MAX_SCALAR_GATES: usize = 1 << (GATEID_LBITS - 1);

/// Hard cap on gate slots when adding a gate vector (H = 0 is reserved for scalars).
pub const MAX_VECTOR_GATES: usize = (1 << (32 - GATEID_LBITS)) - 2;

/// Hard cap on the size of a single gate vector.
pub const MAX_VECTOR_GATE_SIZE: usize = 1 << (GATEID_LBITS - 1);

/// Element indices below this are reported as "out of range" rather than garbage.
pub const PLAUSIBLE_INDEX_LIMIT: usize = 100_000;

/// Dense gate identifier, unique within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateId(u32);

/// Decoded form of a [`GateId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateAddress {
    /// A scalar gate.
    Scalar {
        /// Descriptor slot.
        slot: usize,
        /// Gate direction.
        direction: GateDirection,
    },
    /// One element of a gate vector.
    Vector {
        /// Descriptor slot.
        slot: usize,
        /// Gate direction.
        direction: GateDirection,
        /// Element index.
        index: usize,
    },
}

impl GateAddress {
    /// Descriptor slot of the address.
    #[must_use]
    pub const fn slot(&self) -> usize {
        match *self {
            Self::Scalar { slot, .. } | Self::Vector { slot, .. } => slot,
        }
    }

    /// Direction of the address.
    #[must_use]
    pub const fn direction(&self) -> GateDirection {
        match *self {
            Self::Scalar { direction, .. } | Self::Vector { direction, .. } => direction,
        }
    }
}

const fn dir_bit(direction: GateDirection) -> u32 {
    match direction {
        GateDirection::Input => 0,
        GateDirection::Output => 1,
    }
}

impl GateId {
    /// Id of a scalar gate in `slot`.
    ///
    /// `slot` must be below [`MAX_SCALAR_GATES`]; the table enforces this.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn scalar(slot: usize, direction: GateDirection) -> Self {
        debug_assert!(slot < MAX_SCALAR_GATES);
        Self(((slot as u32) << 1) | dir_bit(direction))
    }

    /// Id of element `index` of the gate vector in `slot`.
    #[must_use]
    pub fn vector(slot: usize, direction: GateDirection, index: usize) -> Self {
        debug_assert!(slot < MAX_VECTOR_GATES);
        debug_assert!(index < MAX_VECTOR_GATE_SIZE);
        #[allow(clippy::cast_possible_truncation)]
        let high = ((slot as u32) + 1) << GATEID_LBITS;
        #[allow(clippy::cast_possible_truncation)]
        let low = (dir_bit(direction) << (GATEID_LBITS - 1)) | (index as u32);
        Self(high | low)
    }

    /// Reinterprets a raw integer. Any value decodes; validity is decided by
    /// the gate table that receives it.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the underlying integer.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True if the id addresses a vector element.
    #[must_use]
    pub const fn is_vector(self) -> bool {
        self.0 & GATEID_HMASK != 0
    }

    /// Decodes the slot, direction and element index.
    #[must_use]
    pub const fn decode(self) -> GateAddress {
        let h = self.0 & GATEID_HMASK;
        if h == 0 {
            let direction = if self.0 & 1 == 0 {
                GateDirection::Input
            } else {
                GateDirection::Output
            };
            GateAddress::Scalar {
                slot: (self.0 >> 1) as usize,
                direction,
            }
        } else {
            let direction = if self.0 & GATEID_DIR_BIT == 0 {
                GateDirection::Input
            } else {
                GateDirection::Output
            };
            GateAddress::Vector {
                slot: ((h >> GATEID_LBITS) - 1) as usize,
                direction,
                index: (self.0 & GATEID_INDEX_MASK) as usize,
            }
        }
    }

    /// Id of element `index` counted from this (vector base) id.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn offset(self, index: usize) -> Self {
        Self(self.0 + index as u32)
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        for (slot, direction) in [
            (0, GateDirection::Input),
            (0, GateDirection::Output),
            (17, GateDirection::Output),
            (MAX_SCALAR_GATES - 1, GateDirection::Input),
        ] {
            let id = GateId::scalar(slot, direction);
            assert!(!id.is_vector());
            assert_eq!(id.decode(), GateAddress::Scalar { slot, direction });
        }
    }

    #[test]
    fn vector_round_trip() {
        for (slot, direction, index) in [
            (0, GateDirection::Input, 0),
            (3, GateDirection::Output, 41),
            (MAX_VECTOR_GATES - 1, GateDirection::Output, MAX_VECTOR_GATE_SIZE - 1),
        ] {
            let id = GateId::vector(slot, direction, index);
            assert!(id.is_vector());
            assert_eq!(id.decode(), GateAddress::Vector { slot, direction, index });
        }
    }

    #[test]
    fn base_id_plus_index() {
        let base = GateId::vector(2, GateDirection::Input, 0);
        assert_eq!(base.offset(5), GateId::vector(2, GateDirection::Input, 5));
    }

    #[test]
    fn scalar_and_vector_ids_never_collide() {
        let scalar = GateId::scalar(0, GateDirection::Input);
        let vector = GateId::vector(0, GateDirection::Input, 0);
        assert_ne!(scalar, vector);
        assert_eq!(scalar.decode().slot(), vector.decode().slot());
    }
}
