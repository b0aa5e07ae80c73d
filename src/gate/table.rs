//! Per-module gate descriptor table.
//!
//! The table is a plain `Vec<GateDesc>`. Gates find their slot through the slot
//! index encoded in their [`GateId`], so appending to the vector (and the
//! reallocation that may come with it) never invalidates a gate. Slots are never
//! removed, only killed, so indices are stable for the lifetime of the module.
//!
//! Mutations come in two steps: a `check_*` method that validates everything
//! without touching the table, and an infallible apply step. The module tree
//! emits its pre-change notification between the two.

use super::desc::{GateDesc, GateStorage};
use super::{
    Gate, GateAddress, GateDirection, GateId, GateType, MAX_SCALAR_GATES, MAX_VECTOR_GATES,
    MAX_VECTOR_GATE_SIZE, PLAUSIBLE_INDEX_LIMIT,
};
use crate::config::ModelConfig;
use crate::error::{GateIdError, StructureError};
use crate::module::validate_name;
use crate::tree::ModuleRef;

/// Effective gate limits of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateLimits {
    /// Maximum number of scalar gate slots per module.
    pub scalar_gates: usize,
    /// Maximum number of gate vector slots per module.
    pub vector_gates: usize,
    /// Maximum size of a single gate vector.
    pub vector_gate_size: usize,
}

impl Default for GateLimits {
    fn default() -> Self {
        Self {
            scalar_gates: MAX_SCALAR_GATES,
            vector_gates: MAX_VECTOR_GATES,
            vector_gate_size: MAX_VECTOR_GATE_SIZE,
        }
    }
}

impl GateLimits {
    /// Limits configured in `config` (already validated against the caps).
    #[must_use]
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            scalar_gates: config.max_scalar_gates.min(MAX_SCALAR_GATES),
            vector_gates: config.max_vector_gates.min(MAX_VECTOR_GATES),
            vector_gate_size: config.max_vector_gate_size.min(MAX_VECTOR_GATE_SIZE),
        }
    }
}

/// Result of probing a gate vector for its first unconnected element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnconnectedProbe {
    pub slot: usize,
    pub name: String,
    /// `None` when probing both halves of an inout vector.
    pub direction: Option<GateDirection>,
    pub size: usize,
    /// Index found by binary search.
    pub hit: Option<usize>,
    /// Index found by a linear scan, for vectors connected out of order.
    pub fallback: Option<usize>,
}

/// Gate descriptor table of one module.
#[derive(Debug)]
pub struct GateTable {
    owner: ModuleRef,
    descs: Vec<GateDesc>,
}

impl GateTable {
    pub(crate) fn new(owner: ModuleRef) -> Self {
        Self {
            owner,
            descs: Vec::new(),
        }
    }

    /// Module owning the table.
    #[must_use]
    pub const fn owner(&self) -> ModuleRef {
        self.owner
    }

    /// All slots, including killed ones.
    #[must_use]
    pub fn descs(&self) -> &[GateDesc] {
        &self.descs
    }

    /// Slot by index.
    #[must_use]
    pub fn desc(&self, slot: usize) -> Option<&GateDesc> {
        self.descs.get(slot)
    }

    /// Finds a live slot by name. A trailing `$i`/`$o` selects the half name of
    /// an inout slot and is returned as the second element. Any other `$x`
    /// suffix never matches.
    #[must_use]
    pub fn find_desc(&self, name: &str) -> Option<(usize, Option<GateDirection>)> {
        let suffix = split_suffix(name)?;
        self.descs
            .iter()
            .position(|d| d.gate_name().is_some_and(|n| n.matches(name, suffix)))
            .map(|slot| (slot, suffix))
    }

    fn desc_by_name(&self, name: &str) -> Result<(usize, Option<GateDirection>), StructureError> {
        self.find_desc(name)
            .ok_or_else(|| StructureError::NoSuchGate {
                gate: name.to_string(),
            })
    }

    /// True if the table has any slot (live or killed).
    #[must_use]
    pub fn has_gates(&self) -> bool {
        !self.descs.is_empty()
    }

    /// Validates an `add` without modifying the table.
    pub(crate) fn check_add(
        &self,
        name: &str,
        is_vector: bool,
        limits: &GateLimits,
    ) -> Result<(), StructureError> {
        if self.find_desc(name).is_some() {
            return Err(StructureError::DuplicateGate {
                gate: name.to_string(),
            });
        }
        if has_reserved_suffix(name) {
            return Err(StructureError::ReservedGateSuffix {
                gate: name.to_string(),
            });
        }
        validate_name(name)?;
        if is_vector && self.descs.len() >= limits.vector_gates {
            return Err(StructureError::TooManyGates {
                gate: format!("{name}[]"),
                kind: "vector",
                limit: limits.vector_gates,
            });
        }
        if !is_vector && self.descs.len() >= limits.scalar_gates {
            return Err(StructureError::TooManyGates {
                gate: name.to_string(),
                kind: "scalar",
                limit: limits.scalar_gates,
            });
        }
        Ok(())
    }

    /// Appends a slot. Scalar slots get their gates immediately; vectors start
    /// empty. Returns the slot index.
    pub(crate) fn add(&mut self, name: &str, gate_type: GateType, is_vector: bool) -> usize {
        let slot = self.descs.len();
        let owner = self.owner;
        let storage = if is_vector {
            GateStorage::Vector {
                input: Vec::new(),
                output: Vec::new(),
                size: 0,
            }
        } else {
            let make = |direction| Gate::new(owner, GateId::scalar(slot, direction));
            GateStorage::Scalar {
                input: gate_type.has_input().then(|| make(GateDirection::Input)),
                output: gate_type.has_output().then(|| make(GateDirection::Output)),
            }
        };
        self.descs.push(GateDesc::new(name, gate_type, storage));
        debug_assert!(self.back_references_hold());
        slot
    }

    /// Validates a resize. Returns the slot and the current size.
    pub(crate) fn check_resize(
        &self,
        name: &str,
        new_size: usize,
        limits: &GateLimits,
    ) -> Result<(usize, usize), StructureError> {
        let (slot, suffix) = self.desc_by_name(name)?;
        if suffix.is_some() {
            return Err(StructureError::ReservedGateSuffix {
                gate: name.to_string(),
            });
        }
        let desc = &self.descs[slot];
        if !desc.is_vector() {
            return Err(StructureError::NotAGateVector {
                gate: name.to_string(),
            });
        }
        if new_size > limits.vector_gate_size {
            return Err(StructureError::GateVectorTooLarge {
                gate: name.to_string(),
                size: new_size,
                limit: limits.vector_gate_size,
            });
        }
        let old_size = desc.size();
        for index in (new_size..old_size).rev() {
            let connected = [GateDirection::Input, GateDirection::Output]
                .into_iter()
                .filter_map(|dir| desc.gate(dir, Some(index)))
                .any(Gate::is_linked);
            if connected {
                return Err(StructureError::ShrinkConnectedGate {
                    gate: name.to_string(),
                    new_size,
                    index,
                });
            }
        }
        Ok((slot, old_size))
    }

    /// Grows or shrinks a vector slot already validated by `check_resize`.
    pub(crate) fn resize(&mut self, slot: usize, new_size: usize) {
        let owner = self.owner;
        let desc = &mut self.descs[slot];
        let gate_type = desc.gate_type();
        if let GateStorage::Vector { input, output, size } = &mut desc.storage {
            let capacity = super::capacity_for(new_size);
            for (gates, direction, present) in [
                (input, GateDirection::Input, gate_type.has_input()),
                (output, GateDirection::Output, gate_type.has_output()),
            ] {
                if !present {
                    continue;
                }
                if new_size < gates.len() {
                    gates.truncate(new_size);
                    gates.shrink_to(capacity);
                } else {
                    gates.reserve_exact(capacity.saturating_sub(gates.len()));
                    let start = gates.len();
                    gates.extend(
                        (start..new_size)
                            .map(|i| Gate::new(owner, GateId::vector(slot, direction, i))),
                    );
                }
            }
            *size = new_size;
        }
        debug_assert!(self.back_references_hold());
    }

    /// Validates a delete. Returns the slot.
    pub(crate) fn check_delete(&self, name: &str) -> Result<usize, StructureError> {
        let (slot, suffix) = self.desc_by_name(name)?;
        if suffix.is_some() {
            return Err(StructureError::HalfGateDelete {
                gate: name.to_string(),
            });
        }
        if self.descs[slot].all_gates().any(Gate::is_linked) {
            return Err(StructureError::GateStillConnected {
                gate: name.to_string(),
            });
        }
        Ok(slot)
    }

    /// Kills a slot; its index is never reused.
    pub(crate) fn dispose(&mut self, slot: usize) {
        if let Some(desc) = self.descs.get_mut(slot) {
            desc.kill();
        }
    }

    fn resolve(&self, id: GateId) -> Result<(usize, GateDirection, Option<usize>), GateIdError> {
        let garbage = || GateIdError::Garbage { id };
        let address = id.decode();
        let slot = address.slot();
        let direction = address.direction();
        let desc = self.descs.get(slot).ok_or_else(garbage)?;
        if !desc.is_live() || !desc.gate_type().allows(direction) {
            return Err(garbage());
        }
        match address {
            GateAddress::Scalar { .. } if !desc.is_vector() => Ok((slot, direction, None)),
            GateAddress::Vector { index, .. } if desc.is_vector() => {
                let size = desc.size();
                if index < size {
                    Ok((slot, direction, Some(index)))
                } else if index < PLAUSIBLE_INDEX_LIMIT {
                    Err(GateIdError::OutOfRange {
                        id,
                        gate: desc.name_for(direction).to_string(),
                        size,
                        index,
                    })
                } else {
                    Err(garbage())
                }
            }
            _ => Err(garbage()),
        }
    }

    /// Resolves a gate id: decode, then validate slot, liveness, kind,
    /// direction and bounds.
    pub fn gate(&self, id: GateId) -> Result<&Gate, GateIdError> {
        let (slot, direction, index) = self.resolve(id)?;
        self.descs[slot]
            .gate(direction, index)
            .ok_or(GateIdError::Garbage { id })
    }

    pub(crate) fn gate_mut(&mut self, id: GateId) -> Result<&mut Gate, GateIdError> {
        let (slot, direction, index) = self.resolve(id)?;
        self.descs[slot]
            .gate_mut(direction, index)
            .ok_or(GateIdError::Garbage { id })
    }

    /// `name`, `name[3]`, or `name$i[3]` for a gate of this table.
    #[must_use]
    pub fn gate_full_name(&self, id: GateId) -> String {
        let address = id.decode();
        let Some(desc) = self.descs.get(address.slot()) else {
            return format!("<gate {id}>");
        };
        let base = desc.name_for(address.direction());
        match address {
            GateAddress::Scalar { .. } => base.to_string(),
            GateAddress::Vector { index, .. } => format!("{base}[{index}]"),
        }
    }

    /// Looks up a gate by name and index (`None` for scalars). Inout slots
    /// must be addressed with a `$i`/`$o` suffix.
    pub fn lookup(&self, name: &str, index: Option<usize>) -> Result<GateId, StructureError> {
        let (slot, direction) = self.direction_for(name)?;
        let desc = &self.descs[slot];
        match (desc.is_vector(), index) {
            (false, None) => Ok(GateId::scalar(slot, direction)),
            (false, Some(index)) => Err(StructureError::ScalarGateIndexed {
                gate: name.to_string(),
                index,
            }),
            (true, None) => Err(StructureError::MissingGateIndex {
                gate: name.to_string(),
            }),
            (true, Some(index)) if index >= desc.size() => {
                Err(StructureError::GateIndexOutOfRange {
                    gate: name.to_string(),
                    index,
                    size: desc.size(),
                })
            }
            (true, Some(index)) => Ok(GateId::vector(slot, direction, index)),
        }
    }

    /// Soft variant of [`GateTable::lookup`].
    #[must_use]
    pub fn find(&self, name: &str, index: Option<usize>) -> Option<GateId> {
        self.lookup(name, index).ok()
    }

    /// Id of the gate (scalar) or of element 0 (vector); valid vector ids are
    /// `base + index` for `index < size`.
    pub fn base_id(&self, name: &str) -> Result<GateId, StructureError> {
        let (slot, direction) = self.direction_for(name)?;
        if self.descs[slot].is_vector() {
            Ok(GateId::vector(slot, direction, 0))
        } else {
            Ok(GateId::scalar(slot, direction))
        }
    }

    /// Looks up one half of a gate by its base name.
    pub fn half(
        &self,
        name: &str,
        direction: GateDirection,
        index: Option<usize>,
    ) -> Result<GateId, StructureError> {
        let (slot, _) = self.desc_by_name(name)?;
        let half_name = self.descs[slot].name_for(direction).to_string();
        if !self.descs[slot].gate_type().allows(direction) {
            return Err(StructureError::NoSuchGate { gate: half_name });
        }
        self.lookup(&half_name, index)
    }

    fn direction_for(&self, name: &str) -> Result<(usize, GateDirection), StructureError> {
        let (slot, suffix) = self.desc_by_name(name)?;
        let direction = match (self.descs[slot].gate_type(), suffix) {
            (_, Some(direction)) => direction,
            (GateType::Input, None) => GateDirection::Input,
            (GateType::Output, None) => GateDirection::Output,
            (GateType::Inout, None) => {
                return Err(StructureError::InoutWithoutSuffix {
                    gate: name.to_string(),
                })
            }
        };
        Ok((slot, direction))
    }

    /// True if `name` exists and, when given, `index` is within the vector.
    #[must_use]
    pub fn has_gate(&self, name: &str, index: Option<usize>) -> bool {
        self.find_desc(name).is_some_and(|(slot, _)| match index {
            None => true,
            Some(i) => i < self.descs[slot].size() && self.descs[slot].is_vector(),
        })
    }

    /// True if `name` exists and is a gate vector.
    #[must_use]
    pub fn has_gate_vector(&self, name: &str) -> bool {
        self.find_desc(name)
            .is_some_and(|(slot, _)| self.descs[slot].is_vector())
    }

    /// Like [`GateTable::has_gate_vector`] but fails for unknown names.
    pub fn is_gate_vector(&self, name: &str) -> Result<bool, StructureError> {
        let (slot, _) = self.desc_by_name(name)?;
        Ok(self.descs[slot].is_vector())
    }

    /// Declared type; a half name reports the direction of the half.
    pub fn gate_type(&self, name: &str) -> Result<GateType, StructureError> {
        let (slot, suffix) = self.desc_by_name(name)?;
        Ok(match suffix {
            Some(GateDirection::Input) => GateType::Input,
            Some(GateDirection::Output) => GateType::Output,
            None => self.descs[slot].gate_type(),
        })
    }

    /// Size of a gate vector.
    pub fn gate_size(&self, name: &str) -> Result<usize, StructureError> {
        let (slot, _) = self.desc_by_name(name)?;
        let desc = &self.descs[slot];
        if !desc.is_vector() {
            return Err(StructureError::NotAGateVector {
                gate: name.to_string(),
            });
        }
        Ok(desc.size())
    }

    /// Names of live slots in table order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.descs
            .iter()
            .filter_map(|d| d.name().map(str::to_string))
            .collect()
    }

    /// Number of gate objects (inout slots count twice).
    #[must_use]
    pub fn count(&self) -> usize {
        self.descs
            .iter()
            .filter(|d| d.is_live())
            .map(|d| {
                let halves = usize::from(d.gate_type().has_input())
                    + usize::from(d.gate_type().has_output());
                halves * d.size()
            })
            .sum()
    }

    /// The `k`-th gate in iteration order.
    #[must_use]
    pub fn by_ordinal(&self, k: usize) -> Option<&Gate> {
        self.iter().nth(k)
    }

    /// Gates in table order; within a slot, inputs `[0..n]` then outputs.
    pub fn iter(&self) -> impl Iterator<Item = &Gate> + '_ {
        self.descs
            .iter()
            .filter(|d| d.is_live())
            .flat_map(GateDesc::all_gates)
    }

    /// Owned snapshot of all gate ids, for walks that mutate the tree.
    #[must_use]
    pub fn ids(&self) -> Vec<GateId> {
        self.iter().map(Gate::id).collect()
    }

    /// Probes a vector for its first unconnected element on one side.
    ///
    /// Vectors are normally connected from index 0 upwards, so a binary search
    /// finds the first hole; the linear fallback covers out-of-order wiring.
    pub(crate) fn probe_unconnected(
        &self,
        name: &str,
        suffix: Option<GateDirection>,
        inside: bool,
    ) -> Result<UnconnectedProbe, StructureError> {
        let (slot, name_suffix) = self.desc_by_name(name)?;
        let desc = &self.descs[slot];
        if !desc.is_vector() {
            return Err(StructureError::NotAGateVector {
                gate: name.to_string(),
            });
        }
        if name_suffix.is_some() && suffix.is_some() {
            return Err(StructureError::ReservedGateSuffix {
                gate: name.to_string(),
            });
        }
        let direction = match (name_suffix.or(suffix), desc.gate_type()) {
            (Some(direction), _) => direction,
            (None, GateType::Input) => GateDirection::Input,
            (None, GateType::Output) => GateDirection::Output,
            (None, GateType::Inout) => {
                return Err(StructureError::InoutWithoutSuffix {
                    gate: name.to_string(),
                })
            }
        };
        if !desc.gate_type().allows(direction) {
            return Err(StructureError::NoSuchGate {
                gate: desc.name_for(direction).to_string(),
            });
        }
        let size = desc.size();
        let taken = |i: usize| {
            desc.gate(direction, Some(i))
                .is_some_and(|g| side_connected(g, inside))
        };
        let hit = lower_bound(size, taken);
        Ok(UnconnectedProbe {
            slot,
            name: desc.name().unwrap_or_default().to_string(),
            direction: Some(direction),
            size,
            hit: (hit < size).then_some(hit),
            fallback: (0..size).find(|&i| !taken(i)),
        })
    }

    /// Probes an inout vector for the first index where both halves are
    /// unconnected on one side.
    pub(crate) fn probe_unconnected_pair(
        &self,
        name: &str,
        inside: bool,
    ) -> Result<UnconnectedProbe, StructureError> {
        let (slot, suffix) = self.desc_by_name(name)?;
        let desc = &self.descs[slot];
        if !desc.is_vector() {
            return Err(StructureError::NotAGateVector {
                gate: name.to_string(),
            });
        }
        if suffix.is_some() || desc.gate_type() != GateType::Inout {
            return Err(StructureError::ReservedGateSuffix {
                gate: name.to_string(),
            });
        }
        let size = desc.size();
        let half_taken = |dir, i| {
            desc.gate(dir, Some(i))
                .is_some_and(|g| side_connected(g, inside))
        };
        let both_taken =
            |i| half_taken(GateDirection::Input, i) && half_taken(GateDirection::Output, i);
        let hit = lower_bound(size, both_taken);
        Ok(UnconnectedProbe {
            slot,
            name: desc.name().unwrap_or_default().to_string(),
            direction: None,
            size,
            hit: (hit < size).then_some(hit),
            fallback: (0..size).find(|&i| {
                !half_taken(GateDirection::Input, i) && !half_taken(GateDirection::Output, i)
            }),
        })
    }

    fn back_references_hold(&self) -> bool {
        self.descs.iter().enumerate().all(|(slot, desc)| {
            desc.all_gates()
                .all(|g| g.owner() == self.owner && g.id().decode().slot() == slot)
        })
    }
}

fn side_connected(gate: &Gate, inside: bool) -> bool {
    if inside {
        gate.is_connected_inside()
    } else {
        gate.is_connected_outside()
    }
}

/// First index in `0..len` for which `taken` is false, assuming taken indices
/// form a prefix.
fn lower_bound(len: usize, taken: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if taken(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Splits off a `$i`/`$o` suffix. `None` means the name carries some other
/// `$x` suffix and can never match.
fn split_suffix(name: &str) -> Option<Option<GateDirection>> {
    let bytes = name.as_bytes();
    if bytes.len() > 2 && bytes[bytes.len() - 2] == b'$' {
        GateDirection::from_suffix(char::from(bytes[bytes.len() - 1])).map(Some)
    } else {
        Some(None)
    }
}

fn has_reserved_suffix(name: &str) -> bool {
    name.len() > 2 && name.as_bytes()[name.len() - 2] == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> GateTable {
        GateTable::new(ModuleRef::new(0, 0))
    }

    fn add(t: &mut GateTable, name: &str, gate_type: GateType, is_vector: bool) -> usize {
        t.check_add(name, is_vector, &GateLimits::default()).unwrap();
        t.add(name, gate_type, is_vector)
    }

    fn resize(t: &mut GateTable, name: &str, size: usize) {
        let (slot, _) = t.check_resize(name, size, &GateLimits::default()).unwrap();
        t.resize(slot, size);
    }

    #[test]
    fn test_scalar_gates_created_eagerly() {
        let mut t = table();
        add(&mut t, "in", GateType::Input, false);
        add(&mut t, "port", GateType::Inout, false);
        assert_eq!(t.count(), 3);

        let id = t.lookup("in", None).unwrap();
        assert_eq!(t.gate(id).unwrap().direction(), GateDirection::Input);
        assert!(matches!(
            t.lookup("port", None),
            Err(StructureError::InoutWithoutSuffix { .. })
        ));
        let out = t.lookup("port$o", None).unwrap();
        assert_eq!(t.gate_full_name(out), "port$o");
    }

    #[test]
    fn test_add_rejects_duplicates_and_suffixes() {
        let mut t = table();
        add(&mut t, "port", GateType::Inout, true);
        let limits = GateLimits::default();
        assert!(matches!(
            t.check_add("port", false, &limits),
            Err(StructureError::DuplicateGate { .. })
        ));
        assert!(matches!(
            t.check_add("port$i", false, &limits),
            Err(StructureError::DuplicateGate { .. })
        ));
        assert!(matches!(
            t.check_add("x$o", false, &limits),
            Err(StructureError::ReservedGateSuffix { .. })
        ));
        assert!(matches!(
            t.check_add("9lives", false, &limits),
            Err(StructureError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_slot_limits() {
        let mut t = table();
        let limits = GateLimits {
            scalar_gates: 2,
            vector_gates: 3,
            vector_gate_size: 4,
        };
        t.add("a", GateType::Input, false);
        t.add("b", GateType::Input, false);
        assert!(matches!(
            t.check_add("c", false, &limits),
            Err(StructureError::TooManyGates { kind: "scalar", .. })
        ));
        t.check_add("v", true, &limits).unwrap();
        t.add("v", GateType::Output, true);
        assert!(matches!(
            t.check_resize("v", 5, &limits),
            Err(StructureError::GateVectorTooLarge { size: 5, limit: 4, .. })
        ));
    }

    #[test]
    fn test_resize_grows_and_shrinks() {
        let mut t = table();
        add(&mut t, "out", GateType::Output, true);
        resize(&mut t, "out", 9);
        assert_eq!(t.gate_size("out").unwrap(), 9);
        assert!(t.desc(0).unwrap().capacity() >= 12);

        let id = t.lookup("out", Some(8)).unwrap();
        assert_eq!(t.gate(id).unwrap().index(), Some(8));

        resize(&mut t, "out", 3);
        assert_eq!(t.gate_size("out").unwrap(), 3);
        assert!(matches!(t.gate(id), Err(GateIdError::OutOfRange { index: 8, size: 3, .. })));
    }

    #[test]
    fn test_garbage_ids() {
        let mut t = table();
        add(&mut t, "in", GateType::Input, false);
        add(&mut t, "v", GateType::Input, true);
        resize(&mut t, "v", 2);

        // output half of an input-only scalar
        assert!(matches!(
            t.gate(GateId::scalar(0, GateDirection::Output)),
            Err(GateIdError::Garbage { .. })
        ));
        // slot past the end
        assert!(matches!(
            t.gate(GateId::scalar(7, GateDirection::Input)),
            Err(GateIdError::Garbage { .. })
        ));
        // scalar encoding of a vector slot
        assert!(matches!(
            t.gate(GateId::scalar(1, GateDirection::Input)),
            Err(GateIdError::Garbage { .. })
        ));
        // implausibly large element index
        assert!(matches!(
            t.gate(GateId::vector(1, GateDirection::Input, 200_000)),
            Err(GateIdError::Garbage { .. })
        ));
    }

    #[test]
    fn test_killed_slot_keeps_its_index() {
        let mut t = table();
        add(&mut t, "a", GateType::Input, false);
        add(&mut t, "b", GateType::Output, false);
        let b = t.lookup("b", None).unwrap();

        let slot = t.check_delete("a").unwrap();
        t.dispose(slot);
        assert_eq!(t.names(), vec!["b".to_string()]);
        assert_eq!(t.gate(b).unwrap().id(), b);
        assert!(t.find("a", None).is_none());
        assert!(t.has_gates());
    }

    #[test]
    fn test_half_names_and_types() {
        let mut t = table();
        add(&mut t, "g", GateType::Inout, true);
        resize(&mut t, "g", 2);
        assert_eq!(t.gate_type("g$i").unwrap(), GateType::Input);
        assert_eq!(t.gate_type("g").unwrap(), GateType::Inout);
        let half = t.half("g", GateDirection::Output, Some(1)).unwrap();
        assert_eq!(t.gate_full_name(half), "g$o[1]");
        assert!(matches!(
            t.check_delete("g$i"),
            Err(StructureError::HalfGateDelete { .. })
        ));
        assert_eq!(t.base_id("g$o").unwrap().offset(1), half);
    }

    #[test]
    fn test_iteration_order_inputs_then_outputs() {
        let mut t = table();
        add(&mut t, "g", GateType::Inout, true);
        resize(&mut t, "g", 2);
        add(&mut t, "s", GateType::Output, false);
        let names: Vec<String> = t.iter().map(|g| t.gate_full_name(g.id())).collect();
        assert_eq!(names, vec!["g$i[0]", "g$i[1]", "g$o[0]", "g$o[1]", "s"]);
        assert_eq!(t.count(), 5);
        assert_eq!(t.by_ordinal(2).map(Gate::id), t.find("g$o", Some(0)));
        assert!(t.by_ordinal(5).is_none());
    }

    #[test]
    fn test_has_gate_queries() {
        let mut t = table();
        add(&mut t, "v", GateType::Input, true);
        resize(&mut t, "v", 3);
        assert!(t.has_gate("v", None));
        assert!(t.has_gate("v", Some(2)));
        assert!(!t.has_gate("v", Some(3)));
        assert!(t.has_gate_vector("v"));
        assert!(!t.has_gate_vector("w"));
        assert!(t.is_gate_vector("w").is_err());
        assert!(matches!(
            t.lookup("v", None),
            Err(StructureError::MissingGateIndex { .. })
        ));
    }

    #[test]
    fn test_lower_bound() {
        assert_eq!(lower_bound(0, |_| true), 0);
        assert_eq!(lower_bound(5, |i| i < 3), 3);
        assert_eq!(lower_bound(5, |_| true), 5);
    }
}
