//! Topology fingerprint.
//!
//! A blake3 digest over the structure of the tree, visited pre-order: module
//! paths and types, gate slots, and connections. Two trees built the same way
//! produce the same fingerprint regardless of arena slot reuse or component
//! ids, which are not hashed.

use blake3::Hasher;

use super::{ModuleRef, ModuleTree};

// Field and record separators keep adjacent strings from running together.
const FIELD: &[u8] = &[0x1f];
const RECORD: &[u8] = &[0x1e];

impl ModuleTree {
    /// Hex digest of the model structure; empty tree hashes to a fixed value.
    #[must_use]
    pub fn topology_fingerprint(&self) -> String {
        let mut hasher = Hasher::new();
        if let Some(system) = self.system {
            let mut stack = vec![system];
            while let Some(module) = stack.pop() {
                self.hash_module(&mut hasher, module);
                let mut children: Vec<ModuleRef> = self.submodules(module).collect();
                children.reverse();
                stack.extend(children);
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    fn hash_module(&self, h: &mut Hasher, module: ModuleRef) {
        let Some(node) = self.arena.get(module) else {
            return;
        };
        h.update(b"M");
        h.update(self.full_path(module).as_bytes());
        h.update(FIELD);
        h.update(node.type_name().as_bytes());
        h.update(RECORD);

        for desc in node.gates.descs().iter().filter(|d| d.is_live()) {
            h.update(b"G");
            h.update(desc.name().unwrap_or_default().as_bytes());
            h.update(FIELD);
            h.update(desc.gate_type().as_str().as_bytes());
            h.update(FIELD);
            h.update(if desc.is_vector() { b"v" } else { b"s" });
            h.update(&(desc.size() as u64).to_le_bytes());
            h.update(RECORD);
        }

        for gate in node.gates.iter() {
            let Some(next) = gate.next() else {
                continue;
            };
            h.update(b"C");
            h.update(node.gates.gate_full_name(gate.id()).as_bytes());
            h.update(FIELD);
            h.update(self.gate_full_path(next).as_bytes());
            if let Some(channel) = gate.channel() {
                h.update(FIELD);
                h.update(channel.channel_type().as_bytes());
            }
            h.update(RECORD);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::gate::GateType;
    use crate::module::{ModuleType, ModuleTypeBuilder};
    use std::rc::Rc;

    fn build(link: bool) -> ModuleTree {
        let net: Rc<dyn ModuleType> = ModuleTypeBuilder::new("Net").build();
        let host: Rc<dyn ModuleType> = ModuleTypeBuilder::new("Host")
            .simple()
            .gate("in", GateType::Input, false)
            .gate("out", GateType::Output, false)
            .build();
        let mut tree = ModuleTree::default();
        let root = tree.create_module(&net, "net", None, None).unwrap();
        let a = tree.create_module(&host, "a", Some(root), None).unwrap();
        let b = tree.create_module(&host, "b", Some(root), None).unwrap();
        if link {
            let out = tree.gate(a, "out", None).unwrap();
            let inp = tree.gate(b, "in", None).unwrap();
            tree.connect(out, inp, Some(Channel::ideal())).unwrap();
        }
        tree
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(build(true).topology_fingerprint(), build(true).topology_fingerprint());
        assert_eq!(build(true).topology_fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_sees_connections() {
        assert_ne!(build(true).topology_fingerprint(), build(false).topology_fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_slot_reuse() {
        let mut tree = build(false);
        let root = tree.system_module().unwrap();
        let scratch: Rc<dyn ModuleType> = ModuleTypeBuilder::new("Scratch").build();
        let tmp = tree.create_module(&scratch, "tmp", Some(root), None).unwrap();
        tree.delete_module(tmp).unwrap();
        assert_eq!(tree.topology_fingerprint(), build(false).topology_fingerprint());
    }
}
