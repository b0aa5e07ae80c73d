//! Full paths and path resolution.
//!
//! A path is a `.`-separated list of segments. `^` selects the parent and
//! `name[index]` a submodule vector element. A leading `.` or `^` makes the
//! path relative to the starting module; otherwise it is resolved from the
//! system module, and a first segment naming the system module (or the literal
//! `<root>`) is skipped.

use std::sync::OnceLock;

use log::warn;
use regex::Regex;

use super::{ModuleRef, ModuleTree};
use crate::error::{ModelResult, PathError};

const ROOT_NAME: &str = "<root>";

static INDEXED_SEGMENT: OnceLock<Regex> = OnceLock::new();

fn indexed_segment() -> &'static Regex {
    INDEXED_SEGMENT.get_or_init(|| {
        Regex::new(r"^([^\[\]]+)\[(\d+)\]$").expect("indexed segment pattern is valid")
    })
}

impl ModuleTree {
    /// `root.sub.vec[2]`. Cached per module when path caching is enabled.
    #[must_use]
    pub fn full_path(&self, module: ModuleRef) -> String {
        let Some(node) = self.arena.get(module) else {
            return format!("<deleted {module}>");
        };
        if self.config.cache_full_path {
            if let Some(path) = node.full_path.get() {
                return path.clone();
            }
        }
        let path = match node.parent.filter(|p| self.arena.contains(*p)) {
            Some(parent) => format!("{}.{}", self.full_path(parent), node.full_name()),
            None => node.full_name(),
        };
        if self.config.cache_full_path {
            let _ = node.full_path.set(path.clone());
        }
        path
    }

    /// Drops cached paths of `module` and its whole subtree.
    pub(crate) fn invalidate_paths(&mut self, module: ModuleRef) {
        let mut stack = vec![module];
        while let Some(m) = stack.pop() {
            let Some(node) = self.arena.get_mut(m) else {
                continue;
            };
            node.full_path.take();
            stack.extend(node.submodules.iter());
        }
    }

    /// Resolves `path` starting at `from`; `None` on any failure.
    #[must_use]
    pub fn find_module_by_path(&self, from: ModuleRef, path: &str) -> Option<ModuleRef> {
        match self.resolve_path(Some(from), path) {
            Ok(found) => found,
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    /// Resolves `path` from the system module; `None` on any failure.
    #[must_use]
    pub fn find_module(&self, path: &str) -> Option<ModuleRef> {
        match self.resolve_path(self.system, path) {
            Ok(found) => found,
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    /// Like [`ModuleTree::find_module_by_path`], but fails with a path error.
    pub fn module_by_path(&self, from: ModuleRef, path: &str) -> ModelResult<ModuleRef> {
        self.resolve_path(Some(from), path)?.ok_or_else(|| {
            PathError::NotFound {
                path: path.to_string(),
            }
            .into()
        })
    }

    fn resolve_path(&self, from: Option<ModuleRef>, path: &str) -> Result<Option<ModuleRef>, PathError> {
        if path.is_empty() {
            return Ok(None);
        }
        let relative = path.starts_with('.') || path.starts_with('^');
        let start = if relative { from } else { self.system };
        let Some(mut current) = start.filter(|m| self.arena.contains(*m)) else {
            return Ok(None);
        };
        let body = path.strip_prefix('.').unwrap_or(path);

        for (i, segment) in body.split('.').enumerate() {
            if segment.is_empty() {
                continue;
            }
            if !relative && i == 0 && (segment == ROOT_NAME || self.is_named(current, segment)) {
                continue;
            }
            let next = if segment == "^" {
                self.arena.get(current).and_then(|m| m.parent)
            } else if segment.contains('[') || segment.contains(']') {
                let caps = indexed_segment().captures(segment).ok_or_else(|| PathError::Syntax {
                    path: path.to_string(),
                    reason: "unmatched bracket or malformed index".to_string(),
                })?;
                let name = &caps[1];
                if name == ROOT_NAME {
                    return Err(misplaced_root(path));
                }
                let index: usize = caps[2].parse().map_err(|_| PathError::Syntax {
                    path: path.to_string(),
                    reason: format!("index out of range in '{segment}'"),
                })?;
                self.get_submodule(current, name, Some(index))
            } else if segment == ROOT_NAME {
                return Err(misplaced_root(path));
            } else {
                self.get_submodule(current, segment, None)
            };
            match next {
                Some(m) => current = m,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn is_named(&self, module: ModuleRef, name: &str) -> bool {
        self.arena.get(module).is_some_and(|m| m.name == name)
    }
}

fn misplaced_root(path: &str) -> PathError {
    PathError::Syntax {
        path: path.to_string(),
        reason: format!("'{ROOT_NAME}' may only occur as the first component"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ModuleType, ModuleTypeBuilder};
    use std::rc::Rc;

    fn ty(name: &str) -> Rc<dyn ModuleType> {
        ModuleTypeBuilder::new(name).build()
    }

    fn sample() -> (ModuleTree, ModuleRef, ModuleRef, ModuleRef) {
        let mut tree = ModuleTree::default();
        let net = tree.create_module(&ty("Net"), "net", None, None).unwrap();
        let router = tree.create_module(&ty("Router"), "router", Some(net), None).unwrap();
        tree.add_submodule_vector(router, "port", 3).unwrap();
        let port = tree
            .create_module(&ty("Port"), "port", Some(router), Some(2))
            .unwrap();
        (tree, net, router, port)
    }

    #[test]
    fn test_full_path() {
        let (tree, net, router, port) = sample();
        assert_eq!(tree.full_path(net), "net");
        assert_eq!(tree.full_path(router), "net.router");
        assert_eq!(tree.full_path(port), "net.router.port[2]");
    }

    #[test]
    fn test_absolute_paths() {
        let (tree, net, router, port) = sample();
        assert_eq!(tree.find_module("net"), Some(net));
        assert_eq!(tree.find_module("net.router.port[2]"), Some(port));
        assert_eq!(tree.find_module("<root>.router"), Some(router));
        // The root name is optional.
        assert_eq!(tree.find_module("router.port[2]"), Some(port));
        assert_eq!(tree.find_module("net..router"), Some(router));
        assert_eq!(tree.find_module("net.router.port[1]"), None);
        assert_eq!(tree.find_module(""), None);
    }

    #[test]
    fn test_relative_paths() {
        let (tree, net, router, port) = sample();
        assert_eq!(tree.find_module_by_path(router, ".port[2]"), Some(port));
        assert_eq!(tree.find_module_by_path(port, "^"), Some(router));
        assert_eq!(tree.find_module_by_path(port, "^.^"), Some(net));
        assert_eq!(tree.find_module_by_path(net, "^"), None);
        // Absolute paths ignore the starting module.
        assert_eq!(tree.find_module_by_path(port, "net.router"), Some(router));
    }

    #[test]
    fn test_syntax_errors() {
        let (tree, net, _, _) = sample();
        assert_eq!(tree.find_module("net.router.port[2"), None);
        assert_eq!(tree.find_module("net.<root>"), None);
        let err = tree.module_by_path(net, "net.router.<root>").unwrap_err();
        assert!(err.is_path());
        assert!(format!("{err}").contains("first component"));
        let err = tree.module_by_path(net, ".nothing").unwrap_err();
        assert!(matches!(err, crate::ModelError::Path(PathError::NotFound { .. })));
    }
}
