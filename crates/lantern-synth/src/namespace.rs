//! Symbol namespace manager.
//!
//! Generated candidate code refers to items from many modules. The manager
//! hands out one local name per canonical path so that imports requested by
//! independent synthesis calls never collide inside one compilation unit.
//!
//! One manager lives for one orchestration run and is passed explicitly;
//! it is only ever mutated through `&mut self` while source text is being
//! generated.

use std::collections::{BTreeMap, BTreeSet};

/// `use <path> as <local_name>;`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ImportBinding {
    pub local_name: String,
    pub path: String,
}

/// Result of [`NamespaceManager::bind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Name to use in generated text.
    pub local_name: String,
    /// Import to emit, if any. `None` for own-module and deny-listed paths.
    pub import: Option<ImportBinding>,
}

/// Paths that are always in scope through the prelude or are unsafe to
/// re-import.
const DEFAULT_DENY_LIST: &[&str] = &[
    "std::string::String",
    "alloc::string::String",
    "std::vec::Vec",
    "alloc::vec::Vec",
    "std::option::Option",
    "core::option::Option",
    "std::boxed::Box",
    "alloc::boxed::Box",
    "std::result::Result",
    "core::result::Result",
    "std::default::Default",
    "core::default::Default",
];

#[derive(Debug, Clone)]
pub struct NamespaceManager {
    /// Module the generated code is compiled into, e.g. `crate::parser`.
    module_path: String,
    /// Canonical path -> local name.
    by_path: BTreeMap<String, String>,
    /// Local name -> canonical path.
    by_name: BTreeMap<String, String>,
    /// Paths bound without an import (own module, deny-list).
    unimported: BTreeSet<String>,
    deny_list: BTreeSet<String>,
}

impl NamespaceManager {
    pub fn new(module_path: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            by_path: BTreeMap::new(),
            by_name: BTreeMap::new(),
            unimported: BTreeSet::new(),
            deny_list: DEFAULT_DENY_LIST.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn deny(&mut self, path: impl Into<String>) {
        self.deny_list.insert(path.into());
    }

    /// Bind `path` under a local name derived from `hint`.
    ///
    /// Repeated calls with the same path return the same binding.
    pub fn bind(&mut self, hint: &str, path: &str) -> Binding {
        if self.deny_list.contains(path) {
            return Binding {
                local_name: last_segment(path).unwrap_or(hint).to_string(),
                import: None,
            };
        }

        if let Some(local) = self.by_path.get(path) {
            return self.binding_for(local.clone(), path);
        }

        let own = self.is_own(path);
        let local = if own {
            self.own_name(path, hint)
        } else {
            self.free_name(hint)
        };
        log::debug!("bound {path} as {local}");
        self.by_path.insert(path.to_string(), local.clone());
        if !local.contains("::") {
            self.by_name.insert(local.clone(), path.to_string());
        }
        if own {
            self.unimported.insert(path.to_string());
        }
        self.binding_for(local, path)
    }

    /// Hold the name of an item defined in the generated code's own module,
    /// so imports bound later are aliased around it.
    pub fn reserve(&mut self, name: &str) {
        let path = format!("{}::{name}", self.module_path);
        self.bind(name, &path);
    }

    /// Canonical path behind a local name handed out by [`bind`](Self::bind).
    pub fn resolve(&self, local_name: &str) -> Option<&str> {
        self.by_name.get(local_name).map(String::as_str)
    }

    /// All imports that must be emitted, sorted by path.
    pub fn imports(&self) -> Vec<ImportBinding> {
        let mut imports: Vec<ImportBinding> = self
            .by_path
            .iter()
            .filter(|(path, _)| !self.unimported.contains(*path))
            .map(|(path, local)| ImportBinding {
                local_name: local.clone(),
                path: path.clone(),
            })
            .collect();
        imports.sort_by(|a, b| a.path.cmp(&b.path));
        imports
    }

    /// `use` lines for every import, one per line.
    pub fn use_declarations(&self) -> String {
        let mut out = String::new();
        for import in self.imports() {
            if last_segment(&import.path) == Some(import.local_name.as_str()) {
                out.push_str(&format!("use {};\n", import.path));
            } else {
                out.push_str(&format!("use {} as {};\n", import.path, import.local_name));
            }
        }
        out
    }

    fn binding_for(&self, local_name: String, path: &str) -> Binding {
        let import = if self.unimported.contains(path) {
            None
        } else {
            Some(ImportBinding {
                local_name: local_name.clone(),
                path: path.to_string(),
            })
        };
        Binding { local_name, import }
    }

    fn is_own(&self, path: &str) -> bool {
        if path == self.module_path {
            return true;
        }
        match path.rsplit_once("::") {
            Some((parent, _)) => parent == self.module_path,
            None => false,
        }
    }

    /// Own items are reachable without an import under their own name only.
    /// When an import already holds that name the item is spelled through
    /// the suite module's parent instead.
    fn own_name(&self, path: &str, hint: &str) -> String {
        let name = last_segment(path).unwrap_or(hint);
        match self.by_name.get(name) {
            None => name.to_string(),
            Some(holder) => {
                log::warn!("{name} is already bound to {holder}; {path} is named through super");
                format!("super::{name}")
            }
        }
    }

    /// `base`, or `base1`, `base2`, ... whichever is free first.
    fn free_name(&self, base: &str) -> String {
        if !self.by_name.contains_key(base) {
            return base.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{base}{n}");
            if !self.by_name.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn last_segment(path: &str) -> Option<&str> {
    path.rsplit("::").next().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_binding_keeps_hint() {
        let mut ns = NamespaceManager::new("crate::parser");
        let binding = ns.bind("HashMap", "std::collections::HashMap");
        assert_eq!(binding.local_name, "HashMap");
        assert_eq!(
            binding.import,
            Some(ImportBinding {
                local_name: "HashMap".into(),
                path: "std::collections::HashMap".into(),
            })
        );
    }

    #[test]
    fn test_use_declarations_render_aliases() {
        let mut ns = NamespaceManager::new("crate::parser");
        ns.bind("Error", "std::io::Error");
        ns.bind("Error", "crate::model::Error");
        assert_eq!(
            ns.use_declarations(),
            "use crate::model::Error as Error1;\nuse std::io::Error;\n"
        );
    }
}
