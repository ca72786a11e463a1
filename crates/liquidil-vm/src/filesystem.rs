//! File system provider: resolves a partial template name to its source
//! text. A synchronous read is the only I/O the VM performs.

use std::collections::HashMap;
use std::path::PathBuf;

pub trait FileSystemProvider {
    /// Returns `None` when `name` can't be resolved; the VM turns that
    /// into `RuntimeError::UnresolvedPartial` at the `render`/`include`
    /// call site.
    fn read(&self, name: &str) -> Option<String>;
}

/// Test double over an in-memory map, keyed by partial name (no `.liquid`
/// suffix or directory assumed).
#[derive(Debug, Default, Clone)]
pub struct MapFileSystem {
    templates: HashMap<String, String>,
}

impl MapFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }
}

impl FileSystemProvider for MapFileSystem {
    fn read(&self, name: &str) -> Option<String> {
        self.templates.get(name).cloned()
    }
}

/// Reads `<root>/<name>.liquid` from disk.
#[derive(Debug, Clone)]
pub struct DirFileSystem {
    root: PathBuf,
}

impl DirFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSystemProvider for DirFileSystem {
    fn read(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(format!("{name}.liquid"))).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_file_system_resolves_registered_names() {
        let fs = MapFileSystem::new().with("greeting", "hi {{ name }}");
        assert_eq!(fs.read("greeting"), Some("hi {{ name }}".to_string()));
        assert_eq!(fs.read("missing"), None);
    }
}
