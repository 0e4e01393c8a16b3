//! Runtime configuration.
//!
//! `ModuleConfig` bundles the small number of knobs the module loader and
//! VM need as explicit constructor parameters, rather than a global config
//! object or environment-variable sprawl.

use std::path::PathBuf;

/// Resolution and execution limits shared by the module loader and VM.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// Directory dotted import paths (`a.b.c`) are resolved relative to,
    /// yielding `a/b/c.<extension>`.
    pub root_dir: PathBuf,
    /// Source file extension. Fern's own programs use `.fn`, kept
    /// configurable rather than a hardcoded literal.
    pub extension: String,
    /// Maximum non-reactive call depth before a fatal stack overflow.
    pub max_call_depth: usize,
}

impl ModuleConfig {
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            extension: "fn".to_owned(),
            max_call_depth: 2048,
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}
