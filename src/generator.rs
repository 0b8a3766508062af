//! High-level generation driver: many annotated headers in, one unit out.

use std::path::Path;

use pyglue_core::{ModuleBuilder, PyglueError};
use pyglue_parser::{ScanError, Scanner};

/// Drives one generation run: a scanner over a module builder, frozen and
/// emitted once all inputs are consumed.
pub struct Generator {
    scanner: Scanner,
}

impl Generator {
    /// Create a generator for a named extension module.
    pub fn new(module_name: &str) -> Self {
        Self {
            scanner: Scanner::new(ModuleBuilder::new(module_name)),
        }
    }

    /// Create a generator whose emitted initializer calls into the wrapped
    /// library first (e.g. `AFF4_Init()`).
    pub fn with_init_call(module_name: &str, init_call: &str) -> Self {
        let mut builder = ModuleBuilder::new(module_name);
        builder.set_init_call(init_call);
        Self {
            scanner: Scanner::new(builder),
        }
    }

    /// Scan one annotated header file.
    pub fn parse_file(&mut self, path: &Path) -> Result<(), PyglueError> {
        log::debug!("scanning {}", path.display());
        self.scanner.scan_file(path).map_err(|err| match err {
            ScanError::Read { path, source } => PyglueError::Io { path, source },
        })
    }

    /// Scan annotated header text under a virtual include name.
    pub fn parse_source(&mut self, include_name: &str, text: &str) {
        self.scanner.scan_source(include_name, text);
    }

    /// Freeze the model and emit the generated source unit.
    pub fn generate(self) -> Result<String, PyglueError> {
        let module = self.scanner.into_builder().freeze();
        Ok(module.write()?)
    }
}
