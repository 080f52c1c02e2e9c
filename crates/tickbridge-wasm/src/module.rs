//! Locating module files and reading their exports.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tickbridge_core::{RuntimeFault, SearchPath};

/// Kind of a module export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// A function; the only callable kind.
    Function,
    /// A table.
    Table,
    /// A linear memory.
    Memory,
    /// A global.
    Global,
    /// Anything newer.
    Other,
}

impl From<wasmparser::ExternalKind> for ExportKind {
    fn from(kind: wasmparser::ExternalKind) -> Self {
        match kind {
            wasmparser::ExternalKind::Func => Self::Function,
            wasmparser::ExternalKind::Table => Self::Table,
            wasmparser::ExternalKind::Memory => Self::Memory,
            wasmparser::ExternalKind::Global => Self::Global,
            _ => Self::Other,
        }
    }
}

/// A module file read from disk, not yet instantiated.
pub struct WasmModule {
    name: String,
    path: PathBuf,
    bytes: Vec<u8>,
    exports: BTreeMap<String, ExportKind>,
}

impl WasmModule {
    /// Dotted module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the module was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw module bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Kind of export `name`, if the module has one.
    #[must_use]
    pub fn export(&self, name: &str) -> Option<ExportKind> {
        self.exports.get(name).copied()
    }

    /// Exported names, sorted.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for WasmModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("size", &self.bytes.len())
            .field("exports", &self.exports)
            .finish()
    }
}

/// Map `a.b.c` to `a/b/c.wasm`. `None` for names that could escape the
/// search directory or have empty segments.
#[must_use]
pub fn relative_path(module: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for segment in module.split('.') {
        if segment.is_empty() || segment.contains(['/', '\\']) {
            return None;
        }
        path.push(segment);
    }
    path.set_extension("wasm");
    Some(path)
}

/// Find and read `module` from the first search directory that has it.
///
/// # Errors
///
/// `ModuleNotFoundError` if no directory holds the file, `ImportError` if it
/// is unreadable or not valid WASM.
pub fn load(module: &str, search: &SearchPath) -> Result<WasmModule, RuntimeFault> {
    let relative = relative_path(module).ok_or_else(|| {
        RuntimeFault::new("ModuleNotFoundError", format!("invalid module name '{module}'"))
    })?;

    let Some(path) = search
        .iter()
        .map(|dir| dir.join(&relative))
        .find(|candidate| candidate.is_file())
    else {
        let searched: Vec<String> = search.iter().map(|d| d.display().to_string()).collect();
        return Err(
            RuntimeFault::new("ModuleNotFoundError", format!("no module named '{module}'"))
                .with_trace(format!("searched: [{}]", searched.join(", "))),
        );
    };

    let bytes = std::fs::read(&path).map_err(|e| {
        RuntimeFault::new(
            "ImportError",
            format!("failed to read {}: {e}", path.display()),
        )
    })?;
    let exports = inspect_exports(&bytes).map_err(|e| {
        RuntimeFault::new(
            "ImportError",
            format!("{} is not a valid module: {e}", path.display()),
        )
    })?;

    Ok(WasmModule {
        name: module.to_owned(),
        path,
        bytes,
        exports,
    })
}

/// Read the export section of a WASM binary.
///
/// # Errors
///
/// Returns the parser error for malformed input.
pub fn inspect_exports(
    bytes: &[u8],
) -> Result<BTreeMap<String, ExportKind>, wasmparser::BinaryReaderError> {
    let mut exports = BTreeMap::new();
    for payload in wasmparser::Parser::new(0).parse_all(bytes) {
        if let wasmparser::Payload::ExportSection(reader) = payload? {
            for export in reader {
                let export = export?;
                exports.insert(export.name.to_owned(), ExportKind::from(export.kind));
            }
        }
    }
    Ok(exports)
}
