//! [`Interpreter`] implementation over Extism.
//!
//! Call ABI: the guest export receives its arguments as a JSON array of
//! strings and returns UTF-8 text as its output.

use std::collections::HashMap;
use std::sync::Arc;

use extism::{Manifest, PluginBuilder, Wasm};
use tickbridge_core::{Interpreter, RuntimeFault, SearchPath};
use tracing::{debug, info};

use crate::config::WasmConfig;
use crate::module::{self, ExportKind, WasmModule};

/// A value in the WASM runtime.
#[derive(Debug, Clone)]
pub enum WasmValue {
    /// A named export of a loaded module.
    Export {
        /// Owning module.
        module: Arc<WasmModule>,
        /// Export name.
        name: String,
        /// Export kind.
        kind: ExportKind,
    },
    /// A string argument.
    Text(String),
    /// Raw bytes returned by a call.
    Output(Vec<u8>),
}

/// Embedded runtime that runs `.wasm` modules found on a search path.
pub struct WasmInterpreter {
    search: SearchPath,
    config: WasmConfig,
    modules: HashMap<String, Arc<WasmModule>>,
    plugins: HashMap<String, extism::Plugin>,
}

impl WasmInterpreter {
    /// Create an interpreter with an empty search path.
    #[must_use]
    pub fn new(config: WasmConfig) -> Self {
        Self {
            search: SearchPath::new(),
            config,
            modules: HashMap::new(),
            plugins: HashMap::new(),
        }
    }

    /// Add a directory to the search path.
    #[must_use]
    pub fn with_search_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.search.ensure(dir);
        self
    }

    /// Active limits.
    #[must_use]
    pub fn config(&self) -> &WasmConfig {
        &self.config
    }

    /// Modules imported so far.
    #[must_use]
    pub fn loaded_modules(&self) -> usize {
        self.modules.len()
    }

    fn plugin_for(&mut self, module: &WasmModule) -> Result<&mut extism::Plugin, RuntimeFault> {
        if !self.plugins.contains_key(module.name()) {
            let manifest = Manifest::new([Wasm::data(module.bytes().to_vec())])
                .with_timeout(self.config.max_execution_time)
                .with_memory_max(self.config.max_pages());
            let plugin = PluginBuilder::new(manifest)
                .with_wasi(self.config.enable_wasi)
                .build()
                .map_err(|e| {
                    RuntimeFault::new(
                        "ImportError",
                        format!("failed to instantiate '{}': {e}", module.name()),
                    )
                })?;
            debug!(module = module.name(), "instantiated plugin");
            self.plugins.insert(module.name().to_owned(), plugin);
        }
        self.plugins.get_mut(module.name()).ok_or_else(|| {
            RuntimeFault::new("ImportError", format!("plugin for '{}' vanished", module.name()))
        })
    }
}

impl std::fmt::Debug for WasmInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmInterpreter")
            .field("search", &self.search)
            .field("config", &self.config)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Interpreter for WasmInterpreter {
    type Module = Arc<WasmModule>;
    type Value = WasmValue;

    fn search_path_mut(&mut self) -> &mut SearchPath {
        &mut self.search
    }

    fn import(&mut self, name: &str) -> Result<Arc<WasmModule>, RuntimeFault> {
        if let Some(loaded) = self.modules.get(name) {
            return Ok(Arc::clone(loaded));
        }
        let loaded = Arc::new(module::load(name, &self.search)?);
        debug!(
            module = name,
            path = %loaded.path().display(),
            exports = loaded.export_names().count(),
            "imported module"
        );
        self.modules.insert(name.to_owned(), Arc::clone(&loaded));
        Ok(loaded)
    }

    fn attribute(
        &mut self,
        module: &Arc<WasmModule>,
        name: &str,
    ) -> Result<Option<WasmValue>, RuntimeFault> {
        Ok(module.export(name).map(|kind| WasmValue::Export {
            module: Arc::clone(module),
            name: name.to_owned(),
            kind,
        }))
    }

    fn is_callable(&self, value: &WasmValue) -> bool {
        matches!(
            value,
            WasmValue::Export {
                kind: ExportKind::Function,
                ..
            }
        )
    }

    fn argument(&mut self, text: &str) -> WasmValue {
        WasmValue::Text(text.to_owned())
    }

    fn call(&mut self, callable: &WasmValue, args: &[WasmValue]) -> Result<WasmValue, RuntimeFault> {
        let WasmValue::Export {
            module,
            name,
            kind: ExportKind::Function,
        } = callable
        else {
            return Err(RuntimeFault::new("TypeError", "object is not callable"));
        };

        let input = encode_arguments(args)?;
        let plugin = self.plugin_for(module)?;
        let output = plugin
            .call::<&str, &[u8]>(name, input.as_str())
            .map(<[u8]>::to_vec)
            .map_err(|e| {
                RuntimeFault::new("CallError", format!("{}.{name} failed: {e}", module.name()))
                    .with_trace(format!("{e:?}"))
            })?;
        Ok(WasmValue::Output(output))
    }

    fn to_text(&mut self, value: &WasmValue) -> Result<String, RuntimeFault> {
        match value {
            WasmValue::Text(text) => Ok(text.clone()),
            WasmValue::Output(bytes) => decode_output(bytes.clone()),
            WasmValue::Export { name, kind, .. } => Err(RuntimeFault::new(
                "TypeError",
                format!("{kind:?} export '{name}' has no text form"),
            )),
        }
    }

    fn finalize(&mut self) {
        let plugins = self.plugins.len();
        self.plugins.clear();
        self.modules.clear();
        info!(plugins, "WASM runtime finalized");
    }
}

/// Encode positional arguments as a JSON array of strings.
///
/// # Errors
///
/// `TypeError` if an argument is not a string value.
pub fn encode_arguments(args: &[WasmValue]) -> Result<String, RuntimeFault> {
    let texts = args
        .iter()
        .map(|arg| match arg {
            WasmValue::Text(text) => Ok(text.as_str()),
            WasmValue::Export { name, .. } => Err(RuntimeFault::new(
                "TypeError",
                format!("export '{name}' cannot be passed as an argument"),
            )),
            WasmValue::Output(_) => Err(RuntimeFault::new(
                "TypeError",
                "raw output cannot be passed as an argument",
            )),
        })
        .collect::<Result<Vec<&str>, _>>()?;
    serde_json::to_string(&texts)
        .map_err(|e| RuntimeFault::new("TypeError", format!("cannot encode arguments: {e}")))
}

/// Decode call output as UTF-8.
///
/// # Errors
///
/// `UnicodeDecodeError` naming the first invalid byte offset.
pub fn decode_output(bytes: Vec<u8>) -> Result<String, RuntimeFault> {
    String::from_utf8(bytes).map_err(|e| {
        RuntimeFault::new(
            "UnicodeDecodeError",
            format!(
                "output is not valid UTF-8 at byte {}",
                e.utf8_error().valid_up_to()
            ),
        )
    })
}
