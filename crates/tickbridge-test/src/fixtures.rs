//! Test fixtures: scripted modules and generated WASM binaries.

use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tickbridge_core::RuntimeFault;
use wasm_encoder::{
    CodeSection, EntityType, ExportKind, ExportSection, Function, FunctionSection, ImportSection,
    Instruction, Module, RawSection, TypeSection, ValType,
};

use crate::mocks::{ScriptValue, ScriptedInterpreter, ScriptedModule};

/// The `calc` module used throughout the tests.
///
/// - `add_one(n)`: `n + 1`, `ValueError` for non-integers
/// - `fixed()`: always `"hello from the runtime"`
/// - `echo(..)`: arguments joined by `,`
/// - `fail()`: raises `RuntimeError` with a trace
/// - `opaque()`: returns a value with no text form
/// - `slow(ms)`: sleeps, then returns `ms`
/// - `VERSION`: a non-callable constant
#[must_use]
pub fn calc_module() -> ScriptedModule {
    ScriptedModule::new()
        .function("add_one", |args| {
            let [arg] = args else {
                return Err(RuntimeFault::new(
                    "TypeError",
                    format!("add_one() takes 1 argument ({} given)", args.len()),
                ));
            };
            let n: i64 = arg.trim().parse().map_err(|_| {
                RuntimeFault::new(
                    "ValueError",
                    format!("invalid literal for int() with base 10: '{arg}'"),
                )
            })?;
            n.checked_add(1)
                .map(ScriptValue::Int)
                .ok_or_else(|| RuntimeFault::new("OverflowError", "result too large"))
        })
        .function("fixed", |_| Ok(ScriptValue::text("hello from the runtime")))
        .function("echo", |args| Ok(ScriptValue::text(args.join(","))))
        .function("fail", |_| {
            Err(RuntimeFault::new("RuntimeError", "deliberate failure")
                .with_trace("  File \"calc\", in fail"))
        })
        .function("opaque", |_| Ok(ScriptValue::Opaque("socket".to_owned())))
        .function("slow", |args| {
            let ms = args
                .first()
                .and_then(|a| a.parse::<u64>().ok())
                .unwrap_or(10);
            thread::sleep(Duration::from_millis(ms));
            Ok(ScriptValue::text(ms.to_string()))
        })
        .constant("VERSION", ScriptValue::Int(3))
}

/// A scripted interpreter with [`calc_module`] registered as `calc`.
#[must_use]
pub fn calc_interpreter() -> ScriptedInterpreter {
    ScriptedInterpreter::new().with_module("calc", calc_module())
}

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// elapses. Returns the final value of the condition.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if condition() {
            return true;
        }
        if deadline.is_none_or(|d| Instant::now() >= d) {
            return condition();
        }
        thread::sleep(Duration::from_millis(2));
    }
}

// ---------------------------------------------------------------------------
// WASM
// ---------------------------------------------------------------------------

/// Extism kernel namespace that plugins import host memory functions from.
const KERNEL: &str = "extism:host/env";

// Type indices in every generated module.
const TY_EXPORT: u32 = 0; // () -> i32
const TY_ALLOC: u32 = 1; // (i64) -> i64
const TY_STORE_U8: u32 = 2; // (i64, i32) -> ()
const TY_OUTPUT_SET: u32 = 3; // (i64, i64) -> ()

// Function indices of the kernel imports, when present.
const FN_ALLOC: u32 = 0;
const FN_STORE_U8: u32 = 1;
const FN_OUTPUT_SET: u32 = 2;

#[derive(Debug, Clone)]
enum Body {
    Returns(i32),
    Traps,
    Outputs(Vec<u8>),
}

/// Builds small WASM modules with chosen exports.
///
/// Every exported function has type `() -> i32`, the shape Extism calls.
/// Every global is an immutable `i32`. Modules that produce output import
/// `alloc`, `store_u8` and `output_set` from the Extism kernel.
#[derive(Debug, Clone, Default)]
pub struct WasmFixture {
    functions: Vec<(String, Body)>,
    globals: Vec<String>,
}

impl WasmFixture {
    /// Empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a function that returns 0 and produces no output.
    #[must_use]
    pub fn function(mut self, name: &str) -> Self {
        self.functions.push((name.to_owned(), Body::Returns(0)));
        self
    }

    /// Export a function that returns `code` without output.
    #[must_use]
    pub fn returning(mut self, name: &str, code: i32) -> Self {
        self.functions.push((name.to_owned(), Body::Returns(code)));
        self
    }

    /// Export a function that hits `unreachable`.
    #[must_use]
    pub fn trapping(mut self, name: &str) -> Self {
        self.functions.push((name.to_owned(), Body::Traps));
        self
    }

    /// Export a function that sets `output` as the call's output and
    /// returns 0.
    #[must_use]
    pub fn output(mut self, name: &str, output: impl Into<Vec<u8>>) -> Self {
        self.functions
            .push((name.to_owned(), Body::Outputs(output.into())));
        self
    }

    /// Export a global.
    #[must_use]
    pub fn global(mut self, name: &str) -> Self {
        self.globals.push(name.to_owned());
        self
    }

    /// Encode the module.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut module = Module::new();
        let uses_kernel = self
            .functions
            .iter()
            .any(|(_, body)| matches!(body, Body::Outputs(_)));
        let imported: u32 = if uses_kernel { 3 } else { 0 };

        let mut types = TypeSection::new();
        types.ty().function([], [ValType::I32]);
        types.ty().function([ValType::I64], [ValType::I64]);
        types.ty().function([ValType::I64, ValType::I32], []);
        types.ty().function([ValType::I64, ValType::I64], []);
        module.section(&types);

        if uses_kernel {
            let mut imports = ImportSection::new();
            imports.import(KERNEL, "alloc", EntityType::Function(TY_ALLOC));
            imports.import(KERNEL, "store_u8", EntityType::Function(TY_STORE_U8));
            imports.import(KERNEL, "output_set", EntityType::Function(TY_OUTPUT_SET));
            module.section(&imports);
        }

        if !self.functions.is_empty() {
            let mut funcs = FunctionSection::new();
            for _ in &self.functions {
                funcs.function(TY_EXPORT);
            }
            module.section(&funcs);
        }

        if !self.globals.is_empty() {
            // Global section: count, then `i32 const (i32.const 7)` each.
            let mut data = leb128_u32(index(self.globals.len()));
            for _ in &self.globals {
                data.extend_from_slice(&[0x7f, 0x00, 0x41, 0x07, 0x0b]);
            }
            module.section(&RawSection { id: 6, data: &data });
        }

        let mut exports = ExportSection::new();
        for (i, (name, _)) in self.functions.iter().enumerate() {
            exports.export(name, ExportKind::Func, imported.saturating_add(index(i)));
        }
        for (i, name) in self.globals.iter().enumerate() {
            exports.export(name, ExportKind::Global, index(i));
        }
        module.section(&exports);

        if !self.functions.is_empty() {
            let mut code = CodeSection::new();
            for (_, body) in &self.functions {
                code.function(&encode_body(body));
            }
            module.section(&code);
        }

        module.finish()
    }

    /// Write the module for the dotted name `module` under `dir`, creating
    /// intermediate directories. Returns the file path.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from creating directories or writing the file.
    pub fn write_to(&self, dir: &Path, module: &str) -> io::Result<PathBuf> {
        let mut path = dir.to_path_buf();
        for segment in module.split('.') {
            path.push(segment);
        }
        path.set_extension("wasm");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.build())?;
        Ok(path)
    }
}

fn encode_body(body: &Body) -> Function {
    match body {
        Body::Returns(code) => {
            let mut f = Function::new([]);
            f.instruction(&Instruction::I32Const(*code));
            f.instruction(&Instruction::End);
            f
        },
        Body::Traps => {
            let mut f = Function::new([]);
            f.instruction(&Instruction::Unreachable);
            f.instruction(&Instruction::End);
            f
        },
        Body::Outputs(bytes) => {
            // local 0: offset of the block returned by `alloc`.
            let mut f = Function::new([(1, ValType::I64)]);
            let len = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
            f.instruction(&Instruction::I64Const(len));
            f.instruction(&Instruction::Call(FN_ALLOC));
            f.instruction(&Instruction::LocalSet(0));
            for (at, byte) in (0_i64..).zip(bytes) {
                f.instruction(&Instruction::LocalGet(0));
                f.instruction(&Instruction::I64Const(at));
                f.instruction(&Instruction::I64Add);
                f.instruction(&Instruction::I32Const(i32::from(*byte)));
                f.instruction(&Instruction::Call(FN_STORE_U8));
            }
            f.instruction(&Instruction::LocalGet(0));
            f.instruction(&Instruction::I64Const(len));
            f.instruction(&Instruction::Call(FN_OUTPUT_SET));
            f.instruction(&Instruction::I32Const(0));
            f.instruction(&Instruction::End);
            f
        },
    }
}

fn index(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}

fn leb128_u32(mut value: u32) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = u8::try_from(value & 0x7f).unwrap_or(0);
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leb128_encodes_multi_byte_values() {
        assert_eq!(leb128_u32(3), [3]);
        assert_eq!(leb128_u32(300), [0xac, 0x02]);
    }

    #[test]
    fn built_module_has_wasm_header() {
        let bytes = WasmFixture::new().function("run").global("G").build();
        assert_eq!(&bytes[..4], b"\0asm");
    }

    #[test]
    fn output_functions_import_the_kernel() {
        let plain = WasmFixture::new().function("run").trapping("boom").build();
        let with_output = WasmFixture::new().output("greet", "hi").build();

        let kernel = KERNEL.as_bytes();
        assert!(!plain.windows(kernel.len()).any(|w| w == kernel));
        assert!(with_output.windows(kernel.len()).any(|w| w == kernel));
    }

    #[test]
    fn write_to_nests_dotted_names() {
        let dir = std::env::temp_dir().join(format!("tickbridge-fixture-{}", std::process::id()));
        let path = WasmFixture::new()
            .function("run")
            .write_to(&dir, "tools.text")
            .unwrap();
        assert!(path.ends_with("tools/text.wasm"));
        assert!(path.is_file());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn wait_until_times_out() {
        assert!(!wait_until(Duration::from_millis(10), || false));
        assert!(wait_until(Duration::from_millis(10), || true));
    }
}
