//! Prelude module - commonly used test helpers.
//!
//! Use `use tickbridge_test::prelude::*;` to import all essential helpers.

pub use crate::{Invocation, RecordingVm, ScriptValue, ScriptedInterpreter, ScriptedModule};
pub use crate::{LogCapture, capture_logs};
pub use crate::{WasmFixture, calc_interpreter, calc_module, wait_until};
