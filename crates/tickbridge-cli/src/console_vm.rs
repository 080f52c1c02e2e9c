//! A host VM that prints callbacks instead of running script code.

use std::io::Write;

use tickbridge_core::{HostError, HostVm};

/// Stands in for a script VM with public functions. Each delivered callback
/// is written as one line, `callback("module", "result", len)`.
pub struct ConsoleVm<W> {
    name: String,
    publics: Vec<String>,
    module: Option<String>,
    result: Option<String>,
    len: Option<i32>,
    delivered: usize,
    out: W,
}

impl<W: Write> ConsoleVm<W> {
    /// Create a VM writing to `out`.
    pub fn new(name: impl Into<String>, out: W) -> Self {
        Self {
            name: name.into(),
            publics: Vec::new(),
            module: None,
            result: None,
            len: None,
            delivered: 0,
            out,
        }
    }

    /// Declare a public function.
    #[must_use]
    pub fn with_public(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.publics.push(name);
        }
        self
    }

    /// Callbacks executed so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        self.out
    }
}

impl<W: Write> HostVm for ConsoleVm<W> {
    type Callback = usize;

    fn name(&self) -> &str {
        &self.name
    }

    fn find_callback(&self, name: &str) -> Option<usize> {
        self.publics.iter().position(|p| p == name)
    }

    fn push_int(&mut self, value: i32) -> Result<(), HostError> {
        self.len = Some(value);
        Ok(())
    }

    // Strings arrive result first, then module.
    fn push_str(&mut self, value: &str) -> Result<(), HostError> {
        if self.result.is_none() {
            self.result = Some(value.to_owned());
        } else if self.module.is_none() {
            self.module = Some(value.to_owned());
        } else {
            return Err(HostError::Push("callback takes two strings".to_owned()));
        }
        Ok(())
    }

    fn exec(&mut self, callback: usize) -> Result<i32, HostError> {
        let name = self
            .publics
            .get(callback)
            .ok_or_else(|| HostError::Exec(format!("no public at index {callback}")))?;
        let (Some(module), Some(result), Some(len)) = (&self.module, &self.result, self.len) else {
            return Err(HostError::Exec("missing arguments".to_owned()));
        };
        writeln!(self.out, "{name}({module:?}, {result:?}, {len})")
            .map_err(|e| HostError::Exec(e.to_string()))?;
        self.delivered = self.delivered.saturating_add(1);
        Ok(0)
    }

    fn release(&mut self) {
        self.module = None;
        self.result = None;
        self.len = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_callback_line() {
        let mut vm = ConsoleVm::new("console", Vec::new()).with_public("onResult");
        let cb = vm.find_callback("onResult").unwrap();
        vm.push_int(2).unwrap();
        vm.push_str("43").unwrap();
        vm.push_str("calc").unwrap();
        assert_eq!(vm.exec(cb).unwrap(), 0);
        vm.release();

        assert_eq!(vm.delivered(), 1);
        let text = String::from_utf8(vm.into_output()).unwrap();
        assert_eq!(text, "onResult(\"calc\", \"43\", 2)\n");
    }

    #[test]
    fn empty_callback_name_is_not_public() {
        let vm = ConsoleVm::new("console", Vec::new()).with_public("");
        assert!(vm.find_callback("").is_none());
    }

    #[test]
    fn exec_without_arguments_fails() {
        let mut vm = ConsoleVm::new("console", Vec::new()).with_public("onResult");
        assert!(vm.exec(0).is_err());
    }
}
