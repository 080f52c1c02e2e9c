//! The host VM seam.

use crate::error::HostError;

/// A tick-polled script VM that can receive callbacks.
///
/// Arguments are pushed onto the VM stack in reverse declaration order
/// before [`exec`](Self::exec), as in the common `push then exec` calling
/// convention of embedded script VMs. Every method is called from the
/// polling thread only.
pub trait HostVm {
    /// Handle to a public function in the VM.
    type Callback: Copy;

    /// Name used in log fields.
    fn name(&self) -> &str;

    /// Resolve a public function by name.
    fn find_callback(&self, name: &str) -> Option<Self::Callback>;

    /// Push an integer argument.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] if the VM stack rejects the value.
    fn push_int(&mut self, value: i32) -> Result<(), HostError>;

    /// Push a string argument.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] if the VM cannot allocate the string.
    fn push_str(&mut self, value: &str) -> Result<(), HostError>;

    /// Execute `callback` with the pushed arguments and return its code.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] if the VM fails to run the function.
    fn exec(&mut self, callback: Self::Callback) -> Result<i32, HostError>;

    /// Free anything pushed since the last `exec`. Called after every
    /// delivery attempt, successful or not.
    fn release(&mut self) {}
}

impl<T: HostVm + ?Sized> HostVm for &mut T {
    type Callback = T::Callback;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn find_callback(&self, name: &str) -> Option<Self::Callback> {
        (**self).find_callback(name)
    }

    fn push_int(&mut self, value: i32) -> Result<(), HostError> {
        (**self).push_int(value)
    }

    fn push_str(&mut self, value: &str) -> Result<(), HostError> {
        (**self).push_str(value)
    }

    fn exec(&mut self, callback: Self::Callback) -> Result<i32, HostError> {
        (**self).exec(callback)
    }

    fn release(&mut self) {
        (**self).release();
    }
}
