//! Per-tick delivery of completed calls into host VMs.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::call::CompletedCall;
use crate::error::{DeliveryError, DeliveryResult};
use crate::host::HostVm;
use crate::queue::CompletionQueue;

/// How the completion queue is drained on each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Wait for the queue lock.
    #[default]
    Blocking,
    /// Skip the tick if a worker holds the lock.
    TryLock,
}

/// Counts from one delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Callback executions, one per receiving VM.
    pub delivered: usize,
    /// Fire-and-forget results dropped.
    pub discarded: usize,
    /// Results whose callback no VM defines.
    pub missing: usize,
    /// Executions that failed in the host.
    pub failed: usize,
}

impl DeliveryReport {
    /// Whether the pass did nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Drains the completion queue into host VM callbacks.
#[derive(Debug, Clone)]
pub struct TickDelivery {
    queue: Arc<CompletionQueue>,
    policy: DrainPolicy,
}

impl TickDelivery {
    /// Create a delivery stage over `queue`.
    #[must_use]
    pub fn new(queue: Arc<CompletionQueue>, policy: DrainPolicy) -> Self {
        Self { queue, policy }
    }

    /// Active drain policy.
    #[must_use]
    pub fn policy(&self) -> DrainPolicy {
        self.policy
    }

    /// Deliver everything queued into `vm`.
    ///
    /// Results `vm` cannot take are dropped. With several VMs, use
    /// [`TickDelivery::deliver_all`].
    pub fn deliver<V: HostVm>(&self, vm: &mut V) -> DeliveryReport {
        self.deliver_all(std::slice::from_mut(vm))
    }

    /// Deliver everything queued, offering each result to every VM.
    ///
    /// Each VM that defines the callback receives the result. If none does,
    /// one `CallbackNotFound` is logged and the result is dropped.
    pub fn deliver_all<V: HostVm>(&self, vms: &mut [V]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let Some(calls) = self.drain() else {
            return report;
        };
        if calls.is_empty() {
            return report;
        }
        trace!(count = calls.len(), vms = vms.len(), "delivering completed calls");

        for call in calls {
            if call.callback().is_empty() {
                trace!(call_id = %call.id(), "fire-and-forget result discarded");
                report.discarded = report.discarded.saturating_add(1);
                continue;
            }

            let mut found = false;
            for vm in vms.iter_mut() {
                let Some(callback) = vm.find_callback(call.callback()) else {
                    continue;
                };
                found = true;
                match invoke_callback(vm, callback, &call) {
                    Ok(()) => report.delivered = report.delivered.saturating_add(1),
                    Err(err) => {
                        warn!(call_id = %call.id(), error = %err, "delivery failed");
                        report.failed = report.failed.saturating_add(1);
                    },
                }
            }

            if !found {
                let err = DeliveryError::CallbackNotFound {
                    vm: vm_names(vms),
                    callback: call.callback().to_owned(),
                };
                error!(call_id = %call.id(), module = call.module(), error = %err, "result dropped");
                report.missing = report.missing.saturating_add(1);
            }
        }

        report
    }

    fn drain(&self) -> Option<Vec<CompletedCall>> {
        match self.policy {
            DrainPolicy::Blocking => Some(self.queue.drain_all()),
            DrainPolicy::TryLock => self.queue.try_drain(),
        }
    }
}

/// Push `(module, result, len)` in reverse order and execute.
fn invoke_callback<V: HostVm>(
    vm: &mut V,
    callback: V::Callback,
    call: &CompletedCall,
) -> DeliveryResult<()> {
    let result_len = i32::try_from(call.result().len()).unwrap_or(i32::MAX);

    let outcome = vm
        .push_int(result_len)
        .and_then(|()| vm.push_str(call.result()))
        .and_then(|()| vm.push_str(call.module()))
        .and_then(|()| vm.exec(callback));
    vm.release();

    let code = outcome.map_err(|source| DeliveryError::Host {
        vm: vm.name().to_owned(),
        source,
    })?;

    if code != 0 {
        debug!(
            call_id = %call.id(),
            vm = vm.name(),
            callback = call.callback(),
            code,
            "callback returned non-zero; treated as handled"
        );
    } else {
        debug!(
            call_id = %call.id(),
            vm = vm.name(),
            callback = call.callback(),
            "callback delivered"
        );
    }
    Ok(())
}

fn vm_names<V: HostVm>(vms: &[V]) -> String {
    if vms.is_empty() {
        return "<no vm>".to_owned();
    }
    vms.iter().map(HostVm::name).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::call::CallDescriptor;
    use crate::error::HostError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Pushed {
        Int(i32),
        Str(String),
    }

    struct StackVm {
        name: String,
        publics: HashMap<String, usize>,
        stack: Vec<Pushed>,
        calls: Vec<(usize, Vec<Pushed>)>,
        code: i32,
        fail_exec: bool,
        released: usize,
    }

    impl StackVm {
        fn new(name: &str, publics: &[&str]) -> Self {
            Self {
                name: name.to_owned(),
                publics: publics
                    .iter()
                    .enumerate()
                    .map(|(i, p)| ((*p).to_owned(), i))
                    .collect(),
                stack: Vec::new(),
                calls: Vec::new(),
                code: 0,
                fail_exec: false,
                released: 0,
            }
        }
    }

    impl HostVm for StackVm {
        type Callback = usize;

        fn name(&self) -> &str {
            &self.name
        }

        fn find_callback(&self, name: &str) -> Option<usize> {
            self.publics.get(name).copied()
        }

        fn push_int(&mut self, value: i32) -> Result<(), HostError> {
            self.stack.push(Pushed::Int(value));
            Ok(())
        }

        fn push_str(&mut self, value: &str) -> Result<(), HostError> {
            self.stack.push(Pushed::Str(value.to_owned()));
            Ok(())
        }

        fn exec(&mut self, callback: usize) -> Result<i32, HostError> {
            if self.fail_exec {
                return Err(HostError::Exec("stack overflow".to_owned()));
            }
            let args = std::mem::take(&mut self.stack);
            self.calls.push((callback, args));
            Ok(self.code)
        }

        fn release(&mut self) {
            self.stack.clear();
            self.released += 1;
        }
    }

    fn queued(entries: &[(&str, &str, &str)]) -> Arc<CompletionQueue> {
        let queue = Arc::new(CompletionQueue::new());
        for (module, callback, result) in entries {
            queue.push(CompletedCall::new(
                CallDescriptor::new(*module, "f").with_callback(*callback),
                (*result).to_owned(),
            ));
        }
        queue
    }

    #[test]
    fn pushes_arguments_in_reverse_declaration_order() {
        let queue = queued(&[("calc", "onResult", "43")]);
        let mut vm = StackVm::new("gm", &["onResult"]);

        let report = TickDelivery::new(queue, DrainPolicy::Blocking).deliver(&mut vm);

        assert_eq!(report.delivered, 1);
        assert_eq!(
            vm.calls,
            [(
                0,
                vec![
                    Pushed::Int(2),
                    Pushed::Str("43".to_owned()),
                    Pushed::Str("calc".to_owned()),
                ]
            )]
        );
        assert_eq!(vm.released, 1);
    }

    #[test]
    fn empty_queue_is_a_no_op() {
        let mut vm = StackVm::new("gm", &["onResult"]);
        let report = TickDelivery::new(Arc::new(CompletionQueue::new()), DrainPolicy::Blocking)
            .deliver(&mut vm);
        assert!(report.is_empty());
        assert!(vm.calls.is_empty());
    }

    #[test]
    fn fire_and_forget_is_discarded() {
        let queue = queued(&[("calc", "", "43")]);
        let mut vm = StackVm::new("gm", &["onResult"]);
        let report = TickDelivery::new(Arc::clone(&queue), DrainPolicy::Blocking).deliver(&mut vm);
        assert_eq!(report.discarded, 1);
        assert!(vm.calls.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn missing_callback_is_dropped_not_retried() {
        let queue = queued(&[("calc", "onMissing", "1")]);
        let mut vm = StackVm::new("gm", &["onResult"]);
        let delivery = TickDelivery::new(Arc::clone(&queue), DrainPolicy::Blocking);

        assert_eq!(delivery.deliver(&mut vm).missing, 1);
        assert!(queue.is_empty());
        assert!(delivery.deliver(&mut vm).is_empty());
    }

    #[test]
    fn non_zero_return_is_not_redelivered() {
        let queue = queued(&[("calc", "onResult", "1")]);
        let mut vm = StackVm::new("gm", &["onResult"]);
        vm.code = 1;
        let delivery = TickDelivery::new(queue, DrainPolicy::Blocking);

        assert_eq!(delivery.deliver(&mut vm).delivered, 1);
        assert!(delivery.deliver(&mut vm).is_empty());
        assert_eq!(vm.calls.len(), 1);
    }

    #[test]
    fn host_failure_is_counted_and_released() {
        let queue = queued(&[("calc", "onResult", "1")]);
        let mut vm = StackVm::new("gm", &["onResult"]);
        vm.fail_exec = true;

        let report = TickDelivery::new(queue, DrainPolicy::Blocking).deliver(&mut vm);
        assert_eq!(report.failed, 1);
        assert_eq!(vm.released, 1);
        assert!(vm.stack.is_empty());
    }

    #[test]
    fn every_defining_vm_receives_the_result() {
        let queue = queued(&[("calc", "onResult", "9"), ("calc", "onOther", "8")]);
        let mut vms = vec![
            StackVm::new("gm", &["onResult"]),
            StackVm::new("fs1", &["onResult", "onOther"]),
            StackVm::new("fs2", &[]),
        ];

        let report = TickDelivery::new(queue, DrainPolicy::Blocking).deliver_all(&mut vms);

        assert_eq!(report.delivered, 3);
        assert_eq!(report.missing, 0);
        assert_eq!(vms[0].calls.len(), 1);
        assert_eq!(vms[1].calls.len(), 2);
        assert!(vms[2].calls.is_empty());
    }

    #[test]
    fn delivery_follows_drain_order() {
        let queue = queued(&[("a", "onResult", "1"), ("b", "onResult", "2")]);
        let mut vm = StackVm::new("gm", &["onResult"]);
        TickDelivery::new(queue, DrainPolicy::TryLock).deliver(&mut vm);

        let modules: Vec<_> = vm
            .calls
            .iter()
            .map(|(_, args)| args[2].clone())
            .collect();
        assert_eq!(
            modules,
            [Pushed::Str("b".to_owned()), Pushed::Str("a".to_owned())]
        );
    }
}
