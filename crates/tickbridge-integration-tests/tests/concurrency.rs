//! Integration tests for concurrent producers and tick-side draining.

#![allow(clippy::arithmetic_side_effects)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tickbridge_core::{
    Bridge, BridgeOptions, CallDescriptor, CallId, CompletionQueue, DrainPolicy, Invoker,
    RuntimeFault, WorkerStrategy,
};
use tickbridge_test::prelude::*;

const CALLS: usize = 200;

fn run_many(drain: DrainPolicy) {
    let bridge = Bridge::start(
        calc_interpreter(),
        BridgeOptions {
            workers: WorkerStrategy::Pool {
                size: 4,
                queue_capacity: CALLS,
            },
            drain,
            include_cwd: false,
            search_paths: Vec::new(),
        },
    )
    .unwrap();
    let mut vm = RecordingVm::new("gamemode").with_callback("onResult");

    // Dispatch and tick interleaved, the way a host would.
    for n in 0..CALLS {
        bridge
            .dispatch_async(
                CallDescriptor::new("calc", "echo")
                    .with_callback("onResult")
                    .with_argument(n.to_string()),
            )
            .unwrap();
        if n % 10 == 0 {
            bridge.tick(&mut vm);
        }
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while vm.invocations().len() < CALLS && Instant::now() < deadline {
        bridge.tick(&mut vm);
        thread::sleep(Duration::from_millis(1));
    }
    bridge.shutdown();

    let mut seen: Vec<usize> = vm
        .invocations()
        .iter()
        .map(|i| i.result.parse().unwrap())
        .collect();
    assert_eq!(seen.len(), CALLS, "lost or duplicated results");
    seen.sort_unstable();
    assert_eq!(seen, (0..CALLS).collect::<Vec<_>>());
}

#[test]
fn no_results_lost_or_duplicated_with_blocking_drain() {
    run_many(DrainPolicy::Blocking);
}

#[test]
fn no_results_lost_or_duplicated_with_try_lock_drain() {
    run_many(DrainPolicy::TryLock);
}

#[test]
fn queue_survives_concurrent_push_and_drain() {
    let invoker = Invoker::new(calc_interpreter()).with_include_cwd(false);
    let queue = Arc::new(CompletionQueue::new());
    let per_thread = 50;

    let producers: Vec<_> = (0..4)
        .map(|t| {
            let invoker = invoker.clone();
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for n in 0..per_thread {
                    let call = CallDescriptor::new("calc", "echo")
                        .with_callback("onResult")
                        .with_argument(format!("{t}-{n}"));
                    queue.push(invoker.invoke(call).unwrap());
                }
            })
        })
        .collect();

    let mut ids: HashSet<CallId> = HashSet::new();
    let mut drained = 0;
    let mut use_try = false;
    while drained < 4 * per_thread {
        let batch = if use_try {
            queue.try_drain().unwrap_or_default()
        } else {
            queue.drain_all()
        };
        use_try = !use_try;
        drained += batch.len();
        for call in batch {
            assert!(ids.insert(call.id()), "duplicate {}", call.id());
        }
        thread::yield_now();
    }
    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(ids.len(), 4 * per_thread);
    assert!(queue.is_empty());
}

#[test]
fn runtime_never_runs_two_calls_at_once() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let gate = {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        ScriptedModule::new().function("enter", move |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(3));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, RuntimeFault>(ScriptValue::Int(1))
        })
    };

    let bridge = Bridge::start(
        ScriptedInterpreter::new().with_module("gate", gate),
        BridgeOptions {
            workers: WorkerStrategy::Pool {
                size: 4,
                queue_capacity: 64,
            },
            include_cwd: false,
            ..BridgeOptions::default()
        },
    )
    .unwrap();

    for _ in 0..16 {
        bridge
            .dispatch_async(CallDescriptor::new("gate", "enter").with_callback("onResult"))
            .unwrap();
    }
    // Inline calls contend for the same lock.
    for _ in 0..4 {
        bridge
            .dispatch_sync(CallDescriptor::new("gate", "enter"))
            .unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || bridge.pending() == 16));

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    bridge.shutdown();
}
