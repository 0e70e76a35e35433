mod common;

use common::Harness;
use kernel::{Pid, ProcessState};
use kernel_machine::Machine;
use kernel_syscall::{Syscall, errno};
use proptest::prelude::*;
use std::collections::BTreeSet;

#[test]
fn clock_rotates_ready_processes() {
    let mut h = Harness::boot();
    let init = h.running();
    let a = h.fork();
    let b = h.fork();

    let mut order = Vec::new();
    for _ in 0..6 {
        h.tick();
        order.push(h.running());
    }
    assert_eq!(order, [a, b, init, a, b, init]);
}

#[test]
fn clock_without_competition_keeps_the_runner() {
    let mut h = Harness::boot();
    let init = h.running();
    h.tick();
    h.tick();
    assert_eq!(h.running(), init);
    assert!(h.kernel.processes().ready().next().is_none());
}

#[test]
fn idle_runs_only_when_nothing_is_ready() {
    let mut h = Harness::boot();
    let init = h.running();
    let idle = h.kernel.idle_pid();
    assert_eq!(
        h.kernel.process(idle).unwrap().state(),
        ProcessState::Ready
    );
    assert!(!h.kernel.processes().ready().any(|p| p == idle));

    h.call_blocking(Syscall::Delay { ticks: 1 });
    assert_eq!(h.running(), idle);

    h.tick();
    assert_eq!(h.running(), init);
    assert_eq!(h.kernel.machine().user_context().return_value(), 0);
    assert!(!h.kernel.processes().ready().any(|p| p == idle));
}

#[test]
fn delay_sleeps_for_the_requested_ticks() {
    let mut h = Harness::boot();
    let init = h.running();
    let child = h.fork();

    h.call_blocking(Syscall::Delay { ticks: 2 });
    assert_eq!(h.running(), child);
    assert_eq!(
        h.kernel.process(init).unwrap().state(),
        ProcessState::Delayed { remaining: 2 }
    );

    h.tick();
    assert_eq!(h.running(), child);
    assert_eq!(
        h.kernel.process(init).unwrap().state(),
        ProcessState::Delayed { remaining: 1 }
    );

    h.tick();
    assert_eq!(h.running(), init);
    assert_eq!(h.kernel.machine().user_context().return_value(), 0);
    assert_eq!(h.kernel.processes().delayed().count(), 0);
}

#[test]
fn delay_edge_values() {
    let mut h = Harness::boot();
    assert_eq!(h.call(Syscall::Delay { ticks: 0 }), 0);
    assert_eq!(h.call(Syscall::Delay { ticks: -1 }), errno::INVALID_ARGUMENT);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_ready_process_runs_within_one_round(n in 1usize..8, rounds in 1usize..4) {
        let mut h = Harness::boot();
        let mut all: BTreeSet<Pid> = BTreeSet::from([h.running()]);
        for _ in 1..n {
            all.insert(h.fork());
        }
        let idle = h.kernel.idle_pid();

        for _ in 0..rounds {
            let mut seen = BTreeSet::new();
            for _ in 0..n {
                h.tick();
                prop_assert_ne!(h.running(), idle);
                seen.insert(h.running());
            }
            prop_assert_eq!(&seen, &all);
        }
    }
}
