//! End-to-end runs of the situations the kernel is expected to handle.

mod common;

use common::{DATA, Harness, small_machine, va};
use kernel::Handle;
use kernel_machine::Machine;
use kernel_info::memory::PAGE_SIZE;
use kernel_syscall::{Syscall, errno};

#[test]
fn brk_is_all_or_nothing_when_memory_runs_out() {
    let mut h = Harness::with_config(&small_machine());
    let init = h.running();
    let brk = h.kernel.process(init).unwrap().space().brk().as_u64();
    let free = h.kernel.free_frames() as u64;
    assert!(free > 5, "only {free} frames free after boot");

    let near = brk + (free - 5) * PAGE_SIZE;
    assert_eq!(h.call(Syscall::Brk { addr: va(near) }), 0);
    assert_eq!(h.kernel.free_frames(), 5);

    let size = h.kernel.process(init).unwrap().space().size();
    assert_eq!(h.call(Syscall::Brk { addr: va(near + 3 * PAGE_SIZE) }), 0);
    assert_eq!(h.kernel.process(init).unwrap().space().size(), size + 3);
    assert_eq!(h.kernel.free_frames(), 2);

    let wanted = near + 13 * PAGE_SIZE;
    assert_eq!(h.call(Syscall::Brk { addr: va(wanted) }), errno::OUT_OF_MEMORY);
    let space = h.kernel.process(init).unwrap().space();
    assert_eq!(space.size(), size + 3);
    assert_eq!(space.brk(), va(near + 3 * PAGE_SIZE));
    assert_eq!(h.kernel.free_frames(), 2);
}

#[test]
fn pipe_carries_bytes_between_parent_and_child() {
    let mut h = Harness::boot();
    let parent = h.running();
    assert_eq!(h.call(Syscall::PipeInit { id_out: va(DATA) }), 0);
    let pipe = h.peek_word(DATA);
    h.poke(DATA + 64, b"hello");

    let child = h.fork();
    assert_eq!(h.running(), parent);
    let wrote = h.call(Syscall::PipeWrite {
        pipe,
        buf: va(DATA + 64),
        len: 5,
    });
    assert_eq!(wrote, 5);

    h.tick();
    assert_eq!(h.running(), child);
    assert_eq!(h.kernel.machine().user_context().return_value(), 0);

    let got = h.call(Syscall::PipeRead {
        pipe,
        buf: va(DATA + 128),
        len: 3,
    });
    assert_eq!(got, 3);
    assert_eq!(h.peek(DATA + 128, 3), b"hel");
    assert_eq!(h.kernel.objects().pipe(Handle::new(pipe)).unwrap().len(), 2);

    let got = h.call(Syscall::PipeRead {
        pipe,
        buf: va(DATA + 128),
        len: 5,
    });
    assert_eq!(got, 2);
    assert_eq!(h.peek(DATA + 128, 2), b"lo");
    assert!(h.kernel.objects().pipe(Handle::new(pipe)).unwrap().is_empty());
}

#[test]
fn contended_lock_passes_to_the_waiter() {
    let mut h = Harness::boot();
    let parent = h.running();
    assert_eq!(h.call(Syscall::LockInit { id_out: va(DATA) }), 0);
    let lock = h.peek_word(DATA);
    assert_eq!(h.call(Syscall::LockAcquire { lock }), 0);

    let child = h.fork();
    h.tick();
    assert_eq!(h.running(), child);

    h.call_blocking(Syscall::LockAcquire { lock });
    assert_eq!(h.running(), parent);
    let held = h.kernel.objects().lock(Handle::new(lock)).unwrap();
    assert_eq!(held.owner(), Some(parent));
    assert!(held.waiters().contains(child));

    assert_eq!(h.call(Syscall::LockRelease { lock }), 0);
    let released = h.kernel.objects().lock(Handle::new(lock)).unwrap();
    assert_eq!(released.owner(), None);
    assert_eq!(released.unfulfilled(), 1);

    h.tick();
    assert_eq!(h.running(), child);
    assert_eq!(h.kernel.machine().user_context().return_value(), 0);
    let taken = h.kernel.objects().lock(Handle::new(lock)).unwrap();
    assert_eq!(taken.owner(), Some(child));
    assert_eq!(taken.unfulfilled(), 0);
}

#[test]
fn wait_collects_the_exit_status_and_frees_the_child() {
    let mut h = Harness::boot();
    let parent = h.running();
    assert_eq!(h.call(Syscall::Wait { status: va(DATA) }), errno::NO_CHILDREN);

    let child = h.fork();
    h.tick();
    assert_eq!(h.running(), child);

    h.call_blocking(Syscall::Exit { status: 7 });
    assert_eq!(h.running(), parent);
    assert!(h.kernel.process(child).unwrap().exit_status() == Some(7));

    let reaped = h.call(Syscall::Wait { status: va(DATA) });
    assert_eq!(reaped, child.as_u64().cast_signed());
    assert_eq!(h.peek_word(DATA), 7);
    assert!(h.kernel.process(child).is_none());
    let pcb = h.kernel.process(parent).unwrap();
    assert_eq!(pcb.defunct_children().count(), 0);
    assert!(pcb.alive_children().is_empty());
}
