mod common;

use common::{DATA, Harness, va};
use kernel::{ProcessState, TrapExit};
use kernel_info::memory::{PAGE_SIZE, REGION1_BASE, REGION1_LIMIT};
use kernel_machine::{Machine, TrapVector};
use kernel_syscall::{ERROR, Syscall, errno};

#[test]
fn getpid_reports_the_caller() {
    let mut h = Harness::boot();
    assert_eq!(h.call(Syscall::GetPid), 1);
    let child = h.fork();
    h.tick();
    assert_eq!(h.call(Syscall::GetPid), child.as_u64().cast_signed());
}

#[test]
fn forked_memory_is_private() {
    let mut h = Harness::boot();
    let parent = h.running();
    h.poke(DATA, b"parent");
    let before = h.kernel.free_frames();
    let child = h.fork();
    let parent_size = h.kernel.process(parent).unwrap().space().size();
    assert_eq!(h.kernel.process(child).unwrap().space().size(), parent_size);
    assert!(h.kernel.free_frames() <= before - parent_size);

    h.tick();
    assert_eq!(h.running(), child);
    assert_eq!(h.peek(DATA, 6), b"parent");
    h.poke(DATA, b"child!");

    h.tick();
    assert_eq!(h.running(), parent);
    assert_eq!(h.peek(DATA, 6), b"parent");

    let mut buf = [0u8; 6];
    h.kernel
        .read_process_memory(child, va(DATA), &mut buf)
        .unwrap();
    assert_eq!(&buf, b"child!");
}

#[test]
fn fork_records_parent_and_child() {
    let mut h = Harness::boot();
    let parent = h.running();
    let child = h.fork();
    assert_eq!(h.kernel.process(child).unwrap().parent(), Some(parent));
    assert_eq!(h.kernel.process(parent).unwrap().alive_children(), [child]);
    assert_eq!(h.kernel.process(child).unwrap().state(), ProcessState::Ready);
    assert!(h.kernel.processes().ready().any(|p| p == child));
}

#[test]
fn wait_blocks_until_a_child_exits() {
    let mut h = Harness::boot();
    let parent = h.running();
    let child = h.fork();

    h.call_blocking(Syscall::Wait { status: va(DATA) });
    assert_eq!(h.running(), child);
    assert!(h.kernel.processes().waiting().any(|p| p == parent));

    h.call_blocking(Syscall::Exit { status: -3 });
    assert_eq!(h.running(), parent);
    assert_eq!(
        h.kernel.machine().user_context().return_value(),
        child.as_u64().cast_signed()
    );
    assert_eq!(h.peek_word(DATA).cast_signed(), -3);
    assert!(h.kernel.process(child).is_none());
}

#[test]
fn wait_with_a_null_status_discards_it() {
    let mut h = Harness::boot();
    let child = h.fork();
    h.tick();
    h.call_blocking(Syscall::Exit { status: 1 });
    let reaped = h.call(Syscall::Wait { status: va(0) });
    assert_eq!(reaped, child.as_u64().cast_signed());
}

#[test]
fn wait_rejects_a_bad_status_pointer() {
    let mut h = Harness::boot();
    h.fork();
    assert_eq!(
        h.call(Syscall::Wait { status: va(0x10) }),
        errno::INVALID_ADDRESS
    );
}

#[test]
fn orphans_are_reaped_after_they_exit() {
    let mut h = Harness::boot();
    let parent = h.running();
    let child = h.fork();
    h.tick();
    assert_eq!(h.running(), child);

    let grandchild = h.fork();
    h.call_blocking(Syscall::Exit { status: 0 });
    assert_eq!(h.running(), parent);
    assert_eq!(h.kernel.process(grandchild).unwrap().parent(), None);

    h.run(grandchild);
    h.call_blocking(Syscall::Exit { status: 0 });
    assert!(h.kernel.processes().orphans().any(|p| p == grandchild));

    h.run(parent);
    assert_eq!(
        h.call(Syscall::Wait { status: va(DATA) }),
        child.as_u64().cast_signed()
    );
    assert!(h.kernel.process(grandchild).is_none());
    assert_eq!(h.kernel.processes().orphans().count(), 0);
}

#[test]
fn root_exit_halts_the_machine() {
    let mut h = Harness::boot();
    h.fork();
    assert_eq!(h.syscall(Syscall::Exit { status: 0 }), TrapExit::Halted);
    assert!(h.kernel.is_halted());
    assert!(h.kernel.machine().is_halted());
    assert_eq!(h.tick(), TrapExit::Halted);
}

#[test]
fn exec_replaces_the_image() {
    let mut h = Harness::boot();
    let me = h.running();
    h.put_str(DATA, "worker");
    h.put_str(DATA + 128, "worker");
    h.put_str(DATA + 160, "-x");
    let argv = [DATA + 128, DATA + 160, 0];
    let words: Vec<u8> = argv.iter().flat_map(|w| w.to_le_bytes()).collect();
    h.poke(DATA + 64, &words);

    let exit = h.syscall(Syscall::Exec {
        file: va(DATA),
        argv: va(DATA + 64),
    });
    assert_eq!(exit, TrapExit::User(me));

    let ctx = h.kernel.machine().user_context().clone();
    assert_eq!(ctx.pc, va(REGION1_BASE + 16));
    assert_eq!(ctx.regs[0], 2);
    assert_eq!(h.peek_word(ctx.sp.as_u64()), 2);
    assert_eq!(h.peek_word(ctx.sp.as_u64() + 8), ctx.regs[1]);

    let first = h.peek_word(ctx.regs[1]);
    assert_eq!(h.peek(first, 7), b"worker\0");
    let second = h.peek_word(ctx.regs[1] + 8);
    assert_eq!(h.peek(second, 3), b"-x\0");
    assert_eq!(h.peek_word(ctx.regs[1] + 16), 0);

    assert_eq!(h.peek(REGION1_BASE + PAGE_SIZE, 11), b"worker data");
    let space = h.kernel.process(me).unwrap().space();
    assert_eq!(space.stack_low(), va(REGION1_LIMIT - PAGE_SIZE));
}

#[test]
fn exec_of_an_unknown_program_fails_without_harm() {
    let mut h = Harness::boot();
    h.put_str(DATA, "missing");
    let pc = h.kernel.machine().user_context().pc;
    let code = h.call(Syscall::Exec {
        file: va(DATA),
        argv: va(0),
    });
    assert_eq!(code, errno::INVALID_ARGUMENT);
    assert_eq!(h.kernel.machine().user_context().pc, pc);
    assert_eq!(h.peek(DATA, 7), b"missing");
}

#[test]
fn exec_rejects_an_unreadable_name() {
    let mut h = Harness::boot();
    let code = h.call(Syscall::Exec {
        file: va(0),
        argv: va(0),
    });
    assert_eq!(code, errno::INVALID_ADDRESS);
}

#[test]
fn illegal_instruction_kills_the_process() {
    let mut h = Harness::boot();
    let parent = h.running();
    let child = h.fork();
    h.tick();
    assert_eq!(h.running(), child);

    h.trap(TrapVector::Illegal, 0, 0);
    assert_eq!(h.running(), parent);
    assert_eq!(h.kernel.process(child).unwrap().exit_status(), Some(ERROR));
    assert_eq!(
        h.call(Syscall::Wait { status: va(DATA) }),
        child.as_u64().cast_signed()
    );
    assert_eq!(h.peek_word(DATA).cast_signed(), ERROR);
}

#[test]
fn fault_just_below_the_stack_grows_it() {
    let mut h = Harness::boot();
    let me = h.running();
    let low = h.kernel.process(me).unwrap().space().stack_low().as_u64();
    let size = h.kernel.process(me).unwrap().space().size();

    let sp = low - 2 * PAGE_SIZE + 64;
    h.kernel.machine_mut().user_context_mut().sp = va(sp);
    assert_eq!(h.trap(TrapVector::Memory, 1, sp + 8), TrapExit::User(me));

    let space = h.kernel.process(me).unwrap().space();
    assert_eq!(space.stack_low(), va(low - 2 * PAGE_SIZE));
    assert_eq!(space.size(), size + 2);
    h.poke(sp + 8, b"stack");
    assert_eq!(h.peek(sp + 8, 5), b"stack");
}

#[test]
fn fault_in_the_heap_gap_kills_the_process() {
    let mut h = Harness::boot();
    let child = h.fork();
    h.tick();
    assert_eq!(h.running(), child);

    h.kernel.machine_mut().user_context_mut().sp = va(REGION1_LIMIT - 8);
    h.trap(TrapVector::Memory, 1, REGION1_BASE + 100 * PAGE_SIZE);
    assert_ne!(h.running(), child);
    assert_eq!(h.kernel.process(child).unwrap().exit_status(), Some(ERROR));
}

#[test]
fn fault_in_idle_halts() {
    let mut h = Harness::boot();
    h.call_blocking(Syscall::Delay { ticks: 5 });
    assert_eq!(h.running(), h.kernel.idle_pid());
    assert_eq!(h.trap(TrapVector::Illegal, 0, 0), TrapExit::Halted);
    assert!(h.kernel.machine().is_halted());
}
