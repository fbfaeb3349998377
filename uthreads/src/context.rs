//! Machine-context save/restore primitive.
//!
//! This is the one place in the crate with genuinely unsafe,
//! architecture-specific code: a stackful context switch implemented with
//! inline assembly, in the spirit of spec section 9's "stackful coroutine
//! facility with equivalent semantics" (this avoids `sigsetjmp`/
//! `siglongjmp` across arbitrary Rust stack frames, which the original C
//! assignment uses but which is UB-adjacent under an optimizing compiler
//! that doesn't know about the jump).
//!
//! Only `x86_64` is supported. A `RawContext` captures exactly the System V
//! AMD64 callee-saved registers plus the stack pointer; the resume address
//! lives on the target stack itself and is reached via `ret`, mirroring how
//! `setjmp`/`longjmp` resume at a saved program counter.

#![allow(clippy::missing_safety_doc)]

use std::arch::asm;

/// Saved machine state for one thread.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RawContext {
    rsp: u64,
    r15: u64,
    r14: u64,
    r13: u64,
    r12: u64,
    rbx: u64,
    rbp: u64,
}

impl RawContext {
    /// Build a context for a thread that has never run: `rsp` points into
    /// `stack`, arranged so the first [`switch`] into this context performs
    /// a `ret` straight into `trampoline_entry`, which calls `entry` and
    /// then self-terminates if `entry` ever returns.
    ///
    /// `entry` is stashed in the saved `r13` slot; `trampoline_entry`
    /// recovers it from there and passes it on to [`trampoline`] as its one
    /// argument, per the System V calling convention (first integer
    /// argument in `rdi`).
    pub fn new_for_spawn(stack: &mut [u8], entry: extern "C" fn()) -> Self {
        let top = stack.as_mut_ptr() as u64 + stack.len() as u64;
        // `top & !0xf` is 16-byte aligned. Park the return address 16 bytes
        // below it (not 8): `switch`'s `ret` pops that one word and leaves
        // rsp at sp+8, i.e. 8-mod-16, which is the correct System V entry
        // parity for `trampoline_entry` (as if just reached by a `call` from
        // a 16-aligned site). Reserving only 8 bytes here would leave rsp
        // 0-mod-16 at entry instead, off by one word from what every callee
        // — including LLVM's aligned SSE spill/fill codegen — assumes.
        let sp = (top & !0xf) - 16;
        unsafe {
            *(sp as *mut u64) = trampoline_entry as u64;
        }
        RawContext { rsp: sp, r15: 0, r14: 0, r13: entry as u64, r12: 0, rbx: 0, rbp: 0 }
    }

    /// Context for thread 0: a placeholder, since it runs on the real OS
    /// stack rather than a private buffer. There is nothing meaningful to
    /// capture at `init` time — thread 0 never suspends before its first
    /// dispatch — so this is live register state only from the first
    /// `switch()` call that saves *out of* thread 0, which overwrites every
    /// field here with the registers at that suspension point.
    pub fn new_for_current() -> Self {
        RawContext::default()
    }
}

/// Entry point run on the very first dispatch of a spawned thread.
///
/// Calls the thread's entry function; if it returns instead of the thread
/// calling `terminate` on itself, falls through to the library's own
/// self-termination path so the thread doesn't run off the end of its
/// stack.
extern "C" fn trampoline(entry: extern "C" fn()) -> ! {
    entry();
    crate::scheduler::terminate_running_thread_after_return();
}

std::arch::global_asm!(
    ".global trampoline_entry",
    "trampoline_entry:",
    "mov rdi, r13",
    "jmp {trampoline}",
    trampoline = sym trampoline,
);

extern "C" {
    fn trampoline_entry();
}

/// Save the callee-saved registers and stack pointer of the *currently
/// executing* context into `from`, then load `to` and jump there.
///
/// This call does not return to its caller the normal way. Control comes
/// back to the statement after a `switch` call only when some later
/// `switch` targets `from` again, at which point it looks exactly as if
/// this call had returned.
///
/// # Safety
/// `from` and `to` must be valid, live, non-aliasing contexts. `to` must
/// either be fresh from [`RawContext::new_for_spawn`] or have previously
/// been the `from` of a `switch` call that suspended it.
#[inline(never)]
pub unsafe fn switch(from: *mut RawContext, to: *const RawContext) {
    asm!(
        "mov [rdi + 0x30], rbp",
        "mov [rdi + 0x28], rbx",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x18], r13",
        "mov [rdi + 0x10], r14",
        "mov [rdi + 0x08], r15",
        "mov [rdi + 0x00], rsp",
        "mov rsp, [rsi + 0x00]",
        "mov r15, [rsi + 0x08]",
        "mov r14, [rsi + 0x10]",
        "mov r13, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov rbx, [rsi + 0x28]",
        "mov rbp, [rsi + 0x30]",
        "ret",
        in("rdi") from,
        in("rsi") to,
        options(noreturn),
    );
}
