//! x86_64 context switching implementation
//!
//! Uses naked functions with inline assembly, stable since Rust 1.88.

use std::arch::naked_asm;

/// Callee-saved register set per the System V AMD64 ABI.
///
/// Offsets are fixed (repr(C)) for direct access from assembly:
/// ```text
/// 0x00: rsp   0x08: rip   0x10: rbx   0x18: rbp
/// 0x20: r12   0x28: r13   0x30: r14   0x38: r15
/// ```
#[repr(C)]
pub struct Context {
    pub rsp: u64,
    pub rip: u64,
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

impl Context {
    pub const fn zeroed() -> Self {
        Self {
            rsp: 0,
            rip: 0,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
        }
    }
}

/// Initialize a fresh coroutine context
///
/// Sets up the context so that the first switch into it begins executing
/// `entry_fn(entry_arg)` on the given stack. The trampoline is entered by a
/// jump, so the stack starts 16-byte aligned; the `call` inside restores the
/// usual function-entry alignment required by the ABI.
///
/// # Safety
///
/// `ctx` must point to valid `Context` memory and `stack_top` must be the
/// top of a live, writable stack region.
#[inline]
pub unsafe fn init_context(
    ctx: *mut Context,
    stack_top: *mut u8,
    entry_fn: usize,
    entry_arg: usize,
) {
    let sp = (stack_top as usize) & !0xF;

    let ctx = &mut *ctx;
    ctx.rsp = sp as u64;
    ctx.rip = entry_trampoline as usize as u64;
    ctx.rbx = 0;
    ctx.rbp = 0;
    ctx.r12 = entry_fn as u64;
    ctx.r13 = entry_arg as u64;
    ctx.r14 = 0;
    ctx.r15 = 0;
}

/// Trampoline that calls the entry function with its argument
///
/// The entry function must never return; the `ud2` is a backstop.
#[unsafe(naked)]
pub unsafe extern "C" fn entry_trampoline() {
    naked_asm!(
        "mov rdi, r13",
        "call r12",
        "ud2",
    );
}

/// Save the current execution point into `save` and resume `load`
///
/// Control returns here (with the saved registers restored) the next time
/// something switches back into `save`.
///
/// # Safety
///
/// Both pointers must reference valid `Context` memory; `load` must hold
/// either a context produced by `init_context` or one previously saved by
/// this function.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_save: *mut Context, _load: *const Context) {
    naked_asm!(
        // Save callee-saved registers into save (RDI)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // Load callee-saved registers from load (RSI)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        // Jump to the saved RIP
        "jmp rax",
        // Return point for the saved context
        "2:",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_layout() {
        let ctx = Context::zeroed();
        let base = &ctx as *const _ as usize;

        // Offsets must match the assembly above
        assert_eq!(&ctx.rsp as *const _ as usize - base, 0x00);
        assert_eq!(&ctx.rip as *const _ as usize - base, 0x08);
        assert_eq!(&ctx.rbx as *const _ as usize - base, 0x10);
        assert_eq!(&ctx.rbp as *const _ as usize - base, 0x18);
        assert_eq!(&ctx.r12 as *const _ as usize - base, 0x20);
        assert_eq!(&ctx.r15 as *const _ as usize - base, 0x38);
    }

    #[test]
    fn test_init_context_aligns_stack() {
        let mut ctx = Context::zeroed();
        let fake_top = 0x7000_0000_1234usize as *mut u8;
        unsafe { init_context(&mut ctx, fake_top, 0, 0) };
        assert_eq!(ctx.rsp % 16, 0);
    }
}
