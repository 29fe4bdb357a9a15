//! # The coroutine primitive
//!
//! A [`Coroutine`] is a suspendable unit of sequential execution with its
//! own dedicated stack. The resumer drives it with [`Coroutine::resume`];
//! inside the body, the [`Yielder`] handle suspends back to the resumer.
//!
//! Termination is expressed through the entry closure's return value: `Ok`
//! finishes with an [`Exit`] payload, `Err` marks the coroutine `Errored`.
//! Either way the body runs to completion exactly once and its captured
//! state is dropped normally. A panic inside the body is caught on the
//! coroutine stack and also maps to `Errored`.
//!
//! ```ignore
//! let mut coro = Coroutine::new(64 * 1024, |y| {
//!     y.suspend_not_ready();          // would-block: hand control back
//!     Ok(Exit::Done)                  // finish
//! })?;
//! assert_eq!(coro.resume()?, Resumption::Yielded(Yielded::NotReady));
//! assert_eq!(coro.resume()?, Resumption::Finished(Exit::Done));
//! ```

use std::cell::UnsafeCell;
use std::panic::{self, AssertUnwindSafe};

use coronet_core::error::{ConnError, LoopError, LoopResult, StackError};
use coronet_core::state::{CoroState, Exit, Resumption, Yielded};
use coronet_core::{kdebug, kerror};

use crate::current_arch::{init_context, switch_context, Context};
use crate::stack::Stack;

/// Entry closure type: the coroutine body.
///
/// Runs with a [`Yielder`] for the coroutine it executes on. Returning
/// `Ok(exit)` finishes the coroutine, `Err` errors it; both are terminal.
pub type EntryFn = Box<dyn FnOnce(&Yielder) -> Result<Exit, ConnError> + 'static>;

struct Inner {
    state: CoroState,
    /// Set by `Yielder::suspend`, consumed by `resume`
    yielded: Option<Yielded>,
    /// Set by the trampoline when the body returns `Ok`
    exit: Option<Exit>,
    /// Where `resume` saved its own execution point
    resumer: Context,
    /// Where the coroutine last suspended (or its fresh entry context)
    ctx: Context,
    stack: Stack,
    /// Taken by the trampoline on first resume
    entry: Option<EntryFn>,
}

/// A suspendable unit of execution with a dedicated stack.
///
/// The stack is owned exclusively by the coroutine and released exactly
/// once when it is dropped. The event loop guarantees a coroutine is only
/// dropped in a terminal state (after [`force`](Coroutine::force) if need
/// be); a coroutine dropped while merely `Paused` discards the suspended
/// frames without running their destructors.
pub struct Coroutine {
    // Boxed so the address baked into the context and Yielder stays stable,
    // UnsafeCell so the body and the resumer legally share it.
    inner: Box<UnsafeCell<Inner>>,
}

impl Coroutine {
    /// Create a coroutine with `stack_size` usable stack bytes.
    ///
    /// Nothing runs until the first [`resume`](Coroutine::resume). Whatever
    /// the entry closure captured travels with it and is dropped when the
    /// body completes (or with the coroutine, if it never ran).
    pub fn new<F>(stack_size: usize, entry: F) -> Result<Self, StackError>
    where
        F: FnOnce(&Yielder) -> Result<Exit, ConnError> + 'static,
    {
        let stack = Stack::new(stack_size)?;
        let inner = Box::new(UnsafeCell::new(Inner {
            state: CoroState::New,
            yielded: None,
            exit: None,
            resumer: Context::zeroed(),
            ctx: Context::zeroed(),
            stack,
            entry: Some(Box::new(entry)),
        }));

        let ptr = inner.get();
        unsafe {
            init_context(
                &raw mut (*ptr).ctx,
                (*ptr).stack.top(),
                coro_main as usize,
                ptr as usize,
            );
        }

        Ok(Self { inner })
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> CoroState {
        unsafe { (*self.inner.get()).state }
    }

    /// Transfer control to the coroutine until it suspends or terminates.
    ///
    /// Legal only in `New` or `Paused`; anything else is
    /// [`LoopError::NotResumable`]. Returns what the coroutine reported.
    pub fn resume(&mut self) -> LoopResult<Resumption> {
        let inner = self.inner.get();
        unsafe {
            let state = (*inner).state;
            if !state.is_resumable() {
                return Err(LoopError::NotResumable(state));
            }
            (*inner).state = CoroState::Running;

            switch_context(&raw mut (*inner).resumer, &raw const (*inner).ctx);

            match (*inner).state {
                CoroState::Paused => Ok(Resumption::Yielded(
                    (*inner).yielded.take().unwrap_or(Yielded::NotReady),
                )),
                CoroState::Finished => {
                    Ok(Resumption::Finished((*inner).exit.unwrap_or(Exit::Done)))
                }
                CoroState::Errored => Ok(Resumption::Errored),
                state => unreachable!("coroutine came back in state {}", state),
            }
        }
    }

    /// Abrupt, best-effort termination: never schedule this coroutine again.
    ///
    /// Used during shutdown. The remaining body does not run and is not
    /// unwound; resources the handler opened beyond its registered
    /// descriptor are not released cooperatively. No-op on a coroutine that
    /// already terminated.
    pub fn force(&mut self) {
        let inner = self.inner.get();
        unsafe {
            let state = (*inner).state;
            debug_assert!(state != CoroState::Running, "cannot force the running coroutine");
            if !state.is_terminated() {
                (*inner).state = CoroState::Errored;
            }
        }
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        // The loop never drops the coroutine it is executing inside of.
        debug_assert!(self.state() != CoroState::Running);
    }
}

/// In-coroutine handle: the only way a body suspends.
///
/// Handed to the entry closure by the trampoline; borrows cannot outlive
/// the body invocation.
pub struct Yielder {
    inner: *mut Inner,
}

impl Yielder {
    /// Record `value` as the transferred value, mark the coroutine
    /// `Paused`, and switch back to whoever called `resume`.
    ///
    /// Returns on the next resume, exactly after this call point.
    pub fn suspend(&self, value: Yielded) {
        unsafe {
            (*self.inner).yielded = Some(value);
            (*self.inner).state = CoroState::Paused;
            switch_context(&raw mut (*self.inner).ctx, &raw const (*self.inner).resumer);
        }
    }

    /// Would-block shorthand used by the I/O adapter
    #[inline]
    pub fn suspend_not_ready(&self) {
        self.suspend(Yielded::NotReady);
    }

    /// Acceptor shorthand: hand off a freshly accepted connection
    #[inline]
    pub fn suspend_conn(&self, fd: std::os::fd::RawFd) {
        self.suspend(Yielded::Conn(fd));
    }
}

/// First frame on every coroutine stack.
///
/// Runs the entry closure, records its terminal outcome, and switches back
/// to the resumer for the last time. `resume` refuses terminal coroutines,
/// so control never comes back here.
extern "C" fn coro_main(arg: usize) -> ! {
    let inner = arg as *mut Inner;

    let entry = unsafe { (*inner).entry.take() }.expect("coroutine entry already consumed");
    let yielder = Yielder { inner };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry(&yielder)));

    unsafe {
        match outcome {
            Ok(Ok(exit)) => {
                (*inner).exit = Some(exit);
                (*inner).state = CoroState::Finished;
            }
            Ok(Err(err)) => {
                kdebug!("coroutine body failed: {}", err);
                (*inner).state = CoroState::Errored;
            }
            Err(_) => {
                kerror!("coroutine body panicked");
                (*inner).state = CoroState::Errored;
            }
        }
        switch_context(&raw mut (*inner).ctx, &raw const (*inner).resumer);
    }
    unreachable!("terminated coroutine was resumed");
}
