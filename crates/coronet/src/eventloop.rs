//! # The poll-driven event loop
//!
//! Waits for read-readiness across every registered descriptor, resumes the
//! matching coroutine, and reclaims terminated slots. Runs until a handler
//! finishes with [`Exit::Stop`] or the registry empties; on exit every
//! remaining descriptor is closed and every remaining stack released,
//! bypassing cooperative finish semantics.
//!
//! In server mode (see [`net::serve`](crate::net::serve)) slot 0 is the
//! long-lived acceptor: each readable event on the listening socket makes it
//! accept one connection and yield the new descriptor, which the loop turns
//! into a fresh worker coroutine at the end of the registry.

use std::cell::RefCell;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use coronet_core::env::env_get;
use coronet_core::error::{ConnError, LoopError, LoopResult};
use coronet_core::state::{Exit, Resumption, Yielded};
use coronet_core::{constants, kdebug, kerror, kinfo, kwarn};
use coronet_runtime::{Coroutine, Yielder};

use crate::registry::Registry;

/// Per-connection handler: runs inside a worker coroutine.
///
/// Must resolve to exactly one terminal outcome: `Ok(Exit::Done)` closes
/// this connection, `Ok(Exit::Stop)` shuts the whole loop down, `Err`
/// errors the coroutine (isolated). May call the I/O adapter freely.
pub type ConnHandler = dyn Fn(&Yielder, RawFd) -> Result<Exit, ConnError>;

/// Registry edit requested from inside a handler
enum LoopOp {
    DelFd(RawFd),
    DelAt(usize),
}

/// Handle given to generic-loop handlers for deregistering connections.
///
/// A handler runs while the loop is mid-dispatch, so edits are queued here
/// and applied by the loop between resumes rather than mutating the
/// registry from inside the coroutine.
#[derive(Clone, Default)]
pub struct LoopHandle {
    ops: Rc<RefCell<Vec<LoopOp>>>,
}

impl LoopHandle {
    /// Deregister the connection holding `fd` (descriptor closed, stack
    /// released). No-op if the descriptor is not registered.
    pub fn del_fd(&self, fd: RawFd) {
        self.ops.borrow_mut().push(LoopOp::DelFd(fd));
    }

    /// Deregister the connection at `index`. The index is interpreted when
    /// the loop applies the edit, after the current resume.
    pub fn del_at(&self, index: usize) {
        self.ops.borrow_mut().push(LoopOp::DelAt(index));
    }

    fn drain(&self) -> Vec<LoopOp> {
        std::mem::take(&mut *self.ops.borrow_mut())
    }
}

/// The reactor: registry plus scheduling state.
pub struct EventLoop {
    registry: Registry,
    handle: LoopHandle,
    running: bool,
    stack_size: usize,
    /// Server mode: the shared per-connection handler workers run
    conn_handler: Option<Rc<ConnHandler>>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            handle: LoopHandle::default(),
            running: true,
            stack_size: env_get("CORONET_STACK_SIZE", constants::DEFAULT_STACK_SIZE),
            conn_handler: None,
        }
    }

    /// Override the stack size used for coroutines created by this loop
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Register a descriptor with its handler coroutine.
    ///
    /// The handler receives the in-coroutine [`Yielder`], a [`LoopHandle`]
    /// for deregistering other connections, and the raw descriptor; any
    /// attached data travels as closure captures.
    pub fn add_fd<F>(&mut self, fd: OwnedFd, handler: F) -> LoopResult<()>
    where
        F: FnOnce(&Yielder, &LoopHandle, RawFd) -> Result<Exit, ConnError> + 'static,
    {
        let raw = fd.as_raw_fd();
        let handle = self.handle.clone();
        let coro = Coroutine::new(self.stack_size, move |y| handler(y, &handle, raw))?;
        self.registry.add(coro, fd)
    }

    /// Deregister by descriptor value; no-op if absent
    pub fn del_fd(&mut self, fd: RawFd) {
        self.registry.remove_fd(fd);
    }

    /// Deregister by index
    pub fn del_at(&mut self, index: usize) {
        self.registry.remove_at(index);
    }

    /// Put this loop in server mode: yielded connections from slot 0 spawn
    /// workers bound to `handler`.
    pub(crate) fn set_conn_handler(&mut self, handler: Rc<ConnHandler>) {
        self.conn_handler = Some(handler);
    }

    /// Register the acceptor coroutine; must be the first registration so
    /// it lands in slot 0.
    pub(crate) fn add_acceptor<F>(&mut self, fd: OwnedFd, acceptor: F) -> LoopResult<()>
    where
        F: FnOnce(&Yielder, RawFd) -> Result<Exit, ConnError> + 'static,
    {
        debug_assert!(self.registry.is_empty(), "acceptor must occupy slot 0");
        let raw = fd.as_raw_fd();
        let coro = Coroutine::new(self.stack_size, move |y| acceptor(y, raw))?;
        self.registry.add(coro, fd)
    }

    /// Run until a handler requests shutdown or the registry empties.
    ///
    /// Blocks indefinitely between readiness events. On return, every
    /// descriptor this loop ever registered has been closed exactly once
    /// and every coroutine stack released.
    pub fn run(&mut self) -> LoopResult<()> {
        // An empty descriptor set with an infinite timeout would never
        // return, so the emptiness check is explicit.
        while self.running && !self.registry.is_empty() {
            let ready = self.wait_ready()?;

            for (fd, revents) in ready {
                let Some(revents) = revents else {
                    kwarn!("unknown event bits on fd {}", fd);
                    continue;
                };
                if revents.is_empty() {
                    continue;
                }
                if !revents.contains(PollFlags::POLLIN) {
                    kwarn!("unsupported events {:?} on fd {}", revents, fd);
                    continue;
                }

                // The slot may have been removed or swap-moved earlier in
                // this pass; dispatch by descriptor, not snapshot index.
                let Some(index) = self.registry.index_of(fd) else {
                    continue;
                };
                self.dispatch(index)?;
                self.apply_pending();
            }
        }

        self.running = false;
        self.registry.clear();
        Ok(())
    }

    /// Block in poll(2) and snapshot (fd, revents) in registry order.
    fn wait_ready(&self) -> LoopResult<Vec<(RawFd, Option<PollFlags>)>> {
        loop {
            let mut pollfds: Vec<PollFd<'_>> = self
                .registry
                .borrowed_fds()
                .map(|fd| PollFd::new(fd, PollFlags::POLLIN))
                .collect();

            match poll(&mut pollfds, PollTimeout::NONE) {
                Ok(_) => {
                    let snapshot = self
                        .registry
                        .raw_fds()
                        .zip(pollfds.iter().map(|p| p.revents()))
                        .collect();
                    return Ok(snapshot);
                }
                Err(nix::errno::Errno::EINTR) => continue,
                Err(errno) => return Err(LoopError::Poll { errno: errno as i32 }),
            }
        }
    }

    /// Resume one coroutine and act on what it reported.
    fn dispatch(&mut self, index: usize) -> LoopResult<()> {
        match self.registry.coro_mut(index).resume()? {
            Resumption::Yielded(Yielded::Conn(conn)) if index == 0 && self.conn_handler.is_some() => {
                self.spawn_worker(conn);
            }
            Resumption::Yielded(_) => {}
            Resumption::Finished(exit) => {
                if exit == Exit::Stop {
                    kinfo!("shutdown requested on fd {}", self.registry.raw_fd(index));
                    self.running = false;
                }
                self.registry.remove_at(index);
            }
            Resumption::Errored => {
                if index == 0 && self.conn_handler.is_some() {
                    // No new connections can arrive once the acceptor dies.
                    kerror!("acceptor failed; shutting down");
                    self.running = false;
                }
                self.registry.remove_at(index);
            }
        }
        Ok(())
    }

    /// Create a worker for a freshly accepted connection and register it at
    /// the end of the registry (not revisited in the current pass).
    ///
    /// Resource exhaustion here is not locally recoverable; aborting with a
    /// diagnostic is deliberate policy.
    fn spawn_worker(&mut self, conn: RawFd) {
        let handler = self
            .conn_handler
            .clone()
            .expect("spawn_worker outside server mode");
        let fd = unsafe { OwnedFd::from_raw_fd(conn) };
        let coro = Coroutine::new(self.stack_size, move |y| handler(y, conn))
            .expect("could not build connection coroutine");
        self.registry
            .add(coro, fd)
            .expect("could not register connection");
        kdebug!("accepted connection on fd {}", conn);
    }

    /// Apply handler-requested registry edits between resumes
    fn apply_pending(&mut self) {
        for op in self.handle.drain() {
            match op {
                LoopOp::DelFd(fd) => self.registry.remove_fd(fd),
                LoopOp::DelAt(index) => self.registry.remove_at(index),
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
