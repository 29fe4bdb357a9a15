//! # coronet - cooperative coroutine-per-connection networking
//!
//! A minimal single-threaded runtime that multiplexes many network
//! connections over cooperatively-scheduled, stack-based coroutines driven
//! by a readiness-polling reactor. Handler code reads like ordinary
//! blocking code; the runtime suspends and resumes it around non-blocking
//! socket operations.
//!
//! ## Quick Start
//!
//! ```ignore
//! use coronet::{io, net, Exit};
//!
//! fn main() {
//!     net::lookup("localhost", 37812, |addr| {
//!         net::serve(addr, |y, fd| {
//!             let mut buf = [0u8; 8];
//!             let got = io::recv_eof(y, fd, &mut buf)?;
//!             if &buf[..got] == b"quit" {
//!                 return Ok(Exit::Stop);      // shut the whole server down
//!             }
//!             io::send_all(y, fd, &buf[..got])?;
//!             Ok(Exit::Done)                  // close just this connection
//!         })
//!     })
//!     .expect("server failed");
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Handler code                        │
//! │        io::recv_eof / io::send_all, blocking-style      │
//! └─────────────────────────────────────────────────────────┘
//!                             │ would-block: suspend
//!                             ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                Coroutine (dedicated stack)              │
//! │        resume ⇄ suspend via voluntary context switch    │
//! └─────────────────────────────────────────────────────────┘
//!                             │ readiness
//!                             ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │             Event loop: poll(2) over registry           │
//! │     slot 0 = acceptor (server), slots 1.. = workers     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! One coroutine runs at any instant; there is no preemption and no timer.
//! A known constraint: the reactor watches read-readiness only, so a
//! coroutine suspended in `send_all` resumes on the next *read* readiness
//! of its descriptor.

pub mod eventloop;
pub mod io;
pub mod net;
pub mod registry;

// Re-export core types
pub use coronet_core::error::{ConnError, LoopError, LoopResult, StackError};
pub use coronet_core::state::{CoroState, Exit, Resumption, Yielded};

// Re-export kprint macros and helpers
pub use coronet_core::kprint::{self, set_log_level, LogLevel};
pub use coronet_core::{kdebug, kerror, kinfo, kprintln, ktrace, kwarn};
pub use coronet_core::{env_get, env_get_bool};

// Re-export runtime types
pub use coronet_runtime::{Coroutine, Stack, Yielder};

pub use eventloop::{EventLoop, LoopHandle};
pub use registry::Registry;
