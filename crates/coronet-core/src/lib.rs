//! # coronet-core
//!
//! Core types for the coronet cooperative network runtime.
//!
//! This crate makes no syscalls and holds no platform machinery beyond the
//! Unix descriptor type. Context switching, stack allocation and the
//! coroutine object live in `coronet-runtime`; the reactor and networking
//! layer in `coronet`.
//!
//! ## Modules
//!
//! - `state` - coroutine state machine and transfer-value enums
//! - `error` - error types
//! - `kprint` - kernel-style debug printing macros
//! - `env` - environment variable utilities

pub mod env;
pub mod error;
pub mod kprint;
pub mod state;

// Re-exports for convenience
pub use env::{env_get, env_get_bool};
pub use error::{ConnError, LoopError, LoopResult, StackError};
pub use kprint::LogLevel;
pub use state::{CoroState, Exit, Resumption, Yielded};

/// Constants for stack layout and socket setup
pub mod constants {
    /// Page size assumed for stack rounding and the guard page
    pub const PAGE_SIZE: usize = 4096;

    /// Guard page size at the low end of every coroutine stack
    pub const GUARD_SIZE: usize = PAGE_SIZE;

    /// Default coroutine stack size (64 KB usable, guard page excluded)
    ///
    /// Override per loop with `EventLoop::with_stack_size` or globally via
    /// the `CORONET_STACK_SIZE` environment variable.
    pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

    /// Listen backlog for the multi-client server
    pub const LISTEN_BACKLOG: i32 = 1;
}
