//! # coronet-runtime
//!
//! Platform-specific execution machinery for the coronet runtime.
//!
//! This crate provides:
//! - Guard-paged stack allocation (mmap)
//! - Context switching (architecture-specific assembly)
//! - The coroutine object and its in-coroutine `Yielder` handle

pub mod arch;
pub mod coro;
pub mod stack;

// Re-exports
pub use coro::{Coroutine, EntryFn, Yielder};
pub use stack::Stack;

// Architecture detection
cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub use arch::x86_64 as current_arch;
    } else if #[cfg(target_arch = "aarch64")] {
        pub use arch::aarch64 as current_arch;
    } else {
        compile_error!("Unsupported architecture");
    }
}

#[cfg(not(unix))]
compile_error!("coronet-runtime requires a Unix platform");
