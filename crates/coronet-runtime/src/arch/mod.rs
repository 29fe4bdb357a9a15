//! Architecture-specific context switching
//!
//! Each architecture module provides a `Context` holding the callee-saved
//! register set, `init_context` to aim a fresh context at an entry function,
//! and `switch_context` to save the current execution point into one context
//! and resume another.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
    }
}
