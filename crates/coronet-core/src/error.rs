//! Error types for the coronet runtime

use core::fmt;

use crate::state::CoroState;

/// Result type for loop and setup operations
pub type LoopResult<T> = Result<T, LoopError>;

/// Errors that abort a loop-level operation
#[derive(Debug)]
pub enum LoopError {
    /// Coroutine stack allocation failed
    Stack(StackError),

    /// Registry growth failed (memory exhaustion)
    RegistryFull,

    /// A coroutine was resumed in a non-resumable state
    NotResumable(CoroState),

    /// Socket setup failure (socket, reuse, bind, listen); fatal at startup
    Setup { stage: &'static str, errno: i32 },

    /// The readiness wait itself failed
    Poll { errno: i32 },

    /// Name/service resolution failed
    Resolution(std::io::Error),

    /// Every resolved candidate was tried and rejected
    NoUsableAddress,
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopError::Stack(e) => write!(f, "stack error: {}", e),
            LoopError::RegistryFull => write!(f, "could not grow registry"),
            LoopError::NotResumable(s) => write!(f, "coroutine not resumable (state: {})", s),
            LoopError::Setup { stage, errno } => {
                write!(f, "setup failed at {}: errno {}", stage, errno)
            }
            LoopError::Poll { errno } => write!(f, "poll failed: errno {}", errno),
            LoopError::Resolution(e) => write!(f, "address resolution failed: {}", e),
            LoopError::NoUsableAddress => write!(f, "no usable address among candidates"),
        }
    }
}

impl std::error::Error for LoopError {}

impl From<StackError> for LoopError {
    fn from(e: StackError) -> Self {
        LoopError::Stack(e)
    }
}

/// Stack memory errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// mmap failed
    AllocationFailed,

    /// mprotect failed
    ProtectionFailed,
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackError::AllocationFailed => write!(f, "stack allocation failed"),
            StackError::ProtectionFailed => write!(f, "stack protection change failed"),
        }
    }
}

impl std::error::Error for StackError {}

/// Isolated per-connection failures.
///
/// A handler returning one of these drives its coroutine to `Errored`; the
/// reactor reclaims that slot and descriptor and the loop continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnError {
    /// The peer closed mid full-length transfer
    UnexpectedEof,

    /// send/recv failed with the given errno
    Io(i32),

    /// accept failed with the given errno (fatal to the acceptor)
    AcceptFailed(i32),
}

impl fmt::Display for ConnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnError::UnexpectedEof => write!(f, "unexpected end of stream"),
            ConnError::Io(errno) => write!(f, "i/o failed: errno {}", errno),
            ConnError::AcceptFailed(errno) => write!(f, "accept failed: errno {}", errno),
        }
    }
}

impl std::error::Error for ConnError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = LoopError::Stack(StackError::AllocationFailed);
        assert_eq!(format!("{}", e), "stack error: stack allocation failed");

        let e = LoopError::Setup { stage: "bind", errno: 98 };
        assert_eq!(format!("{}", e), "setup failed at bind: errno 98");

        let e = ConnError::UnexpectedEof;
        assert_eq!(format!("{}", e), "unexpected end of stream");
    }

    #[test]
    fn test_error_conversion() {
        let err: LoopError = StackError::ProtectionFailed.into();
        assert!(matches!(err, LoopError::Stack(StackError::ProtectionFailed)));
    }
}
