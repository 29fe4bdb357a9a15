//! Coroutine stack allocation
//!
//! Each coroutine owns a dedicated mmap'd stack with a PROT_NONE guard page
//! at the low end. Stacks grow downward, so running off the end hits the
//! guard and faults instead of silently corrupting neighboring memory.

use coronet_core::constants::{GUARD_SIZE, PAGE_SIZE};
use coronet_core::error::StackError;

/// A dedicated coroutine stack, released exactly once on drop.
///
/// Layout (addresses grow upward):
/// ```text
/// base                       base+GUARD_SIZE              base+total
///  | guard page (PROT_NONE)  | usable stack (RW)          |
///  ```
pub struct Stack {
    base: *mut u8,
    total: usize,
}

impl Stack {
    /// Allocate a stack with at least `size` usable bytes (rounded up to a
    /// whole number of pages), plus the guard page.
    pub fn new(size: usize) -> Result<Self, StackError> {
        let usable = size.max(PAGE_SIZE).div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let total = usable + GUARD_SIZE;

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(StackError::AllocationFailed);
        }

        // Guard page at the low end stays PROT_NONE from the initial mmap
        let ret = unsafe {
            libc::mprotect(
                (base as *mut u8).add(GUARD_SIZE) as *mut libc::c_void,
                usable,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if ret != 0 {
            unsafe { libc::munmap(base, total) };
            return Err(StackError::ProtectionFailed);
        }

        Ok(Self {
            base: base as *mut u8,
            total,
        })
    }

    /// Highest address of the usable region; initial stack pointer.
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.add(self.total) }
    }

    /// Usable bytes (guard page excluded)
    #[inline]
    pub fn len(&self) -> usize {
        self.total - GUARD_SIZE
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_is_rounded_to_pages() {
        let stack = Stack::new(1000).unwrap();
        assert_eq!(stack.len(), PAGE_SIZE);

        let stack = Stack::new(PAGE_SIZE + 1).unwrap();
        assert_eq!(stack.len(), 2 * PAGE_SIZE);
    }

    #[test]
    fn test_top_is_aligned_and_writable() {
        let stack = Stack::new(16 * 1024).unwrap();
        assert_eq!(stack.top() as usize % 16, 0);

        // The byte just below the top must be writable
        unsafe {
            let p = stack.top().sub(1);
            p.write(0xAB);
            assert_eq!(p.read(), 0xAB);
        }
    }
}
