//! Descriptor ↔ coroutine registry
//!
//! One slot per connection, holding both the descriptor and the coroutine
//! serving it, so the two can never drift apart. Removal is swap-with-last:
//! O(1), at the cost of reassigning the index of the formerly-last entry.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use coronet_core::error::{LoopError, LoopResult};
use coronet_runtime::Coroutine;

/// One registered connection: the descriptor and its owning coroutine.
///
/// Field order matters: the descriptor closes before the stack is released,
/// matching the removal discipline of the loop.
struct Slot {
    fd: OwnedFd,
    coro: Coroutine,
}

/// The loop's collection of (descriptor, coroutine) pairs.
#[derive(Default)]
pub struct Registry {
    slots: Vec<Slot>,
}

impl Registry {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append a pair. All-or-nothing: on growth failure the registry is
    /// unchanged and the pair is returned to the caller via drop.
    pub fn add(&mut self, coro: Coroutine, fd: OwnedFd) -> LoopResult<()> {
        self.slots
            .try_reserve(1)
            .map_err(|_| LoopError::RegistryFull)?;
        self.slots.push(Slot { fd, coro });
        Ok(())
    }

    /// Index currently holding `fd`, if any
    pub fn index_of(&self, fd: RawFd) -> Option<usize> {
        self.slots.iter().position(|s| s.fd.as_raw_fd() == fd)
    }

    #[inline]
    pub fn raw_fd(&self, index: usize) -> RawFd {
        self.slots[index].fd.as_raw_fd()
    }

    #[inline]
    pub fn coro_mut(&mut self, index: usize) -> &mut Coroutine {
        &mut self.slots[index].coro
    }

    /// Descriptors in slot order, borrowed for the readiness wait
    pub fn borrowed_fds(&self) -> impl Iterator<Item = BorrowedFd<'_>> {
        self.slots.iter().map(|s| s.fd.as_fd())
    }

    /// Raw descriptors in slot order
    pub fn raw_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.slots.iter().map(|s| s.fd.as_raw_fd())
    }

    /// Remove the slot at `index`: closes the descriptor and releases the
    /// coroutine stack. The formerly-last slot takes over this index.
    pub fn remove_at(&mut self, index: usize) {
        if index >= self.slots.len() {
            return;
        }
        let mut slot = self.slots.swap_remove(index);
        slot.coro.force();
    }

    /// Remove the slot holding `fd`; no-op if absent
    pub fn remove_fd(&mut self, fd: RawFd) {
        if let Some(index) = self.index_of(fd) {
            self.remove_at(index);
        }
    }

    /// Unconditional teardown: force-terminate and drop every slot,
    /// closing every descriptor exactly once.
    pub fn clear(&mut self) {
        while let Some(mut slot) = self.slots.pop() {
            slot.coro.force();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coronet_core::state::Exit;

    fn dummy_pair() -> (Coroutine, OwnedFd) {
        let coro = Coroutine::new(16 * 1024, |_| Ok(Exit::Done)).unwrap();
        let fd = OwnedFd::from(std::fs::File::open("/dev/null").unwrap());
        (coro, fd)
    }

    #[test]
    fn test_add_then_remove_keeps_pairs_coherent() {
        let mut reg = Registry::new();
        let mut raws = Vec::new();
        for _ in 0..4 {
            let (coro, fd) = dummy_pair();
            raws.push(fd.as_raw_fd());
            reg.add(coro, fd).unwrap();
        }
        assert_eq!(reg.len(), 4);

        // Swap-remove of index 1 moves the last entry into its place
        reg.remove_at(1);
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.raw_fd(0), raws[0]);
        assert_eq!(reg.raw_fd(1), raws[3]);
        assert_eq!(reg.raw_fd(2), raws[2]);
        assert_eq!(reg.index_of(raws[1]), None);
    }

    #[test]
    fn test_remove_fd_is_noop_when_absent() {
        let mut reg = Registry::new();
        let (coro, fd) = dummy_pair();
        reg.add(coro, fd).unwrap();
        reg.remove_fd(-1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_clear_empties_registry() {
        let mut reg = Registry::new();
        for _ in 0..3 {
            let (coro, fd) = dummy_pair();
            reg.add(coro, fd).unwrap();
        }
        reg.clear();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_remove_at_out_of_range_is_noop() {
        let mut reg = Registry::new();
        reg.remove_at(0);
        assert!(reg.is_empty());
    }
}
