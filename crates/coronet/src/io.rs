//! # Blocking-style I/O for coroutine bodies
//!
//! One generic retry loop under three entry points. Each call attempts the
//! transfer with `MSG_DONTWAIT`; on would-block it suspends the coroutine,
//! to be retried when the reactor next reports the descriptor ready.
//!
//! From the handler's perspective these look like ordinary blocking calls:
//!
//! ```ignore
//! let got = io::recv_eof(y, fd, &mut buf)?;
//! io::send_all(y, fd, &buf[..got])?;
//! ```
//!
//! Note: the reactor watches read-readiness only, so a coroutine suspended
//! mid `send_all` resumes on the next *read* readiness of its descriptor.

use std::os::fd::RawFd;

use coronet_core::error::ConnError;
use coronet_runtime::Yielder;

/// One non-blocking step of the underlying transfer
type StepFn = unsafe fn(RawFd, *mut u8, usize) -> isize;

unsafe fn recv_step(fd: RawFd, buf: *mut u8, len: usize) -> isize {
    libc::recv(fd, buf as *mut libc::c_void, len, libc::MSG_DONTWAIT)
}

unsafe fn send_step(fd: RawFd, buf: *mut u8, len: usize) -> isize {
    libc::send(fd, buf as *const libc::c_void, len, libc::MSG_DONTWAIT)
}

/// The generic retry loop.
///
/// Partial transfers advance the cursor without suspending; would-block
/// suspends with no value; a zero-length result either ends the stream
/// (`Ok(done)`) or is a fatal short transfer, depending on `eof_is_error`.
fn do_all(
    y: &Yielder,
    fd: RawFd,
    buf: *mut u8,
    len: usize,
    eof_is_error: bool,
    step: StepFn,
) -> Result<usize, ConnError> {
    let mut done = 0;
    while done < len {
        let n = unsafe { step(fd, buf.add(done), len - done) };
        if n == 0 {
            if eof_is_error {
                return Err(ConnError::UnexpectedEof);
            }
            return Ok(done);
        }
        if n < 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK {
                y.suspend_not_ready();
            } else {
                return Err(ConnError::Io(errno));
            }
        } else {
            done += n as usize;
        }
    }
    Ok(len)
}

/// Send the entire buffer.
///
/// Never short-counts: either the full length goes out or the call fails,
/// erroring the coroutine when the handler propagates it. A peer that
/// stops accepting data mid-transfer is [`ConnError::UnexpectedEof`].
pub fn send_all(y: &Yielder, fd: RawFd, buf: &[u8]) -> Result<(), ConnError> {
    do_all(y, fd, buf.as_ptr() as *mut u8, buf.len(), true, send_step).map(|_| ())
}

/// Receive exactly `buf.len()` bytes.
///
/// Never short-counts: a peer close before the full length arrives is
/// [`ConnError::UnexpectedEof`].
pub fn recv_all(y: &Yielder, fd: RawFd, buf: &mut [u8]) -> Result<(), ConnError> {
    do_all(y, fd, buf.as_mut_ptr(), buf.len(), true, recv_step).map(|_| ())
}

/// Receive until the peer closes or `buf` fills, whichever comes first.
///
/// Returns the number of bytes actually received (≤ `buf.len()`).
pub fn recv_eof(y: &Yielder, fd: RawFd, buf: &mut [u8]) -> Result<usize, ConnError> {
    do_all(y, fd, buf.as_mut_ptr(), buf.len(), false, recv_step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coronet_core::state::{Exit, Resumption, Yielded};
    use coronet_runtime::Coroutine;
    use std::cell::Cell;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::rc::Rc;

    const STACK: usize = 64 * 1024;

    fn socketpair() -> (OwnedFd, OwnedFd) {
        let mut fds = [0; 2];
        let ret = unsafe {
            libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr())
        };
        assert_eq!(ret, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    fn write_all(fd: &OwnedFd, data: &[u8]) {
        let n = unsafe {
            libc::send(fd.as_raw_fd(), data.as_ptr() as *const _, data.len(), 0)
        };
        assert_eq!(n, data.len() as isize);
    }

    fn read_some(fd: &OwnedFd, buf: &mut [u8]) -> isize {
        unsafe { libc::recv(fd.as_raw_fd(), buf.as_mut_ptr() as *mut _, buf.len(), 0) }
    }

    #[test]
    fn test_recv_all_suspends_until_full_length() {
        let (ours, theirs) = socketpair();
        let raw = ours.as_raw_fd();

        let collected = Rc::new(Cell::new([0u8; 8]));
        let sink = collected.clone();
        let mut coro = Coroutine::new(STACK, move |y| {
            let mut buf = [0u8; 8];
            recv_all(y, raw, &mut buf)?;
            sink.set(buf);
            Ok(Exit::Done)
        })
        .unwrap();

        // Nothing buffered yet: first resume must suspend on would-block
        assert_eq!(coro.resume().unwrap(), Resumption::Yielded(Yielded::NotReady));

        // Half the data: partial progress, then suspend again
        write_all(&theirs, b"half");
        assert_eq!(coro.resume().unwrap(), Resumption::Yielded(Yielded::NotReady));

        // The rest: completes without further suspension
        write_all(&theirs, b"full");
        assert_eq!(coro.resume().unwrap(), Resumption::Finished(Exit::Done));
        assert_eq!(&collected.get(), b"halffull");
    }

    #[test]
    fn test_recv_all_short_stream_errors() {
        let (ours, theirs) = socketpair();
        let raw = ours.as_raw_fd();

        let mut coro = Coroutine::new(STACK, move |y| {
            let mut buf = [0u8; 8];
            recv_all(y, raw, &mut buf)?;
            Ok(Exit::Done)
        })
        .unwrap();

        write_all(&theirs, b"abc");
        drop(theirs);
        // Three bytes then EOF: full-length recv must error, never short-count
        assert_eq!(coro.resume().unwrap(), Resumption::Errored);
    }

    #[test]
    fn test_recv_eof_returns_bytes_before_close() {
        let (ours, theirs) = socketpair();
        let raw = ours.as_raw_fd();

        let got = Rc::new(Cell::new(0usize));
        let sink = got.clone();
        let mut coro = Coroutine::new(STACK, move |y| {
            let mut buf = [0u8; 8];
            let n = recv_eof(y, raw, &mut buf)?;
            assert_eq!(&buf[..n], b"hello");
            sink.set(n);
            Ok(Exit::Done)
        })
        .unwrap();

        write_all(&theirs, b"hello");
        drop(theirs);
        assert_eq!(coro.resume().unwrap(), Resumption::Finished(Exit::Done));
        assert_eq!(got.get(), 5);
    }

    #[test]
    fn test_recv_eof_fills_buffer_without_close() {
        let (ours, theirs) = socketpair();
        let raw = ours.as_raw_fd();

        let mut coro = Coroutine::new(STACK, move |y| {
            let mut buf = [0u8; 4];
            let n = recv_eof(y, raw, &mut buf)?;
            assert_eq!(n, 4);
            assert_eq!(&buf, b"full");
            Ok(Exit::Done)
        })
        .unwrap();

        // Peer stays open; a full buffer alone completes the call
        write_all(&theirs, b"full");
        assert_eq!(coro.resume().unwrap(), Resumption::Finished(Exit::Done));
    }

    #[test]
    fn test_send_all_round_trip() {
        let (ours, theirs) = socketpair();
        let raw = ours.as_raw_fd();

        let mut coro = Coroutine::new(STACK, move |y| {
            send_all(y, raw, b"payload")?;
            Ok(Exit::Done)
        })
        .unwrap();

        assert_eq!(coro.resume().unwrap(), Resumption::Finished(Exit::Done));

        let mut buf = [0u8; 16];
        let n = read_some(&theirs, &mut buf);
        assert_eq!(&buf[..n as usize], b"payload");
    }
}
