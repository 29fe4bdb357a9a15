//! # Multi-client server and address resolution
//!
//! [`serve`] is the reactor specialization where slot 0 is a long-lived
//! acceptor coroutine: every readable event on the listening socket accepts
//! exactly one connection and yields its descriptor, which the loop turns
//! into a worker running the caller's per-connection handler.
//!
//! [`lookup`] is the address-resolution convenience wrapper: it iterates
//! resolved candidates in resolver order and invokes a caller-supplied try
//! strategy on each until one succeeds.

use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;

use coronet_core::constants::LISTEN_BACKLOG;
use coronet_core::error::{ConnError, LoopError, LoopResult};
use coronet_core::kdebug;
use coronet_core::state::Exit;
use coronet_runtime::Yielder;

use crate::eventloop::EventLoop;

/// Iterate resolved candidates for `host:port`, invoking `try_addr` on each
/// until one succeeds.
///
/// Candidates are visited in resolver-returned order. Resolution failure is
/// [`LoopError::Resolution`]; if every candidate is rejected the result is
/// [`LoopError::NoUsableAddress`].
pub fn lookup<T, F>(host: &str, port: u16, mut try_addr: F) -> LoopResult<T>
where
    F: FnMut(&SocketAddr) -> LoopResult<T>,
{
    let candidates = (host, port)
        .to_socket_addrs()
        .map_err(LoopError::Resolution)?;

    for addr in candidates {
        match try_addr(&addr) {
            Ok(value) => return Ok(value),
            Err(err) => kdebug!("candidate {} rejected: {}", addr, err),
        }
    }
    Err(LoopError::NoUsableAddress)
}

/// Debug try-strategy: print the candidate's address and keep iterating.
///
/// Rejects every candidate on purpose, so `lookup(host, port, print_addr)`
/// dumps the whole candidate list and ends with `NoUsableAddress`.
pub fn print_addr(addr: &SocketAddr) -> LoopResult<()> {
    println!("{}", addr.ip());
    Err(LoopError::NoUsableAddress)
}

/// Serve `addr` with one worker coroutine per connection.
///
/// Binds with address reuse enabled and a backlog of 1, then blocks until a
/// worker finishes with [`Exit::Stop`] or the acceptor dies. Setup failure
/// at any stage is fatal to startup and returned as
/// [`LoopError::Setup`].
pub fn serve<F>(addr: &SocketAddr, handler: F) -> LoopResult<()>
where
    F: Fn(&Yielder, RawFd) -> Result<Exit, ConnError> + 'static,
{
    let listener = listen_socket(addr)?;
    serve_fd(listener, handler)
}

/// Serve connections arriving on a caller-prepared listener.
///
/// Same loop as [`serve`] without the socket setup; useful when the caller
/// wants to pick the port (e.g. binding port 0) or configure the socket
/// itself.
pub fn serve_listener<F>(listener: TcpListener, handler: F) -> LoopResult<()>
where
    F: Fn(&Yielder, RawFd) -> Result<Exit, ConnError> + 'static,
{
    serve_fd(OwnedFd::from(listener), handler)
}

fn serve_fd<F>(listener: OwnedFd, handler: F) -> LoopResult<()>
where
    F: Fn(&Yielder, RawFd) -> Result<Exit, ConnError> + 'static,
{
    let mut el = EventLoop::new();
    el.set_conn_handler(Rc::new(handler));
    el.add_acceptor(listener, acceptor)?;
    el.run()
}

/// Acceptor body: accept one pending connection per resume and hand it to
/// the loop. An accept failure errors the acceptor, which the loop treats
/// as fatal to the whole server.
fn acceptor(y: &Yielder, sock: RawFd) -> Result<Exit, ConnError> {
    loop {
        let conn = unsafe { libc::accept(sock, std::ptr::null_mut(), std::ptr::null_mut()) };
        if conn < 0 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            return Err(ConnError::AcceptFailed(errno));
        }
        y.suspend_conn(conn);
    }
}

/// Socket setup: create, enable address reuse, bind, listen.
fn listen_socket(addr: &SocketAddr) -> LoopResult<OwnedFd> {
    let family = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };

    let sock = unsafe { libc::socket(family, libc::SOCK_STREAM, 0) };
    if sock < 0 {
        return Err(setup_err("socket"));
    }
    let sock = unsafe { OwnedFd::from_raw_fd(sock) };
    let raw = sock.as_raw_fd();

    let yes: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            raw,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &yes as *const _ as *const libc::c_void,
            std::mem::size_of_val(&yes) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(setup_err("reuse"));
    }

    let ret = match addr {
        SocketAddr::V4(v4) => {
            let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr.s_addr = u32::from(*v4.ip()).to_be();
            unsafe {
                libc::bind(
                    raw,
                    &sin as *const _ as *const libc::sockaddr,
                    std::mem::size_of_val(&sin) as libc::socklen_t,
                )
            }
        }
        SocketAddr::V6(v6) => {
            let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_addr.s6_addr = v6.ip().octets();
            unsafe {
                libc::bind(
                    raw,
                    &sin6 as *const _ as *const libc::sockaddr,
                    std::mem::size_of_val(&sin6) as libc::socklen_t,
                )
            }
        }
    };
    if ret != 0 {
        return Err(setup_err("bind"));
    }

    if unsafe { libc::listen(raw, LISTEN_BACKLOG) } != 0 {
        return Err(setup_err("listen"));
    }

    Ok(sock)
}

fn setup_err(stage: &'static str) -> LoopError {
    LoopError::Setup {
        stage,
        errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_visits_candidates_in_order() {
        let mut seen = Vec::new();
        let result: LoopResult<()> = lookup("127.0.0.1", 4242, |addr| {
            seen.push(*addr);
            Err(LoopError::NoUsableAddress)
        });
        assert!(matches!(result, Err(LoopError::NoUsableAddress)));
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].port(), 4242);
    }

    #[test]
    fn test_lookup_stops_on_first_success() {
        let result = lookup("127.0.0.1", 1, |addr| Ok(addr.port()));
        assert_eq!(result.unwrap(), 1);
    }

    #[test]
    fn test_lookup_resolution_failure() {
        let result: LoopResult<()> = lookup("coronet-test.invalid", 1, |_| Ok(()));
        assert!(matches!(result, Err(LoopError::Resolution(_))));
    }

    #[test]
    fn test_listen_socket_binds_localhost() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let sock = listen_socket(&addr).unwrap();
        drop(sock);
    }
}
