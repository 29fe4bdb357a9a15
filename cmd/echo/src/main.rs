//! Echo server harness
//!
//! Serves one echo per connection: reads until EOF (up to 8 bytes) and
//! writes the payload back. Sending `quit` shuts the whole server down.
//!
//! ```text
//! echo [host] [port]          # defaults: localhost 37812
//! ```
//!
//! Try it with netcat:
//!
//! ```text
//! printf hello | nc -N localhost 37812
//! ```
//!
//! # Environment Variables
//!
//! - `CORONET_LOG_LEVEL=debug` - log level (off, error, warn, info, debug, trace)
//! - `CORONET_FLUSH_EPRINT=1` - flush diagnostics immediately

use std::os::fd::RawFd;
use std::process::ExitCode;

use coronet::{io, kerror, kinfo, net, ConnError, Exit, Yielder};

fn echo(y: &Yielder, fd: RawFd) -> Result<Exit, ConnError> {
    let mut buf = [0u8; 8];
    let got = io::recv_eof(y, fd, &mut buf)?;

    if &buf[..got] == b"quit" {
        return Ok(Exit::Stop);
    }

    io::send_all(y, fd, &buf[..got])?;
    Ok(Exit::Done)
}

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".into());
    let port: u16 = match args.next().as_deref().unwrap_or("37812").parse() {
        Ok(port) => port,
        Err(_) => {
            kerror!("invalid port");
            return ExitCode::FAILURE;
        }
    };

    kinfo!("echo server on {}:{}", host, port);
    match net::lookup(&host, port, |addr| net::serve(addr, echo)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            kerror!("{}", err);
            ExitCode::FAILURE
        }
    }
}
