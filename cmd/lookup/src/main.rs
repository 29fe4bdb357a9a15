//! Address resolution harness
//!
//! Prints every resolved candidate for a host/port pair, one per line.
//!
//! ```text
//! lookup [host] [port]        # defaults: localhost 37812
//! ```

use std::process::ExitCode;

use coronet::{kerror, net, LoopError};

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

    // print_addr rejects every candidate so the whole list gets printed;
    // exhaustion is the expected outcome here.
    match net::lookup(&host, port, net::print_addr) {
        Err(LoopError::NoUsableAddress) => ExitCode::SUCCESS,
        Err(err) => {
            kerror!("{}", err);
            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
    }
}
