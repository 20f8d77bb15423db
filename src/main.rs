use clap::{CommandFactory, Parser};
use std::io;
use std::net::IpAddr;
use std::process;

use reverb::cli::Args;
use reverb::config::EndpointConfig;
use reverb::probe::socket::create_endpoint;
use reverb::vectors;
use reverb::verify::{RunOptions, Verifier};

/// The process exit code reports:
///   < 0 : setup/connection or similar fatal error (negated errno)
///     0 : all vectors passed
///   > 0 : first expected-reply timeout index + 1, or the table index
///         of a verification failure
fn main() {
    process::exit(run());
}

/// Map a fatal error to its exit code: the negated OS error when one is
/// in the chain, otherwise -EINVAL
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .and_then(|io_err| io_err.raw_os_error())
        .map(|code| -code)
        .unwrap_or(-libc::EINVAL)
}

fn run() -> i32 {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        return -libc::EINVAL;
    }

    let target_str = match args.target.as_deref() {
        Some(target) => target,
        None => {
            Args::command().print_help().ok();
            return -libc::EINVAL;
        }
    };

    let target: IpAddr = match target_str.parse() {
        Ok(addr) => addr,
        Err(_) => {
            println!("Invalid address family");
            return -libc::EINVAL;
        }
    };

    // Refuse multicast targets without an interface before any socket
    // exists
    if target.is_multicast() && args.interface.is_none() {
        println!("Need to use -i option for multicast addresses.");
        return -libc::EINVAL;
    }

    let config = EndpointConfig::new(target, &args);

    let endpoint = match create_endpoint(&config) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return exit_code_for(&e);
        }
    };

    let options = RunOptions {
        flood: args.flood,
        forever: args.forever,
        pass_limit: None,
    };

    match Verifier::new(endpoint, vectors::table(), options).run() {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    }
}
