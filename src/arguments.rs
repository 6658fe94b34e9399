use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;

use crate::server::DEFAULT_QUEUE_CAPACITY;

/// Chat relay server command line arguments.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct ServerArguments {
    /// Port to listen on.
    #[clap(value_parser)]
    pub port: u16,

    /// IPv4 address to listen on.
    #[clap(short, long, value_parser, default_value = "0.0.0.0")]
    pub address: Ipv4Addr,

    /// Messages a session may have queued before it is dropped as too slow.
    #[clap(short, long, value_parser, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Address to publish console events on.
    #[clap(short, long, value_parser)]
    pub console: Option<SocketAddr>,
}

/// Chat relay client command line arguments.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct ClientArguments {
    /// Host to connect to.
    #[clap(long, value_parser, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to connect to. Read from standard input when omitted.
    #[clap(short, long, value_parser)]
    pub port: Option<u16>,

    /// Address to publish console events on.
    #[clap(short, long, value_parser)]
    pub console: Option<SocketAddr>,
}

/// Parse the process arguments, exiting with status 1 when they are missing or invalid.
/// `--help` and `--version` still exit with status 0.
pub fn parse<T: Parser>() -> T {
    match T::try_parse() {
        Ok(arguments) => arguments,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    }
}
