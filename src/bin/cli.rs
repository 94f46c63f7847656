//! blinkkv CLI Client
//!
//! Command-line interface for interacting with blinkkv.

use std::io::{BufReader, Write};
use std::net::TcpStream;
use std::process::ExitCode;

use blinkkv::protocol::{encode_request, read_reply, Reply};
use clap::Parser;

/// blinkkv CLI
///
/// Sends one command and prints the reply, e.g.
/// `blinkkv-cli lpush mylist a b c` or `blinkkv-cli lrange mylist 0 -1`.
#[derive(Parser, Debug)]
#[command(name = "blinkkv-cli")]
#[command(about = "CLI for the blinkkv server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    server: String,

    /// Command name followed by its arguments
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn run(args: &Args) -> blinkkv::Result<Reply> {
    let mut stream = TcpStream::connect(&args.server)?;
    stream.set_nodelay(true)?;

    stream.write_all(&encode_request(&args.command))?;
    stream.flush()?;

    let mut reader = BufReader::new(stream);
    read_reply(&mut reader)
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args) {
        Ok(reply) => {
            println!("{reply}");
            if reply.is_error() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Could not talk to {}: {}", args.server, e);
            ExitCode::FAILURE
        }
    }
}
