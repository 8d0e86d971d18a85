//! Hybrid memory tool server.
//! Run with: cargo run --bin hybrid-memory-server

use std::process::ExitCode;

use hybrid_memory::start;

fn main() -> ExitCode {
    start::run()
}
