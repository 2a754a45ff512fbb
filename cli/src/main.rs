use std::process::ExitCode;

use clap::Parser;
use distill_lib::cli::Cli;

fn main() -> ExitCode {
    distill_lib::run(Cli::parse())
}
