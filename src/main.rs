use std::process::ExitCode;

use clap::Parser;

use tilepaint::cli::{self, CliArgs};

fn main() -> ExitCode {
    cli::run(CliArgs::parse())
}
