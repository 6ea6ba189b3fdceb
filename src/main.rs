use std::process::ExitCode;

use clap::Parser;
use rgbcompositor::cli::{self, CliArgs};
use rgbcompositor::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    match &args.log_file {
        Some(path) => logger::init_at(path),
        None => logger::init(),
    }
    logger::set_verbose(args.verbose);

    cli::run(args)
}
