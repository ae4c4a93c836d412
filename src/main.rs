//! dirsync - one-way directory mirroring daemon.
//!
//! Mirrors a source tree onto a copy tree by running the scan→diff→
//! schedule→execute pipeline either once or on a fixed period until
//! interrupted.

use clap::Parser;
use dirsync::config::{Cli, Settings};
use dirsync::controller;
use dirsync::logging;
use std::process::ExitCode;

fn main() -> ExitCode {
    // clap exits with code 2 on its own parse errors.
    let cli = Cli::parse();

    let settings = match Settings::try_from(cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    if let Err(err) = logging::init(&settings) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::from(1);
    }

    if settings.print_pid {
        println!("PID={}", std::process::id());
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(controller::run_guarded(settings)) {
        Ok(()) => {
            println!("process (PID={}) has been stopped", std::process::id());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}
