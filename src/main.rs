//! CLI entry point for the harvester tool.

use std::process::ExitCode;

mod app;
mod app_config;
mod cli;

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Run completed; per-file failures are in the report.
    Success,
    /// The discovery entry point could not be used.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::FAILURE,
        }
    }
}

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    let result = runtime.block_on(app::runtime::run_harvester());
    // A prompt abandoned by Ctrl-C may still be blocked reading stdin;
    // waiting for it would hang the exit.
    runtime.shutdown_background();

    match result {
        Ok(exit) => exit.into(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
