//! Mood Lens CLI - live facial emotion display.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{Cli, Commands, ExitCode};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let outcome = match cli.command {
        Some(Commands::Run(ref args)) => commands::run::run(args),
        Some(Commands::Models(ref args)) => commands::models::run(args).map(|()| ExitCode::Success),
        Some(Commands::Cameras) => commands::cameras::run().map(|()| ExitCode::Success),
        // Default behavior: run with flattened args
        None => commands::run::run(&cli.run),
    };

    match outcome {
        Ok(code) => code.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::Error.into()
        }
    }
}
