//! Stagegate CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use stagegate::cli::{Cli, CommandDispatcher, ProjectLocation};
use stagegate::shell::install_interrupt_handler;
use stagegate::ui::{OutputMode, TerminalUI, UserInterface};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. Default is INFO
///
/// Events go to stderr so stdout stays clean for status lines.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("stagegate=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stagegate=info"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    install_interrupt_handler();

    tracing::debug!("stagegate starting with args: {:?}", cli);

    let output_mode = if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    let project_root = cli
        .project
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let location = ProjectLocation::new(project_root).with_config(cli.config.clone());

    let mut ui = TerminalUI::new(output_mode);
    let dispatcher = CommandDispatcher::new(location);

    match dispatcher.dispatch(&cli, &mut ui) {
        Ok(result) => ExitCode::from(result.exit_code as u8),
        Err(e) => {
            ui.error(&format!("Error: {}", e));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
