//! nlcli binary

// The binary owns stdout and stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use nlcli::cli::{self, Cli, exit_code_for, render_error};
use nlcli::tracing::{Level, TracingConfig, init_tracing};
use nlcli::{CliError, CommandOutput, Settings, execute};

fn main() {
    // Tracing may be unusable while panicking, so write directly
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();
    let exit_code = run(&cli);
    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> i32 {
    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: Level::from(cli.level),
        ..Default::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
    ::tracing::debug!(
        correlation_id = %nlcli::tracing::correlation_id(),
        command = ?cli.command,
        "Starting nlcli"
    );

    match Settings::load().and_then(|settings| execute(&cli.command, &settings, cli.json)) {
        Ok(output) => emit(&output),
        Err(err) => fail(&err, cli.json),
    }
}

fn emit(output: &CommandOutput) -> i32 {
    if output.to_stderr {
        eprintln!("{}", output.text);
    } else {
        println!("{}", output.text);
    }
    output.exit_code
}

fn fail(err: &CliError, json: bool) -> i32 {
    ::tracing::debug!(error = %err, "Command failed");
    render_error(err, json);
    exit_code_for(err)
}
