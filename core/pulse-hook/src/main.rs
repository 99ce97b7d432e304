//! pulse-hook: editor activity heartbeats over stdin/stdout.

mod handle;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use pulse_core::config::{validate_proxy, Paths, Settings};
use pulse_core::transport::{AnyTransport, CliTransport, HttpTransport};

#[derive(Parser, Debug)]
#[command(name = "pulse-hook", version, about = "Editor activity heartbeats")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Delivery backend.
    #[arg(long, value_enum, default_value_t = TransportKind::Cli, global = true)]
    transport: TransportKind,

    /// Path to wakatime-cli (defaults to ~/.wakatime/wakatime-cli/wakatime-cli).
    #[arg(long, env = "PULSE_CLI_PATH", global = true)]
    cli: Option<PathBuf>,

    /// Folder holding .wakatime.cfg and .wakatime/ (defaults to WAKATIME_HOME or ~).
    #[arg(long, global = true)]
    home: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Stream editor events from stdin (default).
    Run,
    /// Print today's coding time and exit.
    Today,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum TransportKind {
    Cli,
    Http,
}

fn build_transport(
    kind: TransportKind,
    cli: Option<PathBuf>,
    paths: &Paths,
    settings: &Settings,
) -> Result<AnyTransport, String> {
    match kind {
        TransportKind::Cli => {
            let binary = cli.unwrap_or_else(|| paths.cli_binary());
            if !binary.exists() {
                tracing::warn!(binary = %binary.display(), "wakatime-cli not found");
            }
            Ok(AnyTransport::Cli(CliTransport::new(binary)))
        }
        TransportKind::Http => {
            let proxy = settings.proxy.as_deref().filter(|proxy| {
                match validate_proxy(proxy) {
                    Some(err) => {
                        tracing::warn!(proxy = %proxy, "{}", err);
                        false
                    }
                    None => true,
                }
            });
            HttpTransport::new(proxy)
                .map(AnyTransport::Http)
                .map_err(|e| e.to_string())
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let paths = match cli.home {
        Some(home) => Paths::with_home(home),
        None => Paths::detect().map_err(|e| e.to_string())?,
    };
    let settings = Settings::load(&paths.config_file());
    logging::init(&paths.log_dir(), settings.debug);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pulse-hook starting");

    let transport = build_transport(cli.transport, cli.cli, &paths, &settings)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => runtime.block_on(handle::run(paths, settings, transport)),
        Command::Today => runtime.block_on(handle::today(paths, settings, transport)),
    };

    // Blocking stdin reads never finish on their own.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "pulse-hook failed");
            eprintln!("pulse-hook: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_cli_transport() {
        let cli = Cli::parse_from(["pulse-hook"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.transport, TransportKind::Cli);
    }

    #[test]
    fn test_today_with_http_transport() {
        let cli = Cli::parse_from(["pulse-hook", "today", "--transport", "http", "--home", "/tmp/h"]);
        assert_eq!(cli.command, Some(Command::Today));
        assert_eq!(cli.transport, TransportKind::Http);
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/h")));
    }

    #[test]
    fn test_cli_transport_uses_override_path() {
        let paths = Paths::with_home("/tmp/h");
        let transport = build_transport(
            TransportKind::Cli,
            Some(PathBuf::from("/opt/wakatime-cli")),
            &paths,
            &Settings::default(),
        )
        .unwrap();
        match transport {
            AnyTransport::Cli(cli) => {
                assert_eq!(cli.binary(), std::path::Path::new("/opt/wakatime-cli"))
            }
            AnyTransport::Http(_) => panic!("expected cli transport"),
        }
    }
}
