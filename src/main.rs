mod config;
mod diagnostics;
mod launcher;
mod provision;
mod sequencer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "render-boot",
    about = "Deployment bootstrap: ODBC diagnostics, env checks and server launch"
)]
struct Args {
    #[arg(long, help = "Config file path (default: ./bootstrap.toml)")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the startup sequence and launch the server (the default)
    Run(RunArgs),
    /// Print the ODBC driver diagnostic report and exit
    CheckDrivers,
    /// Best-effort host setup: system packages and odbcinst.ini
    Provision,
}

#[derive(clap::Args, Default)]
struct RunArgs {
    #[arg(long, help = "Echo tracked environment variables before launching")]
    verify_env: bool,

    #[arg(long, help = "Skip the ODBC driver diagnostic")]
    skip_driver_check: bool,

    #[arg(long, help = "TCP port for the server (overrides $PORT)")]
    port: Option<u16>,

    #[arg(
        long,
        value_name = "CMDLINE",
        help = "Server command override (e.g. 'gunicorn --workers 2')"
    )]
    command: Option<String>,

    #[arg(long, value_name = "FILE", help = "Application entry point")]
    entry: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };

    let mut stdout = io::stdout();
    match args.command.unwrap_or_else(|| Cmd::Run(RunArgs::default())) {
        Cmd::CheckDrivers => {
            let probe = diagnostics::probe(&diagnostics::OdbcInst);
            diagnostics::write_report(&mut stdout, &probe)?;
            Ok(())
        }
        Cmd::Provision => provision::provision(&mut stdout),
        Cmd::Run(run) => {
            let mut launch = cfg.launch;
            if run.verify_env {
                launch.verify_env = true;
            }
            if let Some(command) = run.command {
                launch.command = command;
            }
            if let Some(entry) = run.entry {
                launch.entry = entry;
            }

            let seq = sequencer::Sequencer {
                snapshot: config::EnvSnapshot::capture(),
                launch,
                drivers: &diagnostics::OdbcInst,
            };
            let plan = seq.prepare(&mut stdout, run.port, run.skip_driver_check)?;

            // The bootstrap's exit code is the server's.
            let code = launcher::run(&plan)?;
            std::process::exit(code);
        }
    }
}
