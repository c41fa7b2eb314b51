mod api;
mod commands;
mod logging;
mod route;
mod session;
mod telemetry;
mod timetable;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::resolve::ResolveArgs;
use commands::serve::ServeArgs;
use commands::timetable::TimetableArgs;

#[derive(Parser)]
#[command(name = "trainsim-route-hud")]
#[command(about = "Driver HUD, route recorder and route tools for a train simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll telemetry and serve the HUD, optionally recording a route
    Serve(ServeArgs),
    /// Fix recorded marker detections onto the route polyline
    Resolve(ResolveArgs),
    /// Export a route's timetable as CSV or JSON
    Timetable(TimetableArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging();

    let result = match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Resolve(args) => commands::resolve::run(args),
        Command::Timetable(args) => commands::timetable::run(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
