use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::timetable::{export, load_timetable, ExportFormat};

#[derive(Args, Debug)]
pub struct TimetableArgs {
    /// Route file, skeleton or bare stop list
    #[arg(value_name = "ROUTE_FILE")]
    pub route: PathBuf,

    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,

    /// Write here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: TimetableArgs) -> Result<ExitCode> {
    let timetable = load_timetable(&args.route)?;

    match &args.out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            export(&timetable, args.format, &mut writer)?;
            writer.flush()?;
            info!(stops = timetable.len(), out = %path.display(), "Timetable exported");
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            export(&timetable, args.format, &mut writer)?;
            writeln!(writer)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
