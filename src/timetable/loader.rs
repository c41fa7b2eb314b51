use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::timetable::types::Timetable;

#[derive(Debug, Error)]
pub enum TimetableError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid timetable in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} has no timetable")]
    Missing { path: PathBuf },

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Either a bare stop array or any route file carrying a `timetable` field.
#[derive(Deserialize)]
#[serde(untagged)]
enum TimetableSource {
    Bare(Timetable),
    Embedded {
        #[serde(default)]
        timetable: Option<Timetable>,
    },
}

pub fn load_timetable(path: &Path) -> Result<Timetable, TimetableError> {
    let file = File::open(path).map_err(|source| TimetableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let source: TimetableSource =
        serde_json::from_reader(reader).map_err(|source| TimetableError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    match source {
        TimetableSource::Bare(timetable) => Ok(timetable),
        TimetableSource::Embedded {
            timetable: Some(timetable),
        } => Ok(timetable),
        TimetableSource::Embedded { timetable: None } => Err(TimetableError::Missing {
            path: path.to_path_buf(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

pub fn export<W: Write>(
    timetable: &Timetable,
    format: ExportFormat,
    writer: W,
) -> Result<(), TimetableError> {
    match format {
        ExportFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(writer);
            for stop in timetable.stops() {
                wtr.serialize(stop)?;
            }
            wtr.flush().map_err(csv::Error::from)?;
        }
        ExportFormat::Json => {
            serde_json::to_writer_pretty(writer, timetable)?;
        }
    }
    Ok(())
}
