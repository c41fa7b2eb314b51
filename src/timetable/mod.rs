pub mod loader;
pub mod tracker;
pub mod types;

pub use loader::{export, load_timetable, ExportFormat};
pub use tracker::{evaluate, TargetTracker, TimetableDisplay};
pub use types::{Stop, Timetable};
