pub mod client;
pub mod fetcher;
pub mod types;

pub use client::{wait_for_key, HttpTelemetryClient, TelemetryError, TelemetrySource};
pub use fetcher::{run_fetcher, FetcherConfig};
pub use types::{MarkerSighting, TelemetryFrame};
