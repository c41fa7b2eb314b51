use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{info, trace, warn};

use crate::session::{HudSummary, Session};
use crate::telemetry::client::TelemetrySource;
use crate::telemetry::types::TelemetryFrame;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(125);

#[derive(Debug, Clone, Copy)]
pub struct FetcherConfig {
    pub poll_interval: Duration,
    pub sample_interval: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }
}

pub async fn run_fetcher<S: TelemetrySource>(
    source: S,
    session: Arc<RwLock<Session>>,
    summary_tx: watch::Sender<Option<HudSummary>>,
    config: FetcherConfig,
) {
    info!(
        poll_ms = config.poll_interval.as_millis() as u64,
        sample_ms = config.sample_interval.as_millis() as u64,
        "Starting telemetry fetcher"
    );

    let mut poll = tokio::time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sample = tokio::time::interval(config.sample_interval);
    sample.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut consecutive_errors: u32 = 0;

    loop {
        tokio::select! {
            _ = poll.tick() => {
                let summary = dashboard_tick(&source, &session).await;
                match &summary.error {
                    Some(error) => {
                        consecutive_errors += 1;
                        warn!(error = %error, consecutive_errors, "Telemetry poll failed");
                    }
                    None => {
                        if consecutive_errors > 0 {
                            info!(consecutive_errors, "Telemetry source reachable again");
                        }
                        consecutive_errors = 0;
                    }
                }
                summary_tx.send_replace(Some(summary));
            }
            _ = sample.tick() => {
                if session.read().await.is_recording() {
                    sample_tick(&source, &session).await;
                }
            }
        }
    }
}

/// Poll once, feed the recorder and build the summary. A failed poll yields an
/// error summary instead.
pub async fn dashboard_tick<S: TelemetrySource>(
    source: &S,
    session: &RwLock<Session>,
) -> HudSummary {
    match source.fetch().await {
        Ok(response) => {
            let frame = TelemetryFrame::from_response(&response);
            let mut session = session.write().await;
            session.record_frame(&frame);
            session.process_frame(&frame)
        }
        Err(e) => session.read().await.error_summary(e),
    }
}

pub async fn sample_tick<S: TelemetrySource>(source: &S, session: &RwLock<Session>) {
    match source.fetch().await {
        Ok(response) => {
            let frame = TelemetryFrame::from_response(&response);
            session.write().await.record_frame(&frame);
        }
        Err(e) => trace!(error = %e, "Sample poll failed"),
    }
}
