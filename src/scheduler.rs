/*!
 * Periodic outbox drain
 *
 * A single background task triggers a drain on a fixed interval until its
 * cancellation token fires. Manual drains requested through the service use
 * the same client gate, so a timer tick that lands during a manual drain is
 * skipped rather than run twice.
 */

use std::sync::Arc;
use std::time::Duration;

use notary_connect::DrainOutcome;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::NotaryError;
use crate::service::NotaryService;

pub struct DrainScheduler {
    service: Arc<NotaryService>,
    interval: Duration,
    token: CancellationToken,
}

impl DrainScheduler {
    pub fn new(service: Arc<NotaryService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            token: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run the loop on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drain on every tick until cancelled
    ///
    /// The first tick fires immediately so spans left over from a previous
    /// run go out at startup.
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Drain scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        info!("Drain scheduler stopped");
    }

    async fn tick(&self) {
        match self.service.drain_now().await {
            Ok(DrainOutcome::Completed(report)) if report.attempted > 0 => {
                debug!(
                    delivered = report.delivered,
                    remaining = report.remaining,
                    "Scheduled drain finished"
                );
            }
            Ok(DrainOutcome::Completed(_)) => {}
            Ok(DrainOutcome::AlreadyRunning) => {
                debug!("Scheduled drain skipped: another drain is running");
            }
            Err(NotaryError::NotEnrolled) => {
                debug!("Scheduled drain skipped: device not enrolled");
            }
            Err(e) => {
                warn!(error = %e, "Scheduled drain failed");
            }
        }
    }
}
