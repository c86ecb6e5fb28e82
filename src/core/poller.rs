use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::render;
use super::tautulli::TautulliClient;
use crate::interfaces::discord::DiscordPublisher;

/// The outer control loop: fetch → render → publish, once per tick, forever.
///
/// Single-flight is inherent: the whole tick body is awaited inside one loop
/// iteration, so a slow publish delays the next fetch instead of overlapping
/// it, and `MissedTickBehavior::Delay` keeps a slow tick from being followed
/// by a burst of catch-up ticks.
pub struct Poller {
    fetcher: TautulliClient,
    publisher: DiscordPublisher,
    interval: Duration,
}

impl Poller {
    pub fn new(fetcher: TautulliClient, publisher: DiscordPublisher, interval: Duration) -> Self {
        Self {
            fetcher,
            publisher,
            interval,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            "Polling Tautulli every {}s. Press Ctrl-C to stop.",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down.");
                    return Ok(());
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    /// One poll cycle. Never fails the loop: a fetch error renders as an
    /// empty snapshot, a publish error abandons the tick and the next tick
    /// retries naturally.
    async fn tick(&mut self) {
        let sessions = match self.fetcher.get_activity().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("Activity fetch failed, rendering an empty snapshot: {e:#}");
                Vec::new()
            }
        };

        let report = render::render_report(&sessions, Local::now());
        if let Err(e) = self.publisher.publish(&report).await {
            warn!("Publish failed, will retry on the next tick: {e:#}");
        }
    }
}
