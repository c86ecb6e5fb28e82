mod core;
mod interfaces;
mod logging;

use anyhow::Result;
use tracing::error;

use crate::core::config::Config;
use crate::core::poller::Poller;
use crate::core::state::FileMessageIdStore;
use crate::core::tautulli::TautulliClient;
use crate::interfaces::discord::DiscordPublisher;

#[tokio::main]
async fn main() {
    logging::init();
    if let Err(e) = run().await {
        error!("streampulse failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path).await?;

    let timeout = config.poll.request_timeout();
    let fetcher = TautulliClient::new(&config.tautulli, timeout)?;
    let store = FileMessageIdStore::new(config.state.message_id_file.clone());
    let publisher = DiscordPublisher::new(&config.discord, Box::new(store), timeout).await?;

    Poller::new(fetcher, publisher, config.poll.interval())
        .run()
        .await
}
