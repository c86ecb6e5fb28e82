use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::info;
use url::Url;

/// Startup configuration. Every credential is required; the process refuses
/// to start on a missing or invalid value rather than degrading silently.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub tautulli: TautulliConfig,
    pub discord: DiscordConfig,
    pub poll: PollConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Deserialize)]
pub struct TautulliConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_message_id_file")]
    pub message_id_file: PathBuf,
}

fn default_message_id_file() -> PathBuf {
    PathBuf::from("last_message_id.txt")
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            message_id_file: default_message_id_file(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-request timeout for both HTTP clients. Defaults to the poll
    /// interval, so a hung call never outlives its tick.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(self.interval_secs))
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;

        info!(
            "Loaded config: tautulli={}, channel={}, interval={}s",
            config.tautulli.base_url, config.discord.channel_id, config.poll.interval_secs
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tautulli.api_key.trim().is_empty() {
            return Err(anyhow!("tautulli.api_key must not be empty"));
        }
        Url::parse(&self.tautulli.base_url)
            .map_err(|e| anyhow!("tautulli.base_url is not a valid URL: {}", e))?;
        if self.discord.bot_token.trim().is_empty() {
            return Err(anyhow!("discord.bot_token must not be empty"));
        }
        if self.discord.channel_id.parse::<u64>().is_err() {
            return Err(anyhow!(
                "discord.channel_id must be a numeric channel snowflake"
            ));
        }
        if self.poll.interval_secs == 0 {
            return Err(anyhow!("poll.interval_secs must be at least 1"));
        }
        if self.poll.request_timeout_secs == Some(0) {
            return Err(anyhow!("poll.request_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[tautulli]
base_url = "http://tautulli.local:8181"
api_key = "abc123"

[discord]
bot_token = "token"
channel_id = "1178901234567890123"

[poll]
interval_secs = 30
"#;

    #[test]
    fn parse_valid_toml_config() {
        let config: Config = toml::from_str(VALID).unwrap();
        config.validate().unwrap();
        assert_eq!(config.poll.interval(), Duration::from_secs(30));
        assert_eq!(
            config.state.message_id_file,
            PathBuf::from("last_message_id.txt")
        );
    }

    #[test]
    fn request_timeout_defaults_to_interval() {
        let config: Config = toml::from_str(VALID).unwrap();
        assert_eq!(config.poll.request_timeout(), Duration::from_secs(30));

        let with_timeout = VALID.replace("interval_secs = 30", "interval_secs = 30\nrequest_timeout_secs = 10");
        let config: Config = toml::from_str(&with_timeout).unwrap();
        assert_eq!(config.poll.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_empty_api_key() {
        let bad = VALID.replace("abc123", " ");
        let config: Config = toml::from_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_base_url() {
        let bad = VALID.replace("http://tautulli.local:8181", "not a url");
        let config: Config = toml::from_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_numeric_channel_id() {
        let bad = VALID.replace("1178901234567890123", "general");
        let config: Config = toml::from_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let bad = VALID.replace("interval_secs = 30", "interval_secs = 0");
        let config: Config = toml::from_str(&bad).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn state_file_override() {
        let toml_content = format!("{VALID}\n[state]\nmessage_id_file = \"/var/lib/streampulse/msg.txt\"\n");
        let config: Config = toml::from_str(&toml_content).unwrap();
        assert_eq!(
            config.state.message_id_file,
            PathBuf::from("/var/lib/streampulse/msg.txt")
        );
    }

    #[test]
    fn missing_required_table_fails_parse() {
        let bad = VALID.replace("[discord]", "[discord_disabled]");
        assert!(toml::from_str::<Config>(&bad).is_err());
    }
}
