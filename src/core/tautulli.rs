use std::time::Duration;

use anyhow::{Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Deserializer};

use super::config::TautulliConfig;

/// One active playback stream as reported by Tautulli's `get_activity`.
///
/// Tautulli serializes most numeric fields as JSON strings and omits fields
/// freely depending on media type and client, so everything optional is an
/// explicit `Option` and numeric-ish fields accept either representation.
/// `view_offset` and `duration` stay raw strings: finish-time estimation is
/// the one place malformed input is a hard error instead of a silent `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub media_type: MediaKind,
    #[serde(default)]
    pub full_title: String,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub parent_media_index: Option<String>,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub media_index: Option<String>,
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(default)]
    pub guids: Vec<String>,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub view_offset: Option<String>,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "opt_kbps")]
    pub local: Option<u64>,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub transcode_decision: Option<String>,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub video_full_resolution: Option<String>,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub stream_video_full_resolution: Option<String>,
    #[serde(default, deserialize_with = "opt_kbps")]
    pub stream_bitrate: Option<u64>,
    #[serde(default, deserialize_with = "opt_kbps")]
    pub bitrate: Option<u64>,
    #[serde(default, deserialize_with = "opt_stringly")]
    pub container: Option<String>,
}

impl Session {
    pub fn is_paused(&self) -> bool {
        self.state.as_deref() == Some("paused")
    }

    pub fn is_local(&self) -> bool {
        self.local == Some(1)
    }

    pub fn is_direct_play(&self) -> bool {
        self.transcode_decision.as_deref() == Some("direct play")
    }

    /// The bitrate used for display and aggregation: the negotiated stream
    /// rate when positive, else the raw source rate when positive.
    pub fn effective_bitrate(&self) -> Option<u64> {
        self.stream_bitrate
            .filter(|b| *b > 0)
            .or(self.bitrate.filter(|b| *b > 0))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
    Track,
    #[default]
    #[serde(other)]
    Other,
}

/// Accepts a JSON string, number, or bool where Tautulli is inconsistent.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Flag(bool),
}

fn opt_stringly<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Scalar>::deserialize(de)?;
    Ok(value.and_then(|scalar| match scalar {
        Scalar::Text(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Scalar::Int(n) => Some(n.to_string()),
        Scalar::Float(f) => Some(f.to_string()),
        Scalar::Flag(b) => Some(u8::from(b).to_string()),
    }))
}

fn opt_kbps<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Scalar>::deserialize(de)?;
    Ok(value.and_then(|scalar| match scalar {
        Scalar::Text(text) => {
            let text = text.trim();
            text.parse::<u64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
        }
        Scalar::Int(n) => u64::try_from(n).ok(),
        Scalar::Float(f) => (f >= 0.0).then_some(f as u64),
        Scalar::Flag(b) => Some(u64::from(b)),
    }))
}

// ── Tautulli API v2 envelope ──

#[derive(Deserialize)]
struct ActivityEnvelope {
    response: ActivityResponse,
}

#[derive(Deserialize)]
struct ActivityResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<ActivityData>,
}

#[derive(Deserialize)]
struct ActivityData {
    #[serde(default)]
    sessions: Option<Vec<Session>>,
}

pub struct TautulliClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl TautulliClient {
    pub fn new(config: &TautulliConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Fetches the current active sessions. Any transport error, non-2xx
    /// status, or unexpected payload shape is an error — the caller decides
    /// whether to treat that as an empty snapshot.
    pub async fn get_activity(&self) -> Result<Vec<Session>> {
        let url = format!("{}/api/v2", self.base_url);
        let res = self
            .http
            .get(&url)
            .query(&[("apikey", self.api_key.as_str()), ("cmd", "get_activity")])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(anyhow!(
                "Tautulli API error: {}: {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }

        parse_activity(&res.text().await?)
    }
}

fn parse_activity(body: &str) -> Result<Vec<Session>> {
    let envelope: ActivityEnvelope =
        serde_json::from_str(body).map_err(|e| anyhow!("unexpected Tautulli response: {}", e))?;

    if envelope.response.result.as_deref() == Some("error") {
        return Err(anyhow!(
            "Tautulli reported an error: {}",
            envelope.response.message.unwrap_or_default()
        ));
    }

    envelope
        .response
        .data
        .and_then(|data| data.sessions)
        .ok_or_else(|| anyhow!("Tautulli response is missing the sessions payload"))
}
