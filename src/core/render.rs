use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use tracing::debug;

use super::tautulli::{MediaKind, Session};

pub const BAR_LENGTH: usize = 20;
const SEPARATOR: &str = "\n\n";
const IDLE_MESSAGE: &str = "🎬 **No one is streaming on Plex right now.**";

/// Renders the full channel message for one activity snapshot. Pure: the
/// caller captures `now` once per tick, so identical inputs produce identical
/// output.
pub fn render_report(sessions: &[Session], now: DateTime<Local>) -> String {
    let header = format!("🕒 **Last Updated:** {}", now.format("%H:%M:%S"));
    if sessions.is_empty() {
        return format!("{header}\n{IDLE_MESSAGE}");
    }

    let blocks: Vec<String> = sessions.iter().map(|s| render_session(s, now)).collect();
    format!(
        "{header}{SEPARATOR}{}{SEPARATOR}{}",
        blocks.join(SEPARATOR),
        render_footer(&aggregate_stats(sessions))
    )
}

fn render_session(session: &Session, now: DateTime<Local>) -> String {
    let emoji = pick_display_emoji(&session.friendly_name, session.media_type);
    let imdb_id = extract_imdb_id(session.guid.as_deref(), &session.guids);
    let title = format_imdb_link(imdb_id.as_deref(), &session.full_title);
    let locator = episode_locator(session)
        .map(|l| format!(" {l}"))
        .unwrap_or_default();
    let year = session.year.as_deref().unwrap_or("N/A");

    let mut block = format!(
        "{emoji} **{}** {} **{title}**{locator} ({year})",
        session.friendly_name,
        verb_phrase(session),
    );
    if let Some(progress) = progress_fragment(session, now) {
        block.push('\n');
        block.push_str(&progress);
    }
    if let Some(bitrate) = bitrate_fragment(session) {
        block.push('\n');
        block.push_str(&bitrate);
    }
    block
}

// ── Identifier & field extraction ──

/// Scans the primary guid, then the fallback list in order, for an
/// `imdb://tt<digits>` identifier. Total: absence is an expected outcome.
pub fn extract_imdb_id(guid: Option<&str>, guids: &[String]) -> Option<String> {
    let re = Regex::new(r"imdb://(tt\d+)").unwrap();
    if let Some(primary) = guid
        && let Some(caps) = re.captures(primary)
    {
        return Some(caps[1].to_string());
    }
    guids
        .iter()
        .find_map(|g| re.captures(g).map(|caps| caps[1].to_string()))
}

pub fn format_imdb_link(imdb_id: Option<&str>, title: &str) -> String {
    match imdb_id {
        // Angle brackets keep Discord from unfurling the link into an embed.
        Some(id) => format!("[{title}](<https://www.imdb.com/title/{id}/>)"),
        None => title.to_string(),
    }
}

/// Decorative identicon: regional indicator for a leading ASCII letter,
/// keycap glyph for a leading digit, media-kind glyph otherwise.
pub fn pick_display_emoji(display_name: &str, kind: MediaKind) -> String {
    match display_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {
            let offset = c.to_ascii_lowercase() as u32 - 'a' as u32;
            char::from_u32(0x1F1E6 + offset)
                .map(String::from)
                .unwrap_or_else(|| kind_emoji(kind).to_string())
        }
        Some(c) if c.is_ascii_digit() => format!("{c}\u{FE0F}\u{20E3}"),
        _ => kind_emoji(kind).to_string(),
    }
}

fn kind_emoji(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Movie => "🎥",
        MediaKind::Track => "🎵",
        MediaKind::Episode | MediaKind::Other => "📺",
    }
}

fn verb_phrase(session: &Session) -> &'static str {
    if session.is_paused() {
        "has paused"
    } else if session.media_type == MediaKind::Track {
        "is listening to"
    } else {
        "is watching"
    }
}

fn episode_locator(session: &Session) -> Option<String> {
    if session.media_type != MediaKind::Episode {
        return None;
    }
    let season = session.parent_media_index.as_deref()?;
    let episode = session.media_index.as_deref()?;
    Some(format!("S{season:0>2} E{episode:0>2}"))
}

// ── Progress & time formatting ──

/// `HH:MM:SS` when at least an hour long, `MM:SS` otherwise.
pub fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Callers only invoke this with both values nonzero.
pub fn render_progress_bar(current: u64, total: u64, bar_length: usize) -> String {
    let filled = ((current as f64 / total as f64) * bar_length as f64).round() as usize;
    let filled = filled.min(bar_length);
    format!(
        "[{}{}] ({} / {})",
        "█".repeat(filled),
        "░".repeat(bar_length - filled),
        format_duration(current),
        format_duration(total)
    )
}

pub struct FinishEstimate {
    pub remaining_secs: u64,
    pub wall_clock: String,
}

/// The one intentionally fallible formatting step: an unparseable position
/// makes the ETA claim meaningless, so this errors instead of guessing.
/// Callers catch it per session.
pub fn estimate_finish_time(
    view_offset: &str,
    duration: &str,
    now: DateTime<Local>,
) -> Result<FinishEstimate> {
    let offset: i64 = view_offset
        .trim()
        .parse()
        .with_context(|| format!("view offset {view_offset:?} is not an integer"))?;
    let duration: i64 = duration
        .trim()
        .parse()
        .with_context(|| format!("duration {duration:?} is not an integer"))?;

    let remaining_ms = (duration - offset).max(0);
    let finish = now + chrono::Duration::milliseconds(remaining_ms);
    Ok(FinishEstimate {
        remaining_secs: (remaining_ms / 1000) as u64,
        wall_clock: finish.format("%I:%M %p").to_string(),
    })
}

fn progress_fragment(session: &Session, now: DateTime<Local>) -> Option<String> {
    let offset_raw = session.view_offset.as_deref()?;
    let duration_raw = session.duration.as_deref()?;

    let parsed = offset_raw
        .trim()
        .parse::<u64>()
        .ok()
        .zip(duration_raw.trim().parse::<u64>().ok());
    let Some((offset, duration)) = parsed else {
        debug!(
            "[{}] dropping progress line: unparseable position",
            session.friendly_name
        );
        return None;
    };
    if offset == 0 || duration == 0 {
        return None;
    }

    let mut line = format!("⏱️ {}", render_progress_bar(offset, duration, BAR_LENGTH));
    match estimate_finish_time(offset_raw, duration_raw, now) {
        Ok(estimate) => {
            line.push_str(" · ends ");
            line.push_str(&estimate.wall_clock);
        }
        Err(e) => debug!(
            "[{}] dropping finish estimate: {}",
            session.friendly_name, e
        ),
    }
    Some(line)
}

// ── Bitrate ──

pub fn format_bitrate(kbps: u64) -> String {
    if kbps >= 1000 {
        format!("{:.1} Mbps", kbps as f64 / 1000.0)
    } else {
        format!("{kbps} kbps")
    }
}

fn quality_descriptor(session: &Session) -> Option<String> {
    if session.media_type == MediaKind::Track {
        return session.container.as_deref().map(str::to_uppercase);
    }
    let negotiated = session.stream_video_full_resolution.as_deref()?;
    match session.video_full_resolution.as_deref() {
        Some(source) if source != negotiated => Some(format!("{source} -> {negotiated}")),
        _ => Some(negotiated.to_string()),
    }
}

fn bitrate_fragment(session: &Session) -> Option<String> {
    let rate = format_bitrate(session.effective_bitrate()?);
    let status = if session.is_direct_play() {
        "✅ Direct"
    } else {
        "🔄 Transcoding"
    };
    Some(match quality_descriptor(session) {
        Some(quality) => format!("🛜 {status} · {quality} ({rate})"),
        None => format!("🛜 {status} ({rate})"),
    })
}

// ── Aggregate statistics ──

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub total_streams: usize,
    pub transcoding: usize,
    pub remote_kbps: u64,
    pub local_kbps: u64,
}

pub fn aggregate_stats(sessions: &[Session]) -> AggregateStats {
    let mut stats = AggregateStats::default();
    for session in sessions {
        stats.total_streams += 1;
        if !session.is_direct_play() {
            stats.transcoding += 1;
        }
        if let Some(rate) = session.effective_bitrate() {
            if session.is_local() {
                stats.local_kbps += rate;
            } else {
                stats.remote_kbps += rate;
            }
        }
    }
    stats
}

fn render_footer(stats: &AggregateStats) -> String {
    format!(
        "📊 **Stats:** {} streaming ({} transcoding) @ 📶 {} (🏠 {} local)",
        stats.total_streams,
        stats.transcoding,
        format_bitrate(stats.remote_kbps),
        format_bitrate(stats.local_kbps)
    )
}
