use std::{fmt::Display, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Context;

/// How many events of one traffic class fit in one fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub max_events: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLimits {
    pub max_text_chars: usize,
    pub max_image_bytes: usize,
    pub max_video_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_connections: usize,
    /// Waiting queue ceiling enforced by the reaper.
    pub max_waiting: usize,
    /// Session ceiling enforced by the reaper.
    pub max_sessions: usize,
    pub queue_timeout: Duration,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Minimum interest overlap a pair needs. Zero means gender compatibility is enough.
    pub min_shared_interests: usize,
    pub message_limit: WindowLimit,
    pub media_limit: WindowLimit,
    /// Rate windows untouched for this many window lengths are purged.
    pub stale_window_factor: u32,
    pub outbound_buffer: usize,
    pub content: ContentLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 10_000,
            max_waiting: 5_000,
            max_sessions: 5_000,
            queue_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
            min_shared_interests: 0,
            message_limit: WindowLimit { max_events: 30, window: Duration::from_secs(10) },
            media_limit: WindowLimit { max_events: 5, window: Duration::from_secs(60) },
            stale_window_factor: 3,
            outbound_buffer: 64,
            content: ContentLimits {
                max_text_chars: 2_000,
                max_image_bytes: 5 * 1024 * 1024,
                max_video_bytes: 10 * 1024 * 1024,
            },
        }
    }
}

impl Config {
    /// Reads `STRANGERS_*` variables (a `.env` file included), keeping the
    /// default for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            bind_addr: var("STRANGERS_BIND", defaults.bind_addr)?,
            max_connections: var("STRANGERS_MAX_CONNECTIONS", defaults.max_connections)?,
            max_waiting: var("STRANGERS_MAX_WAITING", defaults.max_waiting)?,
            max_sessions: var("STRANGERS_MAX_SESSIONS", defaults.max_sessions)?,
            queue_timeout: secs("STRANGERS_QUEUE_TIMEOUT_SECS", defaults.queue_timeout)?,
            idle_timeout: secs("STRANGERS_IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,
            sweep_interval: secs("STRANGERS_SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            min_shared_interests: var("STRANGERS_MIN_SHARED_INTERESTS", defaults.min_shared_interests)?,
            message_limit: WindowLimit {
                max_events: var("STRANGERS_MESSAGE_LIMIT", defaults.message_limit.max_events)?,
                window: secs("STRANGERS_MESSAGE_WINDOW_SECS", defaults.message_limit.window)?,
            },
            media_limit: WindowLimit {
                max_events: var("STRANGERS_MEDIA_LIMIT", defaults.media_limit.max_events)?,
                window: secs("STRANGERS_MEDIA_WINDOW_SECS", defaults.media_limit.window)?,
            },
            stale_window_factor: var("STRANGERS_STALE_WINDOW_FACTOR", defaults.stale_window_factor)?,
            outbound_buffer: var("STRANGERS_OUTBOUND_BUFFER", defaults.outbound_buffer)?,
            content: ContentLimits {
                max_text_chars: var("STRANGERS_MAX_TEXT_CHARS", defaults.content.max_text_chars)?,
                max_image_bytes: var("STRANGERS_MAX_IMAGE_BYTES", defaults.content.max_image_bytes)?,
                max_video_bytes: var("STRANGERS_MAX_VIDEO_BYTES", defaults.content.max_video_bytes)?,
            },
        };
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Rejects settings the reaper or the limiter can't run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sweep_interval.is_zero() {
            anyhow::bail!("STRANGERS_SWEEP_INTERVAL_SECS must be at least 1");
        }
        if self.stale_window_factor == 0 {
            anyhow::bail!("STRANGERS_STALE_WINDOW_FACTOR must be at least 1");
        }
        for (name, limit) in [("MESSAGE", self.message_limit), ("MEDIA", self.media_limit)] {
            if limit.window.is_zero() {
                anyhow::bail!("STRANGERS_{name}_WINDOW_SECS must be at least 1");
            }
            if limit.window.checked_mul(self.stale_window_factor).is_none() {
                anyhow::bail!("STRANGERS_{name}_WINDOW_SECS times STRANGERS_STALE_WINDOW_FACTOR is out of range");
            }
        }
        Ok(())
    }

    /// Largest inbound socket frame worth reading: the biggest media payload
    /// once base64 encoded, plus room for the envelope.
    pub fn max_frame_bytes(&self) -> usize {
        let media = self.content.max_image_bytes.max(self.content.max_video_bytes);
        (media / 3).saturating_add(1).saturating_mul(4).saturating_add(4 * 1024)
    }
}

fn var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match dotenv::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("couldn't parse {key}={raw:?}")),
        Err(_) => Ok(default),
    }
}

fn secs(key: &str, default: Duration) -> anyhow::Result<Duration> {
    var(key, default.as_secs()).map(Duration::from_secs)
}
