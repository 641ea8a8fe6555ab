use anyhow::{Context, Result};
use reqwest::Url;
use std::env;
use std::num::TryFromIntError;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_url: Url,
    pub push_url: Url,
    pub http_timeout: Duration,
    pub debounce: Duration,
    pub flash_duration: Duration,
    pub top_labels: usize,
    pub reconnect: ReconnectPolicy,
    /// Period of the detected VBAN list refresh; `None` disables it.
    pub vban_refresh: Option<Duration>,
}

/// Bounded reconnection with doubling, capped delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt `attempt` (1-based), or `None` once the
    /// attempts are exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server_url = env::var("CLAP_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:16045".to_string());
        let mut config = Self::for_server(&server_url)?;

        if let Ok(push_url) = env::var("CLAP_PUSH_URL") {
            config.push_url = Url::parse(&push_url).context("invalid CLAP_PUSH_URL")?;
        }
        config.http_timeout = Duration::from_secs(env_number("CLAP_HTTP_TIMEOUT_SECS", 30)?);
        config.debounce = Duration::from_millis(env_number("CLAP_DEBOUNCE_MS", 500)?);
        config.flash_duration = Duration::from_millis(env_number("CLAP_FLASH_MS", 1000)?);
        config.top_labels = narrow("CLAP_TOP_LABELS", env_number("CLAP_TOP_LABELS", 5)?)?;
        config.reconnect = ReconnectPolicy {
            max_attempts: narrow(
                "CLAP_RECONNECT_ATTEMPTS",
                env_number("CLAP_RECONNECT_ATTEMPTS", 5)?,
            )?,
            initial_delay: Duration::from_millis(env_number("CLAP_RECONNECT_DELAY_MS", 1000)?),
            max_delay: Duration::from_millis(env_number("CLAP_RECONNECT_DELAY_MAX_MS", 5000)?),
        };
        config.vban_refresh = match env_number("CLAP_VBAN_REFRESH_SECS", 0)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(config)
    }

    /// Defaults pointed at `server_url`; the push channel lives at `/ws` on the same host.
    pub fn for_server(server_url: &str) -> Result<Self> {
        let server_url = Url::parse(server_url).context("invalid detection server URL")?;
        let push_url = derive_push_url(&server_url)?;
        Ok(Self {
            server_url,
            push_url,
            http_timeout: Duration::from_secs(30),
            debounce: Duration::from_millis(500),
            flash_duration: Duration::from_millis(1000),
            top_labels: 5,
            reconnect: ReconnectPolicy::default(),
            vban_refresh: None,
        })
    }
}

fn derive_push_url(server_url: &Url) -> Result<Url> {
    let mut push_url = server_url.join("/ws").context("cannot derive push URL")?;
    let scheme = if server_url.scheme() == "https" { "wss" } else { "ws" };
    push_url
        .set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("cannot use {scheme} scheme for {server_url}"))?;
    Ok(push_url)
}

fn env_number(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got '{value}'")),
        Err(_) => Ok(default),
    }
}

fn narrow<T>(key: &str, value: u64) -> Result<T>
where
    T: TryFrom<u64, Error = TryFromIntError>,
{
    T::try_from(value).with_context(|| format!("{key} is out of range, got {value}"))
}
