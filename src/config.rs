use crate::endpoint::{is_local, parse_api_url};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const API_URL_ENV: &str = "INBOX_API_URL";
pub const API_KEY_ENV: &str = "INBOX_API_KEY";
pub const POLL_INTERVAL_ENV: &str = "INBOX_POLL_INTERVAL_SECS";
pub const IDLE_TIMEOUT_ENV: &str = "INBOX_STREAM_IDLE_TIMEOUT_SECS";
pub const THREAD_LIST_LIMIT_ENV: &str = "INBOX_THREAD_LIST_LIMIT";
pub const RESULT_PREVIEW_ENV: &str = "INBOX_RESULT_PREVIEW_CHARS";
pub const STREAMING_RESUME_ENV: &str = "INBOX_STREAMING_RESUME";
pub const LOG_FILTER_ENV: &str = "INBOX_LOG";
pub const LOG_PATH_ENV: &str = "INBOX_LOG_PATH";

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_THREAD_LIST_LIMIT: u32 = 50;
const DEFAULT_RESULT_PREVIEW_CHARS: usize = 200;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
    pub poll_interval: Duration,
    /// Streams silent for longer than this fail with a connection error.
    pub idle_timeout: Option<Duration>,
    pub thread_list_limit: u32,
    pub result_preview_chars: usize,
    pub streaming_resume: bool,
    pub log_filter: String,
    pub log_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            idle_timeout: None,
            thread_list_limit: DEFAULT_THREAD_LIST_LIMIT,
            result_preview_chars: DEFAULT_RESULT_PREVIEW_CHARS,
            streaming_resume: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let api_url = env_value(API_URL_ENV)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);
        let api_key = env_value(API_KEY_ENV);
        let poll_interval = match env_value(POLL_INTERVAL_ENV) {
            Some(raw) => Duration::from_secs(parse_number(POLL_INTERVAL_ENV, &raw)?),
            None => defaults.poll_interval,
        };
        let idle_timeout = match env_value(IDLE_TIMEOUT_ENV) {
            Some(raw) => match parse_number::<u64>(IDLE_TIMEOUT_ENV, &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => None,
        };
        let thread_list_limit = match env_value(THREAD_LIST_LIMIT_ENV) {
            Some(raw) => parse_number(THREAD_LIST_LIMIT_ENV, &raw)?,
            None => defaults.thread_list_limit,
        };
        let result_preview_chars = match env_value(RESULT_PREVIEW_ENV) {
            Some(raw) => parse_number(RESULT_PREVIEW_ENV, &raw)?,
            None => defaults.result_preview_chars,
        };
        let streaming_resume = match env_value(STREAMING_RESUME_ENV) {
            Some(raw) => parse_switch(STREAMING_RESUME_ENV, &raw)?,
            None => defaults.streaming_resume,
        };

        Ok(Self {
            api_url,
            api_key,
            poll_interval,
            idle_timeout,
            thread_list_limit,
            result_preview_chars,
            streaming_resume,
            log_filter: env_value(LOG_FILTER_ENV).unwrap_or(defaults.log_filter),
            log_path: env_value(LOG_PATH_ENV).map(PathBuf::from),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let url =
            parse_api_url(&self.api_url).with_context(|| format!("invalid {API_URL_ENV}"))?;
        if !is_local(&url) && self.api_key.is_none() {
            bail!(
                "{API_KEY_ENV} must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.poll_interval < Duration::from_secs(1) {
            bail!("{POLL_INTERVAL_ENV} must be at least 1 second");
        }

        if !(1..=100).contains(&self.thread_list_limit) {
            bail!(
                "{THREAD_LIST_LIMIT_ENV} must be between 1 and 100, got {}",
                self.thread_list_limit
            );
        }

        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_switch(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => bail!("{name} must be on or off, got '{raw}'"),
    }
}

fn parse_number<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .with_context(|| format!("{name} must be a non-negative integer, got '{raw}'"))
}
