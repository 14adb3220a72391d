//! Backend base URL checks shared by config validation and the HTTP client.

use anyhow::{bail, Context, Result};
use reqwest::Url;
use std::net::IpAddr;

/// Parse the backend base URL. Only http(s) URLs with a host can carry the
/// `/threads` and `/runs` path segments.
pub fn parse_api_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid API URL '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("API URL '{raw}' must use http:// or https://");
    }
    if url.host_str().is_none() || url.cannot_be_a_base() {
        bail!("API URL '{raw}' cannot be used as a base");
    }
    Ok(url)
}

/// Backend on this machine: `localhost`, a loopback address, or the
/// unspecified address a dev server binds to.
pub fn is_local(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    match host.parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => host.eq_ignore_ascii_case("localhost"),
    }
}

pub fn is_local_url(raw: &str) -> bool {
    Url::parse(raw.trim()).is_ok_and(|url| is_local(&url))
}
