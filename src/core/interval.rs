//! Readiness wait intervals

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// How long a blocking wait may run and how often it polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitInterval {
    pub timeout: Duration,
    pub poll: Duration,
}

impl WaitInterval {
    pub fn new(timeout: Duration, poll: Duration) -> Self {
        Self { timeout, poll }
    }

    /// Parse a `[timeout, poll]` pair as written in the config file
    pub fn from_pair(values: &[String]) -> Result<Self> {
        match values {
            [timeout, poll] => Ok(Self {
                timeout: parse_duration(timeout)?,
                poll: parse_duration(poll)?,
            }),
            [timeout] => Ok(Self {
                timeout: parse_duration(timeout)?,
                poll: Self::default().poll,
            }),
            _ => bail!("interval must be [timeout, poll], got {} values", values.len()),
        }
    }

    /// Timeout formatted the way helm's `--timeout` expects
    pub fn helm_timeout(&self) -> String {
        format!("{}s", self.timeout.as_secs())
    }
}

impl Default for WaitInterval {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll: Duration::from_secs(10),
        }
    }
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)(ms|h|m|s)").expect("valid duration regex"))
}

/// Parse a Go-style duration such as `30m`, `10s`, `1h30m` or `500ms`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty duration");
    }

    let mut consumed = 0;
    let mut total = 0f64;
    for cap in duration_regex().captures_iter(input) {
        let whole = cap.get(0).map(|m| m.as_str()).unwrap_or_default();
        consumed += whole.len();
        let value: f64 = cap[1].parse()?;
        total += match &cap[2] {
            "h" => value * 3600.0,
            "m" => value * 60.0,
            "s" => value,
            "ms" => value / 1000.0,
            _ => unreachable!("regex only matches known units"),
        };
    }

    if consumed != input.len() {
        bail!("invalid duration '{}'", input);
    }
    Duration::try_from_secs_f64(total)
        .map_err(|_| anyhow!("duration '{}' is out of range", input))
}
