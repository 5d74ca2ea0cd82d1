//! Process-level configuration from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;

/// Identifying User-Agent, including a contact URL as crawler etiquette
/// requires.
const DEFAULT_USER_AGENT: &str = "docpress/0.1 (+https://github.com/docpress/docpress)";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_JOB_DEADLINE_SECS: u64 = 300;
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_REGISTRY_GRACE_SECS: u64 = 300;

/// Server-wide settings. Per-job knobs live in
/// [`crate::config::CrawlOptions`]; these are the process defaults around
/// them.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub bind_addr: SocketAddr,
    /// User-Agent sent to target sites.
    pub user_agent: String,
    /// Default wall-clock deadline per job.
    pub job_deadline: Duration,
    /// Response body cap for fetched pages.
    pub max_body_bytes: usize,
    /// How long terminal jobs stay live for stream reconnects.
    pub registry_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            job_deadline: Duration::from_secs(DEFAULT_JOB_DEADLINE_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            registry_grace: Duration::from_secs(DEFAULT_REGISTRY_GRACE_SECS),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => {
            let value = raw
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid {name}={raw:?}: {e}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

impl ServerConfig {
    /// Read configuration from `DOCPRESS_*` environment variables, falling
    /// back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env_parse::<u16>("DOCPRESS_PORT")? {
            config.bind_addr.set_port(port);
        }
        if let Some(addr) = env_parse::<SocketAddr>("DOCPRESS_BIND")? {
            config.bind_addr = addr;
        }
        if let Ok(user_agent) = std::env::var("DOCPRESS_USER_AGENT") {
            anyhow::ensure!(!user_agent.is_empty(), "DOCPRESS_USER_AGENT must not be empty");
            config.user_agent = user_agent;
        }
        if let Some(secs) = env_parse::<u64>("DOCPRESS_JOB_DEADLINE_SECS")? {
            anyhow::ensure!(secs > 0, "DOCPRESS_JOB_DEADLINE_SECS must be nonzero");
            config.job_deadline = Duration::from_secs(secs);
        }
        if let Some(bytes) = env_parse::<usize>("DOCPRESS_MAX_BODY_BYTES")? {
            anyhow::ensure!(bytes > 0, "DOCPRESS_MAX_BODY_BYTES must be nonzero");
            config.max_body_bytes = bytes;
        }
        if let Some(secs) = env_parse::<u64>("DOCPRESS_REGISTRY_GRACE_SECS")? {
            config.registry_grace = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
