//! Runtime configuration
//!
//! One JSON file, every field optional. A fresh checkout runs with the
//! defaults: in-memory stores, open eligibility, mails logged instead of
//! sent.
use crate::auction::Eligibility;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP adapter binds to.
    pub bind: SocketAddr,
    /// Public base URL used for lot links in mails.
    pub base_url: String,
    /// Postgres URL; in-memory stores when absent.
    pub database_url: Option<String>,
    pub eligibility: Eligibility,
    /// Recipient of the settlement report.
    pub admin_email: Option<String>,
    pub mail: MailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: ([0, 0, 0, 0], 3000).into(),
            base_url: "http://localhost:3000".to_owned(),
            database_url: None,
            eligibility: Eligibility::default(),
            admin_email: None,
            mail: MailConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Provider webhook; mails are logged instead when absent.
    pub endpoint: Option<String>,
    pub from: String,
    pub send_timeout_secs: u64,
    /// Minimum spacing between batch sends, for the provider rate limit.
    pub batch_spacing_ms: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            from: "auction@example.org".to_owned(),
            send_timeout_secs: 10,
            batch_spacing_ms: 1500,
        }
    }
}

impl MailConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn batch_spacing(&self) -> Duration {
        Duration::from_millis(self.batch_spacing_ms)
    }
}

impl Config {
    /// Loads the JSON config file; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}
