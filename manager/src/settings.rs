//! Process settings loaded from `DOCP_*` environment variables.
//!
//! Each field maps to `DOCP_<FIELD>` and has a default, so an empty
//! environment yields a working production configuration:
//!   - `DOCP_DOMAIN`            (default `https://msapi.sandbox.docphq.tech`)
//!   - `DOCP_WORKDIR_PATH`      (default `/opt/docp-agent`)
//!   - `DOCP_CONFIG_FILE_PATH`  (default `{workdir}/config.yml`)
//!   - `DOCP_AGENT_PORT`        (default `12012`)
//!   - `DOCP_ERROR_LEVEL`       (default `low`)
//!   - `DOCP_RELEASE_URL`
//!   - `DOCP_<CYCLE>_INTERVAL_SECS` and `DOCP_PHASE_DELAY_MS`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::application::services::reconcile::{Intervals, Tuning};
use crate::domain::Severity;
use crate::infra::release::DEFAULT_RELEASE_URL;

pub const ENV_PREFIX: &str = "DOCP_";

const STATE_DIR: &str = "state";
const CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Control-plane base URL.
    #[serde(default = "default_domain")]
    pub domain: String,

    #[serde(default = "default_workdir")]
    pub workdir_path: PathBuf,

    #[serde(default)]
    pub config_file_path: Option<PathBuf>,

    /// Loopback port of the core agent API.
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    #[serde(default = "default_error_level")]
    pub error_level: Severity,

    #[serde(default = "default_release_url")]
    pub release_url: String,

    #[serde(default)]
    pub fetch_interval_secs: Option<u64>,
    #[serde(default)]
    pub derive_interval_secs: Option<u64>,
    #[serde(default)]
    pub validate_interval_secs: Option<u64>,
    #[serde(default)]
    pub compare_interval_secs: Option<u64>,
    #[serde(default)]
    pub flush_interval_secs: Option<u64>,
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    #[serde(default)]
    pub auto_update_interval_secs: Option<u64>,

    #[serde(default)]
    pub phase_delay_ms: Option<u64>,
}

fn default_domain() -> String {
    "https://msapi.sandbox.docphq.tech".to_string()
}

fn default_workdir() -> PathBuf {
    PathBuf::from("/opt/docp-agent")
}

fn default_agent_port() -> u16 {
    12012
}

fn default_error_level() -> Severity {
    Severity::Low
}

fn default_release_url() -> String {
    DEFAULT_RELEASE_URL.to_string()
}

impl Settings {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a `DOCP_*` variable holds a value of the wrong type.
    pub fn from_env() -> Result<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env()
            .context("failed to load settings from DOCP_* env vars")
    }

    /// Load from explicit `(name, value)` pairs, names carrying the prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if a value has the wrong type.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .context("failed to parse DOCP_* settings")
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config_file_path
            .clone()
            .unwrap_or_else(|| self.workdir_path.join(CONFIG_FILE))
    }

    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.workdir_path.join(STATE_DIR)
    }

    /// Production timing with any configured overrides applied.
    #[must_use]
    pub fn tuning(&self) -> Tuning {
        let base = Intervals::default();
        let pick = |over: Option<u64>, default: Duration| over.map_or(default, Duration::from_secs);
        let intervals = Intervals {
            fetch: pick(self.fetch_interval_secs, base.fetch),
            derive: pick(self.derive_interval_secs, base.derive),
            validate: pick(self.validate_interval_secs, base.validate),
            compare: pick(self.compare_interval_secs, base.compare),
            flush: pick(self.flush_interval_secs, base.flush),
            sweep: pick(self.sweep_interval_secs, base.sweep),
            auto_update: pick(self.auto_update_interval_secs, base.auto_update),
        };
        let mut tuning = Tuning {
            intervals,
            ..Tuning::default()
        };
        if let Some(ms) = self.phase_delay_ms {
            tuning.phase_delay = Duration::from_millis(ms);
        }
        tuning
    }
}
