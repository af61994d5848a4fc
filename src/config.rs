use anyhow::{anyhow, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_POLL_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct CoursebookConfig {
    pub api_base_url: String,
    /// host:port sampled by the TCP connectivity probe.
    pub probe_addr: String,
    pub poll_interval: Duration,
    pub paths: CoursebookPaths,
}

impl CoursebookConfig {
    pub fn from_env() -> Result<Self> {
        let paths = CoursebookPaths::discover()?;
        let api_base_url =
            env::var("COURSEBOOK_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let probe_addr = env::var("COURSEBOOK_PROBE_ADDR")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| probe_addr_for(&api_base_url));
        let poll_interval = env::var("COURSEBOOK_POLL_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_SECS));
        Ok(Self {
            api_base_url,
            probe_addr,
            poll_interval,
            paths,
        })
    }

    pub fn new(
        api_base_url: impl Into<String>,
        probe_addr: impl Into<String>,
        poll_interval: Duration,
        paths: CoursebookPaths,
    ) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            probe_addr: probe_addr.into(),
            poll_interval,
            paths,
        }
    }
}

/// Derives a reachability-check address from the API base URL so the probe
/// samples the host that actually matters.
fn probe_addr_for(api_base_url: &str) -> String {
    match reqwest::Url::parse(api_base_url) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("localhost").to_string();
            let port = url.port_or_known_default().unwrap_or(80);
            format!("{host}:{port}")
        }
        Err(_) => "localhost:80".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct CoursebookPaths {
    pub base: PathBuf,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl CoursebookPaths {
    /// Resolves the base directory from `COURSEBOOK_DATA_DIR`, falling back
    /// to the executable's directory.
    pub fn discover() -> Result<Self> {
        if let Ok(base) = env::var("COURSEBOOK_DATA_DIR") {
            return Self::from_base_dir(base);
        }
        let exe_path = env::current_exe()
            .map_err(|err| anyhow!("failed to resolve current executable: {err}"))?;
        let base = exe_path
            .parent()
            .ok_or_else(|| anyhow!("executable path missing parent"))?
            .to_path_buf();
        Self::from_base_dir(base)
    }

    pub fn from_base_dir<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        let data_dir = base.join("data");
        let db_path = data_dir.join("coursebook.db");
        Ok(Self {
            base,
            data_dir,
            db_path,
        })
    }
}
