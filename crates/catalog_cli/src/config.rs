use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_engine::{CategoryContext, CrawlSettings, FetchSettings};
use harvest_logging::LogDestination;
use serde::Deserialize;
use thiserror::Error;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "harvest.ron";
const DEFAULT_ENDPOINT: &str = "https://so.m.jd.com/ware/searchList.action";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("cannot read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
}

/// Contents of the RON configuration file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct HarvestConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_in_flight: usize,
    pub listing_endpoint: String,
    pub output_dir: PathBuf,
    pub output_file: String,
    pub log_destination: LogDestination,
    pub categories: Vec<CategoryContext>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            max_in_flight: CrawlSettings::default().max_in_flight,
            listing_endpoint: DEFAULT_ENDPOINT.to_string(),
            output_dir: PathBuf::from("output"),
            output_file: "skus.jsonl".to_string(),
            log_destination: LogDestination::Terminal,
            categories: Vec::new(),
        }
    }
}

impl HarvestConfig {
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            overall_timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            max_in_flight: self.max_in_flight,
        }
    }
}

/// Loads the configuration; a missing file yields the defaults.
///
/// Runs before logging is configured, so it reports through its result only.
pub(crate) fn load(path: &Path) -> Result<HarvestConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(HarvestConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    ron::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
