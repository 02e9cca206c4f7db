use crate::partition::PartitionKey;
use crate::season::Season;
use crate::variables::VariablePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_JOBS: usize = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid region mapping '{0}'. Expected 'STATE=REGION[,REGION...]'")]
    RegionSpec(String),

    #[error("{0}")]
    Invalid(String),
}

fn default_interpolate() -> u32 {
    1
}

fn default_jobs() -> usize {
    DEFAULT_JOBS
}

/// Conversion run settings, loaded from JSON and/or command-line flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub seasons: Vec<Season>,
    /// State name -> regions of that state
    pub regions: BTreeMap<String, Vec<String>>,
    pub data_root: PathBuf,
    #[serde(default = "default_interpolate")]
    pub interpolate: u32,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default)]
    pub variable_policy: VariablePolicy,
}

impl Config {
    pub fn new(
        seasons: Vec<Season>,
        regions: BTreeMap<String, Vec<String>>,
        data_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            seasons,
            regions,
            data_root: data_root.into(),
            interpolate: default_interpolate(),
            jobs: default_jobs(),
            variable_policy: VariablePolicy::default(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seasons.is_empty() {
            return Err(ConfigError::Invalid("no seasons to process".to_string()));
        }
        if self.regions.values().all(|r| r.is_empty()) {
            return Err(ConfigError::Invalid("no regions to process".to_string()));
        }
        if self.interpolate == 0 {
            return Err(ConfigError::Invalid(
                "interpolation factor must be at least 1".to_string(),
            ));
        }
        if self.jobs == 0 {
            return Err(ConfigError::Invalid("jobs must be at least 1".to_string()));
        }
        Ok(())
    }

    /// One partition per (season, state, region), season-major
    pub fn make_list(&self) -> Vec<PartitionKey> {
        let mut to_process = Vec::new();
        for &season in &self.seasons {
            for (state, regions) in &self.regions {
                for region in regions {
                    to_process.push(PartitionKey::new(region.clone(), season, state.clone()));
                }
            }
        }
        to_process
    }
}

/// Parse a `STATE=REGION[,REGION...]` command-line mapping
pub fn parse_region_spec(raw: &str) -> Result<(String, Vec<String>), ConfigError> {
    let (state, regions) = raw
        .split_once('=')
        .ok_or_else(|| ConfigError::RegionSpec(raw.to_string()))?;

    let state = state.trim();
    let regions: Vec<String> = regions
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if state.is_empty() || regions.is_empty() {
        return Err(ConfigError::RegionSpec(raw.to_string()));
    }

    Ok((state.to_string(), regions))
}
