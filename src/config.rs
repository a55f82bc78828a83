// config.rs - YAML configuration for the analysis drivers

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AnalysisError, Result};
use crate::finite_size::CriticalExponents;
use crate::io::OverwritePolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Binary files or directories holding them.
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output_dir: PathBuf::from("analysis_output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Rows discarded as thermalization.
    pub first_index: usize,
    pub max_block_size: usize,
    /// Worker threads; `None` uses every available core.
    pub num_cores: Option<usize>,
    /// Half-width of the derivative regression window.
    pub locality: usize,
    /// Number of log-spaced block sizes for plateau fits.
    pub block_size_count: usize,
    pub dimension: u32,
    pub overwrite: OverwritePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            first_index: 100_000,
            max_block_size: 5_000,
            num_cores: None,
            locality: 5,
            block_size_count: 400,
            dimension: 3,
            overwrite: OverwritePolicy::Overwrite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub paths: Paths,
    pub settings: Settings,
    pub critical_values: Option<CriticalExponents>,
}

impl AnalysisConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&contents)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.settings;
        if s.max_block_size == 0 {
            return Err(AnalysisError::invalid("max_block_size must be positive"));
        }
        if s.locality == 0 {
            return Err(AnalysisError::invalid("locality must be positive"));
        }
        if s.num_cores == Some(0) {
            return Err(AnalysisError::invalid("num_cores must be positive"));
        }
        if s.dimension == 0 {
            return Err(AnalysisError::invalid("dimension must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "settings:\n  max_block_size: 200\n  overwrite: rename\n";
        let config = AnalysisConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.settings.max_block_size, 200);
        assert_eq!(config.settings.overwrite, OverwritePolicy::Rename);
        assert_eq!(config.settings.locality, 5);
        assert!(config.critical_values.is_none());
    }

    #[test]
    fn test_zero_locality_rejected() {
        let yaml = "settings:\n  locality: 0\n";
        assert!(AnalysisConfig::from_yaml_str(yaml).is_err());
    }
}
