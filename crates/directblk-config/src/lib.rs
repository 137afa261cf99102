//! Configuration management for directblk
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the caller)
//! 2. Environment variables (DBLK_* prefix)
//! 3. directblk.local.toml (gitignored, local overrides)
//! 4. directblk.toml (git-tracked, project config)
//! 5. ~/.config/directblk/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main directblk configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectblkConfig {
    pub device: DeviceConfig,
    pub geometry: GeometryConfig,
    pub bench: BenchConfig,
}

/// Which device to open and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub path: PathBuf,
    /// Bypass the page cache.
    pub direct: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/raw1"),
            direct: true,
        }
    }
}

/// Block size and direct-I/O alignment, in bytes.
///
/// Must match the sector size and direct-I/O granularity of the target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub block_size: usize,
    pub alignment: usize,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            block_size: 32 * 1024,
            alignment: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Repetitions of every measurement.
    pub runs: u32,
    /// Number of blocks transferred per measurement; one measurement per entry.
    pub block_counts: Vec<u32>,
    /// Random block addresses are drawn from `[0, block_span)`.
    pub block_span: u64,
    /// RNG seed for reproducible address sequences.
    pub seed: Option<u64>,
    /// Copy read data back into the caller buffer.
    pub verify: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            runs: 10,
            block_counts: (1..=10).map(|i| i * 100).collect(),
            block_span: 1024,
            seed: None,
            verify: true,
        }
    }
}

impl DirectblkConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Load a single TOML file, without defaults from other sources
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values no benchmark run can use
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if !self.geometry.alignment.is_power_of_two() {
            return invalid("geometry.alignment must be a power of two");
        }
        if self.geometry.block_size == 0
            || self.geometry.block_size % self.geometry.alignment != 0
        {
            return invalid("geometry.block_size must be a positive multiple of geometry.alignment");
        }
        if self.bench.runs == 0 {
            return invalid("bench.runs must be at least 1");
        }
        if self.bench.block_counts.is_empty() {
            return invalid("bench.block_counts must not be empty");
        }
        if self.bench.block_counts.contains(&0) {
            return invalid("bench.block_counts entries must be positive");
        }
        if self.bench.block_span == 0 {
            return invalid("bench.block_span must be at least 1");
        }
        Ok(())
    }

    /// Resolve a relative device path against `base_dir`
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        if self.device.path.is_relative() {
            self.device.path = base_dir.as_ref().join(&self.device.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DirectblkConfig::default();
        assert_eq!(config.device.path, PathBuf::from("/dev/raw1"));
        assert!(config.device.direct);
        assert_eq!(config.geometry.block_size, 32768);
        assert_eq!(config.geometry.alignment, 512);
        assert_eq!(config.bench.runs, 10);
        assert_eq!(config.bench.block_counts.first(), Some(&100));
        assert_eq!(config.bench.block_counts.last(), Some(&1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_geometry() {
        let mut config = DirectblkConfig::default();
        config.geometry.alignment = 500;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = DirectblkConfig::default();
        config.geometry.block_size = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_bench() {
        let mut config = DirectblkConfig::default();
        config.bench.block_counts.clear();
        assert!(config.validate().is_err());

        let mut config = DirectblkConfig::default();
        config.bench.runs = 0;
        assert!(config.validate().is_err());

        let mut config = DirectblkConfig::default();
        config.bench.block_span = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_path_resolution() {
        let mut config = DirectblkConfig::default();
        config.resolve_paths("/home/user/project");
        // Absolute device paths are left alone
        assert_eq!(config.device.path, PathBuf::from("/dev/raw1"));

        config.device.path = PathBuf::from("images/disk.img");
        config.resolve_paths("/home/user/project");
        assert_eq!(
            config.device.path,
            PathBuf::from("/home/user/project/images/disk.img")
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = DirectblkConfig::default();
        config.bench.seed = Some(7);
        let rendered = config.to_toml().unwrap();
        let parsed: DirectblkConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        std::fs::write(
            &path,
            "[device]\npath = \"/dev/sdb\"\ndirect = false\n\n[bench]\nruns = 3\n",
        )
        .unwrap();

        let config = DirectblkConfig::from_file(&path).unwrap();
        assert_eq!(config.device.path, PathBuf::from("/dev/sdb"));
        assert!(!config.device.direct);
        assert_eq!(config.bench.runs, 3);
        assert_eq!(config.geometry, GeometryConfig::default());
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[bench\nruns = ").unwrap();
        assert!(matches!(
            DirectblkConfig::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));
        assert!(matches!(
            DirectblkConfig::from_file(dir.path().join("absent.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }
}
