//! CLI configuration management.

use retrig_scheduler::{BackendKind, QuerySourceKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// Job data source for ranges and backfills.
    #[serde(default)]
    pub query_source: QuerySourceKind,
    /// Scheduling backend.
    #[serde(default)]
    pub backend: BackendKind,
    /// CI world snapshot to run against.
    pub snapshot: Option<PathBuf>,
    /// Where to write the builder list when an unknown builder is requested.
    pub builders_file: Option<PathBuf>,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("org", "retrig", "retrig")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "query_source" => {
                self.query_source = match value {
                    "buildapi" => QuerySourceKind::BuildApi,
                    "treeherder" => QuerySourceKind::Treeherder,
                    _ => return Err(format!("Invalid query source: {}", value)),
                };
            }
            "backend" => {
                self.backend = match value {
                    "buildapi" => BackendKind::BuildApi,
                    "taskcluster" => BackendKind::TaskCluster,
                    "bridge" => BackendKind::Bridge,
                    _ => return Err(format!("Invalid backend: {}", value)),
                };
            }
            "snapshot" => self.snapshot = Some(PathBuf::from(value)),
            "builders_file" => self.builders_file = Some(PathBuf::from(value)),
            "output_format" => {
                self.output_format = match value {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    _ => return Err(format!("Invalid output format: {}", value)),
                };
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_known_keys() {
        let mut config = CliConfig::default();
        config.set("query_source", "treeherder").unwrap();
        config.set("backend", "bridge").unwrap();
        config.set("snapshot", "/tmp/world.yaml").unwrap();
        config.set("output_format", "json").unwrap();

        assert_eq!(config.query_source, QuerySourceKind::Treeherder);
        assert_eq!(config.backend, BackendKind::Bridge);
        assert_eq!(config.snapshot, Some(PathBuf::from("/tmp/world.yaml")));
        assert_eq!(config.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = CliConfig::default();
        assert!(config.set("backend", "jenkins").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert_eq!(config.backend, BackendKind::BuildApi);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = CliConfig::default();
        config.set("backend", "taskcluster").unwrap();
        config.set("builders_file", "builders.txt").unwrap();
        config.save_to(&path).unwrap();

        let loaded = CliConfig::load_from(&path).unwrap();
        assert_eq!(loaded.backend, BackendKind::TaskCluster);
        assert_eq!(loaded.builders_file, Some(PathBuf::from("builders.txt")));
        assert_eq!(loaded.query_source, QuerySourceKind::BuildApi);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load_from(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.output_format, OutputFormat::Table);
        assert!(config.snapshot.is_none());
    }
}
