//! On-disk JSON configuration.
//!
//! Missing keys take documented defaults; loading normalizes paths (sync
//! roots lose trailing slashes, remote roots gain a leading one) and
//! validates that every source directory exists. An invalid config is fatal
//! on first load and rejected with a warning on reload, keeping the old one.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::paths;
use crate::remote::DeleteBehavior;

pub const DEFAULT_SYNC_CONCURRENCY: usize = 4;
pub const DEFAULT_DASHBOARD_HOST: &str = "127.0.0.1";
pub const DEFAULT_DASHBOARD_PORT: u16 = 4242;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {0}: {1}")]
    Read(String, #[source] std::io::Error),

    #[error("cannot parse config {0}: {1}")]
    Parse(String, #[source] serde_json::Error),

    #[error("sync dir does not exist: {0}")]
    MissingSourcePath(String),

    #[error("sync_concurrency must be at least 1")]
    ZeroConcurrency,
}

/// One `(source_path, remote_root)` mapping; the unit of watching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDir {
    pub source_path: String,
    pub remote_root: String,
}

/// One exclusion entry: a scope path (`"/"` = global) plus glob strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeEntry {
    pub path: String,
    pub globs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync_dirs: Vec<SyncDir>,
    pub sync_concurrency: usize,
    pub remote_delete_behavior: DeleteBehavior,
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub exclude_patterns: Vec<ExcludeEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_dirs: Vec::new(),
            sync_concurrency: DEFAULT_SYNC_CONCURRENCY,
            remote_delete_behavior: DeleteBehavior::default(),
            dashboard_host: DEFAULT_DASHBOARD_HOST.to_string(),
            dashboard_port: DEFAULT_DASHBOARD_PORT,
            exclude_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Load, normalize, and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(display.clone(), e))?;
        let mut config: Config =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(display, e))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn normalize(&mut self) {
        for dir in &mut self.sync_dirs {
            dir.source_path = paths::normalize_root(&dir.source_path);
            dir.remote_root = paths::normalize_remote_root(&dir.remote_root);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        for dir in &self.sync_dirs {
            if !Path::new(&dir.source_path).is_dir() {
                return Err(ConfigError::MissingSourcePath(dir.source_path.clone()));
            }
        }
        Ok(())
    }

    /// The sync-dir whose source path matches `watch_root`, trailing slashes
    /// ignored.
    pub fn sync_dir_for_root(&self, watch_root: &str) -> Option<&SyncDir> {
        let normalized = paths::normalize_root(watch_root);
        self.sync_dirs.iter().find(|d| d.source_path == normalized)
    }

    /// Source paths of every active sync-dir.
    pub fn source_roots(&self) -> Vec<String> {
        self.sync_dirs.iter().map(|d| d.source_path.clone()).collect()
    }
}

/// Keys that changed between two configs, in declaration order.
///
/// The reload path emits one `config:reload:<key>` per entry.
pub fn diff_keys(old: &Config, new: &Config) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if old.sync_dirs != new.sync_dirs {
        changed.push("sync_dirs");
    }
    if old.sync_concurrency != new.sync_concurrency {
        changed.push("sync_concurrency");
    }
    if old.remote_delete_behavior != new.remote_delete_behavior {
        changed.push("remote_delete_behavior");
    }
    if old.dashboard_host != new.dashboard_host {
        changed.push("dashboard_host");
    }
    if old.dashboard_port != new.dashboard_port {
        changed.push("dashboard_port");
    }
    if old.exclude_patterns != new.exclude_patterns {
        changed.push("exclude_patterns");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_fill_missing_keys() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(&config_path, "{}").unwrap();
        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.sync_concurrency, 4);
        assert_eq!(config.dashboard_host, "127.0.0.1");
        assert_eq!(config.dashboard_port, 4242);
        assert_eq!(config.remote_delete_behavior, DeleteBehavior::Trash);
    }

    #[test]
    fn normalizes_roots() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("docs");
        fs::create_dir(&src).unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(
            &config_path,
            format!(
                r#"{{"sync_dirs": [{{"source_path": "{}/", "remote_root": "backup"}}]}}"#,
                src.display()
            ),
        )
        .unwrap();
        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.sync_dirs[0].source_path, src.display().to_string());
        assert_eq!(config.sync_dirs[0].remote_root, "/backup");
    }

    #[test]
    fn missing_source_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(
            &config_path,
            r#"{"sync_dirs": [{"source_path": "/definitely/not/here", "remote_root": "/r"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            Config::load(&config_path),
            Err(ConfigError::MissingSourcePath(_))
        ));
    }

    #[test]
    fn diff_reports_changed_keys() {
        let old = Config::default();
        let mut new = Config::default();
        new.sync_concurrency = 8;
        new.dashboard_port = 9000;
        assert_eq!(diff_keys(&old, &new), vec!["sync_concurrency", "dashboard_port"]);
        assert!(diff_keys(&old, &old.clone()).is_empty());
    }
}
