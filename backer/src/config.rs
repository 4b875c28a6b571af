//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file with `BACKER_*` environment variable
//! overrides (`BACKER_LOG__LEVEL=debug` sets `log.level`).

use crate::destination::STAGING_DIR;
use crate::{BackerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

const ENV_PREFIX: &str = "BACKER";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub main: MainConfig,

    pub to: TargetsConfig,

    /// Source trees, processed in file order
    #[serde(default, rename = "backup")]
    pub backups: Vec<BackupConfig>,

    #[serde(default)]
    pub copy: CopyConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MainConfig {
    /// Directory holding the completion journals (defaults to the config file's directory)
    #[serde(default)]
    pub db_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
    /// Trusted destination identities
    pub ids: Vec<String>,

    /// Candidate destination description files, probed in order
    pub cfg_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Source root to back up
    pub root: PathBuf,

    /// Directory name under the destination home (defaults to the root's basename)
    #[serde(default, rename = "as")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Buffer size for copying and byte comparison (default: 1MB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Highest N tried for `<name>.$backer<N>` when renaming a conflicting file
    #[serde(default = "default_max_rename_attempts")]
    pub max_rename_attempts: u32,

    /// Log a progress line every N files
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Contents of the description file stored at the root of a destination volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub main: DestinationMain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationMain {
    pub id: String,
}

// Default values
fn default_chunk_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_max_rename_attempts() -> u32 {
    100
}

fn default_progress_every() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_rename_attempts: default_max_rename_attempts(),
            progress_every: default_progress_every(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).format(::config::FileFormat::Toml))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| {
                BackerError::Config(format!("cannot read config {}: {}", path.display(), e))
            })?;

        let mut config: Config = settings.try_deserialize().map_err(|e| {
            BackerError::Config(format!("cannot parse config {}: {}", path.display(), e))
        })?;

        if config.main.db_dir.is_none() {
            config.main.db_dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf);
        }

        config.validate()?;
        Ok(config)
    }

    /// Directory where `db.<id>.csv`, `work.<id>.csv` and the run lock live.
    pub fn journal_dir(&self) -> PathBuf {
        self.main
            .db_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Reject configurations the engine cannot run safely with.
    pub fn validate(&self) -> Result<()> {
        if self.to.ids.is_empty() {
            return Err(BackerError::Config("to.ids must list at least one destination id".into()));
        }
        if self.to.cfg_paths.is_empty() {
            return Err(BackerError::Config(
                "to.cfg_paths must list at least one destination description file".into(),
            ));
        }
        if self.backups.is_empty() {
            return Err(BackerError::Config("at least one [[backup]] root is required".into()));
        }
        if self.copy.chunk_size == 0 {
            return Err(BackerError::Config("copy.chunk_size must be greater than 0".into()));
        }
        if self.copy.max_rename_attempts == 0 {
            return Err(BackerError::Config(
                "copy.max_rename_attempts must be greater than 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for backup in &self.backups {
            if let Some(alias) = &backup.alias {
                let mut components = Path::new(alias).components();
                let single_normal = matches!(components.next(), Some(Component::Normal(_)))
                    && components.next().is_none();
                if !single_normal {
                    return Err(BackerError::Config(format!(
                        "alias {:?} for {} must be a single directory name",
                        alias,
                        backup.root.display()
                    )));
                }
            }
            let name = backup.mirror_name().ok_or_else(|| {
                BackerError::Config(format!(
                    "cannot derive a destination directory name for {}, set `as`",
                    backup.root.display()
                ))
            })?;
            if name == STAGING_DIR {
                return Err(BackerError::Config(format!(
                    "{} cannot mirror into {:?}, the name is reserved; set `as`",
                    backup.root.display(),
                    name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(BackerError::Config(format!(
                    "more than one backup root mirrors into {:?}",
                    name
                )));
            }
        }

        Ok(())
    }
}

impl BackupConfig {
    /// Name of the directory this root is mirrored into under the destination home.
    pub fn mirror_name(&self) -> Option<OsString> {
        match &self.alias {
            Some(alias) if !alias.is_empty() => Some(OsString::from(alias)),
            _ => self.root.file_name().map(|n| n.to_os_string()),
        }
    }
}

impl DestinationConfig {
    /// Read a destination description file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            BackerError::Config(format!("cannot parse {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("backer.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_config_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[to]
ids = ["usb-a"]
cfg_paths = ["/media/a/backer.toml"]

[[backup]]
root = "/home/me/photos"

[[backup]]
root = "/home/me/docs"
as = "documents"
"#,
        );

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.to.ids, vec!["usb-a".to_string()]);
        assert_eq!(config.backups.len(), 2);
        assert_eq!(config.backups[0].mirror_name(), Some(OsString::from("photos")));
        assert_eq!(config.backups[1].mirror_name(), Some(OsString::from("documents")));
        assert_eq!(config.copy.chunk_size, 1024 * 1024);
        assert_eq!(config.copy.max_rename_attempts, 100);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.journal_dir(), dir.path());
    }

    #[test]
    fn test_explicit_db_dir_wins() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[main]
db_dir = "/var/lib/backer"

[to]
ids = ["usb-a"]
cfg_paths = ["/media/a/backer.toml"]

[[backup]]
root = "/src"
"#,
        );

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.journal_dir(), PathBuf::from("/var/lib/backer"));
    }

    #[test]
    fn test_rejects_missing_roots() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[to]
ids = ["usb-a"]
cfg_paths = ["/media/a/backer.toml"]
"#,
        );

        assert!(matches!(Config::from_file(&path), Err(BackerError::Config(_))));
    }

    #[test]
    fn test_rejects_colliding_mirror_names() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[to]
ids = ["usb-a"]
cfg_paths = ["/media/a/backer.toml"]

[[backup]]
root = "/home/a/photos"

[[backup]]
root = "/home/b/photos"
"#,
        );

        assert!(matches!(Config::from_file(&path), Err(BackerError::Config(_))));
    }

    #[test]
    fn test_rejects_nested_alias() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[to]
ids = ["usb-a"]
cfg_paths = ["/media/a/backer.toml"]

[[backup]]
root = "/home/a/photos"
as = "../escape"
"#,
        );

        assert!(matches!(Config::from_file(&path), Err(BackerError::Config(_))));
    }

    #[test]
    fn test_rejects_reserved_mirror_name() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[to]
ids = ["usb-a"]
cfg_paths = ["/media/a/backer.toml"]

[[backup]]
root = "/home/a/.backer"
"#,
        );

        assert!(matches!(Config::from_file(&path), Err(BackerError::Config(_))));
    }

    #[test]
    fn test_destination_description() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backer.toml");
        fs::write(&path, "[main]\nid = \"usb-a\"\n").unwrap();

        let dst = DestinationConfig::from_file(&path).unwrap();
        assert_eq!(dst.main.id, "usb-a");
    }
}
