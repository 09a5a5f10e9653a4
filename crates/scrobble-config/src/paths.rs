use anyhow::Result;
use std::path::{Path, PathBuf};

/// Environment variable that relocates every file this tool reads or writes
pub const HOME_ENV: &str = "SIMKL_SCROBBLER_HOME";

pub struct PathManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl PathManager {
    /// Platform config directory, e.g. `~/.config/simkl-scrobbler` on Linux
    pub fn new() -> Result<Self> {
        let base_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("simkl-scrobbler");
        Ok(Self::with_base(base_dir))
    }

    /// Everything under a single directory
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            config_dir: base.clone(),
            data_dir: base.join("data"),
            log_dir: base.join("logs"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.config_dir.join("credentials.toml")
    }

    /// Watermarks, remote snapshots and the pushed ledger
    pub fn sync_state_file(&self) -> PathBuf {
        self.data_dir.join("sync_state.bin")
    }

    /// Local watched-state store used when no media center is attached
    pub fn library_file(&self) -> PathBuf {
        self.data_dir.join("library.json")
    }

    pub fn service_log_file(&self) -> PathBuf {
        self.log_dir.join("scrobbler.log")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

impl Default for PathManager {
    fn default() -> Self {
        if let Ok(home) = std::env::var(HOME_ENV) {
            if !home.is_empty() {
                return Self::with_base(home);
            }
        }
        Self::new().unwrap_or_else(|_| Self::with_base(".simkl-scrobbler"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_base() {
        let paths = PathManager::with_base("/srv/scrobbler");
        assert_eq!(paths.config_file(), PathBuf::from("/srv/scrobbler/config.toml"));
        assert_eq!(
            paths.sync_state_file(),
            PathBuf::from("/srv/scrobbler/data/sync_state.bin")
        );
        assert_eq!(
            paths.service_log_file(),
            PathBuf::from("/srv/scrobbler/logs/scrobbler.log")
        );
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::with_base(dir.path());
        paths.ensure_directories().unwrap();
        assert!(paths.data_dir().is_dir());
        assert!(paths.log_dir().is_dir());
    }
}
