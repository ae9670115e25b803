//! Persistent portal settings
//!
//! Settings live in one JSON document. Every change is a read-modify-write
//! that replaces the file through a uniquely named temporary sibling. Clones
//! of a store share one lock, so concurrent saves never drop each other's
//! fields.

use crate::portal::Persist;
use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tempfile::NamedTempFile;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

const MAX_RETRIES: u32 = 3;

/// Values restored at boot; absent fields fall back to defaults
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ap_ssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ap_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
}

impl StoredSettings {
    fn apply(&mut self, persist: &Persist) {
        match persist {
            Persist::Password(password) => self.ap_password = Some(password.clone()),
            Persist::Ssid(ssid) => self.ap_ssid = Some(ssid.clone()),
            Persist::InactivityTimeout { minutes } => self.timeout_minutes = Some(*minutes),
        }
    }
}

#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait SettingsStore {
    fn load(&self) -> Result<StoredSettings>;
    fn save(&self, persist: &Persist) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, settings: &StoredSettings) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let content =
            serde_json::to_vec_pretty(settings).context("failed to serialize settings")?;

        let mut file =
            NamedTempFile::new_in(dir).context("failed to create temp settings file")?;
        file.write_all(&content)
            .context("failed to write settings file")?;
        file.as_file()
            .sync_all()
            .context("failed to sync settings file")?;

        file.persist(&self.path)
            .context("failed to replace settings file")?;

        let written = self.load().context("failed to read back settings")?;
        if written != *settings {
            return Err(anyhow!("settings read back differ from written ones"));
        }
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<StoredSettings> {
        if !self.path.try_exists().unwrap_or(false) {
            debug!("no settings at {}, using defaults", self.path.display());
            return Ok(StoredSettings::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    fn save(&self, persist: &Persist) -> Result<()> {
        debug!("save() called for {}", persist.key());

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).context("failed to create settings directory")?;
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut settings = self.load()?;
        settings.apply(persist);

        let mut last_error = anyhow!("Unknown error");
        for i in 0..MAX_RETRIES {
            match self.write(&settings) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("save attempt {} failed: {:#}", i + 1, e);
                    last_error = e;
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
            }
        }

        Err(last_error).context("save failed after retries")
    }
}
