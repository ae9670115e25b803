use crate::portal::{PortalDefaults, credentials::PASSWORD_CAPACITY};
use anyhow::{Context, Result, bail, ensure};
use std::{env, path::PathBuf, str::FromStr};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// UI server configuration
    pub ui: UiConfig,

    /// Access control configuration
    pub portal: PortalConfig,

    /// Path configuration
    pub paths: PathConfig,
}

#[derive(Clone, Debug)]
pub struct UiConfig {
    pub port: u16,
}

/// How a caller is recognized between requests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdentityMode {
    /// Server issued token kept in the session cookie
    #[default]
    Token,
    /// Peer address of the connection
    Address,
}

impl FromStr for IdentityMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(IdentityMode::Token),
            "ip" | "address" => Ok(IdentityMode::Address),
            other => bail!("unknown identity mode: {other}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PortalConfig {
    pub identity_mode: IdentityMode,
    pub defaults: PortalDefaults,
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    pub settings_file: PathBuf,
}

impl AppConfig {
    /// Load and validate the configuration from environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(|key| env::var(key).ok())
    }

    fn load_from(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            ui: UiConfig::load(&var)?,
            portal: PortalConfig::load(&var)?,
            paths: PathConfig::load(&var),
        })
    }
}

impl UiConfig {
    fn load(var: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = var("UI_PORT")
            .unwrap_or_else(|| "80".to_string())
            .parse::<u16>()
            .context("failed to parse UI_PORT: invalid format")?;

        Ok(Self { port })
    }
}

impl PortalConfig {
    fn load(var: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let fallback = PortalDefaults::default();

        let identity_mode = match var("PORTAL_IDENTITY_MODE") {
            Some(mode) => mode
                .parse()
                .context("failed to parse PORTAL_IDENTITY_MODE")?,
            None => IdentityMode::default(),
        };

        let min_password_length = match var("PORTAL_MIN_PASSWORD_LENGTH") {
            Some(len) => len
                .parse::<usize>()
                .context("failed to parse PORTAL_MIN_PASSWORD_LENGTH: invalid format")?,
            None => fallback.min_password_length,
        };
        ensure!(
            (1..PASSWORD_CAPACITY).contains(&min_password_length),
            "PORTAL_MIN_PASSWORD_LENGTH must be between 1 and {}",
            PASSWORD_CAPACITY - 1
        );

        let timeout_minutes = match var("PORTAL_IDLE_TIMEOUT_MIN") {
            Some(minutes) => minutes
                .parse::<u32>()
                .context("failed to parse PORTAL_IDLE_TIMEOUT_MIN: invalid format")?,
            None => fallback.timeout_minutes,
        };

        let ssid = var("PORTAL_DEFAULT_SSID")
            .filter(|ssid| !ssid.is_empty())
            .unwrap_or(fallback.ssid);

        Ok(Self {
            identity_mode,
            defaults: PortalDefaults {
                ssid,
                timeout_minutes,
                min_password_length,
            },
        })
    }
}

impl PathConfig {
    fn load(var: &impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "/data".to_string()));
        let settings_file = data_dir.join("config").join("admin_portal.json");

        Self { settings_file }
    }
}
