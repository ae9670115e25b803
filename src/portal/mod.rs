//! Admin access control core
//!
//! [`DeviceAdminState`] owns the credentials, the single session slot and the
//! inactivity timeout. It performs no I/O: time comes in as an argument and
//! setting changes go out as [`Persist`] values.

pub mod credentials;
pub mod error;
pub mod page;
pub mod session;
pub mod shared;

pub use credentials::{CredentialStore, Persist};
pub use error::{PortalError, Result};
pub use page::{Page, resolve};
pub use session::{Identity, Session, SessionStatus, StartOutcome};
pub use shared::{Admission, Portal};

use crate::services::settings::StoredSettings;
use session::{CheckPolicy, SessionSlot};

const MS_PER_MINUTE: u64 = 60 * 1000;

/// Defaults applied when the device boots without persisted values
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortalDefaults {
    pub ssid: String,
    pub timeout_minutes: u32,
    pub min_password_length: usize,
}

impl Default for PortalDefaults {
    fn default() -> Self {
        Self {
            ssid: "TapGate AP".to_string(),
            timeout_minutes: 15,
            min_password_length: credentials::DEFAULT_MIN_PASSWORD_LENGTH,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeviceAdminState {
    credentials: CredentialStore,
    slot: SessionSlot,
    inactivity_timeout_ms: u64,
}

impl DeviceAdminState {
    pub fn new(inactivity_timeout_ms: u64, min_password_length: usize) -> Self {
        Self {
            credentials: CredentialStore::new(min_password_length),
            slot: SessionSlot::default(),
            inactivity_timeout_ms,
        }
    }

    /// Build the boot state from persisted values
    ///
    /// A missing or empty SSID falls back to the default label and a missing
    /// timeout to the default minutes. A stored timeout of zero is kept.
    pub fn from_settings(settings: &StoredSettings, defaults: &PortalDefaults) -> Self {
        let minutes = settings.timeout_minutes.unwrap_or(defaults.timeout_minutes);
        let mut state = Self::new(minutes_to_ms(minutes), defaults.min_password_length);

        let ssid = settings
            .ap_ssid
            .as_deref()
            .filter(|ssid| !ssid.is_empty())
            .unwrap_or(defaults.ssid.as_str());
        let password = settings.ap_password.as_deref().unwrap_or_default();
        state.credentials.restore(ssid, password);
        state
    }

    pub fn ssid(&self) -> &str {
        self.credentials.ssid()
    }

    pub fn set_ssid(&mut self, candidate: &str) -> Result<Persist> {
        self.credentials.set_ssid(candidate)
    }

    pub fn min_password_length(&self) -> usize {
        self.credentials.min_password_length()
    }

    pub fn password_defined(&self) -> bool {
        self.credentials.password_defined()
    }

    pub fn inactivity_timeout_ms(&self) -> u64 {
        self.inactivity_timeout_ms
    }

    pub fn set_inactivity_timeout_minutes(&mut self, minutes: u32) -> Persist {
        self.inactivity_timeout_ms = minutes_to_ms(minutes);
        Persist::InactivityTimeout { minutes }
    }

    /// Store a new password; the caller performing it becomes authorized
    pub fn set_password(&mut self, candidate: &str) -> Result<Persist> {
        let persist = self.credentials.set_password(candidate)?;
        self.slot.authorize();
        Ok(persist)
    }

    /// Check a login attempt and update the current session accordingly
    pub fn verify_password(&mut self, candidate: &str) -> Result<()> {
        if !self.credentials.password_defined() {
            return Err(PortalError::NoPasswordDefined);
        }

        if self.credentials.password_matches(candidate) {
            self.slot.authorize();
            Ok(())
        } else {
            self.slot.deauthorize();
            Err(PortalError::WrongPassword)
        }
    }

    pub fn change_password(&mut self, old: &str, new: &str) -> Result<Persist> {
        if !self.credentials.password_matches(old) {
            return Err(PortalError::WrongOldPassword);
        }

        self.set_password(new).map_err(|e| match e {
            PortalError::InvalidPassword => PortalError::InvalidNewPassword,
            other => other,
        })
    }

    pub fn session(&self) -> Option<&Session> {
        self.slot.session()
    }

    pub fn start_session(
        &mut self,
        identity: Identity,
        now_ms: u64,
        authorized: bool,
    ) -> StartOutcome {
        self.slot.start(identity, now_ms, authorized)
    }

    pub fn start_session_by_ip(
        &mut self,
        address: &str,
        now_ms: u64,
        authorized: bool,
    ) -> Result<StartOutcome> {
        let identity = Identity::address(address)?;
        Ok(self.slot.start(identity, now_ms, authorized))
    }

    pub fn check_session(&mut self, presented: Option<&Identity>, now_ms: u64) -> SessionStatus {
        let policy = CheckPolicy {
            inactivity_timeout_ms: self.inactivity_timeout_ms,
            password_defined: self.credentials.password_defined(),
        };
        self.slot.check(presented, now_ms, policy)
    }

    /// Address variant of [`Self::check_session`]; an unusable address counts
    /// as no identity
    pub fn check_session_by_ip(&mut self, address: &str, now_ms: u64) -> SessionStatus {
        let identity = Identity::address(address).ok();
        self.check_session(identity.as_ref(), now_ms)
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.slot.touch(now_ms);
    }

    pub fn authorize(&mut self) {
        self.slot.authorize();
    }

    pub fn clear_session(&mut self) {
        self.slot.clear();
    }

    pub fn is_authorized(&self) -> bool {
        self.slot.is_authorized()
    }

    /// Page served for `requested` given the caller's session status
    pub fn resolve(&self, requested: Page, status: SessionStatus) -> Page {
        resolve(
            requested,
            status,
            self.password_defined(),
            self.is_authorized(),
        )
    }
}

fn minutes_to_ms(minutes: u32) -> u64 {
    u64::from(minutes).saturating_mul(MS_PER_MINUTE)
}
