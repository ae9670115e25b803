//! Admin credentials and access point label
//!
//! Passwords are kept and compared in plaintext, matching what the device
//! firmware persists.

use super::error::{PortalError, Result};

/// Password buffer capacity in bytes; accepted passwords are strictly shorter
pub const PASSWORD_CAPACITY: usize = 64;
/// Maximum SSID length in bytes
pub const SSID_CAPACITY: usize = 32;
/// WPA2 minimum passphrase length
pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// A setting the caller must write to persistent storage
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use = "the changed setting has to be persisted by the caller"]
pub enum Persist {
    Password(String),
    Ssid(String),
    InactivityTimeout { minutes: u32 },
}

impl Persist {
    /// Storage key of the changed setting
    pub fn key(&self) -> &'static str {
        match self {
            Persist::Password(_) => "ap_psw",
            Persist::Ssid(_) => "ap_ssid",
            Persist::InactivityTimeout { .. } => "ap_timeout",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CredentialStore {
    ap_ssid: String,
    ap_password: String,
    min_password_length: usize,
}

impl CredentialStore {
    pub fn new(min_password_length: usize) -> Self {
        Self {
            ap_ssid: String::new(),
            ap_password: String::new(),
            min_password_length,
        }
    }

    pub fn min_password_length(&self) -> usize {
        self.min_password_length
    }

    pub fn ssid(&self) -> &str {
        &self.ap_ssid
    }

    pub fn password_defined(&self) -> bool {
        !self.ap_password.is_empty() && self.ap_password.len() >= self.min_password_length
    }

    pub fn password_valid(&self, candidate: &str) -> bool {
        candidate.len() >= self.min_password_length
            && candidate.len() < PASSWORD_CAPACITY
            && is_printable(candidate)
    }

    /// Compare against the stored password
    ///
    /// The loop always walks the full stored length so the amount of work does
    /// not depend on where the first mismatch is.
    pub fn password_matches(&self, candidate: &str) -> bool {
        if !self.password_defined() {
            return false;
        }

        let stored = self.ap_password.as_bytes();
        let candidate = candidate.as_bytes();
        let mut diff = stored.len() ^ candidate.len();
        for (index, byte) in stored.iter().enumerate() {
            let other = candidate.get(index).copied().unwrap_or(0);
            diff |= usize::from(byte ^ other);
        }
        diff == 0
    }

    pub fn set_password(&mut self, candidate: &str) -> Result<Persist> {
        if !self.password_valid(candidate) {
            return Err(PortalError::InvalidPassword);
        }
        self.ap_password = candidate.to_string();
        Ok(Persist::Password(self.ap_password.clone()))
    }

    pub fn set_ssid(&mut self, candidate: &str) -> Result<Persist> {
        if candidate.is_empty() {
            return Err(PortalError::InvalidArgument("ssid is empty"));
        }
        if candidate.len() > SSID_CAPACITY {
            return Err(PortalError::InvalidArgument("ssid is too long"));
        }
        if !is_printable(candidate) {
            return Err(PortalError::InvalidArgument("ssid contains invalid characters"));
        }
        self.ap_ssid = candidate.to_string();
        Ok(Persist::Ssid(self.ap_ssid.clone()))
    }

    /// Adopt values read from storage without validation
    ///
    /// Over-long values are clamped to capacity. A stored password shorter than
    /// the minimum length leaves the device in enrollment.
    pub(crate) fn restore(&mut self, ssid: &str, password: &str) {
        self.ap_ssid = clamp(ssid, SSID_CAPACITY).to_string();
        self.ap_password = clamp(password, PASSWORD_CAPACITY - 1).to_string();
    }
}

fn is_printable(value: &str) -> bool {
    !value.chars().any(char::is_control)
}

fn clamp(value: &str, max_len: usize) -> &str {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(password: &str) -> CredentialStore {
        let mut store = CredentialStore::new(DEFAULT_MIN_PASSWORD_LENGTH);
        let _ = store.set_password(password).expect("valid password");
        store
    }

    #[test]
    fn password_validation_rules() {
        let store = CredentialStore::new(DEFAULT_MIN_PASSWORD_LENGTH);
        assert!(!store.password_valid("short"));
        assert!(store.password_valid("longenough"));
        assert!(store.password_valid(&"p".repeat(PASSWORD_CAPACITY - 1)));
        assert!(!store.password_valid(&"p".repeat(PASSWORD_CAPACITY)));
        assert!(!store.password_valid("long\nenough"));
        assert!(store.password_valid("with spaces ok"));
    }

    #[test]
    fn set_password_reports_persist() {
        let mut store = CredentialStore::new(DEFAULT_MIN_PASSWORD_LENGTH);
        assert!(!store.password_defined());

        assert_eq!(store.set_password("short"), Err(PortalError::InvalidPassword));
        assert!(!store.password_defined());

        let persist = store.set_password("longenough").expect("valid password");
        assert_eq!(persist, Persist::Password("longenough".to_string()));
        assert_eq!(persist.key(), "ap_psw");
        assert!(store.password_defined());
    }

    #[test]
    fn password_match_is_exact() {
        let store = store_with("strongpass");
        assert!(store.password_matches("strongpass"));
        assert!(!store.password_matches("strongpas"));
        assert!(!store.password_matches("strongpass1"));
        assert!(!store.password_matches(""));
    }

    #[test]
    fn nothing_matches_without_password() {
        let store = CredentialStore::new(DEFAULT_MIN_PASSWORD_LENGTH);
        assert!(!store.password_matches(""));
    }

    #[test]
    fn restored_short_password_keeps_enrollment_open() {
        let mut store = CredentialStore::new(DEFAULT_MIN_PASSWORD_LENGTH);
        store.restore("TapGate AP", "1234");
        assert!(!store.password_defined());

        store.restore("TapGate AP", "12345678");
        assert!(store.password_defined());
    }

    #[test]
    fn restore_clamps_on_char_boundary() {
        let mut store = CredentialStore::new(DEFAULT_MIN_PASSWORD_LENGTH);
        let ssid = format!("{}é", "a".repeat(SSID_CAPACITY - 1));
        store.restore(&ssid, "");
        assert_eq!(store.ssid(), "a".repeat(SSID_CAPACITY - 1));
    }

    #[test]
    fn ssid_rules() {
        let mut store = CredentialStore::new(DEFAULT_MIN_PASSWORD_LENGTH);
        assert!(matches!(
            store.set_ssid(""),
            Err(PortalError::InvalidArgument(_))
        ));
        assert!(store.set_ssid(&"s".repeat(SSID_CAPACITY + 1)).is_err());
        assert!(store.set_ssid("bad\tname").is_err());

        let persist = store.set_ssid("Workshop").expect("valid ssid");
        assert_eq!(persist, Persist::Ssid("Workshop".to_string()));
        assert_eq!(store.ssid(), "Workshop");
    }
}
