//! Exclusive admin session slot
//!
//! The device supports exactly one admin session. The slot is either empty or
//! holds a [`Session`] bound to a single [`Identity`]. Time is always supplied
//! by the caller as monotonic milliseconds, the slot never reads a clock.

use super::error::{PortalError, Result};

/// Maximum length in bytes of a session token
pub const TOKEN_MAX_LEN: usize = 32;
/// Maximum length in bytes of a textual client address (fits IPv6 with zone)
pub const ADDRESS_MAX_LEN: usize = 45;

/// Value a caller presents to prove continuity of its session
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Opaque bearer token issued on first contact
    Token(String),
    /// Remote network address of the client
    Address(String),
}

impl Identity {
    pub fn token(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        Self::check_bounds(&value, TOKEN_MAX_LEN, "session token")?;
        Ok(Self::Token(value))
    }

    pub fn address(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        Self::check_bounds(&value, ADDRESS_MAX_LEN, "client address")?;
        Ok(Self::Address(value))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Token(value) | Self::Address(value) => value,
        }
    }

    pub fn is_address(&self) -> bool {
        matches!(self, Self::Address(_))
    }

    fn check_bounds(value: &str, max_len: usize, what: &'static str) -> Result<()> {
        if value.is_empty() || value.len() > max_len {
            return Err(PortalError::InvalidArgument(what));
        }
        Ok(())
    }
}

/// Outcome of evaluating a caller against the session slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No session applies to the caller
    None,
    /// The caller owns the active session
    Match,
    /// Another admin session is in progress
    Busy,
    /// The session timed out due to inactivity
    Expired,
}

/// Result of a start request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// The slot was allocated or overwritten
    Started,
    /// An authorized session occupies the slot and was kept
    Retained,
}

/// The single admin session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    identity: Identity,
    claimed: bool,
    authorized: bool,
    last_activity_ms: u64,
}

impl Session {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }
}

/// Inputs owned by the aggregate that steer [`SessionSlot::check`]
#[derive(Clone, Copy, Debug)]
pub struct CheckPolicy {
    pub inactivity_timeout_ms: u64,
    pub password_defined: bool,
}

/// Storage for the one session the device supports
#[derive(Clone, Debug, Default)]
pub struct SessionSlot {
    session: Option<Session>,
}

impl SessionSlot {
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_authorized(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.authorized)
    }

    /// Allocate the slot for `identity`
    ///
    /// An unauthorized request never evicts an authorized session.
    pub fn start(&mut self, identity: Identity, now_ms: u64, authorized: bool) -> StartOutcome {
        if !authorized && self.is_authorized() {
            return StartOutcome::Retained;
        }

        self.session = Some(Session {
            identity,
            claimed: false,
            authorized,
            last_activity_ms: now_ms,
        });
        StartOutcome::Started
    }

    /// Evaluate `presented` against the slot
    ///
    /// Claiming happens before the timeout check, so a caller claiming a stale
    /// pending session observes `Expired` on the same call. Address sessions
    /// release the slot when they expire.
    pub fn check(
        &mut self,
        presented: Option<&Identity>,
        now_ms: u64,
        policy: CheckPolicy,
    ) -> SessionStatus {
        let Some(session) = self.session.as_mut() else {
            return SessionStatus::None;
        };

        let matches = presented.is_some_and(|identity| *identity == session.identity);

        if !session.claimed {
            if !matches {
                return SessionStatus::None;
            }
            session.claimed = true;
        }

        let elapsed = now_ms.saturating_sub(session.last_activity_ms);
        if policy.inactivity_timeout_ms > 0 && elapsed >= policy.inactivity_timeout_ms {
            if session.identity.is_address() {
                self.session = None;
            }
            return SessionStatus::Expired;
        }

        if !matches {
            return if policy.password_defined {
                SessionStatus::Busy
            } else {
                SessionStatus::None
            };
        }

        SessionStatus::Match
    }

    pub fn touch(&mut self, now_ms: u64) {
        if let Some(session) = self.session.as_mut() {
            session.last_activity_ms = now_ms;
        }
    }

    pub fn authorize(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.authorized = true;
        }
    }

    pub fn deauthorize(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.authorized = false;
        }
    }

    pub fn clear(&mut self) {
        self.session = None;
    }
}
