//! Shared handle to the device state
//!
//! HTTP workers run concurrently, so every compound operation on the state
//! happens inside a single lock acquisition.

use super::{DeviceAdminState, Identity, Page, SessionStatus, StartOutcome};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of admitting one request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission {
    /// Page derived from the request path
    pub requested: Page,
    /// Page that is actually served
    pub page: Page,
    /// Status the page was resolved with
    pub status: SessionStatus,
    /// Whether the caller owns an authorized session
    pub authorized: bool,
    /// Identity the caller owns the session with
    pub identity: Option<Identity>,
    /// Identity of a session started for this caller
    pub issued: Option<Identity>,
    /// The caller's previous session was dropped
    pub revoked: bool,
}

/// Cheap to clone handle; all clones share one [`DeviceAdminState`]
#[derive(Clone, Debug)]
pub struct Portal {
    inner: Arc<Mutex<DeviceAdminState>>,
}

impl Portal {
    pub fn new(state: DeviceAdminState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Run `f` as one critical section
    pub fn with<R>(&self, f: impl FnOnce(&mut DeviceAdminState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Evaluate a request against the session slot and pick its page
    ///
    /// A caller without an applicable session gets a fresh unauthorized one
    /// from `fresh`, claimed right away. An expired session is replaced the
    /// same way but the page still resolves with `Expired`.
    pub fn admit(
        &self,
        presented: Option<Identity>,
        requested: Page,
        now_ms: u64,
        fresh: impl FnOnce() -> Option<Identity>,
    ) -> Admission {
        let mut state = self.lock();
        let mut status = state.check_session(presented.as_ref(), now_ms);
        let mut identity = None;
        let mut issued = None;
        let mut revoked = false;

        match status {
            SessionStatus::Match => {
                state.touch(now_ms);
                identity = presented;
            }
            SessionStatus::Busy => {}
            SessionStatus::None | SessionStatus::Expired => {
                if status == SessionStatus::Expired {
                    state.clear_session();
                    revoked = true;
                }

                if let Some(fresh) = fresh() {
                    if state.start_session(fresh.clone(), now_ms, false) == StartOutcome::Started {
                        let claimed = state.check_session(Some(&fresh), now_ms);
                        if status == SessionStatus::None {
                            status = claimed;
                        }
                        identity = Some(fresh.clone());
                        issued = Some(fresh);
                    }
                }
            }
        }

        let authorized = status == SessionStatus::Match && state.is_authorized();

        Admission {
            requested,
            page: state.resolve(requested, status),
            status,
            authorized,
            identity,
            issued,
            revoked,
        }
    }

    /// Run `f` only while `identity` still owns the session
    ///
    /// Another caller may have taken the slot over since admission, so form
    /// actions re-check ownership in the same critical section they change
    /// state in.
    pub fn with_owner<R>(
        &self,
        identity: Option<&Identity>,
        now_ms: u64,
        f: impl FnOnce(&mut DeviceAdminState) -> R,
    ) -> Option<R> {
        let mut state = self.lock();
        if state.check_session(identity, now_ms) != SessionStatus::Match {
            return None;
        }
        state.touch(now_ms);
        Some(f(&mut state))
    }

    fn lock(&self) -> MutexGuard<'_, DeviceAdminState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::credentials::DEFAULT_MIN_PASSWORD_LENGTH;

    const TIMEOUT_MS: u64 = 60_000;

    fn portal() -> Portal {
        Portal::new(DeviceAdminState::new(
            TIMEOUT_MS,
            DEFAULT_MIN_PASSWORD_LENGTH,
        ))
    }

    fn token(value: &str) -> Identity {
        Identity::token(value).expect("valid token")
    }

    fn issue(value: &'static str) -> impl FnOnce() -> Option<Identity> {
        move || Some(token(value))
    }

    #[test]
    fn first_visit_starts_claimed_session_in_enrollment() {
        let portal = portal();
        let admission = portal.admit(None, Page::Main, 0, issue("first"));

        assert_eq!(admission.status, SessionStatus::Match);
        assert_eq!(admission.page, Page::Enroll);
        assert_eq!(admission.issued, Some(token("first")));
        assert_eq!(admission.identity, Some(token("first")));
        assert!(!admission.revoked);
        assert!(portal.with(|s| s.session().is_some_and(|s| s.is_claimed())));
    }

    #[test]
    fn returning_caller_is_touched() {
        let portal = portal();
        portal.admit(None, Page::Main, 0, issue("first"));

        let admission = portal.admit(Some(token("first")), Page::Main, 500, issue("unused"));
        assert_eq!(admission.status, SessionStatus::Match);
        assert_eq!(admission.issued, None);
        assert_eq!(admission.identity, Some(token("first")));
        assert_eq!(
            portal.with(|s| s.session().map(|s| s.last_activity_ms())),
            Some(500)
        );
    }

    #[test]
    fn enrollment_allows_takeover() {
        let portal = portal();
        portal.admit(None, Page::Main, 0, issue("first"));

        let admission = portal.admit(None, Page::Main, 10, issue("second"));
        assert_eq!(admission.issued, Some(token("second")));
        assert_eq!(admission.page, Page::Enroll);

        let admission = portal.admit(Some(token("first")), Page::Main, 20, issue("third"));
        assert_eq!(admission.issued, Some(token("third")));
    }

    #[test]
    fn second_browser_is_busy_once_password_exists() {
        let portal = portal();
        portal.admit(None, Page::Enroll, 0, issue("admin"));
        let _ = portal
            .with(|s| s.set_password("strongpass"))
            .expect("valid password");

        let admission = portal.admit(None, Page::Main, 10, issue("intruder"));
        assert_eq!(admission.status, SessionStatus::Busy);
        assert_eq!(admission.page, Page::Busy);
        assert_eq!(admission.issued, None);
        assert_eq!(admission.identity, None);

        let admission = portal.admit(Some(token("admin")), Page::Device, 20, issue("unused"));
        assert_eq!(admission.page, Page::Device);
        assert!(admission.authorized);
    }

    #[test]
    fn expired_session_is_replaced_and_sent_to_auth() {
        let portal = portal();
        portal.admit(None, Page::Enroll, 0, issue("admin"));
        let _ = portal
            .with(|s| s.set_password("strongpass"))
            .expect("valid password");

        let admission = portal.admit(
            Some(token("admin")),
            Page::Device,
            TIMEOUT_MS,
            issue("renewed"),
        );
        assert_eq!(admission.status, SessionStatus::Expired);
        assert_eq!(admission.page, Page::Auth);
        assert!(admission.revoked);
        assert_eq!(admission.issued, Some(token("renewed")));
        assert!(!portal.with(|s| s.is_authorized()));

        let admission = portal.admit(
            Some(token("renewed")),
            Page::Device,
            TIMEOUT_MS + 1,
            issue("unused"),
        );
        assert_eq!(admission.status, SessionStatus::Match);
        assert_eq!(admission.page, Page::Auth);
    }

    #[test]
    fn caller_without_identity_source_gets_no_session() {
        let portal = portal();
        let admission = portal.admit(None, Page::Main, 0, || None);

        assert_eq!(admission.status, SessionStatus::None);
        assert_eq!(admission.page, Page::Enroll);
        assert!(portal.with(|s| s.session().is_none()));
    }

    #[test]
    fn owner_actions_require_current_session() {
        let portal = portal();
        let first = portal.admit(None, Page::Enroll, 0, issue("first"));
        portal.admit(None, Page::Enroll, 10, issue("second"));

        assert_eq!(
            portal.with_owner(first.identity.as_ref(), 20, |s| s.set_password("strongpass")),
            None
        );
        assert!(!portal.with(|s| s.password_defined()));

        let stored = portal.with_owner(Some(&token("second")), 20, |s| s.set_password("strongpass"));
        assert!(matches!(stored, Some(Ok(_))));
        assert!(portal.with(|s| s.is_authorized()));
        assert_eq!(portal.with_owner(None, 30, |_| ()), None);
    }
}
