use super::session::SessionStatus;
use serde::Serialize;

/// Pages exposed by the admin portal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Enroll,
    Auth,
    ChangePassword,
    Device,
    Wifi,
    Clients,
    Events,
    Main,
    Busy,
}

impl Page {
    pub const ALL: [Page; 9] = [
        Page::Enroll,
        Page::Auth,
        Page::ChangePassword,
        Page::Device,
        Page::Wifi,
        Page::Clients,
        Page::Events,
        Page::Main,
        Page::Busy,
    ];

    pub const fn route(self) -> &'static str {
        match self {
            Page::Enroll => "/enroll",
            Page::Auth => "/auth",
            Page::ChangePassword => "/psw",
            Page::Device => "/device",
            Page::Wifi => "/wifi",
            Page::Clients => "/clients",
            Page::Events => "/events",
            Page::Main => "/main",
            Page::Busy => "/busy",
        }
    }

    /// Map a request path onto a page
    ///
    /// A route matches when the path equals it or continues with `/` or `?`.
    /// The root and unknown paths map to [`Page::Main`].
    pub fn from_path(path: &str) -> Page {
        Page::ALL
            .into_iter()
            .find(|page| route_matches(path, page.route()))
            .unwrap_or(Page::Main)
    }

    /// Pages that show or change device configuration
    pub const fn requires_auth(self) -> bool {
        matches!(
            self,
            Page::Main
                | Page::Device
                | Page::Wifi
                | Page::Clients
                | Page::Events
                | Page::ChangePassword
        )
    }
}

fn route_matches(path: &str, route: &str) -> bool {
    path.strip_prefix(route)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
}

/// Decide which page is served for `requested`
///
/// Busy and expired sessions are handled first, then enrollment gates every
/// page, then authentication.
pub fn resolve(
    requested: Page,
    status: SessionStatus,
    password_defined: bool,
    authorized: bool,
) -> Page {
    match status {
        SessionStatus::Busy => return Page::Busy,
        SessionStatus::Expired => return Page::Auth,
        SessionStatus::None | SessionStatus::Match => {}
    }

    if !password_defined {
        return Page::Enroll;
    }

    if status != SessionStatus::Match || !authorized {
        return Page::Auth;
    }

    match requested {
        Page::Enroll => Page::Auth,
        Page::Auth | Page::Busy => Page::Main,
        page => page,
    }
}
