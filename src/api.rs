use crate::{
    clock::Clock,
    portal::{Admission, DeviceAdminState, Page, Persist, Portal, PortalError},
    services::settings::SettingsStore,
};
use actix_session::Session;
use actix_web::{HttpResponse, Responder, http::StatusCode, http::header, web};
use anyhow::Result;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

const LOGIN_FAILED: &str = "Incorrect password";
const INVALID_INPUT: &str = "Invalid input";

#[derive(Deserialize, Validate)]
pub struct PasswordForm {
    #[validate(max_length = 128)]
    password: String,
}

#[derive(Deserialize, Validate)]
pub struct ChangePasswordForm {
    #[validate(max_length = 128)]
    old: String,
    #[validate(max_length = 128)]
    new: String,
}

#[derive(Deserialize, Validate)]
pub struct DeviceForm {
    #[validate(max_length = 128)]
    ssid: String,
    #[validate(max_length = 128)]
    timeout: Option<String>,
}

/// What a page shows; settings are only included for authorized callers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    page: Page,
    route: &'static str,
    password_defined: bool,
    authorized: bool,
    min_password_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl PageView {
    fn new(state: &DeviceAdminState, admission: &Admission, message: Option<String>) -> Self {
        let authorized = admission.authorized && state.is_authorized();

        Self {
            page: admission.page,
            route: admission.page.route(),
            password_defined: state.password_defined(),
            authorized,
            min_password_length: state.min_password_length(),
            ssid: authorized.then(|| state.ssid().to_string()),
            timeout_minutes: authorized.then(|| state.inactivity_timeout_ms() / 60_000),
            message,
        }
    }
}

#[derive(Clone)]
pub struct Api<Store>
where
    Store: SettingsStore,
{
    pub store: Store,
}

impl<Store> Api<Store>
where
    Store: SettingsStore + Send + Sync + 'static,
{
    pub fn new(store: Store) -> Result<Self> {
        Ok(Api { store })
    }

    pub async fn page(admission: Admission, portal: web::Data<Portal>) -> impl Responder {
        debug!("page() called: {:?}", admission.page);
        Self::render(&portal, &admission, StatusCode::OK, None)
    }

    pub async fn version() -> impl Responder {
        HttpResponse::Ok().body(env!("CARGO_PKG_VERSION"))
    }

    pub async fn enroll(
        form: web::Form<PasswordForm>,
        admission: Admission,
        api: web::Data<Self>,
        portal: web::Data<Portal>,
        clock: web::Data<dyn Clock>,
    ) -> impl Responder {
        debug!("enroll() called");

        if admission.page != Page::Enroll {
            return redirect(admission.page);
        }
        if form.validate().is_err() {
            return Self::fail(&portal, &admission, StatusCode::BAD_REQUEST, INVALID_INPUT);
        }

        let result = portal.with_owner(admission.identity.as_ref(), clock.now_ms(), |state| {
            if state.password_defined() {
                return Err(PortalError::InvalidArgument("password is already defined"));
            }
            state.set_password(&form.password)
        });

        match result {
            None => redirect(admission.requested),
            Some(Ok(persist)) => api.persist_then_redirect(&[persist], Page::Main, "enroll"),
            Some(Err(PortalError::InvalidArgument(_))) => redirect(Page::Auth),
            Some(Err(e)) => {
                error!("enroll failed: {e}");
                let message = Self::password_hint(&portal);
                Self::fail(&portal, &admission, StatusCode::BAD_REQUEST, message)
            }
        }
    }

    pub async fn login(
        form: web::Form<PasswordForm>,
        admission: Admission,
        portal: web::Data<Portal>,
        clock: web::Data<dyn Clock>,
    ) -> impl Responder {
        debug!("login() called");

        if admission.page != Page::Auth {
            return redirect(admission.page);
        }
        if form.validate().is_err() {
            return Self::fail(&portal, &admission, StatusCode::UNAUTHORIZED, LOGIN_FAILED);
        }

        let result = portal.with_owner(admission.identity.as_ref(), clock.now_ms(), |state| {
            state.verify_password(&form.password)
        });

        match result {
            None => redirect(admission.requested),
            Some(Ok(())) => {
                info!("admin logged in");
                redirect(Page::Main)
            }
            Some(Err(e)) => {
                error!("login failed: {e}");
                Self::fail(&portal, &admission, StatusCode::UNAUTHORIZED, LOGIN_FAILED)
            }
        }
    }

    pub async fn change_password(
        form: web::Form<ChangePasswordForm>,
        admission: Admission,
        api: web::Data<Self>,
        portal: web::Data<Portal>,
        clock: web::Data<dyn Clock>,
    ) -> impl Responder {
        debug!("change_password() called");

        if admission.page != Page::ChangePassword {
            return redirect(admission.page);
        }
        if form.validate().is_err() {
            return Self::fail(&portal, &admission, StatusCode::BAD_REQUEST, INVALID_INPUT);
        }

        let result = portal.with_owner(admission.identity.as_ref(), clock.now_ms(), |state| {
            state.change_password(&form.old, &form.new)
        });

        match result {
            None => redirect(admission.requested),
            Some(Ok(persist)) => {
                api.persist_then_redirect(&[persist], Page::Device, "change_password")
            }
            Some(Err(e)) => {
                error!("change_password failed: {e}");
                let message = match e {
                    PortalError::InvalidNewPassword => Self::password_hint(&portal),
                    _ => "Old password is incorrect".to_string(),
                };
                Self::fail(&portal, &admission, StatusCode::BAD_REQUEST, message)
            }
        }
    }

    pub async fn update_device(
        form: web::Form<DeviceForm>,
        admission: Admission,
        api: web::Data<Self>,
        portal: web::Data<Portal>,
        clock: web::Data<dyn Clock>,
    ) -> impl Responder {
        debug!("update_device() called");

        if admission.page != Page::Device {
            return redirect(admission.page);
        }
        if form.validate().is_err() {
            return Self::fail(&portal, &admission, StatusCode::BAD_REQUEST, INVALID_INPUT);
        }

        let timeout = match form.timeout.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(minutes) => match minutes.parse::<u32>() {
                Ok(minutes) => Some(minutes),
                Err(_) => {
                    let message = "Timeout must be a number of minutes";
                    return Self::fail(&portal, &admission, StatusCode::BAD_REQUEST, message);
                }
            },
        };

        let result = portal.with_owner(admission.identity.as_ref(), clock.now_ms(), |state| {
            let mut changes = vec![state.set_ssid(form.ssid.trim())?];
            if let Some(minutes) = timeout {
                changes.push(state.set_inactivity_timeout_minutes(minutes));
            }
            Ok::<_, PortalError>(changes)
        });

        match result {
            None => redirect(admission.requested),
            Some(Ok(changes)) => {
                api.persist_then_redirect(&changes, Page::Main, "update_device")
            }
            Some(Err(e)) => {
                error!("update_device failed: {e}");
                Self::fail(&portal, &admission, StatusCode::BAD_REQUEST, e.to_string())
            }
        }
    }

    pub async fn logout(
        admission: Admission,
        session: Session,
        portal: web::Data<Portal>,
        clock: web::Data<dyn Clock>,
    ) -> impl Responder {
        debug!("logout() called");

        if portal
            .with_owner(admission.identity.as_ref(), clock.now_ms(), |state| {
                state.clear_session()
            })
            .is_some()
        {
            info!("admin logged out");
        }

        session.purge();
        redirect(Page::Auth)
    }

    fn persist_then_redirect(
        &self,
        changes: &[Persist],
        target: Page,
        handler: &str,
    ) -> HttpResponse {
        for persist in changes {
            if let Err(e) = self.store.save(persist) {
                error!("{handler} failed to persist {}: {e:#}", persist.key());
                return HttpResponse::InternalServerError().body("failed to store settings");
            }
        }
        redirect(target)
    }

    fn password_hint(portal: &Portal) -> String {
        let min = portal.with(|state| state.min_password_length());
        format!("Password must be at least {min} characters")
    }

    fn fail(
        portal: &Portal,
        admission: &Admission,
        status: StatusCode,
        message: impl Into<String>,
    ) -> HttpResponse {
        Self::render(portal, admission, status, Some(message.into()))
    }

    fn render(
        portal: &Portal,
        admission: &Admission,
        status: StatusCode,
        message: Option<String>,
    ) -> HttpResponse {
        let view = portal.with(|state| PageView::new(state, admission, message));
        HttpResponse::build(status).json(view)
    }
}

fn redirect(page: Page) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, page.route()))
        .finish()
}
