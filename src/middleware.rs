use crate::{
    clock::Clock,
    config::IdentityMode,
    portal::{Admission, Identity, Page, Portal},
    services::token::new_session_token,
};
use actix_session::SessionExt;
use actix_web::{
    Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
    body::EitherBody,
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::{Method, header},
    web::Data,
};
use anyhow::Result;
use log::{debug, error};
use std::{
    future::{Future, Ready, ready},
    pin::Pin,
    rc::Rc,
};

pub const SESSION_TOKEN_KEY: &str = "token";

/// Runs every page request through [`Portal::admit`]
///
/// The resulting [`Admission`] is available to handlers as an extractor.
/// `GET` requests for a page other than the resolved one are redirected.
pub struct AdmissionMw {
    mode: IdentityMode,
}

impl AdmissionMw {
    pub fn new(mode: IdentityMode) -> Self {
        Self { mode }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdmissionMw
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AdmissionMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdmissionMiddleware {
            service: Rc::new(service),
            mode: self.mode,
        }))
    }
}

pub struct AdmissionMiddleware<S> {
    service: Rc<S>,
    mode: IdentityMode,
}

type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T> + 'static>>;

impl<S, B> Service<ServiceRequest> for AdmissionMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let mode = self.mode;

        Box::pin(async move {
            let (Some(portal), Some(clock)) = (
                req.app_data::<Data<Portal>>().cloned(),
                req.app_data::<Data<dyn Clock>>().cloned(),
            ) else {
                error!("admission failed: portal state is not registered");
                return Ok(respond(req, HttpResponse::InternalServerError().finish()));
            };

            let requested = Page::from_path(req.path());
            let presented = presented_identity(&req, mode);
            let address = presented.clone().filter(Identity::is_address);

            let admission = portal.admit(presented, requested, clock.now_ms(), || match mode {
                IdentityMode::Token => new_session_token().ok(),
                IdentityMode::Address => address,
            });

            debug!(
                "admission for {}: status={:?} page={:?}",
                req.path(),
                admission.status,
                admission.page
            );

            if mode == IdentityMode::Token {
                update_session_token(&req, &admission);
            }

            if *req.method() == Method::GET && admission.page != requested {
                let location = admission.page.route();
                return Ok(respond(
                    req,
                    HttpResponse::SeeOther()
                        .insert_header((header::LOCATION, location))
                        .finish(),
                ));
            }

            req.extensions_mut().insert(admission);
            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

impl FromRequest for Admission {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(req.extensions().get::<Admission>().cloned().ok_or_else(|| {
            error!("admission missing for {}", req.path());
            actix_web::error::ErrorInternalServerError("admission missing")
        }))
    }
}

fn presented_identity(req: &ServiceRequest, mode: IdentityMode) -> Option<Identity> {
    match mode {
        IdentityMode::Token => match req.get_session().get::<String>(SESSION_TOKEN_KEY) {
            Ok(token) => token.and_then(|token| Identity::token(token).ok()),
            Err(e) => {
                error!("failed to get session. {e:#}");
                None
            }
        },
        IdentityMode::Address => req
            .peer_addr()
            .and_then(|addr| Identity::address(addr.ip().to_string()).ok()),
    }
}

fn update_session_token(req: &ServiceRequest, admission: &Admission) {
    let session = req.get_session();

    if let Some(issued) = &admission.issued {
        if let Err(e) = session.insert(SESSION_TOKEN_KEY, issued.as_str()) {
            error!("failed to insert token into session. {e:#}");
        }
    } else if admission.revoked {
        session.remove(SESSION_TOKEN_KEY);
    }
}

fn respond<B>(req: ServiceRequest, res: HttpResponse) -> ServiceResponse<EitherBody<B>> {
    let (http_req, _) = req.into_parts();
    ServiceResponse::new(http_req, res).map_into_right_body()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::{DeviceAdminState, credentials::DEFAULT_MIN_PASSWORD_LENGTH};
    use actix_http::StatusCode;
    use actix_session::{SessionMiddleware, storage::CookieSessionStore};
    use actix_web::{App, Responder, cookie::Key, test, web};
    use std::sync::Arc;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0
        }
    }

    async fn echo(admission: Admission) -> impl Responder {
        HttpResponse::Ok().body(format!("{:?}", admission.page))
    }

    fn portal_with_password() -> Portal {
        let mut state = DeviceAdminState::new(60_000, DEFAULT_MIN_PASSWORD_LENGTH);
        let _ = state.set_password("strongpass").expect("valid password");
        Portal::new(state)
    }

    macro_rules! app {
        ($portal:expr, $mode:expr) => {
            test::init_service(
                App::new()
                    .app_data(Data::new($portal))
                    .app_data(Data::from(Arc::new(FixedClock(1)) as Arc<dyn Clock>))
                    .service(
                        web::scope("")
                            .wrap(AdmissionMw::new($mode))
                            .route("/enroll", web::get().to(echo))
                            .route("/auth", web::get().to(echo))
                            .route("/auth", web::post().to(echo))
                            .route("/main", web::get().to(echo)),
                    )
                    .wrap(
                        SessionMiddleware::builder(
                            CookieSessionStore::default(),
                            Key::generate(),
                        )
                        .cookie_secure(false)
                        .build(),
                    ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn first_visit_is_redirected_to_enrollment_with_cookie() {
        let portal = Portal::new(DeviceAdminState::new(60_000, DEFAULT_MIN_PASSWORD_LENGTH));
        let app = app!(portal.clone(), IdentityMode::Token);

        let req = test::TestRequest::get().uri("/main").to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
            Some("/enroll")
        );
        assert!(res.response().cookies().next().is_some());
        assert!(portal.with(|s| s.session().is_some()));
    }

    #[actix_web::test]
    async fn matching_page_reaches_handler() {
        let app = app!(portal_with_password(), IdentityMode::Token);

        let req = test::TestRequest::get().uri("/auth").to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(test::read_body(res).await, "Auth");
    }

    #[actix_web::test]
    async fn posts_are_not_redirected() {
        let app = app!(portal_with_password(), IdentityMode::Token);

        let req = test::TestRequest::post().uri("/auth").to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn address_mode_uses_peer_address() {
        let portal = portal_with_password();
        let app = app!(portal.clone(), IdentityMode::Address);

        let req = test::TestRequest::get()
            .uri("/auth")
            .peer_addr("192.168.4.2:50000".parse().expect("socket address"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.response().cookies().next().is_none());

        let holder = portal.with(|s| s.session().map(|s| s.identity().clone()));
        assert_eq!(
            holder,
            Some(Identity::address("192.168.4.2").expect("valid address"))
        );

        let req = test::TestRequest::get()
            .uri("/main")
            .peer_addr("192.168.4.3:50000".parse().expect("socket address"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
            Some("/busy")
        );
    }

    #[actix_web::test]
    async fn missing_state_is_an_internal_error() {
        let app = test::init_service(
            App::new().service(
                web::scope("")
                    .wrap(AdmissionMw::new(IdentityMode::Address))
                    .route("/main", web::get().to(echo)),
            ),
        )
        .await;

        let req = test::TestRequest::get().uri("/main").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
