use actix_session::{
    SessionMiddleware,
    config::{BrowserSession, CookieContentSecurity},
    storage::CookieSessionStore,
};
use actix_web::{
    App, HttpServer,
    cookie::{Key, SameSite},
    dev::ServerHandle,
    web::{self, Data},
};
use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use std::{io::Write, sync::Arc};
use tapgate_portal::{
    api::Api,
    clock::{Clock, MonotonicClock},
    config::AppConfig,
    middleware::AdmissionMw,
    portal::{DeviceAdminState, Page, Portal},
    services::settings::{FileSettingsStore, SettingsStore},
};
use tokio::signal::unix::{SignalKind, signal};

type PortalApi = Api<FileSettingsStore>;

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::load().context("failed to load configuration")?;
    let store = FileSettingsStore::new(&config.paths.settings_file);
    let settings = store.load().context("failed to load settings")?;
    let state = DeviceAdminState::from_settings(&settings, &config.portal.defaults);

    info!(
        "ssid: {}, password defined: {}, identity mode: {:?}",
        state.ssid(),
        state.password_defined(),
        config.portal.identity_mode
    );

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let (server_handle, server_task) = run_server(&config, store, Portal::new(state))?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            debug!("ctrl-c received");
        },
        _ = sigterm.recv() => {
            debug!("SIGTERM received");
        },
        result = server_task => {
            match result {
                Ok(Ok(())) => debug!("server stopped normally"),
                Ok(Err(e)) => error!("server stopped with error: {e}"),
                Err(e) => error!("server task panicked: {e}"),
            }
        },
    }

    info!("shutting down");
    server_handle.stop(true).await;

    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

fn run_server(
    config: &AppConfig,
    store: FileSettingsStore,
    portal: Portal,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    let api = PortalApi::new(store).context("failed to create api")?;
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let identity_mode = config.portal.identity_mode;
    let ui_port = config.ui.port;
    let session_key = Key::generate();

    let server = HttpServer::new(move || {
        let mut pages = web::scope("")
            .wrap(AdmissionMw::new(identity_mode))
            .route("/", web::get().to(PortalApi::page));
        for page in Page::ALL {
            pages = pages.route(page.route(), web::get().to(PortalApi::page));
        }
        let pages = pages
            .route(Page::Enroll.route(), web::post().to(PortalApi::enroll))
            .route(Page::Auth.route(), web::post().to(PortalApi::login))
            .route(
                Page::ChangePassword.route(),
                web::post().to(PortalApi::change_password),
            )
            .route(Page::Device.route(), web::post().to(PortalApi::update_device))
            .route("/logout", web::post().to(PortalApi::logout));

        App::new()
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), session_key.clone())
                    .cookie_name(String::from("tapgate-session"))
                    .cookie_secure(false)
                    .session_lifecycle(BrowserSession::default())
                    .cookie_same_site(SameSite::Strict)
                    .cookie_content_security(CookieContentSecurity::Private)
                    .cookie_http_only(true)
                    .build(),
            )
            .app_data(Data::new(api.clone()))
            .app_data(Data::new(portal.clone()))
            .app_data(Data::from(clock.clone()))
            .route("/version", web::get().to(PortalApi::version))
            .service(pages)
    })
    .bind(format!("0.0.0.0:{ui_port}"))
    .context("failed to bind server")?
    .disable_signals()
    .run();

    Ok((server.handle(), tokio::spawn(server)))
}
