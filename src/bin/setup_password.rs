//! CLI tool to set the admin password for development/testing
//!
//! Usage: cargo run --bin setup-password -- <password>

use std::env;
use tapgate_portal::{
    config::AppConfig,
    portal::CredentialStore,
    services::settings::{FileSettingsStore, SettingsStore},
};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <password>", args[0]);
        std::process::exit(1);
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    let mut credentials = CredentialStore::new(config.portal.defaults.min_password_length);
    let persist = match credentials.set_password(&args[1]) {
        Ok(persist) => persist,
        Err(e) => {
            eprintln!(
                "Rejected password: {e} (at least {} characters)",
                credentials.min_password_length()
            );
            std::process::exit(1);
        }
    };

    let store = FileSettingsStore::new(&config.paths.settings_file);
    match store.save(&persist) {
        Ok(()) => {
            println!("Password stored in {}", store.path().display());
        }
        Err(e) => {
            eprintln!("Failed to store password: {e:#}");
            std::process::exit(1);
        }
    }
}
