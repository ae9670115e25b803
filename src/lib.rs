pub mod api;
pub mod clock;
pub mod config;
pub mod middleware;
pub mod portal;
pub mod services;
