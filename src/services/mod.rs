//! Services the HTTP layer builds on
//!
//! Everything here is independent of actix and can be tested on its own.

pub mod settings;
pub mod token;
