//! Web front end and command line for the European lobbying tracker.

pub mod cli;
pub mod config;
pub mod error;
pub mod render;
pub mod rest;

pub use error::{WebError, WebResult};
pub use rest::{router, serve, AppState};
