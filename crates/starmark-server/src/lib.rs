//! Starmark server library - HTTP API for chat favorites.
//!
//! Routes, configuration and application state live here so integration
//! tests can build the router without starting a listener.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;
