//! App-store screenshot service
//!
//! Accepts app-store URLs, fetches screenshots for the app in the background,
//! packages them into a ZIP archive and serves the archive back to the owner,
//! all behind plan-based quotas.

pub mod app_state;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
