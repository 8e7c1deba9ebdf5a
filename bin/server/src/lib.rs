//! portcullis HTTP service.
//!
//! This crate wires the access and session crates into an Axum service:
//! login against the configured identity provider, the callback that turns
//! a provider code into the application's own bearer tokens, refresh, and
//! the bearer-guarded `/auth` routes.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
