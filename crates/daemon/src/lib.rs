//! Institute backend daemon: HTTP API over the embedded database, owner
//! authentication and the monthly backup pipeline.

pub mod api;
pub mod auth;
pub mod backup;
pub mod config;
pub mod db;
pub mod mailer;
