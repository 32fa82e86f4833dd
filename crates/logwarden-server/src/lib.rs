//! HTTP surface and process wiring for logwarden: configuration, request
//! logging, the JSON API over the log store, and the runtime that ties the
//! batch assembler and alert scheduler to one shutdown signal.

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod runtime;
pub mod state;
