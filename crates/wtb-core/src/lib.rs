//! Core domain + application logic for the Webling membership bot.
//!
//! This crate is intentionally transport-agnostic. Telegram, Webling and SMTP
//! live behind ports (traits) implemented in adapter crates; the shared HTTP
//! request client and its retry policy live here so both API adapters use the
//! same outbound layer.

pub mod command;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod http;
pub mod logging;
pub mod ports;
pub mod retry;
pub mod security;

pub use errors::{Error, Result};
