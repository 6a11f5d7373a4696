//! Core domain + application logic for the Telegram rename bot.
//!
//! This crate is framework-agnostic. The Bot API and MTProto clients live
//! behind ports (traits) implemented in adapter crates.

pub mod command;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod progress;
pub mod rename;
pub mod security;
pub mod session;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
