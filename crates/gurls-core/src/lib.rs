//! Core domain + application logic for the GURLS Telegram bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the gRPC
//! shortening service live behind ports (traits) implemented in adapter crates.

pub mod backend;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod outcome;
pub mod router;
pub mod utils;

pub use errors::{Error, Result};
