//! Core domain + application logic for the smart-home device bot.
//!
//! This crate is intentionally framework-agnostic. The DataBase API and Telegram
//! live behind ports (traits) implemented in adapter crates.

pub mod access;
pub mod actions;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod locks;
pub mod logging;
pub mod ownership;
pub mod ports;
pub mod reconcile;
pub mod registry;
pub mod store;

pub use errors::{Error, Result};
