//! ppstage Core
//!
//! Core types, error definitions and configuration shared by the engine,
//! task and CLI crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
