//! Configuration for the tiermover daemon.
//!
//! Loading resolves a config path (explicit, `TIERMOVER_CONFIG_PATH`, or the
//! Unraid default), parses JSON or TOML, writes a defaults file when none
//! exists, applies `JELLYFIN_URL` / `JELLYFIN_API_KEY` from the environment
//! and finally runs the guard rails in [`validation`].

#![allow(missing_docs)]

pub mod error;
pub mod loader;
pub mod models;
pub mod validation;

pub use error::ConfigLoadError;
pub use loader::{
    CONFIG_PATH_ENV, ConfigLoad, ConfigLoader, ConfigSource,
    DEFAULT_CONFIG_PATH, JELLYFIN_API_KEY_ENV, JELLYFIN_URL_ENV,
};
pub use models::MoverConfig;
pub use validation::{
    ConfigGuardRailError, ConfigWarning, ConfigWarnings, apply_guard_rails,
};
