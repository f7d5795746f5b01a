//! # Core Module
//!
//! Configuration and process-wide runtime state shared by every subsystem
//! of the scene pipeline.

pub mod config;
pub mod runtime;

pub use config::{Config, ConfigError, SceneConfig, ShadowConfig, ViewConfig};
pub use runtime::SceneRuntime;
