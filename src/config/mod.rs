//! Configuration module for the subtitle pipeline.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each pipeline
//! stage, `AppPaths` for cross-platform data directories, and TOML
//! persistence via `AppConfig::load` / `AppConfig::save`.  All settings are
//! hot-reloadable at runtime through
//! [`crate::pipeline::ControlCommand::Reconfigure`].

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, BackendConfig, BackendProvider, ContextConfig, FilterConfig,
    HubConfig, StabilizerConfig, TranscribeTask, WindowerConfig, WindowingMode,
};
