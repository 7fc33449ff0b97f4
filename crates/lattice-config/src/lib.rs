//! Lattice Config - Typed configuration for the control plane.
//!
//! Configuration is layered: embedded defaults, then an optional TOML file
//! overlay, then environment fallbacks. Every section defaults to working
//! production values so a bare `[section]` header yields a valid config.
//!
//! The [`SafeModeLoader`] wraps loading with retry and a last-known-good
//! snapshot: when a reload fails repeatedly the previous validated config
//! stays in force and safe mode is flagged until the next good load.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

mod error;
mod loader;
mod safe_mode;
mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_from_str};
pub use safe_mode::SafeModeLoader;
pub use types::{
    AgpSection, AimdSection, BudgetSection, CircuitSection, Config, DampeningSection,
    DemoteSection, FrameSection, HeartbeatSection, LoggingSection, PreemptSection, PromoteSection,
    QosSchedulerSection, QosSection, RlhSection, SafeModeSection, WatermarkSection,
    WindowUpdateSection,
};
pub use validate::validate;
