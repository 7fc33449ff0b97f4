//! Prelude module - commonly used types for convenient import.

pub use crate::error::{ConfigError, ConfigResult};
pub use crate::loader::{load, load_from_str};
pub use crate::safe_mode::SafeModeLoader;
pub use crate::types::Config;
