//! Configuration layering
//!
//! Implements the 3-layer configuration merge:
//! 1. Built-in defaults
//! 2. Config file (TOML, optional)
//! 3. CLI overrides

mod defaults;
mod effective;
mod merge;

pub use defaults::{CoordinatorConfig, RpcConfig};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
