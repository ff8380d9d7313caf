//! Level files for Sackworks.
//!
//! Levels are plain [`LevelDescriptor`](sackworks_core::level::LevelDescriptor)
//! documents in RON, JSON or TOML. The core never touches the filesystem;
//! this crate reads, parses and validates level files and ships a few
//! bundled levels.

pub mod bundled;
pub mod loader;

pub use bundled::bundled_levels;
pub use loader::{Format, LevelLoadError, load_level, load_levels_dir, parse_level};
