//! Levels shipped with the crate.

use std::path::{Path, PathBuf};

use sackworks_core::level::LevelDescriptor;

use crate::loader::{Format, LevelLoadError, parse_level, validate_level};

/// (file name, format, contents) of every bundled level.
pub const BUNDLED: &[(&str, Format, &str)] = &[
    (
        "first_light.ron",
        Format::Ron,
        include_str!("../levels/first_light.ron"),
    ),
    (
        "mirror_twins.toml",
        Format::Toml,
        include_str!("../levels/mirror_twins.toml"),
    ),
    (
        "mixing_room.json",
        Format::Json,
        include_str!("../levels/mixing_room.json"),
    ),
];

/// Directory holding the bundled level files.
pub fn levels_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("levels")
}

/// Parse and validate every bundled level, in file-name order.
pub fn bundled_levels() -> Result<Vec<LevelDescriptor>, LevelLoadError> {
    BUNDLED
        .iter()
        .map(|&(file, format, content)| {
            let path = Path::new(file);
            let level = parse_level(content, format, path)?;
            validate_level(&level, path)?;
            Ok(level)
        })
        .collect()
}

/// One bundled level by name.
pub fn bundled_level(name: &str) -> Result<Option<LevelDescriptor>, LevelLoadError> {
    Ok(bundled_levels()?.into_iter().find(|l| l.name == name))
}
