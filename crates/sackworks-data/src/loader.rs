//! Reading level files: format detection, parsing, validation.
//!
//! A level is accepted only if it parses and a simulation can be built from
//! it, so every configuration error surfaces here with the file it came
//! from, before any tick runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sackworks_core::engine::Simulation;
use sackworks_core::error::ConfigError;
use sackworks_core::level::LevelDescriptor;

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum LevelLoadError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The level parsed but describes an impossible factory.
    #[error("invalid level in {file}: {source}")]
    Invalid {
        file: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported level file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, LevelLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(LevelLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

/// Look for `{name}.ron`, `{name}.toml` and `{name}.json` in `dir`.
///
/// Returns `Ok(None)` if none exists and `ConflictingFormats` if more than
/// one does.
pub fn find_level_file(dir: &Path, name: &str) -> Result<Option<PathBuf>, LevelLoadError> {
    let mut found: Option<PathBuf> = None;
    for format in [Format::Ron, Format::Toml, Format::Json] {
        let candidate = dir.join(format!("{name}.{}", format.extension()));
        if candidate.exists() {
            if let Some(existing) = &found {
                return Err(LevelLoadError::ConflictingFormats {
                    a: existing.clone(),
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }
    Ok(found)
}

// ===========================================================================
// Parsing
// ===========================================================================

/// Parse level text. `file` is only used for error messages.
pub fn parse_level(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<LevelDescriptor, LevelLoadError> {
    let parse_err = |detail: String| LevelLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_err(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
    }
}

/// Check that a simulation can be built from `level`.
pub fn validate_level(level: &LevelDescriptor, file: &Path) -> Result<(), LevelLoadError> {
    Simulation::from_level(level)
        .map(|_| ())
        .map_err(|source| LevelLoadError::Invalid {
            file: file.to_path_buf(),
            source,
        })
}

/// Read, parse and validate one level file.
pub fn load_level(path: &Path) -> Result<LevelDescriptor, LevelLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let level = parse_level(&content, format, path)?;
    validate_level(&level, path)?;
    log::info!(
        "loaded level '{}' from {} ({} components)",
        level.name,
        path.display(),
        level.components.len()
    );
    Ok(level)
}

/// Load every level file in `dir`, ordered by file name.
///
/// Files with other extensions are skipped. Two files sharing a base name
/// are a conflict.
pub fn load_levels_dir(dir: &Path) -> Result<Vec<LevelDescriptor>, LevelLoadError> {
    let mut by_stem: BTreeMap<String, PathBuf> = BTreeMap::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if detect_format(&path).is_err() {
            log::debug!("skipping {}", path.display());
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if let Some(existing) = by_stem.get(&stem) {
            // Report the pair in a stable order.
            let (a, b) = if *existing < path {
                (existing.clone(), path)
            } else {
                (path, existing.clone())
            };
            return Err(LevelLoadError::ConflictingFormats { a, b });
        }
        by_stem.insert(stem, path);
    }
    by_stem.values().map(|path| load_level(path)).collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sackworks_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    const TINY_JSON: &str = r#"{
        "name": "tiny",
        "grid": {"width": 2, "height": 1},
        "colors": ["red", "blue"],
        "components": [
            {"id": "s", "position": {"x": 0, "y": 0}, "kind": {"sack": {"direction": "east", "count": 2}}},
            {"id": "bin", "position": {"x": 1, "y": 0}, "kind": "collection_point"}
        ],
        "hypotheses": {"sources": [
            {"source": "s", "alternatives": [
                {"label": "red", "weights": {"red": 1.0}},
                {"label": "blue", "weights": {"blue": 1.0}}
            ]}
        ]}
    }"#;

    // -----------------------------------------------------------------------
    // detect_format
    // -----------------------------------------------------------------------

    #[test]
    fn detect_known_formats() {
        assert_eq!(detect_format(Path::new("a.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("a.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("a.json")).unwrap(), Format::Json);
    }

    #[test]
    fn detect_format_unsupported() {
        assert!(matches!(
            detect_format(Path::new("a.yaml")),
            Err(LevelLoadError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            detect_format(Path::new("a")),
            Err(LevelLoadError::UnsupportedFormat { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // parse / validate
    // -----------------------------------------------------------------------

    #[test]
    fn parse_json_level() {
        let level = parse_level(TINY_JSON, Format::Json, Path::new("tiny.json")).unwrap();
        assert_eq!(level.name, "tiny");
        assert_eq!(level.components.len(), 2);
        validate_level(&level, Path::new("tiny.json")).unwrap();
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = parse_level("{", Format::Json, Path::new("broken.json")).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn invalid_level_names_the_file() {
        let mut level = parse_level(TINY_JSON, Format::Json, Path::new("tiny.json")).unwrap();
        level.components.pop();
        let err = validate_level(&level, Path::new("tiny.json")).unwrap_err();
        assert!(matches!(
            err,
            LevelLoadError::Invalid {
                source: ConfigError::UnresolvedPort { .. },
                ..
            }
        ));
        assert!(err.to_string().contains("tiny.json"));
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    #[test]
    fn load_from_disk() {
        let dir = make_test_dir("load");
        fs::write(dir.join("tiny.json"), TINY_JSON).unwrap();
        fs::write(dir.join("notes.txt"), "not a level").unwrap();

        let level = load_level(&dir.join("tiny.json")).unwrap();
        assert_eq!(level.name, "tiny");
        let all = load_levels_dir(&dir).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(find_level_file(&dir, "tiny").unwrap(), Some(dir.join("tiny.json")));
        assert_eq!(find_level_file(&dir, "other").unwrap(), None);

        cleanup(&dir);
    }

    #[test]
    fn conflicting_formats() {
        let dir = make_test_dir("conflict");
        fs::write(dir.join("tiny.json"), TINY_JSON).unwrap();
        fs::write(dir.join("tiny.ron"), "()").unwrap();

        assert!(matches!(
            find_level_file(&dir, "tiny"),
            Err(LevelLoadError::ConflictingFormats { .. })
        ));
        assert!(matches!(
            load_levels_dir(&dir),
            Err(LevelLoadError::ConflictingFormats { .. })
        ));

        cleanup(&dir);
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_level(Path::new("/nonexistent/level.ron")),
            Err(LevelLoadError::Io(_))
        ));
    }
}
