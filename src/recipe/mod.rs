// src/recipe/mod.rs

//! Recipe text handling
//!
//! Recipes are line-oriented build descriptions living at
//! `<recipe_dir>/meta.yaml`. Dependencies appear as list items:
//!
//! ```yaml
//! requirements:
//!   host:
//!     - python
//!     - numpy >=1.20
//! ```
//!
//! and the build counter as either `number: N` or a templating variable.
//! Everything here is plain text rewriting; nothing parses the YAML.

mod build_number;

pub use build_number::{update_build_number, BuildNumber, BuildNumberPatcher, BuildPattern};

use crate::error::{Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the recipe file inside a recipe directory
pub const RECIPE_FILE: &str = "meta.yaml";

/// Path of the recipe file for a recipe directory
pub fn recipe_path(recipe_dir: &Path) -> PathBuf {
    recipe_dir.join(RECIPE_FILE)
}

/// Read a recipe file
pub fn read_recipe(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read recipe {}: {}", path.display(), e)))
}

/// Overwrite a recipe file in place
pub fn write_recipe(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .map_err(|e| Error::IoError(format!("Failed to write recipe {}: {}", path.display(), e)))
}

/// Rewrite the build counter of a recipe file in place
pub fn set_build_number(path: &Path, new_number: BuildNumber) -> Result<()> {
    let raw = read_recipe(path)?;
    let patched = update_build_number(&raw, new_number);
    write_recipe(path, &patched)
}

/// Matches dependency list items naming one package
#[derive(Debug, Clone)]
pub struct DependencyMatcher {
    pattern: Regex,
}

impl DependencyMatcher {
    /// Matcher for list items `- <package>` with an optional constraint
    pub fn new(package: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"^\s*-\s*({})(\s+|$)", regex::escape(package)))?;
        Ok(Self { pattern })
    }

    /// Replace the package token on every matching line
    ///
    /// Returns `None` when no line declares the package.
    pub fn rename(&self, raw: &str, new_name: &str) -> Option<String> {
        let mut changed = 0usize;
        let lines: Vec<String> = raw
            .lines()
            .map(|line| match self.pattern.captures(line).and_then(|c| c.get(1)) {
                Some(token) => {
                    changed += 1;
                    format!("{}{}{}", &line[..token.start()], new_name, &line[token.end()..])
                }
                None => line.to_string(),
            })
            .collect();

        if changed == 0 {
            return None;
        }
        debug!("renamed {} dependency lines to {}", changed, new_name);

        let mut out = lines.join("\n");
        out.push('\n');
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_keeps_constraint() {
        let matcher = DependencyMatcher::new("numpy").unwrap();
        let raw = "requirements:\n  host:\n    - python\n    - numpy >=1.20\n";
        assert_eq!(
            matcher.rename(raw, "numpy-base").unwrap(),
            "requirements:\n  host:\n    - python\n    - numpy-base >=1.20\n"
        );
    }

    #[test]
    fn test_rename_ignores_prefixed_names() {
        let matcher = DependencyMatcher::new("numpy").unwrap();
        let raw = "  - numpy-base\n  - numpydoc\n  # numpy is great\n";
        assert!(matcher.rename(raw, "numpy-base").is_none());
    }

    #[test]
    fn test_rename_bare_item() {
        let matcher = DependencyMatcher::new("pyqt").unwrap();
        assert_eq!(matcher.rename("  -pyqt", "pyside").unwrap(), "  -pyside\n");
    }

    #[test]
    fn test_package_names_are_escaped() {
        let matcher = DependencyMatcher::new("c++-lib").unwrap();
        assert!(matcher.rename("  - c++-lib 1.0\n", "cxx-lib").is_some());
        assert!(matcher.rename("  - cc-lib 1.0\n", "cxx-lib").is_none());
    }

    #[test]
    fn test_set_build_number_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = recipe_path(dir.path());
        std::fs::write(&path, "build:\n  number: 2\n").unwrap();

        set_build_number(&path, BuildNumber::default()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "build:\n  number: 3\n");
    }

    #[test]
    fn test_missing_recipe_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = set_build_number(&recipe_path(dir.path()), BuildNumber::default()).unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }
}
