// src/recipe/build_number.rs

//! Build-number rewriting
//!
//! Recipes declare their build counter either as a plain key
//! (`number: 3`) or as a templating variable
//! (`{% set build_number = "3" %}`). The patcher tries an ordered list of
//! rules; the first rule that matches anywhere in the text rewrites every
//! occurrence it matches, and later rules are not consulted.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::debug;

/// One counter declaration form and how to write it back
#[derive(Debug, Clone)]
pub struct BuildPattern {
    /// Must capture leading whitespace as group 1 and the counter as group 2
    regex: Regex,
    /// Replacement text; `{}` is substituted with the new counter
    template: String,
}

impl BuildPattern {
    pub fn new(regex: Regex, template: &str) -> Self {
        Self {
            regex,
            template: template.to_string(),
        }
    }

    fn render(&self, value: u64) -> String {
        self.template.replace("{}", &value.to_string())
    }
}

static DEFAULT_PATTERNS: LazyLock<Vec<BuildPattern>> = LazyLock::new(|| {
    vec![
        BuildPattern::new(
            Regex::new(r"(\s*?)number:\s*([0-9]+)").unwrap(),
            "number: {}",
        ),
        BuildPattern::new(
            Regex::new(r#"(\s*?)\{%\s*set build_number\s*=\s*"?([0-9]+)"?\s*%\}"#).unwrap(),
            "{% set build_number = {} %}",
        ),
        BuildPattern::new(
            Regex::new(r#"(\s*?)\{%\s*set build\s*=\s*"?([0-9]+)"?\s*%\}"#).unwrap(),
            "{% set build = {} %}",
        ),
    ]
});

/// How the new counter is derived from the old one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildNumber {
    /// Set the counter to this value
    Exact(u64),
    /// Add this increment to the old value
    Bump(u64),
}

impl Default for BuildNumber {
    fn default() -> Self {
        BuildNumber::Bump(1)
    }
}

impl BuildNumber {
    pub fn apply(self, old: u64) -> u64 {
        match self {
            BuildNumber::Exact(value) => value,
            BuildNumber::Bump(increment) => old.saturating_add(increment),
        }
    }
}

/// Rewrites the build counter of recipe text
#[derive(Debug, Clone)]
pub struct BuildNumberPatcher {
    patterns: Vec<BuildPattern>,
}

impl Default for BuildNumberPatcher {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.clone(),
        }
    }
}

impl BuildNumberPatcher {
    /// Rewrite the counter, returning `None` when no rule matches
    pub fn patch(&self, raw: &str, new_number: BuildNumber) -> Option<String> {
        let pattern = self.patterns.iter().find(|p| p.regex.is_match(raw))?;

        let patched = pattern.regex.replace_all(raw, |caps: &Captures| {
            let Ok(old) = caps[2].parse::<u64>() else {
                debug!("build number {} out of range, left as is", &caps[2]);
                return caps[0].to_string();
            };
            let new = new_number.apply(old);
            debug!("build number {} -> {}", old, new);
            format!("{}{}", &caps[1], pattern.render(new))
        });
        Some(patched.into_owned())
    }
}

/// Rewrite the counter with the default rules; unmatched text is returned as is
pub fn update_build_number(raw: &str, new_number: BuildNumber) -> String {
    match BuildNumberPatcher::default().patch(raw, new_number) {
        Some(patched) => patched,
        None => {
            debug!("no build number declaration found");
            raw.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_key_bump() {
        let raw = "build:\n  number: 0\n";
        assert_eq!(
            update_build_number(raw, BuildNumber::default()),
            "build:\n  number: 1\n"
        );
    }

    #[test]
    fn test_templated_quoted_counter() {
        let raw = "{% set build_number = \"3\" %}\n";
        assert_eq!(
            update_build_number(raw, BuildNumber::default()),
            "{% set build_number = 4 %}\n"
        );
    }

    #[test]
    fn test_short_template_form() {
        let raw = "{%set build=7%}\npackage:\n  name: foo\n";
        assert_eq!(
            update_build_number(raw, BuildNumber::Bump(2)),
            "{% set build = 9 %}\npackage:\n  name: foo\n"
        );
    }

    #[test]
    fn test_exact_value() {
        let raw = "build:\n  number: 12\n";
        assert_eq!(
            update_build_number(raw, BuildNumber::Exact(0)),
            "build:\n  number: 0\n"
        );
    }

    #[test]
    fn test_zero_increment_rewrites_in_place() {
        let raw = "build:\n  number:   5\n";
        assert_eq!(
            update_build_number(raw, BuildNumber::Bump(0)),
            "build:\n  number: 5\n"
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let raw = "{% set build = 2 %}\nbuild:\n  number: 4\n";
        let patched = update_build_number(raw, BuildNumber::default());
        assert_eq!(patched, "{% set build = 2 %}\nbuild:\n  number: 5\n");
    }

    #[test]
    fn test_templated_reference_is_not_a_match() {
        let raw = "{% set build_number = 1 %}\nbuild:\n  number: {{ build_number }}\n";
        let patched = update_build_number(raw, BuildNumber::default());
        assert_eq!(
            patched,
            "{% set build_number = 2 %}\nbuild:\n  number: {{ build_number }}\n"
        );
    }

    #[test]
    fn test_out_of_range_counter_left_alone() {
        let raw = "build:\n  number: 99999999999999999999999\n";
        assert_eq!(update_build_number(raw, BuildNumber::default()), raw);
    }

    #[test]
    fn test_no_declaration() {
        let raw = "package:\n  name: foo\n";
        assert!(BuildNumberPatcher::default().patch(raw, BuildNumber::default()).is_none());
        assert_eq!(update_build_number(raw, BuildNumber::default()), raw);
    }
}
