//! Missing value detection for raw cell values

use serde::{Deserialize, Serialize};

/// Text cells that read as "no value"
///
/// JSON `null` and absent keys are always missing; these tokens extend
/// that to textual placeholders such as `N/A` in loaded CSV files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullConfig {
    pub patterns: Vec<String>,
    pub trim_whitespace: bool,
    pub case_sensitive: bool,
}

const DEFAULT_TOKENS: [&str; 6] = ["", "N/A", "NA", "NaN", "null", "None"];

impl Default for NullConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_TOKENS.iter().map(|t| t.to_string()).collect(),
            trim_whitespace: true,
            case_sensitive: false,
        }
    }
}

impl NullConfig {
    /// Whether a text cell stands for a missing value
    pub fn is_missing(&self, cell: &str) -> bool {
        let cell = if self.trim_whitespace { cell.trim() } else { cell };
        self.patterns.iter().any(|token| match self.case_sensitive {
            true => cell == token,
            false => cell.eq_ignore_ascii_case(token),
        })
    }

    /// Additional placeholder tokens, skipping ones already known
    pub fn with_tokens<S: Into<String>>(mut self, tokens: impl IntoIterator<Item = S>) -> Self {
        for token in tokens {
            let token = token.into();
            if !self.patterns.contains(&token) {
                self.patterns.push(token);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tokens() {
        let config = NullConfig::default();
        assert!(config.is_missing(""));
        assert!(config.is_missing("  n/a "));
        assert!(config.is_missing("NULL"));
        assert!(!config.is_missing("0"));
        assert!(!config.is_missing("-"));
    }

    #[test]
    fn test_extra_tokens_and_case() {
        let config = NullConfig {
            case_sensitive: true,
            ..NullConfig::default()
        }
        .with_tokens(["-", "null"]);
        assert!(config.is_missing("-"));
        assert!(config.is_missing("null"));
        assert!(!config.is_missing("NULL"));
        assert_eq!(config.patterns.iter().filter(|p| *p == "null").count(), 1);
    }
}
