use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How history search interprets the current line content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Entry must start with the typed text
    Prefix,
    /// Typed text may occur anywhere in the entry
    Substring,
    /// Typed text is a regular expression
    Regex,
}

/// One user key binding, as it appears in the config file
///
/// `sequence` is a comma-separated list of elements; each element is either
/// literal text (with `\e`, `\xNN`, `\uNNNN`, `\cX` escapes) or a
/// `:capability-name` token resolved against the terminal capability layer.
/// `action` is an internal function name (e.g. `go-home`) or an expansion
/// string; an expansion ending in `@` stays editable after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSpec {
    pub context: String,
    pub sequence: String,
    pub action: String,
}

/// Main configuration structure for the line editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MleConfig {
    /// Timeout between bytes of a single terminal escape sequence
    #[serde(default = "default_interbyte_timeout_ms")]
    pub interbyte_timeout_ms: u64,

    /// Timeout between distinct keys of a chorded binding
    #[serde(default = "default_interkey_timeout_ms")]
    pub interkey_timeout_ms: u64,

    /// Maximum number of retained history entries
    #[serde(default = "default_history_max")]
    pub history_max: usize,

    /// History file location; `None` leaves persistence to the caller
    #[serde(default)]
    pub history_file: Option<PathBuf>,

    /// Whether auto-logged ("gabby") entries are written on save
    #[serde(default = "default_true")]
    pub history_save_gabby: bool,

    /// History search interpretation of the typed text
    #[serde(default = "default_search_mode")]
    pub search_mode: SearchMode,

    /// Case sensitivity of history search
    #[serde(default = "default_false")]
    pub search_case_sensitive: bool,

    /// Re-quote completion results so they round-trip through the shell lexer
    #[serde(default = "default_true")]
    pub quote_round_trip: bool,

    /// Ceiling on line length, in cells; edits beyond it are rejected
    #[serde(default = "default_line_limit")]
    pub line_limit: usize,

    /// Audible bell on rejected operations
    #[serde(default = "default_true")]
    pub bell: bool,

    /// Report defunct bindings (unknown capability, bad expansion)
    #[serde(default = "default_false")]
    pub verbose: bool,

    /// When false, only the built-in control-key table is consulted and no
    /// binding trie is built (the reduced editor configuration)
    #[serde(default = "default_true")]
    pub bindings_enabled: bool,

    /// User key bindings, applied on top of the defaults
    #[serde(default)]
    pub bindings: Vec<BindingSpec>,
}

fn default_interbyte_timeout_ms() -> u64 {
    200
}

fn default_interkey_timeout_ms() -> u64 {
    1000
}

fn default_history_max() -> usize {
    1000
}

fn default_search_mode() -> SearchMode {
    SearchMode::Prefix
}

fn default_line_limit() -> usize {
    4096
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

impl Default for MleConfig {
    fn default() -> Self {
        Self {
            interbyte_timeout_ms: default_interbyte_timeout_ms(),
            interkey_timeout_ms: default_interkey_timeout_ms(),
            history_max: default_history_max(),
            history_file: None,
            history_save_gabby: default_true(),
            search_mode: default_search_mode(),
            search_case_sensitive: default_false(),
            quote_round_trip: default_true(),
            line_limit: default_line_limit(),
            bell: default_true(),
            verbose: default_false(),
            bindings_enabled: default_true(),
            bindings: Vec::new(),
        }
    }
}

impl MleConfig {
    /// Timeout applied while waiting for further bytes of one escape sequence
    pub fn interbyte_timeout(&self) -> Duration {
        Duration::from_millis(self.interbyte_timeout_ms)
    }

    /// Timeout applied while waiting for the next key of a chorded sequence
    pub fn interkey_timeout(&self) -> Duration {
        Duration::from_millis(self.interkey_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MleConfig::default();
        assert!(config.bindings_enabled);
        assert_eq!(config.history_max, 1000);
        assert_eq!(config.search_mode, SearchMode::Prefix);
        assert!(config.interbyte_timeout() < config.interkey_timeout());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: MleConfig = serde_json::from_str(
            r#"{
                "history_max": 2,
                "search_mode": "regex",
                "bindings": [
                    {"context": "base", "sequence": "\\x01", "action": "go-home"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.history_max, 2);
        assert_eq!(config.search_mode, SearchMode::Regex);
        assert_eq!(config.bindings.len(), 1);
        // Everything else takes its default
        assert_eq!(config.line_limit, 4096);
        assert!(config.quote_round_trip);
    }

    #[test]
    fn test_round_trip() {
        let config = MleConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: MleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.history_max, config.history_max);
        assert_eq!(back.search_mode, config.search_mode);
    }
}
