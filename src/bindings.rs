//! Key bindings: canonical sequences mapped to editor functions or expansions
//!
//! A binding sequence is a comma-separated list of elements; each element is
//! literal text (escape processed) or a `:capability-name` token resolved
//! against the terminal capability layer, at bind time or lazily at session
//! start. Bindings that cannot be resolved are marked defunct and skipped at
//! trie-build time; they are reported (in verbose mode) but never fatal.

use crate::config::BindingSpec;
use crate::term::Capabilities;

/// Editing context a binding or history entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MleContext {
    /// Normal command-line input
    Base,
    /// Message-composition input
    Compose,
}

impl MleContext {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "base" | "default" => Some(MleContext::Base),
            "compose" => Some(MleContext::Compose),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MleContext::Base => "base",
            MleContext::Compose => "compose",
        }
    }
}

/// Internal editing functions reachable from bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MleFn {
    Bell,
    GoLeft,
    GoRight,
    GoHome,
    GoEnd,
    GoWordBwd,
    GoWordFwd,
    DelBwd,
    DelFwd,
    SnarfEnd,
    SnarfLine,
    SnarfWordBwd,
    SnarfWordFwd,
    Paste,
    HistBwd,
    HistFwd,
    HistSrchBwd,
    HistSrchFwd,
    Complete,
    QuoteNext,
    Cancel,
    ClearScreen,
    Commit,
    Eof,
}

impl MleFn {
    /// Parse a function name as used in binding specifications
    pub fn from_name(s: &str) -> Option<MleFn> {
        match s {
            "bell" => Some(MleFn::Bell),
            "go-bwd" => Some(MleFn::GoLeft),
            "go-fwd" => Some(MleFn::GoRight),
            "go-home" => Some(MleFn::GoHome),
            "go-end" => Some(MleFn::GoEnd),
            "go-word-bwd" => Some(MleFn::GoWordBwd),
            "go-word-fwd" => Some(MleFn::GoWordFwd),
            "del-bwd" => Some(MleFn::DelBwd),
            "del-fwd" => Some(MleFn::DelFwd),
            "snarf-end" => Some(MleFn::SnarfEnd),
            "snarf-line" => Some(MleFn::SnarfLine),
            "snarf-word-bwd" => Some(MleFn::SnarfWordBwd),
            "snarf-word-fwd" => Some(MleFn::SnarfWordFwd),
            "paste" => Some(MleFn::Paste),
            "hist-bwd" => Some(MleFn::HistBwd),
            "hist-fwd" => Some(MleFn::HistFwd),
            "hist-srch-bwd" => Some(MleFn::HistSrchBwd),
            "hist-srch-fwd" => Some(MleFn::HistSrchFwd),
            "complete" => Some(MleFn::Complete),
            "quote-next" => Some(MleFn::QuoteNext),
            "cancel" => Some(MleFn::Cancel),
            "clear-screen" => Some(MleFn::ClearScreen),
            "commit" => Some(MleFn::Commit),
            "eof" => Some(MleFn::Eof),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MleFn::Bell => "bell",
            MleFn::GoLeft => "go-bwd",
            MleFn::GoRight => "go-fwd",
            MleFn::GoHome => "go-home",
            MleFn::GoEnd => "go-end",
            MleFn::GoWordBwd => "go-word-bwd",
            MleFn::GoWordFwd => "go-word-fwd",
            MleFn::DelBwd => "del-bwd",
            MleFn::DelFwd => "del-fwd",
            MleFn::SnarfEnd => "snarf-end",
            MleFn::SnarfLine => "snarf-line",
            MleFn::SnarfWordBwd => "snarf-word-bwd",
            MleFn::SnarfWordFwd => "snarf-word-fwd",
            MleFn::Paste => "paste",
            MleFn::HistBwd => "hist-bwd",
            MleFn::HistFwd => "hist-fwd",
            MleFn::HistSrchBwd => "hist-srch-bwd",
            MleFn::HistSrchFwd => "hist-srch-fwd",
            MleFn::Complete => "complete",
            MleFn::QuoteNext => "quote-next",
            MleFn::Cancel => "cancel",
            MleFn::ClearScreen => "clear-screen",
            MleFn::Commit => "commit",
            MleFn::Eof => "eof",
        }
    }
}

/// One element of a binding sequence
#[derive(Debug, Clone)]
pub enum Token {
    Char(char),
    Capability {
        name: String,
        resolved: Option<Vec<u8>>,
    },
}

impl PartialEq for Token {
    /// Resolution state is ignored; sequences compare by shape
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Token::Char(a), Token::Char(b)) => a == b,
            (Token::Capability { name: a, .. }, Token::Capability { name: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// What a resolved binding does
#[derive(Debug, Clone, PartialEq)]
pub enum BindingPayload {
    Func(MleFn),
    Expansion { text: String, editable: bool },
}

/// One canonical key sequence mapped to exactly one payload
#[derive(Debug, Clone)]
pub struct BindingEntry {
    pub context: MleContext,
    pub tokens: Vec<Token>,
    pub payload: BindingPayload,
    /// Capability or Unicode unavailable; skipped at trie build
    pub defunct: bool,
    /// Has unresolved capability tokens
    pub needs_resolution: bool,
}

/// The flat binding list the trie is built from
#[derive(Debug)]
pub struct BindingTable {
    entries: Vec<BindingEntry>,
    dirty: bool,
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl BindingTable {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            dirty: true,
        }
    }

    /// Table pre-seeded with the stock escape-sequence bindings
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        for ctx in [MleContext::Base, MleContext::Compose] {
            for (seq, func) in DEFAULT_BINDINGS {
                table.push_default(ctx, seq, *func);
            }
        }
        table
    }

    fn push_default(&mut self, context: MleContext, seq: &str, func: MleFn) {
        // Default sequences contain no capabilities, parsing cannot fail
        if let Ok(tokens) = parse_sequence(seq) {
            self.entries.push(BindingEntry {
                context,
                tokens,
                payload: BindingPayload::Func(func),
                defunct: false,
                needs_resolution: false,
            });
        }
    }

    pub fn entries(&self) -> &[BindingEntry] {
        &self.entries
    }

    /// True once the trie cache must be rebuilt; cleared by the caller
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Install one binding, replacing any previous one for the same sequence
    pub fn bind(&mut self, spec: &BindingSpec, caps: &dyn Capabilities) -> Result<(), String> {
        let context = MleContext::from_name(&spec.context)
            .ok_or_else(|| format!("unknown context {:?}", spec.context))?;
        let mut tokens = parse_sequence(&spec.sequence)?;
        if tokens.is_empty() {
            return Err("empty key sequence".to_string());
        }

        let mut defunct = false;
        let mut needs_resolution = false;
        for token in &mut tokens {
            if let Token::Capability { name, resolved } = token {
                match caps.resolve(name) {
                    Some(bytes) if bytes.is_ascii() => *resolved = Some(bytes),
                    Some(_) | None => {
                        tracing::warn!(capability = %name, "binding defunct: capability unavailable");
                        defunct = true;
                        needs_resolution = true;
                    }
                }
            }
        }

        let payload = parse_action(&spec.action);
        if let BindingPayload::Expansion { text, .. } = &payload {
            if text.is_empty() {
                tracing::warn!(sequence = %spec.sequence, "binding defunct: empty expansion");
                defunct = true;
            }
        }

        let entry = BindingEntry {
            context,
            tokens,
            payload,
            defunct,
            needs_resolution,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.context == context && e.tokens == entry.tokens)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self.dirty = true;
        Ok(())
    }

    /// Remove a binding; true when something was removed
    pub fn unbind(&mut self, context: MleContext, sequence: &str) -> Result<bool, String> {
        let tokens = parse_sequence(sequence)?;
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.context == context && e.tokens == tokens));
        let removed = self.entries.len() != before;
        if removed {
            self.dirty = true;
        }
        Ok(removed)
    }

    /// Resolve still-pending capability tokens, e.g. lazily at session start
    pub fn resolve_capabilities(&mut self, caps: &dyn Capabilities) {
        for entry in &mut self.entries {
            if !entry.needs_resolution {
                continue;
            }
            entry.needs_resolution = false;
            entry.defunct = false;
            for token in &mut entry.tokens {
                if let Token::Capability { name, resolved } = token {
                    if resolved.is_none() {
                        match caps.resolve(name) {
                            Some(bytes) if bytes.is_ascii() => *resolved = Some(bytes),
                            Some(_) | None => {
                                entry.defunct = true;
                                entry.needs_resolution = true;
                            }
                        }
                    }
                }
            }
        }
        self.dirty = true;
    }

    /// Number of live (non-defunct) entries for a context
    pub fn live_count(&self, context: MleContext) -> usize {
        self.entries
            .iter()
            .filter(|e| e.context == context && !e.defunct)
            .count()
    }
}

/// Stock bindings covering the common ANSI/VT cursor sequences
const DEFAULT_BINDINGS: &[(&str, MleFn)] = &[
    ("\\e[A", MleFn::HistBwd),
    ("\\eOA", MleFn::HistBwd),
    ("\\e[B", MleFn::HistFwd),
    ("\\eOB", MleFn::HistFwd),
    ("\\e[C", MleFn::GoRight),
    ("\\eOC", MleFn::GoRight),
    ("\\e[D", MleFn::GoLeft),
    ("\\eOD", MleFn::GoLeft),
    ("\\e[H", MleFn::GoHome),
    ("\\eOH", MleFn::GoHome),
    ("\\e[1~", MleFn::GoHome),
    ("\\e[F", MleFn::GoEnd),
    ("\\eOF", MleFn::GoEnd),
    ("\\e[4~", MleFn::GoEnd),
    ("\\e[3~", MleFn::DelFwd),
    ("\\eb", MleFn::GoWordBwd),
    ("\\ef", MleFn::GoWordFwd),
    ("\\ed", MleFn::SnarfWordFwd),
    ("\\e\\x7f", MleFn::SnarfWordBwd),
];

/// Parse a comma-separated key sequence into tokens
pub fn parse_sequence(s: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    for element in s.split(',') {
        let element = element.trim();
        if element.is_empty() {
            continue;
        }
        if let Some(name) = element.strip_prefix(':') {
            if name.is_empty() {
                return Err("empty capability name".to_string());
            }
            tokens.push(Token::Capability {
                name: name.to_string(),
                resolved: None,
            });
        } else {
            for ch in unescape(element)?.chars() {
                tokens.push(Token::Char(ch));
            }
        }
    }
    Ok(tokens)
}

/// Parse an action: a known function name, otherwise an expansion string.
/// A trailing unescaped `@` marks the expansion as still editable.
pub fn parse_action(s: &str) -> BindingPayload {
    if let Some(func) = MleFn::from_name(s) {
        return BindingPayload::Func(func);
    }
    let (raw, editable) = match s.strip_suffix('@') {
        Some(stripped) if !stripped.ends_with('\\') => (stripped, true),
        _ => (s, false),
    };
    let text = unescape(raw).unwrap_or_else(|_| raw.to_string());
    BindingPayload::Expansion { text, editable }
}

/// Process backslash escapes: `\e \t \n \r \a \\ \xNN \uNNNN \cX`
pub fn unescape(s: &str) -> Result<String, String> {
    let mut out = String::new();
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('e') => out.push('\u{1b}'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\u{7}'),
            Some('\\') => out.push('\\'),
            Some('@') => out.push('@'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                let code =
                    u8::from_str_radix(&hex, 16).map_err(|_| format!("bad \\x escape in {s:?}"))?;
                out.push(code as char);
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| format!("bad \\u escape in {s:?}"))?;
                out.push(char::from_u32(code).ok_or_else(|| format!("bad \\u escape in {s:?}"))?);
            }
            Some('c') => {
                let c = chars.next().ok_or_else(|| format!("bad \\c escape in {s:?}"))?;
                out.push(((c.to_ascii_uppercase() as u8) & 0x1f) as char);
            }
            other => return Err(format!("bad escape {other:?} in {s:?}")),
        }
    }
    Ok(out)
}

/// The fixed control-key table consulted when bindings are disabled, and as
/// the fallback for single characters no trie binding claims
pub fn builtin_lookup(_context: MleContext, ch: char) -> Option<MleFn> {
    match ch {
        '\u{01}' => Some(MleFn::GoHome),
        '\u{02}' => Some(MleFn::GoLeft),
        '\u{04}' => Some(MleFn::DelFwd),
        '\u{05}' => Some(MleFn::GoEnd),
        '\u{06}' => Some(MleFn::GoRight),
        '\u{07}' => Some(MleFn::Cancel),
        '\u{08}' => Some(MleFn::DelBwd),
        '\t' => Some(MleFn::Complete),
        '\n' | '\r' => Some(MleFn::Commit),
        '\u{0b}' => Some(MleFn::SnarfEnd),
        '\u{0c}' => Some(MleFn::ClearScreen),
        '\u{0e}' => Some(MleFn::HistFwd),
        '\u{10}' => Some(MleFn::HistBwd),
        '\u{12}' => Some(MleFn::HistSrchBwd),
        '\u{13}' => Some(MleFn::HistSrchFwd),
        '\u{15}' => Some(MleFn::SnarfLine),
        '\u{16}' => Some(MleFn::QuoteNext),
        '\u{17}' => Some(MleFn::SnarfWordBwd),
        '\u{19}' => Some(MleFn::Paste),
        '\u{7f}' => Some(MleFn::DelBwd),
        _ => None,
    }
}

/// One-byte overrides that win over an in-progress, not-yet-terminal
/// sequence: cancel and the literal-next prefix
pub fn shortcut_lookup(_context: MleContext, ch: char) -> Option<MleFn> {
    match ch {
        '\u{07}' => Some(MleFn::Cancel),
        '\u{16}' => Some(MleFn::QuoteNext),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::NoCapabilities;

    fn spec(context: &str, sequence: &str, action: &str) -> BindingSpec {
        BindingSpec {
            context: context.to_string(),
            sequence: sequence.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("abc").unwrap(), "abc");
        assert_eq!(unescape("\\e[A").unwrap(), "\u{1b}[A");
        assert_eq!(unescape("\\x01").unwrap(), "\u{1}");
        assert_eq!(unescape("\\u00e9").unwrap(), "é");
        assert_eq!(unescape("\\cA").unwrap(), "\u{1}");
        assert!(unescape("\\q").is_err());
    }

    #[test]
    fn test_parse_sequence_literals_and_caps() {
        let tokens = parse_sequence("\\e,:kl,x").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], Token::Char('\u{1b}'));
        assert!(matches!(&tokens[1], Token::Capability { name, .. } if name == "kl"));
        assert_eq!(tokens[2], Token::Char('x'));
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("go-home"), BindingPayload::Func(MleFn::GoHome));
        assert_eq!(
            parse_action("File reply"),
            BindingPayload::Expansion {
                text: "File reply".to_string(),
                editable: false
            }
        );
        assert_eq!(
            parse_action("mail @"),
            BindingPayload::Expansion {
                text: "mail ".to_string(),
                editable: true
            }
        );
    }

    #[test]
    fn test_bind_replaces_same_sequence() {
        let mut table = BindingTable::empty();
        table
            .bind(&spec("base", "\\x01", "go-home"), &NoCapabilities)
            .unwrap();
        table
            .bind(&spec("base", "\\x01", "go-end"), &NoCapabilities)
            .unwrap();
        assert_eq!(table.entries().len(), 1);
        assert_eq!(
            table.entries()[0].payload,
            BindingPayload::Func(MleFn::GoEnd)
        );
    }

    #[test]
    fn test_unknown_capability_is_defunct_not_fatal() {
        let mut table = BindingTable::empty();
        table
            .bind(&spec("base", ":no-such-cap", "go-home"), &NoCapabilities)
            .unwrap();
        assert!(table.entries()[0].defunct);
        assert_eq!(table.live_count(MleContext::Base), 0);
    }

    #[test]
    fn test_empty_expansion_is_defunct() {
        let mut table = BindingTable::empty();
        table
            .bind(&spec("base", "q", ""), &NoCapabilities)
            .unwrap();
        assert!(table.entries()[0].defunct);
    }

    #[test]
    fn test_lazy_resolution_revives_binding() {
        struct OneCap;
        impl Capabilities for OneCap {
            fn resolve(&self, name: &str) -> Option<Vec<u8>> {
                (name == "kl").then(|| b"\x1b[D".to_vec())
            }
        }
        let mut table = BindingTable::empty();
        table
            .bind(&spec("base", ":kl", "go-bwd"), &NoCapabilities)
            .unwrap();
        assert!(table.entries()[0].defunct);
        table.resolve_capabilities(&OneCap);
        assert!(!table.entries()[0].defunct);
        assert_eq!(table.live_count(MleContext::Base), 1);
    }

    #[test]
    fn test_unbind() {
        let mut table = BindingTable::empty();
        table
            .bind(&spec("base", "\\x01", "go-home"), &NoCapabilities)
            .unwrap();
        assert!(table.unbind(MleContext::Base, "\\x01").unwrap());
        assert!(table.entries().is_empty());
        assert!(!table.unbind(MleContext::Base, "\\x01").unwrap());
    }

    #[test]
    fn test_defaults_cover_both_contexts() {
        let table = BindingTable::with_defaults();
        assert!(table.live_count(MleContext::Base) > 0);
        assert_eq!(
            table.live_count(MleContext::Base),
            table.live_count(MleContext::Compose)
        );
    }

    #[test]
    fn test_builtin_table() {
        assert_eq!(
            builtin_lookup(MleContext::Base, '\u{01}'),
            Some(MleFn::GoHome)
        );
        assert_eq!(builtin_lookup(MleContext::Base, '\r'), Some(MleFn::Commit));
        assert_eq!(builtin_lookup(MleContext::Base, 'a'), None);
    }
}
