//! Persistent, deduplicated command history
//!
//! Entries are kept oldest to youngest. Re-entering a known line moves it
//! to the youngest slot instead of duplicating it. Each entry remembers the
//! context it was entered under and whether it was flagged gabby (noisy,
//! kept in memory but not worth persisting by default).

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use indexmap::IndexMap;

use crate::bindings::MleContext;
use crate::config::SearchMode;
use crate::error::MleError;

/// First line of a history file; unknown versions are rejected
const FILE_MARKER: &str = "@mle-history-v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub context: MleContext,
    pub gabby: bool,
}

/// In-memory history ring with MRU dedup
#[derive(Debug)]
pub struct History {
    /// Insertion order is age: index 0 is the oldest entry
    entries: IndexMap<String, HistoryEntry>,
    max: usize,
    /// Navigation position, youngest-relative; `None` means off-history
    nav: Option<usize>,
}

impl History {
    pub fn new(max: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            max: max.max(1),
            nav: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a line as the youngest entry, deduplicating and evicting
    pub fn add(&mut self, line: &str, context: MleContext, gabby: bool) {
        if line.is_empty() {
            return;
        }
        // A re-entered line keeps its slot's flags fresh and moves to MRU
        self.entries.shift_remove(line);
        self.entries
            .insert(line.to_string(), HistoryEntry { context, gabby });
        while self.entries.len() > self.max {
            self.entries.shift_remove_index(0);
        }
        self.nav = None;
    }

    /// Iterate youngest first
    pub fn iter_recent(&self) -> impl Iterator<Item = (&str, &HistoryEntry)> {
        self.entries.iter().rev().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether an entry recorded under `entry_ctx` is visible from `ctx`.
    /// Compose sees everything; the base context skips compose entries.
    fn visible(ctx: MleContext, entry_ctx: MleContext) -> bool {
        match ctx {
            MleContext::Compose => true,
            MleContext::Base => entry_ctx == MleContext::Base,
        }
    }

    /// Reset the navigation position to off-history
    pub fn nav_reset(&mut self) {
        self.nav = None;
    }

    pub fn is_navigating(&self) -> bool {
        self.nav.is_some()
    }

    /// Step to the next older visible entry
    pub fn nav_older(&mut self, ctx: MleContext) -> Option<&str> {
        let mut idx = match self.nav {
            None => 0,
            Some(i) => i + 1,
        };
        let count = self.entries.len();
        while idx < count {
            let (line, entry) = self.entries.get_index(count - 1 - idx)?;
            if Self::visible(ctx, entry.context) {
                self.nav = Some(idx);
                return Some(line.as_str());
            }
            idx += 1;
        }
        None
    }

    /// Step to the next younger visible entry. `None` means the walk left
    /// the youngest end of history.
    pub fn nav_newer(&mut self, ctx: MleContext) -> Option<&str> {
        let mut idx = self.nav?;
        let count = self.entries.len();
        loop {
            if idx == 0 {
                self.nav = None;
                return None;
            }
            idx -= 1;
            let (line, entry) = self.entries.get_index(count - 1 - idx)?;
            if Self::visible(ctx, entry.context) {
                self.nav = Some(idx);
                return Some(line.as_str());
            }
        }
    }

    /// Search older entries for one matching `pattern`, starting just past
    /// the current navigation position
    pub fn search_older(
        &mut self,
        ctx: MleContext,
        pattern: &str,
        mode: SearchMode,
        case_sensitive: bool,
    ) -> Option<&str> {
        let start = match self.nav {
            None => 0,
            Some(i) => i + 1,
        };
        self.search_from(ctx, pattern, mode, case_sensitive, start, true)
    }

    /// Search younger entries for one matching `pattern`
    pub fn search_newer(
        &mut self,
        ctx: MleContext,
        pattern: &str,
        mode: SearchMode,
        case_sensitive: bool,
    ) -> Option<&str> {
        let start = self.nav?;
        if start == 0 {
            return None;
        }
        self.search_from(ctx, pattern, mode, case_sensitive, start - 1, false)
    }

    fn search_from(
        &mut self,
        ctx: MleContext,
        pattern: &str,
        mode: SearchMode,
        case_sensitive: bool,
        start: usize,
        older: bool,
    ) -> Option<&str> {
        let matcher = Matcher::compile(pattern, mode, case_sensitive)?;
        let count = self.entries.len();
        let mut idx = start;
        loop {
            if idx >= count {
                return None;
            }
            let (line, entry) = self.entries.get_index(count - 1 - idx)?;
            if Self::visible(ctx, entry.context) && matcher.matches(line) {
                self.nav = Some(idx);
                return Some(line.as_str());
            }
            if older {
                idx += 1;
            } else {
                if idx == 0 {
                    return None;
                }
                idx -= 1;
            }
        }
    }

    /// Load from `path`, replacing the current contents. A malformed file
    /// leaves the in-memory history untouched.
    pub fn load(&mut self, path: &Path) -> Result<(), MleError> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(MleError::History {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let mut lines = text.lines();
        match lines.next() {
            Some(FILE_MARKER) => {}
            _ => {
                return Err(MleError::History {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::InvalidData, "unrecognized history format"),
                })
            }
        }
        let mut loaded: IndexMap<String, HistoryEntry> = IndexMap::new();
        for line in lines {
            let Some(entry) = parse_line(line) else {
                tracing::warn!(?line, "skipping malformed history line");
                continue;
            };
            let (content, meta) = entry;
            loaded.shift_remove(content);
            loaded.insert(content.to_string(), meta);
        }
        while loaded.len() > self.max {
            loaded.shift_remove_index(0);
        }
        self.entries = loaded;
        self.nav = None;
        Ok(())
    }

    /// Write to `path`, oldest first. Gabby entries are dropped unless
    /// `save_gabby` is set.
    pub fn save(&self, path: &Path, save_gabby: bool) -> Result<(), MleError> {
        let wrap = |e: io::Error| MleError::History {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        let mut out = Vec::new();
        writeln!(out, "{FILE_MARKER}").map_err(wrap)?;
        for (line, entry) in &self.entries {
            if entry.gabby && !save_gabby {
                continue;
            }
            let ctx = match entry.context {
                MleContext::Base => 'd',
                MleContext::Compose => 'c',
            };
            let flag = if entry.gabby { '*' } else { ' ' };
            writeln!(out, "{ctx}{flag} {line}").map_err(wrap)?;
        }
        fs::write(path, out).map_err(wrap)
    }
}

/// One `<context><gabby-flag><space><content>` line
fn parse_line(line: &str) -> Option<(&str, HistoryEntry)> {
    let mut chars = line.chars();
    let context = match chars.next()? {
        'd' => MleContext::Base,
        'c' => MleContext::Compose,
        _ => return None,
    };
    let gabby = match chars.next()? {
        '*' => true,
        ' ' => false,
        _ => return None,
    };
    let rest = chars.as_str();
    let content = rest.strip_prefix(' ')?;
    if content.is_empty() {
        return None;
    }
    Some((content, HistoryEntry { context, gabby }))
}

enum Matcher {
    Prefix { pattern: String, fold: bool },
    Substring { pattern: String, fold: bool },
    Regex(regex::Regex),
}

impl Matcher {
    fn compile(pattern: &str, mode: SearchMode, case_sensitive: bool) -> Option<Self> {
        let fold = !case_sensitive;
        let folded = if fold {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };
        match mode {
            SearchMode::Regex => {
                let re = regex::RegexBuilder::new(pattern)
                    .case_insensitive(fold)
                    .build();
                match re {
                    Ok(re) => Some(Matcher::Regex(re)),
                    Err(e) => {
                        tracing::debug!(%pattern, error = %e, "bad history search pattern");
                        None
                    }
                }
            }
            SearchMode::Prefix => Some(Matcher::Prefix { pattern: folded, fold }),
            SearchMode::Substring => Some(Matcher::Substring { pattern: folded, fold }),
        }
    }

    fn matches(&self, line: &str) -> bool {
        match self {
            Matcher::Prefix { pattern, fold: true } => {
                line.to_lowercase().starts_with(pattern.as_str())
            }
            Matcher::Prefix { pattern, fold: false } => line.starts_with(pattern.as_str()),
            Matcher::Substring { pattern, fold: true } => {
                line.to_lowercase().contains(pattern.as_str())
            }
            Matcher::Substring { pattern, fold: false } => line.contains(pattern.as_str()),
            Matcher::Regex(re) => re.is_match(line),
        }
    }
}
