//! Prefix tree over key-sequence tokens
//!
//! Nodes live in an arena indexed by position; the tree is rebuilt from the
//! flat binding list whenever the table reports itself dirty. Capability
//! tokens are expanded into their resolved byte sequences at build time, with
//! the bytes inside one capability classified as inter-byte continuations
//! (one terminal escape emits them back to back) and token boundaries as
//! inter-key continuations (a human presses the next key).

use crate::bindings::{BindingTable, MleContext, Token};

/// Which timeout applies while waiting for the sequence to continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Bytes of a single terminal escape; the short timeout
    InterByte,
    /// Distinct keys of a chorded binding; the long timeout
    InterKey,
}

#[derive(Debug)]
struct Node {
    ch: char,
    children: Vec<usize>,
    /// Index into the binding table when a sequence ends here
    binding: Option<usize>,
    /// Timeout class to apply while deferred at this node
    wait: TimeoutClass,
}

/// In-progress descent; reset to the root set on resolution or failure
#[derive(Debug, Default, Clone, Copy)]
pub struct TrieCursor {
    node: Option<usize>,
}

/// Outcome of consuming one character during descent
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// No binding continues with this character
    NoMatch,
    /// Sequence may continue; defer with the given timeout. `terminal` is
    /// the binding completed so far, committed if the timeout expires.
    Pending {
        terminal: Option<usize>,
        wait: TimeoutClass,
    },
    /// Unambiguous end of a binding
    Terminal(usize),
}

#[derive(Debug, Default)]
pub struct BindingTrie {
    nodes: Vec<Node>,
    roots: Vec<usize>,
}

impl BindingTrie {
    /// Build the trie for one context from the table's live entries
    pub fn build(table: &BindingTable, context: MleContext) -> Self {
        let mut trie = Self::default();
        for (idx, entry) in table.entries().iter().enumerate() {
            if entry.context != context || entry.defunct {
                continue;
            }
            let Some(seq) = expand_tokens(&entry.tokens) else {
                continue;
            };
            trie.insert(&seq, idx);
        }
        trie
    }

    fn insert(&mut self, seq: &[(char, TimeoutClass)], binding: usize) {
        let mut current: Option<usize> = None;
        for &(ch, class) in seq {
            let children = match current {
                None => &self.roots,
                Some(i) => &self.nodes[i].children,
            };
            let found = children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].ch == ch);
            let child = match found {
                Some(c) => c,
                None => {
                    let c = self.nodes.len();
                    self.nodes.push(Node {
                        ch,
                        children: Vec::new(),
                        binding: None,
                        wait: TimeoutClass::InterByte,
                    });
                    match current {
                        None => self.roots.push(c),
                        Some(i) => self.nodes[i].children.push(c),
                    }
                    c
                }
            };
            // The parent waits at least as long as its slowest child needs
            if class == TimeoutClass::InterKey {
                if let Some(i) = current {
                    self.nodes[i].wait = TimeoutClass::InterKey;
                }
            }
            current = Some(child);
        }
        if let Some(last) = current {
            // Later binds shadow earlier ones for the same sequence
            self.nodes[last].binding = Some(binding);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Advance the cursor by one character
    pub fn step(&self, cursor: &mut TrieCursor, ch: char) -> Step {
        let children = match cursor.node {
            None => &self.roots,
            Some(i) => &self.nodes[i].children,
        };
        let Some(next) = children.iter().copied().find(|&c| self.nodes[c].ch == ch) else {
            cursor.node = None;
            return Step::NoMatch;
        };
        let node = &self.nodes[next];
        if node.children.is_empty() {
            cursor.node = None;
            match node.binding {
                Some(b) => Step::Terminal(b),
                // A leaf without a binding cannot be built; treat as failure
                None => Step::NoMatch,
            }
        } else {
            cursor.node = Some(next);
            Step::Pending {
                terminal: node.binding,
                wait: node.wait,
            }
        }
    }

    /// True when a binding ends at `path` but longer bindings continue
    /// through it, so resolution there must defer behind a timeout
    #[cfg(test)]
    fn node_needs_timeout(&self, path: &str) -> Option<bool> {
        let mut last: Option<usize> = None;
        for ch in path.chars() {
            let children = match last {
                None => &self.roots,
                Some(i) => &self.nodes[i].children,
            };
            let next = children.iter().copied().find(|&c| self.nodes[c].ch == ch)?;
            last = Some(next);
        }
        last.map(|i| self.nodes[i].binding.is_some() && !self.nodes[i].children.is_empty())
    }
}

/// Flatten tokens into characters tagged with their continuation class.
/// Returns `None` when a capability is unresolved (entry should have been
/// marked defunct) or resolved to non-character bytes.
fn expand_tokens(tokens: &[Token]) -> Option<Vec<(char, TimeoutClass)>> {
    let mut seq = Vec::new();
    for token in tokens {
        match token {
            Token::Char(ch) => seq.push((*ch, TimeoutClass::InterKey)),
            Token::Capability { resolved, .. } => {
                let bytes = resolved.as_ref()?;
                if !bytes.is_ascii() {
                    return None;
                }
                for (i, &b) in bytes.iter().enumerate() {
                    let class = if i == 0 {
                        TimeoutClass::InterKey
                    } else {
                        TimeoutClass::InterByte
                    };
                    seq.push((b as char, class));
                }
            }
        }
    }
    Some(seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{BindingPayload, BindingTable, MleFn};
    use crate::config::BindingSpec;
    use crate::term::{Capabilities, NoCapabilities};

    fn table_with(specs: &[(&str, &str)]) -> BindingTable {
        let mut table = BindingTable::empty();
        for (seq, action) in specs {
            table
                .bind(
                    &BindingSpec {
                        context: "base".to_string(),
                        sequence: seq.to_string(),
                        action: action.to_string(),
                    },
                    &NoCapabilities,
                )
                .unwrap();
        }
        table
    }

    fn walk(trie: &BindingTrie, input: &str) -> Vec<Step> {
        let mut cursor = TrieCursor::default();
        input.chars().map(|c| trie.step(&mut cursor, c)).collect()
    }

    #[test]
    fn test_single_char_binding_is_terminal() {
        let table = table_with(&[("\\x01", "go-home")]);
        let trie = BindingTrie::build(&table, MleContext::Base);
        let steps = walk(&trie, "\u{1}");
        assert_eq!(steps, vec![Step::Terminal(0)]);
    }

    #[test]
    fn test_escape_sequence_descent() {
        let table = table_with(&[("\\e[A", "hist-bwd")]);
        let trie = BindingTrie::build(&table, MleContext::Base);
        let steps = walk(&trie, "\u{1b}[A");
        assert!(matches!(steps[0], Step::Pending { terminal: None, .. }));
        assert!(matches!(steps[1], Step::Pending { terminal: None, .. }));
        assert_eq!(steps[2], Step::Terminal(0));
    }

    #[test]
    fn test_no_match_resets_cursor() {
        let table = table_with(&[("\\e[A", "hist-bwd")]);
        let trie = BindingTrie::build(&table, MleContext::Base);
        let mut cursor = TrieCursor::default();
        trie.step(&mut cursor, '\u{1b}');
        assert_eq!(trie.step(&mut cursor, 'x'), Step::NoMatch);
        // Cursor is back at the root: the escape prefix matches again
        assert!(matches!(
            trie.step(&mut cursor, '\u{1b}'),
            Step::Pending { .. }
        ));
    }

    #[test]
    fn test_prefix_binding_needs_timeout() {
        // "ab" is complete, "abc" continues: the 'b' node must defer
        let table = table_with(&[("ab", "go-home"), ("abc", "go-end")]);
        let trie = BindingTrie::build(&table, MleContext::Base);
        assert_eq!(trie.node_needs_timeout("ab"), Some(true));
        assert_eq!(trie.node_needs_timeout("a"), Some(false));

        let steps = walk(&trie, "ab");
        // Deferred with the shorter binding reported as committable
        assert!(matches!(
            steps[1],
            Step::Pending {
                terminal: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn test_resolution_is_deterministic_regardless_of_order() {
        let forward = table_with(&[("ab", "go-home"), ("abc", "go-end")]);
        let reverse = table_with(&[("abc", "go-end"), ("ab", "go-home")]);
        for table in [&forward, &reverse] {
            let trie = BindingTrie::build(table, MleContext::Base);
            let steps = walk(&trie, "abc");
            let Step::Terminal(idx) = steps[2] else {
                panic!("expected terminal, got {:?}", steps[2]);
            };
            assert_eq!(
                table.entries()[idx].payload,
                BindingPayload::Func(MleFn::GoEnd)
            );
        }
    }

    #[test]
    fn test_defunct_entries_are_skipped() {
        let table = table_with(&[(":nope", "go-home")]);
        let trie = BindingTrie::build(&table, MleContext::Base);
        assert!(trie.is_empty());
    }

    #[test]
    fn test_capability_bytes_use_interbyte_timeout() {
        struct Kl;
        impl Capabilities for Kl {
            fn resolve(&self, name: &str) -> Option<Vec<u8>> {
                (name == "kl").then(|| b"\x1b[D".to_vec())
            }
        }
        let mut table = BindingTable::empty();
        table
            .bind(
                &BindingSpec {
                    context: "base".to_string(),
                    sequence: ":kl".to_string(),
                    action: "go-bwd".to_string(),
                },
                &Kl,
            )
            .unwrap();
        let trie = BindingTrie::build(&table, MleContext::Base);
        let steps = walk(&trie, "\u{1b}[D");
        assert!(matches!(
            steps[0],
            Step::Pending {
                wait: TimeoutClass::InterByte,
                ..
            }
        ));
        assert_eq!(steps[2], Step::Terminal(0));
    }

    #[test]
    fn test_chorded_chars_use_interkey_timeout() {
        let table = table_with(&[("gq", "commit")]);
        let trie = BindingTrie::build(&table, MleContext::Base);
        let steps = walk(&trie, "g");
        assert!(matches!(
            steps[0],
            Step::Pending {
                wait: TimeoutClass::InterKey,
                ..
            }
        ));
    }
}
