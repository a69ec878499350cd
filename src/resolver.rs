//! The key resolver: raw bytes in, editing events out
//!
//! One character is decoded at a time through a persistent incremental UTF-8
//! decoder, then pushed through the binding trie. A partial match defers
//! resolution behind a timeout; on expiry the deepest complete binding wins,
//! or the buffered characters are replayed as literal input ("takeover").
//! The one-byte cancel and literal-next shortcuts win over an in-progress,
//! not-yet-terminal descent.

use std::collections::VecDeque;

use crate::bindings::{builtin_lookup, shortcut_lookup, BindingPayload, BindingTable, MleContext, MleFn};
use crate::trie::{BindingTrie, Step, TimeoutClass, TrieCursor};

/// What one resolution step produced
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Insert this character into the cell buffer
    Literal(char),
    /// Run an internal editing function
    Func(MleFn),
    /// A bound literal expansion
    Expansion { text: String, editable: bool },
}

/// Outcome of pushing one byte into the UTF-8 decoder
#[derive(Debug, PartialEq, Eq)]
enum Decode {
    Char(char),
    Pending,
    Invalid,
}

/// Incremental UTF-8 decoder with resynchronization on bad input
#[derive(Debug, Default)]
struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
}

impl Utf8Decoder {
    fn push(&mut self, byte: u8) -> Decode {
        if self.len >= self.buf.len() {
            // Oversized multibyte buffer; drop it and resynchronize
            self.len = 0;
            return Decode::Invalid;
        }
        self.buf[self.len] = byte;
        self.len += 1;
        match std::str::from_utf8(&self.buf[..self.len]) {
            Ok(s) => {
                self.len = 0;
                // The buffer holds exactly one complete scalar value here
                match s.chars().next() {
                    Some(ch) => Decode::Char(ch),
                    None => Decode::Invalid,
                }
            }
            Err(e) if e.error_len().is_none() && self.len < self.buf.len() => Decode::Pending,
            Err(_) => {
                self.len = 0;
                Decode::Invalid
            }
        }
    }

    fn reset(&mut self) {
        self.len = 0;
    }
}

/// Persistent resolution state across one `readline` call
#[derive(Debug)]
pub struct Resolver {
    context: MleContext,
    decoder: Utf8Decoder,
    /// Characters consumed into a deferred, unresolved sequence
    pending: Vec<char>,
    cursor: TrieCursor,
    /// Deepest terminal ancestor: binding index and chars it consumed
    deepest: Option<(usize, usize)>,
    wait: Option<TimeoutClass>,
    /// Characters queued for re-resolution after a takeover
    replay: VecDeque<char>,
    quote_next: bool,
}

impl Resolver {
    pub fn new(context: MleContext) -> Self {
        Self {
            context,
            decoder: Utf8Decoder::default(),
            pending: Vec::new(),
            cursor: TrieCursor::default(),
            deepest: None,
            wait: None,
            replay: VecDeque::new(),
            quote_next: false,
        }
    }

    /// Timeout class the next blocking read should honour, if any
    pub fn wait_class(&self) -> Option<TimeoutClass> {
        if self.pending.is_empty() {
            None
        } else {
            self.wait
        }
    }

    /// Full reset: decoder, descent state and replay queue
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.reset_descent();
        self.replay.clear();
        self.quote_next = false;
    }

    fn reset_descent(&mut self) {
        self.pending.clear();
        self.cursor = TrieCursor::default();
        self.deepest = None;
        self.wait = None;
    }

    /// Feed one raw byte; returns the events it released
    pub fn feed_byte(
        &mut self,
        byte: u8,
        trie: Option<&BindingTrie>,
        table: &BindingTable,
    ) -> Vec<Resolved> {
        match self.decoder.push(byte) {
            Decode::Pending => Vec::new(),
            Decode::Invalid => {
                tracing::debug!(byte, "undecodable input, resynchronizing");
                Vec::new()
            }
            Decode::Char(ch) => {
                self.replay.push_back(ch);
                self.drain(trie, table)
            }
        }
    }

    /// The deferred read timed out: commit the deepest terminal ancestor, or
    /// take the buffered characters over as literal input
    pub fn on_timeout(&mut self, trie: Option<&BindingTrie>, table: &BindingTable) -> Vec<Resolved> {
        let mut out = Vec::new();
        if let Some((binding, consumed)) = self.deepest.take() {
            let rest: Vec<char> = self.pending[consumed..].to_vec();
            self.reset_descent();
            self.emit_binding(binding, table, &mut out);
            self.requeue(rest);
        } else if !self.pending.is_empty() {
            let mut chars = std::mem::take(&mut self.pending);
            self.reset_descent();
            out.push(Resolved::Literal(chars.remove(0)));
            self.requeue(chars);
        }
        out.extend(self.drain(trie, table));
        out
    }

    fn requeue(&mut self, chars: Vec<char>) {
        for ch in chars.into_iter().rev() {
            self.replay.push_front(ch);
        }
    }

    fn drain(&mut self, trie: Option<&BindingTrie>, table: &BindingTable) -> Vec<Resolved> {
        let mut out = Vec::new();
        while let Some(ch) = self.replay.pop_front() {
            self.process_char(ch, trie, table, &mut out);
        }
        out
    }

    fn process_char(
        &mut self,
        ch: char,
        trie: Option<&BindingTrie>,
        table: &BindingTable,
        out: &mut Vec<Resolved>,
    ) {
        if self.quote_next {
            self.quote_next = false;
            out.push(Resolved::Literal(ch));
            return;
        }

        // Shortcuts beat an in-progress but not-yet-terminal sequence,
        // flushing whatever the descent had buffered
        if !self.pending.is_empty() {
            if let Some(func) = shortcut_lookup(self.context, ch) {
                let flushed = std::mem::take(&mut self.pending);
                self.reset_descent();
                out.extend(flushed.into_iter().map(Resolved::Literal));
                self.run_shortcut(func, out);
                return;
            }
        }

        let Some(trie) = trie.filter(|t| !t.is_empty()) else {
            self.resolve_single(ch, out);
            return;
        };

        match trie.step(&mut self.cursor, ch) {
            Step::NoMatch => {
                if self.pending.is_empty() {
                    self.resolve_single(ch, out);
                } else {
                    // Dead end mid-sequence: first buffered char becomes
                    // literal, the rest restart resolution from scratch
                    let mut chars = std::mem::take(&mut self.pending);
                    self.reset_descent();
                    out.push(Resolved::Literal(chars.remove(0)));
                    chars.push(ch);
                    self.requeue(chars);
                }
            }
            Step::Pending { terminal, wait } => {
                self.pending.push(ch);
                if let Some(binding) = terminal {
                    self.deepest = Some((binding, self.pending.len()));
                }
                self.wait = Some(wait);
            }
            Step::Terminal(binding) => {
                self.reset_descent();
                self.emit_binding(binding, table, out);
            }
        }
    }

    fn resolve_single(&mut self, ch: char, out: &mut Vec<Resolved>) {
        if let Some(func) = shortcut_lookup(self.context, ch) {
            self.run_shortcut(func, out);
        } else if let Some(func) = builtin_lookup(self.context, ch) {
            out.push(Resolved::Func(func));
        } else if ch.is_control() {
            // Unbound control characters never insert
            out.push(Resolved::Func(MleFn::Bell));
        } else {
            out.push(Resolved::Literal(ch));
        }
    }

    fn run_shortcut(&mut self, func: MleFn, out: &mut Vec<Resolved>) {
        if func == MleFn::QuoteNext {
            self.quote_next = true;
        } else {
            out.push(Resolved::Func(func));
        }
    }

    fn emit_binding(&mut self, binding: usize, table: &BindingTable, out: &mut Vec<Resolved>) {
        match &table.entries()[binding].payload {
            BindingPayload::Func(MleFn::QuoteNext) => self.quote_next = true,
            BindingPayload::Func(func) => out.push(Resolved::Func(*func)),
            BindingPayload::Expansion { text, editable } => out.push(Resolved::Expansion {
                text: text.clone(),
                editable: *editable,
            }),
        }
    }
}
