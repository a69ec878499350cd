//! The line editor itself: one read loop over raw terminal bytes
//!
//! All per-instance state lives here instead of in globals, so several
//! editors (or tests) can coexist. Each `readline` call owns a fresh cell
//! buffer and screen state; bindings, history and configuration persist
//! across calls.

use std::io::Write;
use std::time::Duration;

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};

use crate::bindings::{BindingTable, MleContext, MleFn};
use crate::cell::Line;
use crate::complete::{complete, Completion, Expander};
use crate::config::{BindingSpec, MleConfig};
use crate::error::MleError;
use crate::history::History;
use crate::render::{Dirty, VisualState};
use crate::resolver::{Resolved, Resolver};
use crate::term::{Capabilities, RawTty, StateChange, TtyEvent};
use crate::trie::{BindingTrie, TimeoutClass};

/// How one `readline` call ended
#[derive(Debug, PartialEq, Eq)]
pub enum ReadResult {
    Line {
        text: String,
        /// False for lines that should stay out of history entirely
        history_eligible: bool,
    },
    /// The user cancelled the line
    Cancelled,
    /// End of input on an empty line
    Eof,
}

/// What an editing function asked the read loop to do next
enum FnResult {
    Continue,
    /// The line was reset; drop resolver state and repaint from scratch
    Restart,
    Commit,
    Eof,
}

pub struct Editor {
    config: MleConfig,
    bindings: BindingTable,
    history: History,
    caps: Box<dyn Capabilities>,
    expander: Option<Box<dyn Expander>>,
    /// Context the cached trie was built for
    trie: Option<(MleContext, BindingTrie)>,
    /// Set after an unrecoverable terminal failure
    disabled: bool,
}

impl Editor {
    pub fn new(config: MleConfig, caps: Box<dyn Capabilities>) -> Self {
        let mut bindings = if config.bindings_enabled {
            BindingTable::with_defaults()
        } else {
            BindingTable::empty()
        };
        bindings.resolve_capabilities(caps.as_ref());
        let specs = config.bindings.clone();
        let mut editor = Self {
            history: History::new(config.history_max),
            config,
            bindings,
            caps,
            expander: None,
            trie: None,
            disabled: false,
        };
        for spec in &specs {
            if let Err(reason) = editor.bindings.bind(spec, editor.caps.as_ref()) {
                tracing::warn!(?spec, %reason, "ignoring configured binding");
            }
        }
        editor
    }

    pub fn set_expander(&mut self, expander: Box<dyn Expander>) {
        self.expander = Some(expander);
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn bindings_mut(&mut self) -> &mut BindingTable {
        &mut self.bindings
    }

    /// Install a binding at runtime, with capability names resolved immediately.
    pub fn bind(&mut self, spec: &BindingSpec) -> Result<(), MleError> {
        self.bindings
            .bind(spec, self.caps.as_ref())
            .map_err(|reason| MleError::Binding {
                spec: spec.sequence.clone(),
                reason,
            })
    }

    pub fn config(&self) -> &MleConfig {
        &self.config
    }

    pub fn load_history(&mut self) -> Result<(), MleError> {
        let Some(path) = self.config.history_file.clone() else {
            return Ok(());
        };
        self.history.load(&path)
    }

    pub fn save_history(&self) -> Result<(), MleError> {
        let Some(path) = self.config.history_file.as_deref() else {
            return Ok(());
        };
        self.history.save(path, self.config.history_save_gabby)
    }

    /// Rebuild the cached trie when bindings changed or the context did
    fn refresh_trie(&mut self, context: MleContext) {
        if !self.config.bindings_enabled {
            self.trie = None;
            return;
        }
        let stale = self.bindings.take_dirty()
            || !matches!(&self.trie, Some((ctx, _)) if *ctx == context);
        if stale {
            self.trie = Some((context, BindingTrie::build(&self.bindings, context)));
        }
    }

    fn timeout_for(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::InterByte => self.config.interbyte_timeout(),
            TimeoutClass::InterKey => self.config.interkey_timeout(),
        }
    }

    /// Read one line. `initial` pre-fills the buffer with the cursor at its
    /// end; `gabby` marks the committed line noisy in history.
    pub fn readline(
        &mut self,
        tty: &mut dyn RawTty,
        context: MleContext,
        prompt: &str,
        initial: Option<&str>,
        gabby: bool,
    ) -> Result<ReadResult, MleError> {
        if self.disabled {
            return self.fallback_readline(tty, prompt);
        }
        match self.readline_inner(tty, context, prompt, initial, gabby) {
            Err(MleError::Tty(e)) if e.kind() != std::io::ErrorKind::UnexpectedEof => {
                tracing::warn!(error = %e, "terminal failure, disabling line editing");
                self.disabled = true;
                self.fallback_readline(tty, prompt)
            }
            other => other,
        }
    }

    fn readline_inner(
        &mut self,
        tty: &mut dyn RawTty,
        context: MleContext,
        prompt: &str,
        initial: Option<&str>,
        gabby: bool,
    ) -> Result<ReadResult, MleError> {
        let mut line = Line::new(self.config.line_limit);
        let mut visual = VisualState::new(tty.width(), prompt);
        let mut resolver = Resolver::new(context);
        self.history.nav_reset();

        if let Some(text) = initial {
            line.load_str(text);
        }
        let mut dirty = Dirty::REPAINT;

        loop {
            // A queued takeover replaces the whole buffer before reading on
            if let Some(takeover) = line.take_takeover() {
                line.load_str(&takeover.text);
                if let Some(byte) = takeover.cursor_byte {
                    line.set_cursor_byte(byte);
                }
                dirty |= Dirty::REPAINT;
            }
            if line.take_bell() && self.config.bell {
                dirty |= Dirty::BELL;
            }
            visual.redraw(&mut tty.writer(), line.cells(), line.cursor(), dirty)?;
            dirty = Dirty::empty();

            let timeout = resolver.wait_class().map(|c| self.timeout_for(c));
            let event = tty.read_byte(timeout)?;
            let resolved = match event {
                TtyEvent::Byte(b) => {
                    self.refresh_trie(context);
                    let trie = self.trie.as_ref().map(|(_, t)| t);
                    resolver.feed_byte(b, trie, &self.bindings)
                }
                TtyEvent::Timedout => {
                    self.refresh_trie(context);
                    let trie = self.trie.as_ref().map(|(_, t)| t);
                    resolver.on_timeout(trie, &self.bindings)
                }
                TtyEvent::Interrupted(change) => {
                    match change {
                        StateChange::Resize => {
                            visual.resize(tty.width());
                            dirty |= Dirty::REPAINT;
                        }
                        StateChange::Resume => dirty |= Dirty::REPAINT,
                        StateChange::Suspend => {}
                        StateChange::Interrupt => return Ok(ReadResult::Cancelled),
                    }
                    continue;
                }
            };

            for item in resolved {
                match item {
                    Resolved::Literal(ch) => {
                        let at_end = line.cursor() == line.len();
                        line.insert(ch);
                        dirty |= if at_end { Dirty::INSERT } else { Dirty::REPAINT };
                    }
                    Resolved::Expansion { text, editable } => {
                        line.insert_str(&text);
                        dirty |= Dirty::REPAINT;
                        if !editable {
                            return self.commit(tty, &mut line, &mut visual, context, gabby);
                        }
                    }
                    Resolved::Func(func) => match self.apply(func, tty, &mut line, &mut visual, context)? {
                        FnResult::Continue => {
                            // Pure motions only need the cursor replaced
                            let motion = matches!(
                                func,
                                MleFn::GoLeft
                                    | MleFn::GoRight
                                    | MleFn::GoHome
                                    | MleFn::GoEnd
                                    | MleFn::GoWordBwd
                                    | MleFn::GoWordFwd
                            );
                            dirty |= if motion { Dirty::CURSOR } else { Dirty::REPAINT };
                        }
                        FnResult::Restart => {
                            resolver.reset();
                            dirty |= Dirty::REPAINT;
                        }
                        FnResult::Commit => {
                            return self.commit(tty, &mut line, &mut visual, context, gabby)
                        }
                        FnResult::Eof => {
                            visual.finish(&mut tty.writer())?;
                            return Ok(ReadResult::Eof);
                        }
                    },
                }
            }
        }
    }

    fn commit(
        &mut self,
        tty: &mut dyn RawTty,
        line: &mut Line,
        visual: &mut VisualState,
        context: MleContext,
        gabby: bool,
    ) -> Result<ReadResult, MleError> {
        // Show the full committed line before leaving the row
        line.move_end();
        visual.redraw(&mut tty.writer(), line.cells(), line.cursor(), Dirty::REPAINT)?;
        visual.finish(&mut tty.writer())?;
        let text = line.flatten();
        if !text.is_empty() {
            self.history.add(&text, context, gabby);
        }
        Ok(ReadResult::Line {
            text,
            history_eligible: !gabby,
        })
    }

    fn apply(
        &mut self,
        func: MleFn,
        tty: &mut dyn RawTty,
        line: &mut Line,
        visual: &mut VisualState,
        context: MleContext,
    ) -> Result<FnResult, MleError> {
        match func {
            MleFn::Bell => line.bell(),
            MleFn::GoLeft => {
                line.move_left();
            }
            MleFn::GoRight => {
                line.move_right();
            }
            MleFn::GoHome => {
                line.move_home();
            }
            MleFn::GoEnd => {
                line.move_end();
            }
            MleFn::GoWordBwd => {
                line.move_word(false);
            }
            MleFn::GoWordFwd => {
                line.move_word(true);
            }
            MleFn::DelBwd => {
                line.delete_backward();
            }
            MleFn::DelFwd => {
                if line.is_empty() {
                    return Ok(FnResult::Eof);
                }
                line.delete_forward();
            }
            MleFn::SnarfEnd => {
                line.cut_to_end();
            }
            MleFn::SnarfLine => {
                line.cut_line();
            }
            MleFn::SnarfWordBwd => {
                line.cut_word(false);
            }
            MleFn::SnarfWordFwd => {
                line.cut_word(true);
            }
            MleFn::Paste => {
                line.paste();
            }
            MleFn::HistBwd => self.hist_walk(line, context, true),
            MleFn::HistFwd => self.hist_walk(line, context, false),
            MleFn::HistSrchBwd => self.hist_search(line, context, true),
            MleFn::HistSrchFwd => self.hist_search(line, context, false),
            MleFn::Complete => self.run_complete(tty, line, visual)?,
            MleFn::ClearScreen => {
                let mut out = tty.writer();
                queue!(&mut out, Clear(ClearType::All), MoveTo(0, 0))?;
            }
            MleFn::Cancel => {
                if self.history.is_navigating() {
                    // Back out of history navigation to the stashed line
                    self.history.nav_reset();
                    line.restore();
                } else {
                    line.clear();
                }
                return Ok(FnResult::Restart);
            }
            MleFn::Commit => return Ok(FnResult::Commit),
            MleFn::Eof => return Ok(FnResult::Eof),
            // Consumed inside the resolver
            MleFn::QuoteNext => {}
        }
        Ok(FnResult::Continue)
    }

    fn hist_walk(&mut self, line: &mut Line, context: MleContext, older: bool) {
        if older && !self.history.is_navigating() {
            line.snapshot();
        }
        let next = if older {
            self.history.nav_older(context).map(str::to_string)
        } else {
            match self.history.nav_newer(context) {
                Some(l) => Some(l.to_string()),
                None if line.saved().is_some() => {
                    // Walked off the youngest end: bring the stash back
                    line.restore();
                    return;
                }
                None => None,
            }
        };
        match next {
            Some(text) => line.load_str(&text),
            None => line.bell(),
        }
    }

    fn hist_search(&mut self, line: &mut Line, context: MleContext, older: bool) {
        if older && !self.history.is_navigating() {
            line.snapshot();
        }
        // The pattern is whatever was typed before searching began
        let pattern = line.saved().unwrap_or_default().to_string();
        let found = if older {
            self.history.search_older(
                context,
                &pattern,
                self.config.search_mode,
                self.config.search_case_sensitive,
            )
        } else {
            self.history.search_newer(
                context,
                &pattern,
                self.config.search_mode,
                self.config.search_case_sensitive,
            )
        };
        match found.map(str::to_string) {
            Some(text) => line.load_str(&text),
            None => line.bell(),
        }
    }

    fn run_complete(
        &mut self,
        tty: &mut dyn RawTty,
        line: &mut Line,
        visual: &mut VisualState,
    ) -> Result<(), MleError> {
        let Some(expander) = self.expander.as_mut() else {
            line.bell();
            return Ok(());
        };
        let flattened = line.flatten();
        let cursor_byte = line.cursor_byte();
        match complete(
            expander.as_mut(),
            &flattened,
            cursor_byte,
            visual.width(),
            self.config.quote_round_trip,
        ) {
            Completion::NoMatch => line.bell(),
            Completion::Replace(takeover) => line.queue_takeover(takeover),
            Completion::Listing { rows, replace } => {
                // Leave the edited row, print the candidates, re-edit below
                visual.finish(&mut tty.writer())?;
                let mut out = tty.writer();
                queue!(&mut out, Print(rows))?;
                line.queue_takeover(replace);
            }
        }
        Ok(())
    }

    /// Plain canonical read used once the terminal is given up on
    fn fallback_readline(
        &mut self,
        tty: &mut dyn RawTty,
        prompt: &str,
    ) -> Result<ReadResult, MleError> {
        let out = tty.writer();
        out.write_all(prompt.as_bytes())?;
        out.flush()?;
        let mut raw = Vec::new();
        loop {
            match tty.read_byte(None)? {
                TtyEvent::Byte(b'\n') | TtyEvent::Byte(b'\r') => break,
                TtyEvent::Byte(b) => raw.push(b),
                TtyEvent::Timedout => {}
                TtyEvent::Interrupted(StateChange::Interrupt) => {
                    return Ok(ReadResult::Cancelled)
                }
                TtyEvent::Interrupted(_) => {}
            }
        }
        if raw.is_empty() {
            return Ok(ReadResult::Eof);
        }
        Ok(ReadResult::Line {
            text: String::from_utf8_lossy(&raw).into_owned(),
            history_eligible: false,
        })
    }
}
