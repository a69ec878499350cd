//! Single-row visual renderer with horizontal scrolling
//!
//! The whole edit happens on one terminal row. When the line outgrows the
//! row, a window over the cell buffer is chosen so the cursor sits inside
//! it, a position indicator replaces the prompt, and only as much of the
//! row as actually changed is rewritten.

use std::io::{self, Write};

use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use unicode_width::UnicodeWidthStr;

use crate::cell::Cell;

bitflags::bitflags! {
    /// What the next repaint has to touch
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Dirty: u8 {
        /// Only the cursor moved
        const CURSOR = 1 << 0;
        /// A single cell was appended at the end of the line
        const INSERT = 1 << 1;
        /// Rewrite the whole visible row
        const REPAINT = 1 << 2;
        /// Ring the terminal bell
        const BELL = 1 << 3;
    }
}

/// Scale factor for the fixed-point position percentage
const POS_SCALE: u64 = 100_000;

/// Fraction of the usable width kept behind the cursor when re-anchoring
const BACKFILL_NUM: usize = 3;
const BACKFILL_DEN: usize = 4;

/// Window over the cell buffer chosen for one repaint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First visible cell
    pub start: usize,
    /// One past the last visible cell
    pub end: usize,
    /// Whether the prompt is drawn in front of the window
    pub with_prompt: bool,
}

/// Screen state carried between repaints of one `readline` call
#[derive(Debug)]
pub struct VisualState {
    width: u16,
    prompt: String,
    prompt_cols: usize,
    /// Window start of the previous repaint
    view_start: usize,
    /// Cell count at the previous repaint
    last_count: usize,
    last_with_prompt: bool,
    /// Physical column the terminal cursor was left at
    phys_col: u16,
    drawn: bool,
}

impl VisualState {
    pub fn new(width: u16, prompt: &str) -> Self {
        Self {
            width: width.max(4),
            prompt: prompt.to_string(),
            prompt_cols: UnicodeWidthStr::width(prompt),
            view_start: 0,
            last_count: 0,
            last_with_prompt: true,
            phys_col: 0,
            drawn: false,
        }
    }

    pub fn resize(&mut self, width: u16) {
        self.width = width.max(4);
        self.drawn = false;
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    /// Columns a slice of cells occupies, with tabs expanded to their
    /// single-space placeholder
    fn span_cols(cells: &[Cell]) -> usize {
        cells.iter().map(Cell::columns).sum()
    }

    /// Pick the window for this repaint. The cursor always lands inside it;
    /// the prompt is kept only when the whole line fits behind it.
    pub fn compute_window(&self, cells: &[Cell], cursor: usize) -> Window {
        let width = self.width as usize;
        let count = cells.len();

        // Does everything fit with the prompt up front?
        if self.prompt_cols + Self::span_cols(cells) < width {
            return Window {
                start: 0,
                end: count,
                with_prompt: true,
            };
        }

        // Reserve room for the indicator that replaces the prompt
        let usable = width.saturating_sub(5).max(1);

        let mut start = self.view_start.min(count);
        let cursor_in = |s: usize, e: usize| cursor >= s && cursor <= e;

        let end_from = |s: usize| {
            let mut cols = 0;
            let mut e = s;
            while e < count {
                let c = cells[e].columns();
                if cols + c > usable {
                    break;
                }
                cols += c;
                e += 1;
            }
            e
        };

        let mut end = end_from(start);
        if !cursor_in(start, end) {
            // Re-anchor: walk backwards from the cursor until roughly
            // three quarters of the usable width sits behind it
            let target = usable * BACKFILL_NUM / BACKFILL_DEN;
            let mut cols = 0;
            start = cursor.min(count);
            while start > 0 && cols + cells[start - 1].columns() <= target {
                cols += cells[start - 1].columns();
                start -= 1;
            }
            end = end_from(start);
        }

        // Second extension pass: when the tail of the line is visible,
        // pull the start back as far as the width allows
        if end == count {
            let mut cols = Self::span_cols(&cells[start..end]);
            while start > 0 && cols + cells[start - 1].columns() <= usable {
                cols += cells[start - 1].columns();
                start -= 1;
            }
        }

        Window {
            start,
            end,
            with_prompt: false,
        }
    }

    /// The scroll indicator drawn instead of the prompt
    fn indicator(win: &Window, cursor: usize, count: usize) -> String {
        if win.start == 0 && win.end == count {
            String::new()
        } else if win.start == 0 {
            "^.+ ".to_string()
        } else if win.end == count {
            ".+$ ".to_string()
        } else {
            // Integer fixed-point percentage of the cursor position
            let pct = (cursor as u64 * POS_SCALE) / count.max(1) as u64 / 1000;
            format!("{:2}% ", pct)
        }
    }

    /// Flush one repaint according to `dirty`
    pub fn redraw<W: Write>(
        &mut self,
        out: &mut W,
        cells: &[Cell],
        cursor: usize,
        mut dirty: Dirty,
    ) -> io::Result<()> {
        if dirty.contains(Dirty::BELL) {
            queue!(out, Print('\u{7}'))?;
        }
        dirty.remove(Dirty::BELL);
        if dirty.is_empty() && self.drawn {
            return out.flush();
        }

        let win = self.compute_window(cells, cursor);
        if !self.drawn
            || win.start != self.view_start
            || win.with_prompt != self.last_with_prompt
            || cells.len() < self.last_count
        {
            dirty |= Dirty::REPAINT;
        }

        if dirty.contains(Dirty::REPAINT) {
            self.full_row(out, cells, cursor, &win)?;
        } else if dirty.contains(Dirty::INSERT) {
            if cursor == cells.len() && cells.len() == self.last_count + 1 {
                // Plain append at the end of the row
                let cell = &cells[cells.len() - 1];
                queue!(out, MoveToColumn(self.phys_col))?;
                self.print_cell(out, cell)?;
                self.phys_col += cell.columns() as u16;
            } else {
                // Batched inserts fall back to a full row
                self.full_row(out, cells, cursor, &win)?;
            }
        } else if dirty.contains(Dirty::CURSOR) {
            self.place_cursor(out, cells, cursor, &win)?;
        }

        self.last_with_prompt = win.with_prompt;
        self.view_start = win.start;
        self.last_count = cells.len();
        self.drawn = true;
        out.flush()
    }

    fn full_row<W: Write>(
        &mut self,
        out: &mut W,
        cells: &[Cell],
        cursor: usize,
        win: &Window,
    ) -> io::Result<()> {
        queue!(out, MoveToColumn(0), Clear(ClearType::UntilNewLine))?;
        if win.with_prompt {
            queue!(out, Print(&self.prompt))?;
        } else {
            queue!(out, Print(Self::indicator(win, cursor, cells.len())))?;
        }
        for cell in &cells[win.start..win.end] {
            self.print_cell(out, cell)?;
        }
        self.place_cursor(out, cells, cursor, win)
    }

    fn print_cell<W: Write>(&self, out: &mut W, cell: &Cell) -> io::Result<()> {
        queue!(out, Print(cell.render_char()))
    }

    fn place_cursor<W: Write>(
        &mut self,
        out: &mut W,
        cells: &[Cell],
        cursor: usize,
        win: &Window,
    ) -> io::Result<()> {
        let lead = if win.with_prompt {
            self.prompt_cols
        } else {
            UnicodeWidthStr::width(Self::indicator(win, cursor, cells.len()).as_str())
        };
        let col = lead + Self::span_cols(&cells[win.start..cursor.max(win.start)]);
        self.phys_col = col.min(u16::MAX as usize) as u16;
        queue!(out, MoveToColumn(self.phys_col))
    }

    /// Leave the edited row behind and move to the next line
    pub fn finish<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        queue!(out, Print("\r\n"))?;
        self.drawn = false;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Line;

    fn cells_of(s: &str) -> Vec<Cell> {
        let mut line = Line::new(4096);
        line.load_str(s);
        line.cells().to_vec()
    }

    fn parse(bytes: &[u8], cols: u16) -> vt100::Parser {
        let mut parser = vt100::Parser::new(1, cols, 0);
        parser.process(bytes);
        parser
    }

    #[test]
    fn test_short_line_keeps_prompt() {
        let vs = VisualState::new(40, "? ");
        let cells = cells_of("hello");
        let win = vs.compute_window(&cells, 5);
        assert_eq!(
            win,
            Window {
                start: 0,
                end: 5,
                with_prompt: true
            }
        );
    }

    #[test]
    fn test_long_line_drops_prompt() {
        let vs = VisualState::new(10, "? ");
        let cells = cells_of("abcdefghijklmnop");
        let win = vs.compute_window(&cells, 16);
        assert!(!win.with_prompt);
        assert!(win.end == 16);
        assert!(win.start > 0);
    }

    #[test]
    fn test_window_contains_cursor() {
        let vs = VisualState::new(12, "? ");
        let cells = cells_of("abcdefghijklmnopqrstuvwxyz");
        for cursor in 0..=cells.len() {
            let win = vs.compute_window(&cells, cursor);
            assert!(cursor >= win.start && cursor <= win.end, "cursor {cursor}");
        }
    }

    #[test]
    fn test_tail_window_extends_backwards() {
        let vs = VisualState::new(12, "? ");
        let cells = cells_of("abcdefghijklmnopqrstuvwxyz");
        let win = vs.compute_window(&cells, cells.len());
        assert_eq!(win.end, cells.len());
        // The visible span fills the usable width, not just the backfill
        let cols: usize = cells[win.start..win.end].iter().map(Cell::columns).sum();
        assert!(cols > (12 - 5) * 3 / 4);
    }

    #[test]
    fn test_indicator_edges() {
        let all = Window { start: 0, end: 10, with_prompt: false };
        assert_eq!(VisualState::indicator(&all, 5, 10), "");
        let head = Window { start: 0, end: 5, with_prompt: false };
        assert_eq!(VisualState::indicator(&head, 2, 10), "^.+ ");
        let tail = Window { start: 5, end: 10, with_prompt: false };
        assert_eq!(VisualState::indicator(&tail, 8, 10), ".+$ ");
    }

    #[test]
    fn test_indicator_percentage_is_integer_math() {
        let mid = Window { start: 10, end: 20, with_prompt: false };
        // 15 of 40 cells: 15 * 100_000 / 40 / 1000 == 37
        assert_eq!(VisualState::indicator(&mid, 15, 40), "37% ");
    }

    #[test]
    fn test_indicator_percentage_never_decreases() {
        let mut vs = VisualState::new(12, "? ");
        let cells = cells_of("abcdefghijklmnopqrstuvwxyzabcdefghijklmnopqrstuvwxyz");
        let mut last = 0u64;
        for cursor in 0..=cells.len() {
            let win = vs.compute_window(&cells, cursor);
            vs.view_start = win.start;
            let text = VisualState::indicator(&win, cursor, cells.len());
            if let Some(digits) = text.strip_suffix("% ") {
                let pct: u64 = digits.trim().parse().unwrap();
                assert!(pct >= last, "cursor {cursor}: {pct} < {last}");
                last = pct;
            }
        }
    }

    #[test]
    fn test_redraw_shows_prompt_and_text() {
        let mut vs = VisualState::new(40, "? ");
        let cells = cells_of("hello");
        let mut out = Vec::new();
        vs.redraw(&mut out, &cells, 5, Dirty::REPAINT).unwrap();
        let parser = parse(&out, 40);
        assert_eq!(parser.screen().contents(), "? hello");
        assert_eq!(parser.screen().cursor_position(), (0, 7));
    }

    #[test]
    fn test_redraw_nonprintable_placeholder() {
        let mut vs = VisualState::new(40, "? ");
        let mut line = Line::new(4096);
        line.insert('a');
        line.insert('\u{1}');
        let mut out = Vec::new();
        vs.redraw(&mut out, line.cells(), 2, Dirty::REPAINT).unwrap();
        let parser = parse(&out, 40);
        assert_eq!(parser.screen().contents(), "? a?");
    }

    #[test]
    fn test_insert_appends_without_repaint() {
        let mut vs = VisualState::new(40, "? ");
        let mut out = Vec::new();
        let cells = cells_of("ab");
        vs.redraw(&mut out, &cells, 2, Dirty::REPAINT).unwrap();
        let before = out.len();
        let cells = cells_of("abc");
        vs.redraw(&mut out, &cells, 3, Dirty::INSERT).unwrap();
        // Appending sends the one new glyph rather than the whole row
        let appended = &out[before..];
        assert!(appended.len() < 16, "append burst was {} bytes", appended.len());
        let parser = parse(&out, 40);
        assert_eq!(parser.screen().contents(), "? abc");
    }

    #[test]
    fn test_scrolled_row_shows_indicator() {
        let mut vs = VisualState::new(10, "? ");
        let cells = cells_of("abcdefghijklmnop");
        let mut out = Vec::new();
        vs.redraw(&mut out, &cells, 16, Dirty::REPAINT).unwrap();
        let parser = parse(&out, 10);
        let contents = parser.screen().contents();
        assert!(contents.starts_with(".+$ "), "got {contents:?}");
    }

    #[test]
    fn test_cursor_only_move_keeps_window() {
        let mut vs = VisualState::new(40, "? ");
        let cells = cells_of("hello");
        let mut out = Vec::new();
        vs.redraw(&mut out, &cells, 5, Dirty::REPAINT).unwrap();
        let before = out.len();
        vs.redraw(&mut out, &cells, 0, Dirty::CURSOR).unwrap();
        assert!(out.len() - before < 12);
        let parser = parse(&out, 40);
        assert_eq!(parser.screen().cursor_position(), (0, 2));
    }

    #[test]
    fn test_bell_emits_bel_byte() {
        let mut vs = VisualState::new(40, "? ");
        let cells = cells_of("x");
        let mut out = Vec::new();
        vs.redraw(&mut out, &cells, 1, Dirty::REPAINT | Dirty::BELL).unwrap();
        assert!(out.contains(&0x07));
    }
}
