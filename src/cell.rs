//! Line content as decoded character cells
//!
//! A [`Line`] owns the edit state of one `readline` call: the cell sequence,
//! the cursor, the paste buffer from the last cut, a snapshot taken before
//! history navigation, and the pending takeover buffer used to re-inject
//! text produced by completion or expansions as if it had been typed.

use unicode_width::UnicodeWidthChar;

/// Visual width of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellWidth {
    /// Fixed number of terminal columns (0, 1 or 2)
    Cols(u8),
    /// Horizontal tab; resolved by the renderer
    Tab,
}

/// One decoded character plus its display and encoding metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    /// Length of the encoded form in bytes
    pub byte_len: u8,
    pub width: CellWidth,
    /// False for control characters and anything the locale cannot display
    pub printable: bool,
}

impl Cell {
    pub fn from_char(ch: char) -> Self {
        let byte_len = ch.len_utf8() as u8;
        if ch == '\t' {
            return Self {
                ch,
                byte_len,
                width: CellWidth::Tab,
                printable: true,
            };
        }
        match ch.width() {
            Some(w) if !ch.is_control() => Self {
                ch,
                byte_len,
                width: CellWidth::Cols(w as u8),
                printable: true,
            },
            _ => Self {
                ch,
                byte_len,
                width: CellWidth::Cols(1),
                printable: false,
            },
        }
    }

    /// Number of columns this cell occupies on screen
    pub fn columns(&self) -> usize {
        match self.width {
            CellWidth::Cols(w) => w as usize,
            CellWidth::Tab => 1,
        }
    }

    /// The character actually emitted by the renderer
    pub fn render_char(&self) -> char {
        if !self.printable {
            '?'
        } else if self.ch == '\t' {
            ' '
        } else {
            self.ch
        }
    }
}

/// Character class used by the word-boundary scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordClass {
    Blank,
    Punct,
    Other,
}

impl WordClass {
    fn of(ch: char) -> Self {
        if ch.is_whitespace() {
            WordClass::Blank
        } else if ch.is_ascii_punctuation() || (!ch.is_ascii() && !ch.is_alphanumeric()) {
            WordClass::Punct
        } else {
            WordClass::Other
        }
    }
}

/// Text queued for re-injection into the read cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Takeover {
    pub text: String,
    /// Byte offset within `text` where the cursor lands; `None` means the end
    pub cursor_byte: Option<usize>,
}

/// The line buffer: owned cells, cursor, and the auxiliary buffers
#[derive(Debug, Default)]
pub struct Line {
    cells: Vec<Cell>,
    cursor: usize,
    /// Last cut range, re-insertable with paste
    paste: String,
    /// Content snapshot taken before the first history navigation step
    saved: Option<String>,
    takeover: Option<Takeover>,
    bell: bool,
    /// Cell count ceiling; 0 disables the check
    limit: usize,
}

impl Line {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Take and clear the bell flag
    pub fn take_bell(&mut self) -> bool {
        std::mem::take(&mut self.bell)
    }

    fn reject(&mut self) -> bool {
        self.bell = true;
        false
    }

    /// Ring the bell at the next repaint
    pub fn bell(&mut self) {
        self.bell = true;
    }

    /// Flatten the cells back to the string the user typed
    pub fn flatten(&self) -> String {
        self.cells.iter().map(|c| c.ch).collect()
    }

    /// Byte offset of the cursor within the flattened string
    pub fn cursor_byte(&self) -> usize {
        self.cells[..self.cursor]
            .iter()
            .map(|c| c.byte_len as usize)
            .sum()
    }

    /// Replace the whole content, cursor at the end
    pub fn load_str(&mut self, s: &str) {
        self.cells = s.chars().map(Cell::from_char).collect();
        self.cursor = self.cells.len();
    }

    /// Move the cursor to the cell containing the given byte offset of the
    /// flattened string, clamping to the ends
    pub fn set_cursor_byte(&mut self, byte: usize) {
        let mut seen = 0;
        for (i, cell) in self.cells.iter().enumerate() {
            if seen >= byte {
                self.cursor = i;
                return;
            }
            seen += cell.byte_len as usize;
        }
        self.cursor = self.cells.len();
    }

    /// Insert one character at the cursor; false when the ceiling rejects it
    pub fn insert(&mut self, ch: char) -> bool {
        if self.limit != 0 && self.cells.len() >= self.limit {
            return self.reject();
        }
        self.cells.insert(self.cursor, Cell::from_char(ch));
        self.cursor += 1;
        true
    }

    pub fn insert_str(&mut self, s: &str) -> bool {
        for ch in s.chars() {
            if !self.insert(ch) {
                return false;
            }
        }
        true
    }

    pub fn delete_backward(&mut self) -> bool {
        if self.cursor == 0 {
            return self.reject();
        }
        self.cursor -= 1;
        self.cells.remove(self.cursor);
        true
    }

    pub fn delete_forward(&mut self) -> bool {
        if self.cursor >= self.cells.len() {
            return self.reject();
        }
        self.cells.remove(self.cursor);
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return self.reject();
        }
        self.cursor -= 1;
        true
    }

    pub fn move_right(&mut self) -> bool {
        if self.cursor >= self.cells.len() {
            return self.reject();
        }
        self.cursor += 1;
        true
    }

    pub fn move_home(&mut self) -> bool {
        self.cursor = 0;
        true
    }

    pub fn move_end(&mut self) -> bool {
        self.cursor = self.cells.len();
        true
    }

    /// Signed cell distance to the adjacent word boundary, `None` at an edge
    ///
    /// Going backward: skip blanks, then one run of a single class.
    /// Going forward: skip blanks, then one run of a single class.
    pub fn word_distance(&self, forward: bool) -> Option<isize> {
        if forward {
            let n = self.cells.len();
            let mut i = self.cursor;
            if i >= n {
                return None;
            }
            while i < n && WordClass::of(self.cells[i].ch) == WordClass::Blank {
                i += 1;
            }
            if i < n {
                let cls = WordClass::of(self.cells[i].ch);
                while i < n && WordClass::of(self.cells[i].ch) == cls {
                    i += 1;
                }
            }
            Some((i - self.cursor) as isize)
        } else {
            let mut i = self.cursor;
            if i == 0 {
                return None;
            }
            while i > 0 && WordClass::of(self.cells[i - 1].ch) == WordClass::Blank {
                i -= 1;
            }
            if i > 0 {
                let cls = WordClass::of(self.cells[i - 1].ch);
                while i > 0 && WordClass::of(self.cells[i - 1].ch) == cls {
                    i -= 1;
                }
            }
            Some(i as isize - self.cursor as isize)
        }
    }

    pub fn move_word(&mut self, forward: bool) -> bool {
        match self.word_distance(forward) {
            Some(d) => {
                self.cursor = (self.cursor as isize + d) as usize;
                true
            }
            None => self.reject(),
        }
    }

    fn cut_range(&mut self, start: usize, end: usize) {
        self.paste = self.cells[start..end].iter().map(|c| c.ch).collect();
        self.cells.drain(start..end);
        self.cursor = start;
    }

    /// Cut from the cursor to the end of the line
    pub fn cut_to_end(&mut self) -> bool {
        if self.cursor >= self.cells.len() {
            return self.reject();
        }
        self.cut_range(self.cursor, self.cells.len());
        true
    }

    /// Cut the whole line
    pub fn cut_line(&mut self) -> bool {
        if self.cells.is_empty() {
            return self.reject();
        }
        self.cut_range(0, self.cells.len());
        true
    }

    /// Cut one word in the given direction
    pub fn cut_word(&mut self, forward: bool) -> bool {
        match self.word_distance(forward) {
            Some(d) if d != 0 => {
                let other = (self.cursor as isize + d) as usize;
                let (start, end) = if forward {
                    (self.cursor, other)
                } else {
                    (other, self.cursor)
                };
                self.cut_range(start, end);
                true
            }
            _ => self.reject(),
        }
    }

    /// Re-insert the last cut range at the cursor
    pub fn paste(&mut self) -> bool {
        if self.paste.is_empty() {
            return self.reject();
        }
        let text = self.paste.clone();
        self.insert_str(&text)
    }

    /// Save the current content if no snapshot exists yet
    pub fn snapshot(&mut self) {
        if self.saved.is_none() {
            self.saved = Some(self.flatten());
        }
    }

    pub fn saved(&self) -> Option<&str> {
        self.saved.as_deref()
    }

    /// Restore the snapshot, if any, and drop it
    pub fn restore(&mut self) -> bool {
        match self.saved.take() {
            Some(s) => {
                self.load_str(&s);
                true
            }
            None => self.reject(),
        }
    }

    pub fn drop_snapshot(&mut self) {
        self.saved = None;
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.cursor = 0;
    }

    /// Queue text for re-injection at the top of the next read cycle
    pub fn queue_takeover(&mut self, takeover: Takeover) {
        self.takeover = Some(takeover);
    }

    pub fn take_takeover(&mut self) -> Option<Takeover> {
        self.takeover.take()
    }
}
