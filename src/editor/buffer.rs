use arboard::Clipboard;
use std::cmp::min;

/// Multi-line text with a cursor and an optional selection anchor.
///
/// Cursor columns count characters, not bytes.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    pub lines: Vec<String>,
    pub cursor_x: usize,
    pub cursor_y: usize,
    pub selection_start: Option<(usize, usize)>,
    pub scroll_offset: usize,
    pub modified: bool,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn char_len(line: &str) -> usize {
    line.chars().count()
}

/// Byte offset of character `x` in `line`, clamped to the end.
fn byte_at(line: &str, x: usize) -> usize {
    line.char_indices().nth(x).map(|(i, _)| i).unwrap_or(line.len())
}

fn split_lines(text: &str) -> Vec<String> {
    let lines: Vec<String> = text.lines().map(String::from).collect();
    if lines.is_empty() {
        vec![String::new()]
    } else {
        lines
    }
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::from_text("")
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            lines: split_lines(text),
            cursor_x: 0,
            cursor_y: 0,
            selection_start: None,
            scroll_offset: 0,
            modified: false,
        }
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn current_line(&self) -> &str {
        &self.lines[self.cursor_y]
    }

    fn current_len(&self) -> usize {
        char_len(self.current_line())
    }

    fn last_line(&self) -> usize {
        self.lines.len() - 1
    }

    // --- editing ---

    pub fn insert_char(&mut self, c: char) {
        self.delete_selection();
        if c == '\n' {
            self.insert_newline();
            return;
        }
        let at = byte_at(self.current_line(), self.cursor_x);
        self.lines[self.cursor_y].insert(at, c);
        self.cursor_x += 1;
        self.modified = true;
    }

    pub fn insert_newline(&mut self) {
        self.delete_selection();
        let at = byte_at(self.current_line(), self.cursor_x);
        let rest = self.lines[self.cursor_y].split_off(at);
        self.cursor_y += 1;
        self.cursor_x = 0;
        self.lines.insert(self.cursor_y, rest);
        self.modified = true;
    }

    pub fn insert_text(&mut self, text: &str) {
        for c in text.chars().filter(|c| *c != '\r') {
            self.insert_char(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.delete_selection() {
            return;
        }
        if self.cursor_x > 0 {
            let at = byte_at(self.current_line(), self.cursor_x - 1);
            self.lines[self.cursor_y].remove(at);
            self.cursor_x -= 1;
            self.modified = true;
        } else if self.cursor_y > 0 {
            let line = self.lines.remove(self.cursor_y);
            self.cursor_y -= 1;
            self.cursor_x = self.current_len();
            self.lines[self.cursor_y].push_str(&line);
            self.modified = true;
        }
    }

    pub fn delete(&mut self) {
        if self.delete_selection() {
            return;
        }
        if self.cursor_x < self.current_len() {
            let at = byte_at(self.current_line(), self.cursor_x);
            self.lines[self.cursor_y].remove(at);
            self.modified = true;
        } else if self.cursor_y < self.last_line() {
            let next = self.lines.remove(self.cursor_y + 1);
            self.lines[self.cursor_y].push_str(&next);
            self.modified = true;
        }
    }

    // --- movement ---

    pub fn move_left(&mut self) {
        if self.cursor_x > 0 {
            self.cursor_x -= 1;
        } else if self.cursor_y > 0 {
            self.cursor_y -= 1;
            self.cursor_x = self.current_len();
        }
    }

    pub fn move_right(&mut self) {
        if self.cursor_x < self.current_len() {
            self.cursor_x += 1;
        } else if self.cursor_y < self.last_line() {
            self.cursor_y += 1;
            self.cursor_x = 0;
        }
    }

    pub fn move_up(&mut self) {
        if self.cursor_y > 0 {
            self.cursor_y -= 1;
            self.cursor_x = min(self.cursor_x, self.current_len());
        }
    }

    pub fn move_down(&mut self) {
        if self.cursor_y < self.last_line() {
            self.cursor_y += 1;
            self.cursor_x = min(self.cursor_x, self.current_len());
        }
    }

    pub fn move_to_line_start(&mut self) {
        self.cursor_x = 0;
    }

    pub fn move_to_line_end(&mut self) {
        self.cursor_x = self.current_len();
    }

    pub fn move_word_left(&mut self) {
        if self.cursor_x == 0 {
            self.move_left();
            return;
        }
        let chars: Vec<char> = self.current_line().chars().collect();
        let mut x = self.cursor_x;
        while x > 0 && chars[x - 1].is_whitespace() {
            x -= 1;
        }
        while x > 0 && !chars[x - 1].is_whitespace() {
            x -= 1;
        }
        self.cursor_x = x;
    }

    pub fn move_word_right(&mut self) {
        let chars: Vec<char> = self.current_line().chars().collect();
        if self.cursor_x >= chars.len() {
            self.move_right();
            return;
        }
        let mut x = self.cursor_x;
        while x < chars.len() && !chars[x].is_whitespace() {
            x += 1;
        }
        while x < chars.len() && chars[x].is_whitespace() {
            x += 1;
        }
        self.cursor_x = x;
    }

    pub fn move_to_start(&mut self) {
        self.cursor_x = 0;
        self.cursor_y = 0;
    }

    pub fn move_to_end(&mut self) {
        self.cursor_y = self.last_line();
        self.cursor_x = self.current_len();
    }

    // --- selection ---

    /// Anchor a selection at the cursor unless one is already anchored.
    pub fn start_selection(&mut self) {
        if self.selection_start.is_none() {
            self.selection_start = Some((self.cursor_x, self.cursor_y));
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection_start = None;
    }

    pub fn has_selection(&self) -> bool {
        self.selection_start
            .is_some_and(|start| start != (self.cursor_x, self.cursor_y))
    }

    /// Ordered (start, end) of the selection as (x, y) pairs.
    pub fn selection(&self) -> Option<((usize, usize), (usize, usize))> {
        let start = self.selection_start?;
        let end = (self.cursor_x, self.cursor_y);
        if (start.1, start.0) <= (end.1, end.0) {
            Some((start, end))
        } else {
            Some((end, start))
        }
    }

    pub fn selected_text(&self) -> Option<String> {
        if !self.has_selection() {
            return None;
        }
        let ((sx, sy), (ex, ey)) = self.selection()?;
        let from = byte_at(&self.lines[sy], sx);
        let to = byte_at(&self.lines[ey], ex);
        if sy == ey {
            return Some(self.lines[sy][from..to].to_string());
        }
        let mut text = self.lines[sy][from..].to_string();
        for line in &self.lines[sy + 1..ey] {
            text.push('\n');
            text.push_str(line);
        }
        text.push('\n');
        text.push_str(&self.lines[ey][..to]);
        Some(text)
    }

    pub fn delete_selection(&mut self) -> bool {
        if !self.has_selection() {
            self.clear_selection();
            return false;
        }
        let Some(((sx, sy), (ex, ey))) = self.selection() else {
            return false;
        };
        let head = self.lines[sy][..byte_at(&self.lines[sy], sx)].to_string();
        let tail = self.lines[ey][byte_at(&self.lines[ey], ex)..].to_string();
        self.lines.drain(sy + 1..=ey);
        self.lines[sy] = head + &tail;
        self.cursor_x = sx;
        self.cursor_y = sy;
        self.clear_selection();
        self.modified = true;
        true
    }

    pub fn select_all(&mut self) {
        self.selection_start = Some((0, 0));
        self.move_to_end();
    }

    // --- clipboard ---

    pub fn copy(&self) -> Option<String> {
        let text = self.selected_text()?;
        if let Ok(mut clipboard) = Clipboard::new() {
            let _ = clipboard.set_text(text.clone());
        }
        Some(text)
    }

    pub fn cut(&mut self) -> Option<String> {
        let text = self.copy()?;
        self.delete_selection();
        Some(text)
    }

    pub fn paste(&mut self) {
        if let Ok(mut clipboard) = Clipboard::new() {
            if let Ok(text) = clipboard.get_text() {
                self.insert_text(&text);
            }
        }
    }

    // --- whole-buffer ---

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn set_text(&mut self, text: &str) {
        self.lines = split_lines(text);
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.selection_start = None;
        self.scroll_offset = 0;
        self.modified = false;
    }

    pub fn ensure_cursor_visible(&mut self, visible_height: usize) {
        if self.cursor_y < self.scroll_offset {
            self.scroll_offset = self.cursor_y;
        } else if visible_height > 0 && self.cursor_y >= self.scroll_offset + visible_height {
            self.scroll_offset = self.cursor_y + 1 - visible_height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Construction ---

    #[test]
    fn test_new_buffer() {
        let buf = TextBuffer::new();
        assert_eq!(buf.lines, vec![""]);
        assert_eq!((buf.cursor_x, buf.cursor_y), (0, 0));
        assert!(!buf.modified);
        assert!(buf.is_blank());
    }

    #[test]
    fn test_from_text_round_trip() {
        let original = "SELECT *\nFROM users\nWHERE id = 1";
        let buf = TextBuffer::from_text(original);
        assert_eq!(buf.line_count(), 3);
        assert_eq!(buf.text(), original);
    }

    // --- Insertion ---

    #[test]
    fn test_insert_char_middle_of_line() {
        let mut buf = TextBuffer::from_text("ac");
        buf.cursor_x = 1;
        buf.insert_char('b');
        assert_eq!(buf.text(), "abc");
        assert_eq!(buf.cursor_x, 2);
        assert!(buf.modified);
    }

    #[test]
    fn test_insert_after_multibyte_chars() {
        let mut buf = TextBuffer::from_text("héllo");
        buf.cursor_x = 2;
        buf.insert_char('X');
        assert_eq!(buf.text(), "héXllo");
        buf.backspace();
        buf.backspace();
        assert_eq!(buf.text(), "hllo");
    }

    #[test]
    fn test_insert_text_multiline() {
        let mut buf = TextBuffer::new();
        buf.insert_text("select 1\r\nfrom t");
        assert_eq!(buf.lines, vec!["select 1", "from t"]);
        assert_eq!((buf.cursor_x, buf.cursor_y), (6, 1));
    }

    #[test]
    fn test_insert_newline_splits_line() {
        let mut buf = TextBuffer::from_text("hello world");
        buf.cursor_x = 5;
        buf.insert_newline();
        assert_eq!(buf.lines, vec!["hello", " world"]);
        assert_eq!((buf.cursor_x, buf.cursor_y), (0, 1));
    }

    // --- Deletion ---

    #[test]
    fn test_backspace_at_start_merges_lines() {
        let mut buf = TextBuffer::from_text("line1\nline2");
        buf.cursor_y = 1;
        buf.backspace();
        assert_eq!(buf.lines, vec!["line1line2"]);
        assert_eq!((buf.cursor_x, buf.cursor_y), (5, 0));
    }

    #[test]
    fn test_delete_at_end_merges_lines() {
        let mut buf = TextBuffer::from_text("line1\nline2");
        buf.cursor_x = 5;
        buf.delete();
        assert_eq!(buf.lines, vec!["line1line2"]);
        buf.move_to_end();
        buf.delete();
        assert_eq!(buf.text(), "line1line2");
    }

    // --- Movement ---

    #[test]
    fn test_move_wraps_between_lines() {
        let mut buf = TextBuffer::from_text("ab\ncd");
        buf.cursor_x = 2;
        buf.move_right();
        assert_eq!((buf.cursor_x, buf.cursor_y), (0, 1));
        buf.move_left();
        assert_eq!((buf.cursor_x, buf.cursor_y), (2, 0));
    }

    #[test]
    fn test_move_up_clamps_cursor_x() {
        let mut buf = TextBuffer::from_text("hi\nlong line");
        buf.cursor_y = 1;
        buf.cursor_x = 8;
        buf.move_up();
        assert_eq!((buf.cursor_x, buf.cursor_y), (2, 0));
    }

    #[test]
    fn test_word_movement() {
        let mut buf = TextBuffer::from_text("select  name from");
        buf.move_word_right();
        assert_eq!(buf.cursor_x, 8);
        buf.move_word_right();
        assert_eq!(buf.cursor_x, 13);
        buf.move_word_left();
        assert_eq!(buf.cursor_x, 8);
    }

    // --- Selection ---

    #[test]
    fn test_selected_text_multi_line() {
        let mut buf = TextBuffer::from_text("line1\nline2\nline3");
        buf.cursor_x = 3;
        buf.start_selection();
        buf.cursor_y = 2;
        buf.cursor_x = 2;
        assert_eq!(buf.selected_text().as_deref(), Some("e1\nline2\nli"));
    }

    #[test]
    fn test_backwards_selection_is_ordered() {
        let mut buf = TextBuffer::from_text("hello world");
        buf.cursor_x = 11;
        buf.start_selection();
        buf.move_word_left();
        assert_eq!(buf.selected_text().as_deref(), Some("world"));
    }

    #[test]
    fn test_typing_replaces_selection() {
        let mut buf = TextBuffer::from_text("line1\nline2\nline3");
        buf.select_all();
        buf.insert_char('X');
        assert_eq!(buf.text(), "X");
        assert!(!buf.has_selection());
    }

    #[test]
    fn test_empty_selection_is_not_a_selection() {
        let mut buf = TextBuffer::from_text("abc");
        buf.start_selection();
        assert!(!buf.has_selection());
        assert!(buf.selected_text().is_none());
        buf.backspace();
        assert_eq!(buf.text(), "abc");
    }

    // --- Whole buffer ---

    #[test]
    fn test_set_text_resets_state() {
        let mut buf = TextBuffer::from_text("old");
        buf.insert_char('x');
        buf.set_text("new\ncontent");
        assert_eq!(buf.lines, vec!["new", "content"]);
        assert_eq!((buf.cursor_x, buf.cursor_y), (0, 0));
        assert!(!buf.modified);
    }

    #[test]
    fn test_ensure_cursor_visible() {
        let mut buf = TextBuffer::from_text("1\n2\n3\n4\n5\n6\n7\n8\n9\n10");
        buf.cursor_y = 8;
        buf.ensure_cursor_visible(5);
        assert_eq!(buf.scroll_offset, 4);
        buf.cursor_y = 1;
        buf.ensure_cursor_visible(5);
        assert_eq!(buf.scroll_offset, 1);
    }
}
