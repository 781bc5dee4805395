use blockgame_common::prelude::*;
use std::{collections::VecDeque, mem};

#[derive(Clone, Debug, PartialEq)]
pub struct ChatLine {
    /// age in seconds
    pub age: f32,
    /// name of the sending player, or empty if sent by the server
    pub name: String,
    /// message text
    pub text: String,
}

impl ChatLine {
    pub fn new(name: &str, text: &str) -> Self {
        Self {
            age: 0.0,
            name: name.to_owned(),
            text: text.to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatFragment {
    pub text: String,
    /// starting column
    pub column: u32,
    /// sender-name style; everything else renders in the default style
    pub bold: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatFormattedLine {
    pub fragments: Vec<ChatFragment>,
    /// true on the first row of each wrapped [`ChatLine`]
    pub first: bool,
}

pub struct ChatBuffer {
    /// maximum number of unformatted lines kept
    scrollback: usize,
    unformatted: VecDeque<ChatLine>,

    /// number of character rows, 0 until `reformat` is called
    rows: u32,
    /// number of character columns, 0 until `reformat` is called
    cols: u32,
    /// index into `formatted` of the console's top visible row
    scroll: i32,
    formatted: VecDeque<ChatFormattedLine>,
    /// shared return value for out-of-range rows
    empty_formatted_line: ChatFormattedLine,
}

impl ChatBuffer {
    pub fn new(scrollback: usize) -> Self {
        Self {
            scrollback: util::max(scrollback, 1),
            unformatted: VecDeque::new(),
            rows: 0,
            cols: 0,
            scroll: 0,
            formatted: VecDeque::new(),
            empty_formatted_line: ChatFormattedLine {
                fragments: Vec::new(),
                first: true,
            },
        }
    }

    /// Append a chat line, evicting the oldest lines once the scrollback
    /// size is exceeded. An empty `name` denotes a server message.
    pub fn add_line(&mut self, name: &str, text: &str) {
        let line = ChatLine::new(name, text);

        if self.rows > 0 {
            // the formatted view must be kept valid
            let scrolled_at_bottom = self.scroll == self.bottom_scroll_pos();
            let num_added = Self::format_chat_line(&line, self.cols, &mut self.formatted);
            if scrolled_at_bottom {
                self.scroll += num_added as i32;
            }
        }

        self.unformatted.push_back(line);

        if self.unformatted.len() > self.scrollback {
            self.delete_oldest(self.unformatted.len() - self.scrollback);
        }
    }

    pub fn line_count(&self) -> usize {
        self.unformatted.len()
    }

    pub fn scrollback(&self) -> usize {
        self.scrollback
    }

    pub fn get_line(&self, index: usize) -> Option<&ChatLine> {
        self.unformatted.get(index)
    }

    pub fn lines(&self) -> impl Iterator<Item = &ChatLine> {
        self.unformatted.iter()
    }

    /// Increase every line's age by `dtime`.
    pub fn step(&mut self, dtime: f32) {
        for line in &mut self.unformatted {
            line.age += dtime;
        }
    }

    /// Delete the oldest `count` unformatted lines together with the
    /// formatted rows produced from them.
    pub fn delete_oldest(&mut self, count: usize) {
        let mut del_unformatted = 0;
        let mut del_formatted = 0;

        while del_unformatted < count && del_unformatted < self.unformatted.len() {
            del_unformatted += 1;

            // skip the line's first row, then its continuation rows
            if del_formatted < self.formatted.len() {
                debug_assert!(self.formatted[del_formatted].first);
                del_formatted += 1;
                while del_formatted < self.formatted.len() && !self.formatted[del_formatted].first {
                    del_formatted += 1;
                }
            }
        }

        self.unformatted.drain(..del_unformatted);
        self.formatted.drain(..del_formatted);
        // dropping rows above the viewport must not move the visible text
        self.scroll -= del_formatted as i32;
    }

    /// Delete all lines older than `max_age`. Ages grow monotonically, so
    /// the lines to drop form a prefix of the buffer.
    pub fn delete_by_age(&mut self, max_age: f32) {
        let count = self
            .unformatted
            .iter()
            .take_while(|line| line.age > max_age)
            .count();
        self.delete_oldest(count);
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Update console dimensions and rebuild the formatted view. Zero
    /// `rows` or `cols` puts the buffer back into the not-laid-out state.
    pub fn reformat(&mut self, rows: u32, cols: u32) {
        if rows == 0 || cols == 0 {
            self.rows = 0;
            self.cols = 0;
            self.scroll = 0;
            self.formatted.clear();
            return;
        }

        self.rows = rows;
        self.cols = cols;
        self.formatted.clear();
        for line in &self.unformatted {
            Self::format_chat_line(line, cols, &mut self.formatted);
        }
        self.scroll_bottom();
    }

    /// Formatted line for the given on-screen row (0 is the top of the
    /// console). Rows with no content yield a shared empty line.
    pub fn get_formatted_line(&self, row: u32) -> &ChatFormattedLine {
        let index = self.scroll + row as i32;
        if index >= 0 && (index as usize) < self.formatted.len() {
            &self.formatted[index as usize]
        } else {
            &self.empty_formatted_line
        }
    }

    /// Relative scroll; positive rows scroll towards the newest lines.
    pub fn scroll(&mut self, rows: i32) {
        self.scroll_absolute(self.scroll + rows);
    }

    pub fn scroll_absolute(&mut self, scroll: i32) {
        let top = self.top_scroll_pos();
        let bottom = self.bottom_scroll_pos();

        self.scroll = util::max(scroll, top);
        self.scroll = util::min(self.scroll, bottom);
    }

    /// Scroll to the newest lines.
    pub fn scroll_bottom(&mut self) {
        self.scroll = self.bottom_scroll_pos();
    }

    /// Scroll to the oldest lines.
    pub fn scroll_top(&mut self) {
        self.scroll = self.top_scroll_pos();
    }

    /// Word-wrap one chat line to `cols` columns, appending the produced
    /// rows to `destination`. Returns the number of rows appended.
    pub fn format_chat_line(
        line: &ChatLine,
        cols: u32,
        destination: &mut VecDeque<ChatFormattedLine>,
    ) -> u32 {
        debug_assert!(cols > 0);
        let cols = cols as usize;

        let mut num_added = 0u32;
        let mut next_frags: VecDeque<ChatFragment> = VecDeque::new();
        let mut next_line = ChatFormattedLine {
            fragments: Vec::new(),
            first: true,
        };
        let mut out_column = 0usize;

        // the sender prolog; only the name itself is bold
        if !line.name.is_empty() {
            next_frags.push_back(ChatFragment {
                text: "<".to_owned(),
                column: 0,
                bold: false,
            });
            next_frags.push_back(ChatFragment {
                text: line.name.clone(),
                column: 0,
                bold: true,
            });
            next_frags.push_back(ChatFragment {
                text: "> ".to_owned(),
                column: 0,
                bold: false,
            });
        }

        let name_len = line.name.chars().count();
        let mut hanging_indentation = if line.name.is_empty() {
            // server messages
            0
        } else if name_len + 3 <= cols / 2 {
            // names shorter than about half the console width
            name_len + 3
        } else {
            // very long names
            2
        };
        // degenerate console widths must not push rows past the edge
        if hanging_indentation >= cols {
            hanging_indentation = 0;
        }

        let text: Vec<char> = line.text.chars().collect();
        let mut in_pos = 0usize;
        let mut text_processing = false;

        while !next_frags.is_empty() || in_pos < text.len() {
            // lay queued fragments into rows
            while let Some(mut frag) = next_frags.pop_front() {
                let frag_len = frag.text.chars().count();
                if frag_len <= cols - out_column {
                    // fragment fits into the current row
                    frag.column = out_column as u32;
                    out_column += frag_len;
                    next_line.fragments.push(frag);
                } else {
                    // no room for the whole fragment; split at the edge
                    let split = cols - out_column;
                    next_line.fragments.push(ChatFragment {
                        text: frag.text.chars().take(split).collect(),
                        column: out_column as u32,
                        bold: frag.bold,
                    });
                    frag.text = frag.text.chars().skip(split).collect();
                    next_frags.push_front(frag);
                    out_column = cols;
                }

                if out_column == cols || text_processing {
                    // end the current row
                    destination.push_back(mem::replace(
                        &mut next_line,
                        ChatFormattedLine {
                            fragments: Vec::new(),
                            first: false,
                        },
                    ));
                    num_added += 1;
                    out_column = if text_processing {
                        hanging_indentation
                    } else {
                        0
                    };
                }
            }

            // produce the next fragment from the message text, preferring
            // to end it on the last whitespace inside the window
            if in_pos < text.len() {
                let remaining_in_input = text.len() - in_pos;
                let remaining_in_output = cols - out_column;

                let mut frag_length = 1;
                let mut space_pos = 0;
                while frag_length < remaining_in_input && frag_length < remaining_in_output {
                    if text[in_pos + frag_length].is_whitespace() {
                        space_pos = frag_length;
                    }
                    frag_length += 1;
                }
                if space_pos != 0 && frag_length < remaining_in_input {
                    frag_length = space_pos + 1;
                }

                next_frags.push_back(ChatFragment {
                    text: text[in_pos..in_pos + frag_length].iter().collect(),
                    column: 0,
                    bold: false,
                });
                in_pos += frag_length;
                text_processing = true;
            }
        }

        // every chat line maps to at least one row, even an empty one
        if num_added == 0 || !next_line.fragments.is_empty() {
            destination.push_back(next_line);
            num_added += 1;
        }

        num_added
    }

    fn top_scroll_pos(&self) -> i32 {
        let formatted_count = self.formatted.len() as i32;
        let rows = self.rows as i32;
        if rows == 0 {
            0
        } else if formatted_count <= rows {
            0
        } else {
            formatted_count - rows
        }
    }

    fn bottom_scroll_pos(&self) -> i32 {
        let formatted_count = self.formatted.len() as i32;
        let rows = self.rows as i32;
        if rows == 0 {
            0
        } else {
            formatted_count - rows
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[serde(default)]
pub struct ChatBackendConfig {
    pub console_scrollback: usize,
    pub recent_scrollback: usize,
    /// seconds a message stays in the recent-messages buffer
    pub recent_max_age: f32,
}

impl Default for ChatBackendConfig {
    fn default() -> Self {
        Self {
            console_scrollback: 500,
            recent_scrollback: 6,
            recent_max_age: 60.0,
        }
    }
}

impl ChatBackendConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Fans incoming chat messages out to the full console scrollback and the
/// small recent-messages buffer drawn over the game view.
pub struct ChatBackend {
    console_buffer: ChatBuffer,
    recent_buffer: ChatBuffer,
    recent_max_age: f32,
}

impl ChatBackend {
    pub fn new(config: ChatBackendConfig) -> Self {
        Self {
            console_buffer: ChatBuffer::new(config.console_scrollback),
            recent_buffer: ChatBuffer::new(config.recent_scrollback),
            recent_max_age: config.recent_max_age,
        }
    }

    /// Add a chat message to both buffers. A message may span multiple
    /// lines, for example a server MOTD.
    pub fn add_message(&mut self, name: &str, text: &str) {
        for line in text.split('\n') {
            self.console_buffer.add_line(name, line);
            self.recent_buffer.add_line(name, line);
        }
    }

    /// Add a preformatted `"<name> text"` line from an older peer.
    pub fn add_legacy_message(&mut self, line: &str) {
        match line.strip_prefix('<').and_then(|rest| rest.split_once("> ")) {
            Some((name, text)) => self.add_message(name, text),
            None => self.add_message("", line),
        }
    }

    pub fn console_buffer(&self) -> &ChatBuffer {
        &self.console_buffer
    }

    pub fn console_buffer_mut(&mut self) -> &mut ChatBuffer {
        &mut self.console_buffer
    }

    pub fn recent_buffer(&self) -> &ChatBuffer {
        &self.recent_buffer
    }

    pub fn recent_buffer_mut(&mut self) -> &mut ChatBuffer {
        &mut self.recent_buffer
    }

    /// All recent messages joined with newlines.
    pub fn get_recent_chat(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.recent_buffer.lines().enumerate() {
            if i != 0 {
                out.push('\n');
            }
            if !line.name.is_empty() {
                out.push('<');
                out.push_str(&line.name);
                out.push_str("> ");
            }
            out.push_str(&line.text);
        }
        out
    }

    /// Resize the console buffer. The recent buffer is reformatted by the
    /// renderer to its own geometry.
    pub fn reformat(&mut self, rows: u32, cols: u32) {
        trace!("reformatting chat console to {}x{}", rows, cols);
        self.console_buffer.reformat(rows, cols);
    }

    /// Age the recent buffer and expire old entries.
    pub fn step(&mut self, dtime: f32) {
        self.recent_buffer.step(dtime);
        let max_age = self.recent_max_age;
        self.recent_buffer.delete_by_age(max_age);
    }
}

impl Default for ChatBackend {
    fn default() -> Self {
        Self::new(ChatBackendConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(line: &ChatFormattedLine, index: usize) -> &ChatFragment {
        &line.fragments[index]
    }

    #[test]
    fn test_server_message_single_row() {
        let mut buffer = ChatBuffer::new(10);
        buffer.reformat(3, 40);
        buffer.add_line("", "hello");

        assert_eq!(buffer.formatted.len(), 1);
        let row = &buffer.formatted[0];
        assert!(row.first);
        assert_eq!(row.fragments.len(), 1);
        assert_eq!(fragment(row, 0).text, "hello");
        assert_eq!(fragment(row, 0).column, 0);
        assert!(!fragment(row, 0).bold);
    }

    #[test]
    fn test_wrap_with_hanging_indentation() {
        let mut buffer = ChatBuffer::new(10);
        buffer.reformat(5, 20);
        buffer.add_line("bob", "the quick brown fox jumps");

        assert_eq!(buffer.formatted.len(), 3);

        let head = &buffer.formatted[0];
        assert!(head.first);
        assert_eq!(fragment(head, 0).text, "<");
        assert_eq!(fragment(head, 0).column, 0);
        assert!(!fragment(head, 0).bold);
        assert_eq!(fragment(head, 1).text, "bob");
        assert_eq!(fragment(head, 1).column, 1);
        assert!(fragment(head, 1).bold);
        assert_eq!(fragment(head, 2).text, "> ");
        assert_eq!(fragment(head, 2).column, 4);
        assert!(!fragment(head, 2).bold);
        assert_eq!(fragment(head, 3).text, "the quick ");
        assert_eq!(fragment(head, 3).column, 6);

        // continuation rows start at the hanging indent, len("bob") + 3
        for row in buffer.formatted.iter().skip(1) {
            assert!(!row.first);
            assert_eq!(fragment(row, 0).column, 6);
        }
        assert_eq!(fragment(&buffer.formatted[1], 0).text, "brown fox ");
        assert_eq!(fragment(&buffer.formatted[2], 0).text, "jumps");
    }

    #[test]
    fn test_hard_break_without_whitespace() {
        let mut buffer = ChatBuffer::new(10);
        buffer.reformat(5, 10);
        buffer.add_line("", "abcdefghijkl");

        assert_eq!(buffer.formatted.len(), 2);
        assert_eq!(fragment(&buffer.formatted[0], 0).text, "abcdefghij");
        assert_eq!(fragment(&buffer.formatted[1], 0).text, "kl");
        assert_eq!(fragment(&buffer.formatted[1], 0).column, 0);
    }

    #[test]
    fn test_empty_text_still_produces_a_row() {
        let mut buffer = ChatBuffer::new(10);
        buffer.reformat(3, 20);
        buffer.add_line("bob", "");
        buffer.add_line("", "");

        assert_eq!(buffer.formatted.len(), 2);
        assert!(buffer.formatted[0].first);
        assert_eq!(buffer.formatted[0].fragments.len(), 3);
        assert!(buffer.formatted[1].first);
        assert!(buffer.formatted[1].fragments.is_empty());
    }

    #[test]
    fn test_scrollback_eviction() {
        let mut buffer = ChatBuffer::new(2);
        buffer.reformat(5, 40);
        buffer.add_line("", "A");
        buffer.add_line("", "B");
        buffer.add_line("", "C");

        assert_eq!(buffer.line_count(), 2);
        assert_eq!(buffer.get_line(0).unwrap().text, "B");
        assert_eq!(buffer.get_line(1).unwrap().text, "C");

        // the formatted prefix belonging to A is gone as well
        assert_eq!(buffer.formatted.len(), 2);
        assert_eq!(fragment(&buffer.formatted[0], 0).text, "B");
    }

    #[test]
    fn test_scroll_stays_pinned_on_add() {
        let mut buffer = ChatBuffer::new(10);
        buffer.reformat(2, 40);
        for i in 1..=5 {
            buffer.add_line("", &format!("line {}", i));
        }
        buffer.scroll_bottom();
        buffer.add_line("", "line 6");

        assert_eq!(buffer.scroll, buffer.bottom_scroll_pos());
        assert_eq!(fragment(buffer.get_formatted_line(0), 0).text, "line 5");
        assert_eq!(fragment(buffer.get_formatted_line(1), 0).text, "line 6");
    }

    #[test]
    fn test_scroll_stays_pinned_across_eviction() {
        let mut buffer = ChatBuffer::new(2);
        buffer.reformat(2, 40);
        for i in 1..=4 {
            buffer.add_line("", &format!("line {}", i));
            assert_eq!(buffer.scroll, buffer.bottom_scroll_pos());
        }
        assert_eq!(fragment(buffer.get_formatted_line(1), 0).text, "line 4");
    }

    #[test]
    fn test_first_markers_match_line_count() {
        let mut buffer = ChatBuffer::new(6);
        buffer.reformat(4, 12);
        buffer.add_line("somebody", "a rather long message that wraps a few times");
        buffer.add_line("", "short");
        buffer.add_line("bob", "another fairly long message to wrap around");
        buffer.delete_oldest(1);

        let firsts = buffer.formatted.iter().filter(|line| line.first).count();
        assert_eq!(firsts, buffer.line_count());

        buffer.reformat(3, 20);
        let firsts = buffer.formatted.iter().filter(|line| line.first).count();
        assert_eq!(firsts, buffer.line_count());
    }

    #[test]
    fn test_fragments_stay_within_columns() {
        let cols = 13;
        let mut buffer = ChatBuffer::new(10);
        buffer.reformat(5, cols);
        buffer.add_line("longplayername", "word word word supercalifragilistic word");
        buffer.add_line("", "plain server broadcast text");
        buffer.add_line("ann", "tail");

        for line in &buffer.formatted {
            for frag in &line.fragments {
                assert!(frag.column as usize + frag.text.chars().count() <= cols as usize);
            }
        }
    }

    #[test]
    fn test_reformat_is_idempotent() {
        let mut buffer = ChatBuffer::new(10);
        buffer.add_line("bob", "the quick brown fox jumps over the lazy dog");
        buffer.add_line("", "server notice");

        buffer.reformat(4, 18);
        let formatted: Vec<_> = buffer.formatted.iter().cloned().collect();
        let scroll = buffer.scroll;

        buffer.reformat(4, 18);
        assert_eq!(buffer.formatted.iter().cloned().collect::<Vec<_>>(), formatted);
        assert_eq!(buffer.scroll, scroll);
    }

    #[test]
    fn test_reformat_to_zero_clears() {
        let mut buffer = ChatBuffer::new(10);
        buffer.reformat(4, 18);
        buffer.add_line("", "whatever");

        buffer.reformat(0, 18);
        assert_eq!(buffer.rows(), 0);
        assert_eq!(buffer.cols(), 0);
        assert!(buffer.formatted.is_empty());
        assert_eq!(buffer.scroll, 0);
        // the unformatted side is unaffected
        assert_eq!(buffer.line_count(), 1);
    }

    #[test]
    fn test_out_of_range_rows_yield_the_empty_line() {
        let mut buffer = ChatBuffer::new(10);
        buffer.reformat(4, 20);

        let line = buffer.get_formatted_line(17);
        assert!(line.first);
        assert!(line.fragments.is_empty());
    }

    #[test]
    fn test_scroll_clamping() {
        let mut buffer = ChatBuffer::new(10);
        buffer.reformat(2, 40);
        for i in 0..5 {
            buffer.add_line("", &format!("{}", i));
        }

        buffer.scroll_absolute(1000);
        assert_eq!(buffer.scroll, buffer.bottom_scroll_pos());
        buffer.scroll_absolute(-1000);
        assert_eq!(buffer.scroll, buffer.top_scroll_pos());
        buffer.scroll(1000);
        assert_eq!(buffer.scroll, buffer.bottom_scroll_pos());
    }

    #[test]
    fn test_zero_scrollback_is_coerced() {
        let buffer = ChatBuffer::new(0);
        assert_eq!(buffer.scrollback(), 1);
    }

    #[test]
    fn test_step_and_delete_by_age() {
        let mut buffer = ChatBuffer::new(10);
        buffer.add_line("", "old one");
        buffer.add_line("", "old two");
        buffer.step(5.0);
        buffer.add_line("", "new");

        buffer.delete_by_age(2.0);
        assert_eq!(buffer.line_count(), 1);
        assert_eq!(buffer.get_line(0).unwrap().text, "new");
        assert!(buffer.get_line(0).unwrap().age < 2.0);
    }

    #[test]
    fn test_backend_splits_multiline_messages() {
        let mut backend = ChatBackend::default();
        backend.add_message("", "first line\nsecond line");

        assert_eq!(backend.console_buffer().line_count(), 2);
        assert_eq!(backend.recent_buffer().line_count(), 2);
        assert_eq!(backend.console_buffer().get_line(1).unwrap().text, "second line");
    }

    #[test]
    fn test_backend_legacy_message_parsing() {
        let mut backend = ChatBackend::default();
        backend.add_legacy_message("<alice> hi there");
        backend.add_legacy_message("plain server line");

        let console = backend.console_buffer();
        assert_eq!(console.get_line(0).unwrap().name, "alice");
        assert_eq!(console.get_line(0).unwrap().text, "hi there");
        assert_eq!(console.get_line(1).unwrap().name, "");
        assert_eq!(console.get_line(1).unwrap().text, "plain server line");
    }

    #[test]
    fn test_recent_chat_concatenation() {
        let mut backend = ChatBackend::default();
        backend.add_message("", "welcome");
        backend.add_message("bob", "hello");

        assert_eq!(backend.get_recent_chat(), "welcome\n<bob> hello");
    }

    #[test]
    fn test_recent_messages_age_out() {
        let mut backend = ChatBackend::new(ChatBackendConfig {
            recent_max_age: 10.0,
            ..Default::default()
        });
        backend.add_message("bob", "hello");
        backend.step(5.0);
        assert_eq!(backend.recent_buffer().line_count(), 1);

        backend.step(6.0);
        assert_eq!(backend.recent_buffer().line_count(), 0);
        assert_eq!(backend.get_recent_chat(), "");
        // the console scrollback is not aged out
        assert_eq!(backend.console_buffer().line_count(), 1);
    }

    #[test]
    fn test_config_from_json() {
        let config =
            ChatBackendConfig::from_json(r#"{ "console-scrollback": 100, "recent-max-age": 5.0 }"#)
                .unwrap();
        assert_eq!(config.console_scrollback, 100);
        assert_eq!(config.recent_scrollback, 6);
        assert_eq!(config.recent_max_age, 5.0);
    }
}
