//! ASCII speech bubbles for rendered turns

/// Column at which bubble text wraps
pub const WRAP_WIDTH: usize = 50;

/// Greedy word wrap. Words longer than `width` are hard-split; blank input
/// lines are kept so paragraphs survive.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            for piece in split_long_word(word, width) {
                let piece_len = piece.chars().count();
                if current_len > 0 && current_len + 1 + piece_len > width {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.push_str(&piece);
                current_len += piece_len;
            }
        }
        lines.push(current);
    }

    // Trim blank lines at either end, keep interior paragraph breaks
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.is_empty()).count();
    lines.drain(..leading);
    lines
}

fn split_long_word(word: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}

/// Box `text` under a centered `title`:
///
/// ```text
/// ┌── You ──┐
/// │ hello   │
/// └─────────┘
/// ```
pub fn create_bubble(title: &str, text: &str) -> String {
    let lines = wrap_text(text, WRAP_WIDTH);
    let max_width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    let title = format!(" {title} ");
    let title_len = title.chars().count();
    let inner_width = (max_width + 2).max(title_len);
    let left_pad = (inner_width - title_len) / 2;
    let right_pad = inner_width - title_len - left_pad;

    let mut out = String::new();
    out.push('┌');
    out.push_str(&"─".repeat(left_pad));
    out.push_str(&title);
    out.push_str(&"─".repeat(right_pad));
    out.push_str("┐\n");

    for line in &lines {
        let fill = inner_width - 1 - line.chars().count();
        out.push_str("│ ");
        out.push_str(line);
        out.push_str(&" ".repeat(fill));
        out.push_str("│\n");
    }

    out.push('└');
    out.push_str(&"─".repeat(inner_width));
    out.push('┘');
    out
}
