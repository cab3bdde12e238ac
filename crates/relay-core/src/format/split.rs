//! Splitting long replies into platform-sized fragments.
//!
//! Lengths are counted in characters. Fragments always concatenate back to
//! the original text.

use crate::domain::ContentKind;

/// Platform limit per message.
pub const MAX_MESSAGE_LENGTH: usize = 20_000;

/// Split `content` into fragments of at most `max_len` characters.
///
/// - Boundaries fall at line ends, so every fragment but the last ends with `\n`.
/// - Markdown prefers heading boundaries: whole sections are packed first.
/// - A single line longer than `max_len` is cut at character boundaries.
pub fn split_content(content: &str, max_len: usize, kind: ContentKind) -> Vec<String> {
    let max_len = max_len.max(1);
    if char_len(content) <= max_len {
        return vec![content.to_owned()];
    }

    match kind {
        ContentKind::Text => pack_lines(content, max_len),
        ContentKind::Markdown => pack_sections(content, max_len),
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Greedy packing of pieces into fragments.
#[derive(Default)]
struct Packer {
    fragments: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn push(&mut self, piece: &str, piece_len: usize, max_len: usize) {
        if self.current_len + piece_len > max_len {
            self.flush();
        }
        self.current.push_str(piece);
        self.current_len += piece_len;
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.fragments.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.fragments
    }
}

/// Lines (with their `\n`), long ones pre-cut to `max_len` characters.
fn pieces(text: &str, max_len: usize) -> impl Iterator<Item = (&str, usize)> {
    text.split_inclusive('\n').flat_map(move |line| hard_cut(line, max_len))
}

fn hard_cut(line: &str, max_len: usize) -> Vec<(&str, usize)> {
    let len = char_len(line);
    if len <= max_len {
        return vec![(line, len)];
    }

    let mut out = Vec::with_capacity(len / max_len + 1);
    let mut rest = line;
    while !rest.is_empty() {
        let cut = rest
            .char_indices()
            .nth(max_len)
            .map_or(rest.len(), |(idx, _)| idx);
        let (head, tail) = rest.split_at(cut);
        out.push((head, char_len(head)));
        rest = tail;
    }
    out
}

fn pack_lines(text: &str, max_len: usize) -> Vec<String> {
    let mut packer = Packer::default();
    for (piece, len) in pieces(text, max_len) {
        packer.push(piece, len, max_len);
    }
    packer.finish()
}

/// Sections start at lines beginning with `#`.
fn sections(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.starts_with('#') && offset > start {
            out.push(&text[start..offset]);
            start = offset;
        }
        offset += line.len();
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn pack_sections(text: &str, max_len: usize) -> Vec<String> {
    let mut packer = Packer::default();
    for section in sections(text) {
        let len = char_len(section);
        if len <= max_len {
            packer.push(section, len, max_len);
            continue;
        }

        // Oversized section: start fresh and fall back to line packing.
        packer.flush();
        for (piece, piece_len) in pieces(section, max_len) {
            packer.push(piece, piece_len, max_len);
        }
        packer.flush();
    }
    packer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(input: &str, fragments: &[String], max_len: usize) {
        assert_eq!(fragments.concat(), input, "fragments must reassemble the input");
        for f in fragments {
            assert!(char_len(f) <= max_len, "fragment of {} chars", char_len(f));
            assert!(!f.is_empty());
        }
    }

    #[test]
    fn short_content_is_a_single_fragment() {
        let out = split_content("你好", 10, ContentKind::Text);
        assert_eq!(out, vec!["你好".to_string()]);
        assert_eq!(split_content("", 10, ContentKind::Text), vec![String::new()]);
    }

    #[test]
    fn large_reply_splits_into_three_at_newlines() {
        // 450 lines of 100 chars (99 + '\n') = 45 000 chars.
        let line = format!("{}\n", "报".repeat(99));
        let input = line.repeat(450);
        assert_eq!(char_len(&input), 45_000);

        let out = split_content(&input, MAX_MESSAGE_LENGTH, ContentKind::Text);

        assert_eq!(out.len(), 3);
        assert_well_formed(&input, &out, MAX_MESSAGE_LENGTH);
        for f in &out {
            assert!(f.ends_with('\n'));
        }
    }

    #[test]
    fn boundaries_fall_at_line_ends() {
        let input = "aaa\nbbb\nccc\nddd";
        let out = split_content(input, 9, ContentKind::Text);
        assert_eq!(out, vec!["aaa\nbbb\n", "ccc\nddd"]);
        assert_well_formed(input, &out, 9);
    }

    #[test]
    fn overlong_line_is_hard_cut() {
        let input = format!("{}\nend", "x".repeat(25));
        let out = split_content(&input, 10, ContentKind::Text);
        assert_eq!(out[0], "x".repeat(10));
        assert_eq!(out[1], "x".repeat(10));
        assert_well_formed(&input, &out, 10);
    }

    #[test]
    fn hard_cut_respects_multibyte_chars() {
        let input = "分析".repeat(7);
        let out = split_content(&input, 5, ContentKind::Text);
        assert_eq!(out.len(), 3);
        assert_well_formed(&input, &out, 5);
    }

    #[test]
    fn markdown_keeps_sections_together() {
        let input = "# A\naaaa\n# B\nbbbbbbbb\n# C\ncc\n";
        // A = 9 chars, B = 13, C = 7.
        let out = split_content(input, 20, ContentKind::Markdown);
        assert_eq!(out, vec!["# A\naaaa\n", "# B\nbbbbbbbb\n# C\ncc\n"]);
        assert_well_formed(input, &out, 20);
    }

    #[test]
    fn oversized_section_falls_back_to_lines() {
        let input = "intro\n# Big\nline-one\nline-two\nline-three\n# Small\nok\n";
        let out = split_content(input, 20, ContentKind::Markdown);
        assert_well_formed(input, &out, 20);
        assert!(out.iter().any(|f| f.starts_with("# Small")));
        for f in &out[..out.len() - 1] {
            assert!(f.ends_with('\n'));
        }
    }

    #[test]
    fn text_mode_ignores_headings() {
        let input = "# A\naaaa\n# B\nbbbbbbbb\n";
        let out = split_content(input, 20, ContentKind::Text);
        assert_eq!(out, vec!["# A\naaaa\n# B\n", "bbbbbbbb\n"]);
    }
}
