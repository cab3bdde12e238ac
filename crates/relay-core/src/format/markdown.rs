//! Markdown detection and light formatting for platform messages.

use std::sync::LazyLock;

use regex::RegexSet;

/// Fallback title when the text offers none.
pub const DEFAULT_TITLE: &str = "处理结果";

const TITLE_MAX_CHARS: usize = 50;

static MARKDOWN_PATTERNS: LazyLock<Option<RegexSet>> = LazyLock::new(|| {
    RegexSet::new([
        r"(?m)^#+\s",          // heading
        r"\*\*.*?\*\*",        // bold
        r"__.*?__",            // bold
        r"\*.*?\*",            // italic
        r"_.*?_",              // italic
        r"`.*?`",              // inline code
        r"```",                // fence
        r"(?m)^\*\s",          // bullet
        r"(?m)^\d+\.\s",       // ordered item
        r"(?m)^\s*>\s",        // quote
        r"\[.*?\]\(.*?\)",     // link
        r"---",                // rule
        r"=+",                 // setext rule
    ])
    .ok()
});

/// Whether `text` carries any common Markdown markup.
pub fn is_markdown(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    MARKDOWN_PATTERNS
        .as_ref()
        .is_some_and(|set| set.is_match(text))
}

/// Title and body for a Markdown message.
///
/// When no title is given it is derived from the first meaningful line
/// (headings are skipped for Markdown input), capped at 50 characters.
pub fn convert_to_markdown(text: &str, title: Option<&str>) -> (String, String) {
    if let Some(t) = title.filter(|t| !t.is_empty()) {
        return (t.to_owned(), text.to_owned());
    }

    let skip_headings = is_markdown(text);
    let derived = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find(|l| !(skip_headings && l.starts_with('#')))
        .map(|l| l.chars().take(TITLE_MAX_CHARS).collect::<String>())
        .unwrap_or_else(|| DEFAULT_TITLE.to_owned());

    (derived, text.to_owned())
}

pub fn format_code_block(code: &str, language: &str) -> String {
    let language = if language.is_empty() { "text" } else { language };
    format!("```{language}\n{code}\n```")
}

pub fn format_list<S: AsRef<str>>(items: &[S], ordered: bool) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if ordered {
                format!("{}. {}", i + 1, item.as_ref())
            } else {
                format!("* {}", item.as_ref())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_quote(text: &str) -> String {
    text.split('\n')
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pipe table with columns padded to the widest cell.
pub fn format_table<S: AsRef<str>>(rows: &[Vec<S>], headers: Option<&[S]>) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };

    let width = |s: &str| s.chars().count();
    let widths: Vec<usize> = (0..first.len())
        .map(|col| {
            let header = headers
                .and_then(|h| h.get(col))
                .map_or(0, |h| width(h.as_ref()));
            rows.iter()
                .filter_map(|r| r.get(col))
                .map(|c| width(c.as_ref()))
                .fold(header, usize::max)
        })
        .collect();

    let render = |cells: &[S]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| {
                let c = c.as_ref();
                format!("{c}{}", " ".repeat(w.saturating_sub(width(c))))
            })
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    if let Some(headers) = headers {
        lines.push(render(headers));
        lines.push(
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }
    lines.extend(rows.iter().map(|r| render(r)));
    lines.join("\n")
}

/// Backslash-escape Markdown control characters.
pub fn escape_markdown(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '\\', '`', '*', '_', '{', '}', '[', ']', '(', ')', '#', '+', '-', '.', '!', '|',
    ];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
