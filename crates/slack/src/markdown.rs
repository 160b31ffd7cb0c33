//! CommonMark-ish model output to Slack `mrkdwn`.
//!
//! Fenced code blocks and inline code spans pass through untouched.

use std::sync::OnceLock;

use regex::Regex;

const BOLD_MARKER: char = '\u{1}';

struct Patterns {
    heading: Regex,
    bullet: Regex,
    bold: Regex,
    italic: Regex,
    strike: Regex,
    link: Regex,
    inline_code: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        heading: compile(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$"),
        bullet: compile(r"^(\s*)[-*+]\s+"),
        bold: compile(r"\*\*(.+?)\*\*|__(.+?)__"),
        italic: compile(r"\*([^*\s][^*]*?)\*"),
        strike: compile(r"~~(.+?)~~"),
        link: compile(r"!?\[([^\]]+)\]\(([^)\s]+)\)"),
        inline_code: compile(r"`[^`\n]*`"),
    })
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern)
        .unwrap_or_else(|error| panic!("invalid built-in pattern {pattern}: {error}"))
}

pub fn markdown_to_mrkdwn(markdown: &str) -> String {
    if markdown.is_empty() {
        return String::new();
    }

    let mut output = Vec::new();
    let mut in_fence = false;

    for line in markdown.split('\n') {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            output.push(line.to_owned());
            continue;
        }
        if in_fence {
            output.push(line.to_owned());
        } else {
            output.push(convert_line(line));
        }
    }

    output.join("\n")
}

fn convert_line(line: &str) -> String {
    let patterns = patterns();

    if let Some(captures) = patterns.heading.captures(line) {
        let title = convert_inline(&captures[1]).replace('*', "");
        return format!("*{title}*");
    }

    let line = patterns.bullet.replace(line, "$1• ");
    convert_inline(&line)
}

fn convert_inline(text: &str) -> String {
    let patterns = patterns();
    let mut converted = String::with_capacity(text.len());
    let mut cursor = 0;

    for code in patterns.inline_code.find_iter(text) {
        converted.push_str(&convert_prose(&text[cursor..code.start()]));
        converted.push_str(code.as_str());
        cursor = code.end();
    }
    converted.push_str(&convert_prose(&text[cursor..]));
    converted
}

fn convert_prose(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let patterns = patterns();

    let text = patterns.link.replace_all(text, "<$2|$1>");
    let text = patterns.bold.replace_all(&text, |captures: &regex::Captures<'_>| {
        let inner = captures.get(1).or_else(|| captures.get(2)).map_or("", |m| m.as_str());
        format!("{BOLD_MARKER}{inner}{BOLD_MARKER}")
    });
    let text = patterns.italic.replace_all(&text, "_${1}_");
    let text = patterns.strike.replace_all(&text, "~$1~");

    text.replace(BOLD_MARKER, "*")
}
