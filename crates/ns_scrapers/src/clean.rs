//! Text clean-up applied to every extracted field.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Attribution lines. Each removes from the marker to the end of its line.
    static ref LINE_PATTERNS: Vec<Regex> = [
        r"责任编辑[：:].*$",
        r"编辑[：:].*$",
        r"来源[：:].*$",
        r"原标题[：:].*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect();

    static ref INLINE_PATTERNS: Vec<Regex> = [
        r"[(（]\s*责编[：:][^)）]*[)）]",
        r"点击进入专题[：:>＞]?",
        r"更多精彩内容[，,]?",
        r"相关新闻[：:]?",
        r"【[^】]*】",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect();

    static ref URL: Regex =
        Regex::new(r"https?://[A-Za-z0-9$\-_@.&+!*(),%/?=#:;~]+").expect("valid regex");

    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid regex");
}

/// Strip boilerplate and URLs line by line, then collapse every
/// whitespace run (newlines included) into a single space.
pub fn clean_text(raw: &str) -> String {
    let lines: Vec<String> = raw.lines().map(clean_line).collect();
    collapse_whitespace(&lines.join("\n"))
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn clean_line(line: &str) -> String {
    let mut line = URL.replace_all(line, "").into_owned();
    for pattern in LINE_PATTERNS.iter() {
        line = pattern.replace(&line, "").into_owned();
    }
    for pattern in INLINE_PATTERNS.iter() {
        line = pattern.replace_all(&line, "").into_owned();
    }
    line
}
