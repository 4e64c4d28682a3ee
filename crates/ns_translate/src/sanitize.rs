/// Prepare text for the wire: drop NUL bytes and other C0 control
/// characters (keeping line structure), and the U+FFFD markers a lossy
/// decode leaves behind.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| match *c {
            '\n' | '\r' | '\t' => true,
            '\u{FFFD}' => false,
            c => !c.is_control(),
        })
        .collect::<String>()
        .trim()
        .to_string()
}
