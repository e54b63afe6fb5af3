//! Text-field utilities for kernel-emitted procfs content
//!
//! Malformed input yields `None` and never panics; callers treat bad text
//! like missing data.

/// Maximum length in bytes of a process display name.
pub const MAX_NAME_LEN: usize = 255;

/// Return the `n`-th whitespace-separated token of `s`.
pub fn nth_token(s: &str, n: usize) -> Option<&str> {
    s.split_ascii_whitespace().nth(n)
}

/// Return the text following the first `n` newlines of `s`.
///
/// `skip_lines(s, 0)` is `s` itself; `None` once the text runs out of lines.
pub fn skip_lines(s: &str, n: usize) -> Option<&str> {
    let mut rest = s;
    for _ in 0..n {
        let idx = rest.find('\n')?;
        rest = &rest[idx + 1..];
    }
    Some(rest)
}

/// Strict integer parse: leading whitespace allowed, trailing garbage is not.
pub fn parse_int<T: std::str::FromStr>(s: &str) -> Option<T> {
    s.trim_start().parse().ok()
}

/// Strict floating-point parse with the same rules as [`parse_int`].
pub fn parse_f64(s: &str) -> Option<f64> {
    let v: f64 = s.trim_start().parse().ok()?;
    v.is_finite().then_some(v)
}

/// Lenient parse of the leading decimal digits of `s`, after whitespace.
///
/// Used for fixed-width columns where the number is followed by a unit or
/// the rest of the line. Returns `None` when no digit is present.
pub fn leading_u64(s: &str) -> Option<u64> {
    let s = s.trim_start();
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}

/// Truncate `s` to at most `max` bytes without splitting a character.
pub fn truncate_name(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Flatten a `/proc/<pid>/cmdline` buffer into a display string.
///
/// NUL separators become spaces; trailing separators are dropped. Kernel
/// threads have an empty command line, which yields `None`.
pub fn flatten_cmdline(raw: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(raw)
        .chars()
        .map(|c| if c == '\0' { ' ' } else { c })
        .collect();
    let text = text.trim_end();
    if text.is_empty() {
        return None;
    }
    Some(truncate_name(text, MAX_NAME_LEN).to_string())
}

/// Extract the command name from `/proc/<pid>/stat`.
/// Format: "pid (comm) state ppid ..."
pub fn extract_comm(stat_line: &str) -> Option<&str> {
    let open = stat_line.find('(')?;
    let close = stat_line.rfind(')')?;
    if open >= close {
        return None;
    }
    Some(&stat_line[open + 1..close])
}

/// Extract the parent pid from `/proc/<pid>/stat`.
///
/// The comm field may itself contain spaces and parentheses, so fields are
/// counted from the last closing parenthesis.
pub fn extract_ppid(stat_line: &str) -> Option<u32> {
    let close = stat_line.rfind(')')?;
    let rest = &stat_line[close + 1..];
    // state, then ppid
    nth_token(rest, 1).and_then(parse_int)
}
