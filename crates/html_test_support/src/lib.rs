//! Test helpers for the render engine: a model of the client patch script,
//! golden case loading and readable diffs.

pub mod fixtures;
pub mod replay;

pub use replay::ClientDocument;

/// Make control characters and quotes visible in assertion output.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ch if ch < ' ' => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\u{{{:02X}}}", ch as u32);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Split markup after every `>` so diffs point at the offending tag.
pub fn markup_lines(markup: &str) -> Vec<String> {
    markup
        .split_inclusive('>')
        .map(escape_text)
        .collect()
}

/// Describe the first mismatching line with two lines of context.
pub fn diff_lines(expected: &[String], actual: &[String]) -> String {
    use std::fmt::Write;
    fn line(lines: &[String], i: usize) -> &str {
        lines.get(i).map_or("<missing>", String::as_str)
    }
    let max = expected.len().max(actual.len());
    let mut out = String::new();

    match (0..max).find(|&i| line(expected, i) != line(actual, i)) {
        Some(i) => {
            let start = i.saturating_sub(2);
            let end = (i + 3).min(max);
            let _ = writeln!(
                &mut out,
                "first mismatch at line {} (showing {}..={}):",
                i + 1,
                start + 1,
                end
            );
            for at in start..end {
                let marker = if at == i { ">" } else { " " };
                let _ = writeln!(&mut out, "{marker} {:>4}  expected: {}", at + 1, line(expected, at));
                let _ = writeln!(&mut out, "{marker} {:>4}    actual: {}", at + 1, line(actual, at));
            }
        }
        None => {
            let _ = writeln!(&mut out, "no mismatch");
        }
    }
    let _ = writeln!(
        &mut out,
        "expected {} lines, actual {} lines",
        expected.len(),
        actual.len()
    );
    out
}

/// Assert two markup strings are equal, printing a tag-level diff.
pub fn assert_markup_eq(expected: &str, actual: &str) {
    if expected != actual {
        panic!(
            "markup differs\n{}",
            diff_lines(&markup_lines(expected), &markup_lines(actual))
        );
    }
}
