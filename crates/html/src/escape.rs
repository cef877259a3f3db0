//! HTML escaping for text and attribute values.
//!
//! Contract:
//! - Exactly `&`, `<`, `>`, `'` and `"` are replaced, by `&amp;`, `&lt;`,
//!   `&gt;`, `&#39;` and `&quot;`.
//! - Every other byte is copied unchanged (UTF-8 is preserved).
//! - Input without any of those bytes is returned/appended as-is.
//! - Conversion is a single forward pass starting at the first match.

use memchr::{memchr2, memchr3};
use std::borrow::Cow;

fn first_special(bytes: &[u8]) -> Option<usize> {
    let markup = memchr3(b'&', b'<', b'>', bytes);
    // Quotes only matter if they come before the first markup byte.
    let limit = markup.unwrap_or(bytes.len());
    let quote = memchr2(b'"', b'\'', &bytes[..limit]);
    quote.or(markup)
}

fn entity(byte: u8) -> Option<&'static str> {
    match byte {
        b'"' => Some("&quot;"),
        b'\'' => Some("&#39;"),
        b'&' => Some("&amp;"),
        b'<' => Some("&lt;"),
        b'>' => Some("&gt;"),
        _ => None,
    }
}

fn escape_from(text: &str, first: usize, out: &mut String) {
    let bytes = text.as_bytes();
    let mut copy_start = 0;
    for (i, &byte) in bytes.iter().enumerate().skip(first) {
        let Some(replacement) = entity(byte) else {
            continue;
        };
        // Matched bytes are ASCII, so `i` is always a char boundary.
        out.push_str(&text[copy_start..i]);
        out.push_str(replacement);
        copy_start = i + 1;
    }
    out.push_str(&text[copy_start..]);
}

/// Append `text` to `out`, escaped.
pub fn escape_to_buffer(text: &str, out: &mut String) {
    match first_special(text.as_bytes()) {
        None => out.push_str(text),
        Some(first) => {
            out.reserve(text.len() + 8);
            escape_from(text, first, out);
        }
    }
}

/// Escape `text`, borrowing when nothing needs replacing.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    match first_special(text.as_bytes()) {
        None => Cow::Borrowed(text),
        Some(first) => {
            let mut out = String::with_capacity(text.len() + 8);
            escape_from(text, first, &mut out);
            Cow::Owned(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_each_control_character() {
        assert_eq!(escape_html("&"), "&amp;");
        assert_eq!(escape_html("<"), "&lt;");
        assert_eq!(escape_html(">"), "&gt;");
        assert_eq!(escape_html("'"), "&#39;");
        assert_eq!(escape_html("\""), "&quot;");
    }

    #[test]
    fn clean_input_is_borrowed() {
        assert!(matches!(escape_html("plain text"), Cow::Borrowed("plain text")));
        assert!(matches!(escape_html(""), Cow::Borrowed("")));
    }

    #[test]
    fn mixed_input_keeps_other_bytes() {
        assert_eq!(
            escape_html(r#"a < b && "c" > 'd'"#),
            "a &lt; b &amp;&amp; &quot;c&quot; &gt; &#39;d&#39;"
        );
    }

    #[test]
    fn preserves_utf8_around_matches() {
        assert_eq!(escape_html("café <b>π</b> 😀"), "café &lt;b&gt;π&lt;/b&gt; 😀");
    }

    #[test]
    fn quote_before_markup_is_found_first() {
        assert_eq!(escape_html("x\"y<z"), "x&quot;y&lt;z");
        assert_eq!(escape_html("x<y\"z"), "x&lt;y&quot;z");
    }

    #[test]
    fn appends_to_existing_buffer() {
        let mut out = String::from("<p>");
        escape_to_buffer("1 < 2", &mut out);
        escape_to_buffer(" ok", &mut out);
        assert_eq!(out, "<p>1 &lt; 2 ok");
    }

    #[test]
    fn escaping_escaped_text_escapes_ampersands_again() {
        // Callers must not run escaped output through here; SafeString exists for that.
        assert_eq!(escape_html("&amp;"), "&amp;amp;");
    }

    #[test]
    fn every_non_special_byte_is_unchanged() {
        let sample: String = (0u8..128)
            .map(char::from)
            .filter(|c| !matches!(c, '&' | '<' | '>' | '\'' | '"'))
            .collect();
        assert_eq!(escape_html(&sample), sample);
    }
}
