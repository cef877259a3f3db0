#![no_main]

use html::{AttrValue, Element, Node, RenderContext, escape_html, render_to_string};
use libfuzzer_sys::fuzz_target;

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let escaped = escape_html(input);
    assert!(!escaped.contains(['<', '>', '"', '\'']));
    assert_eq!(unescape(&escaped), input);

    // Text children and attribute values share the escaper.
    let cx = RenderContext::default();
    let node: Node = Element::new("p")
        .attr("title", AttrValue::from(input))
        .child(input)
        .into();
    let Ok(markup) = pollster::block_on(render_to_string(node, &cx)) else {
        return;
    };
    let expected = format!("<p title=\"{escaped}\">{escaped}</p>");
    assert_eq!(markup.as_str(), expected);
});
