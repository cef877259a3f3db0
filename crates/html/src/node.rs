//! The node tree and its synchronous serialization.
//!
//! Child rules:
//! - `Empty` (and `None`/`bool` children converted through `From`) write
//!   nothing.
//! - `Text` is escaped; `Number` and `Safe` are written verbatim.
//! - `Fragment` splices its children with no wrapping markup.
//! - `Component` is invoked once and its result written with these rules.
//! - `Pending` opens a new buffer frontier instead of blocking.

use crate::attr::{AttrValue, is_raw_html_attr, write_attr};
use crate::buffer::StringBuffer;
use crate::context::RenderContext;
use crate::error::{RenderError, RenderResult};
use crate::safe::SafeString;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::fmt;
use std::future::Future;

const VOID_TAGS: [&str; 15] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

/// A value that settles into a node later.
pub struct PendingNode(LocalBoxFuture<'static, RenderResult<Node>>);

impl PendingNode {
    pub fn new(future: impl Future<Output = RenderResult<Node>> + 'static) -> Self {
        Self(future.boxed_local())
    }

    pub fn ready(node: Node) -> Self {
        Self::new(async move { Ok(node) })
    }

    pub fn into_future(self) -> LocalBoxFuture<'static, RenderResult<Node>> {
        self.0
    }
}

impl fmt::Debug for PendingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingNode")
    }
}

#[derive(Debug)]
pub enum Node {
    Empty,
    Text(String),
    Number(f64),
    Safe(SafeString),
    Element(Element),
    Component(Component),
    Fragment(Vec<Node>),
    Pending(PendingNode),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    /// Already-escaped markup.
    pub fn raw(markup: impl Into<String>) -> Self {
        Node::Safe(SafeString::new(markup))
    }

    pub fn element<K: Into<String>>(
        tag: impl Into<String>,
        attrs: impl IntoIterator<Item = (K, AttrValue)>,
        children: Vec<Node>,
    ) -> Self {
        let mut element = Element::new(tag);
        for (name, value) in attrs {
            element = element.attr(name, value);
        }
        Node::Element(element.children(children))
    }

    pub fn component(
        render: impl FnOnce(Props, &RenderContext) -> RenderResult<Node> + 'static,
        props: Props,
    ) -> Self {
        Node::Component(Component::new(render).with_props(props))
    }

    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Self {
        Node::Fragment(children.into_iter().collect())
    }

    pub fn pending(future: impl Future<Output = RenderResult<Node>> + 'static) -> Self {
        Node::Pending(PendingNode::new(future))
    }

    /// Serialize into `buf`, opening frontiers for pending values.
    pub fn write_to(self, buf: &mut StringBuffer, cx: &RenderContext) -> RenderResult<()> {
        match self {
            Node::Empty => {}
            Node::Text(text) => buf.push_escaped(&text),
            Node::Number(n) => buf.push_str(&format_number(n)),
            Node::Safe(safe) => buf.push_safe(safe),
            Node::Element(element) => element.write_to(buf, cx)?,
            Node::Component(component) => component.invoke(cx)?.write_to(buf, cx)?,
            Node::Fragment(children) => {
                for child in children {
                    child.write_to(buf, cx)?;
                }
            }
            Node::Pending(pending) => buf.push_pending(pending),
        }
        Ok(())
    }

    pub fn render(self, cx: &RenderContext) -> RenderResult<StringBuffer> {
        let mut buf = StringBuffer::new();
        self.write_to(&mut buf, cx)?;
        Ok(buf)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Text(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Text(value)
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Number(value)
    }
}

impl From<i32> for Node {
    fn from(value: i32) -> Self {
        Node::Number(f64::from(value))
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Number(value as f64)
    }
}

impl From<usize> for Node {
    fn from(value: usize) -> Self {
        Node::Number(value as f64)
    }
}

/// Boolean children render nothing.
impl From<bool> for Node {
    fn from(_: bool) -> Self {
        Node::Empty
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map_or(Node::Empty, Into::into)
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(value: Vec<T>) -> Self {
        Node::Fragment(value.into_iter().map(Into::into).collect())
    }
}

impl From<SafeString> for Node {
    fn from(value: SafeString) -> Self {
        Node::Safe(value)
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Node::Element(value)
    }
}

impl From<Component> for Node {
    fn from(value: Component) -> Self {
        Node::Component(value)
    }
}

impl From<PendingNode> for Node {
    fn from(value: PendingNode) -> Self {
        Node::Pending(value)
    }
}

#[derive(Debug)]
pub struct Element {
    tag: String,
    attrs: Vec<(String, AttrValue)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn write_to(self, buf: &mut StringBuffer, cx: &RenderContext) -> RenderResult<()> {
        let Element {
            tag,
            attrs,
            children,
        } = self;
        let void = is_void_tag(&tag);

        let mut raw_html = None;
        buf.push_str("<");
        buf.push_str(&tag);
        for (name, value) in attrs {
            if is_raw_html_attr(&name) {
                raw_html = Some(value);
                continue;
            }
            write_attr(&name, value, buf);
        }

        if raw_html.is_some() && !children.is_empty() {
            return Err(RenderError::Conflict { tag });
        }
        if void {
            buf.push_str("/>");
            return Ok(());
        }
        buf.push_str(">");

        match raw_html {
            Some(value) => write_raw_html(value, buf),
            None => {
                for child in children {
                    child.write_to(buf, cx)?;
                }
            }
        }

        buf.push_str("</");
        buf.push_str(&tag);
        buf.push_str(">");
        Ok(())
    }
}

fn write_raw_html(value: AttrValue, buf: &mut StringBuffer) {
    match value {
        AttrValue::Str(markup) => buf.push_str(&markup),
        AttrValue::Safe(markup) => buf.push_safe(markup),
        AttrValue::Number(n) => buf.push_str(&format_number(n)),
        AttrValue::Pending(pending) => {
            let future = pending.into_future();
            buf.push_pending(PendingNode::new(async move {
                Ok(match future.await? {
                    Node::Text(markup) => Node::Safe(SafeString::new(markup)),
                    other => other,
                })
            }));
        }
        AttrValue::Null | AttrValue::Bool(_) | AttrValue::Style(_) => {}
    }
}

pub type RenderFn = Box<dyn FnOnce(Props, &RenderContext) -> RenderResult<Node>>;

/// Resolved props handed to a component.
#[derive(Debug, Default)]
pub struct Props {
    pub attrs: Vec<(String, AttrValue)>,
    pub children: Vec<Node>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn take(&mut self, name: &str) -> Option<AttrValue> {
        let at = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(at).1)
    }

    pub fn take_children(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.children)
    }
}

pub struct Component {
    render: RenderFn,
    props: Props,
}

impl Component {
    pub fn new(render: impl FnOnce(Props, &RenderContext) -> RenderResult<Node> + 'static) -> Self {
        Self {
            render: Box::new(render),
            props: Props::default(),
        }
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.props = self.props.attr(name, value);
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.props = self.props.child(child);
        self
    }

    pub fn invoke(self, cx: &RenderContext) -> RenderResult<Node> {
        (self.render)(self.props, cx)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("props", &self.props)
            .finish_non_exhaustive()
    }
}

/// Format like a JavaScript number-to-string conversion.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if !(1e-6..1e21).contains(&magnitude) {
        let text = format!("{value:e}");
        return match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => text,
        };
    }
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(node: Node) -> RenderResult<String> {
        let cx = RenderContext::default();
        pollster::block_on(async {
            let buf = node.render(&cx)?;
            Ok(buf.resolve(&cx).await?.into_string())
        })
    }

    #[test]
    fn element_with_attributes_and_children() {
        let node = Element::new("a")
            .attr("href", "/x?a=1&b=2")
            .attr("title", AttrValue::Null)
            .child("Tom & Jerry")
            .child(Node::raw("<b>!</b>"));
        assert_eq!(
            render(node.into()).unwrap(),
            "<a href=\"/x?a=1&amp;b=2\">Tom &amp; Jerry<b>!</b></a>"
        );
    }

    #[test]
    fn void_tags_self_close_and_ignore_children() {
        let node = Element::new("img").attr("src", "a.png").child("ignored");
        assert_eq!(render(node.into()).unwrap(), "<img src=\"a.png\"/>");
        assert!(is_void_tag("br"));
        assert!(!is_void_tag("div"));
    }

    #[test]
    fn disabled_example() {
        let off = Element::new("button").attr("disabled", false);
        let on = Element::new("button").attr("disabled", true);
        assert_eq!(render(off.into()).unwrap(), "<button></button>");
        assert_eq!(render(on.into()).unwrap(), "<button disabled=\"\"></button>");
    }

    #[test]
    fn bind_html_replaces_children() {
        let node = Element::new("div").attr("bind:html", "<i>raw</i>");
        assert_eq!(render(node.into()).unwrap(), "<div><i>raw</i></div>");
    }

    #[test]
    fn bind_html_with_children_is_a_conflict() {
        let node = Element::new("div")
            .attr("dangerouslySetInnerHTML", "<i>raw</i>")
            .child("text");
        assert_eq!(
            render(node.into()).unwrap_err(),
            RenderError::Conflict {
                tag: "div".to_string()
            }
        );
    }

    #[test]
    fn void_tag_with_bind_html_and_children_is_a_conflict() {
        let node = Element::new("br").attr("bind:html", "<i/>").child("text");
        assert_eq!(
            render(node.into()).unwrap_err(),
            RenderError::Conflict {
                tag: "br".to_string()
            }
        );
    }

    #[test]
    fn skipped_children() {
        let node = Node::fragment(vec![
            Node::from(true),
            Node::from(None::<&str>),
            Node::Empty,
            Node::from(7),
            Node::from(vec!["a", "<b>"]),
        ]);
        assert_eq!(render(node).unwrap(), "7a&lt;b&gt;");
    }

    #[test]
    fn component_receives_props_and_children() {
        let node = Node::component(
            |mut props, _cx| {
                let name = match props.take("name") {
                    Some(AttrValue::Str(name)) => name,
                    _ => "anon".to_string(),
                };
                let children = props.take_children();
                Ok(Element::new("section")
                    .attr("data-name", name)
                    .children(children)
                    .into())
            },
            Props::new().attr("name", "<me>").child("body"),
        );
        assert_eq!(
            render(node).unwrap(),
            "<section data-name=\"&lt;me&gt;\">body</section>"
        );
    }

    #[test]
    fn component_may_return_pending_node() {
        let node = Node::component(
            |_, _| Ok(Node::pending(async { Ok(Node::text("later")) })),
            Props::new(),
        );
        assert_eq!(render(node).unwrap(), "later");
    }

    #[test]
    fn pending_attribute_value_is_escaped_in_place() {
        let node = Element::new("p").attr(
            "title",
            AttrValue::pending(PendingNode::ready(Node::text("a\"b"))),
        );
        assert_eq!(render(node.into()).unwrap(), "<p title=\"a&quot;b\"></p>");
    }

    #[test]
    fn element_constructor_mirrors_builder() {
        let node = Node::element(
            "div",
            [("style", AttrValue::style([("backgroundColor", "red")]))],
            vec![Node::text("x")],
        );
        assert_eq!(
            render(node).unwrap(),
            "<div style=\"background-color:red\">x</div>"
        );
    }

    #[test]
    fn numbers_format_like_script_numbers() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(123456789.0), "123456789");
    }
}
