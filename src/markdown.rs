//! HTML to Markdown linearization.
//!
//! Walks the parsed topic body as a stream of start-tag / end-tag / text
//! events and emits Markdown in document order. All running state is held in
//! an explicit [`Linearizer`] struct: the open-list stack, the code-span
//! flag, the pending link target, and the ordered list of referenced image
//! URLs.
//!
//! Images are emitted as `{IMAGE:url}` placeholders so the walk never blocks
//! on network I/O; [`substitute_images`] patches in the resolved paths after
//! the topic's images have gone through the [`crate::assets`] resolver.

use std::sync::LazyLock;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;

use crate::assets::Resolution;

/// Collapses 3+ consecutive newlines down to a paragraph break.
static EXCESS_NEWLINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("hardcoded newline regex"));

/// Whitespace runs, collapsed outside code spans.
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("hardcoded ws regex"));

/// Result of linearizing one topic body.
#[derive(Debug, Clone)]
pub struct Linearized {
    /// Markdown text, with `{IMAGE:url}` placeholders still in place.
    pub markdown: String,
    /// Referenced image URLs, in document order.
    pub images: Vec<String>,
}

/// One open list context.
enum ListKind {
    Unordered,
    /// Ordered list with the count of items emitted so far.
    Ordered(usize),
}

#[derive(Default)]
struct Linearizer {
    out: String,
    list_stack: Vec<ListKind>,
    in_code: bool,
    current_link: Option<String>,
    images: Vec<String>,
}

/// Convert a topic's HTML body to Markdown.
///
/// Never fails: if the input cannot be parsed, degrades to stripping tags
/// from the raw text.
pub fn linearize(html: &str) -> Linearized {
    let dom = match parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
    {
        Ok(dom) => dom,
        Err(e) => {
            tracing::warn!(error = %e, "HTML parse failed, stripping tags instead");
            return Linearized {
                markdown: crate::tree::strip_tags(html),
                images: Vec::new(),
            };
        }
    };

    let mut state = Linearizer::default();
    state.walk(&dom.document);

    let markdown = EXCESS_NEWLINES_RE
        .replace_all(&state.out, "\n\n")
        .trim()
        .to_string();
    Linearized {
        markdown,
        images: state.images,
    }
}

/// Replace `{IMAGE:url}` placeholders with resolved references.
///
/// Local resolutions are prefixed with `../` repeated `depth + 1` times so
/// the reference works from the topic's own directory; remote fallbacks are
/// substituted verbatim.
pub fn substitute_images(
    markdown: &str,
    depth: usize,
    resolutions: &[(String, Resolution)],
) -> String {
    let prefix = "../".repeat(depth + 1);
    let mut result = markdown.to_string();
    for (url, resolution) in resolutions {
        let placeholder = format!("{{IMAGE:{}}}", url);
        let target = match resolution {
            Resolution::Local(rel) => format!("{}{}", prefix, rel),
            Resolution::Remote(remote) => remote.clone(),
        };
        result = result.replace(&placeholder, &target);
    }
    result
}

fn attr(attrs: &[html5ever::Attribute], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|a| a.name.local.as_ref() == name)
        .map(|a| a.value.to_string())
}

impl Linearizer {
    fn walk(&mut self, handle: &Handle) {
        match &handle.data {
            NodeData::Document => {
                for child in handle.children.borrow().iter() {
                    self.walk(child);
                }
            }
            NodeData::Element { name, attrs, .. } => {
                let tag = name.local.as_ref();
                // Scripted content never belongs in the manual text.
                if matches!(tag, "script" | "style") {
                    return;
                }
                let attrs = attrs.borrow();
                self.start_tag(tag, &attrs);
                drop(attrs);

                for child in handle.children.borrow().iter() {
                    self.walk(child);
                }

                self.end_tag(tag);
            }
            NodeData::Text { contents } => {
                let text = contents.borrow();
                if self.in_code {
                    self.out.push_str(&text);
                } else {
                    self.out.push_str(&WS_RE.replace_all(&text, " "));
                }
            }
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: &str, attrs: &[html5ever::Attribute]) {
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse::<usize>().unwrap_or(1);
                self.out.push('\n');
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
            }
            "p" => self.out.push_str("\n\n"),
            "br" => self.out.push('\n'),
            "strong" | "b" => self.out.push_str("**"),
            "em" | "i" => self.out.push('*'),
            "a" => {
                self.current_link = attr(attrs, "href");
                self.out.push('[');
            }
            "ul" => {
                self.list_stack.push(ListKind::Unordered);
                self.out.push('\n');
            }
            "ol" => {
                self.list_stack.push(ListKind::Ordered(0));
                self.out.push('\n');
            }
            "li" => match self.list_stack.last_mut() {
                Some(ListKind::Unordered) => self.out.push_str("- "),
                Some(ListKind::Ordered(count)) => {
                    *count += 1;
                    let n = *count;
                    self.out.push_str(&format!("{}. ", n));
                }
                None => {}
            },
            "img" => {
                // Lazy-loaded images carry the real URL in data-src.
                let src = attr(attrs, "data-src")
                    .filter(|s| !s.is_empty())
                    .or_else(|| attr(attrs, "src"))
                    .unwrap_or_default();
                if !src.is_empty() {
                    let alt = attr(attrs, "alt").unwrap_or_else(|| "image".to_string());
                    self.images.push(src.clone());
                    self.out
                        .push_str(&format!("\n![{}]({{IMAGE:{}}})\n", alt, src));
                }
            }
            "code" | "pre" => {
                self.out.push('`');
                self.in_code = true;
            }
            "section" => self.out.push_str("\n\n"),
            "div" => {
                if let Some(kind) = attr(attrs, "data-type") {
                    if matches!(kind.as_str(), "warning" | "note" | "caution") {
                        self.out
                            .push_str(&format!("\n\n> **{}**: ", kind.to_uppercase()));
                    }
                }
            }
            // Unrecognized tags: children pass through, the tag is dropped.
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: &str) {
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => self.out.push('\n'),
            "strong" | "b" => self.out.push_str("**"),
            "em" | "i" => self.out.push('*'),
            "a" => {
                match self.current_link.take() {
                    Some(href) if !href.is_empty() => {
                        self.out.push_str(&format!("]({})", href));
                    }
                    _ => self.out.push_str("](#)"),
                }
            }
            "ul" | "ol" => {
                self.list_stack.pop();
                self.out.push('\n');
            }
            "li" => self.out.push('\n'),
            "code" | "pre" => {
                self.out.push('`');
                self.in_code = false;
            }
            _ => {}
        }
    }
}
