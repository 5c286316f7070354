//! Tree-walking helpers shared by the listing, article and reference heuristics.
//!
//! Everything here works on an already-parsed `scraper::Html`; nothing touches the network.

use scraper::{ElementRef, Html, Selector};

/// Elements whose text is never visible to a reader.
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

/// Page furniture that is never part of an article body.
const CHROME: &[&str] = &["nav", "header", "footer", "aside", "form", "iframe"];
const CHROME_CLASSES: &[&str] = &["advertisement", "ads"];

/// Elements that start a new paragraph when flattening a subtree to text.
const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "footer", "aside", "h1", "h2", "h3",
    "h4", "h5", "h6", "li", "ul", "ol", "blockquote", "pre", "tr", "table", "figure",
    "figcaption", "br", "hr",
];

/// Parse a CSS selector, treating an invalid one as absent.
pub fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Collapse every whitespace run to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element with whitespace collapsed.
pub fn inline_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_inline(element, &mut raw);
    collapse_whitespace(&raw)
}

fn push_inline(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if INVISIBLE.contains(&child_el.value().name()) {
                continue;
            }
            push_inline(child_el, out);
            // Adjacent inline elements like <span>a</span><span>b</span> stay joined.
            if BLOCKS.contains(&child_el.value().name()) {
                out.push(' ');
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

/// Visible text of an element, one paragraph per block element, separated by blank lines.
pub fn block_text(element: ElementRef<'_>) -> String {
    collect_blocks(element, false)
}

/// Like `block_text`, also skipping navigation, headers, footers, sidebars and ad slots.
pub fn readable_text(element: ElementRef<'_>) -> String {
    collect_blocks(element, true)
}

/// True for page furniture: navigation, header, footer, sidebar, forms, ad containers.
pub fn is_chrome(element: ElementRef<'_>) -> bool {
    let value = element.value();
    CHROME.contains(&value.name()) || value.classes().any(|c| CHROME_CLASSES.contains(&c))
}

/// True when `element` or one of its ancestors is page furniture.
pub fn inside_chrome(element: ElementRef<'_>) -> bool {
    is_chrome(element) || element.ancestors().filter_map(ElementRef::wrap).any(is_chrome)
}

fn collect_blocks(element: ElementRef<'_>, skip_chrome: bool) -> String {
    let mut blocks = Vec::new();
    let mut current = String::new();
    push_blocks(element, skip_chrome, &mut blocks, &mut current);
    flush(&mut blocks, &mut current);
    blocks.join("\n\n")
}

fn push_blocks(element: ElementRef<'_>, skip_chrome: bool, blocks: &mut Vec<String>, current: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if INVISIBLE.contains(&name) || (skip_chrome && is_chrome(child_el)) {
                continue;
            }
            let is_block = BLOCKS.contains(&name);
            if is_block {
                flush(blocks, current);
            }
            push_blocks(child_el, skip_chrome, blocks, current);
            if is_block {
                flush(blocks, current);
            }
        } else if let Some(text) = child.value().as_text() {
            current.push_str(text);
        }
    }
}

fn flush(blocks: &mut Vec<String>, current: &mut String) {
    let text = collapse_whitespace(current);
    if !text.is_empty() {
        blocks.push(text);
    }
    current.clear();
}

/// Nearest ancestor of `element` matching any of `selectors`.
pub fn closest<'a>(element: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    let compiled: Vec<Selector> = selectors.iter().filter_map(|css| selector(css)).collect();
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| compiled.iter().any(|sel| sel.matches(ancestor)))
}

/// Text of the nearest `h2`/`h3` that starts before `element` in document order and whose
/// text is longer than `min_len` characters.
pub fn preceding_heading(document: &Html, element: ElementRef<'_>, min_len: usize) -> Option<String> {
    let target = element.id();
    let mut last = None;
    for node in document.root_element().descendants() {
        if node.id() == target {
            break;
        }
        let Some(el) = ElementRef::wrap(node) else { continue };
        if matches!(el.value().name(), "h2" | "h3") {
            let text = inline_text(el);
            if text.chars().count() > min_len {
                last = Some(text);
            }
        }
    }
    last
}

/// First descendant of `scope` matching `css`.
pub fn first_match<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    let found = scope.select(&sel).next();
    found
}

/// Where a cascade rule reads its candidate value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Whitespace-collapsed visible text.
    Text,
    /// Paragraph-preserving visible text.
    Block,
    /// Paragraph-preserving visible text without page furniture.
    Readable,
    /// An attribute, falling back to the element text when the attribute is absent or blank.
    AttrOrText(&'static str),
}

type Accept = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct Rule {
    css: String,
    selector: Selector,
    source: ValueSource,
    accept: Accept,
}

/// An ordered list of `(selector, value source, acceptance predicate)` rules.
///
/// Each rule looks at the first element its selector matches; the first value accepted by
/// its rule's predicate wins.
#[derive(Default)]
pub struct Cascade {
    rules: Vec<Rule>,
}

impl Cascade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Selectors that fail to parse are dropped.
    pub fn rule<F>(mut self, css: &str, source: ValueSource, accept: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        if let Some(selector) = selector(css) {
            self.rules.push(Rule {
                css: css.to_string(),
                selector,
                source,
                accept: Box::new(accept),
            });
        }
        self
    }

    /// Append one rule per selector, all sharing a source and predicate.
    pub fn rules<F>(mut self, selectors: &[&str], source: ValueSource, accept: F) -> Self
    where
        F: Fn(&str) -> bool + Clone + Send + Sync + 'static,
    {
        for css in selectors {
            self = self.rule(css, source, accept.clone());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate against a whole document.
    pub fn first_in_document(&self, document: &Html) -> Option<String> {
        self.first_in(document.root_element())
    }

    /// Evaluate inside `scope` (the scope element itself is not a candidate).
    pub fn first_in(&self, scope: ElementRef<'_>) -> Option<String> {
        self.matched_in(scope).map(|(_, value)| value)
    }

    /// Like `first_in`, also naming the selector that produced the value.
    pub fn matched_in(&self, scope: ElementRef<'_>) -> Option<(&str, String)> {
        for rule in &self.rules {
            let Some(el) = scope.select(&rule.selector).next() else { continue };
            let value = read_value(el, rule.source);
            if !value.is_empty() && (rule.accept)(&value) {
                return Some((rule.css.as_str(), value));
            }
        }
        None
    }
}

fn read_value(el: ElementRef<'_>, source: ValueSource) -> String {
    match source {
        ValueSource::Text => inline_text(el),
        ValueSource::Block => block_text(el),
        ValueSource::Readable => readable_text(el),
        ValueSource::AttrOrText(attr) => match el.value().attr(attr).map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => inline_text(el),
        },
    }
}
