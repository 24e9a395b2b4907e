//! HTML cleaning: strip navigation chrome and extract visible text.
//!
//! Documentation pages carry navigation bars, headers, and footers that are
//! noise for retrieval. The cleaner drops those subtrees entirely and walks
//! the rest of the DOM, emitting text with block elements separated by
//! newlines so the chunker's separator priority has boundaries to work with.

use scraper::{ElementRef, Html, Selector, node::Node};

/// Elements whose entire subtree is discarded.
const STRIP_TAGS: [&str; 6] = ["nav", "header", "footer", "script", "style", "noscript"];

/// Elements that introduce a line break around their content.
const BLOCK_TAGS: [&str; 20] = [
    "p", "div", "section", "article", "main", "aside", "ul", "ol", "li", "table", "tr", "pre",
    "blockquote", "br", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// A page reduced to its visible text.
#[derive(Debug, Clone)]
pub struct CleanedPage {
    /// Title from the first `<h1>`, falling back to `<title>`.
    pub title: Option<String>,
    /// Whitespace-normalized visible text.
    pub text: String,
}

/// Strip navigation/header elements and extract the page's visible text.
pub fn clean_html(html: &str) -> CleanedPage {
    let doc = Html::parse_document(html);

    let title = extract_title(&doc);

    let body_sel = Selector::parse("body").expect("valid selector");
    let mut raw = String::new();
    match doc.select(&body_sel).next() {
        Some(body) => collect_text(body, &mut raw),
        None => collect_text(doc.root_element(), &mut raw),
    }

    CleanedPage {
        title,
        text: normalize_whitespace(&raw),
    }
}

/// Extract a page title: first `<h1>` text, else the `<title>` element.
fn extract_title(doc: &Html) -> Option<String> {
    let h1_sel = Selector::parse("h1").expect("valid selector");
    let title_sel = Selector::parse("title").expect("valid selector");

    let from_h1 = doc
        .select(&h1_sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    from_h1.or_else(|| {
        doc.select(&title_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// Recursively collect text, skipping stripped subtrees.
fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let name = element.name();
                if STRIP_TAGS.contains(&name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    let block = BLOCK_TAGS.contains(&name);
                    if block {
                        out.push('\n');
                    }
                    collect_text(child_el, out);
                    if block {
                        out.push('\n');
                    }
                }
            }
            _ => {}
        }
    }
}

/// Collapse horizontal whitespace runs and cap blank-line runs at one.
fn normalize_whitespace(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_pending = false;

    for line in raw.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_pending = !lines.is_empty();
        } else {
            if blank_pending {
                lines.push(String::new());
                blank_pending = false;
            }
            lines.push(collapsed);
        }
    }

    lines.join("\n")
}
