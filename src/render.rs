//! HTML output.
//!
//! The document body is rendered in one pulldown-cmark pass: every resolved
//! directive is spliced into the Markdown source as a single-line raw HTML
//! block, and the configured known links are appended as reference
//! definitions so `[name][]` style links resolve anywhere in the text.

use crate::document::{Block, ImageAttrs};
use crate::pipeline::orchestrator::{RenderedImageRef, UploadedFile};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use std::collections::BTreeMap;

static RE_PRE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<pre\b.*?</pre>").unwrap());

/// `<img>` (wrapped in a link when there is a target) inside an image div.
pub fn image_html(image: &RenderedImageRef, attrs: &ImageAttrs) -> String {
    let mut class = String::from("image");
    if let Some(align) = &attrs.align {
        class.push_str(&format!(" align-{align}"));
    }
    if let Some(extra) = &attrs.class {
        class.push(' ');
        class.push_str(extra);
    }

    let mut img = format!("<img src=\"{}\"", attr(&image.display_location));
    if let Some(alt) = &attrs.alt {
        img.push_str(&format!(" alt=\"{}\"", attr(alt)));
    }
    // The tooltip falls back to the alt text.
    if let Some(title) = attrs.title.as_ref().or(attrs.alt.as_ref()) {
        img.push_str(&format!(" title=\"{}\"", attr(title)));
    }
    for (name, value) in [("width", &attrs.width), ("height", &attrs.height)] {
        if let Some(v) = value {
            img.push_str(&format!(" {name}=\"{}\"", attr(v)));
        }
    }
    img.push_str(" />");

    let inner = match &image.link_target {
        Some(target) => format!("<a href=\"{}\">{img}</a>", attr(target)),
        None => img,
    };
    format!("<div class=\"{}\">{inner}</div>", attr(&class))
}

/// Link to an uploaded file with its type and size.
pub fn upload_html(file: &UploadedFile) -> String {
    let details = match file.size {
        Some(size) => format!("{}, {} bytes", file.mime, size),
        None => file.mime.clone(),
    };
    format!(
        "<div class=\"uploaded-file\"><p><a href=\"{}\">{}</a> ({})</p></div>",
        attr(&file.location),
        text(&file.name),
        text(&details)
    )
}

/// `[name]: url` lines for the known links.
pub fn known_links_block(links: &BTreeMap<String, String>) -> String {
    links
        .iter()
        .map(|(name, url)| format!("[{name}]: {url}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render Markdown to HTML.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Render the body blocks, taking directive HTML from `fragments` in order.
pub fn render_body(
    blocks: &[Block],
    fragments: &[String],
    known_links: &BTreeMap<String, String>,
) -> String {
    let mut source = String::new();
    let mut fragments = fragments.iter();
    for block in blocks {
        match block {
            Block::Markup(markup) => {
                source.push_str(markup);
                source.push('\n');
            }
            Block::Directive(d) => {
                if let Some(fragment) = fragments.next() {
                    // Raw HTML blocks need a blank line on both sides.
                    let indent = " ".repeat(d.indent.min(3));
                    source.push_str(&format!("\n{indent}{fragment}\n\n"));
                }
            }
        }
    }
    if !known_links.is_empty() {
        source.push('\n');
        source.push_str(&known_links_block(known_links));
        source.push('\n');
    }
    markdown_to_html(&source)
}

/// Turn newlines outside `<pre>` blocks into spaces.
///
/// Some hosts treat every newline in a post body as a hard line break.
pub fn replace_newlines(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for m in RE_PRE.find_iter(html) {
        out.push_str(&html[last..m.start()].replace('\n', " "));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&html[last..].replace('\n', " "));
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentContext;

    fn image(display: &str, link: Option<&str>) -> RenderedImageRef {
        RenderedImageRef {
            display_location: display.into(),
            link_target: link.map(String::from),
        }
    }

    #[test]
    fn image_links_to_target_and_title_defaults_to_alt() {
        let attrs = ImageAttrs {
            alt: Some("A \"lake\"".into()),
            align: Some("center".into()),
            ..Default::default()
        };
        let html = image_html(&image("http://h/s.jpg", Some("http://h/full.jpg")), &attrs);
        assert_eq!(
            html,
            "<div class=\"image align-center\"><a href=\"http://h/full.jpg\"><img src=\"http://h/s.jpg\" alt=\"A &quot;lake&quot;\" title=\"A &quot;lake&quot;\" /></a></div>"
        );
    }

    #[test]
    fn image_without_target_is_not_a_link() {
        let html = image_html(&image("http://h/a.jpg", None), &ImageAttrs::default());
        assert_eq!(html, "<div class=\"image\"><img src=\"http://h/a.jpg\" /></div>");
    }

    #[test]
    fn upload_shows_type_and_size() {
        let file = UploadedFile {
            location: "http://h/notes.pdf".into(),
            name: "notes.pdf".into(),
            mime: "application/pdf".into(),
            size: Some(2048),
        };
        assert_eq!(
            upload_html(&file),
            "<div class=\"uploaded-file\"><p><a href=\"http://h/notes.pdf\">notes.pdf</a> (application/pdf, 2048 bytes)</p></div>"
        );
    }

    #[test]
    fn body_splices_fragments_and_known_links() {
        let mut doc = DocumentContext::from_text(
            ":title: T\n\nSee [rust][] for *more*.\n\n.. image:: a.jpg\n\nAfter.",
        );
        let blocks = doc.scan().unwrap();
        let mut links = BTreeMap::new();
        links.insert("rust".to_string(), "https://www.rust-lang.org/".to_string());

        let html = render_body(&blocks, &["<div class=\"image\">X</div>".to_string()], &links);
        assert!(html.contains("<a href=\"https://www.rust-lang.org/\">rust</a>"), "{html}");
        assert!(html.contains("<em>more</em>"));
        assert!(html.contains("<div class=\"image\">X</div>"));
        assert!(html.contains("<p>After.</p>"));
        assert!(!html.contains("a.jpg"));
    }

    #[test]
    fn newlines_survive_only_in_pre() {
        let html = "<p>one\ntwo</p>\n<pre><code>a\nb\n</code></pre>\n<p>x</p>\n";
        assert_eq!(
            replace_newlines(html),
            "<p>one two</p> <pre><code>a\nb\n</code></pre> <p>x</p>"
        );
    }
}
