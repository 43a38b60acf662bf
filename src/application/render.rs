//! Markdown rendering for post bodies.

use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use comrak::{markdown_to_html, options::Options};
use once_cell::sync::Lazy;

struct BodyRenderer {
    options: Options<'static>,
    sanitizer: AmmoniaBuilder<'static>,
}

static RENDERER: Lazy<BodyRenderer> = Lazy::new(|| BodyRenderer {
    options: markdown_options(),
    sanitizer: build_sanitizer(),
});

/// Render a Markdown post body to sanitized HTML.
pub fn render_body(markdown: &str) -> String {
    let html = markdown_to_html(markdown, &RENDERER.options);
    RENDERER.sanitizer.clean(&html).to_string()
}

fn markdown_options() -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.r#unsafe = true;
    options
}

fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a",
        "abbr",
        "blockquote",
        "br",
        "code",
        "del",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "img",
        "input",
        "li",
        "ol",
        "p",
        "pre",
        "section",
        "strong",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "ul",
    ]);
    builder.tags(tags);

    builder.add_tag_attributes("img", &["title", "alt", "width", "height"]);
    builder.add_tag_attributes("pre", &["lang"]);
    builder.add_tag_attributes("th", &["align"]);
    builder.add_tag_attributes("td", &["align"]);
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);
    builder.add_generic_attributes(&["id", "class"]);
    builder
}
