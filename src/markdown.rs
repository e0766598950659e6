//! Markdown → sanitized HTML, and the lossy plain-text view used for
//! "copy as text".

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};
use regex::Regex;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::warn;

pub const CONTAINER_CLASS: &str = "markdown-body";

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

static EXECUTABLE_ELEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<\s*(script|style|iframe|object|embed)\b.*?(</\s*(script|style|iframe|object|embed)\s*>|\z)")
        .expect("valid executable element pattern")
});
static HTML_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?(-->|\z)").expect("valid comment pattern"));
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"));
static INLINE_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^<\s*(script|style|iframe|object|embed)\b").expect("valid inline open pattern")
});
static INLINE_CLOSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^<\s*/\s*(script|style|iframe|object|embed)\b").expect("valid inline close pattern")
});
static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"“”‘’]+"#).expect("valid url pattern"));
static FORMAT_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[#*`]").expect("valid format pattern"));
static NEWLINE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n]+").expect("valid newline pattern"));

const UNSAFE_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SMART_PUNCTUATION
}

/// Renders markdown into a `<div class="markdown-body">` container. Raw HTML
/// in the input never reaches the output as markup.
pub fn render(markdown: &str) -> String {
    let mut sanitizer = Sanitizer::default();
    for event in Parser::new_ext(markdown, options()) {
        sanitizer.feed(event);
    }
    let events = sanitizer.finish();

    let mut body = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut body, events.into_iter());
    format!("<div class=\"{CONTAINER_CLASS}\">{body}</div>")
}

/// Drops `#`, `*` and backticks and folds newline runs into single spaces.
/// Best-effort only; this is not a markdown-to-text conversion.
pub fn strip_formatting(markdown: &str) -> String {
    let stripped = FORMAT_CHARS.replace_all(markdown, "");
    NEWLINE_RUNS.replace_all(&stripped, " ").trim().to_string()
}

/// Text left over from a raw HTML fragment once executable elements,
/// comments and tags are removed.
fn strip_html(raw: &str) -> String {
    let without_exec = EXECUTABLE_ELEMENT.replace_all(raw, "");
    let without_comments = HTML_COMMENT.replace_all(&without_exec, "");
    HTML_TAG.replace_all(&without_comments, "").into_owned()
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let lowered = url.trim().to_ascii_lowercase();
    if UNSAFE_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        CowStr::Borrowed("#")
    } else {
        url
    }
}

/// Drops trailing punctuation from an autolinked URL. A closing paren is
/// kept while it balances an opening one inside the URL.
fn trim_url(mut url: &str) -> &str {
    loop {
        let Some(last) = url.chars().last() else {
            return url;
        };
        let strip = match last {
            '.' | ',' | ';' | ':' | '!' | '?' | ']' | '}' | '\'' => true,
            ')' => url.matches(')').count() > url.matches('(').count(),
            _ => false,
        };
        if !strip {
            return url;
        }
        url = &url[..url.len() - last.len_utf8()];
    }
}

fn highlight(code: &str, lang: &str) -> Option<String> {
    let syntax = SYNTAX_SET.find_syntax_by_token(lang)?;
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, ClassStyle::Spaced);
    for line in LinesWithEndings::from(code) {
        if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
            warn!(error = %e, lang, "Syntax highlighting failed, falling back to plain text");
            return None;
        }
    }
    let class: String = lang
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#'))
        .collect();
    Some(format!(
        "<pre><code class=\"language-{class}\">{}</code></pre>\n",
        generator.finalize()
    ))
}

struct CodeBuffer<'a> {
    kind: CodeBlockKind<'a>,
    body: String,
}

#[derive(Default)]
struct Sanitizer<'a> {
    out: Vec<Event<'a>>,
    text: String,
    link_depth: usize,
    html_block: Option<String>,
    code_block: Option<CodeBuffer<'a>>,
    suppress_inline: bool,
}

impl<'a> Sanitizer<'a> {
    fn feed(&mut self, event: Event<'a>) {
        match event {
            Event::Text(text) => {
                if let Some(code) = self.code_block.as_mut() {
                    code.body.push_str(&text);
                } else if !self.suppress_inline {
                    // Adjacent text events are merged so bare URLs are seen whole.
                    self.text.push_str(&text);
                }
            }
            other => {
                self.flush_text();
                self.handle(other);
            }
        }
    }

    fn finish(mut self) -> Vec<Event<'a>> {
        self.flush_text();
        if let Some(raw) = self.html_block.take() {
            self.push_html_remainder(&raw);
        }
        if let Some(code) = self.code_block.take() {
            self.push_code_block(code);
        }
        self.out
    }

    fn handle(&mut self, event: Event<'a>) {
        match event {
            Event::Start(Tag::HtmlBlock) => self.html_block = Some(String::new()),
            Event::End(TagEnd::HtmlBlock) => {
                if let Some(raw) = self.html_block.take() {
                    self.push_html_remainder(&raw);
                }
            }
            Event::Html(raw) => match self.html_block.as_mut() {
                Some(buffer) => buffer.push_str(&raw),
                None => self.push_html_remainder(&raw),
            },
            Event::InlineHtml(raw) => {
                if INLINE_CLOSE.is_match(&raw) {
                    self.suppress_inline = false;
                } else if INLINE_OPEN.is_match(&raw) && !raw.trim_end().ends_with("/>") {
                    self.suppress_inline = true;
                }
            }
            Event::Code(_) if self.suppress_inline => {}
            Event::Start(Tag::CodeBlock(kind)) => {
                self.code_block = Some(CodeBuffer {
                    kind,
                    body: String::new(),
                });
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(code) = self.code_block.take() {
                    self.push_code_block(code);
                }
            }
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => {
                self.link_depth += 1;
                self.out.push(Event::Start(Tag::Link {
                    link_type,
                    dest_url: safe_url(dest_url),
                    title,
                    id,
                }));
            }
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => {
                self.link_depth += 1;
                self.out.push(Event::Start(Tag::Image {
                    link_type,
                    dest_url: safe_url(dest_url),
                    title,
                    id,
                }));
            }
            Event::End(end @ (TagEnd::Link | TagEnd::Image)) => {
                self.link_depth = self.link_depth.saturating_sub(1);
                self.out.push(Event::End(end));
            }
            Event::End(
                end @ (TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::TableCell),
            ) => {
                self.suppress_inline = false;
                self.out.push(Event::End(end));
            }
            other => self.out.push(other),
        }
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        if self.link_depth > 0 {
            self.out.push(Event::Text(text.into()));
        } else {
            self.push_linkified(&text);
        }
    }

    fn push_linkified(&mut self, text: &str) {
        let mut last = 0;
        for found in BARE_URL.find_iter(text) {
            let url = trim_url(found.as_str());
            if url.split_once("://").map_or(true, |(_, rest)| rest.is_empty()) {
                continue;
            }
            let start = found.start();
            if start > last {
                self.out.push(Event::Text(text[last..start].to_string().into()));
            }
            self.out.push(Event::Start(Tag::Link {
                link_type: LinkType::Autolink,
                dest_url: url.to_string().into(),
                title: CowStr::Borrowed(""),
                id: CowStr::Borrowed(""),
            }));
            self.out.push(Event::Text(url.to_string().into()));
            self.out.push(Event::End(TagEnd::Link));
            last = start + url.len();
        }
        if last < text.len() {
            self.out.push(Event::Text(text[last..].to_string().into()));
        }
    }

    fn push_html_remainder(&mut self, raw: &str) {
        let remainder = strip_html(raw);
        let remainder = remainder.trim();
        if remainder.is_empty() {
            return;
        }
        self.out.push(Event::Start(Tag::Paragraph));
        self.push_linkified(remainder);
        self.out.push(Event::End(TagEnd::Paragraph));
    }

    fn push_code_block(&mut self, code: CodeBuffer<'a>) {
        let lang = match &code.kind {
            CodeBlockKind::Fenced(info) => info.split_whitespace().next().map(str::to_string),
            CodeBlockKind::Indented => None,
        };
        if let Some(highlighted) = lang.as_deref().and_then(|lang| highlight(&code.body, lang)) {
            self.out.push(Event::Html(highlighted.into()));
            return;
        }
        self.out.push(Event::Start(Tag::CodeBlock(code.kind)));
        if !code.body.is_empty() {
            self.out.push(Event::Text(code.body.into()));
        }
        self.out.push(Event::End(TagEnd::CodeBlock));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_renders_empty_container() {
        assert_eq!(render(""), "<div class=\"markdown-body\"></div>");
    }

    #[test]
    fn renders_headings_lists_and_paragraphs() {
        let out = render("# Heading 1\n## Heading 2\nSome paragraph\n\n- Item 1\n- Item 2\n- Item 3\n");
        assert!(out.contains("<h1>Heading 1</h1>"));
        assert!(out.contains("<h2>Heading 2</h2>"));
        assert!(out.contains("<p>Some paragraph</p>"));
        assert_eq!(out.matches("<li>").count(), 3);
    }

    #[test]
    fn script_block_is_removed_but_text_survives() {
        let out = render("<script>alert(1)</script> Safe text");
        assert!(out.contains("Safe text"));
        assert!(!out.to_lowercase().contains("<script"));
        assert!(!out.contains("alert(1)"));
    }

    #[test]
    fn inline_script_is_removed() {
        let out = render("Hello <script>alert(1)</script> world");
        assert!(out.contains("Hello"));
        assert!(out.contains("world"));
        assert!(!out.contains("<script"));
        assert!(!out.contains("alert(1)"));
    }

    #[test]
    fn unclosed_script_block_is_dropped() {
        let out = render("<script>\nalert(document.cookie)\n");
        assert!(!out.contains("alert"));
        assert!(!out.contains("<script"));
    }

    #[test]
    fn event_handler_attributes_do_not_survive() {
        let out = render("<img src=x onerror=alert(1)>\n\nText <b onclick=\"x()\">bold</b>");
        assert!(!out.contains("onerror"));
        assert!(!out.contains("onclick"));
        assert!(!out.contains("<b"));
        assert!(out.contains("bold"));
    }

    #[test]
    fn javascript_links_are_neutralized() {
        let out = render("[click](javascript:alert(1)) and [ok](https://example.com)");
        assert!(!out.contains("javascript:"));
        assert!(out.contains("href=\"#\""));
        assert!(out.contains("href=\"https://example.com\""));
    }

    #[test]
    fn bare_urls_become_links() {
        let out = render("See https://www.rust-lang.org/learn_more. Thanks");
        assert!(out.contains(
            "<a href=\"https://www.rust-lang.org/learn_more\">https://www.rust-lang.org/learn_more</a>."
        ));
    }

    #[test]
    fn bare_url_stops_at_quotes() {
        let out = render("https://a.com/x\"onmouseover=alert(1)");
        assert!(out.contains("<a href=\"https://a.com/x\">https://a.com/x</a>"), "{out}");
        assert!(out.contains("onmouseover=alert(1)</p>"), "{out}");
        assert!(!out.contains("%E2%80%9"), "{out}");
    }

    #[test]
    fn bare_url_keeps_balanced_parens() {
        let out = render("See https://en.wikipedia.org/wiki/Rust_(language) now");
        assert!(out.contains("href=\"https://en.wikipedia.org/wiki/Rust_(language)\""), "{out}");

        let out = render("(see https://example.com/a)");
        assert!(out.contains("<a href=\"https://example.com/a\">https://example.com/a</a>)"), "{out}");
    }

    #[test]
    fn urls_inside_code_are_not_linked() {
        let out = render("`https://example.com`");
        assert!(out.contains("<code>https://example.com</code>"));
        assert!(!out.contains("<a "));
    }

    #[test]
    fn smart_punctuation_is_applied() {
        let out = render("\"quoted\" -- dash");
        assert!(out.contains('“'));
        assert!(out.contains('”'));
        assert!(out.contains('–'));
    }

    #[test]
    fn known_language_is_highlighted() {
        let out = render("```rust\nfn main() { let s = \"hi\"; }\n```\n");
        assert!(out.contains("<pre><code class=\"language-rust\">"));
        assert!(out.contains("<span class=\""));
        assert!(out.contains("string quoted double"));
    }

    #[test]
    fn unknown_language_is_escaped_plain_text() {
        let out = render("```nosuchlang\n<b>x</b> & y\n```\n");
        assert!(out.contains("<pre><code class=\"language-nosuchlang\">"));
        assert!(out.contains("&lt;b&gt;x&lt;/b&gt; &amp; y"));
        assert!(!out.contains("<span"));
    }

    #[test]
    fn untagged_code_block_is_escaped_plain_text() {
        let out = render("```\n<script>alert(1)</script>\n```\n");
        assert!(out.contains("<pre><code>&lt;script&gt;"));
        assert!(!out.contains("<script>"));
    }

    #[test]
    fn strip_formatting_removes_punctuation_and_newlines() {
        let plain = strip_formatting("# Title\n\n**bold** and `code`\n\n\n- item\n");
        assert_eq!(plain, "Title bold and code - item");
        assert!(!plain.contains(['#', '*', '`']));
        assert!(!plain.contains('\n'));
    }

    #[test]
    fn strip_formatting_never_leaves_newline_runs() {
        let samples = ["", "\n\n\n", "a\r\n\r\nb", "## x\n### y\n", "```\ncode\n```"];
        for sample in samples {
            let plain = strip_formatting(sample);
            assert!(!plain.contains(['#', '*', '`', '\n', '\r']), "{plain:?}");
            assert_eq!(plain, plain.trim());
        }
        assert_eq!(strip_formatting("a\r\n\r\nb"), "a b");
    }
}
