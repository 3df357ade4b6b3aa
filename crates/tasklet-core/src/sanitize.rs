//! Allow-list HTML cleaning for rich text coming out of the editor.
//!
//! Input is tokenized and built into a small node tree, unknown elements are
//! unwrapped (their children survive), the remaining elements are mapped to
//! a canonical tag and every attribute is discarded. The tree is serialized
//! back with text escaped, so running the cleaner on its own output yields
//! the same bytes.

use tracing::trace;

/// Open elements deeper than this are flattened into their parent.
const MAX_DEPTH: usize = 256;

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Start(String),
    End(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Element { tag: String, children: Vec<Node> },
}

/// Cleans arbitrary markup down to `b`, `i`, `u`, `br` and `p` with no
/// attributes. Surrounding whitespace is trimmed from the result.
pub fn sanitize(raw: &str) -> String {
    let tree = parse_fragment(raw);
    let mut cleaned = Vec::with_capacity(tree.len());
    clean_nodes(tree, &mut cleaned);

    let mut out = String::with_capacity(raw.len());
    write_nodes(&cleaned, &mut out);
    let trimmed = out.trim();
    trace!(input_len = raw.len(), output_len = trimmed.len(), "sanitized html");
    trimmed.to_string()
}

/// Text content of `html` with markup removed, non-breaking spaces turned
/// into plain spaces, and the result trimmed.
pub fn extract_plain_text(html: &str) -> String {
    let tree = parse_fragment(html);
    let mut out = String::new();
    collect_text(&tree, &mut out);
    out.replace('\u{a0}', " ").trim().to_string()
}

/// True when `html` carries no visible text, e.g. `<p><br></p>`.
pub fn is_blank_html(html: &str) -> bool {
    extract_plain_text(html).is_empty()
}

/// Escapes a value for interpolation inside a double or single quoted
/// attribute as well as text content.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn canonical_tag(tag: &str) -> Option<&'static str> {
    match tag {
        "b" | "strong" => Some("b"),
        "i" | "em" => Some("i"),
        "u" => Some("u"),
        "br" => Some("br"),
        "p" | "div" => Some("p"),
        _ => None,
    }
}

fn clean_nodes(nodes: Vec<Node>, out: &mut Vec<Node>) {
    for node in nodes {
        match node {
            // Unwrapping can leave text runs side by side; they are joined so
            // references are escaped the same way the reparsed output will be.
            Node::Text(text) => match out.last_mut() {
                Some(Node::Text(prev)) => prev.push_str(&text),
                _ => out.push(Node::Text(text)),
            },
            Node::Element { tag, children } => match canonical_tag(&tag) {
                Some("br") => out.push(Node::Element {
                    tag: "br".to_string(),
                    children: vec![],
                }),
                Some(canonical) => {
                    let mut kept = Vec::with_capacity(children.len());
                    clean_nodes(children, &mut kept);
                    out.push(Node::Element {
                        tag: canonical.to_string(),
                        children: kept,
                    });
                }
                None => {
                    trace!(tag = %tag, "unwrapping disallowed element");
                    clean_nodes(children, out);
                }
            },
        }
    }
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => escape_text(text, out),
            Node::Element { tag, .. } if tag == "br" => out.push_str("<br>"),
            Node::Element { tag, children } => {
                out.push('<');
                out.push_str(tag);
                out.push('>');
                write_nodes(children, out);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for (idx, ch) in text.char_indices() {
        match ch {
            // Names we cannot decode pass through for the browser to resolve.
            '&' if is_unknown_named_reference(&text[idx..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            other => out.push(other),
        }
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element { children, .. } => collect_text(children, out),
        }
    }
}

fn parse_fragment(raw: &str) -> Vec<Node> {
    build_tree(Lexer::new(raw).tokens())
}

fn build_tree(tokens: Vec<Token>) -> Vec<Node> {
    // The root entry has an empty tag name, which no end tag can carry.
    let mut stack: Vec<(String, Vec<Node>)> = vec![(String::new(), Vec::new())];

    for token in tokens {
        match token {
            Token::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                if let Some((_, children)) = stack.last_mut() {
                    match children.last_mut() {
                        Some(Node::Text(prev)) => prev.push_str(&text),
                        _ => children.push(Node::Text(text)),
                    }
                }
            }
            Token::Start(name) => {
                if VOID_TAGS.contains(&name.as_str()) {
                    if let Some((_, children)) = stack.last_mut() {
                        children.push(Node::Element {
                            tag: name,
                            children: vec![],
                        });
                    }
                } else if stack.len() > MAX_DEPTH {
                    trace!(tag = %name, "nesting limit reached; flattening element");
                } else {
                    stack.push((name, Vec::new()));
                }
            }
            Token::End(name) => {
                let open = stack
                    .iter()
                    .skip(1)
                    .rposition(|(tag, _)| *tag == name)
                    .map(|idx| idx + 1);
                if let Some(depth) = open {
                    while stack.len() > depth {
                        close_top(&mut stack);
                    }
                }
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }

    stack
        .pop()
        .map(|(_, children)| children)
        .unwrap_or_default()
}

fn close_top(stack: &mut Vec<(String, Vec<Node>)>) {
    if let Some((tag, children)) = stack.pop()
        && let Some((_, parent)) = stack.last_mut()
    {
        parent.push(Node::Element { tag, children });
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn tokens(mut self) -> Vec<Token> {
        let mut out = Vec::new();
        let mut text = String::new();

        while self.pos < self.src.len() {
            let rest = &self.src[self.pos..];
            let Some(lt) = rest.find('<') else {
                text.push_str(rest);
                self.pos = self.src.len();
                break;
            };

            text.push_str(&rest[..lt]);
            self.pos += lt;

            match self.markup() {
                Markup::Tag(token) => {
                    if !text.is_empty() {
                        out.push(Token::Text(decode_entities(&text)));
                        text.clear();
                    }
                    out.push(token);
                }
                Markup::Skipped => {}
                Markup::Literal => {
                    text.push('<');
                    self.pos += 1;
                }
            }
        }

        if !text.is_empty() {
            out.push(Token::Text(decode_entities(&text)));
        }
        out
    }

    /// Consumes the markup starting at the `<` under the cursor.
    fn markup(&mut self) -> Markup {
        let rest = &self.src[self.pos..];
        let bytes = rest.as_bytes();

        if rest.starts_with("<!--") {
            self.pos = match rest[4..].find("-->") {
                Some(end) => self.pos + 4 + end + 3,
                None => self.src.len(),
            };
            return Markup::Skipped;
        }

        if rest.starts_with("<!") || rest.starts_with("<?") {
            self.skip_past('>');
            return Markup::Skipped;
        }

        if rest.starts_with("</") {
            return match bytes.get(2) {
                Some(b) if b.is_ascii_alphabetic() => {
                    self.pos += 2;
                    let name = self.read_tag_name();
                    if self.skip_attributes() {
                        Markup::Tag(Token::End(name))
                    } else {
                        Markup::Skipped
                    }
                }
                Some(b'>') => {
                    self.pos += 3;
                    Markup::Skipped
                }
                Some(_) => {
                    self.skip_past('>');
                    Markup::Skipped
                }
                None => Markup::Literal,
            };
        }

        match bytes.get(1) {
            Some(b) if b.is_ascii_alphabetic() => {
                self.pos += 1;
                let name = self.read_tag_name();
                if self.skip_attributes() {
                    Markup::Tag(Token::Start(name))
                } else {
                    Markup::Skipped
                }
            }
            _ => Markup::Literal,
        }
    }

    fn read_tag_name(&mut self) -> String {
        let rest = &self.src[self.pos..];
        let len = rest
            .find(|c: char| is_space(c) || c == '/' || c == '>')
            .unwrap_or(rest.len());
        self.pos += len;
        rest[..len].to_ascii_lowercase()
    }

    /// Walks attribute syntax up to and including the closing `>`. Returns
    /// false when the input ends first, in which case the tag is dropped.
    fn skip_attributes(&mut self) -> bool {
        loop {
            self.skip_spaces();
            let rest = &self.src[self.pos..];
            let Some(ch) = rest.chars().next() else {
                return false;
            };

            match ch {
                '>' => {
                    self.pos += 1;
                    return true;
                }
                '/' => {
                    self.pos += 1;
                }
                _ => {
                    // The first character always belongs to the name, even `=`.
                    let name_len = rest[ch.len_utf8()..]
                        .find(|c: char| is_space(c) || c == '/' || c == '>' || c == '=')
                        .map(|len| len + ch.len_utf8())
                        .unwrap_or(rest.len());
                    self.pos += name_len;
                    self.skip_spaces();

                    if self.src[self.pos..].starts_with('=') {
                        self.pos += 1;
                        self.skip_spaces();
                        if !self.skip_attribute_value() {
                            return false;
                        }
                    }
                }
            }
        }
    }

    fn skip_attribute_value(&mut self) -> bool {
        let rest = &self.src[self.pos..];
        match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => match rest[1..].find(quote) {
                Some(end) => {
                    self.pos += end + 2;
                    true
                }
                None => {
                    self.pos = self.src.len();
                    false
                }
            },
            Some(_) => {
                let len = rest
                    .find(|c: char| is_space(c) || c == '>')
                    .unwrap_or(rest.len());
                self.pos += len;
                true
            }
            None => false,
        }
    }

    fn skip_spaces(&mut self) {
        let rest = &self.src[self.pos..];
        let len = rest.find(|c: char| !is_space(c)).unwrap_or(rest.len());
        self.pos += len;
    }

    fn skip_past(&mut self, delim: char) {
        self.pos = match self.src[self.pos..].find(delim) {
            Some(idx) => self.pos + idx + delim.len_utf8(),
            None => self.src.len(),
        };
    }
}

enum Markup {
    Tag(Token),
    Skipped,
    Literal,
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0c')
}

fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        match decode_reference(tail) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_reference(tail: &str) -> Option<(char, usize)> {
    let (end, _) = tail.char_indices().take(12).find(|(_, c)| *c == ';')?;
    let body = &tail[1..end];

    let ch = if let Some(number) = body.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
                u32::from_str_radix(hex, 16).ok()?
            }
            Some(_) => return None,
            None if !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) => {
                number.parse::<u32>().ok()?
            }
            None => return None,
        };
        char::from_u32(code).filter(|c| *c != '\0')?
    } else {
        named_entity(body)?
    };

    Some((ch, end + 1))
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "bull" => '•',
        "middot" => '·',
        "euro" => '€',
        "pound" => '£',
        "yen" => '¥',
        "cent" => '¢',
        "sect" => '§',
        "para" => '¶',
        "deg" => '°',
        "plusmn" => '±',
        "times" => '×',
        "divide" => '÷',
        "frac12" => '½',
        "frac14" => '¼',
        "frac34" => '¾',
        _ => return None,
    };
    Some(ch)
}

/// True when `tail` starts with `&name;` inside the decoder's window and
/// `name` is not one `named_entity` knows.
fn is_unknown_named_reference(tail: &str) -> bool {
    let Some((end, _)) = tail.char_indices().take(12).find(|(_, c)| *c == ';') else {
        return false;
    };
    let name = &tail[1..end];
    let mut bytes = name.bytes();
    bytes.next().is_some_and(|b| b.is_ascii_alphabetic())
        && bytes.all(|b| b.is_ascii_alphanumeric())
        && named_entity(name).is_none()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::{escape_attribute, extract_plain_text, is_blank_html, sanitize};

    #[rstest]
    #[case("<strong>bold</strong>", "<b>bold</b>")]
    #[case("<em>soft</em>", "<i>soft</i>")]
    #[case("<DIV>block</DIV>", "<p>block</p>")]
    #[case("<U>under</U>", "<u>under</u>")]
    #[case("line<br/>break", "line<br>break")]
    #[case("<p>one</p><p>two</p>", "<p>one</p><p>two</p>")]
    fn normalizes_allowed_tags(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize(input), expected);
    }

    #[test]
    fn unwrapping_recurses_through_disallowed_elements() {
        assert_eq!(sanitize("<script><b>x</b></script>"), "<b>x</b>");
        assert_eq!(
            sanitize("<section><span><font><em>deep</em></font></span></section>"),
            "<i>deep</i>"
        );
    }

    #[test]
    fn drops_every_attribute() {
        let out = sanitize(
            r#"<b onclick="alert(1)" style='color:red'>x</b><a href="javascript:alert(1)">link</a><img src=x onerror=alert(1)>"#,
        );
        assert_eq!(out, "<b>x</b>link");
    }

    #[test]
    fn attribute_values_may_contain_angle_brackets() {
        assert_eq!(sanitize(r#"<p title="a > b">text</p>"#), "<p>text</p>");
    }

    #[test]
    fn escapes_text_and_keeps_nbsp_encoded() {
        assert_eq!(sanitize("1 &lt; 2 &amp; 3 > 2"), "1 &lt; 2 &amp; 3 &gt; 2");
        assert_eq!(sanitize("a&nbsp;b"), "a&nbsp;b");
        assert_eq!(sanitize("fish & chips"), "fish &amp; chips");
        assert_eq!(sanitize("&#60;script&#x3E;"), "&lt;script&gt;");
    }

    #[rstest]
    #[case("&copy; 2026", "© 2026")]
    #[case("wait&hellip; &mdash; done", "wait… — done")]
    #[case("&euro;5 &times; 2", "€5 × 2")]
    #[case("&bogus; x", "&bogus; x")]
    #[case("&amp;copy;", "&amp;copy;")]
    #[case("&amp;bogus;", "&bogus;")]
    #[case("&a&b;", "&amp;a&b;")]
    #[case("&ab<span>c;</span>", "&abc;")]
    fn named_references(#[case] input: &str, #[case] expected: &str) {
        let once = sanitize(input);
        assert_eq!(once, expected);
        assert_eq!(sanitize(&once), once);
    }

    #[test]
    fn comments_and_doctypes_disappear() {
        assert_eq!(sanitize("<!DOCTYPE html><!-- hidden --><p>shown</p>"), "<p>shown</p>");
        assert_eq!(sanitize("before<!-- never closed"), "before");
    }

    #[test]
    fn mismatched_and_unclosed_tags_are_balanced() {
        assert_eq!(sanitize("<b><i>x</b>y</i>"), "<b><i>x</i></b>y");
        assert_eq!(sanitize("<p>open"), "<p>open</p>");
        assert_eq!(sanitize("stray</b> end"), "stray end");
        assert_eq!(sanitize("cut <b class=\"x"), "cut");
    }

    #[test]
    fn output_is_trimmed() {
        assert_eq!(sanitize("  \n<b>x</b>\t "), "<b>x</b>");
    }

    #[test]
    fn deep_nesting_is_flattened_not_lost() {
        let depth = 5_000;
        let input = format!("{}core{}", "<span>".repeat(depth), "</span>".repeat(depth));
        assert_eq!(sanitize(&input), "core");

        let bold = format!("{}x{}", "<b>".repeat(depth), "</b>".repeat(depth));
        let out = sanitize(&bold);
        assert!(out.contains('x'));
        assert_eq!(sanitize(&out), out);
    }

    #[test]
    fn plain_text_ignores_markup_noise() {
        assert!(is_blank_html("<p><br></p>"));
        assert!(is_blank_html("<div>&nbsp;</div>"));
        assert_eq!(extract_plain_text("<p>Buy <b>milk</b>&nbsp;</p>"), "Buy milk");
        assert!(!is_blank_html("<p>x</p>"));
    }

    #[test]
    fn attribute_escaping_covers_quotes() {
        assert_eq!(escape_attribute(r#"a"b'c<d>&"#), "a&quot;b&#39;c&lt;d&gt;&amp;");
    }

    fn markup_fragment() -> impl Strategy<Value = String> {
        let piece = prop_oneof![
            prop::sample::select(vec![
                "<b>",
                "</b>",
                "<div class=\"x\">",
                "</div>",
                "<script>",
                "</script>",
                "<br>",
                "<em onclick='x'>",
                "</em>",
                "<!-- c -->",
                "&nbsp;",
                "&amp;",
                "&copy;",
                "&bogus;",
                "<span>",
                "</span>",
                "<",
                ">",
                " ",
            ])
            .prop_map(str::to_string),
            "[a-z&#;]{0,6}",
        ];
        prop::collection::vec(piece, 0..24).prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(input in markup_fragment()) {
            let once = sanitize(&input);
            prop_assert_eq!(sanitize(&once), once.clone());
        }

        #[test]
        fn sanitize_is_idempotent_on_arbitrary_text(input in any::<String>()) {
            let once = sanitize(&input);
            prop_assert_eq!(sanitize(&once), once.clone());
        }

        #[test]
        fn output_only_carries_bare_allowed_tags(input in markup_fragment()) {
            let out = sanitize(&input);
            let mut rest = out.as_str();
            while let Some(idx) = rest.find('<') {
                let tail = &rest[idx..];
                let end = tail.find('>').map(|e| e + 1).unwrap_or(tail.len());
                let tag = &tail[..end];
                prop_assert!(
                    matches!(
                        tag,
                        "<b>" | "</b>" | "<i>" | "</i>" | "<u>" | "</u>" | "<p>" | "</p>" | "<br>"
                    ),
                    "unexpected tag {}",
                    tag
                );
                rest = &tail[end..];
            }
        }
    }
}
