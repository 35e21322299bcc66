//! Text handling for tag literals

use super::ast::{Expr, TagAttr, TagChild, TagLiteral};

/// Normalize one text run of a tag literal.
///
/// The run is split on `\n`. Every segment except the last one is
/// right-trimmed and given a single trailing space, unless it is an empty
/// first segment (text that starts right after a line break). Fenced code
/// blocks get the same treatment since they are plain text here.
pub fn normalize_text(raw: &str) -> String {
    let segments: Vec<&str> = raw.split('\n').collect();
    let last = segments.len() - 1;

    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            if i == last || (i == 0 && segment.is_empty()) {
                (*segment).to_string()
            } else {
                format!("{} ", segment.trim_end())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split `Name:Qualifier` into its parts
pub fn split_tag_name(raw: &str) -> (String, Option<String>) {
    match raw.split_once(':') {
        Some((name, qualifier)) => (name.to_string(), Some(qualifier.to_string())),
        None => (raw.to_string(), None),
    }
}

/// Strip comment delimiters and surrounding whitespace
pub fn comment_text(raw: &str) -> String {
    let inner = if let Some(rest) = raw.strip_prefix("//") {
        rest
    } else {
        raw.strip_prefix("/*")
            .and_then(|r| r.strip_suffix("*/"))
            .unwrap_or(raw)
    };
    inner.trim().to_string()
}

/// Replace simple HTML elements among `children` with their markdown text.
///
/// An element converts when it is one of `strong b em i u a p br ul ol`,
/// carries no attributes (an `a` carries exactly a literal `href`) and holds
/// only text. `ul`/`ol` hold only `li` elements and whitespace. Elements that
/// stay keep their own children converted. Adjacent text is merged once
/// anything converted.
pub fn html_to_markdown(children: Vec<TagChild>) -> Vec<TagChild> {
    let mut converted = false;
    let children: Vec<TagChild> = children
        .into_iter()
        .map(|child| {
            let markdown = match &child {
                TagChild::Expr {
                    expr: Expr::Tag { tag, .. },
                } => element_markdown(tag),
                _ => None,
            };
            match markdown {
                Some(text) => {
                    converted = true;
                    TagChild::Text { text }
                }
                None => child,
            }
        })
        .collect();
    if !converted {
        return children;
    }

    let mut merged: Vec<TagChild> = Vec::with_capacity(children.len());
    for child in children {
        match (merged.last_mut(), child) {
            (Some(TagChild::Text { text }), TagChild::Text { text: next }) => text.push_str(&next),
            (_, child) => merged.push(child),
        }
    }
    merged
}

fn element_markdown(tag: &TagLiteral) -> Option<String> {
    if tag.qualifier.is_some() {
        return None;
    }
    let href = match (tag.name.as_str(), tag.attrs.as_slice()) {
        ("a", [TagAttr::Named { name, value: Some(Expr::LitStr { v, .. }) }]) if name == "href" => Some(v.as_str()),
        (_, []) => None,
        _ => return None,
    };

    match tag.name.as_str() {
        "br" if tag.children.is_empty() => Some("\n".to_string()),
        "strong" | "b" => inline_text(tag).map(|t| format!("**{}**", t)),
        "em" | "i" => inline_text(tag).map(|t| format!("*{}*", t)),
        "u" => inline_text(tag).map(|t| format!("__{}__", t)),
        "a" => Some(format!("[{}]({})", inline_text(tag)?, href?)),
        "p" => inline_text(tag).map(|t| normalize_text(&format!("{}\n\n", t.trim()))),
        "ul" | "ol" => {
            let numbered = tag.name == "ol";
            let mut out = String::new();
            let mut index = 0;
            for child in &tag.children {
                match child {
                    TagChild::Text { text } if text.trim().is_empty() => {}
                    TagChild::Expr {
                        expr: Expr::Tag { tag: item, .. },
                    } if item.name == "li" && item.qualifier.is_none() && item.attrs.is_empty() => {
                        index += 1;
                        let marker = if numbered { format!("{}.", index) } else { "-".to_string() };
                        out.push_str(&format!("{} {}\n", marker, inline_text(item)?.trim()));
                    }
                    _ => return None,
                }
            }
            (index > 0).then(|| normalize_text(&out))
        }
        _ => None,
    }
}

/// The text of an element whose children are all non-empty text
fn inline_text(tag: &TagLiteral) -> Option<String> {
    let mut out = String::new();
    for child in &tag.children {
        match child {
            TagChild::Text { text } => out.push_str(text),
            TagChild::Expr { .. } => return None,
        }
    }
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_unchanged() {
        assert_eq!(normalize_text("Hello, "), "Hello, ");
        assert_eq!(normalize_text("Hello strong world"), "Hello strong world");
    }

    #[test]
    fn test_multiline_gets_single_trailing_space() {
        assert_eq!(normalize_text("\n# Hello\nWorld\n"), "\n# Hello \nWorld \n");
        assert_eq!(normalize_text("\nHey!   \n"), "\nHey! \n");
        assert_eq!(normalize_text("\n"), "\n");
    }

    #[test]
    fn test_blank_middle_lines_become_one_space() {
        assert_eq!(normalize_text("\nA\n\nB\n"), "\nA \n \nB \n");
    }

    #[test]
    fn test_whitespace_only_run_between_tags() {
        assert_eq!(normalize_text("\n    "), "\n    ");
    }

    #[test]
    fn test_fenced_block_lines_are_normalized_too() {
        let raw = "\n```ts\nconst a = `${x}`\n```\n";
        assert_eq!(normalize_text(raw), "\n```ts \nconst a = `${x}` \n``` \n");
    }

    fn text(s: &str) -> TagChild {
        TagChild::Text { text: s.to_string() }
    }

    fn element(name: &str, attrs: Vec<TagAttr>, children: Vec<TagChild>) -> TagChild {
        TagChild::Expr {
            expr: Expr::Tag {
                tag: Box::new(TagLiteral {
                    name: name.to_string(),
                    qualifier: None,
                    attrs,
                    children: html_to_markdown(children),
                }),
                span: Default::default(),
            },
        }
    }

    fn href(url: &str) -> TagAttr {
        TagAttr::Named {
            name: "href".to_string(),
            value: Some(Expr::LitStr {
                v: url.to_string(),
                span: Default::default(),
            }),
        }
    }

    fn texts(children: &[TagChild]) -> Vec<&str> {
        children
            .iter()
            .map(|c| match c {
                TagChild::Text { text } => text.as_str(),
                TagChild::Expr { .. } => "<element>",
            })
            .collect()
    }

    #[test]
    fn test_inline_html_becomes_markdown() {
        let children = html_to_markdown(vec![
            text("It's a "),
            element("b", vec![], vec![text("bold")]),
            text(" move, "),
            element("em", vec![], vec![text("quite")]),
            text(" "),
            element("u", vec![], vec![text("so")]),
        ]);
        assert_eq!(texts(&children), vec!["It's a **bold** move, *quite* __so__"]);
    }

    #[test]
    fn test_nested_and_linked_html() {
        let strong = element(
            "strong",
            vec![],
            vec![text("Bold with "), element("i", vec![], vec![text("italic")]), text(" inside")],
        );
        let link = element("a", vec![href("https://example.com")], vec![text("Click here")]);
        let children = html_to_markdown(vec![strong, text(" "), link, element("br", vec![], vec![])]);
        assert_eq!(
            texts(&children),
            vec!["**Bold with *italic* inside** [Click here](https://example.com)\n"]
        );
    }

    #[test]
    fn test_paragraphs_and_lists() {
        let children = html_to_markdown(vec![
            element("p", vec![], vec![text("First paragraph")]),
            element(
                "ul",
                vec![],
                vec![
                    text("\n  "),
                    element("li", vec![], vec![text("Point "), element("strong", vec![], vec![text("one")])]),
                    text("\n  "),
                    element("li", vec![], vec![text("Point two")]),
                ],
            ),
            element("ol", vec![], vec![element("li", vec![], vec![text("First")]), element("li", vec![], vec![text("Second")])]),
        ]);
        assert_eq!(
            texts(&children),
            vec!["First paragraph \n \n- Point **one** \n- Point two \n1. First \n2. Second \n"]
        );
    }

    #[test]
    fn test_html_that_stays_an_element() {
        let class = TagAttr::Named {
            name: "className".to_string(),
            value: Some(Expr::LitStr {
                v: "highlight".to_string(),
                span: Default::default(),
            }),
        };
        let dynamic = TagChild::Expr {
            expr: Expr::Ident {
                name: "dynamicText".to_string(),
                span: Default::default(),
            },
        };
        let children = html_to_markdown(vec![
            element("strong", vec![class], vec![text("text")]),
            element("strong", vec![], vec![dynamic]),
            element("em", vec![], vec![]),
            element("a", vec![href("https://example.com"), TagAttr::Named { name: "target".to_string(), value: None }], vec![text("link")]),
            element("Message", vec![], vec![text("hi")]),
        ]);
        assert_eq!(texts(&children), vec!["<element>"; 5]);
    }

    #[test]
    fn test_inner_html_converts_inside_kept_element() {
        let div = element("div", vec![], vec![element("strong", vec![], vec![text("text")])]);
        let TagChild::Expr {
            expr: Expr::Tag { tag, .. },
        } = &div
        else {
            panic!("expected element");
        };
        assert_eq!(texts(&tag.children), vec!["**text**"]);
    }

    #[test]
    fn test_split_tag_name() {
        assert_eq!(split_tag_name("Message"), ("Message".to_string(), None));
        assert_eq!(
            split_tag_name("Message:button"),
            ("Message".to_string(), Some("button".to_string()))
        );
    }

    #[test]
    fn test_comment_text() {
        assert_eq!(comment_text("// line 1"), "line 1");
        assert_eq!(
            comment_text("/*\nComments on multiple lines\nHi!\n*/"),
            "Comments on multiple lines\nHi!"
        );
    }
}
