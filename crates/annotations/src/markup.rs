//! Markup validation for annotation text
//!
//! Annotation text carries a small HTML-like vocabulary. Validation is a
//! tokenizer followed by independent state machines, each returning the first
//! problem it finds:
//! 1. per-tag balance, in vocabulary order
//! 2. block elements nested inside a paragraph
//! 3. list structure (items inside lists, nested lists inside items)
//! 4. a catch-all well-formedness pass over every tag

use curation_common::errors::AppError;
use regex_lite::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Tags curators may use, in the order balance is checked
pub const MARKUP_TAGS: &[&str] = &["b", "i", "li", "ol", "p", "pre", "sub", "sup", "ul"];

/// List tags nest through items, so their balance is a depth, not a flag
const LIST_TAGS: &[&str] = &["li", "ol", "ul"];

/// Tags that may not be opened inside a paragraph
const NOT_IN_PARAGRAPH: &[&str] = &["ol", "p", "pre", "ul"];

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\s*(/?)\s*([A-Za-z][A-Za-z0-9]*)([^<>]*)>").expect("tag pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Open,
    Close,
    /// `<br/>` style
    Empty,
}

/// A tag found in annotation text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Lowercased tag name
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// Structural problems in annotation markup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("<{tag}> opened while a previous <{tag}> is still open")]
    AlreadyOpen { tag: String },

    #[error("</{tag}> closes an element that is not open")]
    UnexpectedClose { tag: String },

    #[error("<{tag}> is never closed")]
    Unclosed { tag: String },

    #[error("<{tag}> is not allowed inside <{parent}>")]
    IllegalNesting { tag: String, parent: String },

    #[error("<li> must be enclosed by <ul> or <ol>")]
    ItemOutsideList,

    #[error("<{tag}> can only be nested inside a list item")]
    ListOutsideItem { tag: String },

    #[error("malformed markup: {reason}")]
    Malformed { reason: String },
}

impl MarkupError {
    /// The tag this error is about, when there is one
    pub fn tag(&self) -> Option<&str> {
        match self {
            MarkupError::AlreadyOpen { tag }
            | MarkupError::UnexpectedClose { tag }
            | MarkupError::Unclosed { tag }
            | MarkupError::IllegalNesting { tag, .. }
            | MarkupError::ListOutsideItem { tag } => Some(tag),
            MarkupError::ItemOutsideList => Some("li"),
            MarkupError::Malformed { .. } => None,
        }
    }
}

impl From<MarkupError> for AppError {
    fn from(err: MarkupError) -> Self {
        AppError::Markup {
            tag: err.tag().map(str::to_string),
            message: err.to_string(),
        }
    }
}

/// Split text into tag tokens, in document order
pub fn tokenize(text: &str) -> Vec<Token> {
    TAG_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
            let name = caps.get(2)?.as_str().to_ascii_lowercase();
            let trailer = caps.get(3).map_or("", |m| m.as_str()).trim_end();

            let kind = if closing {
                TokenKind::Close
            } else if trailer.ends_with('/') {
                TokenKind::Empty
            } else {
                TokenKind::Open
            };

            Some(Token {
                kind,
                name,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Validate the markup of an annotation text
pub fn validate(text: &str) -> Result<(), MarkupError> {
    let tokens = tokenize(text);

    for tag in MARKUP_TAGS {
        check_balance(tag, &tokens)?;
    }
    check_paragraphs(&tokens)?;
    check_lists(&tokens)?;
    check_fragment(text, &tokens)
}

fn check_balance(tag: &str, tokens: &[Token]) -> Result<(), MarkupError> {
    let nestable = LIST_TAGS.contains(&tag);
    let mut depth = 0usize;

    for token in tokens.iter().filter(|t| t.name == tag) {
        match token.kind {
            TokenKind::Open => {
                if depth > 0 && !nestable {
                    return Err(MarkupError::AlreadyOpen { tag: tag.to_string() });
                }
                depth += 1;
            }
            TokenKind::Close => {
                if depth == 0 {
                    return Err(MarkupError::UnexpectedClose { tag: tag.to_string() });
                }
                depth -= 1;
            }
            TokenKind::Empty => {}
        }
    }

    if depth > 0 {
        return Err(MarkupError::Unclosed { tag: tag.to_string() });
    }
    Ok(())
}

fn check_paragraphs(tokens: &[Token]) -> Result<(), MarkupError> {
    let mut in_paragraph = false;

    for token in tokens {
        match token.kind {
            TokenKind::Open => {
                if in_paragraph && NOT_IN_PARAGRAPH.contains(&token.name.as_str()) {
                    return Err(MarkupError::IllegalNesting {
                        tag: token.name.clone(),
                        parent: "p".to_string(),
                    });
                }
                if token.name == "p" {
                    in_paragraph = true;
                }
            }
            TokenKind::Close if token.name == "p" => in_paragraph = false,
            _ => {}
        }
    }
    Ok(())
}

fn check_lists(tokens: &[Token]) -> Result<(), MarkupError> {
    let mut open: Vec<&str> = Vec::new();

    for token in tokens.iter().filter(|t| LIST_TAGS.contains(&t.name.as_str())) {
        let name = token.name.as_str();
        match token.kind {
            TokenKind::Open if name == "li" => {
                if !matches!(open.last().copied(), Some("ul" | "ol")) {
                    return Err(MarkupError::ItemOutsideList);
                }
                open.push(name);
            }
            TokenKind::Open => {
                if !matches!(open.last().copied(), None | Some("li")) {
                    return Err(MarkupError::ListOutsideItem { tag: name.to_string() });
                }
                open.push(name);
            }
            TokenKind::Close => {
                if open.last() == Some(&name) {
                    open.pop();
                }
            }
            TokenKind::Empty => {}
        }
    }
    Ok(())
}

fn check_fragment(text: &str, tokens: &[Token]) -> Result<(), MarkupError> {
    let mut open: Vec<&str> = Vec::new();
    let mut cursor = 0;

    for token in tokens {
        check_text_run(&text[cursor..token.start])?;
        cursor = token.end;

        match token.kind {
            TokenKind::Open => open.push(&token.name),
            TokenKind::Close => match open.pop() {
                Some(name) if name == token.name => {}
                Some(name) => {
                    return Err(MarkupError::Malformed {
                        reason: format!("</{}> closes <{}>", token.name, name),
                    })
                }
                None => {
                    return Err(MarkupError::Malformed {
                        reason: format!("</{}> has no opening tag", token.name),
                    })
                }
            },
            TokenKind::Empty => {}
        }
    }
    check_text_run(&text[cursor..])?;

    match open.last() {
        Some(name) => Err(MarkupError::Malformed {
            reason: format!("<{}> is never closed", name),
        }),
        None => Ok(()),
    }
}

fn check_text_run(run: &str) -> Result<(), MarkupError> {
    if run.contains('<') {
        return Err(MarkupError::Malformed {
            reason: "stray '<' outside of a tag".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &[&str] = &[
        "<p>Domain</p>",
        "<p>The <b>N-terminal</b> region binds <i>zinc</i>.</p><p>See below.</p>",
        "<ul><li>one</li><li>two</li></ul>",
        "<ol><li>outer<ul><li>inner</li></ul></li><li>next</li></ol>",
        "<p>H<sub>2</sub>O and Ca<sup>2+</sup></p><pre>MKV</pre>",
    ];

    #[test]
    fn test_paragraph_is_valid() {
        assert_eq!(validate("<p>Domain</p>"), Ok(()));
    }

    #[test]
    fn test_missing_paragraph_close_names_p() {
        let err = validate("<p>Domain<ul><li>x</li></ul>").unwrap_err();
        assert_eq!(err.tag(), Some("p"));
        assert_eq!(err, MarkupError::Unclosed { tag: "p".into() });
    }

    #[test]
    fn test_valid_samples_are_accepted_repeatedly() {
        for text in VALID {
            assert_eq!(validate(text), Ok(()), "{}", text);
            assert_eq!(validate(text), Ok(()), "{}", text);
        }
    }

    #[test]
    fn test_removing_any_tag_names_that_tag() {
        for text in VALID {
            for token in tokenize(text) {
                let broken = format!("{}{}", &text[..token.start], &text[token.end..]);
                let err = validate(&broken).unwrap_err();
                assert_eq!(err.tag(), Some(token.name.as_str()), "{}", broken);
            }
        }
    }

    #[test]
    fn test_reopened_tag() {
        let err = validate("<b>bold <b>again</b></b>").unwrap_err();
        assert_eq!(err, MarkupError::AlreadyOpen { tag: "b".into() });
    }

    #[test]
    fn test_close_without_open() {
        let err = validate("text</i>").unwrap_err();
        assert_eq!(err, MarkupError::UnexpectedClose { tag: "i".into() });
    }

    #[test]
    fn test_list_inside_paragraph() {
        let err = validate("<p>a<ul><li>x</li></ul></p>").unwrap_err();
        assert_eq!(
            err,
            MarkupError::IllegalNesting {
                tag: "ul".into(),
                parent: "p".into()
            }
        );
    }

    #[test]
    fn test_item_outside_list() {
        assert_eq!(validate("<li>x</li>").unwrap_err(), MarkupError::ItemOutsideList);
    }

    #[test]
    fn test_sibling_list_is_rejected() {
        let err = validate("<ul><ul><li>x</li></ul></ul>").unwrap_err();
        assert_eq!(err, MarkupError::ListOutsideItem { tag: "ul".into() });
    }

    #[test]
    fn test_crossed_tags_are_malformed() {
        let err = validate("<b><i>x</b></i>").unwrap_err();
        assert!(matches!(err, MarkupError::Malformed { .. }));
        assert_eq!(err.tag(), None);
    }

    #[test]
    fn test_unknown_unclosed_tag_is_malformed() {
        assert!(matches!(
            validate("<div>text").unwrap_err(),
            MarkupError::Malformed { .. }
        ));
    }

    #[test]
    fn test_stray_angle_bracket_is_malformed() {
        assert!(matches!(
            validate("<p>a < b</p>").unwrap_err(),
            MarkupError::Malformed { .. }
        ));
    }

    #[test]
    fn test_case_and_self_closing_tags() {
        assert_eq!(validate("<P>line<br/>break</P>"), Ok(()));
    }

    #[test]
    fn test_plain_text_and_references_are_valid() {
        assert_eq!(validate("Binds ATP [cite:PUB00000001] [pfam:PF00069]."), Ok(()));
    }

    #[test]
    fn test_tokenize_kinds() {
        let kinds: Vec<TokenKind> = tokenize("<p>a<br />b</p>")
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(kinds, vec![TokenKind::Open, TokenKind::Empty, TokenKind::Close]);
    }

    #[test]
    fn test_markup_error_into_app_error() {
        let err: AppError = MarkupError::Unclosed { tag: "p".into() }.into();
        match err {
            AppError::Markup { tag, message } => {
                assert_eq!(tag.as_deref(), Some("p"));
                assert_eq!(message, "<p> is never closed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
