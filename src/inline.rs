//! Inline syntax parsing for a single block's text.
//!
//! The parser tokenizes delimiter runs, resolves backtick code spans,
//! escapes and entities eagerly, then matches emphasis, links, images
//! and inline HTML in a single left-to-right pass with backward scans.
//! Anything that fails to match stays in the output as literal text,
//! so the concatenated spans of the root's children always reproduce
//! the input exactly.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineSyntax {
    Root,
    RawText,
    Italic,
    Bold,
    BoldItalic,
    Strikethrough,
    InlineCode,
    Link,
    Image,
    HtmlEntity,
    InlineHtml,
    DoubleBrackets,
    DoubleBraces,
    Escape,
    LineBreak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HtmlAttribute {
    pub name: Range<usize>,
    pub value: Option<Range<usize>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum NodeDetail {
    #[default]
    None,
    Link {
        url: Range<usize>,
    },
    Image {
        url: Range<usize>,
        alt: Range<usize>,
        width: Option<f32>,
        height: Option<f32>,
        caption: Option<Range<usize>>,
    },
    Entity {
        decoded: String,
    },
    Html {
        tag: Range<usize>,
        attributes: Vec<HtmlAttribute>,
        self_closing: bool,
    },
}

/// One node of the inline tree. `span` is the byte range of the node's
/// full source text, including its delimiters.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineNode {
    pub syntax: InlineSyntax,
    pub span: Range<usize>,
    pub children: Vec<InlineNode>,
    pub detail: NodeDetail,
}

impl InlineNode {
    fn leaf(syntax: InlineSyntax, span: Range<usize>) -> Self {
        Self {
            syntax,
            span,
            children: Vec::new(),
            detail: NodeDetail::None,
        }
    }
}

/// Parses one block's text into an inline tree rooted at `Root`.
pub fn parse_inline(text: &str) -> InlineNode {
    let tokens = tokenize(text);
    let tokens = process_delimiters(tokens, text);
    InlineNode {
        syntax: InlineSyntax::Root,
        span: 0..text.len(),
        children: merge_pieces(tokens),
        detail: NodeDetail::None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmphasisMarker {
    Star,
    Underscore,
    Tilde,
}

impl EmphasisMarker {
    fn byte(self) -> u8 {
        match self {
            EmphasisMarker::Star => b'*',
            EmphasisMarker::Underscore => b'_',
            EmphasisMarker::Tilde => b'~',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Raw,
    Emphasis {
        marker: EmphasisMarker,
        count: usize,
        can_open: bool,
        can_close: bool,
    },
    Bang,
    OpenRound,
    CloseRound,
    OpenSquare {
        count: usize,
    },
    CloseSquare {
        count: usize,
    },
    OpenBrace {
        count: usize,
    },
    CloseBrace {
        count: usize,
    },
    HtmlOpen {
        tag: Range<usize>,
        attributes: Vec<HtmlAttribute>,
    },
    HtmlClose {
        tag: Range<usize>,
    },
    Node(InlineNode),
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

/// Whitespace for delimiter-flank purposes, including the Unicode
/// space separators the renderer treats as blank.
pub(crate) fn is_empty_char(c: char) -> bool {
    let u = c as u32;
    u <= 0x20
        || u == 0x7f
        || (0x2000..=0x200A).contains(&u)
        || u == 0x3000
        || u == 0x2028
        || u == 0x2029
        || u == 0xA0
        || u == 0x1680
        || u == 0x202F
        || u == 0x205F
}

pub(crate) fn is_punctuation(c: char) -> bool {
    let u = c as u32;
    (0x21..=0x2F).contains(&u)
        || (0x3A..=0x40).contains(&u)
        || (0x5B..=0x60).contains(&u)
        || (0x7B..=0x7E).contains(&u)
        || (0x2010..=0x2027).contains(&u)
        || (0x2030..=0x205E).contains(&u)
        || (0x2E00..=0x2E7F).contains(&u)
        || (0x3001..=0x303F).contains(&u)
        || (0xFE10..=0xFE1F).contains(&u)
        || (0xFE30..=0xFE4F).contains(&u)
        || (0xFE50..=0xFE6F).contains(&u)
        || (0xFF02..=0xFF0F).contains(&u)
        || (0xFF1B..=0xFF20).contains(&u)
        || (0xFF3B..=0xFF40).contains(&u)
        || (0xFF5B..=0xFF65).contains(&u)
}

fn char_before(text: &str, idx: usize) -> Option<char> {
    text[..idx].chars().next_back()
}

fn char_at(text: &str, idx: usize) -> Option<char> {
    text[idx..].chars().next()
}

fn tokenize(text: &str) -> Vec<Token> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut raw_start = 0usize;
    let mut i = 0usize;

    macro_rules! flush_raw {
        ($upto:expr) => {
            if raw_start < $upto {
                tokens.push(Token {
                    kind: TokenKind::Raw,
                    start: raw_start,
                    end: $upto,
                });
            }
        };
    }

    while i < len {
        let b = bytes[i];
        match b {
            b'*' | b'_' | b'~' => {
                let start = i;
                while i < len && bytes[i] == b {
                    i += 1;
                }
                let count = i - start;
                let marker = match b {
                    b'*' => EmphasisMarker::Star,
                    b'_' => EmphasisMarker::Underscore,
                    _ => EmphasisMarker::Tilde,
                };
                let (can_open, can_close) = flank_flags(text, start, i, marker, count);
                flush_raw!(start);
                tokens.push(Token {
                    kind: TokenKind::Emphasis {
                        marker,
                        count,
                        can_open,
                        can_close,
                    },
                    start,
                    end: i,
                });
                raw_start = i;
            }
            b'[' | b']' | b'{' | b'}' => {
                let start = i;
                while i < len && bytes[i] == b {
                    i += 1;
                }
                let count = i - start;
                let kind = match b {
                    b'[' => TokenKind::OpenSquare { count },
                    b']' => TokenKind::CloseSquare { count },
                    b'{' => TokenKind::OpenBrace { count },
                    _ => TokenKind::CloseBrace { count },
                };
                flush_raw!(start);
                tokens.push(Token {
                    kind,
                    start,
                    end: i,
                });
                raw_start = i;
            }
            b'!' | b'(' | b')' => {
                let kind = match b {
                    b'!' => TokenKind::Bang,
                    b'(' => TokenKind::OpenRound,
                    _ => TokenKind::CloseRound,
                };
                flush_raw!(i);
                tokens.push(Token {
                    kind,
                    start: i,
                    end: i + 1,
                });
                i += 1;
                raw_start = i;
            }
            b'\n' => {
                flush_raw!(i);
                tokens.push(Token {
                    kind: TokenKind::Node(InlineNode::leaf(InlineSyntax::LineBreak, i..i + 1)),
                    start: i,
                    end: i + 1,
                });
                i += 1;
                raw_start = i;
            }
            b'`' => {
                let start = i;
                while i < len && bytes[i] == b'`' {
                    i += 1;
                }
                let count = i - start;
                if let Some(close) = find_code_close(bytes, i, count) {
                    flush_raw!(start);
                    let mut node =
                        InlineNode::leaf(InlineSyntax::InlineCode, start..close + count);
                    node.children
                        .push(InlineNode::leaf(InlineSyntax::RawText, start + count..close));
                    tokens.push(Token {
                        kind: TokenKind::Node(node),
                        start,
                        end: close + count,
                    });
                    i = close + count;
                    raw_start = i;
                }
                // no closer: the run stays literal text
            }
            b'\\' => {
                if let Some(next) = char_at(text, i + 1) {
                    let end = i + 1 + next.len_utf8();
                    flush_raw!(i);
                    let mut node = InlineNode::leaf(InlineSyntax::Escape, i..end);
                    node.children
                        .push(InlineNode::leaf(InlineSyntax::RawText, i + 1..end));
                    tokens.push(Token {
                        kind: TokenKind::Node(node),
                        start: i,
                        end,
                    });
                    i = end;
                    raw_start = i;
                } else {
                    i += 1;
                }
            }
            b'&' => {
                if let Some((decoded, end)) = parse_entity(text, i) {
                    flush_raw!(i);
                    tokens.push(Token {
                        kind: TokenKind::Node(InlineNode {
                            syntax: InlineSyntax::HtmlEntity,
                            span: i..end,
                            children: Vec::new(),
                            detail: NodeDetail::Entity { decoded },
                        }),
                        start: i,
                        end,
                    });
                    i = end;
                    raw_start = i;
                } else {
                    i += 1;
                }
            }
            b'<' => {
                if let Some((token, end)) = parse_html_tag(text, i) {
                    flush_raw!(i);
                    tokens.push(token);
                    i = end;
                    raw_start = i;
                } else {
                    i += 1;
                }
            }
            _ => {
                i += 1;
            }
        }
    }
    flush_raw!(len);
    tokens
}

/// Opener/closer flags for an emphasis run spanning `start..end`.
fn flank_flags(
    text: &str,
    start: usize,
    end: usize,
    marker: EmphasisMarker,
    count: usize,
) -> (bool, bool) {
    let before = char_before(text, start);
    let after = char_at(text, end);
    let empty_before = before.map_or(true, is_empty_char);
    let punc_before = before.map_or(false, is_punctuation);
    let empty_after = after.map_or(true, is_empty_char);
    let punc_after = after.map_or(false, is_punctuation);

    let can_start = !empty_after && (!punc_after || empty_before || punc_before);
    let can_end = !empty_before && (!punc_before || empty_after || punc_after);
    match marker {
        EmphasisMarker::Underscore => (
            can_start && (!can_end || punc_before),
            can_end && (!can_start || punc_after),
        ),
        EmphasisMarker::Tilde => {
            if count < 2 {
                (false, false)
            } else {
                (can_start, can_end)
            }
        }
        EmphasisMarker::Star => (can_start, can_end),
    }
}

/// Locates a closing backtick run of exactly `count` ticks at or after
/// `from`. Longer or shorter runs do not close the span.
fn find_code_close(bytes: &[u8], from: usize, count: usize) -> Option<usize> {
    let mut k = from;
    while k < bytes.len() {
        if bytes[k] == b'`' {
            let s = k;
            while k < bytes.len() && bytes[k] == b'`' {
                k += 1;
            }
            if k - s == count {
                return Some(s);
            }
        } else {
            k += 1;
        }
    }
    None
}

const MAX_ENTITY_BYTES: usize = 12;

const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{A0}'),
    ("copy", '\u{A9}'),
    ("reg", '\u{AE}'),
    ("deg", '\u{B0}'),
    ("plusmn", '\u{B1}'),
    ("sup2", '\u{B2}'),
    ("sup3", '\u{B3}'),
    ("middot", '\u{B7}'),
    ("frac14", '\u{BC}'),
    ("frac12", '\u{BD}'),
    ("frac34", '\u{BE}'),
    ("times", '\u{D7}'),
    ("divide", '\u{F7}'),
    ("ndash", '\u{2013}'),
    ("mdash", '\u{2014}'),
    ("lsquo", '\u{2018}'),
    ("rsquo", '\u{2019}'),
    ("ldquo", '\u{201C}'),
    ("rdquo", '\u{201D}'),
    ("bull", '\u{2022}'),
    ("hellip", '\u{2026}'),
    ("prime", '\u{2032}'),
    ("trade", '\u{2122}'),
    ("larr", '\u{2190}'),
    ("uarr", '\u{2191}'),
    ("rarr", '\u{2192}'),
    ("darr", '\u{2193}'),
    ("harr", '\u{2194}'),
    ("infin", '\u{221E}'),
    ("ne", '\u{2260}'),
    ("le", '\u{2264}'),
    ("ge", '\u{2265}'),
    ("alpha", '\u{3B1}'),
    ("beta", '\u{3B2}'),
    ("gamma", '\u{3B3}'),
    ("delta", '\u{3B4}'),
    ("pi", '\u{3C0}'),
    ("sigma", '\u{3C3}'),
    ("omega", '\u{3C9}'),
    ("spades", '\u{2660}'),
    ("clubs", '\u{2663}'),
    ("hearts", '\u{2665}'),
    ("diams", '\u{2666}'),
];

/// Decodes `&name;`, `&#NNN;` or `&#xHH;` starting at the ampersand.
fn parse_entity(text: &str, at: usize) -> Option<(String, usize)> {
    let rest = &text[at + 1..];
    let limit = rest.len().min(MAX_ENTITY_BYTES);
    let semi = rest[..limit].find(';')?;
    let body = &rest[..semi];
    if body.is_empty() {
        return None;
    }
    let end = at + 1 + semi + 1;
    let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        let code = u32::from_str_radix(hex, 16).ok()?;
        char::from_u32(code)?
    } else if let Some(dec) = body.strip_prefix('#') {
        let code: u32 = dec.parse().ok()?;
        char::from_u32(code)?
    } else {
        NAMED_ENTITIES
            .iter()
            .find(|(name, _)| *name == body)
            .map(|(_, c)| *c)?
    };
    Some((decoded.to_string(), end))
}

#[derive(Debug, PartialEq)]
enum TagState {
    ParseTag,
    WaitForAttributeName,
    ParseAttributeName,
    WaitForEqual,
    WaitForAttributeValue,
    ParseAttributeValue,
}

fn is_tag_name_byte(b: u8, first: bool) -> bool {
    b.is_ascii_alphabetic() || (!first && (b.is_ascii_digit() || b == b'-'))
}

/// Parses a full `<tag attr="v">`, `<tag/>` or `</tag>` starting at
/// the `<`. Returns the produced token and the byte index after `>`.
fn parse_html_tag(text: &str, at: usize) -> Option<(Token, usize)> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    let mut i = at + 1;
    let closing = i < len && bytes[i] == b'/';
    if closing {
        i += 1;
    }
    let name_start = i;
    while i < len && is_tag_name_byte(bytes[i], i == name_start) {
        i += 1;
    }
    if i == name_start {
        return None;
    }
    let tag = name_start..i;

    if closing {
        while i < len && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
        if i < len && bytes[i] == b'>' {
            return Some((
                Token {
                    kind: TokenKind::HtmlClose { tag },
                    start: at,
                    end: i + 1,
                },
                i + 1,
            ));
        }
        return None;
    }

    let mut attributes = Vec::new();
    let mut state = TagState::ParseTag;
    let mut self_closing = false;
    let mut name: Range<usize> = 0..0;
    let mut quote = 0u8;
    let mut value_start = 0usize;
    loop {
        if i >= len {
            return None;
        }
        let b = bytes[i];
        match state {
            TagState::ParseTag | TagState::WaitForAttributeName => match b {
                b' ' | b'\t' => {}
                b'/' => {
                    if i + 1 < len && bytes[i + 1] == b'>' {
                        self_closing = true;
                        i += 1;
                        break;
                    }
                    return None;
                }
                b'>' => break,
                b'<' | b'=' | b'"' | b'\'' => return None,
                _ => {
                    name = i..i;
                    state = TagState::ParseAttributeName;
                    continue;
                }
            },
            TagState::ParseAttributeName => match b {
                b' ' | b'\t' => {
                    name.end = i;
                    state = TagState::WaitForEqual;
                }
                b'=' => {
                    name.end = i;
                    state = TagState::WaitForAttributeValue;
                }
                b'>' => {
                    name.end = i;
                    attributes.push(HtmlAttribute {
                        name: name.clone(),
                        value: None,
                    });
                    break;
                }
                b'/' => {
                    if i + 1 < len && bytes[i + 1] == b'>' {
                        name.end = i;
                        attributes.push(HtmlAttribute {
                            name: name.clone(),
                            value: None,
                        });
                        self_closing = true;
                        i += 1;
                        break;
                    }
                    return None;
                }
                b'<' | b'"' | b'\'' => return None,
                _ => {}
            },
            TagState::WaitForEqual => match b {
                b' ' | b'\t' => {}
                b'=' => state = TagState::WaitForAttributeValue,
                b'>' => {
                    attributes.push(HtmlAttribute {
                        name: name.clone(),
                        value: None,
                    });
                    break;
                }
                _ => {
                    attributes.push(HtmlAttribute {
                        name: name.clone(),
                        value: None,
                    });
                    state = TagState::WaitForAttributeName;
                    continue;
                }
            },
            TagState::WaitForAttributeValue => match b {
                b' ' | b'\t' => {}
                b'"' | b'\'' => {
                    quote = b;
                    value_start = i + 1;
                    state = TagState::ParseAttributeValue;
                }
                b'>' | b'<' | b'=' => return None,
                _ => {
                    quote = 0;
                    value_start = i;
                    state = TagState::ParseAttributeValue;
                    continue;
                }
            },
            TagState::ParseAttributeValue => {
                if quote != 0 {
                    if b == quote {
                        attributes.push(HtmlAttribute {
                            name: name.clone(),
                            value: Some(value_start..i),
                        });
                        state = TagState::WaitForAttributeName;
                    }
                } else {
                    match b {
                        b' ' | b'\t' => {
                            attributes.push(HtmlAttribute {
                                name: name.clone(),
                                value: Some(value_start..i),
                            });
                            state = TagState::WaitForAttributeName;
                        }
                        b'>' => {
                            attributes.push(HtmlAttribute {
                                name: name.clone(),
                                value: Some(value_start..i),
                            });
                            break;
                        }
                        b'/' if i + 1 < len && bytes[i + 1] == b'>' => {
                            attributes.push(HtmlAttribute {
                                name: name.clone(),
                                value: Some(value_start..i),
                            });
                            self_closing = true;
                            i += 1;
                            break;
                        }
                        b'"' | b'\'' | b'<' => return None,
                        _ => {}
                    }
                }
            }
        }
        i += 1;
    }
    let end = i + 1;

    // void elements never get a matching close tag
    if text[tag.clone()].eq_ignore_ascii_case("br") {
        self_closing = true;
    }
    if self_closing {
        let node = InlineNode {
            syntax: InlineSyntax::InlineHtml,
            span: at..end,
            children: Vec::new(),
            detail: NodeDetail::Html {
                tag,
                attributes,
                self_closing: true,
            },
        };
        return Some((
            Token {
                kind: TokenKind::Node(node),
                start: at,
                end,
            },
            end,
        ));
    }
    Some((
        Token {
            kind: TokenKind::HtmlOpen { tag, attributes },
            start: at,
            end,
        },
        end,
    ))
}

fn paired_count(kind: &TokenKind) -> Option<usize> {
    match kind {
        TokenKind::Emphasis { count, .. }
        | TokenKind::OpenSquare { count }
        | TokenKind::CloseSquare { count }
        | TokenKind::OpenBrace { count }
        | TokenKind::CloseBrace { count } => Some(*count),
        _ => None,
    }
}

fn shrink_count(kind: &mut TokenKind, eat: usize) {
    match kind {
        TokenKind::Emphasis { count, marker, can_open, can_close } => {
            *count -= eat;
            if *marker == EmphasisMarker::Tilde && *count < 2 {
                *can_open = false;
                *can_close = false;
            }
        }
        TokenKind::OpenSquare { count }
        | TokenKind::CloseSquare { count }
        | TokenKind::OpenBrace { count }
        | TokenKind::CloseBrace { count } => *count -= eat,
        _ => {}
    }
}

/// Collapses opener `j` and closer `i` into a node eating `eat` marker
/// bytes from each side. Returns the index to continue scanning from.
fn collapse_pair(
    tokens: &mut Vec<Token>,
    j: usize,
    i: usize,
    eat: usize,
    syntax: InlineSyntax,
) -> usize {
    let inner: Vec<Token> = tokens.drain(j + 1..i).collect();
    let node_start = tokens[j].end - eat;
    let node_end = tokens[j + 1].start + eat;
    let children = merge_pieces(inner);

    tokens[j].end -= eat;
    shrink_count(&mut tokens[j].kind, eat);
    let opener_empty = paired_count(&tokens[j].kind) == Some(0);

    tokens[j + 1].start += eat;
    shrink_count(&mut tokens[j + 1].kind, eat);
    let closer_empty = paired_count(&tokens[j + 1].kind) == Some(0);

    tokens.insert(
        j + 1,
        Token {
            kind: TokenKind::Node(InlineNode {
                syntax,
                span: node_start..node_end,
                children,
                detail: NodeDetail::None,
            }),
            start: node_start,
            end: node_end,
        },
    );
    // opener j, node j+1, closer j+2
    let mut next = j + 2;
    if closer_empty {
        tokens.remove(j + 2);
    }
    if opener_empty {
        tokens.remove(j);
        next -= 1;
    }
    next
}

fn process_delimiters(mut tokens: Vec<Token>, text: &str) -> Vec<Token> {
    let mut i = 0usize;
    while i < tokens.len() {
        match &tokens[i].kind {
            TokenKind::Emphasis {
                marker,
                count,
                can_close: true,
                ..
            } if *count > 0 => {
                let marker = *marker;
                let closer_count = *count;
                let mut opener = None;
                let mut j = i;
                while j > 0 {
                    j -= 1;
                    if let TokenKind::Emphasis {
                        marker: m,
                        count: c,
                        can_open: true,
                        ..
                    } = &tokens[j].kind
                    {
                        if *m == marker && *c > 0 {
                            opener = Some((j, *c));
                            break;
                        }
                    }
                }
                let Some((j, opener_count)) = opener else {
                    i += 1;
                    continue;
                };
                let (eat, syntax) = match marker {
                    EmphasisMarker::Tilde => (2, InlineSyntax::Strikethrough),
                    _ => match opener_count.min(closer_count) {
                        1 => (1, InlineSyntax::Italic),
                        2 => (2, InlineSyntax::Bold),
                        _ => (3, InlineSyntax::BoldItalic),
                    },
                };
                i = collapse_pair(&mut tokens, j, i, eat, syntax);
            }
            TokenKind::CloseSquare { count } if *count >= 2 => {
                let mut opener = None;
                let mut j = i;
                while j > 0 {
                    j -= 1;
                    if let TokenKind::OpenSquare { count: c } = &tokens[j].kind {
                        if *c >= 2 {
                            opener = Some(j);
                            break;
                        }
                    }
                }
                if let Some(j) = opener {
                    i = collapse_pair(&mut tokens, j, i, 2, InlineSyntax::DoubleBrackets);
                } else {
                    i += 1;
                }
            }
            TokenKind::CloseBrace { count } if *count >= 2 => {
                let mut opener = None;
                let mut j = i;
                while j > 0 {
                    j -= 1;
                    if let TokenKind::OpenBrace { count: c } = &tokens[j].kind {
                        if *c >= 2 {
                            opener = Some(j);
                            break;
                        }
                    }
                }
                if let Some(j) = opener {
                    i = collapse_pair(&mut tokens, j, i, 2, InlineSyntax::DoubleBraces);
                } else {
                    i += 1;
                }
            }
            TokenKind::CloseRound => {
                if let Some(next) = try_link(&mut tokens, i, text) {
                    i = next;
                } else {
                    i += 1;
                }
            }
            TokenKind::HtmlClose { tag } => {
                let tag = tag.clone();
                let mut opener = None;
                let mut j = i;
                while j > 0 {
                    j -= 1;
                    if let TokenKind::HtmlOpen { tag: open_tag, .. } = &tokens[j].kind {
                        if text[open_tag.clone()].eq_ignore_ascii_case(&text[tag.clone()]) {
                            opener = Some(j);
                            break;
                        }
                    }
                }
                let Some(j) = opener else {
                    i += 1;
                    continue;
                };
                let close = tokens.remove(i);
                let inner: Vec<Token> = tokens.drain(j + 1..i).collect();
                let open = tokens.remove(j);
                let TokenKind::HtmlOpen { tag, attributes } = open.kind else {
                    unreachable!()
                };
                let node = InlineNode {
                    syntax: InlineSyntax::InlineHtml,
                    span: open.start..close.end,
                    children: merge_pieces(inner),
                    detail: NodeDetail::Html {
                        tag,
                        attributes,
                        self_closing: false,
                    },
                };
                tokens.insert(
                    j,
                    Token {
                        kind: TokenKind::Node(node),
                        start: open.start,
                        end: close.end,
                    },
                );
                i = j + 1;
            }
            _ => i += 1,
        }
    }
    tokens
}

/// Resolves `[text](url extra)` or `![alt](url extra)` ending at the
/// close-round token `i`. Returns the next scan index on success.
fn try_link(tokens: &mut Vec<Token>, i: usize, text: &str) -> Option<usize> {
    // nearest `](` pair to the left
    let mut open_round = None;
    let mut j = i;
    while j > 1 {
        j -= 1;
        if matches!(tokens[j].kind, TokenKind::OpenRound)
            && matches!(tokens[j - 1].kind, TokenKind::CloseSquare { count: 1 })
        {
            open_round = Some(j);
            break;
        }
    }
    let open_round = open_round?;
    let close_square = open_round - 1;
    let mut open_square = None;
    let mut k = close_square;
    while k > 0 {
        k -= 1;
        if matches!(tokens[k].kind, TokenKind::OpenSquare { count: 1 }) {
            open_square = Some(k);
            break;
        }
    }
    let open_square = open_square?;
    let image = open_square > 0 && matches!(tokens[open_square - 1].kind, TokenKind::Bang);

    let url_region = tokens[open_round].end..tokens[i].start;
    let (url, extra) = split_link_payload(text, url_region);

    let first = if image { open_square - 1 } else { open_square };
    let node_span = tokens[first].start..tokens[i].end;
    let inner: Vec<Token> = tokens[open_square + 1..close_square].to_vec();
    let children = merge_pieces(inner);

    let node = if image {
        let alt = tokens[open_square].end..tokens[close_square].start;
        let (width, height, caption) = parse_image_extra(text, extra);
        InlineNode {
            syntax: InlineSyntax::Image,
            span: node_span.clone(),
            children: Vec::new(),
            detail: NodeDetail::Image {
                url,
                alt,
                width,
                height,
                caption,
            },
        }
    } else {
        InlineNode {
            syntax: InlineSyntax::Link,
            span: node_span.clone(),
            children,
            detail: NodeDetail::Link { url },
        }
    };
    tokens.splice(
        first..=i,
        [Token {
            kind: TokenKind::Node(node),
            start: node_span.start,
            end: node_span.end,
        }],
    );
    Some(first + 1)
}

/// Splits the round-bracket payload into the URL (up to the first
/// space) and the trailing extra text.
fn split_link_payload(text: &str, region: Range<usize>) -> (Range<usize>, Range<usize>) {
    let body = &text[region.clone()];
    match body.find(' ') {
        Some(pos) => (
            region.start..region.start + pos,
            region.start + pos + 1..region.end,
        ),
        None => (region.clone(), region.end..region.end),
    }
}

/// Pulls `width=`, `height=` and a quoted caption out of the extra
/// text after an image URL. Pieces are space separated; a quoted piece
/// keeps its interior spaces.
fn parse_image_extra(
    text: &str,
    extra: Range<usize>,
) -> (Option<f32>, Option<f32>, Option<Range<usize>>) {
    let mut width = None;
    let mut height = None;
    let mut caption = None;
    let body = &text[extra.clone()];
    let bytes = body.as_bytes();
    let mut pos = 0usize;
    while pos < bytes.len() {
        if bytes[pos] == b' ' {
            pos += 1;
            continue;
        }
        let start = pos;
        let end;
        if bytes[pos] == b'"' {
            let mut k = pos + 1;
            while k < bytes.len() && bytes[k] != b'"' {
                k += 1;
            }
            if k < bytes.len() {
                caption = Some(extra.start + pos + 1..extra.start + k);
                pos = k + 1;
                continue;
            }
            end = bytes.len();
        } else {
            let mut k = pos;
            while k < bytes.len() && bytes[k] != b' ' {
                k += 1;
            }
            end = k;
        }
        let piece = &body[start..end];
        if let Some(v) = piece.strip_prefix("width=") {
            width = v.parse().ok().filter(|w: &f32| w.is_finite() && *w > 0.0);
        } else if let Some(v) = piece.strip_prefix("height=") {
            height = v.parse().ok().filter(|h: &f32| h.is_finite() && *h > 0.0);
        }
        pos = end;
    }
    (width, height, caption)
}

/// Folds a token run into nodes. Adjacent non-node tokens coalesce
/// into a single literal text node covering their combined bytes.
fn merge_pieces(tokens: Vec<Token>) -> Vec<InlineNode> {
    let mut nodes = Vec::new();
    let mut pending: Option<Range<usize>> = None;
    for token in tokens {
        match token.kind {
            TokenKind::Node(node) => {
                if let Some(span) = pending.take() {
                    nodes.push(InlineNode::leaf(InlineSyntax::RawText, span));
                }
                nodes.push(node);
            }
            _ => match &mut pending {
                Some(span) => span.end = token.end,
                None => pending = Some(token.start..token.end),
            },
        }
    }
    if let Some(span) = pending {
        nodes.push(InlineNode::leaf(InlineSyntax::RawText, span));
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans_reconstruct(text: &str) {
        let root = parse_inline(text);
        let mut rebuilt = String::new();
        for child in &root.children {
            rebuilt.push_str(&text[child.span.clone()]);
        }
        assert_eq!(rebuilt, text, "children spans must tile the input");
    }

    fn only_child(root: &InlineNode) -> &InlineNode {
        assert_eq!(root.children.len(), 1, "{:?}", root.children);
        &root.children[0]
    }

    #[test]
    fn plain_text_is_one_raw_node() {
        let root = parse_inline("hello world");
        let child = only_child(&root);
        assert_eq!(child.syntax, InlineSyntax::RawText);
        assert_eq!(child.span, 0..11);
    }

    #[test]
    fn emphasis_levels_follow_marker_count() {
        for (input, syntax) in [
            ("*x*", InlineSyntax::Italic),
            ("**x**", InlineSyntax::Bold),
            ("***x***", InlineSyntax::BoldItalic),
            ("~~x~~", InlineSyntax::Strikethrough),
        ] {
            let root = parse_inline(input);
            let child = only_child(&root);
            assert_eq!(child.syntax, syntax, "{input}");
            assert_eq!(child.children[0].syntax, InlineSyntax::RawText);
            spans_reconstruct(input);
        }
    }

    #[test]
    fn nested_emphasis_builds_a_tree() {
        let root = parse_inline("**bold *it* more**");
        let bold = only_child(&root);
        assert_eq!(bold.syntax, InlineSyntax::Bold);
        assert_eq!(bold.children.len(), 3);
        assert_eq!(bold.children[1].syntax, InlineSyntax::Italic);
    }

    #[test]
    fn intraword_underscores_stay_literal() {
        let root = parse_inline("snake_case_name");
        let child = only_child(&root);
        assert_eq!(child.syntax, InlineSyntax::RawText);
    }

    #[test]
    fn unmatched_delimiters_degrade_to_text() {
        for input in ["**never closed", "*a**", "~not struck~", "](orphan)"] {
            spans_reconstruct(input);
        }
        let root = parse_inline("**never closed");
        assert!(root.children.iter().all(|n| n.syntax == InlineSyntax::RawText));
    }

    #[test]
    fn code_span_needs_matching_tick_count() {
        let root = parse_inline("``code``");
        let child = only_child(&root);
        assert_eq!(child.syntax, InlineSyntax::InlineCode);
        assert_eq!(child.children[0].span, 2..6);

        // ``x` never closes; everything stays literal
        let root = parse_inline("``x`");
        assert!(root.children.iter().all(|n| n.syntax == InlineSyntax::RawText));
        spans_reconstruct("``x`");
    }

    #[test]
    fn code_span_interior_is_opaque() {
        let root = parse_inline("`**not bold**`");
        let code = only_child(&root);
        assert_eq!(code.syntax, InlineSyntax::InlineCode);
        assert_eq!(code.children.len(), 1);
        assert_eq!(code.children[0].syntax, InlineSyntax::RawText);
    }

    #[test]
    fn escape_consumes_one_character() {
        let root = parse_inline(r"\*not italic\*");
        assert_eq!(root.children[0].syntax, InlineSyntax::Escape);
        assert_eq!(root.children[1].syntax, InlineSyntax::RawText);
        assert_eq!(root.children[2].syntax, InlineSyntax::Escape);
        spans_reconstruct(r"\*not italic\*");
    }

    #[test]
    fn entities_decode_named_and_numeric() {
        for (input, expected) in [("&amp;", "&"), ("&#65;", "A"), ("&#x2764;", "\u{2764}")] {
            let root = parse_inline(input);
            let child = only_child(&root);
            assert_eq!(child.syntax, InlineSyntax::HtmlEntity);
            match &child.detail {
                NodeDetail::Entity { decoded } => assert_eq!(decoded, expected),
                other => panic!("unexpected detail {other:?}"),
            }
        }
        // unterminated or unknown stays literal
        let root = parse_inline("&unknown; and &toolongtoberesolved;");
        assert!(root.children.iter().all(|n| n.syntax == InlineSyntax::RawText));
    }

    #[test]
    fn link_url_splits_at_first_space() {
        let root = parse_inline("[click](https://a.example/x extra)");
        let link = only_child(&root);
        assert_eq!(link.syntax, InlineSyntax::Link);
        match &link.detail {
            NodeDetail::Link { url } => {
                assert_eq!(&"[click](https://a.example/x extra)"[url.clone()], "https://a.example/x");
            }
            other => panic!("unexpected detail {other:?}"),
        }
        assert_eq!(link.children[0].syntax, InlineSyntax::RawText);
    }

    #[test]
    fn image_extra_carries_size_and_caption() {
        let input = "![alt text](http://i.example/p.png width=120 height=80 \"a caption\")";
        let root = parse_inline(input);
        let image = only_child(&root);
        assert_eq!(image.syntax, InlineSyntax::Image);
        match &image.detail {
            NodeDetail::Image {
                url,
                alt,
                width,
                height,
                caption,
            } => {
                assert_eq!(&input[url.clone()], "http://i.example/p.png");
                assert_eq!(&input[alt.clone()], "alt text");
                assert_eq!(*width, Some(120.0));
                assert_eq!(*height, Some(80.0));
                assert_eq!(&input[caption.clone().unwrap()], "a caption");
            }
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn styled_link_text_keeps_children() {
        let root = parse_inline("[**bold** label](u)");
        let link = only_child(&root);
        assert_eq!(link.syntax, InlineSyntax::Link);
        assert_eq!(link.children[0].syntax, InlineSyntax::Bold);
    }

    #[test]
    fn double_brackets_and_braces_pair_up() {
        let root = parse_inline("[[ref]] and {{var}}");
        assert_eq!(root.children[0].syntax, InlineSyntax::DoubleBrackets);
        assert_eq!(root.children[2].syntax, InlineSyntax::DoubleBraces);
        spans_reconstruct("[[ref]] and {{var}}");
    }

    #[test]
    fn inline_html_matches_nearest_open_tag() {
        let input = "a <b class=\"x\">bold <i>both</i></b> z";
        let root = parse_inline(input);
        let outer = &root.children[1];
        assert_eq!(outer.syntax, InlineSyntax::InlineHtml);
        match &outer.detail {
            NodeDetail::Html {
                tag, attributes, self_closing,
            } => {
                assert_eq!(&input[tag.clone()], "b");
                assert_eq!(attributes.len(), 1);
                assert_eq!(&input[attributes[0].name.clone()], "class");
                assert!(!self_closing);
            }
            other => panic!("unexpected detail {other:?}"),
        }
        assert_eq!(outer.children[1].syntax, InlineSyntax::InlineHtml);
        spans_reconstruct(input);
    }

    #[test]
    fn br_and_self_closed_tags_need_no_close() {
        let root = parse_inline("one<br>two<img src=x/>");
        assert_eq!(root.children[1].syntax, InlineSyntax::InlineHtml);
        assert_eq!(root.children[3].syntax, InlineSyntax::InlineHtml);
        match &root.children[1].detail {
            NodeDetail::Html { self_closing, .. } => assert!(self_closing),
            other => panic!("unexpected detail {other:?}"),
        }
    }

    #[test]
    fn dangling_close_tag_stays_literal() {
        let input = "text </b> more";
        let root = parse_inline(input);
        assert!(root.children.iter().all(|n| n.syntax == InlineSyntax::RawText));
        spans_reconstruct(input);
    }

    #[test]
    fn reconstruction_holds_for_hostile_input() {
        for input in [
            "***a**",
            "[a](b ( c))",
            "![]()",
            "a ** b ** c",
            "_*mix~~ed*_",
            "<a href='x'>unclosed",
            "1 < 2 & 3 > 2",
            "tick ` alone",
            "\\",
            "多字节 **文本** 混合",
        ] {
            spans_reconstruct(input);
        }
    }

    #[test]
    fn multibyte_text_keeps_char_boundaries() {
        let input = "前*缀*后";
        let root = parse_inline(input);
        assert_eq!(root.children[1].syntax, InlineSyntax::Italic);
        for child in &root.children {
            assert!(input.is_char_boundary(child.span.start));
            assert!(input.is_char_boundary(child.span.end));
        }
    }
}
