//! Flat block-element model the layout engine consumes. The document
//! builder flattens nested block structure (quotes, lists) into this
//! sequence; only tables keep interior structure.

use std::ops::Range;

use crate::style::{BlockStyle, BorderSides, BorderStyle, TextAlign, VerticalAlign};
use crate::text_engine::ParagraphContent;
use crate::types::{CharRange, Pt};

/// The kind of source block an element came from, after flattening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Paragraph,
    Header(u8),
    Quote,
    ListItem,
    CodeBlock,
    Table,
    Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    pub content: ParagraphContent,
    pub align: TextAlign,
    pub valign: VerticalAlign,
    pub header: bool,
    /// Offset of the cell's first character, relative to the table's
    /// own `char_start`.
    pub char_start: usize,
    pub char_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Row-major; every row has `columns` cells, padded when short.
    pub rows: Vec<Vec<TableCell>>,
    pub columns: usize,
}

impl Table {
    pub fn char_count(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .map(|c| c.char_count)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Paragraph(ParagraphContent),
    Table(Table),
    Rule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub kind: ElementKind,
    pub source_kind: SourceKind,
    pub block: BlockStyle,
    pub border: BorderStyle,
    pub border_sides: BorderSides,
    /// When set, an over-wide element scrolls horizontally instead of
    /// wrapping (code blocks, tables).
    pub scroll_x: bool,
    /// Indent for wrapped lines after a list marker.
    pub hanging_indent: Pt,
    pub char_start: usize,
    pub char_count: usize,
    /// Byte range of this element's block in the source text.
    pub source: Range<usize>,
}

impl Element {
    pub fn new(kind: ElementKind, source_kind: SourceKind) -> Self {
        let char_count = match &kind {
            ElementKind::Paragraph(p) => p.char_count(),
            ElementKind::Table(t) => t.char_count(),
            ElementKind::Rule => 0,
        };
        Self {
            kind,
            source_kind,
            block: BlockStyle::default(),
            border: BorderStyle::default(),
            border_sides: BorderSides::None,
            scroll_x: false,
            hanging_indent: Pt::ZERO,
            char_start: 0,
            char_count,
            source: 0..0,
        }
    }

    pub fn char_range(&self) -> CharRange {
        CharRange::new(self.char_start, self.char_start + self.char_count)
    }

    pub fn is_content(&self) -> bool {
        !matches!(self.kind, ElementKind::Rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_engine::Run;

    #[test]
    fn paragraph_char_count_comes_from_content() {
        let para = ParagraphContent::new(vec![Run::text("hello", Default::default())]);
        let el = Element::new(ElementKind::Paragraph(para), SourceKind::Paragraph);
        assert_eq!(el.char_count, 5);
        assert_eq!(el.char_range(), CharRange::new(0, 5));
    }

    #[test]
    fn rules_carry_no_characters() {
        let el = Element::new(ElementKind::Rule, SourceKind::Rule);
        assert_eq!(el.char_count, 0);
        assert!(!el.is_content());
    }
}
