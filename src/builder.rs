//! Document building: runs a block scanner's events through the
//! inline parser and produces the flat element list the layout engine
//! consumes, plus the side tables hit-testing needs (links, images,
//! alt substitutions, source map).

use std::ops::Range;
use std::sync::Arc;

use crate::block::{BlockEvent, BlockKind};
use crate::element::{Element, ElementKind, SourceKind, Table, TableCell};
use crate::inline::{parse_inline, InlineNode, InlineSyntax, NodeDetail};
use crate::style::{RunStyle, StyleSheet, TextAlign, VerticalAlign};
use crate::text_engine::{
    InlineObject, ParagraphContent, Run, RunContent, ShapeConstraints, TextEngine,
};
use crate::types::{CharRange, Pt};

const BULLET: &str = "\u{2022}";

/// Host-provided sizing for images and inline views. Returning `None`
/// degrades the node to its textual fallback.
pub trait ResourceLoader: Send + Sync {
    fn image_size(&self, url: &str, width: Option<f32>, height: Option<f32>)
    -> Option<(f32, f32)>;

    fn view_for_tag(&self, tag: &str, attributes: &[(String, String)]) -> Option<LoadedView> {
        let _ = (tag, attributes);
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedView {
    pub id: u64,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub url: String,
    pub range: CharRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub url: String,
    pub range: CharRange,
}

/// Replacement text applied over `range` when extracting content
/// (image alt strings, empty strings for inline views).
#[derive(Debug, Clone, PartialEq)]
pub struct AltSubstitution {
    pub range: CharRange,
    pub text: String,
}

/// One rendered-character to source-byte correspondence. Entries are
/// sorted by both sides; lookups bisect either way.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpan {
    pub chars: CharRange,
    pub bytes: Range<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentContent {
    pub elements: Vec<Arc<Element>>,
    pub links: Vec<LinkInfo>,
    pub images: Vec<ImageInfo>,
    pub alt_substitutions: Vec<AltSubstitution>,
    pub source_map: Vec<SourceSpan>,
    /// Element index ranges spanned by a quote border.
    pub quote_ranges: Vec<Range<usize>>,
    pub char_count: usize,
}

pub struct DocumentBuilder {
    sheet: StyleSheet,
    engine: Arc<dyn TextEngine>,
    loader: Option<Arc<dyn ResourceLoader>>,
}

struct Leaf<'a> {
    kind: BlockKind,
    lines: Vec<(&'a str, usize)>,
}

struct Container {
    kind: BlockKind,
    first_element: usize,
    counter: u64,
}

struct TableState<'a> {
    aligns: Vec<Option<TextAlign>>,
    rows: Vec<Vec<(&'a str, usize, bool)>>,
    current: Vec<(&'a str, usize, bool)>,
    first_offset: Option<usize>,
}

struct EmitCtx {
    cursor: usize,
    runs: Vec<Run>,
}

impl EmitCtx {
    fn push_text(&mut self, text: impl Into<String>, style: RunStyle, link: Option<usize>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.cursor += text.chars().count();
        self.runs.push(Run {
            content: RunContent::Text(text),
            style,
            link,
        });
    }
}

#[derive(Default)]
struct Accum {
    links: Vec<LinkInfo>,
    images: Vec<ImageInfo>,
    alt_subs: Vec<AltSubstitution>,
}

impl DocumentBuilder {
    pub fn new(sheet: StyleSheet, engine: Arc<dyn TextEngine>) -> Self {
        Self {
            sheet,
            engine,
            loader: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn build<'a>(&self, events: &[BlockEvent<'a>]) -> DocumentContent {
        let mut out = DocumentContent::default();
        let mut acc = Accum::default();
        let mut cursor = 0usize;
        let mut containers: Vec<Container> = Vec::new();
        let mut leaf: Option<Leaf<'a>> = None;
        let mut table: Option<TableState<'a>> = None;

        for event in events {
            match event {
                BlockEvent::Start(kind) => match kind {
                    BlockKind::Paragraph
                    | BlockKind::Header(_)
                    | BlockKind::CodeBlock
                    | BlockKind::ListItem => {
                        leaf = Some(Leaf {
                            kind: kind.clone(),
                            lines: Vec::new(),
                        });
                    }
                    BlockKind::Quote | BlockKind::UnorderedList => {
                        containers.push(Container {
                            kind: kind.clone(),
                            first_element: out.elements.len(),
                            counter: 0,
                        });
                    }
                    BlockKind::OrderedList { start } => {
                        containers.push(Container {
                            kind: kind.clone(),
                            first_element: out.elements.len(),
                            counter: *start,
                        });
                    }
                    BlockKind::Table => {
                        table = Some(TableState {
                            aligns: Vec::new(),
                            rows: Vec::new(),
                            current: Vec::new(),
                            first_offset: None,
                        });
                    }
                    BlockKind::Rule => {}
                },
                BlockEvent::Line { text, offset } => {
                    if let Some(leaf) = &mut leaf {
                        leaf.lines.push((*text, *offset));
                    }
                }
                BlockEvent::TableAligns(aligns) => {
                    if let Some(table) = &mut table {
                        table.aligns = aligns.clone();
                    }
                }
                BlockEvent::TableCell {
                    text,
                    offset,
                    header,
                } => {
                    if let Some(table) = &mut table {
                        table.first_offset.get_or_insert(*offset);
                        table.current.push((*text, *offset, *header));
                    }
                }
                BlockEvent::TableRowEnd => {
                    if let Some(table) = &mut table {
                        table.rows.push(std::mem::take(&mut table.current));
                    }
                }
                BlockEvent::End(kind) => match kind {
                    BlockKind::Paragraph
                    | BlockKind::Header(_)
                    | BlockKind::CodeBlock
                    | BlockKind::ListItem => {
                        if let Some(leaf) = leaf.take() {
                            self.finish_leaf(
                                leaf,
                                &mut containers,
                                &mut cursor,
                                &mut out,
                                &mut acc,
                            );
                        }
                    }
                    BlockKind::Quote => {
                        if let Some(frame) = containers.pop() {
                            if frame.first_element < out.elements.len() {
                                out.quote_ranges
                                    .push(frame.first_element..out.elements.len());
                            }
                            self.hoist_margins(
                                &mut out.elements,
                                frame.first_element,
                                self.sheet.quote.block.margin.top,
                                self.sheet.quote.block.margin.bottom,
                            );
                        }
                    }
                    BlockKind::UnorderedList | BlockKind::OrderedList { .. } => {
                        if let Some(frame) = containers.pop() {
                            self.hoist_margins(
                                &mut out.elements,
                                frame.first_element,
                                self.sheet.list_item.block.margin.top,
                                self.sheet.list_item.block.margin.bottom,
                            );
                        }
                    }
                    BlockKind::Table => {
                        if let Some(state) = table.take() {
                            self.finish_table(state, &containers, &mut cursor, &mut out, &mut acc);
                        }
                    }
                    BlockKind::Rule => {
                        let mut element = Element::new(ElementKind::Rule, SourceKind::Rule);
                        element.block = self.sheet.rule.block.clone();
                        element.border = self.sheet.rule.border;
                        element.border_sides = self.sheet.rule.border_sides;
                        element.char_start = cursor;
                        out.elements.push(Arc::new(element));
                    }
                },
            }
        }

        out.links = acc.links;
        out.images = acc.images;
        out.alt_substitutions = acc.alt_subs;
        out.char_count = cursor;
        out
    }

    /// Plain-text mode: the whole source becomes one paragraph with a
    /// single verbatim run, no Markdown interpretation at all.
    pub fn build_plain(&self, source: &str) -> DocumentContent {
        let mut out = DocumentContent::default();
        if source.is_empty() {
            return out;
        }
        let content =
            ParagraphContent::new(vec![Run::text(source, self.sheet.normal.run.clone())]);
        let mut element = Element::new(ElementKind::Paragraph(content), SourceKind::Paragraph);
        element.block = self.sheet.normal.block.clone();
        element.source = 0..source.len();
        out.char_count = element.char_count;
        out.source_map.push(SourceSpan {
            chars: CharRange::new(0, element.char_count),
            bytes: 0..source.len(),
        });
        out.elements.push(Arc::new(element));
        out
    }

    /// Moves a container's vertical margins onto its first and last
    /// child, so the flattened sequence spaces like the nested tree.
    fn hoist_margins(&self, elements: &mut [Arc<Element>], first: usize, top: Pt, bottom: Pt) {
        if first >= elements.len() {
            return;
        }
        {
            let el = Arc::make_mut(&mut elements[first]);
            el.block.margin.top = el.block.margin.top.max(top);
        }
        let last = elements.len() - 1;
        let el = Arc::make_mut(&mut elements[last]);
        el.block.margin.bottom = el.block.margin.bottom.max(bottom);
    }

    fn in_quote(containers: &[Container]) -> bool {
        containers.iter().any(|c| c.kind == BlockKind::Quote)
    }

    fn container_indent(&self, containers: &[Container]) -> Pt {
        containers
            .iter()
            .map(|c| match c.kind {
                BlockKind::Quote => self.sheet.quote.block.padding.left,
                _ => self.sheet.list_indent,
            })
            .sum()
    }

    fn finish_leaf<'a>(
        &self,
        leaf: Leaf<'a>,
        containers: &mut [Container],
        cursor: &mut usize,
        out: &mut DocumentContent,
        acc: &mut Accum,
    ) {
        let theme = match leaf.kind {
            BlockKind::Header(level) => self.sheet.header(level).clone(),
            BlockKind::CodeBlock => self.sheet.code_block.clone(),
            BlockKind::ListItem => self.sheet.list_item.clone(),
            _ => self.sheet.normal.clone(),
        };
        let mut base = theme.run.clone();
        if Self::in_quote(containers) {
            base.color = self.sheet.quote.run.color;
        }

        let source_kind = match leaf.kind {
            BlockKind::Header(level) => SourceKind::Header(level),
            BlockKind::CodeBlock => SourceKind::CodeBlock,
            BlockKind::ListItem => SourceKind::ListItem,
            _ => {
                if Self::in_quote(containers) {
                    SourceKind::Quote
                } else {
                    SourceKind::Paragraph
                }
            }
        };

        let char_start = *cursor;
        let mut ctx = EmitCtx {
            cursor: char_start,
            runs: Vec::new(),
        };
        let mut hanging = Pt::ZERO;

        if leaf.kind == BlockKind::ListItem {
            if let Some(list) = containers
                .iter_mut()
                .rev()
                .find(|c| matches!(c.kind, BlockKind::OrderedList { .. } | BlockKind::UnorderedList))
            {
                let marker = match list.kind {
                    BlockKind::OrderedList { .. } => {
                        let text = format!("{}.", list.counter);
                        list.counter += 1;
                        text
                    }
                    _ => BULLET.to_string(),
                };
                let marker_style = self.sheet.list_marker.clone();
                let gap = marker_style.font_size / 2;
                let measured = self.engine.shape(
                    &ParagraphContent::new(vec![Run::text(marker.clone(), marker_style.clone())]),
                    &ShapeConstraints::measure(),
                );
                let width = measured.width + gap;
                ctx.runs.push(Run {
                    content: RunContent::Ghost(InlineObject::Marker {
                        text: marker,
                        width,
                    }),
                    style: marker_style,
                    link: None,
                });
                hanging = width;
            }
        }

        let mut source_start = None;
        let mut source_end = 0usize;
        for (idx, (line, offset)) in leaf.lines.iter().enumerate() {
            if idx > 0 {
                ctx.push_text("\n", base.clone(), None);
            }
            source_start.get_or_insert(*offset);
            source_end = offset + line.len();
            let line_char_start = ctx.cursor;
            if leaf.kind == BlockKind::CodeBlock {
                ctx.push_text(*line, base.clone(), None);
            } else {
                let root = parse_inline(line);
                self.emit_nodes(&root.children, line, &base, &mut ctx, acc, *offset);
            }
            if ctx.cursor > line_char_start {
                out.source_map.push(SourceSpan {
                    chars: CharRange::new(line_char_start, ctx.cursor),
                    bytes: *offset..offset + line.len(),
                });
            }
        }

        let content = ParagraphContent::new(ctx.runs);
        let mut element = Element::new(ElementKind::Paragraph(content), source_kind);
        element.block = theme.block.clone();
        element.block.margin.left += self.container_indent(containers);
        element.border = theme.border;
        element.border_sides = theme.border_sides;
        element.scroll_x = leaf.kind == BlockKind::CodeBlock;
        element.hanging_indent = hanging;
        element.char_start = char_start;
        element.source = source_start.unwrap_or(0)..source_end.max(source_start.unwrap_or(0));
        *cursor = char_start + element.char_count;
        out.elements.push(Arc::new(element));
    }

    fn finish_table<'a>(
        &self,
        state: TableState<'a>,
        containers: &[Container],
        cursor: &mut usize,
        out: &mut DocumentContent,
        acc: &mut Accum,
    ) {
        let table_start = *cursor;
        let columns = state.rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        let mut source_end = state.first_offset.unwrap_or(0);
        let mut rows = Vec::with_capacity(state.rows.len());
        let mut rel = 0usize;
        for row in &state.rows {
            let mut cells = Vec::with_capacity(columns);
            for col in 0..columns {
                let (text, offset, header) = row
                    .get(col)
                    .copied()
                    .unwrap_or(("", source_end, false));
                let text = text.trim();
                source_end = source_end.max(offset + text.len());
                let theme = if header {
                    &self.sheet.table_header
                } else {
                    &self.sheet.table_cell
                };
                let mut ctx = EmitCtx {
                    cursor: table_start + rel,
                    runs: Vec::new(),
                };
                let root = parse_inline(text);
                self.emit_nodes(&root.children, text, &theme.run, &mut ctx, acc, offset);
                if ctx.cursor > table_start + rel {
                    out.source_map.push(SourceSpan {
                        chars: CharRange::new(table_start + rel, ctx.cursor),
                        bytes: offset..offset + text.len(),
                    });
                }
                let char_count = ctx.cursor - (table_start + rel);
                let align = state
                    .aligns
                    .get(col)
                    .copied()
                    .flatten()
                    .unwrap_or(TextAlign::Left);
                let mut content = ParagraphContent::new(ctx.runs);
                content.align = align;
                content.last_line_align = align;
                cells.push(TableCell {
                    content,
                    align,
                    valign: VerticalAlign::Top,
                    header,
                    char_start: rel,
                    char_count,
                });
                rel += char_count;
            }
            rows.push(cells);
        }

        let table = Table { rows, columns };
        let mut element = Element::new(ElementKind::Table(table), SourceKind::Table);
        element.block = self.sheet.table.block.clone();
        element.block.margin.left += self.container_indent(containers);
        element.scroll_x = true;
        element.char_start = table_start;
        element.source = state.first_offset.unwrap_or(0)..source_end;
        *cursor = table_start + element.char_count;
        out.elements.push(Arc::new(element));
    }

    fn emit_nodes(
        &self,
        nodes: &[InlineNode],
        text: &str,
        style: &RunStyle,
        ctx: &mut EmitCtx,
        acc: &mut Accum,
        source_offset: usize,
    ) {
        for node in nodes {
            match node.syntax {
                InlineSyntax::RawText => {
                    ctx.push_text(&text[node.span.clone()], style.clone(), None);
                }
                InlineSyntax::Italic => {
                    let style = RunStyle {
                        italic: true,
                        ..style.clone()
                    };
                    self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
                }
                InlineSyntax::Bold => {
                    let style = RunStyle {
                        bold: true,
                        ..style.clone()
                    };
                    self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
                }
                InlineSyntax::BoldItalic => {
                    let style = RunStyle {
                        bold: true,
                        italic: true,
                        ..style.clone()
                    };
                    self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
                }
                InlineSyntax::Strikethrough => {
                    let style = RunStyle {
                        strikethrough: true,
                        ..style.clone()
                    };
                    self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
                }
                InlineSyntax::InlineCode => {
                    let style = RunStyle {
                        monospace: true,
                        color: self.sheet.inline_code.color,
                        ..style.clone()
                    };
                    self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
                }
                InlineSyntax::Escape => {
                    self.emit_nodes(&node.children, text, style, ctx, acc, source_offset);
                }
                InlineSyntax::HtmlEntity => {
                    if let NodeDetail::Entity { decoded } = &node.detail {
                        ctx.push_text(decoded.clone(), style.clone(), None);
                    }
                }
                InlineSyntax::LineBreak => {
                    ctx.push_text("\n", style.clone(), None);
                }
                InlineSyntax::Link => {
                    if let NodeDetail::Link { url } = &node.detail {
                        let link_index = acc.links.len();
                        acc.links.push(LinkInfo {
                            url: text[url.clone()].to_string(),
                            range: CharRange::new(ctx.cursor, ctx.cursor),
                        });
                        let style = RunStyle {
                            color: self.sheet.link.color,
                            underline: self.sheet.link.underline,
                            ..style.clone()
                        };
                        let start = ctx.cursor;
                        self.emit_link_children(
                            &node.children,
                            text,
                            &style,
                            ctx,
                            acc,
                            link_index,
                            source_offset,
                        );
                        acc.links[link_index].range = CharRange::new(start, ctx.cursor);
                    }
                }
                InlineSyntax::Image => {
                    self.emit_image(node, text, style, ctx, acc);
                }
                InlineSyntax::DoubleBrackets | InlineSyntax::DoubleBraces => {
                    ctx.push_text(&text[node.span.clone()], self.sheet.mark.clone(), None);
                }
                InlineSyntax::InlineHtml => {
                    self.emit_html(node, text, style, ctx, acc, source_offset);
                }
                InlineSyntax::Root => {
                    self.emit_nodes(&node.children, text, style, ctx, acc, source_offset);
                }
            }
        }
    }

    /// Like emit_nodes but tags every produced run with the link.
    fn emit_link_children(
        &self,
        nodes: &[InlineNode],
        text: &str,
        style: &RunStyle,
        ctx: &mut EmitCtx,
        acc: &mut Accum,
        link: usize,
        source_offset: usize,
    ) {
        let first_new = ctx.runs.len();
        self.emit_nodes(nodes, text, style, ctx, acc, source_offset);
        for run in &mut ctx.runs[first_new..] {
            run.link = Some(link);
        }
    }

    fn emit_image(
        &self,
        node: &InlineNode,
        text: &str,
        style: &RunStyle,
        ctx: &mut EmitCtx,
        acc: &mut Accum,
    ) {
        let NodeDetail::Image {
            url,
            alt,
            width,
            height,
            ..
        } = &node.detail
        else {
            return;
        };
        let url = text[url.clone()].to_string();
        let alt = text[alt.clone()].to_string();
        let size = match &self.loader {
            Some(loader) => loader.image_size(&url, *width, *height),
            None => (*width).zip(*height),
        };
        match size {
            Some((w, h)) => {
                acc.alt_subs.push(AltSubstitution {
                    range: CharRange::new(ctx.cursor, ctx.cursor + 1),
                    text: alt.clone(),
                });
                acc.images.push(ImageInfo {
                    url: url.clone(),
                    range: CharRange::new(ctx.cursor, ctx.cursor + 1),
                });
                ctx.cursor += 1;
                ctx.runs.push(Run {
                    content: RunContent::Object(InlineObject::Image {
                        url,
                        alt,
                        width: Pt::from_f32(w),
                        height: Pt::from_f32(h),
                    }),
                    style: style.clone(),
                    link: None,
                });
            }
            None => ctx.push_text(alt, style.clone(), None),
        }
    }

    fn emit_html(
        &self,
        node: &InlineNode,
        text: &str,
        style: &RunStyle,
        ctx: &mut EmitCtx,
        acc: &mut Accum,
        source_offset: usize,
    ) {
        let NodeDetail::Html {
            tag, attributes, ..
        } = &node.detail
        else {
            return;
        };
        let tag_text = text[tag.clone()].to_ascii_lowercase();
        match tag_text.as_str() {
            "br" => ctx.push_text("\n", style.clone(), None),
            "b" | "strong" => {
                let style = RunStyle {
                    bold: true,
                    ..style.clone()
                };
                self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
            }
            "i" | "em" => {
                let style = RunStyle {
                    italic: true,
                    ..style.clone()
                };
                self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
            }
            "del" | "s" | "strike" => {
                let style = RunStyle {
                    strikethrough: true,
                    ..style.clone()
                };
                self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
            }
            "u" | "ins" => {
                let style = RunStyle {
                    underline: true,
                    ..style.clone()
                };
                self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
            }
            "code" | "tt" => {
                let style = RunStyle {
                    monospace: true,
                    color: self.sheet.inline_code.color,
                    ..style.clone()
                };
                self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
            }
            "mark" => {
                let style = RunStyle {
                    color: self.sheet.mark.color,
                    ..style.clone()
                };
                self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
            }
            "span" => {
                let class = attributes.iter().find_map(|a| {
                    text[a.name.clone()]
                        .eq_ignore_ascii_case("class")
                        .then(|| a.value.clone())
                        .flatten()
                });
                let style = class
                    .and_then(|v| self.sheet.span_class(&text[v]).cloned())
                    .unwrap_or_else(|| style.clone());
                self.emit_nodes(&node.children, text, &style, ctx, acc, source_offset);
            }
            _ => {
                let attrs: Vec<(String, String)> = attributes
                    .iter()
                    .map(|a| {
                        (
                            text[a.name.clone()].to_string(),
                            a.value
                                .clone()
                                .map(|v| text[v].to_string())
                                .unwrap_or_default(),
                        )
                    })
                    .collect();
                let view = self
                    .loader
                    .as_ref()
                    .and_then(|l| l.view_for_tag(&tag_text, &attrs));
                match view {
                    Some(view) => {
                        acc.alt_subs.push(AltSubstitution {
                            range: CharRange::new(ctx.cursor, ctx.cursor + 1),
                            text: String::new(),
                        });
                        ctx.cursor += 1;
                        ctx.runs.push(Run {
                            content: RunContent::Object(InlineObject::View {
                                id: view.id,
                                width: Pt::from_f32(view.width),
                                height: Pt::from_f32(view.height),
                            }),
                            style: style.clone(),
                            link: None,
                        });
                    }
                    None => {
                        self.emit_nodes(&node.children, text, style, ctx, acc, source_offset)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockScanner, LineScanner};
    use crate::text_engine::MonospaceEngine;

    fn build(source: &str) -> DocumentContent {
        let builder = DocumentBuilder::new(StyleSheet::default(), Arc::new(MonospaceEngine));
        builder.build(&LineScanner.scan(source))
    }

    struct FixedLoader;

    impl ResourceLoader for FixedLoader {
        fn image_size(
            &self,
            _url: &str,
            width: Option<f32>,
            height: Option<f32>,
        ) -> Option<(f32, f32)> {
            Some((width.unwrap_or(100.0), height.unwrap_or(60.0)))
        }
    }

    fn paragraph(content: &DocumentContent, idx: usize) -> &ParagraphContent {
        match &content.elements[idx].kind {
            ElementKind::Paragraph(p) => p,
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn char_ranges_are_contiguous_across_elements() {
        let doc = build("first\n\nsecond block");
        assert_eq!(doc.elements.len(), 2);
        assert_eq!(doc.elements[0].char_range(), CharRange::new(0, 5));
        assert_eq!(doc.elements[1].char_start, 5);
        assert_eq!(doc.char_count, 5 + "second block".chars().count());
    }

    #[test]
    fn bold_splits_into_styled_runs() {
        let doc = build("a **b** c");
        let para = paragraph(&doc, 0);
        assert_eq!(para.runs.len(), 3);
        assert!(para.runs[1].style.bold);
        assert_eq!(para.char_count(), 5); // "a b c"
    }

    #[test]
    fn links_record_url_and_char_range() {
        let doc = build("see [here](https://e.example) now");
        assert_eq!(doc.links.len(), 1);
        assert_eq!(doc.links[0].url, "https://e.example");
        assert_eq!(doc.links[0].range, CharRange::new(4, 8));
        let para = paragraph(&doc, 0);
        let linked: Vec<_> = para.runs.iter().filter(|r| r.link.is_some()).collect();
        assert_eq!(linked.len(), 1);
        assert!(linked[0].style.underline);
    }

    #[test]
    fn image_without_size_info_degrades_to_alt_text() {
        let doc = build("![fallback](http://x.example/a.png)");
        assert!(doc.images.is_empty());
        let para = paragraph(&doc, 0);
        assert_eq!(para.content_string(), "fallback");
    }

    #[test]
    fn image_with_loader_becomes_an_object() {
        let builder = DocumentBuilder::new(StyleSheet::default(), Arc::new(MonospaceEngine))
            .with_loader(Arc::new(FixedLoader));
        let source = "x ![pic](u width=50)";
        let doc = builder.build(&LineScanner.scan(source));
        assert_eq!(doc.images.len(), 1);
        assert_eq!(doc.images[0].range, CharRange::new(2, 3));
        assert_eq!(doc.alt_substitutions[0].text, "pic");
        let para = paragraph(&doc, 0);
        assert!(matches!(
            para.runs[1].content,
            RunContent::Object(InlineObject::Image { .. })
        ));
    }

    #[test]
    fn list_items_get_ghost_markers_and_hanging_indent() {
        let doc = build("1. one\n2. two");
        assert_eq!(doc.elements.len(), 2);
        let para = paragraph(&doc, 0);
        let RunContent::Ghost(InlineObject::Marker { text, width }) = &para.runs[0].content
        else {
            panic!("expected marker ghost");
        };
        assert_eq!(text, "1.");
        assert!(*width > Pt::ZERO);
        assert_eq!(doc.elements[0].hanging_indent, *width);
        // ghost contributes no characters
        assert_eq!(doc.elements[0].char_count, 3);
    }

    #[test]
    fn quote_ranges_span_their_elements() {
        let doc = build("> a\n>\n> b\n\nafter");
        assert_eq!(doc.quote_ranges, vec![0..2]);
        assert_eq!(doc.elements[0].source_kind, SourceKind::Quote);
        assert!(doc.elements[0].block.margin.left > Pt::ZERO);
    }

    #[test]
    fn table_cell_offsets_are_relative_to_the_table() {
        let doc = build("| ab | c |\n| - | - |\n| d | ef |");
        let ElementKind::Table(table) = &doc.elements[0].kind else {
            panic!("expected table");
        };
        assert_eq!(table.columns, 2);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0].char_start, 0);
        assert_eq!(table.rows[0][1].char_start, 2);
        assert_eq!(table.rows[1][0].char_start, 3);
        assert!(table.rows[0][0].header);
        assert!(!table.rows[1][0].header);
        assert_eq!(doc.elements[0].char_count, 6);
    }

    #[test]
    fn source_map_is_monotonic_both_ways() {
        let doc = build("# h\n\npara one\npara two\n\n| a |\n| - |\n| b |");
        let mut last_char = 0;
        let mut last_byte = 0;
        for span in &doc.source_map {
            assert!(span.chars.start >= last_char);
            assert!(span.bytes.start >= last_byte);
            last_char = span.chars.start;
            last_byte = span.bytes.start;
        }
        assert!(!doc.source_map.is_empty());
    }

    #[test]
    fn code_blocks_skip_inline_parsing_and_scroll() {
        let doc = build("```\nlet x = a[0] * b;\n```");
        let el = &doc.elements[0];
        assert!(el.scroll_x);
        assert_eq!(el.source_kind, SourceKind::CodeBlock);
        let para = paragraph(&doc, 0);
        assert_eq!(para.content_string(), "let x = a[0] * b;");
        assert!(para.runs.iter().all(|r| r.style.monospace));
    }

    #[test]
    fn entity_and_br_render_into_text() {
        let doc = build("a&amp;b<br>c");
        let para = paragraph(&doc, 0);
        assert_eq!(para.content_string(), "a&b\nc");
    }
}
