//! Hit-testing and selection over a laid-out page: point to character
//! mapping, granularity expansion, selection rectangles and content
//! extraction. Every lookup is a binary search with nearest-neighbor
//! fallback, so a tap in a gap still resolves to something sensible.

use crate::builder::{AltSubstitution, DocumentContent};
use crate::element::{Element, ElementKind};
use crate::page::{Page, PageRegion, RegionKind, TableRegion};
use crate::text_engine::ShapedText;
use crate::types::{CharRange, Point, Pt, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Char,
    Word,
    Paragraph,
    Sentence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectMode {
    /// Full line-height rects, for selection highlights.
    Selection,
    /// Tight glyph-extent rects.
    CharBounding,
}

/// Coordinate space of returned rects for horizontally scrolled
/// regions. `Page` applies the current scroll offset; `Content` keeps
/// content coordinates and shifts the clip window instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordSpace {
    Page,
    Content,
}

/// Sentence terminators in priority order; the first pattern that
/// matches wins in both scan directions.
const SENTENCE_END_PATTERNS: &[&str] = &[
    "\u{3002}", "\u{FF1F}", "\n", "\r", "\u{FF01}", "\u{2026}\u{2026}", ". ", "? ", "! ", "; ",
    "\u{FF1B}",
];

fn vertical_gap(region: &PageRegion, y: Pt) -> Pt {
    if y < region.rect.top() {
        region.rect.top() - y
    } else if y >= region.rect.bottom() {
        y - region.rect.bottom()
    } else {
        Pt::ZERO
    }
}

/// Content region nearest to `y`. Non-content regions (rules) never
/// win; a `y` in a gap resolves to the closer neighbor, upper on ties.
fn closest_region(page: &Page, y: Pt) -> Option<usize> {
    let regions = &page.regions;
    let idx = regions.partition_point(|r| r.rect.top() <= y);
    let before = regions[..idx].iter().rposition(PageRegion::is_content);
    let after = regions[idx..]
        .iter()
        .position(PageRegion::is_content)
        .map(|p| p + idx);
    match (before, after) {
        (Some(b), Some(a)) => {
            if vertical_gap(&regions[b], y) <= vertical_gap(&regions[a], y) {
                Some(b)
            } else {
                Some(a)
            }
        }
        (Some(b), None) => Some(b),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

fn scroll_offset(region: &PageRegion) -> Pt {
    region.scroll.as_ref().map_or(Pt::ZERO, |s| s.offset_pt())
}

fn hit_shaped(shaped: &ShapedText, origin: Point, offset: Pt, point: Point) -> Option<usize> {
    let line = shaped.line_index_for_y(point.y - origin.y)?;
    Some(shaped.char_index_for_x(line, point.x - origin.x - offset))
}

/// Row and column of the table cell nearest to `point` (content
/// coordinates for x).
fn table_cell_at(table: &TableRegion, x: Pt, y: Pt) -> Option<(usize, usize)> {
    if table.cells.is_empty() {
        return None;
    }
    let r = table
        .cells
        .partition_point(|row| row.first().is_some_and(|c| c.rect.top() <= y))
        .saturating_sub(1)
        .min(table.cells.len() - 1);
    let row = &table.cells[r];
    if row.is_empty() {
        return None;
    }
    let c = row
        .partition_point(|cell| cell.rect.left() <= x)
        .saturating_sub(1)
        .min(row.len() - 1);
    Some((r, c))
}

fn hit_region(region: &PageRegion, point: Point) -> Option<usize> {
    match &region.kind {
        RegionKind::Paragraph(shaped) => {
            let local = hit_shaped(shaped, region.content_origin, scroll_offset(region), point)?;
            Some(region.element.char_start + local)
        }
        RegionKind::Table(table) => {
            let offset = scroll_offset(region);
            let (r, c) = table_cell_at(table, point.x - offset, point.y)?;
            let cell = &table.cells[r][c];
            let local = hit_shaped(&cell.shaped, cell.content_origin, offset, point)?;
            let ElementKind::Table(model) = &region.element.kind else {
                return None;
            };
            let info = model.rows.get(r)?.get(c)?;
            Some(region.element.char_start + info.char_start + local.min(info.char_count))
        }
        RegionKind::Rule => None,
    }
}

/// Character index nearest to `point`, or None on an empty page.
pub fn char_index_at_point(page: &Page, point: Point) -> Option<usize> {
    let region = &page.regions[closest_region(page, point.y)?];
    hit_region(region, point)
}

/// Character range at `point`, expanded to the requested granularity
/// and clamped to the characters actually placed on the page.
pub fn char_range_at_point(
    page: &Page,
    point: Point,
    granularity: Granularity,
) -> Option<CharRange> {
    let region = &page.regions[closest_region(page, point.y)?];
    let placed = region.char_range();
    if placed.is_empty() {
        return None;
    }
    match granularity {
        Granularity::Char | Granularity::Word => {
            let index = hit_region(region, point)?;
            let index = index.clamp(placed.start, placed.end - 1);
            Some(CharRange::new(index, index + 1))
        }
        Granularity::Paragraph => match &region.kind {
            RegionKind::Paragraph(_) => Some(placed),
            RegionKind::Table(table) => {
                let offset = scroll_offset(region);
                let (r, c) = table_cell_at(table, point.x - offset, point.y)?;
                let ElementKind::Table(model) = &region.element.kind else {
                    return None;
                };
                let info = model.rows.get(r)?.get(c)?;
                let start = region.element.char_start + info.char_start;
                Some(CharRange::new(start, start + info.char_count))
            }
            RegionKind::Rule => None,
        },
        Granularity::Sentence => {
            let index = hit_region(region, point)?.clamp(placed.start, placed.end - 1);
            let (text, base) = container_text(region, index)?;
            let chars: Vec<char> = text.chars().collect();
            let local = sentence_of_char(&chars, index.saturating_sub(base));
            let range = CharRange::new(base + local.start, base + local.end);
            let clamped = CharRange::new(
                range.start.max(placed.start),
                range.end.min(placed.end),
            );
            (!clamped.is_empty()).then_some(clamped)
        }
    }
}

/// Flattened text of the paragraph or table cell containing `index`,
/// with the absolute char offset of its first character.
fn container_text(region: &PageRegion, index: usize) -> Option<(String, usize)> {
    match &region.element.kind {
        ElementKind::Paragraph(p) => Some((p.content_string(), region.element.char_start)),
        ElementKind::Table(model) => {
            let local = index.saturating_sub(region.element.char_start);
            for row in &model.rows {
                for cell in row {
                    if local >= cell.char_start && local < cell.char_start + cell.char_count {
                        return Some((
                            cell.content.content_string(),
                            region.element.char_start + cell.char_start,
                        ));
                    }
                }
            }
            None
        }
        ElementKind::Rule => None,
    }
}

/// Sentence containing character `index`, in char indices. A probe
/// sitting exactly on a boundary belongs to the sentence on the left:
/// the terminator search forward accepts a match ending at the probe,
/// the backward search requires one ending strictly before it.
pub(crate) fn sentence_of_char(chars: &[char], index: usize) -> CharRange {
    if chars.is_empty() {
        return CharRange::new(0, 0);
    }
    let index = index.min(chars.len());

    let mut start = 0;
    for pattern in SENTENCE_END_PATTERNS {
        let pat: Vec<char> = pattern.chars().collect();
        if let Some(end) = rfind_pattern_end(chars, &pat, index) {
            start = end;
            break;
        }
    }
    let mut end = chars.len();
    for pattern in SENTENCE_END_PATTERNS {
        let pat: Vec<char> = pattern.chars().collect();
        if let Some(e) = find_pattern_end(chars, &pat, index) {
            end = e;
            break;
        }
    }
    CharRange::new(start, end.max(start))
}

/// Largest match end strictly before `limit`.
fn rfind_pattern_end(chars: &[char], pat: &[char], limit: usize) -> Option<usize> {
    let m = pat.len();
    if m == 0 || limit < m + 1 {
        return None;
    }
    let mut end = limit - 1;
    while end >= m {
        if &chars[end - m..end] == pat {
            return Some(end);
        }
        end -= 1;
    }
    None
}

/// Smallest match end at or after `from`.
fn find_pattern_end(chars: &[char], pat: &[char], from: usize) -> Option<usize> {
    let m = pat.len();
    if m == 0 {
        return None;
    }
    let mut end = from.max(m);
    while end <= chars.len() {
        if &chars[end - m..end] == pat {
            return Some(end);
        }
        end += 1;
    }
    None
}

fn rects_in_shaped(
    region: &PageRegion,
    shaped: &ShapedText,
    origin: Point,
    base: usize,
    range: CharRange,
    mode: RectMode,
    space: CoordSpace,
    out: &mut Vec<Rect>,
) {
    let local_start = range.start.saturating_sub(base);
    let local_end = range.end.saturating_sub(base);
    if local_end == 0 {
        return;
    }
    let (shift, clip) = match &region.scroll {
        Some(scroll) => {
            let offset = scroll.offset_pt();
            match space {
                CoordSpace::Page => (offset, Some(scroll.viewport)),
                CoordSpace::Content => (
                    Pt::ZERO,
                    Some(scroll.viewport.translate(Point::new(-offset, Pt::ZERO))),
                ),
            }
        }
        None => (Pt::ZERO, None),
    };
    for (index, line) in shaped.lines.iter().enumerate() {
        let Some((x0, x1)) = shaped.x_extent_on_line(index, local_start, local_end) else {
            continue;
        };
        let (top, bottom) = match mode {
            RectMode::Selection => (line.top, line.bottom),
            RectMode::CharBounding => (line.baseline - line.ascent, line.baseline + line.descent),
        };
        let mut rect = Rect::from_ltrb(
            origin.x + x0 + shift,
            origin.y + top,
            origin.x + x1 + shift,
            origin.y + bottom,
        );
        if let Some(clip) = &clip {
            rect = rect.intersect(clip);
        }
        if !rect.is_empty() {
            out.push(rect);
        }
    }
}

/// Per-line rectangles covering `range`, clipped to scroll viewports.
pub fn rects_for_char_range(
    page: &Page,
    range: CharRange,
    mode: RectMode,
    space: CoordSpace,
) -> Vec<Rect> {
    let mut out = Vec::new();
    if range.is_empty() {
        return out;
    }
    for region in &page.regions {
        let placed = region.char_range();
        if placed.is_empty() || range.end <= placed.start || range.start >= placed.end {
            continue;
        }
        match &region.kind {
            RegionKind::Paragraph(shaped) => rects_in_shaped(
                region,
                shaped,
                region.content_origin,
                region.element.char_start,
                range,
                mode,
                space,
                &mut out,
            ),
            RegionKind::Table(table) => {
                let ElementKind::Table(model) = &region.element.kind else {
                    continue;
                };
                for (r, row) in table.cells.iter().enumerate() {
                    for (c, cell) in row.iter().enumerate() {
                        let Some(info) = model.rows.get(r).and_then(|row| row.get(c)) else {
                            continue;
                        };
                        let base = region.element.char_start + info.char_start;
                        if range.end <= base || range.start >= base + info.char_count {
                            continue;
                        }
                        rects_in_shaped(
                            region,
                            &cell.shaped,
                            cell.content_origin,
                            base,
                            range,
                            mode,
                            space,
                            &mut out,
                        );
                    }
                }
            }
            RegionKind::Rule => {}
        }
    }
    out
}

pub fn bounding_rect_for_char_range(
    page: &Page,
    range: CharRange,
    mode: RectMode,
    space: CoordSpace,
) -> Option<Rect> {
    let rects = rects_for_char_range(page, range, mode, space);
    let mut iter = rects.into_iter();
    let first = iter.next()?;
    Some(iter.fold(first, |acc, r| acc.union(&r)))
}

fn extract_slice(
    text: &str,
    base: usize,
    range: CharRange,
    subs: &[AltSubstitution],
) -> String {
    let mut out = String::new();
    for (i, ch) in text.chars().enumerate() {
        let abs = base + i;
        if !range.contains(abs) {
            continue;
        }
        match subs.iter().find(|s| s.range.start == abs) {
            Some(sub) => out.push_str(&sub.text),
            None => out.push(ch),
        }
    }
    out
}

/// Plain-text extraction over `range`, limited to the characters the
/// page actually placed: inline objects render as their alt text,
/// paragraphs separate with newlines, table cells in a row with
/// single spaces.
pub fn content_in_char_range(page: &Page, content: &DocumentContent, range: CharRange) -> String {
    let mut segments: Vec<String> = Vec::new();
    for region in &page.regions {
        let placed = region.char_range();
        if placed.is_empty() || placed.end <= range.start || placed.start >= range.end {
            continue;
        }
        let clipped = CharRange::new(range.start, range.end.min(placed.end));
        element_segments(
            &region.element,
            clipped,
            &content.alt_substitutions,
            &mut segments,
        );
    }
    segments.join("\n")
}

/// Extraction straight off the element list, for documents that have
/// not been laid out yet.
pub(crate) fn content_from_elements(content: &DocumentContent, range: CharRange) -> String {
    let mut segments: Vec<String> = Vec::new();
    for element in &content.elements {
        let er = element.char_range();
        if er.is_empty() || er.end <= range.start || er.start >= range.end {
            continue;
        }
        element_segments(element, range, &content.alt_substitutions, &mut segments);
    }
    segments.join("\n")
}

fn element_segments(
    element: &Element,
    range: CharRange,
    subs: &[AltSubstitution],
    segments: &mut Vec<String>,
) {
    match &element.kind {
        ElementKind::Paragraph(p) => {
            segments.push(extract_slice(
                &p.content_string(),
                element.char_start,
                range,
                subs,
            ));
        }
        ElementKind::Table(table) => {
            for row in &table.rows {
                let mut cells = Vec::new();
                for cell in row {
                    let base = element.char_start + cell.char_start;
                    if range.end <= base || range.start >= base + cell.char_count {
                        continue;
                    }
                    cells.push(extract_slice(
                        &cell.content.content_string(),
                        base,
                        range,
                        subs,
                    ));
                }
                if !cells.is_empty() {
                    segments.push(cells.join(" "));
                }
            }
        }
        ElementKind::Rule => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockScanner, LineScanner};
    use crate::builder::DocumentBuilder;
    use crate::layout::{LayoutEngine, LayoutOptions};
    use crate::style::StyleSheet;
    use crate::text_engine::MonospaceEngine;
    use std::sync::Arc;

    fn page_for(source: &str, width: i32) -> (DocumentContent, Page) {
        let engine = Arc::new(MonospaceEngine);
        let sheet = StyleSheet::default();
        let builder = DocumentBuilder::new(sheet.clone(), engine.clone());
        let content = builder.build(&LineScanner.scan(source));
        let layout = LayoutEngine::new(engine, sheet);
        let page = layout.layout(&content, &LayoutOptions::new(Pt::from_i32(width)));
        (content, page)
    }

    #[test]
    fn point_and_char_round_trip() {
        let (content, page) = page_for("hello world\n\nsecond paragraph here", 2000);
        for index in [0, 4, 8, 11, 15, 25] {
            let rects = rects_for_char_range(
                &page,
                CharRange::new(index, index + 1),
                RectMode::CharBounding,
                CoordSpace::Page,
            );
            assert_eq!(rects.len(), 1, "char {index}");
            let hit = char_index_at_point(&page, rects[0].center()).unwrap();
            assert_eq!(hit, index, "char {index}");
        }
        assert_eq!(page.char_count(), content.char_count);
    }

    #[test]
    fn taps_in_gaps_resolve_to_the_nearer_region() {
        let (_, page) = page_for("aaa\n\n---\n\nbbb", 2000);
        // three regions: paragraph, rule, paragraph
        assert_eq!(page.regions.len(), 3);
        let gap_y = page.regions[0].rect.bottom() + Pt::from_f32(0.5);
        let hit = char_index_at_point(&page, Point::new(Pt::from_i32(5), gap_y)).unwrap();
        assert!(hit < 3, "near top paragraph, got {hit}");
        let below = page.regions[2].rect.bottom() + Pt::from_i32(500);
        let hit = char_index_at_point(&page, Point::new(Pt::from_i32(5), below)).unwrap();
        assert!(hit >= 3, "clamped into bottom paragraph, got {hit}");
    }

    #[test]
    fn word_range_is_one_character() {
        let (_, page) = page_for("abc", 2000);
        let rects = rects_for_char_range(
            &page,
            CharRange::new(1, 2),
            RectMode::CharBounding,
            CoordSpace::Page,
        );
        let range =
            char_range_at_point(&page, rects[0].center(), Granularity::Word).unwrap();
        assert_eq!(range, CharRange::new(1, 2));
    }

    #[test]
    fn paragraph_granularity_covers_the_element() {
        let (_, page) = page_for("first\n\nsecond one", 2000);
        let rects = rects_for_char_range(
            &page,
            CharRange::new(7, 8),
            RectMode::CharBounding,
            CoordSpace::Page,
        );
        let range =
            char_range_at_point(&page, rects[0].center(), Granularity::Paragraph).unwrap();
        assert_eq!(range, CharRange::new(5, 15));
    }

    #[test]
    fn paragraph_granularity_in_a_table_is_the_cell() {
        let (_, page) = page_for("| ab | cd |\n| - | - |\n| ef | gh |", 2000);
        // chars: ab=0..2 cd=2..4 ef=4..6 gh=6..8
        let rects = rects_for_char_range(
            &page,
            CharRange::new(5, 6),
            RectMode::CharBounding,
            CoordSpace::Page,
        );
        let range =
            char_range_at_point(&page, rects[0].center(), Granularity::Paragraph).unwrap();
        assert_eq!(range, CharRange::new(4, 6));
    }

    #[test]
    fn sentence_boundaries_prefer_the_left_side() {
        let chars: Vec<char> = "One. Two.".chars().collect();
        // probe exactly on the boundary: the first char after ". "
        assert_eq!(sentence_of_char(&chars, 5), CharRange::new(0, 5));
        // one past the boundary belongs to the right sentence
        assert_eq!(sentence_of_char(&chars, 6), CharRange::new(5, 9));
        // probe on the terminator itself stays in its own sentence
        assert_eq!(sentence_of_char(&chars, 3), CharRange::new(0, 5));
    }

    #[test]
    fn sentence_handles_cjk_terminators() {
        let chars: Vec<char> = "\u{4E00}\u{3002}\u{4E8C}\u{4E09}".chars().collect();
        assert_eq!(sentence_of_char(&chars, 0), CharRange::new(0, 2));
        assert_eq!(sentence_of_char(&chars, 3), CharRange::new(2, 4));
    }

    #[test]
    fn selection_rects_span_full_line_height() {
        let (_, page) = page_for("abc", 2000);
        let tall = rects_for_char_range(
            &page,
            CharRange::new(0, 3),
            RectMode::Selection,
            CoordSpace::Page,
        );
        let tight = rects_for_char_range(
            &page,
            CharRange::new(0, 3),
            RectMode::CharBounding,
            CoordSpace::Page,
        );
        assert_eq!(tall.len(), 1);
        assert_eq!(tight.len(), 1);
        assert!(tall[0].height > tight[0].height);
        assert_eq!(tall[0].width, tight[0].width);
    }

    #[test]
    fn scrolled_region_rects_clip_to_the_viewport() {
        let (_, page) = page_for("```\n0123456789abcdefghij\n```", 120);
        let region = &page.regions[0];
        let scroll = region.scroll.as_ref().expect("code block scrolls");
        scroll.scroll_by(Pt::from_i32(-100));

        let range = CharRange::new(0, 20);
        let page_rects =
            rects_for_char_range(&page, range, RectMode::Selection, CoordSpace::Page);
        assert_eq!(page_rects.len(), 1);
        assert!(page_rects[0].width <= scroll.viewport.width);
        assert!(page_rects[0].left() >= scroll.viewport.left());

        let content_rects =
            rects_for_char_range(&page, range, RectMode::Selection, CoordSpace::Content);
        assert_eq!(content_rects.len(), 1);
        // content space: the clip window moved instead of the rect
        assert!(content_rects[0].left() > page_rects[0].left());
    }

    #[test]
    fn extraction_substitutes_alt_text_and_separators() {
        let source = "before\n\n| a | b |\n| - | - |\n| c | d |";
        let (content, page) = page_for(source, 2000);
        let text = content_in_char_range(&page, &content, CharRange::new(0, content.char_count));
        assert_eq!(text, "before\na b\nc d");

        let partial = content_in_char_range(&page, &content, CharRange::new(3, 8));
        assert_eq!(partial, "ore\na b");
    }

    #[test]
    fn extraction_stops_at_the_page_cut() {
        let source = "first\n\nsecond";
        let engine = Arc::new(MonospaceEngine);
        let sheet = StyleSheet::default();
        let builder = DocumentBuilder::new(sheet.clone(), engine.clone());
        let content = builder.build(&LineScanner.scan(source));
        let layout = LayoutEngine::new(engine, sheet);
        let options = LayoutOptions {
            max_height: Pt::from_i32(30),
            ..LayoutOptions::new(Pt::from_i32(2000))
        };
        let page = layout.layout(&content, &options);
        assert!(page.full);
        assert_eq!(page.regions.len(), 1);
        let text = content_in_char_range(&page, &content, CharRange::new(0, content.char_count));
        assert_eq!(text, "first");
    }

    #[test]
    fn extraction_uses_image_alt_strings() {
        use crate::builder::{DocumentBuilder, ResourceLoader};
        struct Loader;
        impl ResourceLoader for Loader {
            fn image_size(
                &self,
                _url: &str,
                _w: Option<f32>,
                _h: Option<f32>,
            ) -> Option<(f32, f32)> {
                Some((40.0, 40.0))
            }
        }
        let source = "x ![the alt](u) y";
        let engine = Arc::new(MonospaceEngine);
        let builder = DocumentBuilder::new(StyleSheet::default(), engine).with_loader(Arc::new(Loader));
        let content = builder.build(&LineScanner.scan(source));
        let text = content_from_elements(&content, CharRange::new(0, content.char_count));
        assert_eq!(text, "x the alt y");
    }
}
