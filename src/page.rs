//! Immutable layout output. A [`Page`] is published atomically and
//! never mutated afterwards, with one exception: horizontal scroll
//! offsets of over-wide regions live in `AtomicI64` cells (milli-point
//! units) so touch handling can move them without relayout.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::element::{Element, ElementKind};
use crate::style::{BorderSides, BorderStyle};
use crate::text_engine::ShapedText;
use crate::types::{CharRange, Point, Pt, Rect};

#[derive(Debug, Clone, PartialEq)]
pub struct RegionBorder {
    pub rect: Rect,
    pub style: BorderStyle,
    pub sides: BorderSides,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRegionCell {
    pub shaped: ShapedText,
    /// Cell border rect in page coordinates.
    pub rect: Rect,
    /// Page-coordinate origin of the cell's shaped text.
    pub content_origin: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRegion {
    /// Row-major, same shape as the element's table.
    pub cells: Vec<Vec<TableRegionCell>>,
    pub width: Pt,
    pub height: Pt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegionKind {
    Paragraph(ShapedText),
    Table(TableRegion),
    Rule,
}

/// Horizontal scroll window for a region wider than the page.
#[derive(Debug)]
pub struct ScrollInfo {
    pub viewport: Rect,
    pub content_width: Pt,
    /// Current offset in milli-points; zero or negative.
    pub offset: AtomicI64,
}

impl ScrollInfo {
    pub fn new(viewport: Rect, content_width: Pt) -> Self {
        Self {
            viewport,
            content_width,
            offset: AtomicI64::new(0),
        }
    }

    pub fn offset_pt(&self) -> Pt {
        Pt::from_milli_i64(self.offset.load(Ordering::Acquire))
    }

    /// Lowest allowed offset: content right edge flush with the
    /// viewport's right edge.
    pub fn min_offset(&self) -> Pt {
        (self.viewport.width - self.content_width).min(Pt::ZERO)
    }

    pub fn scroll_by(&self, delta: Pt) -> Pt {
        let current = self.offset_pt();
        let next = (current + delta).max(self.min_offset()).min(Pt::ZERO);
        self.offset.store(next.to_milli_i64(), Ordering::Release);
        next
    }

    pub fn can_scroll(&self) -> bool {
        self.content_width > self.viewport.width
    }
}

impl Clone for ScrollInfo {
    fn clone(&self) -> Self {
        Self {
            viewport: self.viewport,
            content_width: self.content_width,
            offset: AtomicI64::new(self.offset.load(Ordering::Acquire)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageRegion {
    pub element: Arc<Element>,
    /// Border box of the region, page coordinates.
    pub rect: Rect,
    /// Origin of the region's shaped content.
    pub content_origin: Point,
    pub border: Option<RegionBorder>,
    pub kind: RegionKind,
    pub scroll: Option<ScrollInfo>,
}

impl PageRegion {
    pub fn is_content(&self) -> bool {
        !matches!(self.kind, RegionKind::Rule)
    }

    /// Character range actually placed in this region; truncation can
    /// make it shorter than the element's range.
    pub fn char_range(&self) -> CharRange {
        let start = self.element.char_start;
        match &self.kind {
            RegionKind::Paragraph(shaped) => CharRange::new(start, start + shaped.char_count()),
            RegionKind::Table(table) => {
                // only rows kept on the page count as placed
                let end = match &self.element.kind {
                    ElementKind::Table(model) => model.rows
                        [..table.cells.len().min(model.rows.len())]
                        .iter()
                        .flatten()
                        .map(|c| c.char_start + c.char_count)
                        .max()
                        .unwrap_or(0),
                    _ => self.element.char_count,
                };
                CharRange::new(start, start + end)
            }
            RegionKind::Rule => CharRange::new(start, start),
        }
    }

    pub fn line_count(&self) -> usize {
        match &self.kind {
            RegionKind::Paragraph(shaped) => shaped.lines.len(),
            RegionKind::Table(table) => table
                .cells
                .iter()
                .flatten()
                .map(|c| c.shaped.lines.len())
                .sum(),
            RegionKind::Rule => 0,
        }
    }
}

/// Scroll offsets keyed by element char range, so a relayout of the
/// same document can restore the user's horizontal positions.
#[derive(Debug, Clone, Default)]
pub struct ScrollState {
    offsets: Vec<(CharRange, i64)>,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub regions: Vec<PageRegion>,
    /// Spanning left borders for quote runs.
    pub quote_rules: Vec<RegionBorder>,
    /// Width the layout was asked for.
    pub layout_width: Pt,
    /// Height budget the layout was asked for.
    pub layout_height: Pt,
    /// Final page extent; can exceed `layout_width` after a forced
    /// ellipsis widened the last line.
    pub width: Pt,
    pub height: Pt,
    pub line_count: usize,
    /// True when the height budget cut the document off.
    pub full: bool,
}

impl Page {
    pub fn empty(layout_width: Pt, layout_height: Pt) -> Self {
        Self {
            regions: Vec::new(),
            quote_rules: Vec::new(),
            layout_width,
            layout_height,
            width: Pt::ZERO,
            height: Pt::ZERO,
            line_count: 0,
            full: false,
        }
    }

    /// Count of characters placed on the page, from the last region
    /// that carries content.
    pub fn char_count(&self) -> usize {
        self.regions
            .iter()
            .rev()
            .find(|r| r.is_content())
            .map_or(0, |r| r.char_range().end)
    }

    pub fn capture_scroll(&self) -> ScrollState {
        let mut offsets = Vec::new();
        for region in &self.regions {
            if let Some(scroll) = &region.scroll {
                let value = scroll.offset.load(Ordering::Acquire);
                if value != 0 {
                    offsets.push((region.char_range(), value));
                }
            }
        }
        ScrollState { offsets }
    }

    pub fn apply_scroll(&self, state: &ScrollState) {
        for region in &self.regions {
            let Some(scroll) = &region.scroll else {
                continue;
            };
            let range = region.char_range();
            if let Some((_, value)) = state.offsets.iter().find(|(r, _)| r.start == range.start) {
                let clamped = Pt::from_milli_i64(*value)
                    .max(scroll.min_offset())
                    .min(Pt::ZERO);
                scroll.offset.store(clamped.to_milli_i64(), Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementKind, SourceKind};
    use crate::text_engine::{MonospaceEngine, ParagraphContent, Run, ShapeConstraints, TextEngine};

    fn region(text: &str, char_start: usize, scroll: Option<ScrollInfo>) -> PageRegion {
        let content = ParagraphContent::new(vec![Run::text(text, Default::default())]);
        let shaped = MonospaceEngine.shape(&content, &ShapeConstraints::definite(Pt::MAX));
        let mut element = crate::element::Element::new(
            ElementKind::Paragraph(content),
            SourceKind::Paragraph,
        );
        element.char_start = char_start;
        PageRegion {
            element: Arc::new(element),
            rect: Rect::default(),
            content_origin: Point::default(),
            border: None,
            kind: RegionKind::Paragraph(shaped),
            scroll,
        }
    }

    #[test]
    fn scroll_clamps_to_content_extent() {
        let info = ScrollInfo::new(
            Rect::from_ltwh(Pt::ZERO, Pt::ZERO, Pt::from_i32(100), Pt::from_i32(20)),
            Pt::from_i32(250),
        );
        assert!(info.can_scroll());
        assert_eq!(info.scroll_by(Pt::from_i32(-500)), Pt::from_i32(-150));
        assert_eq!(info.scroll_by(Pt::from_i32(9999)), Pt::ZERO);
    }

    #[test]
    fn scroll_state_survives_relayout() {
        let scroll = ScrollInfo::new(
            Rect::from_ltwh(Pt::ZERO, Pt::ZERO, Pt::from_i32(50), Pt::from_i32(20)),
            Pt::from_i32(200),
        );
        scroll.scroll_by(Pt::from_i32(-60));
        let mut page = Page::empty(Pt::from_i32(50), Pt::MAX);
        page.regions.push(region("wide content", 0, Some(scroll)));
        let state = page.capture_scroll();

        let next = ScrollInfo::new(
            Rect::from_ltwh(Pt::ZERO, Pt::ZERO, Pt::from_i32(50), Pt::from_i32(20)),
            Pt::from_i32(200),
        );
        let mut relaid = Page::empty(Pt::from_i32(50), Pt::MAX);
        relaid.regions.push(region("wide content", 0, Some(next)));
        relaid.apply_scroll(&state);
        assert_eq!(
            relaid.regions[0].scroll.as_ref().unwrap().offset_pt(),
            Pt::from_i32(-60)
        );
    }

    #[test]
    fn page_char_count_reads_the_last_content_region() {
        let mut page = Page::empty(Pt::MAX, Pt::MAX);
        page.regions.push(region("abc", 0, None));
        page.regions.push(region("defg", 3, None));
        assert_eq!(page.char_count(), 7);
    }
}
