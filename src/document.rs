//! A parsed document plus its currently published page. The page slot
//! is the only shared mutable state: relayout produces a fresh
//! immutable `Page` and swaps the `Arc` under one mutex, and after the
//! swap the only thing anyone writes is the atomic scroll offset
//! inside a region.

use std::sync::{Arc, Mutex};

use crate::builder::DocumentContent;
use crate::page::{Page, ScrollState};
use crate::selection::{
    self, CoordSpace, Granularity, RectMode,
};
use crate::types::{CharRange, Point, Pt, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Down,
    Move,
    Up,
}

/// Active horizontal drag over one scrollable region, keyed by the
/// region's first character so it survives a page swap mid-drag.
#[derive(Debug, Clone, Copy)]
struct DragState {
    char_start: usize,
    last_x: Pt,
}

#[derive(Debug)]
pub struct Document {
    source: String,
    content: DocumentContent,
    page: Mutex<Option<Arc<Page>>>,
    drag: Mutex<Option<DragState>>,
}

impl Document {
    pub fn new(source: String, content: DocumentContent) -> Self {
        Self {
            source,
            content,
            page: Mutex::new(None),
            drag: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn content(&self) -> &DocumentContent {
        &self.content
    }

    pub fn char_count(&self) -> usize {
        self.content.char_count
    }

    /// Swaps in a freshly laid-out page, carrying scroll offsets over
    /// from the outgoing page where the regions still match.
    pub fn publish(&self, page: Page) -> Arc<Page> {
        let page = Arc::new(page);
        let mut slot = self.page.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = slot.as_ref() {
            page.apply_scroll(&old.capture_scroll());
        }
        *slot = Some(page.clone());
        page
    }

    pub fn page(&self) -> Option<Arc<Page>> {
        self.page.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn capture_scroll(&self) -> ScrollState {
        self.page().map(|p| p.capture_scroll()).unwrap_or_default()
    }

    pub fn char_index_at_point(&self, point: Point) -> Option<usize> {
        let page = self.page()?;
        selection::char_index_at_point(page.as_ref(), point)
    }

    pub fn char_range_at_point(
        &self,
        point: Point,
        granularity: Granularity,
    ) -> Option<CharRange> {
        let page = self.page()?;
        selection::char_range_at_point(page.as_ref(), point, granularity)
    }

    pub fn rects_for_char_range(
        &self,
        range: CharRange,
        mode: RectMode,
        space: CoordSpace,
    ) -> Vec<Rect> {
        match self.page() {
            Some(page) => selection::rects_for_char_range(&page, range, mode, space),
            None => Vec::new(),
        }
    }

    pub fn bounding_rect_for_char_range(
        &self,
        range: CharRange,
        mode: RectMode,
        space: CoordSpace,
    ) -> Option<Rect> {
        let page = self.page()?;
        selection::bounding_rect_for_char_range(page.as_ref(), range, mode, space)
    }

    /// URL of the link whose text lies under `point`, if any.
    pub fn link_at_point(&self, point: Point) -> Option<&str> {
        let index = self.char_index_at_point(point)?;
        self.content
            .links
            .iter()
            .find(|l| l.range.contains(index))
            .map(|l| l.url.as_str())
    }

    pub fn image_at_point(&self, point: Point) -> Option<&str> {
        let index = self.char_index_at_point(point)?;
        self.content
            .images
            .iter()
            .find(|i| i.range.contains(index))
            .map(|i| i.url.as_str())
    }

    pub fn can_scroll_at_point(&self, point: Point) -> bool {
        let Some(page) = self.page() else {
            return false;
        };
        page.regions.iter().any(|region| {
            region.rect.contains(point)
                && region.scroll.as_ref().is_some_and(|s| s.can_scroll())
        })
    }

    /// Routes a horizontal drag into the scrollable region under the
    /// touch. Returns true while the gesture is consumed.
    pub fn on_touch_event(&self, phase: TouchPhase, point: Point) -> bool {
        let mut drag = self.drag.lock().unwrap_or_else(|e| e.into_inner());
        match phase {
            TouchPhase::Down => {
                let Some(page) = self.page() else {
                    return false;
                };
                let hit = page.regions.iter().find(|region| {
                    region.rect.contains(point)
                        && region.scroll.as_ref().is_some_and(|s| s.can_scroll())
                });
                match hit {
                    Some(region) => {
                        *drag = Some(DragState {
                            char_start: region.element.char_start,
                            last_x: point.x,
                        });
                        true
                    }
                    None => false,
                }
            }
            TouchPhase::Move => {
                let Some(state) = drag.as_mut() else {
                    return false;
                };
                let delta = point.x - state.last_x;
                state.last_x = point.x;
                if let Some(page) = self.page() {
                    let scroll = page
                        .regions
                        .iter()
                        .find(|r| r.element.char_start == state.char_start)
                        .and_then(|r| r.scroll.as_ref());
                    if let Some(scroll) = scroll {
                        scroll.scroll_by(delta);
                    }
                }
                true
            }
            TouchPhase::Up => drag.take().is_some(),
        }
    }

    /// Plain-text rendering of the whole document. With a page
    /// published, only the characters the page placed come back.
    pub fn text(&self) -> String {
        self.text_in_range(CharRange::new(0, self.content.char_count))
    }

    pub fn text_in_range(&self, range: CharRange) -> String {
        match self.page() {
            Some(page) => selection::content_in_char_range(page.as_ref(), &self.content, range),
            None => selection::content_from_elements(&self.content, range),
        }
    }

    /// Source byte offset for a rendered character. Resolution is the
    /// source line: positions inside inline markup clamp to the end of
    /// the line's mapped bytes.
    pub fn byte_for_char(&self, index: usize) -> Option<usize> {
        let map = &self.content.source_map;
        let i = map.partition_point(|s| s.chars.end <= index);
        let span = map.get(i)?;
        if index < span.chars.start {
            return Some(span.bytes.start);
        }
        let slice = self.source.get(span.bytes.clone())?;
        let mut byte = span.bytes.start;
        let mut remaining = index - span.chars.start;
        for ch in slice.chars() {
            if remaining == 0 {
                break;
            }
            byte += ch.len_utf8();
            remaining -= 1;
        }
        Some(byte.min(span.bytes.end))
    }

    /// Rendered character index for a source byte offset.
    pub fn char_for_byte(&self, byte: usize) -> Option<usize> {
        let map = &self.content.source_map;
        let i = map.partition_point(|s| s.bytes.end <= byte);
        let span = map.get(i)?;
        if byte <= span.bytes.start {
            return Some(span.chars.start);
        }
        let slice = self.source.get(span.bytes.clone())?;
        let target = byte - span.bytes.start;
        let mut seen = 0;
        let mut count = 0;
        for ch in slice.chars() {
            if seen >= target {
                break;
            }
            seen += ch.len_utf8();
            count += 1;
        }
        Some((span.chars.start + count).min(span.chars.end))
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

    fn document(source: &str, width: i32) -> Document {
        let engine = Arc::new(MonospaceEngine);
        let sheet = StyleSheet::default();
        let builder = DocumentBuilder::new(sheet.clone(), engine.clone());
        let content = builder.build(&LineScanner.scan(source));
        let doc = Document::new(source.to_string(), content);
        let layout = LayoutEngine::new(engine, sheet);
        let page = layout.layout(doc.content(), &LayoutOptions::new(Pt::from_i32(width)));
        doc.publish(page);
        doc
    }

    #[test]
    fn link_lookup_under_a_point() {
        let doc = document("pre [click here](https://x.test) post", 2000);
        let link = doc.content().links.first().expect("one link").clone();
        let rects = doc.rects_for_char_range(
            CharRange::new(link.range.start, link.range.start + 1),
            RectMode::CharBounding,
            CoordSpace::Page,
        );
        assert_eq!(
            doc.link_at_point(rects[0].center()),
            Some("https://x.test")
        );
        // first char of the paragraph is outside the link
        let rects = doc.rects_for_char_range(
            CharRange::new(0, 1),
            RectMode::CharBounding,
            CoordSpace::Page,
        );
        assert_eq!(doc.link_at_point(rects[0].center()), None);
    }

    #[test]
    fn drag_scrolls_a_code_block_and_survives_republish() {
        let doc = document("```\n0123456789abcdefghijklmnop\n```", 120);
        let page = doc.page().unwrap();
        let region = &page.regions[0];
        assert!(region.scroll.is_some());
        let inside = region.rect.center();

        assert!(doc.on_touch_event(TouchPhase::Down, inside));
        let moved = Point::new(inside.x - Pt::from_i32(60), inside.y);
        assert!(doc.on_touch_event(TouchPhase::Move, moved));
        assert!(doc.on_touch_event(TouchPhase::Up, moved));
        let offset = region.scroll.as_ref().unwrap().offset_pt();
        assert!(offset < Pt::ZERO);

        // relayout at the same width keeps the offset
        let engine = Arc::new(MonospaceEngine);
        let layout = LayoutEngine::new(engine, StyleSheet::default());
        let fresh = layout.layout(doc.content(), &LayoutOptions::new(Pt::from_i32(120)));
        let published = doc.publish(fresh);
        let carried = published.regions[0].scroll.as_ref().unwrap().offset_pt();
        assert_eq!(carried, offset);
    }

    #[test]
    fn touches_outside_scrollable_regions_pass_through() {
        let doc = document("plain paragraph", 2000);
        let page = doc.page().unwrap();
        let inside = page.regions[0].rect.center();
        assert!(!doc.on_touch_event(TouchPhase::Down, inside));
        assert!(!doc.on_touch_event(TouchPhase::Up, inside));
    }

    #[test]
    fn byte_and_char_offsets_convert_both_ways() {
        let source = "h\u{E9}llo\n\nw\u{F6}rld";
        let doc = document(source, 2000);
        // chars: héllo=0..5, wörld=5..10
        assert_eq!(doc.byte_for_char(0), Some(0));
        assert_eq!(doc.byte_for_char(2), Some(3)); // é is two bytes
        assert_eq!(doc.char_for_byte(3), Some(2));
        assert_eq!(doc.char_for_byte(8), Some(5)); // start of wörld
        let w = doc.byte_for_char(5).unwrap();
        assert_eq!(&source[w..w + 1], "w");
    }

    #[test]
    fn full_text_extraction() {
        let doc = document("# Title\n\nbody text", 2000);
        assert_eq!(doc.text(), "Title\nbody text");
    }
}
