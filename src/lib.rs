mod block;
mod builder;
mod document;
mod element;
mod error;
mod inline;
mod layout;
mod page;
mod selection;
mod style;
mod text_engine;
mod types;

pub use block::{BlockEvent, BlockKind, BlockScanner, LineScanner, ScannerRegistry};
pub use builder::{
    AltSubstitution, DocumentBuilder, DocumentContent, ImageInfo, LinkInfo, LoadedView,
    ResourceLoader, SourceSpan,
};
pub use document::{Document, TouchPhase};
pub use element::{Element, ElementKind, SourceKind, Table, TableCell};
pub use error::MarkflowError;
pub use inline::{HtmlAttribute, InlineNode, InlineSyntax, NodeDetail, parse_inline};
pub use layout::{LayoutEngine, LayoutOptions};
pub use page::{
    Page, PageRegion, RegionBorder, RegionKind, ScrollInfo, ScrollState, TableRegion,
    TableRegionCell,
};
pub use selection::{
    CoordSpace, Granularity, RectMode, bounding_rect_for_char_range, char_index_at_point,
    char_range_at_point, content_in_char_range, rects_for_char_range,
};
pub use style::{
    BlockStyle, BlockTheme, BorderSides, BorderStyle, RunStyle, StyleSheet, TextAlign,
    TextOverflow, VerticalAlign,
};
pub use text_engine::{
    InlineObject, MonospaceEngine, OBJECT_CHAR, ParagraphContent, Run, RunContent,
    ShapeConstraints, ShapedLine, ShapedText, TextEngine, WidthMode,
};
pub use types::{CharRange, Color, Margins, Point, Pt, Rect, Size};

use std::sync::Arc;

/// Entry point tying the pipeline together: scan blocks, build
/// content, lay out pages, publish them on a document.
pub struct Markflow {
    sheet: StyleSheet,
    engine: Arc<dyn TextEngine>,
    loader: Option<Arc<dyn ResourceLoader>>,
    registry: ScannerRegistry,
    scanner: String,
}

impl Markflow {
    pub fn builder() -> MarkflowBuilder {
        MarkflowBuilder::new()
    }

    pub fn style_sheet(&self) -> &StyleSheet {
        &self.sheet
    }

    /// Parses `source` with the configured block scanner and returns a
    /// document with no page published yet.
    pub fn parse(&self, source: &str) -> Result<Document, MarkflowError> {
        let scanner = self.registry.get(&self.scanner)?;
        let events = scanner.scan(source);
        let mut builder = DocumentBuilder::new(self.sheet.clone(), self.engine.clone());
        if let Some(loader) = &self.loader {
            builder = builder.with_loader(loader.clone());
        }
        let content = builder.build(&events);
        Ok(Document::new(source.to_string(), content))
    }

    /// Plain-text mode: no block scanning, the source renders verbatim
    /// as one paragraph.
    pub fn parse_plain(&self, source: &str) -> Document {
        let builder = DocumentBuilder::new(self.sheet.clone(), self.engine.clone());
        Document::new(source.to_string(), builder.build_plain(source))
    }

    /// Lays the document out at the given width and publishes the
    /// resulting page, carrying scroll offsets over from the previous
    /// one.
    pub fn layout(&self, document: &Document, options: &LayoutOptions) -> Arc<Page> {
        let layout = LayoutEngine::new(self.engine.clone(), self.sheet.clone());
        document.publish(layout.layout(document.content(), options))
    }

    pub fn render(
        &self,
        source: &str,
        options: &LayoutOptions,
    ) -> Result<(Document, Arc<Page>), MarkflowError> {
        if options.width <= Pt::ZERO {
            return Err(MarkflowError::InvalidConfiguration(format!(
                "layout width must be positive, got {:?}",
                options.width
            )));
        }
        let document = self.parse(source)?;
        let page = self.layout(&document, options);
        Ok((document, page))
    }
}

pub struct MarkflowBuilder {
    sheet: StyleSheet,
    engine: Arc<dyn TextEngine>,
    loader: Option<Arc<dyn ResourceLoader>>,
    registry: ScannerRegistry,
    scanner: String,
}

impl MarkflowBuilder {
    pub fn new() -> Self {
        Self {
            sheet: StyleSheet::default(),
            engine: Arc::new(MonospaceEngine),
            loader: None,
            registry: ScannerRegistry::with_builtin(),
            scanner: "markdown".to_string(),
        }
    }

    pub fn style_sheet(mut self, sheet: StyleSheet) -> Self {
        self.sheet = sheet;
        self
    }

    pub fn text_engine(mut self, engine: Arc<dyn TextEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn resource_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Selects which registered scanner `parse` uses. An unknown name
    /// surfaces as an error from `parse`, not here.
    pub fn scanner(mut self, name: impl Into<String>) -> Self {
        self.scanner = name.into();
        self
    }

    pub fn register_scanner(
        mut self,
        name: impl Into<String>,
        scanner: Arc<dyn BlockScanner>,
    ) -> Self {
        self.registry.register(name, scanner);
        self
    }

    pub fn build(self) -> Markflow {
        Markflow {
            sheet: self.sheet,
            engine: self.engine,
            loader: self.loader,
            registry: self.registry,
            scanner: self.scanner,
        }
    }
}

impl Default for MarkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_parse_and_layout() {
        let engine = Markflow::builder().build();
        let (document, page) = engine
            .render(
                "# Title\n\nSome *body* text with a [link](https://a.test).\n\n- one\n- two",
                &LayoutOptions::new(Pt::from_i32(400)),
            )
            .expect("builtin scanner");
        assert!(page.regions.len() >= 4);
        assert!(page.height > Pt::ZERO);
        assert_eq!(document.content().links.len(), 1);
        assert!(document.text().starts_with("Title\n"));
    }

    #[test]
    fn non_positive_width_is_rejected() {
        let engine = Markflow::builder().build();
        let err = engine
            .render("hello", &LayoutOptions::new(Pt::ZERO))
            .unwrap_err();
        assert!(matches!(err, MarkflowError::InvalidConfiguration(_)));
    }

    #[test]
    fn unknown_scanner_is_an_error() {
        let engine = Markflow::builder().scanner("asciidoc").build();
        let err = engine.parse("hello").unwrap_err();
        assert!(matches!(err, MarkflowError::UnknownScanner(name) if name == "asciidoc"));
    }

    #[test]
    fn custom_scanner_can_be_registered() {
        struct PlainScanner;
        impl BlockScanner for PlainScanner {
            fn scan<'a>(&self, source: &'a str) -> Vec<BlockEvent<'a>> {
                vec![
                    BlockEvent::Start(BlockKind::Paragraph),
                    BlockEvent::Line {
                        text: source,
                        offset: 0,
                    },
                    BlockEvent::End(BlockKind::Paragraph),
                ]
            }
        }
        let engine = Markflow::builder()
            .register_scanner("plain", Arc::new(PlainScanner))
            .scanner("plain")
            .build();
        let document = engine.parse("*not emphasis once scanned plain* ok").unwrap();
        // the custom scanner still goes through inline parsing
        assert!(document.text().contains("not emphasis"));
        assert_eq!(document.content().elements.len(), 1);
    }

    #[test]
    fn plain_mode_keeps_markup_verbatim() {
        let engine = Markflow::builder().build();
        let document = engine.parse_plain("# not a header\n*not emphasis*");
        assert_eq!(document.text(), "# not a header\n*not emphasis*");
        assert_eq!(document.content().elements.len(), 1);
    }

    #[test]
    fn relayout_at_a_new_width_republished() {
        let engine = Markflow::builder().build();
        let document = engine
            .parse("word ".repeat(40).trim_end())
            .unwrap();
        let narrow = engine.layout(&document, &LayoutOptions::new(Pt::from_i32(200)));
        let wide = engine.layout(&document, &LayoutOptions::new(Pt::from_i32(2000)));
        assert!(narrow.line_count > wide.line_count);
        assert!(Arc::ptr_eq(&document.page().unwrap(), &wide));
    }
}
