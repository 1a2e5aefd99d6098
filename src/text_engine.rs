//! Text shaping boundary. The layout and hit-testing code only ever
//! talks to [`TextEngine`]; the bundled [`MonospaceEngine`] is a
//! deterministic reference implementation with one fixed advance per
//! character.

use crate::style::{RunStyle, TextAlign};
use crate::types::Pt;

/// Placeholder character a 1-char inline object occupies in the
/// flattened paragraph text.
pub const OBJECT_CHAR: char = '\u{FFFC}';

/// Non-text content embedded in a paragraph. Closed set on purpose;
/// hosts provide sizes through the resource loader rather than through
/// custom delegate objects.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineObject {
    Image {
        url: String,
        alt: String,
        width: Pt,
        height: Pt,
    },
    View {
        id: u64,
        width: Pt,
        height: Pt,
    },
    Marker {
        text: String,
        width: Pt,
    },
}

impl InlineObject {
    pub fn width(&self) -> Pt {
        match self {
            InlineObject::Image { width, .. }
            | InlineObject::View { width, .. }
            | InlineObject::Marker { width, .. } => *width,
        }
    }

    pub fn height(&self) -> Pt {
        match self {
            InlineObject::Image { height, .. } | InlineObject::View { height, .. } => *height,
            InlineObject::Marker { .. } => Pt::ZERO,
        }
    }
}

/// Run payload. `Object` occupies exactly one character slot in the
/// flattened text; `Ghost` occupies zero but still takes horizontal
/// space (list markers).
#[derive(Debug, Clone, PartialEq)]
pub enum RunContent {
    Text(String),
    Object(InlineObject),
    Ghost(InlineObject),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub content: RunContent,
    pub style: RunStyle,
    /// Link payload index into the document's link table, if any.
    pub link: Option<usize>,
}

impl Run {
    pub fn text(content: impl Into<String>, style: RunStyle) -> Self {
        Self {
            content: RunContent::Text(content.into()),
            style,
            link: None,
        }
    }

    pub fn char_count(&self) -> usize {
        match &self.content {
            RunContent::Text(t) => t.chars().count(),
            RunContent::Object(_) => 1,
            RunContent::Ghost(_) => 0,
        }
    }
}

/// The styled runs of one paragraph, in flattened-text order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphContent {
    pub runs: Vec<Run>,
    pub align: TextAlign,
    pub last_line_align: TextAlign,
}

impl ParagraphContent {
    pub fn new(runs: Vec<Run>) -> Self {
        Self {
            runs,
            align: TextAlign::Left,
            last_line_align: TextAlign::Left,
        }
    }

    pub fn char_count(&self) -> usize {
        self.runs.iter().map(Run::char_count).sum()
    }

    /// Flattened text: objects become [`OBJECT_CHAR`], ghosts vanish.
    pub fn content_string(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            match &run.content {
                RunContent::Text(t) => out.push_str(t),
                RunContent::Object(_) => out.push(OBJECT_CHAR),
                RunContent::Ghost(_) => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthMode {
    /// Measure: the result reports its natural width, no alignment.
    AtMost,
    /// Final: lines align inside the given width.
    Definite,
}

#[derive(Debug, Clone, Copy)]
pub struct ShapeConstraints {
    pub width: Pt,
    pub mode: WidthMode,
    pub max_height: Pt,
    pub max_lines: Option<usize>,
    /// Indent applied to every line after the first (list bodies).
    pub hanging_indent: Pt,
}

impl ShapeConstraints {
    pub fn definite(width: Pt) -> Self {
        Self {
            width,
            mode: WidthMode::Definite,
            max_height: Pt::MAX,
            max_lines: None,
            hanging_indent: Pt::ZERO,
        }
    }

    pub fn measure() -> Self {
        Self {
            width: Pt::MAX,
            mode: WidthMode::AtMost,
            max_height: Pt::MAX,
            max_lines: None,
            hanging_indent: Pt::ZERO,
        }
    }
}

/// One laid-out line. `xs` holds the left edge of every character on
/// the line plus one trailing right edge, so `xs.len()` is always
/// `char_end - char_start + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedLine {
    pub char_start: usize,
    pub char_end: usize,
    pub top: Pt,
    pub bottom: Pt,
    pub baseline: Pt,
    /// Glyph extent above the baseline; tighter than the line box.
    pub ascent: Pt,
    /// Glyph extent below the baseline.
    pub descent: Pt,
    pub xs: Vec<Pt>,
    pub last_of_paragraph: bool,
    pub ellipsized: bool,
}

impl ShapedLine {
    pub fn char_count(&self) -> usize {
        self.char_end - self.char_start
    }

    pub fn left(&self) -> Pt {
        self.xs.first().copied().unwrap_or(Pt::ZERO)
    }

    pub fn right(&self) -> Pt {
        self.xs.last().copied().unwrap_or(Pt::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapedText {
    pub lines: Vec<ShapedLine>,
    pub width: Pt,
    pub height: Pt,
    /// True when a height or line budget cut content off.
    pub truncated: bool,
}

impl ShapedText {
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            width: Pt::ZERO,
            height: Pt::ZERO,
            truncated: false,
        }
    }

    pub fn char_count(&self) -> usize {
        self.lines.last().map_or(0, |l| l.char_end)
    }

    /// Index of the line nearest to `y`. Exact containment wins; a `y`
    /// in the gap between lines resolves to the closer neighbor.
    pub fn line_index_for_y(&self, y: Pt) -> Option<usize> {
        if self.lines.is_empty() {
            return None;
        }
        let idx = self.lines.partition_point(|l| l.bottom <= y);
        if idx == 0 {
            return Some(0);
        }
        if idx >= self.lines.len() {
            return Some(self.lines.len() - 1);
        }
        let prev = &self.lines[idx - 1];
        let next = &self.lines[idx];
        if y - prev.bottom < next.top - y {
            Some(idx - 1)
        } else {
            Some(idx)
        }
    }

    /// Line holding character `index`, if any line covers it.
    pub fn line_index_for_char(&self, index: usize) -> Option<usize> {
        let idx = self.lines.partition_point(|l| l.char_end <= index);
        (idx < self.lines.len() && self.lines[idx].char_start <= index).then_some(idx)
    }

    /// Character index on `line` nearest to `x`, using boundary
    /// midpoints. An `x` exactly on a midpoint belongs to the character
    /// whose cell it centers. Can return the line's `char_end` when `x`
    /// is past the last character's midpoint.
    pub fn char_index_for_x(&self, line: usize, x: Pt) -> usize {
        let line = &self.lines[line];
        let n = line.char_count();
        for k in 0..n {
            let mid = (line.xs[k] + line.xs[k + 1]) / 2;
            if x <= mid {
                return line.char_start + k;
            }
        }
        line.char_end
    }

    /// Horizontal extent of `range` clamped to `line`, or None when
    /// the range misses the line entirely.
    pub fn x_extent_on_line(&self, line: usize, start: usize, end: usize) -> Option<(Pt, Pt)> {
        let line = &self.lines[line];
        let s = start.max(line.char_start);
        let e = end.min(line.char_end);
        if s >= e {
            return None;
        }
        Some((line.xs[s - line.char_start], line.xs[e - line.char_start]))
    }
}

pub trait TextEngine: Send + Sync {
    fn shape(&self, content: &ParagraphContent, constraints: &ShapeConstraints) -> ShapedText;

    /// Appends an ellipsis to the last line, dropping trailing
    /// characters as needed so the ellipsis itself fits inside
    /// `width` where possible. Returns the line's new right edge.
    fn append_ellipsis(&self, content: &ParagraphContent, shaped: &mut ShapedText, width: Pt)
    -> Pt;
}

/// Reference engine: every character advances by its run's font size,
/// objects by their own width. Greedy word wrap with hard breaks at
/// `\n`.
#[derive(Debug, Default)]
pub struct MonospaceEngine;

struct ShapeItem {
    ch: char,
    pre: Pt,
    width: Pt,
    line_height: Pt,
    font_size: Pt,
}

impl MonospaceEngine {
    fn items(content: &ParagraphContent) -> (Vec<ShapeItem>, Pt, Pt) {
        let mut items = Vec::new();
        let mut pending_ghost = Pt::ZERO;
        let mut default_height = Pt::ZERO;
        let mut default_font = Pt::ZERO;
        for run in &content.runs {
            default_height = default_height.max(run.style.line_height);
            default_font = default_font.max(run.style.font_size);
            match &run.content {
                RunContent::Text(text) => {
                    for ch in text.chars() {
                        let width = if ch == '\n' { Pt::ZERO } else { run.style.font_size };
                        items.push(ShapeItem {
                            ch,
                            pre: std::mem::take(&mut pending_ghost),
                            width,
                            line_height: run.style.line_height,
                            font_size: run.style.font_size,
                        });
                    }
                }
                RunContent::Object(obj) => {
                    items.push(ShapeItem {
                        ch: OBJECT_CHAR,
                        pre: std::mem::take(&mut pending_ghost),
                        width: obj.width(),
                        line_height: run.style.line_height.max(obj.height()),
                        font_size: run.style.font_size.max(obj.height()),
                    });
                }
                RunContent::Ghost(obj) => pending_ghost += obj.width(),
            }
        }
        if default_height == Pt::ZERO {
            default_height = RunStyle::default().line_height;
        }
        if default_font == Pt::ZERO {
            default_font = RunStyle::default().font_size;
        }
        (items, default_height, default_font)
    }
}

impl TextEngine for MonospaceEngine {
    fn shape(&self, content: &ParagraphContent, constraints: &ShapeConstraints) -> ShapedText {
        let (items, default_height, default_font) = Self::items(content);
        let width = constraints.width;
        let mut lines: Vec<ShapedLine> = Vec::new();
        let mut y = Pt::ZERO;
        let mut truncated = false;
        let mut i = 0usize;

        if items.is_empty() {
            // an empty paragraph still occupies one line
            lines.push(ShapedLine {
                char_start: 0,
                char_end: 0,
                top: Pt::ZERO,
                bottom: default_height,
                baseline: default_height.mul_ratio(4, 5),
                ascent: default_font.mul_ratio(4, 5),
                descent: default_font / 5,
                xs: vec![Pt::ZERO],
                last_of_paragraph: true,
                ellipsized: false,
            });
            return ShapedText {
                lines,
                width: Pt::ZERO,
                height: default_height,
                truncated: false,
            };
        }

        while i < items.len() {
            let indent = if lines.is_empty() {
                Pt::ZERO
            } else {
                constraints.hanging_indent
            };
            let mut pen = indent;
            let mut lefts: Vec<Pt> = Vec::new();
            let mut line_height = Pt::ZERO;
            let mut line_font = Pt::ZERO;
            let mut last_space: Option<usize> = None;
            let mut hard_break = false;
            let mut j = i;
            while j < items.len() {
                let item = &items[j];
                let left = pen + item.pre;
                // breakable spaces may hang past the right edge
                if item.ch != ' ' && left + item.width > width && j > i {
                    if let Some(k) = last_space {
                        lefts.truncate(k - i + 1);
                        pen = lefts[k - i] + items[k].width;
                        j = k + 1;
                    }
                    break;
                }
                lefts.push(left);
                pen = left + item.width;
                line_height = line_height.max(item.line_height);
                line_font = line_font.max(item.font_size);
                if item.ch == '\n' {
                    j += 1;
                    hard_break = true;
                    break;
                }
                if item.ch == ' ' {
                    last_space = Some(j);
                }
                j += 1;
            }
            if line_height == Pt::ZERO {
                line_height = default_height;
            }
            if line_font == Pt::ZERO {
                line_font = default_font;
            }
            let bottom = y + line_height;
            if !lines.is_empty() && bottom > constraints.max_height {
                truncated = true;
                break;
            }
            let mut xs = lefts;
            xs.push(pen);
            lines.push(ShapedLine {
                char_start: i,
                char_end: j,
                top: y,
                bottom,
                baseline: y + line_height.mul_ratio(4, 5),
                ascent: line_font.mul_ratio(4, 5),
                descent: line_font / 5,
                xs,
                last_of_paragraph: hard_break || j == items.len(),
                ellipsized: false,
            });
            y = bottom;
            i = j;
            if let Some(limit) = constraints.max_lines {
                if lines.len() >= limit && i < items.len() {
                    truncated = true;
                    break;
                }
            }
        }

        let natural = lines.iter().map(ShapedLine::right).fold(Pt::ZERO, Pt::max);
        let out_width = match constraints.mode {
            WidthMode::AtMost => natural,
            WidthMode::Definite => {
                // alignment shifts whole lines inside the given width
                for line in &mut lines {
                    let align = if line.last_of_paragraph {
                        content.last_line_align
                    } else {
                        content.align
                    };
                    let slack = width - line.right();
                    let shift = match align {
                        TextAlign::Left => Pt::ZERO,
                        TextAlign::Center => slack / 2,
                        TextAlign::Right => slack,
                    };
                    if shift > Pt::ZERO {
                        for x in &mut line.xs {
                            *x += shift;
                        }
                    }
                }
                if width.is_unbounded() { natural } else { width }
            }
        };
        ShapedText {
            lines,
            width: out_width,
            height: y,
            truncated,
        }
    }

    fn append_ellipsis(
        &self,
        content: &ParagraphContent,
        shaped: &mut ShapedText,
        width: Pt,
    ) -> Pt {
        let Some(line) = shaped.lines.last_mut() else {
            return Pt::ZERO;
        };
        let ell_width = content
            .runs
            .last()
            .map_or_else(|| RunStyle::default().font_size, |r| r.style.font_size);
        while line.xs.len() > 2 && line.right() + ell_width > width {
            line.xs.pop();
            line.char_end -= 1;
        }
        line.ellipsized = true;
        shaped.truncated = true;
        line.right() + ell_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::RunStyle;

    fn style(size: i32, height: i32) -> RunStyle {
        RunStyle {
            font_size: Pt::from_i32(size),
            line_height: Pt::from_i32(height),
            ..RunStyle::default()
        }
    }

    fn shape(text: &str, width: i32) -> ShapedText {
        let content = ParagraphContent::new(vec![Run::text(text, style(10, 14))]);
        MonospaceEngine.shape(&content, &ShapeConstraints::definite(Pt::from_i32(width)))
    }

    #[test]
    fn wraps_at_the_last_space() {
        let shaped = shape("aa bb cc", 55);
        assert_eq!(shaped.lines.len(), 2);
        assert_eq!(shaped.lines[0].char_end, 6); // "aa bb " incl trailing space
        assert_eq!(shaped.lines[1].char_start, 6);
        assert_eq!(shaped.height, Pt::from_i32(28));
    }

    #[test]
    fn long_word_breaks_mid_word() {
        let shaped = shape("abcdefgh", 30);
        assert_eq!(shaped.lines.len(), 3);
        assert_eq!(shaped.lines[0].char_end, 3);
    }

    #[test]
    fn newline_forces_a_break() {
        let shaped = shape("ab\ncd", 500);
        assert_eq!(shaped.lines.len(), 2);
        assert!(shaped.lines[0].last_of_paragraph);
        assert_eq!(shaped.lines[0].char_end, 3); // newline occupies a slot
        assert_eq!(shaped.lines[1].char_start, 3);
    }

    #[test]
    fn cell_center_maps_back_to_its_own_char() {
        let shaped = shape("abc", 500);
        // fixed advances halve exactly, so a cell center lands right
        // on the boundary midpoint; it must stay with that cell
        assert_eq!(shaped.char_index_for_x(0, Pt::from_i32(5)), 0);
        assert_eq!(shaped.char_index_for_x(0, Pt::from_i32(15)), 1);
        assert_eq!(shaped.char_index_for_x(0, Pt::from_f32(15.5)), 2);
        assert_eq!(shaped.char_index_for_x(0, Pt::from_i32(99)), 3);
    }

    #[test]
    fn xs_has_one_more_entry_than_chars() {
        let shaped = shape("abc de", 500);
        for line in &shaped.lines {
            assert_eq!(line.xs.len(), line.char_count() + 1);
        }
        assert_eq!(shaped.lines[0].xs[1], Pt::from_i32(10));
    }

    #[test]
    fn objects_take_one_slot_and_their_own_width() {
        let content = ParagraphContent::new(vec![
            Run::text("a", style(10, 14)),
            Run {
                content: RunContent::Object(InlineObject::Image {
                    url: String::new(),
                    alt: String::new(),
                    width: Pt::from_i32(40),
                    height: Pt::from_i32(30),
                }),
                style: style(10, 14),
                link: None,
            },
        ]);
        assert_eq!(content.char_count(), 2);
        assert_eq!(content.content_string().chars().count(), 2);
        let shaped =
            MonospaceEngine.shape(&content, &ShapeConstraints::definite(Pt::from_i32(500)));
        assert_eq!(shaped.lines[0].xs[2] - shaped.lines[0].xs[1], Pt::from_i32(40));
        assert_eq!(shaped.lines[0].bottom, Pt::from_i32(30));
    }

    #[test]
    fn ghost_marker_shifts_text_without_a_slot() {
        let content = ParagraphContent::new(vec![
            Run {
                content: RunContent::Ghost(InlineObject::Marker {
                    text: "1.".to_string(),
                    width: Pt::from_i32(20),
                }),
                style: style(10, 14),
                link: None,
            },
            Run::text("x", style(10, 14)),
        ]);
        assert_eq!(content.char_count(), 1);
        let shaped =
            MonospaceEngine.shape(&content, &ShapeConstraints::definite(Pt::from_i32(500)));
        assert_eq!(shaped.lines[0].xs[0], Pt::from_i32(20));
    }

    #[test]
    fn max_lines_truncates() {
        let content = ParagraphContent::new(vec![Run::text("aa bb cc dd", style(10, 14))]);
        let shaped = MonospaceEngine.shape(
            &content,
            &ShapeConstraints {
                max_lines: Some(2),
                ..ShapeConstraints::definite(Pt::from_i32(35))
            },
        );
        assert_eq!(shaped.lines.len(), 2);
        assert!(shaped.truncated);
        assert!(shaped.char_count() < content.char_count());
    }

    #[test]
    fn char_index_for_x_uses_midpoints() {
        let shaped = shape("abcd", 500);
        assert_eq!(shaped.char_index_for_x(0, Pt::from_f32(4.0)), 0);
        assert_eq!(shaped.char_index_for_x(0, Pt::from_f32(6.0)), 1);
        assert_eq!(shaped.char_index_for_x(0, Pt::from_i32(100)), 4);
    }

    #[test]
    fn line_index_for_y_clamps_and_resolves_gaps() {
        let shaped = shape("aa bb cc", 55);
        assert_eq!(shaped.line_index_for_y(-Pt::from_i32(5)), Some(0));
        assert_eq!(shaped.line_index_for_y(Pt::from_i32(1000)), Some(1));
        assert_eq!(shaped.line_index_for_y(Pt::from_i32(20)), Some(1));
    }

    #[test]
    fn append_ellipsis_drops_chars_to_fit() {
        let content = ParagraphContent::new(vec![Run::text("abcdef", style(10, 14))]);
        let mut shaped =
            MonospaceEngine.shape(&content, &ShapeConstraints::definite(Pt::from_i32(60)));
        let right =
            MonospaceEngine.append_ellipsis(&content, &mut shaped, Pt::from_i32(60));
        assert!(shaped.lines[0].ellipsized);
        assert!(shaped.truncated);
        assert!(right <= Pt::from_i32(60));
        assert_eq!(shaped.lines[0].char_end, 5);
    }
}
