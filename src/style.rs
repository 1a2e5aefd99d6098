use std::collections::HashMap;

use crate::types::{Color, Margins, Pt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

/// How a height-constrained element handles content past the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextOverflow {
    #[default]
    Clip,
    Ellipsis,
}

/// Which edges of an element's border rect get stroked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderSides {
    #[default]
    None,
    Left,
    Top,
    Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderStyle {
    pub width: Pt,
    pub color: Color,
}

impl Default for BorderStyle {
    fn default() -> Self {
        Self {
            width: Pt::ZERO,
            color: Color::BLACK,
        }
    }
}

/// Character-level style carried by every text run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStyle {
    pub font_size: Pt,
    pub line_height: Pt,
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub monospace: bool,
    pub color: Color,
}

impl Default for RunStyle {
    fn default() -> Self {
        Self {
            font_size: Pt::from_i32(14),
            line_height: Pt::from_i32(20),
            bold: false,
            italic: false,
            strikethrough: false,
            underline: false,
            monospace: false,
            color: Color::BLACK,
        }
    }
}

/// Box-level style for one block element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockStyle {
    pub margin: Margins,
    pub padding: Margins,
    pub min_width: Pt,
    pub max_width: Option<Pt>,
    pub max_height: Option<Pt>,
    pub max_lines: Option<usize>,
    pub overflow: TextOverflow,
    pub background: Option<Color>,
}

/// Run and block styling for one category of block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockTheme {
    pub run: RunStyle,
    pub block: BlockStyle,
    pub border: BorderStyle,
    pub border_sides: BorderSides,
}

/// Resolved styling for the whole document. Header levels past six
/// reuse the level-six theme.
#[derive(Debug, Clone)]
pub struct StyleSheet {
    pub normal: BlockTheme,
    pub headers: [BlockTheme; 6],
    pub quote: BlockTheme,
    pub code_block: BlockTheme,
    pub inline_code: RunStyle,
    pub link: RunStyle,
    pub mark: RunStyle,
    pub list_item: BlockTheme,
    pub list_marker: RunStyle,
    pub table: BlockTheme,
    pub table_header: BlockTheme,
    pub table_cell: BlockTheme,
    pub rule: BlockTheme,
    pub span_classes: HashMap<String, RunStyle>,
    pub page_padding: Margins,
    /// Extra indent applied to wrapped lines after a list marker.
    pub list_indent: Pt,
}

impl StyleSheet {
    pub fn header(&self, level: u8) -> &BlockTheme {
        let idx = (level.clamp(1, 6) - 1) as usize;
        &self.headers[idx]
    }

    pub fn span_class(&self, name: &str) -> Option<&RunStyle> {
        self.span_classes.get(name)
    }
}

impl Default for StyleSheet {
    fn default() -> Self {
        let normal_run = RunStyle::default();
        let header = |size: i32, height: i32, top: f32, bottom: f32| BlockTheme {
            run: RunStyle {
                font_size: Pt::from_i32(size),
                line_height: Pt::from_i32(height),
                bold: true,
                ..normal_run.clone()
            },
            block: BlockStyle {
                margin: Margins {
                    top: Pt::from_f32(top),
                    bottom: Pt::from_f32(bottom),
                    ..Margins::default()
                },
                ..BlockStyle::default()
            },
            ..BlockTheme::default()
        };
        let headers = [
            header(26, 36, 16.0, 8.0),
            header(22, 31, 14.0, 7.0),
            header(19, 27, 12.0, 6.0),
            header(17, 24, 10.0, 5.0),
            header(15, 21, 8.0, 4.0),
            header(14, 20, 8.0, 4.0),
        ];

        let normal = BlockTheme {
            run: normal_run.clone(),
            block: BlockStyle {
                margin: Margins {
                    top: Pt::from_i32(8),
                    bottom: Pt::from_i32(8),
                    ..Margins::default()
                },
                ..BlockStyle::default()
            },
            ..BlockTheme::default()
        };

        let quote = BlockTheme {
            run: RunStyle {
                color: Color::rgb(0.4, 0.4, 0.4),
                ..normal_run.clone()
            },
            block: BlockStyle {
                padding: Margins {
                    left: Pt::from_i32(12),
                    ..Margins::default()
                },
                margin: Margins {
                    top: Pt::from_i32(8),
                    bottom: Pt::from_i32(8),
                    ..Margins::default()
                },
                ..BlockStyle::default()
            },
            border: BorderStyle {
                width: Pt::from_i32(3),
                color: Color::rgb(0.8, 0.8, 0.8),
            },
            border_sides: BorderSides::Left,
        };

        let code_block = BlockTheme {
            run: RunStyle {
                monospace: true,
                font_size: Pt::from_i32(13),
                line_height: Pt::from_i32(19),
                ..normal_run.clone()
            },
            block: BlockStyle {
                padding: Margins::all(10.0),
                margin: Margins {
                    top: Pt::from_i32(8),
                    bottom: Pt::from_i32(8),
                    ..Margins::default()
                },
                background: Some(Color::rgb(0.96, 0.96, 0.96)),
                ..BlockStyle::default()
            },
            ..BlockTheme::default()
        };

        let table_cell = BlockTheme {
            run: normal_run.clone(),
            block: BlockStyle {
                padding: Margins::all(6.0),
                min_width: Pt::from_i32(40),
                ..BlockStyle::default()
            },
            border: BorderStyle {
                width: Pt::from_f32(0.5),
                color: Color::rgb(0.85, 0.85, 0.85),
            },
            border_sides: BorderSides::Rect,
        };
        let table_header = BlockTheme {
            run: RunStyle {
                bold: true,
                ..normal_run.clone()
            },
            ..table_cell.clone()
        };

        Self {
            normal,
            headers,
            quote,
            code_block,
            inline_code: RunStyle {
                monospace: true,
                color: Color::rgb(0.78, 0.15, 0.28),
                ..normal_run.clone()
            },
            link: RunStyle {
                color: Color::rgb(0.1, 0.35, 0.85),
                underline: true,
                ..normal_run.clone()
            },
            mark: RunStyle {
                color: Color::rgb(0.2, 0.15, 0.0),
                ..normal_run.clone()
            },
            list_item: BlockTheme {
                run: normal_run.clone(),
                block: BlockStyle {
                    margin: Margins {
                        top: Pt::from_i32(4),
                        bottom: Pt::from_i32(4),
                        ..Margins::default()
                    },
                    ..BlockStyle::default()
                },
                ..BlockTheme::default()
            },
            list_marker: normal_run.clone(),
            table: BlockTheme {
                run: normal_run,
                block: BlockStyle {
                    margin: Margins {
                        top: Pt::from_i32(8),
                        bottom: Pt::from_i32(8),
                        ..Margins::default()
                    },
                    ..BlockStyle::default()
                },
                ..BlockTheme::default()
            },
            table_header,
            table_cell,
            rule: BlockTheme {
                block: BlockStyle {
                    margin: Margins {
                        top: Pt::from_i32(12),
                        bottom: Pt::from_i32(12),
                        ..Margins::default()
                    },
                    ..BlockStyle::default()
                },
                border: BorderStyle {
                    width: Pt::from_i32(1),
                    color: Color::rgb(0.85, 0.85, 0.85),
                },
                border_sides: BorderSides::Top,
                ..BlockTheme::default()
            },
            span_classes: HashMap::new(),
            page_padding: Margins::default(),
            list_indent: Pt::from_i32(8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_levels_clamp_to_six() {
        let sheet = StyleSheet::default();
        assert_eq!(sheet.header(9).run.font_size, sheet.header(6).run.font_size);
        assert_eq!(sheet.header(0).run.font_size, sheet.header(1).run.font_size);
    }

    #[test]
    fn quote_theme_uses_a_left_border() {
        let sheet = StyleSheet::default();
        assert_eq!(sheet.quote.border_sides, BorderSides::Left);
        assert!(sheet.quote.border.width > Pt::ZERO);
    }
}
