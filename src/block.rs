//! Block structure scanning. A [`BlockScanner`] turns raw source into
//! a flat event stream; the document builder consumes the events and
//! runs the inline parser over each line. Scanners are looked up by
//! name in an explicit [`ScannerRegistry`] owned by the engine.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::MarkflowError;
use crate::style::TextAlign;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Header(u8),
    Quote,
    UnorderedList,
    OrderedList { start: u64 },
    ListItem,
    CodeBlock,
    Table,
    Rule,
}

/// One structural event. `offset` values are byte offsets of the text
/// slice inside the original source, so downstream code can map
/// rendered characters back to source positions.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEvent<'a> {
    Start(BlockKind),
    End(BlockKind),
    Line { text: &'a str, offset: usize },
    TableAligns(Vec<Option<TextAlign>>),
    TableCell { text: &'a str, offset: usize, header: bool },
    TableRowEnd,
}

pub trait BlockScanner: Send + Sync {
    fn scan<'a>(&self, source: &'a str) -> Vec<BlockEvent<'a>>;
}

/// Name-to-scanner table. Every engine instance owns its own
/// registry; there is no process-global scanner table.
#[derive(Clone)]
pub struct ScannerRegistry {
    scanners: HashMap<String, Arc<dyn BlockScanner>>,
}

impl ScannerRegistry {
    pub fn empty() -> Self {
        Self {
            scanners: HashMap::new(),
        }
    }

    /// Registry with the built-in line scanner under `"markdown"`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("markdown", Arc::new(LineScanner));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, scanner: Arc<dyn BlockScanner>) {
        self.scanners.insert(name.into(), scanner);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn BlockScanner>, MarkflowError> {
        self.scanners
            .get(name)
            .cloned()
            .ok_or_else(|| MarkflowError::UnknownScanner(name.to_string()))
    }
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for ScannerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerRegistry")
            .field("names", &self.scanners.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Built-in line-oriented scanner covering headers, fenced code,
/// quotes, flat lists, pipe tables and thematic breaks. Anything it
/// does not recognize becomes paragraph text.
#[derive(Debug, Default)]
pub struct LineScanner;

impl BlockScanner for LineScanner {
    fn scan<'a>(&self, source: &'a str) -> Vec<BlockEvent<'a>> {
        let mut events = Vec::new();
        let lines = split_lines(source);
        scan_lines(&lines, &mut events);
        events
    }
}

/// Lines with their byte offsets, trailing `\n`/`\r` stripped.
fn split_lines(source: &str) -> Vec<(&str, usize)> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    for raw in source.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        lines.push((line, offset));
        offset += raw.len() + 1;
    }
    lines
}

fn header_level(line: &str) -> Option<(u8, usize)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if (1..=6).contains(&hashes) {
        let rest = &line[hashes..];
        if rest.is_empty() || rest.starts_with(' ') {
            let skip = hashes + rest.len().min(1);
            return Some((hashes as u8, skip));
        }
    }
    None
}

fn is_rule(line: &str) -> bool {
    let trimmed = line.trim();
    for marker in ['-', '*', '_'] {
        let count = trimmed.chars().filter(|c| *c == marker).count();
        if count >= 3 && trimmed.chars().all(|c| c == marker || c == ' ') {
            return true;
        }
    }
    false
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Marker prefix of a list line: (kind, bytes to skip past the marker).
fn list_marker(line: &str) -> Option<(Option<u64>, usize)> {
    let trimmed = line.trim_start();
    let indent = line.len() - trimmed.len();
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
    {
        let _ = rest;
        return Some((None, indent + 2));
    }
    let digits = trimmed.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits > 0 && digits <= 9 {
        let after = &trimmed[digits..];
        if after.starts_with(". ") || after.starts_with(") ") {
            let number = trimmed[..digits].parse().ok()?;
            return Some((Some(number), indent + digits + 2));
        }
    }
    None
}

fn is_table_row(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn parse_aligns(line: &str) -> Vec<Option<TextAlign>> {
    split_cells(line, 0)
        .into_iter()
        .map(|(cell, _)| {
            let cell = cell.trim();
            let left = cell.starts_with(':');
            let right = cell.ends_with(':');
            match (left, right) {
                (true, true) => Some(TextAlign::Center),
                (false, true) => Some(TextAlign::Right),
                (true, false) => Some(TextAlign::Left),
                (false, false) => None,
            }
        })
        .collect()
}

/// Splits `| a | b |` into cell slices with source offsets. A `\|`
/// inside a cell does not split.
fn split_cells(line: &str, line_offset: usize) -> Vec<(&str, usize)> {
    let bytes = line.as_bytes();
    let mut cells = Vec::new();
    let mut start = None;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                if start.is_none() {
                    start = Some(i);
                }
                i += 2;
                continue;
            }
            b'|' => {
                if let Some(s) = start.take() {
                    cells.push((&line[s..i], line_offset + s));
                } else if !cells.is_empty() || i > 0 {
                    // empty interior cell between two pipes
                    cells.push((&line[i..i], line_offset + i));
                }
                i += 1;
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
                i += 1;
            }
        }
    }
    if let Some(s) = start {
        // unterminated trailing cell
        cells.push((&line[s..], line_offset + s));
    }
    cells
}

fn scan_lines<'a>(lines: &[(&'a str, usize)], events: &mut Vec<BlockEvent<'a>>) {
    let mut i = 0usize;
    while i < lines.len() {
        let (line, offset) = lines[i];

        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        if is_fence(line) {
            events.push(BlockEvent::Start(BlockKind::CodeBlock));
            i += 1;
            while i < lines.len() && !is_fence(lines[i].0) {
                events.push(BlockEvent::Line {
                    text: lines[i].0,
                    offset: lines[i].1,
                });
                i += 1;
            }
            if i < lines.len() {
                i += 1; // closing fence
            }
            events.push(BlockEvent::End(BlockKind::CodeBlock));
            continue;
        }

        if let Some((level, skip)) = header_level(line) {
            events.push(BlockEvent::Start(BlockKind::Header(level)));
            events.push(BlockEvent::Line {
                text: &line[skip..],
                offset: offset + skip,
            });
            events.push(BlockEvent::End(BlockKind::Header(level)));
            i += 1;
            continue;
        }

        if is_rule(line) {
            events.push(BlockEvent::Start(BlockKind::Rule));
            events.push(BlockEvent::End(BlockKind::Rule));
            i += 1;
            continue;
        }

        if line.trim_start().starts_with('>') {
            let mut inner = Vec::new();
            while i < lines.len() {
                let (l, o) = lines[i];
                let trimmed = l.trim_start();
                let Some(rest) = trimmed.strip_prefix('>') else {
                    break;
                };
                let indent = l.len() - trimmed.len();
                let rest_offset = o + indent + 1 + usize::from(rest.starts_with(' '));
                let rest = rest.strip_prefix(' ').unwrap_or(rest);
                inner.push((rest, rest_offset));
                i += 1;
            }
            events.push(BlockEvent::Start(BlockKind::Quote));
            scan_lines(&inner, events);
            events.push(BlockEvent::End(BlockKind::Quote));
            continue;
        }

        if let Some((first_number, _)) = list_marker(line) {
            let list_kind = match first_number {
                Some(start) => BlockKind::OrderedList { start },
                None => BlockKind::UnorderedList,
            };
            events.push(BlockEvent::Start(list_kind.clone()));
            while i < lines.len() {
                let (l, o) = lines[i];
                let Some((number, skip)) = list_marker(l) else {
                    break;
                };
                if number.is_some() != first_number.is_some() {
                    break;
                }
                events.push(BlockEvent::Start(BlockKind::ListItem));
                events.push(BlockEvent::Line {
                    text: &l[skip..],
                    offset: o + skip,
                });
                i += 1;
                // indented continuation lines belong to the item
                while i < lines.len()
                    && !lines[i].0.trim().is_empty()
                    && lines[i].0.starts_with("  ")
                    && list_marker(lines[i].0).is_none()
                {
                    events.push(BlockEvent::Line {
                        text: lines[i].0.trim_start(),
                        offset: lines[i].1 + lines[i].0.len()
                            - lines[i].0.trim_start().len(),
                    });
                    i += 1;
                }
                events.push(BlockEvent::End(BlockKind::ListItem));
            }
            events.push(BlockEvent::End(list_kind));
            continue;
        }

        if is_table_row(line) && i + 1 < lines.len() && is_table_separator(lines[i + 1].0) {
            events.push(BlockEvent::Start(BlockKind::Table));
            events.push(BlockEvent::TableAligns(parse_aligns(lines[i + 1].0)));
            for (cell, cell_offset) in split_cells(line, offset) {
                events.push(BlockEvent::TableCell {
                    text: cell,
                    offset: cell_offset,
                    header: true,
                });
            }
            events.push(BlockEvent::TableRowEnd);
            i += 2;
            while i < lines.len() && is_table_row(lines[i].0) {
                let (l, o) = lines[i];
                for (cell, cell_offset) in split_cells(l, o) {
                    events.push(BlockEvent::TableCell {
                        text: cell,
                        offset: cell_offset,
                        header: false,
                    });
                }
                events.push(BlockEvent::TableRowEnd);
                i += 1;
            }
            events.push(BlockEvent::End(BlockKind::Table));
            continue;
        }

        // paragraph: greedy run of plain lines
        events.push(BlockEvent::Start(BlockKind::Paragraph));
        while i < lines.len() {
            let (l, o) = lines[i];
            if l.trim().is_empty()
                || is_fence(l)
                || header_level(l).is_some()
                || is_rule(l)
                || l.trim_start().starts_with('>')
                || list_marker(l).is_some()
                || (is_table_row(l) && i + 1 < lines.len() && is_table_separator(lines[i + 1].0))
            {
                break;
            }
            events.push(BlockEvent::Line { text: l, offset: o });
            i += 1;
        }
        events.push(BlockEvent::End(BlockKind::Paragraph));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<BlockEvent<'_>> {
        LineScanner.scan(source)
    }

    #[test]
    fn headers_split_level_and_text() {
        let events = scan("## Title");
        assert_eq!(events[0], BlockEvent::Start(BlockKind::Header(2)));
        assert_eq!(
            events[1],
            BlockEvent::Line {
                text: "Title",
                offset: 3
            }
        );
    }

    #[test]
    fn seven_hashes_is_a_paragraph() {
        let events = scan("####### nope");
        assert_eq!(events[0], BlockEvent::Start(BlockKind::Paragraph));
    }

    #[test]
    fn blank_lines_split_paragraphs() {
        let events = scan("one\ntwo\n\nthree");
        let starts = events
            .iter()
            .filter(|e| matches!(e, BlockEvent::Start(BlockKind::Paragraph)))
            .count();
        assert_eq!(starts, 2);
    }

    #[test]
    fn fenced_code_keeps_raw_lines() {
        let events = scan("```\n# not a header\n```");
        assert_eq!(events[0], BlockEvent::Start(BlockKind::CodeBlock));
        assert_eq!(
            events[1],
            BlockEvent::Line {
                text: "# not a header",
                offset: 4
            }
        );
        assert_eq!(events[2], BlockEvent::End(BlockKind::CodeBlock));
    }

    #[test]
    fn quotes_recurse_into_inner_blocks() {
        let events = scan("> # inside\n> body");
        assert_eq!(events[0], BlockEvent::Start(BlockKind::Quote));
        assert_eq!(events[1], BlockEvent::Start(BlockKind::Header(1)));
        assert!(events.contains(&BlockEvent::End(BlockKind::Quote)));
    }

    #[test]
    fn ordered_list_keeps_its_start_number() {
        let events = scan("3. a\n4. b");
        assert_eq!(
            events[0],
            BlockEvent::Start(BlockKind::OrderedList { start: 3 })
        );
        let items = events
            .iter()
            .filter(|e| matches!(e, BlockEvent::Start(BlockKind::ListItem)))
            .count();
        assert_eq!(items, 2);
    }

    #[test]
    fn table_needs_a_separator_row() {
        let events = scan("| a | b |\n| --- | ---: |\n| 1 | 2 |");
        assert_eq!(events[0], BlockEvent::Start(BlockKind::Table));
        assert_eq!(
            events[1],
            BlockEvent::TableAligns(vec![None, Some(TextAlign::Right)])
        );
        let header_cells = events
            .iter()
            .filter(|e| matches!(e, BlockEvent::TableCell { header: true, .. }))
            .count();
        assert_eq!(header_cells, 2);

        // pipe line without a separator stays a paragraph
        let events = scan("| a | b |\nplain");
        assert_eq!(events[0], BlockEvent::Start(BlockKind::Paragraph));
    }

    #[test]
    fn cell_offsets_point_into_the_source() {
        let source = "| ab | cd |\n| - | - |";
        let events = scan(source);
        for event in &events {
            if let BlockEvent::TableCell { text, offset, .. } = event {
                assert_eq!(&source[*offset..*offset + text.len()], *text);
            }
        }
    }

    #[test]
    fn rules_match_three_or_more_markers() {
        assert_eq!(scan("---")[0], BlockEvent::Start(BlockKind::Rule));
        assert_eq!(scan("* * *")[0], BlockEvent::Start(BlockKind::Rule));
        assert_eq!(scan("--")[0], BlockEvent::Start(BlockKind::Paragraph));
    }
}
