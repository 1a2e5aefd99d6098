//! Document layout: a single top-to-bottom cursor pass over the flat
//! element list. Vertical margins collapse between neighbors, tables
//! balance their columns inside the available width, over-wide
//! content gets a horizontal scroll viewport, and a height or line
//! budget cuts the page off under the cut element's overflow policy.

use std::sync::Arc;

use rayon::prelude::*;

use crate::builder::DocumentContent;
use crate::element::{ElementKind, Table};
use crate::page::{
    Page, PageRegion, RegionBorder, RegionKind, ScrollInfo, TableRegion, TableRegionCell,
};
use crate::style::{BorderSides, StyleSheet, TextOverflow, VerticalAlign};
use crate::text_engine::{ShapeConstraints, ShapedText, TextEngine, WidthMode};
use crate::types::{Margins, Point, Pt, Rect};

#[derive(Debug, Clone)]
pub struct LayoutOptions {
    pub width: Pt,
    /// Height budget; `Pt::MAX` means unbounded.
    pub max_height: Pt,
    /// Total line budget for the page; elements shape against whatever
    /// is left of it.
    pub max_lines: Option<usize>,
    pub padding: Margins,
}

impl LayoutOptions {
    pub fn new(width: Pt) -> Self {
        Self {
            width,
            max_height: Pt::MAX,
            max_lines: None,
            padding: Margins::default(),
        }
    }
}

pub struct LayoutEngine {
    engine: Arc<dyn TextEngine>,
    sheet: StyleSheet,
}

impl LayoutEngine {
    pub fn new(engine: Arc<dyn TextEngine>, sheet: StyleSheet) -> Self {
        Self { engine, sheet }
    }

    pub fn layout(&self, content: &DocumentContent, options: &LayoutOptions) -> Page {
        let mut page = Page::empty(options.width, options.max_height);
        let budget_active = !options.max_height.is_unbounded();
        let budget = options.max_height - options.padding.bottom;
        let mut y = options.padding.top;
        let mut pending_margin = Pt::ZERO;
        let mut region_of_element: Vec<Option<usize>> = vec![None; content.elements.len()];
        let mut widest = Pt::ZERO;
        let mut lines_placed = 0usize;

        'elements: for (index, element) in content.elements.iter().enumerate() {
            let el = element.as_ref();
            let line_budget = options.max_lines.map(|m| m.saturating_sub(lines_placed));
            if line_budget == Some(0) {
                page.full = true;
                if el.block.overflow == TextOverflow::Ellipsis {
                    self.ellipsize_last_region(&mut page, &mut widest);
                }
                break 'elements;
            }
            // adjacent vertical margins collapse to the larger one
            let y_top = y + pending_margin.max(el.block.margin.top);
            let x = options.padding.left + el.block.margin.left;
            let mut avail =
                options.width - options.padding.right - el.block.margin.right - x;
            if let Some(max) = el.block.max_width {
                avail = avail.min(max);
            }
            if avail <= Pt::ZERO {
                pending_margin = el.block.margin.bottom;
                continue;
            }
            widest = widest.max(x + avail + options.padding.right);

            match &el.kind {
                ElementKind::Rule => {
                    let height = el.border.width;
                    if budget_active && y_top + height > budget {
                        page.full = true;
                        break 'elements;
                    }
                    let rect = Rect::from_ltwh(x, y_top, avail, height);
                    region_of_element[index] = Some(page.regions.len());
                    page.regions.push(PageRegion {
                        element: element.clone(),
                        rect,
                        content_origin: Point::new(x, y_top),
                        border: Some(RegionBorder {
                            rect,
                            style: el.border,
                            sides: el.border_sides,
                        }),
                        kind: RegionKind::Rule,
                        scroll: None,
                    });
                    y = y_top + height;
                    pending_margin = el.block.margin.bottom;
                }
                ElementKind::Paragraph(para) => {
                    let pad = el.block.padding;
                    let inset = border_insets(el);
                    let left = pad.left + inset.left;
                    let top = pad.top + inset.top;
                    let chrome_h = left + pad.right + inset.right;
                    let chrome_v = top + pad.bottom + inset.bottom;
                    let inner_avail = avail - chrome_h;
                    let (shape_width, mode) = if el.scroll_x {
                        (Pt::MAX, WidthMode::AtMost)
                    } else {
                        (inner_avail, WidthMode::Definite)
                    };
                    let max_lines = match (el.block.max_lines, line_budget) {
                        (Some(a), Some(b)) => Some(a.min(b)),
                        (a, b) => a.or(b),
                    };
                    let constraints = ShapeConstraints {
                        width: shape_width,
                        mode,
                        max_height: el.block.max_height.unwrap_or(Pt::MAX),
                        max_lines,
                        hanging_indent: el.hanging_indent,
                    };
                    let mut shaped = self.engine.shape(para, &constraints);
                    if shaped.truncated && el.block.overflow == TextOverflow::Ellipsis {
                        let right =
                            self.engine.append_ellipsis(para, &mut shaped, inner_avail);
                        widest = widest.max(x + left + right + pad.right + inset.right);
                    }
                    let mut height = chrome_v + shaped.height;
                    let mut last_on_page = false;

                    if budget_active && y_top + height > budget {
                        page.full = true;
                        let remaining = budget - y_top - chrome_v;
                        let refit = self.engine.shape(
                            para,
                            &ShapeConstraints {
                                max_height: remaining,
                                ..constraints
                            },
                        );
                        let fits_one_line = remaining > Pt::ZERO
                            && refit
                                .lines
                                .first()
                                .is_some_and(|line| line.bottom <= remaining);
                        if !fits_one_line {
                            if el.block.overflow == TextOverflow::Ellipsis {
                                self.ellipsize_last_region(&mut page, &mut widest);
                            }
                            break 'elements;
                        }
                        shaped = refit;
                        if el.block.overflow == TextOverflow::Ellipsis {
                            let right =
                                self.engine.append_ellipsis(para, &mut shaped, inner_avail);
                            widest = widest.max(x + left + right + pad.right + inset.right);
                        }
                        height = chrome_v + shaped.height;
                        last_on_page = true;
                    }
                    // the page line budget, unlike a style cap, ends layout
                    if shaped.truncated && line_budget.is_some_and(|b| shaped.lines.len() >= b) {
                        page.full = true;
                        last_on_page = true;
                    }

                    let scroll = (el.scroll_x && shaped.width > inner_avail).then(|| {
                        ScrollInfo::new(
                            Rect::from_ltwh(
                                x + left,
                                y_top + top,
                                inner_avail,
                                shaped.height,
                            ),
                            shaped.width,
                        )
                    });
                    let rect = Rect::from_ltwh(x, y_top, avail, height);
                    let border = (el.border_sides != BorderSides::None).then(|| RegionBorder {
                        rect,
                        style: el.border,
                        sides: el.border_sides,
                    });
                    lines_placed += shaped.lines.len();
                    region_of_element[index] = Some(page.regions.len());
                    page.regions.push(PageRegion {
                        element: element.clone(),
                        rect,
                        content_origin: Point::new(x + left, y_top + top),
                        border,
                        kind: RegionKind::Paragraph(shaped),
                        scroll,
                    });
                    y = y_top + height;
                    pending_margin = el.block.margin.bottom;
                    if last_on_page {
                        break 'elements;
                    }
                }
                ElementKind::Table(table) => {
                    let mut region = self.layout_table(table, avail);
                    let mut last_on_page = false;
                    if let Some(bgt) = line_budget {
                        let mut total = 0usize;
                        let keep = region
                            .cells
                            .iter()
                            .take_while(|row| {
                                total += table_row_lines(row);
                                total <= bgt
                            })
                            .count();
                        if keep < region.cells.len() {
                            page.full = true;
                            if keep == 0 {
                                if el.block.overflow == TextOverflow::Ellipsis {
                                    self.ellipsize_last_region(&mut page, &mut widest);
                                }
                                break 'elements;
                            }
                            region.cells.truncate(keep);
                            region.height = region.cells[keep - 1][0].rect.bottom();
                            last_on_page = true;
                        }
                    }
                    if budget_active && y_top + region.height > budget {
                        page.full = true;
                        let remaining = budget - y_top;
                        let keep = region
                            .cells
                            .iter()
                            .take_while(|row| {
                                row.first().is_some_and(|c| c.rect.bottom() <= remaining)
                            })
                            .count();
                        if keep == 0 {
                            if el.block.overflow == TextOverflow::Ellipsis {
                                self.ellipsize_last_region(&mut page, &mut widest);
                            }
                            break 'elements;
                        }
                        region.cells.truncate(keep);
                        region.height = region.cells[keep - 1][0].rect.bottom();
                        last_on_page = true;
                    }
                    lines_placed += region.cells.iter().map(|r| table_row_lines(r)).sum::<usize>();

                    let origin = Point::new(x, y_top);
                    for row in &mut region.cells {
                        for cell in row {
                            cell.rect = cell.rect.translate(origin);
                            cell.content_origin = cell.content_origin + origin;
                        }
                    }
                    let scroll = (region.width > avail).then(|| {
                        ScrollInfo::new(
                            Rect::from_ltwh(x, y_top, avail, region.height),
                            region.width,
                        )
                    });
                    let rect =
                        Rect::from_ltwh(x, y_top, region.width.min(avail), region.height);
                    let height = region.height;
                    region_of_element[index] = Some(page.regions.len());
                    page.regions.push(PageRegion {
                        element: element.clone(),
                        rect,
                        content_origin: origin,
                        border: None,
                        kind: RegionKind::Table(region),
                        scroll,
                    });
                    y = y_top + height;
                    pending_margin = el.block.margin.bottom;
                    if last_on_page {
                        break 'elements;
                    }
                }
            }
        }

        if !page.full {
            y += pending_margin;
        }
        page.height = y + options.padding.bottom;
        if budget_active {
            page.height = page.height.min(options.max_height);
        }
        page.width = options.width.max(widest);
        page.line_count = page.regions.iter().map(PageRegion::line_count).sum();
        self.collect_quote_rules(&mut page, content, &region_of_element);
        page
    }

    /// Spanning left border per quote run, from the first region's top
    /// to the last region's bottom.
    fn collect_quote_rules(
        &self,
        page: &mut Page,
        content: &DocumentContent,
        region_of_element: &[Option<usize>],
    ) {
        for range in &content.quote_ranges {
            let regions: Vec<usize> = range
                .clone()
                .filter_map(|i| region_of_element.get(i).copied().flatten())
                .collect();
            let (Some(&first), Some(&last)) = (regions.first(), regions.last()) else {
                continue;
            };
            let top = page.regions[first].rect.top();
            let bottom = page.regions[last].rect.bottom();
            let left = regions
                .iter()
                .map(|&i| page.regions[i].rect.left())
                .fold(Pt::MAX, Pt::min)
                - self.sheet.quote.block.padding.left;
            page.quote_rules.push(RegionBorder {
                rect: Rect::from_ltwh(left, top, self.sheet.quote.border.width, bottom - top),
                style: self.sheet.quote.border,
                sides: BorderSides::Left,
            });
        }
    }

    /// Appends an ellipsis to the last paragraph region when the next
    /// element could not place at all.
    fn ellipsize_last_region(&self, page: &mut Page, widest: &mut Pt) {
        for region in page.regions.iter_mut().rev() {
            let RegionKind::Paragraph(shaped) = &mut region.kind else {
                continue;
            };
            let ElementKind::Paragraph(para) = &region.element.kind else {
                continue;
            };
            let inset = border_insets(region.element.as_ref());
            let width = region.rect.width
                - region.element.block.padding.left
                - region.element.block.padding.right
                - inset.left
                - inset.right;
            let right = self.engine.append_ellipsis(para, shaped, width);
            *widest = (*widest).max(region.content_origin.x + right);
            return;
        }
    }

    fn layout_table(&self, table: &Table, avail: Pt) -> TableRegion {
        let pad = self.sheet.table_cell.block.padding;
        let pad_h = pad.left + pad.right;
        let min_width = self.sheet.table_cell.block.min_width;

        // measure every cell unconstrained, in parallel
        let engine = &*self.engine;
        let naturals: Vec<Vec<Pt>> = table
            .rows
            .par_iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        engine
                            .shape(&cell.content, &ShapeConstraints::measure())
                            .width
                            + pad_h
                    })
                    .collect()
            })
            .collect();
        let mut col_natural = vec![Pt::ZERO; table.columns];
        for row in &naturals {
            for (c, w) in row.iter().enumerate() {
                col_natural[c] = col_natural[c].max(*w);
            }
        }
        let widths = balance_columns(&col_natural, avail, min_width);

        let shaped: Vec<Vec<ShapedText>> = table
            .rows
            .par_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(c, cell)| {
                        engine.shape(
                            &cell.content,
                            &ShapeConstraints::definite((widths[c] - pad_h).max(Pt::ZERO)),
                        )
                    })
                    .collect()
            })
            .collect();

        let mut xs = vec![Pt::ZERO; table.columns + 1];
        for c in 0..table.columns {
            xs[c + 1] = xs[c] + widths[c];
        }
        let mut cells = Vec::with_capacity(table.rows.len());
        let mut y = Pt::ZERO;
        for (r, row) in table.rows.iter().enumerate() {
            let row_height = row
                .iter()
                .enumerate()
                .map(|(c, _)| shaped[r][c].height + pad.top + pad.bottom)
                .fold(Pt::ZERO, Pt::max);
            let mut out_row = Vec::with_capacity(row.len());
            for (c, cell) in row.iter().enumerate() {
                let rect = Rect::from_ltwh(xs[c], y, widths[c], row_height);
                let slack = row_height - pad.top - pad.bottom - shaped[r][c].height;
                let voffset = match cell.valign {
                    VerticalAlign::Top => Pt::ZERO,
                    VerticalAlign::Middle => slack / 2,
                    VerticalAlign::Bottom => slack,
                };
                out_row.push(TableRegionCell {
                    shaped: shaped[r][c].clone(),
                    rect,
                    content_origin: Point::new(xs[c] + pad.left, y + pad.top + voffset),
                });
            }
            cells.push(out_row);
            y += row_height;
        }
        TableRegion {
            cells,
            width: xs[table.columns],
            height: y,
        }
    }
}

/// Width taken up by the drawn border on each side. Text lays out
/// inside the border, not under it.
fn border_insets(el: &crate::element::Element) -> Margins {
    let w = el.border.width;
    match el.border_sides {
        BorderSides::None => Margins::default(),
        BorderSides::Left => Margins {
            left: w,
            ..Margins::default()
        },
        BorderSides::Top => Margins {
            top: w,
            ..Margins::default()
        },
        BorderSides::Rect => Margins {
            left: w,
            top: w,
            right: w,
            bottom: w,
        },
    }
}

fn table_row_lines(row: &[TableRegionCell]) -> usize {
    row.iter().map(|c| c.shaped.lines.len()).max().unwrap_or(0)
}

/// Distributes `budget` over columns. Columns narrower than their fair
/// share keep their natural width; the rest split what remains evenly.
/// Minimum widths are restored afterwards by shaving the wide columns.
fn balance_columns(naturals: &[Pt], budget: Pt, min_width: Pt) -> Vec<Pt> {
    let n = naturals.len();
    let mut widths = naturals.to_vec();
    let total: Pt = naturals.iter().copied().sum();
    if n == 0 || total <= budget {
        return widths;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| naturals[i]);
    let mut rest = budget;
    let mut remaining = n as i32;
    for (pos, &i) in order.iter().enumerate() {
        let fair = rest / remaining;
        if naturals[i] <= fair {
            widths[i] = naturals[i];
            rest -= naturals[i];
            remaining -= 1;
        } else {
            for &j in &order[pos..] {
                widths[j] = fair;
            }
            break;
        }
    }

    let mut deficit = Pt::ZERO;
    let mut adjustable = 0;
    for i in 0..n {
        let floor = min_width.min(naturals[i]);
        if widths[i] < floor {
            deficit += floor - widths[i];
            widths[i] = floor;
        } else if widths[i] > floor {
            adjustable += 1;
        }
    }
    if deficit > Pt::ZERO && adjustable > 0 {
        let cut = deficit / adjustable;
        for i in 0..n {
            let floor = min_width.min(naturals[i]);
            if widths[i] > floor {
                widths[i] = (widths[i] - cut).max(floor);
            }
        }
    }
    widths
}
