//! Paints the console grid onto a GPUI canvas.
//!
//! ```text
//! Term grid ─→ layout_row ─→ RowLayout { backgrounds, runs }
//!                                 │
//!         paint: default bg ─→ row backgrounds ─→ text runs ─→ cursor
//! ```
//!
//! Adjacent cells with the same style share one shaped text run, and adjacent
//! cells with the same background share one quad. Cells with the default
//! background produce no quad at all.

use crate::colors::ColorPalette;
use crate::event::SurfaceEventProxy;
use crate::surface::CellSize;
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line, Point as GridPoint};
use alacritty_terminal::term::cell::{Cell, Flags};
use alacritty_terminal::term::color::Colors;
use alacritty_terminal::term::{Term, TermMode};
use alacritty_terminal::vte::ansi::{Color, NamedColor};
use gpui::{
    App, Bounds, Edges, Font, FontFeatures, FontStyle, FontWeight, Hsla, Pixels, Point, SharedString,
    Size, TextRun, UnderlineStyle, Window, fill, px, quad, transparent_black,
};

/// Cells on one row sharing a style.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub start_col: usize,
    pub text: String,
    pub fg: Hsla,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl TextSpan {
    fn same_style(&self, other: &TextSpan) -> bool {
        self.fg == other.fg
            && self.bold == other.bold
            && self.italic == other.italic
            && self.underline == other.underline
    }
}

/// Half-open column range `[start_col, end_col)` with a non-default background.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSpan {
    pub start_col: usize,
    pub end_col: usize,
    pub color: Hsla,
}

#[derive(Debug, Default, PartialEq)]
pub struct RowLayout {
    pub backgrounds: Vec<BackgroundSpan>,
    pub runs: Vec<TextSpan>,
}

#[derive(Clone)]
pub struct ConsoleRenderer {
    pub font_family: SharedString,
    pub font_size: Pixels,
    pub line_height_multiplier: f32,
    pub palette: ColorPalette,
    cell_width: Pixels,
    cell_height: Pixels,
}

impl ConsoleRenderer {
    pub fn new(
        font_family: impl Into<SharedString>,
        font_size: Pixels,
        line_height_multiplier: f32,
        palette: ColorPalette,
    ) -> Self {
        Self {
            font_family: font_family.into(),
            font_size,
            line_height_multiplier,
            palette,
            cell_width: font_size * 0.6,
            cell_height: font_size * 1.4 * line_height_multiplier,
        }
    }

    pub fn cell_size(&self) -> CellSize {
        CellSize::new(self.cell_width.into(), self.cell_height.into())
    }

    fn font(&self, bold: bool, italic: bool) -> Font {
        Font {
            family: self.font_family.clone(),
            features: FontFeatures::default(),
            fallbacks: None,
            weight: if bold { FontWeight::BOLD } else { FontWeight::NORMAL },
            style: if italic { FontStyle::Italic } else { FontStyle::Normal },
        }
    }

    /// Measures the cell from the font using `│`, which spans the full cell
    /// height in terminal fonts.
    pub fn measure_cell(&mut self, window: &mut Window) -> CellSize {
        let run = TextRun {
            len: "│".len(),
            font: self.font(false, false),
            color: gpui::black(),
            background_color: None,
            underline: None,
            strikethrough: None,
        };
        let shaped = window
            .text_system()
            .shape_line("│".into(), self.font_size, &[run], None);

        if shaped.width > px(0.0) {
            self.cell_width = shaped.width;
        }
        let line_height = (shaped.ascent + shaped.descent).ceil();
        if line_height > px(0.0) {
            self.cell_height = line_height * self.line_height_multiplier;
        }
        self.cell_size()
    }

    /// Groups one row of cells into background spans and text runs.
    pub fn layout_row(&self, cells: impl IntoIterator<Item = (usize, Cell)>, colors: &Colors) -> RowLayout {
        let default_bg = self.palette.resolve(Color::Named(NamedColor::Background), colors);
        let mut layout = RowLayout::default();

        for (col, cell) in cells {
            if cell.flags.contains(Flags::WIDE_CHAR_SPACER) {
                continue;
            }
            let inverse = cell.flags.contains(Flags::INVERSE);
            let (fg, bg) = if inverse { (cell.bg, cell.fg) } else { (cell.fg, cell.bg) };
            let fg = self.palette.resolve(fg, colors);
            let bg = self.palette.resolve(bg, colors);

            if bg != default_bg {
                match layout.backgrounds.last_mut() {
                    Some(span) if span.color == bg && span.end_col == col => span.end_col = col + 1,
                    _ => layout.backgrounds.push(BackgroundSpan {
                        start_col: col,
                        end_col: col + 1,
                        color: bg,
                    }),
                }
            }

            let ch = if cell.c == '\0' { ' ' } else { cell.c };
            let span = TextSpan {
                start_col: col,
                text: ch.to_string(),
                fg,
                bold: cell.flags.contains(Flags::BOLD),
                italic: cell.flags.contains(Flags::ITALIC),
                underline: cell.flags.contains(Flags::UNDERLINE),
            };
            match layout.runs.last_mut() {
                Some(run) if run.same_style(&span) => run.text.push(ch),
                _ => layout.runs.push(span),
            }
        }

        layout.runs.retain(|run| !run.text.trim().is_empty());
        layout
    }

    /// Paints the background with a single line of text at the top left, used
    /// while the grid itself is hidden.
    pub fn paint_notice(
        &self,
        bounds: Bounds<Pixels>,
        padding: Pixels,
        text: &str,
        color: Hsla,
        window: &mut Window,
        cx: &mut App,
    ) {
        window.paint_quad(fill(bounds, self.palette.background()));
        if text.is_empty() {
            return;
        }

        let run = TextRun {
            len: text.len(),
            font: self.font(true, false),
            color,
            background_color: None,
            underline: None,
            strikethrough: None,
        };
        let shaped = window.text_system().shape_line(
            SharedString::from(text.to_string()),
            self.font_size,
            &[run],
            None,
        );
        let origin = bounds.origin + Point::new(padding, padding);
        let _ = shaped.paint(origin, self.cell_height, window, cx);
    }

    pub fn paint(
        &self,
        bounds: Bounds<Pixels>,
        padding: Pixels,
        term: &Term<SurfaceEventProxy>,
        window: &mut Window,
        cx: &mut App,
    ) {
        let grid = term.grid();
        let colors = term.colors();

        window.paint_quad(quad(
            bounds,
            px(0.0),
            self.palette.resolve(Color::Named(NamedColor::Background), colors),
            Edges::<Pixels>::default(),
            transparent_black(),
            Default::default(),
        ));

        let origin = bounds.origin + Point::new(padding, padding);
        let text_offset = (self.cell_height - self.cell_height / self.line_height_multiplier) / 2.0;

        for row in 0..grid.screen_lines() {
            let cells = (0..grid.columns())
                .map(|col| (col, grid[GridPoint::new(Line(row as i32), Column(col))].clone()));
            let layout = self.layout_row(cells, colors);
            let y = origin.y + self.cell_height * row as f32;

            for span in &layout.backgrounds {
                let span_bounds = Bounds {
                    origin: Point::new(origin.x + self.cell_width * span.start_col as f32, y),
                    size: Size {
                        width: self.cell_width * (span.end_col - span.start_col) as f32,
                        height: self.cell_height,
                    },
                };
                window.paint_quad(quad(
                    span_bounds,
                    px(0.0),
                    span.color,
                    Edges::<Pixels>::default(),
                    transparent_black(),
                    Default::default(),
                ));
            }

            for run in layout.runs {
                let text_run = TextRun {
                    len: run.text.len(),
                    font: self.font(run.bold, run.italic),
                    color: run.fg,
                    background_color: None,
                    underline: run.underline.then_some(UnderlineStyle {
                        thickness: px(1.0),
                        color: Some(run.fg),
                        wavy: false,
                    }),
                    strikethrough: None,
                };
                let shaped =
                    window
                        .text_system()
                        .shape_line(run.text.into(), self.font_size, &[text_run], None);
                let position = Point::new(
                    origin.x + self.cell_width * run.start_col as f32,
                    y + text_offset,
                );
                let _ = shaped.paint(position, self.cell_height, window, cx);
            }
        }

        if term.mode().contains(TermMode::SHOW_CURSOR) {
            let cursor = grid.cursor.point;
            let cursor_bounds = Bounds {
                origin: Point::new(
                    origin.x + self.cell_width * cursor.column.0 as f32,
                    origin.y + self.cell_height * cursor.line.0 as f32,
                ),
                size: Size {
                    width: self.cell_width,
                    height: self.cell_height,
                },
            };
            let mut color = self.palette.resolve(Color::Named(NamedColor::Cursor), colors);
            color.a = 0.7;
            window.paint_quad(quad(
                cursor_bounds,
                px(0.0),
                color,
                Edges::<Pixels>::default(),
                transparent_black(),
                Default::default(),
            ));
        }
    }
}
