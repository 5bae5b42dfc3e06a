//! Terminal surface.
//!
//! [`TerminalSurface`] owns the emulator for one console: alacritty's [`Term`]
//! behind an `Arc<parking_lot::Mutex<>>` plus the VTE processor that feeds it.
//! It knows nothing about the transport; the controller writes remote bytes
//! into it and receives keyboard input from it through [`on_data`] handlers.
//!
//! # Fitting
//!
//! The grid size is a pure function of the container's pixel size, the
//! measured font cell and the padding, see [`fit_grid`]. Both axes are clamped
//! to at least one cell so a collapsed container still yields a usable grid.
//!
//! ```text
//! ContainerSize ─┐
//! CellSize ──────┼─ fit_grid ─→ GridSize ─→ Term::resize (only on change)
//! padding ───────┘
//! ```
//!
//! # Example
//!
//! ```
//! use gpui_vm_console::surface::{ContainerSize, SurfaceOptions, TerminalSurface};
//!
//! let mut surface =
//!     TerminalSurface::create(Some(ContainerSize::new(800.0, 480.0)), SurfaceOptions::default())
//!         .unwrap();
//! surface.write(b"\x1b[32mready\x1b[0m");
//! assert_eq!(surface.screen_text().lines().next(), Some("ready"));
//! ```
//!
//! [`on_data`]: TerminalSurface::on_data

use crate::event::{SurfaceEvent, SurfaceEventProxy};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line, Point};
use alacritty_terminal::term::cell::Flags;
use alacritty_terminal::term::{Config, Term, TermMode};
use alacritty_terminal::vte::ansi::Processor;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use thiserror::Error;

/// Smallest grid the surface will ever report.
pub const MIN_GRID: GridSize = GridSize { rows: 1, cols: 1 };

/// Pixel size of the element hosting the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContainerSize {
    pub width: f32,
    pub height: f32,
}

impl ContainerSize {
    pub const ZERO: Self = Self {
        width: 0.0,
        height: 0.0,
    };

    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Pixel size of one character cell, as measured from the font.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub width: f32,
    pub height: f32,
}

impl CellSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for CellSize {
    /// Approximation for a 14px monospace font until the real cell is measured.
    fn default() -> Self {
        Self {
            width: 14.0 * 0.6,
            height: 14.0 * 1.4,
        }
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridSize {
    pub rows: u16,
    pub cols: u16,
}

impl GridSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows: rows.max(MIN_GRID.rows),
            cols: cols.max(MIN_GRID.cols),
        }
    }
}

impl Dimensions for GridSize {
    fn total_lines(&self) -> usize {
        self.rows as usize
    }

    fn screen_lines(&self) -> usize {
        self.rows as usize
    }

    fn columns(&self) -> usize {
        self.cols as usize
    }
}

/// Options fixed at surface creation (the cell size is updated later).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceOptions {
    /// Initial cell size, replaced once the font has been measured.
    pub cell: CellSize,

    /// Padding in pixels on every side of the grid.
    pub padding: f32,

    /// Lines of scrollback kept by the emulator.
    pub scrollback: usize,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            cell: CellSize::default(),
            padding: 0.0,
            scrollback: 10_000,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("terminal surface needs a container element")]
    MissingContainer,
}

/// Handler invoked with each discrete chunk of user input.
pub type DataHandler = Box<dyn FnMut(&str)>;

/// Computes how many cells fit in `container` after removing `padding`.
///
/// Never returns fewer than one row or column, whatever the input.
pub fn fit_grid(container: ContainerSize, cell: CellSize, padding: f32) -> GridSize {
    let padding = padding.max(0.0);
    let width = (container.width - padding * 2.0).max(0.0);
    let height = (container.height - padding * 2.0).max(0.0);

    GridSize::new(cells_along(height, cell.height), cells_along(width, cell.width))
}

fn cells_along(available: f32, cell: f32) -> u16 {
    if cell.is_nan() || cell <= 0.0 || !available.is_finite() {
        return 0;
    }
    // `as` saturates, so absurd containers clamp to u16::MAX
    (available / cell).floor() as u16
}

/// The terminal emulator for one console, independent of any transport.
pub struct TerminalSurface {
    term: Arc<Mutex<Term<SurfaceEventProxy>>>,

    /// Kept outside the mutex, only the owning thread feeds bytes.
    parser: Processor,

    events: Receiver<SurfaceEvent>,
    container: ContainerSize,
    options: SurfaceOptions,
    grid: GridSize,
    data_handlers: Vec<DataHandler>,
    disposed: bool,
}

impl TerminalSurface {
    /// Creates the emulator bound to `container` and fits it once.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::MissingContainer`] when `container` is `None`.
    pub fn create(
        container: Option<ContainerSize>,
        options: SurfaceOptions,
    ) -> Result<Self, SurfaceError> {
        let container = container.ok_or(SurfaceError::MissingContainer)?;
        let grid = fit_grid(container, options.cell, options.padding);

        let (tx, events) = mpsc::channel();
        let config = Config {
            scrolling_history: options.scrollback,
            ..Config::default()
        };
        let term = Term::new(config, &grid, SurfaceEventProxy::new(tx));

        let mut surface = Self {
            term: Arc::new(Mutex::new(term)),
            parser: Processor::new(),
            events,
            container,
            options,
            grid,
            data_handlers: Vec::new(),
            disposed: false,
        };
        surface.fit();
        Ok(surface)
    }

    /// Recomputes the grid for the current container and cell size.
    ///
    /// The emulator is only resized when the result differs from the current
    /// grid, so repeated calls with unchanged inputs are free.
    pub fn fit(&mut self) -> GridSize {
        let grid = fit_grid(self.container, self.options.cell, self.options.padding);
        if grid != self.grid && !self.disposed {
            self.term.lock().resize(grid);
            self.grid = grid;
        }
        self.grid
    }

    pub fn set_container(&mut self, container: ContainerSize) {
        self.container = container;
    }

    pub fn set_cell_size(&mut self, cell: CellSize) {
        self.options.cell = cell;
    }

    /// Registers a handler for user input chunks.
    pub fn on_data(&mut self, handler: impl FnMut(&str) + 'static) {
        if !self.disposed {
            self.data_handlers.push(Box::new(handler));
        }
    }

    /// Delivers one input chunk (a keystroke or a paste) to every handler.
    pub fn feed_input(&mut self, chunk: &str) {
        if self.disposed || chunk.is_empty() {
            return;
        }
        for handler in &mut self.data_handlers {
            handler(chunk);
        }
    }

    /// Feeds bytes through the VTE processor.
    ///
    /// An escape sequence split across calls is completed by the next call.
    pub fn write(&mut self, bytes: &[u8]) {
        if self.disposed {
            return;
        }
        let mut term = self.term.lock();
        self.parser.advance(&mut *term, bytes);
    }

    /// Writes a synthetic status line. Remote output never goes through here.
    pub fn write_line(&mut self, text: &str) {
        self.write(text.as_bytes());
        self.write(b"\r\n");
    }

    /// Full reset (RIS): clears the screen, scrollback and modes.
    pub fn clear(&mut self) {
        self.write(b"\x1bc");
    }

    /// Releases input handlers and stops accepting writes. Safe to repeat.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.data_handlers.clear();
        while self.events.try_recv().is_ok() {}
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Takes the emulator events raised since the last call.
    pub fn drain_events(&self) -> Vec<SurfaceEvent> {
        self.events.try_iter().collect()
    }

    pub fn grid_size(&self) -> GridSize {
        self.grid
    }

    pub fn container(&self) -> ContainerSize {
        self.container
    }

    pub fn cell_size(&self) -> CellSize {
        self.options.cell
    }

    /// Current terminal mode, used to pick cursor-key and paste encodings.
    pub fn mode(&self) -> TermMode {
        *self.term.lock().mode()
    }

    /// Shared handle to the emulator for the renderer.
    pub fn term_arc(&self) -> Arc<Mutex<Term<SurfaceEventProxy>>> {
        Arc::clone(&self.term)
    }

    /// The visible screen as text, trailing blanks trimmed from each row.
    pub fn screen_text(&self) -> String {
        let term = self.term.lock();
        let grid = term.grid();

        let mut rows = Vec::with_capacity(grid.screen_lines());
        for line in 0..grid.screen_lines() {
            let mut row = String::with_capacity(grid.columns());
            for col in 0..grid.columns() {
                let cell = &grid[Point::new(Line(line as i32), Column(col))];
                if cell.flags.contains(Flags::WIDE_CHAR_SPACER) {
                    continue;
                }
                row.push(if cell.c == '\0' { ' ' } else { cell.c });
            }
            rows.push(row.trim_end().to_string());
        }
        rows.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alacritty_terminal::vte::ansi::{Color, NamedColor};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn options(cell: CellSize) -> SurfaceOptions {
        SurfaceOptions {
            cell,
            padding: 0.0,
            scrollback: 100,
        }
    }

    fn surface(width: f32, height: f32) -> TerminalSurface {
        TerminalSurface::create(
            Some(ContainerSize::new(width, height)),
            options(CellSize::new(8.0, 16.0)),
        )
        .unwrap()
    }

    #[test]
    fn test_fit_grid_floors_to_whole_cells() {
        let grid = fit_grid(
            ContainerSize::new(800.0, 600.0),
            CellSize::new(8.0, 16.0),
            0.0,
        );
        assert_eq!(grid, GridSize { rows: 37, cols: 100 });
    }

    #[test]
    fn test_fit_grid_subtracts_padding() {
        let grid = fit_grid(
            ContainerSize::new(816.0, 496.0),
            CellSize::new(8.0, 16.0),
            8.0,
        );
        assert_eq!(grid, GridSize { rows: 30, cols: 100 });
    }

    #[test]
    fn test_fit_grid_minimum_viable_size() {
        let cell = CellSize::new(8.0, 16.0);
        assert_eq!(fit_grid(ContainerSize::ZERO, cell, 0.0), MIN_GRID);
        assert_eq!(fit_grid(ContainerSize::new(3.0, 5.0), cell, 0.0), MIN_GRID);
        assert_eq!(fit_grid(ContainerSize::new(100.0, 100.0), cell, 80.0), MIN_GRID);
        assert_eq!(
            fit_grid(ContainerSize::new(f32::NAN, -20.0), cell, 0.0),
            MIN_GRID
        );
        assert_eq!(
            fit_grid(ContainerSize::new(100.0, 100.0), CellSize::new(0.0, 0.0), 0.0),
            MIN_GRID
        );
    }

    #[test]
    fn test_fit_grid_positive_sizes_never_zero() {
        let cell = CellSize::new(7.5, 17.25);
        for width in [1.0, 7.0, 8.0, 63.3, 640.0, 1920.0] {
            for height in [1.0, 16.0, 18.0, 480.0, 1080.0] {
                let grid = fit_grid(ContainerSize::new(width, height), cell, 4.0);
                assert!(grid.rows >= 1 && grid.cols >= 1, "{width}x{height}");
            }
        }
    }

    #[test]
    fn test_create_without_container_fails() {
        let result = TerminalSurface::create(None, SurfaceOptions::default());
        assert_eq!(result.err(), Some(SurfaceError::MissingContainer));
    }

    #[test]
    fn test_create_zero_size_container() {
        let surface = surface(0.0, 0.0);
        assert_eq!(surface.grid_size(), MIN_GRID);
        assert_eq!(surface.term_arc().lock().grid().columns(), 1);
    }

    #[test]
    fn test_fit_is_idempotent() {
        let mut surface = surface(800.0, 480.0);
        let first = surface.fit();
        let second = surface.fit();
        assert_eq!(first, second);
        assert_eq!(first, GridSize { rows: 30, cols: 100 });
    }

    #[test]
    fn test_fit_resizes_emulator() {
        let mut surface = surface(800.0, 480.0);
        surface.set_container(ContainerSize::new(640.0, 320.0));
        let grid = surface.fit();

        assert_eq!(grid, GridSize { rows: 20, cols: 80 });
        let term = surface.term_arc();
        let term = term.lock();
        assert_eq!(term.grid().columns(), 80);
        assert_eq!(term.grid().screen_lines(), 20);
    }

    #[test]
    fn test_fit_after_cell_measurement() {
        let mut surface = surface(800.0, 480.0);
        surface.set_cell_size(CellSize::new(10.0, 20.0));
        assert_eq!(surface.fit(), GridSize { rows: 24, cols: 80 });
    }

    #[test]
    fn test_write_partial_escape_sequence() {
        let mut surface = surface(800.0, 480.0);
        surface.write(b"\x1b[3");
        surface.write(b"1mred\x1b[0m");

        assert_eq!(surface.screen_text().lines().next(), Some("red"));
        let term = surface.term_arc();
        let term = term.lock();
        let cell = &term.grid()[Point::new(Line(0), Column(0))];
        assert_eq!(cell.fg, Color::Named(NamedColor::Red));
    }

    #[test]
    fn test_write_is_verbatim() {
        let mut surface = surface(800.0, 480.0);
        surface.write(b"one\ntwo");

        // A bare LF moves down without returning the carriage.
        let text = surface.screen_text();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("one"));
        assert_eq!(lines.next(), Some("   two"));
    }

    #[test]
    fn test_write_line_appends_crlf() {
        let mut surface = surface(800.0, 480.0);
        surface.write_line("Connected");
        surface.write(b"$ ");

        let text = surface.screen_text();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Connected"));
        assert_eq!(lines.next(), Some("$"));
    }

    #[test]
    fn test_clear_resets_screen() {
        let mut surface = surface(800.0, 480.0);
        surface.write(b"old output");
        surface.clear();

        assert!(surface.screen_text().trim().is_empty());
    }

    #[test]
    fn test_on_data_invoked_once_per_chunk() {
        let mut surface = surface(800.0, 480.0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        surface.on_data(move |chunk| sink.borrow_mut().push(chunk.to_string()));

        surface.feed_input("l");
        surface.feed_input("s");
        surface.feed_input("");
        surface.feed_input("pasted\ntext");

        assert_eq!(*seen.borrow(), vec!["l", "s", "pasted\ntext"]);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut surface = surface(800.0, 480.0);
        let seen = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&seen);
        surface.on_data(move |_| *sink.borrow_mut() += 1);
        surface.write(b"kept");

        surface.dispose();
        surface.dispose();

        assert!(surface.is_disposed());
        surface.feed_input("x");
        surface.write(b" dropped");
        assert_eq!(*seen.borrow(), 0);
        assert_eq!(surface.screen_text().lines().next(), Some("kept"));
    }

    #[test]
    fn test_cursor_report_becomes_reply() {
        let mut surface = surface(800.0, 480.0);
        surface.write(b"\x1b[6n");

        let events = surface.drain_events();
        assert!(events.contains(&SurfaceEvent::Reply("\x1b[1;1R".to_string())));
        assert!(surface.drain_events().is_empty());
    }

    #[test]
    fn test_title_event() {
        let mut surface = surface(800.0, 480.0);
        surface.write(b"\x1b]2;htop\x07");

        assert!(
            surface
                .drain_events()
                .contains(&SurfaceEvent::Title("htop".to_string()))
        );
    }
}
