use std::io::{self, Write};

/// Panel size in pixels.
pub const WIDTH: u32 = 128;
pub const HEIGHT: u32 = 64;

/// Character cell of the built-in 6x8 font.
pub const CELL_WIDTH: u32 = 6;
pub const CELL_HEIGHT: u32 = 8;

/// A small monochrome panel addressed in pixels.
pub trait Display {
    fn clear(&mut self);

    /// Draws `text` with its top-left corner at (x, y); anything past the
    /// panel edge is clipped.
    fn draw_text(&mut self, x: u32, y: u32, text: &str);

    fn hline(&mut self, x0: u32, x1: u32, y: u32);

    /// Pushes the buffered frame to the panel.
    fn flush(&mut self) -> io::Result<()>;
}

/// Renders the panel as a character grid, one cell per 6x8 pixels.
pub struct TextDisplay<W: Write> {
    out: W,
    grid: Vec<Vec<char>>,
    ansi: bool,
}

impl<W: Write> TextDisplay<W> {
    pub fn new(out: W, ansi: bool) -> Self {
        let cols = (WIDTH / CELL_WIDTH) as usize;
        let rows = (HEIGHT / CELL_HEIGHT) as usize;
        Self {
            out,
            grid: vec![vec![' '; cols]; rows],
            ansi,
        }
    }

    pub fn columns(&self) -> usize {
        self.grid.first().map_or(0, Vec::len)
    }

    /// Current frame, trailing blanks trimmed.
    pub fn rows(&self) -> Vec<String> {
        self.grid
            .iter()
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
            .collect()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn cell(&self, x: u32, y: u32) -> Option<(usize, usize)> {
        let (col, row) = ((x / CELL_WIDTH) as usize, (y / CELL_HEIGHT) as usize);
        (row < self.grid.len() && col < self.columns()).then_some((col, row))
    }
}

impl<W: Write> Display for TextDisplay<W> {
    fn clear(&mut self) {
        for row in &mut self.grid {
            row.fill(' ');
        }
    }

    fn draw_text(&mut self, x: u32, y: u32, text: &str) {
        let Some((col, row)) = self.cell(x, y) else {
            return;
        };
        for (slot, ch) in self.grid[row][col..].iter_mut().zip(text.chars()) {
            *slot = ch;
        }
    }

    fn hline(&mut self, x0: u32, x1: u32, y: u32) {
        let Some((start, row)) = self.cell(x0.min(x1), y) else {
            return;
        };
        let end = ((x0.max(x1) / CELL_WIDTH) as usize).min(self.columns() - 1);
        for slot in &mut self.grid[row][start..=end] {
            *slot = '-';
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.ansi {
            write!(self.out, "\x1b[2J\x1b[H")?;
        }
        for line in self.rows() {
            writeln!(self.out, "{}", line)?;
        }
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_size() {
        let display = TextDisplay::new(Vec::new(), false);
        assert_eq!(display.columns(), 21);
        assert_eq!(display.rows().len(), 8);
    }

    #[test]
    fn test_text_is_placed_and_clipped() {
        let mut display = TextDisplay::new(Vec::new(), false);
        display.draw_text(0, 0, "abcdefghijklmnopqrstuvwxyz");
        display.draw_text(12, 17, "hi");
        display.draw_text(0, 64, "off panel");

        let rows = display.rows();
        assert_eq!(rows[0], "abcdefghijklmnopqrstu");
        assert_eq!(rows[2], "  hi");
        assert!(rows[7].is_empty());
    }

    #[test]
    fn test_hline_and_clear() {
        let mut display = TextDisplay::new(Vec::new(), false);
        display.hline(0, 127, 14);
        assert_eq!(display.rows()[1], "-".repeat(21));

        display.clear();
        assert!(display.rows().iter().all(String::is_empty));
    }

    #[test]
    fn test_flush_writes_frame() {
        let mut display = TextDisplay::new(Vec::new(), true);
        display.draw_text(0, 8, "x");
        display.flush().unwrap();

        let text = String::from_utf8(display.into_inner()).unwrap();
        assert!(text.starts_with("\x1b[2J\x1b[H\nx\n"));
        assert_eq!(text.lines().count(), 8);
    }
}
