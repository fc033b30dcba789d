use super::track::Track;
use std::io::{self, Write};

const COLS: usize = 72;
const ROWS: usize = 24;

/// Draws a top-down ASCII view of the track and the car to stdout.
pub struct AsciiRenderer {
    background: Vec<Vec<char>>,
    bounds: (f32, f32, f32, f32),
}

impl AsciiRenderer {
    pub fn new(track: &Track) -> Self {
        let grid = track.grid();
        let bounds = grid.bounds();
        let (min_x, min_y, max_x, max_y) = bounds;
        let cell_w = (max_x - min_x) / COLS as f32;
        let cell_h = (max_y - min_y) / ROWS as f32;

        // Row 0 is the top of the screen, i.e. the largest y.
        let background = (0..ROWS)
            .map(|row| {
                let y = max_y - (row as f32 + 0.5) * cell_h;
                (0..COLS)
                    .map(|col| {
                        let x = min_x + (col as f32 + 0.5) * cell_w;
                        if grid.is_free(x, y) { '.' } else { ' ' }
                    })
                    .collect()
            })
            .collect();

        Self { background, bounds }
    }

    /// Screen cell of a world position, if it is on screen.
    fn cell(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let (min_x, min_y, max_x, max_y) = self.bounds;
        if x < min_x || x >= max_x || y < min_y || y >= max_y {
            return None;
        }
        let col = ((x - min_x) / (max_x - min_x) * COLS as f32) as usize;
        let row = ((max_y - y) / (max_y - min_y) * ROWS as f32) as usize;
        Some((row.min(ROWS - 1), col.min(COLS - 1)))
    }

    pub fn frame(&self, x: f32, y: f32, theta: f32, status: &str) -> String {
        let mut rows = self.background.clone();
        if let Some((row, col)) = self.cell(x, y) {
            rows[row][col] = heading_glyph(theta);
        }

        let mut out = String::with_capacity((COLS + 1) * (ROWS + 1) + status.len());
        for row in rows {
            out.extend(row);
            out.push('\n');
        }
        out.push_str(status);
        out.push('\n');
        out
    }

    pub fn draw(&mut self, frame: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        // Home the cursor and clear so successive frames overwrite each other.
        write!(stdout, "\x1b[H\x1b[2J{frame}")?;
        stdout.flush()
    }
}

fn heading_glyph(theta: f32) -> char {
    let octant = (theta.rem_euclid(std::f32::consts::TAU) / std::f32::consts::FRAC_PI_4).round() as usize % 8;
    ['>', '/', '^', '\\', '<', '/', 'v', '\\'][octant]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::track::square_track;

    #[test]
    fn frame_shows_track_car_and_status() {
        let track = square_track(10.0, 2.0);
        let renderer = AsciiRenderer::new(&track);
        let frame = renderer.frame(5.0, 0.0, 0.0, "lap 0/2");

        let lines: Vec<_> = frame.lines().collect();
        assert_eq!(lines.len(), ROWS + 1);
        assert!(lines[..ROWS].iter().all(|l| l.chars().count() == COLS));
        assert_eq!(lines[ROWS], "lap 0/2");
        assert_eq!(frame.matches('>').count(), 1);
        assert!(frame.contains('.'));
    }

    #[test]
    fn off_screen_car_is_not_drawn() {
        let track = square_track(10.0, 2.0);
        let renderer = AsciiRenderer::new(&track);
        let frame = renderer.frame(500.0, 500.0, 0.0, "");
        assert!(!frame.contains('>'));
    }
}
