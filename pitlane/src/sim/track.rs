//! Track maps: a closed centerline with a fixed width, rasterized into an
//! occupancy grid the lidar and collision checks run against.

use crate::env::EnvError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const GRID_MARGIN: f32 = 1.0;

/// On-disk map document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSpec {
    pub centerline: Vec<[f32; 2]>,
    /// Full drivable width in meters.
    pub width: f32,
    /// Meters per occupancy cell.
    #[serde(default = "default_resolution")]
    pub resolution: f32,
    /// Waypoint the car starts on.
    #[serde(default)]
    pub start: usize,
}

fn default_resolution() -> f32 {
    0.1
}

/// Joins a map path and its extension into the file that holds the map.
pub fn map_file(map: &str, map_ext: &str) -> PathBuf {
    PathBuf::from(format!("{map}{map_ext}"))
}

#[derive(Debug, Clone)]
pub struct Track {
    centerline: Vec<[f32; 2]>,
    /// Arc length at the start of each segment; `arc[i]` is the distance from
    /// waypoint 0 to waypoint `i`.
    arc: Vec<f32>,
    length: f32,
    half_width: f32,
    start: usize,
    grid: Grid,
}

#[derive(Debug, Clone)]
pub struct Grid {
    pub origin: [f32; 2],
    pub resolution: f32,
    pub cols: usize,
    pub rows: usize,
    free: Vec<bool>,
}

impl Grid {
    pub fn is_free(&self, x: f32, y: f32) -> bool {
        let cx = ((x - self.origin[0]) / self.resolution).floor();
        let cy = ((y - self.origin[1]) / self.resolution).floor();
        if cx < 0.0 || cy < 0.0 {
            return false;
        }
        let (cx, cy) = (cx as usize, cy as usize);
        if cx >= self.cols || cy >= self.rows {
            return false;
        }
        self.free[cy * self.cols + cx]
    }

    /// World extent as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        (
            self.origin[0],
            self.origin[1],
            self.origin[0] + self.cols as f32 * self.resolution,
            self.origin[1] + self.rows as f32 * self.resolution,
        )
    }
}

impl Track {
    pub fn load(map: &str, map_ext: &str) -> Result<Self, EnvError> {
        if map_ext != ".json" {
            return Err(EnvError::Map(format!(
                "unsupported map extension {map_ext:?}, expected \".json\""
            )));
        }
        Self::from_file(&map_file(map, map_ext))
    }

    pub fn from_file(path: &Path) -> Result<Self, EnvError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EnvError::Map(format!("{}: {e}", path.display())))?;
        let spec: TrackSpec = serde_json::from_str(&raw)
            .map_err(|e| EnvError::Map(format!("{}: {e}", path.display())))?;
        Self::from_spec(spec)
    }

    pub fn from_spec(spec: TrackSpec) -> Result<Self, EnvError> {
        if spec.centerline.len() < 3 {
            return Err(EnvError::Map(format!(
                "a track needs at least 3 waypoints, got {}",
                spec.centerline.len()
            )));
        }
        if !(spec.width > 0.0) || !(spec.resolution > 0.0) {
            return Err(EnvError::Map(
                "track width and resolution must be positive".to_string(),
            ));
        }
        if spec.start >= spec.centerline.len() {
            return Err(EnvError::Map(format!(
                "start waypoint {} out of range",
                spec.start
            )));
        }

        let n = spec.centerline.len();
        let mut arc = Vec::with_capacity(n);
        let mut length = 0.0;
        for i in 0..n {
            arc.push(length);
            length += distance(spec.centerline[i], spec.centerline[(i + 1) % n]);
        }

        let half_width = spec.width / 2.0;
        let grid = rasterize(&spec.centerline, half_width, spec.resolution);

        Ok(Self {
            centerline: spec.centerline,
            arc,
            length,
            half_width,
            start: spec.start,
            grid,
        })
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn half_width(&self) -> f32 {
        self.half_width
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn centerline(&self) -> &[[f32; 2]] {
        &self.centerline
    }

    /// Start position and heading towards the following waypoint.
    pub fn start_pose(&self) -> (f32, f32, f32) {
        let n = self.centerline.len();
        let [x, y] = self.centerline[self.start];
        let [nx, ny] = self.centerline[(self.start + 1) % n];
        (x, y, (ny - y).atan2(nx - x))
    }

    /// Arc length of the closest centerline point, measured from the start waypoint.
    pub fn progress(&self, x: f32, y: f32) -> f32 {
        let n = self.centerline.len();
        let mut best = (f32::INFINITY, 0.0);
        for i in 0..n {
            let a = self.centerline[i];
            let b = self.centerline[(i + 1) % n];
            let (d, t) = project([x, y], a, b);
            if d < best.0 {
                best = (d, self.arc[i] + t * distance(a, b));
            }
        }
        (best.1 - self.arc[self.start]).rem_euclid(self.length)
    }

    /// Signed arc-length change between two progress readings, unwrapped across the start line.
    pub fn progress_delta(&self, from: f32, to: f32) -> f32 {
        let mut delta = to - from;
        if delta > self.length / 2.0 {
            delta -= self.length;
        } else if delta < -self.length / 2.0 {
            delta += self.length;
        }
        delta
    }
}

fn distance(a: [f32; 2], b: [f32; 2]) -> f32 {
    ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt()
}

/// Distance from `p` to segment `ab`, and the clamped segment parameter in `[0, 1]`.
fn project(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> (f32, f32) {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let q = [a[0] + t * dx, a[1] + t * dy];
    (distance(p, q), t)
}

fn rasterize(centerline: &[[f32; 2]], half_width: f32, resolution: f32) -> Grid {
    let margin = half_width + GRID_MARGIN;
    let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
    let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for [x, y] in centerline {
        min_x = min_x.min(*x);
        min_y = min_y.min(*y);
        max_x = max_x.max(*x);
        max_y = max_y.max(*y);
    }

    let origin = [min_x - margin, min_y - margin];
    let cols = (((max_x - min_x) + 2.0 * margin) / resolution).ceil() as usize;
    let rows = (((max_y - min_y) + 2.0 * margin) / resolution).ceil() as usize;
    let n = centerline.len();

    let mut free = vec![false; cols * rows];
    for row in 0..rows {
        let y = origin[1] + (row as f32 + 0.5) * resolution;
        for col in 0..cols {
            let x = origin[0] + (col as f32 + 0.5) * resolution;
            free[row * cols + col] = (0..n).any(|i| {
                project([x, y], centerline[i], centerline[(i + 1) % n]).0 <= half_width
            });
        }
    }

    Grid {
        origin,
        resolution,
        cols,
        rows,
        free,
    }
}

#[cfg(test)]
pub(crate) fn square_track(side: f32, width: f32) -> Track {
    let spec = TrackSpec {
        centerline: vec![[0.0, 0.0], [side, 0.0], [side, side], [0.0, side]],
        width,
        resolution: 0.1,
        start: 0,
    };
    Track::from_spec(spec).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arc_length_of_a_square() {
        let track = square_track(10.0, 2.0);
        assert!((track.length() - 40.0).abs() < 1e-4);
        assert!((track.progress(5.0, 0.2) - 5.0).abs() < 1e-4);
        assert!((track.progress(10.0, 5.0) - 15.0).abs() < 1e-4);
    }

    #[test]
    fn grid_marks_only_the_band_around_the_centerline() {
        let track = square_track(10.0, 2.0);
        let grid = track.grid();
        assert!(grid.is_free(5.0, 0.0));
        assert!(grid.is_free(5.0, 0.9));
        assert!(!grid.is_free(5.0, 1.5));
        assert!(!grid.is_free(5.0, 5.0));
        assert!(!grid.is_free(-100.0, 0.0));
    }

    #[test]
    fn progress_delta_unwraps_across_start() {
        let track = square_track(10.0, 2.0);
        assert!((track.progress_delta(39.5, 0.5) - 1.0).abs() < 1e-4);
        assert!((track.progress_delta(0.5, 39.5) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn rejects_degenerate_maps() {
        let spec = TrackSpec {
            centerline: vec![[0.0, 0.0], [1.0, 0.0]],
            width: 1.0,
            resolution: 0.1,
            start: 0,
        };
        assert!(matches!(Track::from_spec(spec), Err(EnvError::Map(_))));
        assert!(matches!(Track::load("./maps/example_map", ".png"), Err(EnvError::Map(_))));
        assert!(matches!(Track::load("./does/not/exist", ".json"), Err(EnvError::Map(_))));
    }
}
