//! Marker location from raw pixels.
//!
//! This is a run-length heuristic, not a real centroid. The canvas is scanned column by
//! column, top to bottom, and the first strictly longest vertical run of marker pixels wins.
//! For a single disk that run passes within a few pixels of the centre column, so rounding to
//! the nearest grid cell recovers the marker position. Runs clipped by the top or bottom edge
//! are anchored on their unclipped end using the known radius. Runs reaching the last pixel of
//! a column are compared like any other run. The result is clamped to the grid.

use crate::canvas::{GridPos, Raster};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    x: usize,
    start: usize,
    len: usize,
}

/// Best guess at the marker position, or `None` when the canvas is blank.
pub fn find_marker(raster: &dyn Raster) -> Option<GridPos> {
    let geometry = raster.geometry();
    let mut best: Option<Run> = None;

    let mut consider = |run: Run| {
        if run.len > best.map_or(0, |b| b.len) {
            best = Some(run);
        }
    };

    for x in 0..geometry.width {
        let mut len = 0;
        for y in 0..geometry.height {
            if !raster.pixel(x, y).is_background() {
                len += 1;
            } else {
                if len > 0 {
                    consider(Run {
                        x,
                        start: y - len,
                        len,
                    });
                }
                len = 0;
            }
        }
        if len > 0 {
            consider(Run {
                x,
                start: geometry.height - len,
                len,
            });
        }
    }

    let run = best?;
    let center_y = run_center(run, geometry.height, geometry.radius);
    Some(GridPos::new(
        geometry.to_grid(run.x).min(geometry.columns().saturating_sub(1)),
        geometry.to_grid(center_y).min(geometry.rows().saturating_sub(1)),
    ))
}

fn run_center(run: Run, height: usize, radius: usize) -> usize {
    let end = run.start + run.len - 1;
    let reach = radius.saturating_sub(1);
    let touches_top = run.start == 0;
    let touches_bottom = end == height - 1;
    match (touches_top, touches_bottom) {
        (true, false) => end.saturating_sub(reach),
        (false, true) => run.start + reach,
        _ => run.start + run.len / 2,
    }
}
