use crate::error::{Error, Result};

/// Fixed drawing parameters. Writer and mirror must be built against the same values, there
/// is no negotiation between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
    /// Pixels per grid cell.
    pub scale: usize,
    /// Marker radius in pixels.
    pub radius: usize,
}

impl Geometry {
    pub const STANDARD: Geometry = Geometry {
        width: 1600,
        height: 600,
        scale: 20,
        radius: 30,
    };

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    pub fn byte_len(&self) -> usize {
        self.pixel_count() * std::mem::size_of::<Pixel>()
    }

    pub fn columns(&self) -> usize {
        self.width / self.scale
    }

    pub fn rows(&self) -> usize {
        self.height / self.scale
    }

    /// Grid cell holding the centre of the canvas.
    pub fn center(&self) -> GridPos {
        GridPos {
            x: self.columns() / 2,
            y: self.rows() / 2,
        }
    }

    /// Nearest grid coordinate for a pixel coordinate.
    pub fn to_grid(&self, pixel: usize) -> usize {
        (pixel + self.scale / 2) / self.scale
    }
}

/// One canvas pixel, stored as BGRA to match the bitmap layout of the shared region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixel {
    pub blue: u8,
    pub green: u8,
    pub red: u8,
    pub alpha: u8,
}

impl Pixel {
    pub const BACKGROUND: Pixel = Pixel {
        blue: 0,
        green: 0,
        red: 0,
        alpha: 0,
    };

    pub const MARKER: Pixel = Pixel {
        blue: 255,
        green: 0,
        red: 0,
        alpha: 0,
    };

    /// Alpha is ignored, only the colour channels decide.
    pub fn is_background(&self) -> bool {
        self.blue == 0 && self.green == 0 && self.red == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Marker position in grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridPos {
    pub x: usize,
    pub y: usize,
}

impl GridPos {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// One cell in `direction`, clamped to the grid.
    pub fn step(self, direction: Direction, geometry: &Geometry) -> GridPos {
        let max_x = geometry.columns().saturating_sub(1);
        let max_y = geometry.rows().saturating_sub(1);
        match direction {
            Direction::Up => GridPos::new(self.x, self.y.saturating_sub(1)),
            Direction::Down => GridPos::new(self.x, (self.y + 1).min(max_y)),
            Direction::Left => GridPos::new(self.x.saturating_sub(1), self.y),
            Direction::Right => GridPos::new((self.x + 1).min(max_x), self.y),
        }
    }

    pub fn in_bounds(&self, geometry: &Geometry) -> bool {
        self.x < geometry.columns() && self.y < geometry.rows()
    }
}

/// Anything holding a full canvas worth of pixels: the private surfaces and the locked view of
/// the shared region.
pub trait Raster {
    fn geometry(&self) -> Geometry;
    fn pixels(&self) -> &[Pixel];
    fn pixels_mut(&mut self) -> &mut [Pixel];

    fn pixel(&self, x: usize, y: usize) -> Pixel {
        self.pixels()[x + self.geometry().width * y]
    }

    fn erase(&mut self) {
        self.pixels_mut().fill(Pixel::BACKGROUND);
    }

    /// Draws the marker disk centred on `pos`. Pixels falling off the canvas are dropped.
    fn draw_marker(&mut self, pos: GridPos) {
        let geometry = self.geometry();
        let radius = geometry.radius as i64;
        let cx = (pos.x * geometry.scale) as i64;
        let cy = (pos.y * geometry.scale) as i64;
        let (width, height) = (geometry.width as i64, geometry.height as i64);
        let pixels = self.pixels_mut();
        for i in -radius..=radius {
            for j in -radius..=radius {
                if i * i + j * j >= radius * radius {
                    continue;
                }
                let (x, y) = (cx + i, cy + j);
                if (0..width).contains(&x) && (0..height).contains(&y) {
                    pixels[(x + width * y) as usize] = Pixel::MARKER;
                }
            }
        }
    }

    fn copy_from(&mut self, other: &dyn Raster) {
        self.pixels_mut().copy_from_slice(other.pixels());
    }
}

/// A private, heap allocated canvas.
#[derive(Debug, Clone)]
pub struct Surface {
    geometry: Geometry,
    pixels: Vec<Pixel>,
}

impl Surface {
    pub fn new(geometry: Geometry) -> Result<Self> {
        if geometry.pixel_count() == 0 || geometry.scale == 0 {
            return Err(Error::Surface(format!("invalid geometry {geometry:?}")));
        }
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(geometry.pixel_count())
            .map_err(|e| Error::Surface(e.to_string()))?;
        pixels.resize(geometry.pixel_count(), Pixel::BACKGROUND);
        Ok(Self { geometry, pixels })
    }
}

impl Raster for Surface {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }
}

/// Test helper: one character per pixel, `#` for marker and `.` for background.
#[cfg(test)]
pub(crate) fn ascii(raster: &dyn Raster) -> String {
    let geometry = raster.geometry();
    (0..geometry.height)
        .map(|y| {
            (0..geometry.width)
                .map(|x| {
                    if raster.pixel(x, y).is_background() {
                        '.'
                    } else {
                        '#'
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Number of 4-connected marker regions.
#[cfg(test)]
pub(crate) fn blob_count(raster: &dyn Raster) -> usize {
    let geometry = raster.geometry();
    let mut seen = vec![false; geometry.pixel_count()];
    let mut blobs = 0;
    for start in 0..geometry.pixel_count() {
        if seen[start] || raster.pixels()[start].is_background() {
            continue;
        }
        blobs += 1;
        let mut stack = vec![start];
        seen[start] = true;
        while let Some(index) = stack.pop() {
            let (x, y) = (index % geometry.width, index / geometry.width);
            let mut neighbours = Vec::with_capacity(4);
            if x > 0 {
                neighbours.push(index - 1);
            }
            if x + 1 < geometry.width {
                neighbours.push(index + 1);
            }
            if y > 0 {
                neighbours.push(index - geometry.width);
            }
            if y + 1 < geometry.height {
                neighbours.push(index + geometry.width);
            }
            for next in neighbours {
                if !seen[next] && !raster.pixels()[next].is_background() {
                    seen[next] = true;
                    stack.push(next);
                }
            }
        }
    }
    blobs
}

#[cfg(test)]
mod test {
    use crate::canvas::{ascii, blob_count, Direction, Geometry, GridPos, Pixel, Raster, Surface};

    const SMALL: Geometry = Geometry {
        width: 16,
        height: 10,
        scale: 5,
        radius: 4,
    };

    #[test]
    fn standard_grid_is_80_by_30() {
        assert_eq!(Geometry::STANDARD.columns(), 80);
        assert_eq!(Geometry::STANDARD.rows(), 30);
        assert_eq!(Geometry::STANDARD.center(), GridPos::new(40, 15));
        assert_eq!(Geometry::STANDARD.byte_len(), 1600 * 600 * 4);
    }

    #[test]
    fn pixel_is_four_bytes() {
        assert_eq!(std::mem::size_of::<Pixel>(), 4);
    }

    #[test]
    fn draws_disk() {
        let mut surface = Surface::new(SMALL).unwrap();
        surface.draw_marker(GridPos::new(1, 1));
        insta::assert_snapshot!(ascii(&surface), @r"
        ................
        ................
        ...#####........
        ..#######.......
        ..#######.......
        ..#######.......
        ..#######.......
        ..#######.......
        ...#####........
        ................
        ");
    }

    #[test]
    fn clips_disk_at_the_corner() {
        let mut surface = Surface::new(SMALL).unwrap();
        surface.draw_marker(GridPos::new(0, 0));
        assert!(surface.pixel(0, 0) == Pixel::MARKER);
        assert!(surface.pixel(2, 2) == Pixel::MARKER);
        assert!(surface.pixel(3, 0) == Pixel::MARKER);
        assert!(surface.pixel(3, 3).is_background());
        assert!(surface.pixel(4, 0).is_background());
        assert_eq!(blob_count(&surface), 1);
    }

    #[test]
    fn erase_clears_everything() {
        let mut surface = Surface::new(SMALL).unwrap();
        surface.draw_marker(GridPos::new(2, 1));
        surface.erase();
        assert!(surface.pixels().iter().all(Pixel::is_background));
    }

    #[test]
    fn steps_are_clamped() {
        let geometry = Geometry::STANDARD;
        let origin = GridPos::new(0, 0);
        assert_eq!(origin.step(Direction::Up, &geometry), origin);
        assert_eq!(origin.step(Direction::Left, &geometry), origin);
        assert_eq!(origin.step(Direction::Right, &geometry), GridPos::new(1, 0));

        let corner = GridPos::new(79, 29);
        assert_eq!(corner.step(Direction::Right, &geometry), corner);
        assert_eq!(corner.step(Direction::Down, &geometry), corner);
        assert_eq!(corner.step(Direction::Up, &geometry), GridPos::new(79, 28));
    }

    #[test]
    fn position_stays_in_bounds_for_long_walks() {
        let geometry = Geometry::STANDARD;
        let directions = [
            Direction::Up,
            Direction::Right,
            Direction::Right,
            Direction::Down,
            Direction::Left,
        ];
        let mut pos = geometry.center();
        // Deterministic pseudo random walk long enough to hit every edge.
        let mut seed: u32 = 7;
        for _ in 0..20_000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let direction = directions[(seed >> 16) as usize % directions.len()];
            pos = pos.step(direction, &geometry);
            assert!(pos.in_bounds(&geometry), "{pos:?} escaped");
        }
        for _ in 0..200 {
            pos = pos.step(Direction::Left, &geometry);
        }
        assert_eq!(pos.x, 0);
    }

    #[test]
    fn rejects_empty_geometry() {
        let geometry = Geometry {
            width: 0,
            ..Geometry::STANDARD
        };
        assert!(Surface::new(geometry).is_err());
    }

    #[test]
    fn copies_between_rasters() {
        let mut source = Surface::new(SMALL).unwrap();
        source.draw_marker(GridPos::new(2, 1));
        let mut target = Surface::new(SMALL).unwrap();
        target.copy_from(&source);
        assert_eq!(source.pixels(), target.pixels());
    }
}
