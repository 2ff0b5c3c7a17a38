// THEORY:
// The `Region` module is the primary data container of the spatial grouping layer.
// It turns a flat `Mask` into discrete objects: a `Region` is one 8-connected group
// of set pixels, with its holes filled in, exactly as an outer boundary drawn and
// flood-filled would enclose it.
//
// Key architectural principles:
// 1.  **Outer-Boundary Semantics**: A region owns every pixel its outer boundary
//     encloses. A ring-shaped edge map therefore yields a solid disc, which is what
//     the texture and lesion stages rely on.
// 2.  **Stateless Data Container**: A `Region` knows its pixels, its bounding box and
//     its centre of mass. It knows nothing about the image it came from, so it can be
//     measured against any same-size image or mask.
// 3.  **Input for Measurement**: A list of `Region`s is the output of the labelling
//     stage and the direct input for the geometry layer (hulls, rectangles, circles).

use crate::core_modules::mask::Mask;

/// A pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// One filled, 8-connected object found in a mask.
#[derive(Debug, Clone)]
pub struct Region {
    /// The component label assigned during labelling. Only unique within one pass.
    pub label: u32,
    /// The top-left and bottom-right pixels (inclusive) enclosing the region.
    pub bounding_box: (Point, Point),
    /// Every pixel the outer boundary encloses, holes included.
    pub pixels: Vec<Point>,
    /// The mean pixel coordinate.
    pub center_of_mass: (f64, f64),
}

impl Region {
    pub fn new(label: u32, pixels: Vec<Point>) -> Self {
        let mut min = Point::new(u32::MAX, u32::MAX);
        let mut max = Point::new(0, 0);
        let (mut sum_x, mut sum_y) = (0.0, 0.0);
        for p in &pixels {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            sum_x += p.x as f64;
            sum_y += p.y as f64;
        }
        let count = pixels.len().max(1) as f64;
        Self {
            label,
            bounding_box: (min, max),
            center_of_mass: (sum_x / count, sum_y / count),
            pixels,
        }
    }

    /// Enclosed area in pixels.
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Width of the axis-aligned bounding box in pixels.
    pub fn box_width(&self) -> u32 {
        if self.is_empty() {
            return 0;
        }
        self.bounding_box.1.x - self.bounding_box.0.x + 1
    }

    /// Height of the axis-aligned bounding box in pixels.
    pub fn box_height(&self) -> u32 {
        if self.is_empty() {
            return 0;
        }
        self.bounding_box.1.y - self.bounding_box.0.y + 1
    }

    /// Paints the region into a fresh mask of the given frame size.
    pub fn to_mask(&self, width: u32, height: u32) -> Mask {
        let mut mask = Mask::new(width, height);
        for p in &self.pixels {
            if p.x < width && p.y < height {
                mask.set(p.x, p.y, true);
            }
        }
        mask
    }

    /// Pixels of the region with at least one 4-neighbour outside it.
    ///
    /// These are the points the shape fitters (hull, rectangle, circle) consume.
    pub fn boundary(&self) -> Vec<Point> {
        if self.is_empty() {
            return Vec::new();
        }
        let (min, _) = self.bounding_box;
        let local_width = self.box_width() as usize + 2;
        let local_height = self.box_height() as usize + 2;
        let mut local = vec![false; local_width * local_height];
        let at = |x: u32, y: u32| (y - min.y + 1) as usize * local_width + (x - min.x + 1) as usize;
        for p in &self.pixels {
            local[at(p.x, p.y)] = true;
        }

        self.pixels
            .iter()
            .copied()
            .filter(|p| {
                let i = at(p.x, p.y);
                !local[i - 1] || !local[i + 1] || !local[i - local_width] || !local[i + local_width]
            })
            .collect()
    }
}
