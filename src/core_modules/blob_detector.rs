// THEORY:
// The `BlobDetector` is the engine of the spatial grouping layer. It labels the
// connected components of a binary `Mask` and packages each one as a filled `Region`.
//
// Algorithm steps:
// 1.  **One Label Arena**: A single flat `u32` arena covers the whole frame. Set pixels
//     are grown 8-connected and take labels `1..=n`; clear pixels are then grown
//     4-connected and take the labels after that. Growth is an iterative stack walk,
//     no recursion, no per-pixel nodes.
// 2.  **Enclosure by Raster Order**: A component is resolved at its first pixel in
//     row-major order. The pixel directly above that one belongs to the component
//     that encloses it, and was resolved earlier. Background touching the frame edge
//     encloses nothing; any other background is a hole of the component above it.
// 3.  **Outer Regions Only**: Holes, and components sitting inside them, are owned by
//     the outermost enclosing component. Only those owners are reported, each with
//     every pixel it encloses.
// 4.  **Stateless Utility**: `find_regions` takes one mask and returns the regions of
//     that mask in O(pixels). It remembers nothing between calls.

use crate::core_modules::mask::Mask;
use crate::core_modules::region::{Point, Region};

pub mod blob_detector {
    use super::*;

    /// Arena value of a pixel not yet labelled, and the owner of frame-connected
    /// background.
    pub const BACKGROUND: u32 = 0;
    const UNRESOLVED: u32 = u32::MAX;

    const NEIGHBOURS_8: [(i32, i32); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];
    const NEIGHBOURS_4: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

    struct LabelArena {
        labels: Vec<u32>,
        /// Labels `1..=foreground` are set-pixel components.
        foreground: u32,
        /// Indexed by label: background components touching the frame edge.
        frame_connected: Vec<bool>,
    }

    /// Grows the component containing `seed` over unlabelled pixels with the seed's
    /// mask value, writing `label` into the arena and visiting each member once.
    fn grow(
        mask: &Mask,
        labels: &mut [u32],
        seed: Point,
        label: u32,
        neighbours: &[(i32, i32)],
        stack: &mut Vec<Point>,
        mut visit: impl FnMut(Point),
    ) {
        let (width, height) = mask.dimensions();
        let value = mask.get(seed.x, seed.y);
        labels[mask.index(seed.x, seed.y)] = label;
        stack.push(seed);

        while let Some(current) = stack.pop() {
            visit(current);
            for &(dx, dy) in neighbours {
                let nx = current.x as i32 + dx;
                let ny = current.y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let index = mask.index(nx, ny);
                if labels[index] == BACKGROUND && mask.get(nx, ny) == value {
                    labels[index] = label;
                    stack.push(Point::new(nx, ny));
                }
            }
        }
    }

    fn label_arena(mask: &Mask) -> LabelArena {
        let (width, height) = mask.dimensions();
        let mut labels = vec![BACKGROUND; mask.area()];
        // Slot 0 is the unused BACKGROUND label.
        let mut frame_connected = vec![false];
        let mut stack: Vec<Point> = Vec::new();

        for (x, y) in mask.iter_set() {
            if labels[mask.index(x, y)] == BACKGROUND {
                let label = frame_connected.len() as u32;
                grow(mask, &mut labels, Point::new(x, y), label, &NEIGHBOURS_8, &mut stack, |_| {});
                frame_connected.push(false);
            }
        }
        let foreground = frame_connected.len() as u32 - 1;

        for y in 0..height {
            for x in 0..width {
                if labels[mask.index(x, y)] != BACKGROUND {
                    continue;
                }
                let label = frame_connected.len() as u32;
                let mut touches_frame = false;
                grow(mask, &mut labels, Point::new(x, y), label, &NEIGHBOURS_4, &mut stack, |p| {
                    touches_frame |= p.x == 0 || p.y == 0 || p.x == width - 1 || p.y == height - 1;
                });
                frame_connected.push(touches_frame);
            }
        }

        LabelArena { labels, foreground, frame_connected }
    }

    /// Finds every outer region of the mask, holes filled.
    pub fn find_regions(mask: &Mask) -> Vec<Region> {
        let LabelArena { labels, foreground, frame_connected } = label_arena(mask);
        let width = mask.width() as usize;

        // owner[label] = the outer component the label ends up in
        let mut owner = vec![UNRESOLVED; frame_connected.len()];
        for (index, &label) in labels.iter().enumerate() {
            let slot = label as usize;
            if owner[slot] != UNRESOLVED {
                continue;
            }
            let above = (index >= width).then(|| owner[labels[index - width] as usize]);
            owner[slot] = if label <= foreground {
                match above {
                    Some(enclosing) if enclosing != BACKGROUND => enclosing,
                    _ => label,
                }
            } else if frame_connected[slot] {
                BACKGROUND
            } else {
                above.unwrap_or(BACKGROUND)
            };
        }

        let mut filled: Vec<Vec<Point>> = vec![Vec::new(); foreground as usize + 1];
        for (index, &label) in labels.iter().enumerate() {
            let root = owner[label as usize];
            if root != BACKGROUND {
                filled[root as usize].push(Point::new((index % width) as u32, (index / width) as u32));
            }
        }

        filled
            .into_iter()
            .enumerate()
            .filter(|(_, pixels)| !pixels.is_empty())
            .map(|(label, pixels)| Region::new(label as u32, pixels))
            .collect()
    }

    /// The region with the largest enclosed area, if any.
    pub fn largest_region(mask: &Mask) -> Option<Region> {
        find_regions(mask).into_iter().max_by_key(|r| r.area())
    }

    /// Union of the filled outer regions whose area strictly exceeds `min_area`.
    pub fn fill_regions_above(mask: &Mask, min_area: usize) -> Mask {
        let (width, height) = mask.dimensions();
        let mut out = Mask::new(width, height);
        for region in find_regions(mask).iter().filter(|r| r.area() > min_area) {
            for p in &region.pixels {
                out.set(p.x, p.y, true);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::blob_detector::*;
    use super::*;

    fn ring(size: u32, x0: u32, y0: u32, outer: u32) -> Mask {
        Mask::from_fn(size, size, |x, y| {
            let inside = x >= x0 && x < x0 + outer && y >= y0 && y < y0 + outer;
            let interior = x > x0 && x < x0 + outer - 1 && y > y0 && y < y0 + outer - 1;
            inside && !interior
        })
    }

    #[test]
    fn separates_disconnected_components() {
        let mask = Mask::from_fn(20, 20, |x, y| (x < 3 && y < 3) || (x > 15 && y > 15));
        let regions = find_regions(&mask);
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.area() == 9 || r.area() == 16));
    }

    #[test]
    fn diagonal_neighbours_join() {
        let mut mask = Mask::new(5, 5);
        mask.set(1, 1, true);
        mask.set(2, 2, true);
        mask.set(3, 3, true);
        assert_eq!(find_regions(&mask).len(), 1);
    }

    #[test]
    fn ring_is_filled_into_a_solid_square() {
        let mask = ring(20, 5, 5, 8);
        let region = largest_region(&mask).expect("ring region");
        assert_eq!(region.area(), 64);
    }

    #[test]
    fn component_inside_a_hole_is_swallowed() {
        let mut mask = ring(30, 2, 2, 20);
        mask.set(12, 12, true);
        let regions = find_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area(), 400);
    }

    #[test]
    fn nested_rings_fold_into_the_outermost() {
        let mut mask = ring(40, 2, 2, 30).union(&ring(40, 8, 8, 18));
        mask.set(16, 16, true);
        let regions = find_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area(), 900);
    }

    #[test]
    fn open_cup_is_not_filled() {
        // Walls on three sides; the inside reaches the frame through the top.
        let mask = Mask::from_fn(20, 20, |x, y| {
            (5..15).contains(&y) && (x == 5 || x == 14) || (y == 14 && (5..15).contains(&x))
        });
        let region = largest_region(&mask).expect("cup region");
        assert_eq!(region.area(), mask.count());
    }

    #[test]
    fn many_diagonal_lines_stay_separate() {
        // Anti-diagonals x + y = 0, 4, 8, ... : long thin components with huge boxes.
        let mask = Mask::from_fn(100, 100, |x, y| (x + y) % 4 == 0);
        let regions = find_regions(&mask);
        assert_eq!(regions.len(), 50);
        assert_eq!(regions.iter().map(Region::area).sum::<usize>(), mask.count());
        assert!(regions.iter().any(|r| r.area() == 97));
    }

    #[test]
    fn empty_mask_has_no_regions() {
        assert!(largest_region(&Mask::new(10, 10)).is_none());
    }

    #[test]
    fn fill_regions_above_drops_small_regions() {
        let mask = Mask::from_fn(40, 40, |x, y| (x < 2 && y < 2) || (x >= 10 && x < 20 && y >= 10 && y < 20));
        let filled = fill_regions_above(&mask, 50);
        assert_eq!(filled.count(), 100);
        assert!(!filled.get(0, 0));
    }
}
