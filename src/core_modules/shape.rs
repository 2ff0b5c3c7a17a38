// THEORY:
// Shape fitting over the boundary pixels of a `Region`. Everything here works on
// pixel centres, so a solid `w` x `h` block of pixels measures `(w - 1)` x `(h - 1)`:
// the distance between its outermost pixel centres.
//
// - `convex_hull`: Andrew's monotone chain, counter-clockwise, no duplicate endpoint.
// - `min_area_rect`: the minimal-area rotated rectangle. One side of the optimum is
//   collinear with a hull edge, so every hull edge direction is tried.
// - `min_enclosing_circle`: incremental construction (a point outside the current
//   circle must lie on the boundary of the next one), run on hull vertices only.

use crate::core_modules::region::Point;

/// A point with real coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance(&self, other: &PointF) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<Point> for PointF {
    fn from(p: Point) -> Self {
        PointF::new(p.x as f64, p.y as f64)
    }
}

/// A rotated rectangle. `width` runs along `angle_degrees`, `height` across it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: PointF,
    pub width: f64,
    pub height: f64,
    pub angle_degrees: f64,
}

impl RotatedRect {
    pub fn long_side(&self) -> f64 {
        self.width.max(self.height)
    }

    pub fn short_side(&self) -> f64 {
        self.width.min(self.height)
    }

    /// `short / long`, in `[0, 1]`. A degenerate (point) rectangle counts as square.
    pub fn aspect_ratio(&self) -> f64 {
        let long = self.long_side();
        if long > 0.0 { self.short_side() / long } else { 1.0 }
    }
}

/// A circle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: PointF,
    pub radius: f64,
}

impl Circle {
    fn contains(&self, p: &PointF) -> bool {
        self.center.distance(p) <= self.radius * (1.0 + 1e-9) + 1e-9
    }
}

fn cross(o: &Point, a: &Point, b: &Point) -> i64 {
    (a.x as i64 - o.x as i64) * (b.y as i64 - o.y as i64)
        - (a.y as i64 - o.y as i64) * (b.x as i64 - o.x as i64)
}

/// Convex hull of a point set, counter-clockwise.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut sorted: Vec<Point> = points.to_vec();
    sorted.sort_by(|a, b| (a.x, a.y).cmp(&(b.x, b.y)));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let mut lower: Vec<Point> = Vec::new();
    for p in &sorted {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0 {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0 {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Minimal-area rotated rectangle enclosing the points.
pub fn min_area_rect(points: &[Point]) -> RotatedRect {
    let hull: Vec<PointF> = convex_hull(points).into_iter().map(PointF::from).collect();
    match hull.len() {
        0 => {
            return RotatedRect { center: PointF::new(0.0, 0.0), width: 0.0, height: 0.0, angle_degrees: 0.0 };
        }
        1 => {
            return RotatedRect { center: hull[0], width: 0.0, height: 0.0, angle_degrees: 0.0 };
        }
        _ => {}
    }

    let mut best: Option<(f64, RotatedRect)> = None;
    for i in 0..hull.len() {
        let a = hull[i];
        let b = hull[(i + 1) % hull.len()];
        let length = a.distance(&b);
        if length <= f64::EPSILON {
            continue;
        }
        let (ux, uy) = ((b.x - a.x) / length, (b.y - a.y) / length);
        let (vx, vy) = (-uy, ux);

        let (mut min_u, mut max_u, mut min_v, mut max_v) =
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for p in &hull {
            let pu = p.x * ux + p.y * uy;
            let pv = p.x * vx + p.y * vy;
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }
        let width = max_u - min_u;
        let height = max_v - min_v;
        let area = width * height;
        let mid_u = (min_u + max_u) / 2.0;
        let mid_v = (min_v + max_v) / 2.0;
        let rect = RotatedRect {
            center: PointF::new(mid_u * ux + mid_v * vx, mid_u * uy + mid_v * vy),
            width,
            height,
            angle_degrees: uy.atan2(ux).to_degrees(),
        };
        // Ties keep the first edge, which keeps axis-aligned fits stable.
        if best.as_ref().is_none_or(|(best_area, _)| area < *best_area - 1e-9) {
            best = Some((area, rect));
        }
    }

    best.map(|(_, rect)| rect).unwrap_or(RotatedRect {
        center: hull[0],
        width: 0.0,
        height: 0.0,
        angle_degrees: 0.0,
    })
}

fn circle_from_two(a: &PointF, b: &PointF) -> Circle {
    let center = PointF::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
    Circle { center, radius: center.distance(a) }
}

fn circle_from_three(a: &PointF, b: &PointF, c: &PointF) -> Circle {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < 1e-12 {
        // Collinear: the widest pair spans the circle.
        let candidates = [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)];
        return candidates
            .into_iter()
            .max_by(|l, r| l.radius.total_cmp(&r.radius))
            .unwrap_or(Circle { center: *a, radius: 0.0 });
    }
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    let center = PointF::new(ux, uy);
    Circle { center, radius: center.distance(a) }
}

/// Smallest circle enclosing every point.
pub fn min_enclosing_circle(points: &[Point]) -> Circle {
    let hull: Vec<PointF> = convex_hull(points).into_iter().map(PointF::from).collect();
    if hull.is_empty() {
        return Circle { center: PointF::new(0.0, 0.0), radius: 0.0 };
    }

    let mut circle = Circle { center: hull[0], radius: 0.0 };
    for i in 1..hull.len() {
        if circle.contains(&hull[i]) {
            continue;
        }
        circle = Circle { center: hull[i], radius: 0.0 };
        for j in 0..i {
            if circle.contains(&hull[j]) {
                continue;
            }
            circle = circle_from_two(&hull[i], &hull[j]);
            for k in 0..j {
                if !circle.contains(&hull[k]) {
                    circle = circle_from_three(&hull[i], &hull[j], &hull[k]);
                }
            }
        }
    }
    circle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(x0: u32, y0: u32, w: u32, h: u32) -> Vec<Point> {
        let mut pixels = Vec::new();
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                pixels.push(Point::new(x, y));
            }
        }
        pixels
    }

    #[test]
    fn hull_of_block_is_its_corners() {
        let hull = convex_hull(&block(2, 3, 4, 5));
        assert_eq!(hull.len(), 4);
        assert!(hull.contains(&Point::new(2, 3)));
        assert!(hull.contains(&Point::new(5, 7)));
    }

    #[test]
    fn rect_of_axis_aligned_block_measures_pixel_centres() {
        let rect = min_area_rect(&block(10, 10, 29, 141));
        assert!((rect.long_side() - 140.0).abs() < 1e-9);
        assert!((rect.short_side() - 28.0).abs() < 1e-9);
        assert!((rect.aspect_ratio() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn rect_of_diagonal_line_is_thin() {
        let points: Vec<Point> = (0..50).map(|i| Point::new(i, i)).collect();
        let rect = min_area_rect(&points);
        assert!((rect.long_side() - 49.0 * 2f64.sqrt()).abs() < 1e-6);
        assert!(rect.short_side() < 1e-6);
        assert!(rect.aspect_ratio() < 1e-6);
    }

    #[test]
    fn single_point_rect_is_square() {
        let rect = min_area_rect(&[Point::new(4, 4)]);
        assert_eq!(rect.aspect_ratio(), 1.0);
        assert_eq!(rect.long_side(), 0.0);
    }

    #[test]
    fn aspect_ratio_is_bounded() {
        for (w, h) in [(1, 1), (1, 9), (9, 1), (5, 5), (3, 40)] {
            let ratio = min_area_rect(&block(0, 0, w, h)).aspect_ratio();
            assert!((0.0..=1.0).contains(&ratio));
        }
    }

    #[test]
    fn enclosing_circle_of_square() {
        let circle = min_enclosing_circle(&block(0, 0, 11, 11));
        assert!((circle.center.x - 5.0).abs() < 1e-9);
        assert!((circle.center.y - 5.0).abs() < 1e-9);
        assert!((circle.radius - 50f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn enclosing_circle_of_two_points() {
        let circle = min_enclosing_circle(&[Point::new(0, 0), Point::new(10, 0)]);
        assert!((circle.radius - 5.0).abs() < 1e-9);
        assert!((circle.center.x - 5.0).abs() < 1e-9);
    }
}
