// THEORY:
// The `Mask` is the binary currency of the segmentation layers. Every colour band,
// edge map, tissue region and anomaly candidate is a `Mask` of the same dimensions
// as the analysed image, one flag per pixel, stored as a flat row-major arena.
//
// Key architectural principles:
// 1.  **Dense Arena**: A single `Vec<bool>` indexed by `y * width + x`. No per-pixel
//     objects, no pointer chasing, no allocation inside the hot loops beyond the
//     output buffer.
// 2.  **Set Algebra**: Masks compose through union, intersection, exclusive-or
//     and complement. Each operation returns a fresh mask; inputs are
//     never mutated, so a mask can be shared by several downstream stages.
// 3.  **Morphology by Stamping**: Dilation stamps the structuring element around each
//     set pixel, which is cheap for the sparse masks the anomaly stages produce.
//     Erosion is the dual (complement, dilate, complement) with out-of-frame pixels
//     treated as set, so a region touching the frame edge is not eaten away.
// 4.  **Iterated Operators**: `close` dilates `n` times then erodes `n` times, `open`
//     erodes `n` times then dilates `n` times, matching the iteration semantics the
//     heuristic thresholds were calibrated with.

use image::{GrayImage, Luma};

/// A structuring element: a set of offsets relative to an anchor pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    pub width: u32,
    pub height: u32,
    offsets: Vec<(i32, i32)>,
}

impl StructuringElement {
    /// A filled rectangle, anchored at its centre.
    pub fn rect(width: u32, height: u32) -> Self {
        Self::from_rows(width, height, |_, _| true)
    }

    /// The discrete ellipse inscribed in a `width` x `height` box.
    ///
    /// Row `i` covers the columns within `round(c * sqrt(1 - dy^2 / r^2))` of the
    /// centre column, where `r = height / 2` and `c = width / 2`. A 5x5 element is a
    /// 3-row bar with single-pixel caps; a 3x3 element is a cross.
    pub fn ellipse(width: u32, height: u32) -> Self {
        let radius = (height / 2) as i32;
        let centre = (width / 2) as i32;
        let inverse_r2 = if radius > 0 { 1.0 / (radius * radius) as f64 } else { 0.0 };
        Self::from_rows(width, height, move |col, row| {
            let dy = row - radius;
            if dy.abs() > radius {
                return false;
            }
            let dx = (centre as f64 * (((radius * radius - dy * dy) as f64) * inverse_r2).sqrt())
                .round() as i32;
            let start = (centre - dx).max(0);
            let end = (centre + dx + 1).min(width as i32);
            col >= start && col < end
        })
    }

    fn from_rows(width: u32, height: u32, member: impl Fn(i32, i32) -> bool) -> Self {
        let anchor_x = (width / 2) as i32;
        let anchor_y = (height / 2) as i32;
        let mut offsets = Vec::new();
        for row in 0..height as i32 {
            for col in 0..width as i32 {
                if member(col, row) {
                    offsets.push((col - anchor_x, row - anchor_y));
                }
            }
        }
        Self { width, height, offsets }
    }

    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }

    pub fn contains(&self, dx: i32, dy: i32) -> bool {
        self.offsets.contains(&(dx, dy))
    }
}

/// A same-dimension binary grid, one flag per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    /// An all-clear mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, bits: vec![false; (width * height) as usize] }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut bits = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self { width, height, bits }
    }

    /// Every non-zero gray pixel becomes a set flag.
    pub fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            bits: image.as_raw().iter().map(|&v| v > 0).collect(),
        }
    }

    /// Renders the mask as a 0/255 gray image.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Total number of pixels (set or not).
    pub fn area(&self) -> usize {
        self.bits.len()
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let index = self.index(x, y);
        self.bits[index] = value;
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// True when no pixel is set.
    pub fn is_clear(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }

    /// Coordinates of every set pixel in row-major order.
    pub fn iter_set(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width;
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(move |(i, _)| ((i as u32) % width, (i as u32) / width))
    }

    // --- Set algebra ---

    fn zip_with(&self, other: &Mask, op: impl Fn(bool, bool) -> bool) -> Mask {
        assert_eq!(self.dimensions(), other.dimensions(), "mask dimensions differ");
        Mask {
            width: self.width,
            height: self.height,
            bits: self.bits.iter().zip(&other.bits).map(|(&a, &b)| op(a, b)).collect(),
        }
    }

    pub fn union(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a || b)
    }

    pub fn intersection(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && b)
    }

    pub fn xor(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a != b)
    }

    pub fn complement(&self) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            bits: self.bits.iter().map(|&b| !b).collect(),
        }
    }

    /// Number of pixels set in both masks, without allocating the intersection.
    pub fn overlap(&self, other: &Mask) -> usize {
        assert_eq!(self.dimensions(), other.dimensions(), "mask dimensions differ");
        self.bits.iter().zip(&other.bits).filter(|(a, b)| **a && **b).count()
    }

    // --- Morphology ---

    fn dilate_once(&self, element: &StructuringElement) -> Mask {
        let mut out = Mask::new(self.width, self.height);
        let (w, h) = (self.width as i32, self.height as i32);
        for (x, y) in self.iter_set() {
            for &(dx, dy) in element.offsets() {
                // out[p] = any(in[p + offset])  <=>  stamp p = q - offset for set q
                let px = x as i32 - dx;
                let py = y as i32 - dy;
                if px >= 0 && py >= 0 && px < w && py < h {
                    out.bits[(py * w + px) as usize] = true;
                }
            }
        }
        out
    }

    pub fn dilate(&self, element: &StructuringElement, iterations: u32) -> Mask {
        let mut current = self.clone();
        for _ in 0..iterations {
            current = current.dilate_once(element);
        }
        current
    }

    pub fn erode(&self, element: &StructuringElement, iterations: u32) -> Mask {
        let mut current = self.clone();
        for _ in 0..iterations {
            current = current.complement().dilate_once(element).complement();
        }
        current
    }

    /// Erosion followed by dilation: removes speckle smaller than the element.
    pub fn open(&self, element: &StructuringElement, iterations: u32) -> Mask {
        self.erode(element, iterations).dilate(element, iterations)
    }

    /// Dilation followed by erosion: fills gaps narrower than the element.
    pub fn close(&self, element: &StructuringElement, iterations: u32) -> Mask {
        self.dilate(element, iterations).erode(element, iterations)
    }
}
