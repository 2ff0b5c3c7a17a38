// THEORY (Single-Pixel Colour Heuristics):
// The `Pixel` module is the most fundamental unit of the triage engine. It is a
// "dumb" data container for one RGB pixel plus the colour-space transforms every
// segmentation band is expressed in. Nothing here reads a neighbour; anything that
// needs spatial context (edges, morphology, regions) belongs to higher modules.
//
// Two transforms matter for the clinical heuristics:
// - Gray (Rec. 601 luma) with the same fixed-point rounding the reference colour
//   bands were tuned against: (R*4899 + G*9617 + B*1868 + 2^13) >> 14.
// - HSV on the 8-bit "half-degree" scale: hue 0..180, saturation and value 0..255.
//   All skin, blood, bruise and darkness thresholds are quoted on this scale, so the
//   rounding here must be exact or the band edges drift by one step.
//
// Key principles:
// 1) Single-pixel scope: conversions never read neighbours or history.
// 2) Integer outputs: every band check is an inclusive integer range test.
// 3) Cheap: no allocation, no lookup tables, safe to call per pixel in hot loops.

pub mod pixel {
    use image::Rgb;

    pub type Channel = u8;
    pub type Hue = u8;
    pub type Saturation = u8;
    pub type Value = u8;
    pub type Gray = u8;

    /// Upper bound (exclusive) of the half-degree hue circle.
    pub const HUE_CIRCLE: i32 = 180;

    const GRAY_SHIFT: u32 = 14;
    const GRAY_RED: u32 = 4899;
    const GRAY_GREEN: u32 = 9617;
    const GRAY_BLUE: u32 = 1868;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    /// A pixel expressed on the 8-bit HSV scale (hue 0..180).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Hsv {
        pub hue: Hue,
        pub saturation: Saturation,
        pub value: Value,
    }

    /// An inclusive HSV box, the unit every colour band is built from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HsvRange {
        pub lower: Hsv,
        pub upper: Hsv,
    }

    impl HsvRange {
        pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
            Self {
                lower: Hsv { hue: lower[0], saturation: lower[1], value: lower[2] },
                upper: Hsv { hue: upper[0], saturation: upper[1], value: upper[2] },
            }
        }

        #[inline]
        pub fn contains(&self, hsv: Hsv) -> bool {
            (self.lower.hue..=self.upper.hue).contains(&hsv.hue)
                && (self.lower.saturation..=self.upper.saturation).contains(&hsv.saturation)
                && (self.lower.value..=self.upper.value).contains(&hsv.value)
        }
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        /// Rec. 601 luma with fixed-point rounding.
        #[inline]
        pub fn gray(&self) -> Gray {
            let weighted = self.red as u32 * GRAY_RED
                + self.green as u32 * GRAY_GREEN
                + self.blue as u32 * GRAY_BLUE;
            ((weighted + (1 << (GRAY_SHIFT - 1))) >> GRAY_SHIFT) as Gray
        }

        /// Converts to the 8-bit HSV scale.
        ///
        /// - value is the max channel
        /// - saturation is round(255 * chroma / value), 0 for black
        /// - hue is round(30 * sector_offset / chroma) folded into [0, 180)
        pub fn hsv(&self) -> Hsv {
            let (r, g, b) = (self.red as i32, self.green as i32, self.blue as i32);
            let value = r.max(g).max(b);
            let minimum = r.min(g).min(b);
            let chroma = value - minimum;

            let saturation = if value == 0 {
                0
            } else {
                round_half_up(255.0 * chroma as f64 / value as f64)
            };

            let hue = if chroma == 0 {
                0
            } else {
                let raw = if value == r {
                    g - b
                } else if value == g {
                    b - r + 2 * chroma
                } else {
                    r - g + 4 * chroma
                };
                let mut hue = round_half_up(30.0 * raw as f64 / chroma as f64);
                if hue < 0 {
                    hue += HUE_CIRCLE;
                }
                hue.min(HUE_CIRCLE - 1)
            };

            Hsv {
                hue: hue as Hue,
                saturation: saturation.clamp(0, 255) as Saturation,
                value: value as Value,
            }
        }
    }

    impl From<&Rgb<u8>> for Pixel {
        fn from(rgb: &Rgb<u8>) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }

    impl From<Pixel> for Rgb<u8> {
        fn from(pixel: Pixel) -> Self {
            Rgb([pixel.red, pixel.green, pixel.blue])
        }
    }

    #[inline]
    fn round_half_up(x: f64) -> i32 {
        (x + 0.5).floor() as i32
    }
}
