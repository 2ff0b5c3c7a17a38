// Annotated copies of analysed images and PNG export. Analysis never draws on its
// input; callers clone, annotate, then save.

pub mod image_helper {
    use std::path::Path;

    use image::{ImageEncoder, Rgb, RgbImage};
    use imageproc::drawing::{draw_hollow_circle_mut, draw_hollow_rect_mut};
    use imageproc::rect::Rect;

    use crate::core_modules::mask::Mask;
    use crate::core_modules::region::{Point, Region};

    pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
    pub const ORANGE: Rgb<u8> = Rgb([255, 165, 0]);
    pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
    pub const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

    pub fn save_png(path: impl AsRef<Path>, image: &RgbImage) -> Result<(), image::error::ImageError> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgb8)?;

        Ok(())
    }

    /// Paints the boundary pixels of a region.
    pub fn outline_region(image: &mut RgbImage, region: &Region, colour: Rgb<u8>) {
        for p in region.boundary() {
            if p.x < image.width() && p.y < image.height() {
                image.put_pixel(p.x, p.y, colour);
            }
        }
    }

    /// Two-pixel rectangle around an inclusive pixel box.
    pub fn draw_box(image: &mut RgbImage, bounding_box: (Point, Point), colour: Rgb<u8>) {
        let (min, max) = bounding_box;
        for inset in 0..2u32 {
            let width = (max.x - min.x + 1 + 2 * inset).max(1);
            let height = (max.y - min.y + 1 + 2 * inset).max(1);
            let rect = Rect::at(min.x as i32 - inset as i32, min.y as i32 - inset as i32).of_size(width, height);
            draw_hollow_rect_mut(image, rect, colour);
        }
    }

    pub fn draw_circle(image: &mut RgbImage, center: (i64, i64), radius: u32, colour: Rgb<u8>) {
        draw_hollow_circle_mut(image, (center.0 as i32, center.1 as i32), radius as i32, colour);
    }

    /// Blends `colour` over every set pixel of the mask with weight `alpha`.
    pub fn tint_mask(image: &mut RgbImage, mask: &Mask, colour: Rgb<u8>, alpha: f32) {
        for (x, y) in mask.iter_set() {
            if x >= image.width() || y >= image.height() {
                continue;
            }
            let pixel = image.get_pixel_mut(x, y);
            for channel in 0..3 {
                let blended = pixel[channel] as f32 * (1.0 - alpha) + colour[channel] as f32 * alpha;
                pixel[channel] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::mask::Mask;
    use crate::core_modules::region::{Point, Region};
    use image::{Rgb, RgbImage};

    #[test]
    fn save_and_reload_gradient() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("gradient.png");
        let image = RgbImage::from_fn(64, 32, |x, _| Rgb([(x * 4) as u8, 0, 0]));

        save_png(&path, &image).expect("Error Saving File.");

        let reloaded = image::open(&path).expect("Error Loading File.").to_rgb8();
        assert_eq!(reloaded, image);
    }

    #[test]
    fn box_is_drawn_outside_the_region() {
        let mut image = RgbImage::new(20, 20);
        draw_box(&mut image, (Point::new(5, 5), Point::new(10, 10)), RED);
        assert_eq!(*image.get_pixel(5, 5), RED);
        assert_eq!(*image.get_pixel(4, 4), RED);
        assert_eq!(*image.get_pixel(7, 7), Rgb([0, 0, 0]));
    }

    #[test]
    fn outline_leaves_interior_untouched() {
        let mut pixels = Vec::new();
        for y in 2..8 {
            for x in 2..8 {
                pixels.push(Point::new(x, y));
            }
        }
        let mut image = RgbImage::new(10, 10);
        outline_region(&mut image, &Region::new(1, pixels), GREEN);
        assert_eq!(*image.get_pixel(2, 5), GREEN);
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn tint_blends_only_masked_pixels() {
        let mut image = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        let mask = Mask::from_fn(4, 4, |x, _| x == 0);
        tint_mask(&mut image, &mask, Rgb([200, 0, 0]), 0.5);
        assert_eq!(*image.get_pixel(0, 0), Rgb([150, 50, 50]));
        assert_eq!(*image.get_pixel(1, 0), Rgb([100, 100, 100]));
    }
}
