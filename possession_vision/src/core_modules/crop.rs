// THEORY:
// The `Crop` module represents the pixels of a single detected player. It is the
// bridge between the detector's boxes and the colour-based team classifier.
//
// Key architectural principles:
// 1.  **Transient ownership**: A `PlayerCrop` is cut from a frame, reduced to one
//     colour fingerprint, and dropped. Nothing downstream keeps pixel data.
// 2.  **Jersey focus**: Detector boxes carry pitch and neighbours around the
//     edges. The fingerprint is taken from the central half of the crop in both
//     dimensions, where the shirt is.
// 3.  **Data Container**: Like `Pixel`, `PlayerCrop` is a "dumb" container. It
//     knows how to summarise its own pixels but nothing about teams or clusters.

pub mod crop {
    use crate::core_modules::detection::PixelBox;
    use crate::core_modules::pixel::pixel::{Lab, Pixel};
    use image::RgbImage;

    /// A rectangular block of pixels cut from a frame around one player.
    #[derive(Debug, Clone)]
    pub struct PlayerCrop {
        /// The width of the crop in pixels.
        pub width: u32,
        /// The height of the crop in pixels.
        pub height: u32,
        /// Row-major pixels of the crop.
        pub pixels: Vec<Pixel>,
    }

    impl PlayerCrop {
        pub fn new(width: u32, height: u32, pixels: Vec<Pixel>) -> Self {
            debug_assert_eq!(pixels.len(), (width * height) as usize);
            Self {
                width,
                height,
                pixels,
            }
        }

        /// Cuts the pixels inside `pixel_box` out of `frame`.
        /// Returns `None` when the box has no area inside the frame.
        pub fn from_frame(frame: &RgbImage, pixel_box: &PixelBox) -> Option<Self> {
            let x_max = pixel_box.x_max.min(frame.width());
            let y_max = pixel_box.y_max.min(frame.height());
            if pixel_box.x_min >= x_max || pixel_box.y_min >= y_max {
                return None;
            }

            let width = x_max - pixel_box.x_min;
            let height = y_max - pixel_box.y_min;
            let mut pixels = Vec::with_capacity((width * height) as usize);
            for y in pixel_box.y_min..y_max {
                for x in pixel_box.x_min..x_max {
                    pixels.push(Pixel::from(frame.get_pixel(x, y)));
                }
            }
            Some(Self::new(width, height, pixels))
        }

        /// The middle 50% × 50% of the crop, or `None` if the crop is too small
        /// to have a centre.
        pub fn central_region(&self) -> Option<PlayerCrop> {
            let (x_start, x_end) = (self.width / 4, 3 * self.width / 4);
            let (y_start, y_end) = (self.height / 4, 3 * self.height / 4);
            if x_start >= x_end || y_start >= y_end {
                return None;
            }

            let width = x_end - x_start;
            let height = y_end - y_start;
            let mut pixels = Vec::with_capacity((width * height) as usize);
            for y in y_start..y_end {
                let row = (y * self.width) as usize;
                pixels.extend_from_slice(&self.pixels[row + x_start as usize..row + x_end as usize]);
            }
            Some(Self::new(width, height, pixels))
        }

        /// Mean CIELAB colour over every pixel of the crop.
        pub fn average_lab(&self) -> Option<Lab> {
            let num_pixels = self.pixels.len();
            if num_pixels == 0 {
                return None;
            }

            let (sum_l, sum_a, sum_b) = self.pixels.iter().fold((0.0f64, 0.0f64, 0.0f64), |(l, a, b), pixel| {
                let lab = pixel.to_lab();
                (l + lab.l, a + lab.a, b + lab.b)
            });

            let count = num_pixels as f64;
            Some(Lab::new(sum_l / count, sum_a / count, sum_b / count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::crop::PlayerCrop;
    use crate::core_modules::detection::PixelBox;
    use crate::core_modules::pixel::pixel::Pixel;
    use image::{Rgb, RgbImage};

    #[test]
    fn crop_copies_the_boxed_pixels() {
        let frame = RgbImage::from_fn(10, 10, |x, y| Rgb([x as u8, y as u8, 0]));
        let pixel_box = PixelBox {
            x_min: 2,
            y_min: 3,
            x_max: 5,
            y_max: 7,
        };
        let crop = PlayerCrop::from_frame(&frame, &pixel_box).expect("non-empty crop");
        assert_eq!((crop.width, crop.height), (3, 4));
        assert_eq!(crop.pixels[0], Pixel::new(2, 3, 0));
        assert_eq!(crop.pixels[11], Pixel::new(4, 6, 0));
    }

    #[test]
    fn empty_boxes_produce_no_crop() {
        let frame = RgbImage::new(10, 10);
        let pixel_box = PixelBox {
            x_min: 4,
            y_min: 4,
            x_max: 4,
            y_max: 9,
        };
        assert!(PlayerCrop::from_frame(&frame, &pixel_box).is_none());
    }

    #[test]
    fn central_region_ignores_the_border() {
        // 8x8 crop: green border, red centre 4x4 block.
        let mut pixels = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                let centre = (2..6).contains(&x) && (2..6).contains(&y);
                pixels.push(if centre {
                    Pixel::new(220, 0, 0)
                } else {
                    Pixel::new(0, 160, 0)
                });
            }
        }
        let crop = PlayerCrop::new(8, 8, pixels);
        let centre = crop.central_region().expect("8x8 crop has a centre");
        assert_eq!((centre.width, centre.height), (4, 4));
        assert!(centre.pixels.iter().all(|p| *p == Pixel::new(220, 0, 0)));

        let centre_lab = centre.average_lab().expect("non-empty");
        let full_lab = crop.average_lab().expect("non-empty");
        let red_lab = Pixel::new(220, 0, 0).to_lab();
        assert!(centre_lab.distance(&red_lab) < 1e-9);
        assert!(full_lab.distance(&red_lab) > 10.0);
    }

    #[test]
    fn average_lab_is_the_per_channel_mean() {
        let red = Pixel::new(220, 0, 0);
        let blue = Pixel::new(0, 0, 220);
        let crop = PlayerCrop::new(4, 1, vec![red, blue, red, blue]);

        let (red_lab, blue_lab) = (red.to_lab(), blue.to_lab());
        let mean = crop.average_lab().expect("non-empty");
        assert!((mean.l - (red_lab.l + blue_lab.l) / 2.0).abs() < 1e-9);
        assert!((mean.a - (red_lab.a + blue_lab.a) / 2.0).abs() < 1e-9);
        assert!((mean.b - (red_lab.b + blue_lab.b) / 2.0).abs() < 1e-9);
        assert!(PlayerCrop::new(0, 0, Vec::new()).average_lab().is_none());
    }

    #[test]
    fn tiny_crops_have_no_centre() {
        let crop = PlayerCrop::new(1, 1, vec![Pixel::new(1, 2, 3)]);
        assert!(crop.central_region().is_none());
    }
}
