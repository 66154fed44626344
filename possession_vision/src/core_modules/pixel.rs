// THEORY (1D Pixel Heuristics):
// The `Pixel` module is the most fundamental unit of the vision system. It is a
// "dumb" data container for a single RGB pixel plus the single-pixel colour
// transforms that jersey clustering needs. Nothing here reads neighbours; averaging
// over a region lives in `crop`, and clustering lives in `team_classifier`.
//
// Colour forms:
// - raw channels (0..255 sRGB bytes), as decoded from the frame
// - linearized (0..1): sRGB → linear light through a 256-entry `OnceLock` LUT, so
//   the hot path is a table lookup rather than a `powf` per pixel
// - CIELAB (D65): the space jersey colours are compared in. Euclidean distance
//   here follows perceived colour difference, and lightness (L) sits on its own
//   axis apart from the chromatic ones (a, b).

pub mod pixel {
    use serde::{Deserialize, Serialize};
    use std::sync::OnceLock;

    pub type Channel = u8;
    pub type LinearizedChannel = f64;

    // Fast path: 256-entry LUT for sRGB (0..255) -> linear normalized (0..1)
    static SRGB_TO_LINEAR_LUT: OnceLock<[LinearizedChannel; 256]> = OnceLock::new();

    // D65 reference white.
    const WHITE_X: f64 = 0.950_47;
    const WHITE_Y: f64 = 1.0;
    const WHITE_Z: f64 = 1.088_83;

    const LAB_EPSILON: f64 = 216.0 / 24_389.0; // (6/29)^3
    const LAB_KAPPA: f64 = 24_389.0 / 27.0;

    /// A colour in CIELAB space. `l` is in [0, 100]; `a` and `b` are roughly in
    /// [-128, 127] for colours reachable from sRGB.
    #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
    pub struct Lab {
        pub l: f64,
        pub a: f64,
        pub b: f64,
    }

    impl Lab {
        pub fn new(l: f64, a: f64, b: f64) -> Self {
            Self { l, a, b }
        }

        /// Squared Euclidean distance (CIE76 ΔE²).
        pub fn distance_squared(&self, other: &Lab) -> f64 {
            (self.l - other.l).powi(2) + (self.a - other.a).powi(2) + (self.b - other.b).powi(2)
        }

        pub fn distance(&self, other: &Lab) -> f64 {
            self.distance_squared(other).sqrt()
        }
    }

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

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        #[inline]
        fn srgb_to_linear_normalized_from_byte(srgb_value: Channel) -> LinearizedChannel {
            let table = SRGB_TO_LINEAR_LUT.get_or_init(|| {
                let mut table = [0.0f64; 256];
                for (i, entry) in table.iter_mut().enumerate() {
                    let srgb_normalized = i as f64 / 255.0;
                    *entry = if srgb_normalized <= 0.04045 {
                        srgb_normalized / 12.92
                    } else {
                        ((srgb_normalized + 0.055) / 1.055).powf(2.4)
                    };
                }
                table
            });
            table[srgb_value as usize]
        }

        /// Linear-light channels (R, G, B), each in [0, 1].
        pub fn linearized(&self) -> (LinearizedChannel, LinearizedChannel, LinearizedChannel) {
            (
                Self::srgb_to_linear_normalized_from_byte(self.red),
                Self::srgb_to_linear_normalized_from_byte(self.green),
                Self::srgb_to_linear_normalized_from_byte(self.blue),
            )
        }

        /// Converts the pixel to CIELAB through linear sRGB and XYZ (D65).
        pub fn to_lab(&self) -> Lab {
            let (r, g, b) = self.linearized();

            let x = (0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / WHITE_X;
            let y = (0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b) / WHITE_Y;
            let z = (0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b) / WHITE_Z;

            let fx = lab_f(x);
            let fy = lab_f(y);
            let fz = lab_f(z);

            Lab {
                l: 116.0 * fy - 16.0,
                a: 500.0 * (fx - fy),
                b: 200.0 * (fy - fz),
            }
        }
    }

    #[inline]
    fn lab_f(t: f64) -> f64 {
        if t > LAB_EPSILON {
            t.cbrt()
        } else {
            (LAB_KAPPA * t + 16.0) / 116.0
        }
    }

    impl From<&image::Rgb<u8>> for Pixel {
        fn from(rgb: &image::Rgb<u8>) -> Self {
            Pixel::new(rgb.0[0], rgb.0[1], rgb.0[2])
        }
    }

    impl From<Pixel> for image::Rgb<u8> {
        fn from(pixel: Pixel) -> Self {
            image::Rgb([pixel.red, pixel.green, pixel.blue])
        }
    }
}
