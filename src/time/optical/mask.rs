//! Stamp isolation by color
//!
//! Camera date stamps are rendered in a saturated orange. Pixels inside that
//! hue band become the mask; everything else is treated as background.

use image::imageops;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use palette::{Hsv, IntoColor, Srgb};

/// Stamp pixel value in masks and background value in the inverted view
const ON: u8 = 255;
const OFF: u8 = 0;

/// HSV window selecting stamp-colored pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarmBand {
    /// Lowest hue, degrees
    pub hue_min: f32,
    /// Highest hue, degrees
    pub hue_max: f32,
    /// Minimum saturation on a 0-255 scale
    pub min_saturation: u8,
    /// Minimum value on a 0-255 scale
    pub min_value: u8,
}

impl Default for WarmBand {
    /// Hue 5-25 on the 0-180 scale used by most vision libraries, i.e. 10-50 degrees
    fn default() -> Self {
        Self {
            hue_min: 10.0,
            hue_max: 50.0,
            min_saturation: 50,
            min_value: 50,
        }
    }
}

impl WarmBand {
    pub fn contains(&self, pixel: Rgb<u8>) -> bool {
        let [r, g, b] = pixel.0;
        let hsv: Hsv = Srgb::new(r, g, b).into_format::<f32>().into_color();

        let saturation = (hsv.saturation * 255.0).round();
        let value = (hsv.value * 255.0).round();
        if saturation < f32::from(self.min_saturation) || value < f32::from(self.min_value) {
            return false;
        }

        let hue = hsv.hue.into_positive_degrees();
        (self.hue_min..=self.hue_max).contains(&hue)
    }

    /// Binary mask: 255 where the pixel is stamp-colored, 0 elsewhere
    pub fn mask(&self, image: &RgbImage) -> GrayImage {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if self.contains(*image.get_pixel(x, y)) {
                Luma([ON])
            } else {
                Luma([OFF])
            }
        })
    }
}

/// The two complementary images handed to the recognizer
#[derive(Debug, Clone)]
pub struct RecognitionViews {
    /// Original colors where the mask is set, black elsewhere
    pub masked: RgbImage,
    /// Inverted mask: stamp pixels black on a white background
    pub inverted: GrayImage,
}

impl RecognitionViews {
    pub fn from_image(image: &DynamicImage, band: &WarmBand) -> Self {
        let rgb = image.to_rgb8();
        let mask = band.mask(&rgb);

        let masked = RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            if mask.get_pixel(x, y).0[0] == ON {
                *rgb.get_pixel(x, y)
            } else {
                Rgb([0, 0, 0])
            }
        });

        let mut inverted = mask;
        imageops::invert(&mut inverted);

        Self { masked, inverted }
    }

    /// No stamp-colored pixel at all
    pub fn is_blank(&self) -> bool {
        self.inverted.pixels().all(|p| p.0[0] == ON)
    }

    /// Both views turned clockwise by `quarter_turns` * 90 degrees
    pub fn rotated(&self, quarter_turns: usize) -> Self {
        match quarter_turns % 4 {
            0 => self.clone(),
            1 => Self {
                masked: imageops::rotate90(&self.masked),
                inverted: imageops::rotate90(&self.inverted),
            },
            2 => Self {
                masked: imageops::rotate180(&self.masked),
                inverted: imageops::rotate180(&self.inverted),
            },
            _ => Self {
                masked: imageops::rotate270(&self.masked),
                inverted: imageops::rotate270(&self.inverted),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORANGE: Rgb<u8> = Rgb([255, 140, 0]);
    const GRAY: Rgb<u8> = Rgb([120, 120, 120]);

    #[test]
    fn test_warm_band_membership() {
        let band = WarmBand::default();
        assert!(band.contains(ORANGE));
        assert!(band.contains(Rgb([230, 100, 40])));
        assert!(!band.contains(GRAY));
        assert!(!band.contains(Rgb([0, 0, 255])));
        assert!(!band.contains(Rgb([0, 200, 0])));
        // Hue fits but too dark
        assert!(!band.contains(Rgb([40, 20, 0])));
        // Hue fits but washed out
        assert!(!band.contains(Rgb([255, 240, 225])));
    }

    #[test]
    fn test_views_are_complementary() {
        let mut img = RgbImage::from_pixel(6, 3, GRAY);
        img.put_pixel(1, 1, ORANGE);
        img.put_pixel(4, 2, ORANGE);

        let views = RecognitionViews::from_image(&DynamicImage::ImageRgb8(img), &WarmBand::default());
        assert!(!views.is_blank());

        assert_eq!(*views.masked.get_pixel(1, 1), ORANGE);
        assert_eq!(*views.masked.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(views.inverted.get_pixel(1, 1).0[0], 0);
        assert_eq!(views.inverted.get_pixel(4, 2).0[0], 0);
        assert_eq!(views.inverted.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_no_warm_pixels_is_blank() {
        let img = RgbImage::from_pixel(5, 5, GRAY);
        let views = RecognitionViews::from_image(&DynamicImage::ImageRgb8(img), &WarmBand::default());
        assert!(views.is_blank());
        assert!(views.masked.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let img = RgbImage::from_pixel(6, 3, ORANGE);
        let views = RecognitionViews::from_image(&DynamicImage::ImageRgb8(img), &WarmBand::default());

        let quarter = views.rotated(1);
        assert_eq!(quarter.masked.dimensions(), (3, 6));
        assert_eq!(quarter.inverted.dimensions(), (3, 6));
        assert_eq!(views.rotated(2).masked.dimensions(), (6, 3));
        assert_eq!(views.rotated(3).inverted.dimensions(), (3, 6));
        assert_eq!(views.rotated(4).masked.dimensions(), (6, 3));
    }
}
