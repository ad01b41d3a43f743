// THEORY:
// The `frame` module defines the two rasters the pipeline passes around: the
// incoming colour `Frame` and the binary `MotionMask` derived from it.
//
// Key architectural principles:
// 1.  **Immutable Input**: A `Frame` is built once by a frame source and only read
//     afterwards. Its fields are private; consumers see accessors.
// 2.  **Single Iteration Lifetime**: Neither raster is retained across frames by
//     the counting logic. The only long-lived state is in the background model and
//     the tracker.
// 3.  **Binary Mask Convention**: A mask pixel is either 0 (background) or 255
//     (foreground). The blob detector treats any non-zero value as foreground, so
//     intermediate morphology output never needs re-thresholding.

use crate::core_modules::blob::BoundingBox;
use chrono::{DateTime, Local};
use image::{DynamicImage, GrayImage, Luma};

/// Pixel value marking foreground in a `MotionMask`.
pub const FOREGROUND: u8 = 255;
/// Pixel value marking background in a `MotionMask`.
pub const BACKGROUND: u8 = 0;

/// One decoded video frame plus the metadata the pipeline needs.
#[derive(Debug, Clone)]
pub struct Frame {
    index: u64,
    captured_at: DateTime<Local>,
    image: DynamicImage,
}

impl Frame {
    /// Wraps an image, stamping it with the current wall-clock time.
    pub fn new(index: u64, image: DynamicImage) -> Self {
        Self::with_timestamp(index, Local::now(), image)
    }

    pub fn with_timestamp(index: u64, captured_at: DateTime<Local>, image: DynamicImage) -> Self {
        Self {
            index,
            captured_at,
            image,
        }
    }

    /// Position of this frame in the source sequence, starting at 0.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of colour channels in the underlying raster.
    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Copies the given region out of the frame, clipped to the frame bounds.
    pub fn crop(&self, region: &BoundingBox) -> Option<DynamicImage> {
        let clipped = region.clamp_to(self.width(), self.height())?;
        Some(
            self.image
                .crop_imm(clipped.x, clipped.y, clipped.width, clipped.height),
        )
    }
}

/// A binary foreground map with the same dimensions as the frame it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionMask {
    image: GrayImage,
}

impl MotionMask {
    pub fn from_image(image: GrayImage) -> Self {
        Self { image }
    }

    /// An all-background mask.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([BACKGROUND])),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y)[0] != BACKGROUND
    }

    pub fn foreground_pixels(&self) -> usize {
        self.image.pixels().filter(|p| p[0] != BACKGROUND).count()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn frame_reports_dimensions_and_channels() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([1, 2, 3])));
        let frame = Frame::new(7, image);
        assert_eq!(frame.index(), 7);
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert_eq!(frame.channels(), 3);
    }

    #[test]
    fn crop_is_clipped_to_frame() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 100));
        let frame = Frame::new(0, image);
        let crop = frame.crop(&BoundingBox::new(80, 90, 40, 40)).unwrap();
        assert_eq!((crop.width(), crop.height()), (20, 10));
        assert!(frame.crop(&BoundingBox::new(100, 0, 5, 5)).is_none());
    }

    #[test]
    fn mask_counts_foreground() {
        let mut image = GrayImage::new(10, 10);
        image.put_pixel(2, 3, Luma([FOREGROUND]));
        image.put_pixel(4, 5, Luma([FOREGROUND]));
        let mask = MotionMask::from_image(image);
        assert_eq!(mask.foreground_pixels(), 2);
        assert!(mask.is_foreground(2, 3));
        assert!(!mask.is_foreground(0, 0));
        assert_eq!(MotionMask::empty(4, 4).foreground_pixels(), 0);
    }
}
