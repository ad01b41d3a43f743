use image::{DynamicImage, Rgb, RgbImage};

/// Pixels the frame processor adds on each side of a bright square: one from the
/// 3x3 smoothing spread and two from the 5x5 dilation.
pub const MASK_GROWTH: u32 = 3;

/// A black road frame.
pub fn empty_frame(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
}

/// A black frame with white squares. Each square is given by the centre and side
/// of the blob it will become after masking, so a `blob_side` of 100 draws a
/// 94-pixel square.
pub fn frame_with_blobs(width: u32, height: u32, blobs: &[(u32, u32, u32)]) -> DynamicImage {
    let mut image = RgbImage::new(width, height);
    for &(cx, cy, blob_side) in blobs {
        assert!(blob_side > 2 * MASK_GROWTH, "blob too small to draw");
        let side = blob_side - 2 * MASK_GROWTH;
        let left = cx - blob_side / 2 + MASK_GROWTH;
        let top = cy - blob_side / 2 + MASK_GROWTH;
        for y in top..top + side {
            for x in left..left + side {
                image.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
    }
    DynamicImage::ImageRgb8(image)
}

/// A warm-up frame followed by one frame per centroid row, each with a single blob.
pub fn moving_blob_sequence(
    width: u32,
    height: u32,
    cx: u32,
    rows: &[u32],
    blob_side: u32,
) -> Vec<DynamicImage> {
    let mut frames = vec![empty_frame(width, height)];
    frames.extend(
        rows.iter()
            .map(|&cy| frame_with_blobs(width, height, &[(cx, cy, blob_side)])),
    );
    frames
}
