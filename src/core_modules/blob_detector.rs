// THEORY:
// The `BlobDetector` is the Spatial Grouping Layer of the counter. It takes the
// binary motion mask for one frame and turns it into a list of candidate vehicles.
//
// Key architectural principles & algorithm steps:
// 1.  **Border Following**: Every border in the mask is traced (Suzuki-Abe, as
//     implemented by `imageproc::contours`). Both outer borders and hole borders
//     are returned, in raster discovery order, which mirrors a full hierarchical
//     contour retrieval. Discovery order is not a spatial sort.
// 2.  **Bounding Boxes**: Each border is reduced to its axis-aligned bounding box.
//     The border pixels are the extreme pixels of the region, so the box of the
//     border is the box of the region.
// 3.  **Size Gate**: Any box narrower than `min_width` or shorter than `min_height`
//     is noise and is dropped. No other shape filtering is applied; two vehicles
//     whose masks touch become one blob.
// 4.  **Stateless Utility**: Like the rest of the spatial layer it has no memory of
//     previous frames.

use crate::core_modules::blob::{Blob, BoundingBox};
use crate::core_modules::frame::MotionMask;

pub mod blob_detector {
    use super::*;
    use imageproc::contours::{Contour, find_contours};

    /// Finds every region in the mask whose bounding box passes the size gate.
    pub fn find_blobs(mask: &MotionMask, min_width: u32, min_height: u32) -> Vec<Blob> {
        find_candidate_boxes(mask)
            .into_iter()
            .filter(|bbox| passes_size_gate(bbox, min_width, min_height))
            .map(Blob::new)
            .collect()
    }

    /// Bounding boxes of all borders in the mask, before any size filtering.
    pub fn find_candidate_boxes(mask: &MotionMask) -> Vec<BoundingBox> {
        let contours: Vec<Contour<i32>> = find_contours(mask.as_image());
        contours.iter().filter_map(contour_bounds).collect()
    }

    /// True when both sides of the box reach the minimum size.
    pub fn passes_size_gate(bbox: &BoundingBox, min_width: u32, min_height: u32) -> bool {
        bbox.width >= min_width && bbox.height >= min_height
    }

    fn contour_bounds(contour: &Contour<i32>) -> Option<BoundingBox> {
        let first = contour.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for point in &contour.points[1..] {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }
        Some(BoundingBox::from_corners(
            min_x.max(0) as u32,
            min_y.max(0) as u32,
            max_x.max(0) as u32,
            max_y.max(0) as u32,
        ))
    }
}
