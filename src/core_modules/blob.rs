// THEORY:
// The `blob` module holds the small value types that flow between the spatial
// and the behavioral halves of the counter. A `Blob` is one connected region of
// motion found in a single mask. It is a "dumb" data container: it knows its own
// bounding box and how to derive a centroid from it, and nothing about the
// frames before or after it.
//
// Key architectural principles:
// 1.  **Frame-Local**: A `Blob` lives for exactly one pipeline iteration. Anything
//     that survives across frames is reduced to a bare `Point` by the tracker.
// 2.  **Integer Geometry**: Boxes and centroids stay in whole pixels. The centroid
//     is `x + width / 2, y + height / 2` with truncating division, which keeps the
//     crossing test an exact comparison against a pixel row.

/// A 2D pixel coordinate in frame space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point, in pixels.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An axis-aligned rectangle given by its top-left corner and its size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Builds the smallest box covering the inclusive corner range.
    pub fn from_corners(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x.saturating_sub(min_x) + 1,
            height: max_y.saturating_sub(min_y) + 1,
        }
    }

    pub fn centroid(&self) -> Point {
        Point {
            x: self.x + self.width / 2,
            y: self.y + self.height / 2,
        }
    }

    /// Clips the box to a `width` x `height` raster. Returns `None` when nothing remains.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let clipped_w = self.width.min(width - self.x);
        let clipped_h = self.height.min(height - self.y);
        if clipped_w == 0 || clipped_h == 0 {
            return None;
        }
        Some(BoundingBox::new(self.x, self.y, clipped_w, clipped_h))
    }
}

/// One connected region of motion detected in the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    /// The rectangle enclosing every border pixel of the region.
    pub bounding_box: BoundingBox,
}

impl Blob {
    pub fn new(bounding_box: BoundingBox) -> Self {
        Self { bounding_box }
    }

    pub fn centroid(&self) -> Point {
        self.bounding_box.centroid()
    }

    pub fn width(&self) -> u32 {
        self.bounding_box.width
    }

    pub fn height(&self) -> u32 {
        self.bounding_box.height
    }
}
