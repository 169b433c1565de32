//! Bounding box type in canonical XYWH format.

use serde::{Deserialize, Serialize};

use super::{Normalized, Pixel};

/// An axis-aligned bounding box in XYWH format: (x, y) is the top-left
/// corner, `width` and `height` are the extents.
///
/// The `TSpace` parameter should be either [`Pixel`](super::Pixel) or
/// [`Normalized`](super::Normalized), ensuring type safety across
/// coordinate spaces.
///
/// Note: This type does NOT enforce non-negative extents in the
/// constructor, allowing "malformed" boxes to exist in memory. Parsers
/// report or zero out such boxes rather than panicking on them.
#[derive(Clone, Copy, PartialEq)]
pub struct BBox<TSpace> {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    _space: std::marker::PhantomData<TSpace>,
}

impl<TSpace> BBox<TSpace> {
    /// Creates a new bounding box from its top-left corner and extents.
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            _space: std::marker::PhantomData,
        }
    }

    /// Converts from corner format (xmin, ymin, xmax, ymax).
    ///
    /// This is the format used by per-image XML annotations.
    #[inline]
    pub fn from_corners(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self::new(xmin, ymin, xmax - xmin, ymax - ymin)
    }

    /// Builds a box from the first four values of a wire-side array.
    ///
    /// Missing fields are zero-filled, so a short array yields a box with
    /// zero area rather than an error. This mirrors how lenient the
    /// interchange formats are about malformed `bbox` arrays.
    pub fn from_slice(values: &[f64]) -> Self {
        let mut fields = [0.0; 4];
        for (slot, value) in fields.iter_mut().zip(values.iter()) {
            *slot = *value;
        }
        Self::new(fields[0], fields[1], fields[2], fields[3])
    }

    /// Returns the box as a `[x, y, width, height]` array.
    #[inline]
    pub fn to_array(&self) -> [f64; 4] {
        [self.x, self.y, self.width, self.height]
    }

    /// Returns the minimum x coordinate.
    #[inline]
    pub fn xmin(&self) -> f64 {
        self.x
    }

    /// Returns the minimum y coordinate.
    #[inline]
    pub fn ymin(&self) -> f64 {
        self.y
    }

    /// Returns the maximum x coordinate.
    #[inline]
    pub fn xmax(&self) -> f64 {
        self.x + self.width
    }

    /// Returns the maximum y coordinate.
    #[inline]
    pub fn ymax(&self) -> f64 {
        self.y + self.height
    }

    /// Returns the area of the bounding box.
    ///
    /// May be negative if the box is malformed.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Returns the center of the box as (cx, cy).
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Converts from center format (cx, cy, width, height).
    ///
    /// This is the per-line layout used by the normalized text format.
    #[inline]
    pub fn from_center(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    /// Returns true if all fields are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    /// Intersection-over-union with another box in the same space.
    ///
    /// The intersection is the overlap rectangle (zero when the boxes are
    /// disjoint); the union is `area(a) + area(b) - intersection`. Returns
    /// 0.0 when the union is not positive, so degenerate boxes never
    /// produce NaN.
    pub fn iou(&self, other: &Self) -> f64 {
        let left = self.xmin().max(other.xmin());
        let top = self.ymin().max(other.ymin());
        let right = self.xmax().min(other.xmax());
        let bottom = self.ymax().min(other.ymax());

        if right < left || bottom < top {
            return 0.0;
        }

        let intersection = (right - left) * (bottom - top);
        let union = self.area() + other.area() - intersection;

        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

impl<TSpace> std::fmt::Debug for BBox<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBox")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl<TSpace> Default for BBox<TSpace> {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

// Custom serde implementation to avoid TSpace: Serialize/Deserialize bounds
impl<TSpace> Serialize for BBox<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BBox", 4)?;
        state.serialize_field("x", &self.x)?;
        state.serialize_field("y", &self.y)?;
        state.serialize_field("width", &self.width)?;
        state.serialize_field("height", &self.height)?;
        state.end()
    }
}

impl<'de, TSpace> Deserialize<'de> for BBox<TSpace> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct BBoxData {
            x: f64,
            y: f64,
            width: f64,
            height: f64,
        }
        let data = BBoxData::deserialize(deserializer)?;
        Ok(BBox::new(data.x, data.y, data.width, data.height))
    }
}

impl BBox<Pixel> {
    /// Converts pixel coordinates to normalized coordinates.
    ///
    /// # Arguments
    /// * `image_width` - The width of the image in pixels
    /// * `image_height` - The height of the image in pixels
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> BBox<Normalized> {
        BBox::new(
            self.x / image_width,
            self.y / image_height,
            self.width / image_width,
            self.height / image_height,
        )
    }
}

impl BBox<Normalized> {
    /// Converts normalized coordinates to pixel coordinates.
    ///
    /// # Arguments
    /// * `image_width` - The width of the image in pixels
    /// * `image_height` - The height of the image in pixels
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> BBox<Pixel> {
        BBox::new(
            self.x * image_width,
            self.y * image_height,
            self.width * image_width,
            self.height * image_height,
        )
    }
}
