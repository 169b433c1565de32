//! Pure geometry for boxes and polygons.
//!
//! Everything the engine knows about coordinates lives here: the canonical
//! XYWH bounding box, polygon vertices, shoelace areas, and IoU. All
//! functions are pure and never touch the persistence port.
//!
//! # Design Principles
//!
//! 1. **Type Safety**: Marker types prevent mixing pixel and normalized
//!    coordinates at compile time; crossing between the two spaces always
//!    goes through an explicit conversion that takes the image dimensions.
//!
//! 2. **Permissive Construction**: Malformed wire data (short bbox arrays,
//!    negative extents) is representable and yields zero areas, so parsers
//!    degrade gracefully instead of panicking.

mod bbox;
mod point;
mod space;

pub use bbox::BBox;
pub use point::Point;
pub use space::{Normalized, Pixel};

/// Computes the area enclosed by a polygon via the shoelace formula.
///
/// The ring is treated as closed (the last vertex connects back to the
/// first). Rings with fewer than three vertices cannot enclose area, so
/// the enclosing box's area is returned instead.
pub fn polygon_area<TSpace>(points: &[Point<TSpace>]) -> f64 {
    if points.len() < 3 {
        return bounding_box_of(points).area();
    }

    let mut doubled = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        doubled += p.x * q.y - q.x * p.y;
    }
    doubled.abs() / 2.0
}

/// Returns the tightest axis-aligned box enclosing all points.
///
/// An empty slice yields the default zero box.
pub fn bounding_box_of<TSpace>(points: &[Point<TSpace>]) -> BBox<TSpace> {
    let Some(first) = points.first() else {
        return BBox::default();
    };

    let mut xmin = first.x;
    let mut ymin = first.y;
    let mut xmax = first.x;
    let mut ymax = first.y;

    for p in &points[1..] {
        xmin = xmin.min(p.x);
        ymin = ymin.min(p.y);
        xmax = xmax.max(p.x);
        ymax = ymax.max(p.y);
    }

    BBox::from_corners(xmin, ymin, xmax, ymax)
}
