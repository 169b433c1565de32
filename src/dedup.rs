//! IoU-based duplicate detection.
//!
//! Before inserting an annotation, callers ask whether the same image
//! already carries an annotation of the same category whose geometry
//! overlaps the candidate beyond a threshold. The threshold is chosen per
//! call site: manual creation and prediction recording use 0.90, and each
//! import adapter pins its own value.

use crate::error::AnnoportError;
use crate::geometry::{BBox, Pixel};
use crate::model::{AnnotationId, AnnotationRecord, CategoryId, ImageId};
use crate::store::{DocumentStore, Filter, Stored};

/// An existing annotation that makes the candidate a duplicate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DuplicateMatch {
    pub annotation_id: AnnotationId,
    /// The overlap that crossed the threshold.
    pub iou: f64,
}

/// Scans an image for an annotation duplicating the candidate box.
///
/// The category is matched by id or by display name, whichever the caller
/// knows; with neither, every annotation on the image is considered. Each
/// existing annotation is compared twice: first against its
/// `original_bbox` when present, so a prediction rescaled by a client
/// still collides with itself, then against its current `bbox`. The first
/// annotation (in insertion order) whose overlap reaches `threshold`
/// wins.
pub fn find_duplicate<S: DocumentStore>(
    store: &S,
    image_id: ImageId,
    category_id: Option<CategoryId>,
    category_name: Option<&str>,
    candidate: &BBox<Pixel>,
    threshold: f64,
) -> Result<Option<DuplicateMatch>, AnnoportError> {
    let mut category_refs = Vec::new();
    if let Some(id) = category_id {
        category_refs.push(Filter::eq("category_id", id.as_u64()));
    }
    if let Some(name) = category_name {
        category_refs.push(Filter::eq("category_name", name));
    }

    let image_filter = Filter::eq("image_id", image_id.as_u64());
    let filter = if category_refs.is_empty() {
        image_filter
    } else {
        Filter::and([image_filter, Filter::or(category_refs)])
    };

    let existing: Vec<Stored<AnnotationRecord>> = store.find_many(&filter)?;
    for annotation in &existing {
        if let Some(original) = &annotation.record.original_bbox {
            let iou = candidate.iou(original);
            if iou >= threshold {
                return Ok(Some(DuplicateMatch {
                    annotation_id: annotation.id,
                    iou,
                }));
            }
        }

        let iou = candidate.iou(&annotation.record.bbox);
        if iou >= threshold {
            return Ok(Some(DuplicateMatch {
                annotation_id: annotation.id,
                iou,
            }));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DatasetId;
    use crate::store::MemoryStore;

    fn seed_box(
        store: &mut MemoryStore,
        image: u64,
        category: Option<(u64, &str)>,
        bbox: BBox<Pixel>,
    ) -> AnnotationId {
        let mut record = AnnotationRecord::new_box(DatasetId(1), ImageId(image), bbox);
        if let Some((id, name)) = category {
            record = record.with_category(Some(CategoryId(id)), Some(name.to_string()));
        }
        store.insert_one(record).unwrap().id
    }

    #[test]
    fn test_exact_overlap_is_duplicate() {
        let mut store = MemoryStore::new();
        let bbox = BBox::new(10.0, 10.0, 50.0, 50.0);
        let id = seed_box(&mut store, 1, Some((1, "car")), bbox);

        let found = find_duplicate(&store, ImageId(1), Some(CategoryId(1)), Some("car"), &bbox, 0.9)
            .unwrap()
            .unwrap();
        assert_eq!(found.annotation_id, id);
        assert_eq!(found.iou, 1.0);
    }

    #[test]
    fn test_below_threshold_is_not_duplicate() {
        let mut store = MemoryStore::new();
        seed_box(
            &mut store,
            1,
            Some((1, "car")),
            BBox::new(0.0, 0.0, 10.0, 10.0),
        );

        // Half overlap, well under 0.9.
        let candidate = BBox::new(5.0, 0.0, 10.0, 10.0);
        let found = find_duplicate(
            &store,
            ImageId(1),
            Some(CategoryId(1)),
            Some("car"),
            &candidate,
            0.9,
        )
        .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_category_matched_by_id_or_name() {
        let mut store = MemoryStore::new();
        let bbox = BBox::new(10.0, 10.0, 50.0, 50.0);
        // Stored with only a name, as text-format imports leave it.
        let record = AnnotationRecord::new_box(DatasetId(1), ImageId(1), bbox)
            .with_category(None, Some("car".to_string()));
        store.insert_one(record).unwrap();

        // Queried with an id the stored record never saw; the name side of
        // the disjunction must still match.
        let found = find_duplicate(
            &store,
            ImageId(1),
            Some(CategoryId(42)),
            Some("car"),
            &bbox,
            0.9,
        )
        .unwrap();
        assert!(found.is_some());

        // A different category name is a different object.
        let found = find_duplicate(&store, ImageId(1), None, Some("truck"), &bbox, 0.9).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_other_image_never_matches() {
        let mut store = MemoryStore::new();
        let bbox = BBox::new(10.0, 10.0, 50.0, 50.0);
        seed_box(&mut store, 1, Some((1, "car")), bbox);

        let found =
            find_duplicate(&store, ImageId(2), Some(CategoryId(1)), Some("car"), &bbox, 0.9)
                .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_original_bbox_checked_before_current() {
        let mut store = MemoryStore::new();
        let original = BBox::new(10.0, 10.0, 50.0, 50.0);
        // The stored bbox drifted (client rescale); only original_bbox
        // still overlaps the candidate.
        let record = AnnotationRecord::new_box(
            DatasetId(1),
            ImageId(1),
            BBox::new(300.0, 300.0, 50.0, 50.0),
        )
        .with_category(Some(CategoryId(1)), Some("car".to_string()))
        .with_original_bbox(original);
        let id = store.insert_one(record).unwrap().id;

        let found = find_duplicate(
            &store,
            ImageId(1),
            Some(CategoryId(1)),
            Some("car"),
            &original,
            0.9,
        )
        .unwrap()
        .unwrap();
        assert_eq!(found.annotation_id, id);
        assert_eq!(found.iou, 1.0);
    }

    #[test]
    fn test_threshold_boundary_inclusive() {
        let mut store = MemoryStore::new();
        seed_box(
            &mut store,
            1,
            Some((1, "car")),
            BBox::new(0.0, 0.0, 10.0, 10.0),
        );

        // Intersection 80, union 120: IoU is exactly 2/3.
        let candidate = BBox::new(2.0, 0.0, 10.0, 10.0);
        let overlap = candidate.iou(&BBox::new(0.0, 0.0, 10.0, 10.0));
        assert!((overlap - 2.0 / 3.0).abs() < 1e-12);

        let found = find_duplicate(
            &store,
            ImageId(1),
            Some(CategoryId(1)),
            Some("car"),
            &candidate,
            2.0 / 3.0,
        )
        .unwrap();
        assert!(found.is_some(), "overlap equal to the threshold counts");
    }
}
