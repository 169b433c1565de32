//! Interchange-JSON adapter.
//!
//! Speaks the COCO-style document: top-level `images`, `annotations`, and
//! `categories` collections plus an optional `videos` extension for frame
//! provenance. Import accepts a single document or a ZIP archive of
//! documents; an archive is merged into one document before any record is
//! touched. Export renders the dataset back out with sequential wire ids,
//! either as one JSON file or as a train/val/test archive.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::dedup::find_duplicate;
use crate::error::AnnoportError;
use crate::formats::{
    annotations_for_images, dataset_categories, selected_images, write_archive, ExportOptions,
    ExportedFile, ImportIssue, ImportStats, ListedImage,
};
use crate::geometry::{bounding_box_of, polygon_area, BBox, Pixel, Point};
use crate::model::{
    AnnotationRecord, AnnotationSource, CategoryCreator, CategoryId, CategoryRecord,
    DatasetContext, ImageId, ImageRecord, ShapeKind, VideoRecord,
};
use crate::payload::{self, PayloadKind};
use crate::reconcile::{reconcile_categories, CategorySpec};
use crate::split::split_images;
use crate::store::{DocumentStore, Filter, Stored};

/// Overlap at or above this suppresses an incoming annotation.
const DUPLICATE_IOU: f64 = 0.90;

// Wire-side structures. These are kept private; the public API accepts
// raw payload bytes and returns engine records or exported bytes.

#[derive(Debug, Serialize, Deserialize)]
struct CocoDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    info: Option<CocoInfo>,
    /// Always serialized, even when empty.
    #[serde(default)]
    videos: Vec<CocoVideo>,
    #[serde(default)]
    images: Vec<CocoImage>,
    #[serde(default)]
    annotations: Vec<CocoAnnotation>,
    #[serde(default)]
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    supports_video: Option<bool>,
    /// Set only on documents produced by merging an archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merged_files: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoVideo {
    id: u64,
    file_name: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    fps: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    total_frames: u32,
    #[serde(default)]
    extracted_frames: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoImage {
    id: u64,
    file_name: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_captured: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    video_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frame_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoCategory {
    id: u64,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    supercategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoAnnotation {
    #[serde(default)]
    id: u64,
    image_id: u64,
    category_id: u64,
    /// XYWH; short or missing arrays are zero-filled on import.
    #[serde(default)]
    bbox: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iscrowd: Option<u8>,
    /// `[[x1, y1, x2, y2, ...]]` when the annotation is a polygon.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    segmentation: serde_json::Value,
}

/// Lists the images an interchange payload declares, without touching a
/// store. Archives are merged first, the same way the import does.
pub fn listed_images(bytes: &[u8], item: &str) -> Result<Vec<ListedImage>, AnnoportError> {
    let document = parse_payload(bytes, item)?;
    Ok(document
        .images
        .iter()
        .map(|image| ListedImage {
            file_name: image.file_name.clone(),
            width: image.width,
            height: image.height,
        })
        .collect())
}

/// Imports an interchange-JSON payload into the dataset.
///
/// `bytes` may be a single JSON document or a ZIP archive of documents.
/// Categories the payload names are created if absent; images must
/// already exist in the dataset and are matched by file name. Incoming
/// annotations whose box overlaps an existing annotation of the same
/// category at IoU >= 0.9 are skipped as duplicates.
pub fn import_coco<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    bytes: &[u8],
    item: &str,
) -> Result<ImportStats, AnnoportError> {
    let document = parse_payload(bytes, item)?;
    import_document(store, ctx, document, item)
}

/// Parses payload bytes into a single document, merging archives.
fn parse_payload(bytes: &[u8], item: &str) -> Result<CocoDocument, AnnoportError> {
    match payload::sniff(bytes) {
        PayloadKind::Json => {
            serde_json::from_slice(bytes).map_err(|source| AnnoportError::JsonParse {
                item: item.to_string(),
                source,
            })
        }
        PayloadKind::Archive => {
            let mut documents = Vec::new();
            for entry in payload::archive_entries(bytes, item)? {
                if entry.extension().as_deref() != Some("json") {
                    continue;
                }
                match serde_json::from_slice::<CocoDocument>(&entry.bytes) {
                    Ok(document) => documents.push(document),
                    Err(err) => {
                        tracing::warn!(entry = %entry.name, "skipping unparseable entry: {err}");
                    }
                }
            }
            match documents.len() {
                0 => Err(AnnoportError::EmptyArchive {
                    item: item.to_string(),
                }),
                1 => Ok(documents.remove(0)),
                _ => Ok(merge_coco_documents(documents)),
            }
        }
        PayloadKind::Invalid => Err(AnnoportError::InvalidPayload {
            item: item.to_string(),
        }),
    }
}

/// Fuzz-only entrypoint for payload parsing and archive merging.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_payload(bytes: &[u8]) {
    let _ = parse_payload(bytes, "<fuzz>");
}

/// Merges several documents into one.
///
/// Images are deduplicated by (id, file name) pair; categories by name,
/// where the first occurrence keeps its id and later ids are remapped
/// onto it. Annotations are renumbered sequentially across all documents
/// with their category reference rewritten. Image references are left as
/// the source documents had them.
fn merge_coco_documents(documents: Vec<CocoDocument>) -> CocoDocument {
    let mut merged = CocoDocument {
        info: Some(CocoInfo {
            description: Some("Merged COCO dataset".to_string()),
            version: None,
            date_created: Some(Utc::now().to_rfc3339()),
            supports_video: None,
            merged_files: Some(documents.len()),
        }),
        videos: Vec::new(),
        images: Vec::new(),
        annotations: Vec::new(),
        categories: Vec::new(),
    };

    let mut seen_images: BTreeSet<(u64, String)> = BTreeSet::new();
    let mut kept_by_name: BTreeMap<String, u64> = BTreeMap::new();
    // Old-to-kept category ids, carried across documents; a later document
    // reusing an id overwrites the mapping before its own annotations are
    // remapped.
    let mut category_ids: BTreeMap<u64, u64> = BTreeMap::new();
    let mut next_annotation_id = 1u64;

    for document in documents {
        for image in document.images {
            if seen_images.insert((image.id, image.file_name.clone())) {
                merged.images.push(image);
            }
        }

        for category in document.categories {
            match kept_by_name.get(&category.name) {
                Some(&kept) => {
                    category_ids.insert(category.id, kept);
                }
                None => {
                    kept_by_name.insert(category.name.clone(), category.id);
                    category_ids.insert(category.id, category.id);
                    merged.categories.push(category);
                }
            }
        }

        for mut annotation in document.annotations {
            annotation.id = next_annotation_id;
            next_annotation_id += 1;
            if let Some(&mapped) = category_ids.get(&annotation.category_id) {
                annotation.category_id = mapped;
            }
            merged.annotations.push(annotation);
        }
    }

    merged
}

fn import_document<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    document: CocoDocument,
    item: &str,
) -> Result<ImportStats, AnnoportError> {
    let mut stats = ImportStats::default();

    // Categories first, so every annotation has something to resolve
    // against. Wire colors are honored when they are valid and free.
    let specs: Vec<CategorySpec> = document
        .categories
        .iter()
        .map(|category| {
            let mut spec = CategorySpec::named(&category.name);
            if let Some(color) = &category.color {
                spec = spec.with_color_hint(color);
            }
            spec
        })
        .collect();
    let reconciled = reconcile_categories(store, ctx, &specs, CategoryCreator::System, None)?;
    stats.categories_created = reconciled.created.len() as u64;

    let mut category_ids: BTreeMap<u64, CategoryId> = BTreeMap::new();
    let mut category_names: BTreeMap<u64, String> = BTreeMap::new();
    for category in &document.categories {
        if let Some(id) = reconciled.id_of(&category.name) {
            category_ids.insert(category.id, id);
            category_names.insert(category.id, category.name.clone());
        }
    }

    // Images are matched by file name within the dataset, never created.
    let mut image_ids: BTreeMap<u64, ImageId> = BTreeMap::new();
    for image in &document.images {
        let found: Option<Stored<ImageRecord>> = store.find_one(&Filter::and([
            Filter::eq("dataset_id", ctx.dataset_id.as_u64()),
            Filter::eq("file_name", image.file_name.as_str()),
        ]))?;
        match found {
            Some(stored) => {
                image_ids.insert(image.id, stored.id);
                stats.images_matched += 1;
            }
            None => stats.add(ImportIssue::reference(
                item,
                format!("image '{}' not found in dataset", image.file_name),
            )),
        }
    }

    let listed_image_ids: BTreeSet<u64> = document.images.iter().map(|i| i.id).collect();
    let listed_category_ids: BTreeSet<u64> = document.categories.iter().map(|c| c.id).collect();

    let mut touched: BTreeSet<CategoryId> = BTreeSet::new();
    for annotation in &document.annotations {
        // An image that was listed but not matched has already produced
        // one issue above; only dangling references are reported here.
        let Some(&image_id) = image_ids.get(&annotation.image_id) else {
            if !listed_image_ids.contains(&annotation.image_id) {
                stats.add(ImportIssue::reference(
                    item,
                    format!(
                        "annotation {} references image id {} not listed in the document",
                        annotation.id, annotation.image_id
                    ),
                ));
            }
            continue;
        };
        let Some(&category_id) = category_ids.get(&annotation.category_id) else {
            if !listed_category_ids.contains(&annotation.category_id) {
                stats.add(ImportIssue::reference(
                    item,
                    format!(
                        "annotation {} references category id {} not listed in the document",
                        annotation.id, annotation.category_id
                    ),
                ));
            }
            continue;
        };
        let category_name = category_names.get(&annotation.category_id).cloned();

        let bbox = BBox::from_slice(&annotation.bbox);
        let mut record = AnnotationRecord::new_box(ctx.dataset_id, image_id, bbox)
            .with_category(Some(category_id), category_name.clone())
            .with_source(AnnotationSource::Imported);
        if let Some(points) = polygon_ring(&annotation.segmentation) {
            record.shape = ShapeKind::Polygon;
            record.points = points;
        }
        // A zero or absent area falls back to the shape's own geometry.
        let fallback = match record.shape {
            ShapeKind::Polygon => polygon_area(&record.points),
            ShapeKind::Box => record.bbox.area(),
        };
        record.area = annotation.area.filter(|a| *a != 0.0).unwrap_or(fallback);

        let duplicate = find_duplicate(
            store,
            image_id,
            Some(category_id),
            category_name.as_deref(),
            &record.bbox,
            DUPLICATE_IOU,
        )?;
        if let Some(existing) = duplicate {
            tracing::debug!(
                of = existing.annotation_id.as_u64(),
                iou = existing.iou,
                "skipping duplicate annotation"
            );
            stats.duplicates_skipped += 1;
            continue;
        }

        match store.insert_one(record) {
            Ok(_) => {
                stats.annotations_created += 1;
                touched.insert(category_id);
            }
            Err(err) => stats.add(ImportIssue::persistence(
                item,
                format!("annotation {} could not be stored: {err}", annotation.id),
            )),
        }
    }

    // Denormalized tallies for every category that gained annotations.
    for category_id in touched {
        let count = store
            .count_documents::<AnnotationRecord>(&Filter::eq("category_id", category_id.as_u64()))?;
        store.update_one::<CategoryRecord>(category_id, |category| {
            category.annotation_count = count;
        })?;
    }

    Ok(stats)
}

/// Decodes the first segmentation ring into vertices. Rings shorter than
/// three vertices and non-numeric rings are treated as no polygon.
fn polygon_ring(segmentation: &serde_json::Value) -> Option<Vec<Point<Pixel>>> {
    let ring = segmentation.as_array()?.first()?.as_array()?;
    if ring.len() < 6 {
        return None;
    }
    let coords: Vec<f64> = ring.iter().filter_map(|v| v.as_f64()).collect();
    if coords.len() != ring.len() {
        return None;
    }
    Some(
        coords
            .chunks_exact(2)
            .map(|pair| Point::new(pair[0], pair[1]))
            .collect(),
    )
}

/// Exports the dataset as interchange JSON.
///
/// Without a split this renders one pretty-printed document; with one it
/// renders a ZIP archive holding `<subset>/annotations.json` per non-empty
/// subset. Wire ids are sequential from 1 in both cases.
pub fn export_coco<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
    opts: &ExportOptions,
) -> Result<ExportedFile, AnnoportError> {
    let images = selected_images(store, ctx, opts)?;
    let categories = dataset_categories(store, ctx)?;

    match opts.split {
        None => {
            let annotations = annotations_for_images(store, &images)?;
            let videos: Vec<Stored<VideoRecord>> =
                store.find_many(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?;
            let document = build_document(ctx, &images, &annotations, &categories, &videos);

            let file_name = format!("{}_coco.json", ctx.dataset_name);
            let bytes = serde_json::to_vec_pretty(&document).map_err(|source| {
                AnnoportError::JsonWrite {
                    item: file_name.clone(),
                    source,
                }
            })?;
            Ok(ExportedFile {
                file_name,
                content_type: "application/json",
                bytes,
            })
        }
        Some(ratios) => {
            let ids: Vec<ImageId> = images.iter().map(|img| img.id).collect();
            let split = split_images(&ids, &ratios, opts.seed)?;
            let by_id: BTreeMap<u64, &Stored<ImageRecord>> =
                images.iter().map(|img| (img.id.as_u64(), img)).collect();

            let file_name = format!("{}_coco_split.zip", ctx.dataset_name);
            let mut entries = Vec::new();
            for (subset, members) in split.named_subsets() {
                let subset_images: Vec<Stored<ImageRecord>> = members
                    .iter()
                    .filter_map(|id| by_id.get(&id.as_u64()).map(|&img| img.clone()))
                    .collect();
                let annotations = annotations_for_images(store, &subset_images)?;
                let videos = referenced_videos(store, ctx, &subset_images)?;
                let document =
                    build_document(ctx, &subset_images, &annotations, &categories, &videos);
                let bytes = serde_json::to_vec_pretty(&document).map_err(|source| {
                    AnnoportError::JsonWrite {
                        item: file_name.clone(),
                        source,
                    }
                })?;
                entries.push((format!("{subset}/annotations.json"), bytes));
            }

            let bytes = write_archive(&entries, &file_name)?;
            Ok(ExportedFile {
                file_name,
                content_type: "application/zip",
                bytes,
            })
        }
    }
}

/// Fetches only the videos the given images were extracted from.
fn referenced_videos<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
    images: &[Stored<ImageRecord>],
) -> Result<Vec<Stored<VideoRecord>>, AnnoportError> {
    let wanted: BTreeSet<u64> = images
        .iter()
        .filter_map(|img| img.record.video_id.map(|v| v.as_u64()))
        .collect();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let videos: Vec<Stored<VideoRecord>> =
        store.find_many(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?;
    Ok(videos
        .into_iter()
        .filter(|video| wanted.contains(&video.id.as_u64()))
        .collect())
}

fn build_document(
    ctx: &DatasetContext,
    images: &[Stored<ImageRecord>],
    annotations: &[Stored<AnnotationRecord>],
    categories: &[Stored<CategoryRecord>],
    videos: &[Stored<VideoRecord>],
) -> CocoDocument {
    let description = if ctx.dataset_name.is_empty() {
        "Dataset".to_string()
    } else {
        ctx.dataset_name.clone()
    };
    let mut document = CocoDocument {
        info: Some(CocoInfo {
            description: Some(description),
            version: Some("1.0".to_string()),
            date_created: Some(Utc::now().to_rfc3339()),
            supports_video: Some(true),
            merged_files: None,
        }),
        videos: Vec::new(),
        images: Vec::new(),
        annotations: Vec::new(),
        categories: Vec::new(),
    };

    let mut video_wire_ids: BTreeMap<u64, u64> = BTreeMap::new();
    for (index, video) in videos.iter().enumerate() {
        let wire_id = index as u64 + 1;
        video_wire_ids.insert(video.id.as_u64(), wire_id);
        document.videos.push(CocoVideo {
            id: wire_id,
            file_name: video.record.file_name.clone(),
            width: video.record.width,
            height: video.record.height,
            fps: video.record.fps,
            duration: video.record.duration_seconds,
            total_frames: video.record.total_frames,
            extracted_frames: video.record.extracted_frames,
        });
    }

    let mut category_wire_ids: BTreeMap<u64, u64> = BTreeMap::new();
    for (index, category) in categories.iter().enumerate() {
        let wire_id = index as u64 + 1;
        category_wire_ids.insert(category.id.as_u64(), wire_id);
        document.categories.push(CocoCategory {
            id: wire_id,
            name: category.record.name.clone(),
            supercategory: Some("object".to_string()),
            color: Some(category.record.color.clone()),
        });
    }

    let mut image_wire_ids: BTreeMap<u64, u64> = BTreeMap::new();
    for (index, image) in images.iter().enumerate() {
        let wire_id = index as u64 + 1;
        image_wire_ids.insert(image.id.as_u64(), wire_id);
        let mut entry = CocoImage {
            id: wire_id,
            file_name: image.record.file_name.clone(),
            width: image.record.width,
            height: image.record.height,
            date_captured: Some(image.record.created_at.to_rfc3339()),
            video_id: None,
            frame_number: None,
            timestamp: None,
        };
        if let Some(video_id) = image.record.video_id {
            if let Some(&wire_video) = video_wire_ids.get(&video_id.as_u64()) {
                entry.video_id = Some(wire_video);
                entry.frame_number = Some(image.record.frame_index.unwrap_or(0));
                entry.timestamp = Some(image.record.frame_timestamp.unwrap_or(0.0));
            }
        }
        document.images.push(entry);
    }

    let mut next_id = 1u64;
    for annotation in annotations {
        let record = &annotation.record;
        let Some(&image_id) = image_wire_ids.get(&record.image_id.as_u64()) else {
            continue;
        };
        let Some(category_id) = record
            .category_id
            .and_then(|id| category_wire_ids.get(&id.as_u64()).copied())
        else {
            continue;
        };

        // Polygons re-derive their box and area from the ring; everything
        // else exports the stored box with its product area.
        let mut bbox = record.bbox;
        let mut area = bbox.area();
        let mut segmentation = serde_json::Value::Null;
        if !record.points.is_empty() {
            let flat: Vec<f64> = record.points.iter().flat_map(|p| [p.x, p.y]).collect();
            if flat.len() >= 6 {
                bbox = bounding_box_of(&record.points);
                area = polygon_area(&record.points);
            }
            segmentation = serde_json::json!([flat]);
        }

        document.annotations.push(CocoAnnotation {
            id: next_id,
            image_id,
            category_id,
            bbox: bbox.to_array().to_vec(),
            area: Some(area),
            iscrowd: Some(0),
            segmentation,
        });
        next_id += 1;
    }

    document
}
