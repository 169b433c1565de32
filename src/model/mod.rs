//! Core annotation model.
//!
//! This module defines the typed records the engine persists through the
//! document-store port. Every external format parses into these records,
//! and every export renders out of them. Optional fields are spelled
//! `Option<T>`; nothing here is an open-ended map.

mod ids;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{bounding_box_of, polygon_area, BBox, Pixel, Point};
use crate::store::Record;

pub use ids::{AnnotationId, CategoryId, DatasetId, ImageId, VideoId};

/// How an annotation's geometry is expressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Box,
    Polygon,
}

/// Where an annotation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSource {
    Manual,
    AiPrediction,
    Imported,
}

/// Who created a category record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryCreator {
    System,
    AiModel,
}

/// A stored annotation.
///
/// The category reference is carried both by identity and by display name
/// because external formats may supply either; both must resolve to the
/// same category. `original_bbox` preserves the geometry as it was first
/// produced (e.g. by a detector) so duplicate checks survive later
/// client-side rescaling of `bbox`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Owning dataset.
    pub dataset_id: DatasetId,

    /// Owning image.
    pub image_id: ImageId,

    /// Category reference by identity, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,

    /// Category reference by display name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,

    /// Whether `bbox` or `points` is the authoritative geometry.
    pub shape: ShapeKind,

    /// Bounding box in absolute pixel units. Derived from `points` when
    /// the shape is a polygon.
    pub bbox: BBox<Pixel>,

    /// Polygon ring; empty unless the shape is a polygon.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point<Pixel>>,

    /// Enclosed area: `width * height` for boxes, shoelace for polygons.
    pub area: f64,

    /// The bbox as first produced, before any client-side rescale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_bbox: Option<BBox<Pixel>>,

    pub source: AnnotationSource,

    /// Detector confidence; present only for AI predictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// Name of the model that produced an AI prediction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnnotationRecord {
    /// Creates a box annotation. The area is derived from the box.
    pub fn new_box(dataset_id: DatasetId, image_id: ImageId, bbox: BBox<Pixel>) -> Self {
        let now = Utc::now();
        Self {
            dataset_id,
            image_id,
            category_id: None,
            category_name: None,
            shape: ShapeKind::Box,
            bbox,
            points: Vec::new(),
            area: bbox.area(),
            original_bbox: None,
            source: AnnotationSource::Manual,
            confidence: None,
            model_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a polygon annotation. The bbox and area are derived from
    /// the ring.
    pub fn new_polygon(dataset_id: DatasetId, image_id: ImageId, points: Vec<Point<Pixel>>) -> Self {
        let bbox = bounding_box_of(&points);
        let area = polygon_area(&points);
        let now = Utc::now();
        Self {
            dataset_id,
            image_id,
            category_id: None,
            category_name: None,
            shape: ShapeKind::Polygon,
            bbox,
            points,
            area,
            original_bbox: None,
            source: AnnotationSource::Manual,
            confidence: None,
            model_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the category reference.
    pub fn with_category(mut self, id: Option<CategoryId>, name: Option<String>) -> Self {
        self.category_id = id;
        self.category_name = name;
        self
    }

    /// Sets the annotation source.
    pub fn with_source(mut self, source: AnnotationSource) -> Self {
        self.source = source;
        self
    }

    /// Records a detector confidence score.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Retains the geometry as first produced.
    pub fn with_original_bbox(mut self, bbox: BBox<Pixel>) -> Self {
        self.original_bbox = Some(bbox);
        self
    }

    /// Records the model that produced the annotation.
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }
}

/// A stored category.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategoryRecord {
    /// Owning dataset. Names and colors are unique within it.
    pub dataset_id: DatasetId,

    pub name: String,

    /// Display color as a `#RRGGBB` hex string.
    pub color: String,

    pub creator: CategoryCreator,

    /// Name of the model that first referenced the category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    /// Denormalized tally maintained by the annotation service.
    #[serde(default)]
    pub annotation_count: u64,

    pub created_at: DateTime<Utc>,
}

impl CategoryRecord {
    /// Creates a new category with the given properties.
    pub fn new(
        dataset_id: DatasetId,
        name: impl Into<String>,
        color: impl Into<String>,
        creator: CategoryCreator,
    ) -> Self {
        Self {
            dataset_id,
            name: name.into(),
            color: color.into(),
            creator,
            model_name: None,
            annotation_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Records the model that first referenced the category.
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }
}

/// A stored image.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Owning dataset. File names are the matching handle every format
    /// adapter uses, scoped to the dataset.
    pub dataset_id: DatasetId,

    pub file_name: String,

    /// Width of the image in pixels.
    pub width: u32,

    /// Height of the image in pixels.
    pub height: u32,

    /// Byte size captured at ingestion.
    #[serde(default)]
    pub size_bytes: u64,

    /// Set when the image was extracted from a video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<VideoId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_index: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_timestamp: Option<f64>,

    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Creates a new image with the given properties.
    pub fn new(
        dataset_id: DatasetId,
        file_name: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            dataset_id,
            file_name: file_name.into(),
            width,
            height,
            size_bytes: 0,
            video_id: None,
            frame_index: None,
            frame_timestamp: None,
            created_at: Utc::now(),
        }
    }

    /// Records the ingested byte size.
    pub fn with_size_bytes(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Marks the image as a frame extracted from a video.
    pub fn with_video_frame(mut self, video_id: VideoId, index: u32, timestamp: f64) -> Self {
        self.video_id = Some(video_id);
        self.frame_index = Some(index);
        self.frame_timestamp = Some(timestamp);
        self
    }
}

/// A stored video. Videos are exported alongside their extracted frames
/// but never imported from any format.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VideoRecord {
    pub dataset_id: DatasetId,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_seconds: f64,
    pub total_frames: u32,
    pub extracted_frames: u32,
}

/// The dataset a request operates on.
///
/// Handed explicitly to every import, export, and service call so nothing
/// reads ambient state. The name only matters to exports that embed it
/// (interchange metadata, suggested download names).
#[derive(Clone, Debug)]
pub struct DatasetContext {
    pub dataset_id: DatasetId,
    pub dataset_name: String,
}

impl DatasetContext {
    pub fn new(dataset_id: DatasetId, dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_id,
            dataset_name: dataset_name.into(),
        }
    }
}

impl Record for AnnotationRecord {
    const COLLECTION: &'static str = "annotations";
    type Id = AnnotationId;
}

impl Record for CategoryRecord {
    const COLLECTION: &'static str = "categories";
    type Id = CategoryId;
}

impl Record for ImageRecord {
    const COLLECTION: &'static str = "images";
    type Id = ImageId;
}

impl Record for VideoRecord {
    const COLLECTION: &'static str = "videos";
    type Id = VideoId;
}
