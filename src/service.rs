//! Dataset-level operations above the format adapters.
//!
//! Everything here shares one contract with the importers: writes go
//! through the duplicate check before they land, category references are
//! resolved by id or name, and bulk outcomes come back as counts instead
//! of errors.

use serde::Serialize;

use crate::dedup::find_duplicate;
use crate::error::AnnoportError;
use crate::formats::{
    annotations_for_images, coco, selected_images, voc_xml, yolo, ExportOptions, ExportedFile,
    Format, ImportStats,
};
use crate::geometry::{BBox, Pixel};
use crate::model::{
    AnnotationId, AnnotationRecord, AnnotationSource, CategoryCreator, CategoryId, CategoryRecord,
    DatasetContext, ImageId, ImageRecord, VideoRecord,
};
use crate::reconcile::{reconcile_categories, CategorySpec};
use crate::store::{DocumentStore, Filter, Record, Stored};

/// Overlap at or above this makes a manual annotation a duplicate.
const MANUAL_DUPLICATE_IOU: f64 = 0.90;

/// Overlap at or above this makes a recorded prediction a duplicate.
const PREDICTION_DUPLICATE_IOU: f64 = 0.90;

/// What a manual annotation attempt produced.
#[derive(Clone, Debug)]
pub enum CreateOutcome {
    Created(Stored<AnnotationRecord>),
    /// The draft overlapped an existing annotation beyond the threshold;
    /// nothing was inserted.
    Duplicate { of: AnnotationId, iou: f64 },
}

/// Inserts a manually drawn annotation.
///
/// The image must exist in the dataset, and the dataset must already have
/// at least one category. Unless `check_duplicates` is false, a draft
/// overlapping an existing annotation of the same category at IoU >= 0.9
/// is reported back instead of inserted. On insert, the referenced
/// category's tally goes up by one.
pub fn create_annotation<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    draft: AnnotationRecord,
    check_duplicates: bool,
) -> Result<CreateOutcome, AnnoportError> {
    require_image(store, ctx, draft.image_id)?;

    let categories = store.count_documents::<CategoryRecord>(&Filter::eq(
        "dataset_id",
        ctx.dataset_id.as_u64(),
    ))?;
    if categories == 0 {
        return Err(AnnoportError::NoCategories {
            dataset_id: ctx.dataset_id.as_u64(),
        });
    }

    if check_duplicates {
        let duplicate = find_duplicate(
            store,
            draft.image_id,
            draft.category_id,
            draft.category_name.as_deref(),
            &draft.bbox,
            MANUAL_DUPLICATE_IOU,
        )?;
        if let Some(existing) = duplicate {
            return Ok(CreateOutcome::Duplicate {
                of: existing.annotation_id,
                iou: existing.iou,
            });
        }
    }

    let stored = store.insert_one(draft)?;
    if let Some(category_id) = stored.record.category_id {
        store.update_one::<CategoryRecord>(category_id, |category| {
            category.annotation_count += 1;
        })?;
    }

    Ok(CreateOutcome::Created(stored))
}

/// One detection from an external model run.
#[derive(Clone, Debug)]
pub struct Prediction {
    /// The model's label for the detected object.
    pub class_name: String,
    pub bbox: BBox<Pixel>,
    pub confidence: f64,
}

/// What one prediction run did to the dataset.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct PredictionStats {
    pub detections: u64,
    pub created: u64,
    pub duplicates_skipped: u64,
}

/// Records the detections of an external model as annotations.
///
/// Detected class names become categories if absent, attributed to the
/// model. Each box is deduplicated at IoU >= 0.9 against what the image
/// already carries; inserted records keep the confidence, the model name,
/// and the box as first produced, so later client-side rescaling cannot
/// hide a re-detection.
pub fn record_predictions<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    image_id: ImageId,
    model_name: &str,
    predictions: &[Prediction],
) -> Result<PredictionStats, AnnoportError> {
    require_image(store, ctx, image_id)?;

    let mut specs: Vec<CategorySpec> = Vec::new();
    for prediction in predictions {
        if specs.iter().all(|spec| spec.name != prediction.class_name) {
            specs.push(CategorySpec::named(prediction.class_name.as_str()));
        }
    }
    let reconciled =
        reconcile_categories(store, ctx, &specs, CategoryCreator::AiModel, Some(model_name))?;

    let mut stats = PredictionStats {
        detections: predictions.len() as u64,
        ..PredictionStats::default()
    };
    let mut touched: Vec<CategoryId> = Vec::new();

    for prediction in predictions {
        let Some(category_id) = reconciled.id_of(&prediction.class_name) else {
            tracing::warn!(class = %prediction.class_name, "no category for detected class, skipping");
            continue;
        };

        let duplicate = find_duplicate(
            store,
            image_id,
            Some(category_id),
            Some(prediction.class_name.as_str()),
            &prediction.bbox,
            PREDICTION_DUPLICATE_IOU,
        )?;
        if duplicate.is_some() {
            stats.duplicates_skipped += 1;
            continue;
        }

        let record = AnnotationRecord::new_box(ctx.dataset_id, image_id, prediction.bbox)
            .with_category(Some(category_id), Some(prediction.class_name.clone()))
            .with_source(AnnotationSource::AiPrediction)
            .with_confidence(prediction.confidence)
            .with_original_bbox(prediction.bbox)
            .with_model_name(model_name);
        store.insert_one(record)?;
        stats.created += 1;
        if !touched.contains(&category_id) {
            touched.push(category_id);
        }
    }

    for category_id in touched {
        let count = store
            .count_documents::<AnnotationRecord>(&Filter::eq("category_id", category_id.as_u64()))?;
        store.update_one::<CategoryRecord>(category_id, |category| {
            category.annotation_count = count;
        })?;
    }

    Ok(stats)
}

/// Deletes every annotation on one image. Returns the number removed.
pub fn delete_annotations_for_image<S: DocumentStore>(
    store: &mut S,
    image_id: ImageId,
) -> Result<u64, AnnoportError> {
    store.delete_many::<AnnotationRecord>(&Filter::eq("image_id", image_id.as_u64()))
}

/// Deletes a category, and with `cascade` its annotations first.
///
/// Annotations reference the category by id or by name; both forms count.
/// Without `cascade`, a category still referenced is left untouched and
/// the call fails. Returns the number of annotations removed.
pub fn delete_category<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    category_id: CategoryId,
    cascade: bool,
) -> Result<u64, AnnoportError> {
    let category = store
        .find_many::<CategoryRecord>(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?
        .into_iter()
        .find(|category| category.id == category_id)
        .ok_or(AnnoportError::RecordNotFound {
            collection: CategoryRecord::COLLECTION,
            id: category_id.as_u64(),
        })?;

    let referencing = Filter::and([
        Filter::eq("dataset_id", ctx.dataset_id.as_u64()),
        Filter::or([
            Filter::eq("category_id", category_id.as_u64()),
            Filter::eq("category_name", category.record.name.as_str()),
        ]),
    ]);
    let annotations = store.count_documents::<AnnotationRecord>(&referencing)?;
    if annotations > 0 && !cascade {
        return Err(AnnoportError::CategoryInUse {
            id: category_id.as_u64(),
            annotations,
        });
    }

    let deleted = store.delete_many::<AnnotationRecord>(&referencing)?;

    // Names are unique within a dataset, so this removes exactly the
    // record fetched above.
    store.delete_many::<CategoryRecord>(&Filter::and([
        Filter::eq("dataset_id", ctx.dataset_id.as_u64()),
        Filter::eq("name", category.record.name.as_str()),
    ]))?;

    Ok(deleted)
}

/// Deletes every annotation in the dataset. Returns the number removed.
pub fn delete_dataset_annotations<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
) -> Result<u64, AnnoportError> {
    store.delete_many::<AnnotationRecord>(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))
}

/// What a dataset purge removed.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct PurgeReport {
    pub annotations: u64,
    pub images: u64,
    pub categories: u64,
    pub videos: u64,
}

/// Removes everything the engine stores for a dataset.
pub fn purge_dataset<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
) -> Result<PurgeReport, AnnoportError> {
    let annotations = delete_dataset_annotations(store, ctx)?;
    let filter = Filter::eq("dataset_id", ctx.dataset_id.as_u64());
    let categories = store.delete_many::<CategoryRecord>(&filter)?;
    let images = store.delete_many::<ImageRecord>(&filter)?;
    let videos = store.delete_many::<VideoRecord>(&filter)?;

    Ok(PurgeReport {
        annotations,
        images,
        categories,
        videos,
    })
}

/// Recounts every category's annotations after imports or bulk deletes.
pub fn refresh_annotation_counts<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
) -> Result<(), AnnoportError> {
    let categories: Vec<Stored<CategoryRecord>> =
        store.find_many(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?;
    for category in categories {
        let count = store
            .count_documents::<AnnotationRecord>(&Filter::eq("category_id", category.id.as_u64()))?;
        store.update_one::<CategoryRecord>(category.id, |record| {
            record.annotation_count = count;
        })?;
    }
    Ok(())
}

/// What an export would contain, without building the archive.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ExportStatistics {
    /// Images the export would include.
    pub images: u64,
    /// Annotations on those images.
    pub annotations: u64,
    /// Categories in the dataset.
    pub categories: u64,
    /// All images in the dataset, ignoring the filter.
    pub total_images_in_dataset: u64,
}

/// Previews an export's contents under the `only_annotated` filter.
pub fn export_statistics<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
    only_annotated: bool,
) -> Result<ExportStatistics, AnnoportError> {
    let dataset_filter = Filter::eq("dataset_id", ctx.dataset_id.as_u64());
    let total_images_in_dataset = store.count_documents::<ImageRecord>(&dataset_filter)?;
    let categories = store.count_documents::<CategoryRecord>(&dataset_filter)?;

    let opts = ExportOptions {
        only_annotated,
        ..ExportOptions::default()
    };
    let images = selected_images(store, ctx, &opts)?;
    let annotations = annotations_for_images(store, &images)?;

    Ok(ExportStatistics {
        images: images.len() as u64,
        annotations: annotations.len() as u64,
        categories,
        total_images_in_dataset,
    })
}

/// Routes an uploaded payload to the adapter for its format.
pub fn import_dataset<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    format: Format,
    bytes: &[u8],
    item: &str,
) -> Result<ImportStats, AnnoportError> {
    match format {
        Format::Coco => coco::import_coco(store, ctx, bytes, item),
        Format::Yolo => yolo::import_yolo(store, ctx, bytes, item),
        Format::VocXml => voc_xml::import_voc(store, ctx, bytes, item),
    }
}

/// Renders the dataset in the requested format.
pub fn export_dataset<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
    format: Format,
    opts: &ExportOptions,
) -> Result<ExportedFile, AnnoportError> {
    match format {
        Format::Coco => coco::export_coco(store, ctx, opts),
        Format::Yolo => yolo::export_yolo(store, ctx, opts),
        Format::VocXml => voc_xml::export_voc(store, ctx, opts),
    }
}

fn require_image<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
    image_id: ImageId,
) -> Result<Stored<ImageRecord>, AnnoportError> {
    store
        .find_many::<ImageRecord>(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?
        .into_iter()
        .find(|image| image.id == image_id)
        .ok_or(AnnoportError::RecordNotFound {
            collection: ImageRecord::COLLECTION,
            id: image_id.as_u64(),
        })
}
