//! Normalized-text adapter (YOLO).
//!
//! Labels are plain-text rows `class cx cy w h` with coordinates
//! normalized to the image size. An import archive names its classes in
//! `classes.txt` (or a `data.yaml`) at the root and carries one label
//! file per image, either under `labels/` or at the root. Label files
//! resolve to stored images by stem, probing the common image
//! extensions. Export renders the mirror layout.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dedup::find_duplicate;
use crate::error::AnnoportError;
use crate::formats::{
    annotations_for_images, dataset_categories, selected_images, write_archive, ExportOptions,
    ExportedFile, ImportIssue, ImportStats,
};
use crate::geometry::{BBox, Normalized};
use crate::model::{
    AnnotationRecord, AnnotationSource, CategoryCreator, CategoryId, DatasetContext, ImageId,
    ImageRecord,
};
use crate::payload::{self, PayloadEntry};
use crate::reconcile::{reconcile_categories, CategorySpec};
use crate::split::split_images;
use crate::store::{DocumentStore, Filter, Stored};

/// Overlap at or above this suppresses an incoming annotation.
const DUPLICATE_IOU: f64 = 0.90;

/// Extensions probed, in order, when resolving a label stem to a stored
/// image.
const IMAGE_PROBE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "JPG", "JPEG", "PNG"];

/// Imports a normalized-text archive into the dataset.
///
/// Classes the archive names are created as categories if absent; images
/// must already exist in the dataset. Lines that fail to parse and rows
/// whose class index is out of range are reported per line and skipped.
/// Incoming boxes that overlap an existing annotation of the same
/// category at IoU >= 0.9 are skipped as duplicates.
pub fn import_yolo<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    bytes: &[u8],
    item: &str,
) -> Result<ImportStats, AnnoportError> {
    let entries = payload::archive_entries(bytes, item)?;
    let classes = class_names(&entries, item)?;

    let mut stats = ImportStats::default();

    let specs: Vec<CategorySpec> = classes
        .iter()
        .map(|name| CategorySpec::named(name.as_str()))
        .collect();
    let reconciled = reconcile_categories(store, ctx, &specs, CategoryCreator::System, None)?;
    stats.categories_created = reconciled.created.len() as u64;

    let class_ids: Vec<Option<CategoryId>> =
        classes.iter().map(|name| reconciled.id_of(name)).collect();

    for entry in label_entries(&entries) {
        let Some(image) = image_for_stem(store, ctx, entry.stem())? else {
            stats.add(ImportIssue::reference(
                entry.name.clone(),
                format!("no image matching stem '{}' in dataset", entry.stem()),
            ));
            continue;
        };
        stats.images_matched += 1;

        let width = image.record.width as f64;
        let height = image.record.height as f64;
        let text = String::from_utf8_lossy(&entry.bytes);
        for (line_idx, line) in text.lines().enumerate() {
            let line_num = line_idx + 1;
            let row = match parse_label_line(line) {
                Ok(Some(row)) => row,
                Ok(None) => continue,
                Err(message) => {
                    stats.add(ImportIssue::malformed(
                        format!("{}:{}", entry.name, line_num),
                        message,
                    ));
                    continue;
                }
            };

            let Some(Some(category_id)) = class_ids.get(row.class_id).copied() else {
                stats.add(ImportIssue::reference(
                    format!("{}:{}", entry.name, line_num),
                    format!(
                        "class id {} is out of range for {} class(es)",
                        row.class_id,
                        class_ids.len()
                    ),
                ));
                continue;
            };
            let category_name = classes[row.class_id].clone();

            let bbox = BBox::<Normalized>::from_center(row.cx, row.cy, row.w, row.h)
                .to_pixel(width, height);

            let duplicate = find_duplicate(
                store,
                image.id,
                Some(category_id),
                Some(category_name.as_str()),
                &bbox,
                DUPLICATE_IOU,
            )?;
            if duplicate.is_some() {
                stats.duplicates_skipped += 1;
                continue;
            }

            let record = AnnotationRecord::new_box(ctx.dataset_id, image.id, bbox)
                .with_category(Some(category_id), Some(category_name))
                .with_source(AnnotationSource::Imported);
            match store.insert_one(record) {
                Ok(_) => stats.annotations_created += 1,
                Err(err) => stats.add(ImportIssue::persistence(
                    format!("{}:{}", entry.name, line_num),
                    format!("annotation could not be stored: {err}"),
                )),
            }
        }
    }

    Ok(stats)
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

/// Reads the class list from the archive root: `classes.txt` first, then
/// an Ultralytics-style `data.yaml`.
fn class_names(entries: &[PayloadEntry], item: &str) -> Result<Vec<String>, AnnoportError> {
    if let Some(entry) = entries.iter().find(|e| e.name == "classes.txt") {
        let text = String::from_utf8_lossy(&entry.bytes);
        return Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect());
    }

    for name in ["data.yaml", "data.yml"] {
        let Some(entry) = entries.iter().find(|e| e.name == name) else {
            continue;
        };
        let parsed: DataYaml =
            serde_yaml::from_slice(&entry.bytes).map_err(|source| AnnoportError::YamlParse {
                item: format!("{item}/{name}"),
                source,
            })?;
        let names = match parsed.names {
            DataYamlNames::Sequence(names) => names,
            DataYamlNames::Mapping(mapping) => {
                let highest = mapping.keys().max().copied();
                match highest {
                    None => Vec::new(),
                    Some(max_index) => {
                        let mut names = vec![String::new(); max_index + 1];
                        for (index, name) in mapping {
                            names[index] = name;
                        }
                        for (index, name) in names.iter_mut().enumerate() {
                            if name.trim().is_empty() {
                                *name = format!("class_{}", index);
                            }
                        }
                        names
                    }
                }
            }
        };
        return Ok(names);
    }

    Err(AnnoportError::ClassMapMissing {
        item: item.to_string(),
    })
}

/// Picks the label files: direct children of `labels/` when the archive
/// has that directory, otherwise text files at the root.
fn label_entries(entries: &[PayloadEntry]) -> Vec<&PayloadEntry> {
    let has_labels_dir = entries.iter().any(|e| e.name.starts_with("labels/"));
    entries
        .iter()
        .filter(|entry| entry.extension().as_deref() == Some("txt"))
        .filter(|entry| {
            if has_labels_dir {
                entry
                    .name
                    .strip_prefix("labels/")
                    .is_some_and(|rest| !rest.contains('/'))
            } else {
                !entry.name.contains('/') && entry.name != "classes.txt"
            }
        })
        .collect()
}

/// Finds the stored image a label stem refers to.
fn image_for_stem<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
    stem: &str,
) -> Result<Option<Stored<ImageRecord>>, AnnoportError> {
    for ext in IMAGE_PROBE_EXTENSIONS {
        let found = store.find_one(&Filter::and([
            Filter::eq("dataset_id", ctx.dataset_id.as_u64()),
            Filter::eq("file_name", format!("{stem}.{ext}")),
        ]))?;
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

#[derive(Debug, PartialEq)]
struct LabelRow {
    class_id: usize,
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
}

/// Parses one label row. Empty and whitespace-only lines parse to `None`.
fn parse_label_line(line: &str) -> Result<Option<LabelRow>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // Take at most 6 tokens so pathological rows do not allocate unbounded memory.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(6).collect();

    if tokens.len() < 5 {
        return Err(format!("expected 5 tokens, found {}", tokens.len()));
    }
    if tokens.len() > 5 {
        return Err(
            "segmentation/pose rows are not supported; expected exactly 5 tokens".to_string(),
        );
    }

    let class_id = tokens[0].parse::<usize>().map_err(|_| {
        format!(
            "invalid class id '{}'; expected non-negative integer",
            tokens[0]
        )
    })?;
    let cx = parse_f64_token(tokens[1], "x_center")?;
    let cy = parse_f64_token(tokens[2], "y_center")?;
    let w = parse_f64_token(tokens[3], "width")?;
    let h = parse_f64_token(tokens[4], "height")?;

    Ok(Some(LabelRow {
        class_id,
        cx,
        cy,
        w,
        h,
    }))
}

fn parse_f64_token(raw: &str, field_name: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .map_err(|_| format!("invalid {field_name} '{raw}'; expected floating-point number"))
}

/// Fuzz-only entrypoint for single-row parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) {
    let _ = parse_label_line(input);
}

/// Exports the dataset as a normalized-text archive.
///
/// Class indices follow the dataset's category order, written once to
/// `classes.txt`. Without a split, images with no annotations get no
/// label file; with one, every image gets a label file, empty ones
/// included, so training tools see explicit negatives.
pub fn export_yolo<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
    opts: &ExportOptions,
) -> Result<ExportedFile, AnnoportError> {
    let images = selected_images(store, ctx, opts)?;
    let categories = dataset_categories(store, ctx)?;
    let annotations = annotations_for_images(store, &images)?;

    let class_ids: BTreeMap<u64, usize> = categories
        .iter()
        .enumerate()
        .map(|(index, category)| (category.id.as_u64(), index))
        .collect();
    let classes_txt = categories
        .iter()
        .map(|category| category.record.name.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let mut by_image: BTreeMap<u64, Vec<&Stored<AnnotationRecord>>> = BTreeMap::new();
    for annotation in &annotations {
        by_image
            .entry(annotation.record.image_id.as_u64())
            .or_default()
            .push(annotation);
    }

    match opts.split {
        None => {
            let mut entries = vec![("classes.txt".to_string(), classes_txt.into_bytes())];
            for image in &images {
                let Some(anns) = by_image.get(&image.id.as_u64()) else {
                    continue;
                };
                let body = label_file(image, anns, &class_ids);
                entries.push((
                    format!("labels/{}.txt", stem_of(&image.record.file_name)),
                    body.into_bytes(),
                ));
            }

            let file_name = format!("{}_yolo.zip", ctx.dataset_name);
            let bytes = write_archive(&entries, &file_name)?;
            Ok(ExportedFile {
                file_name,
                content_type: "application/zip",
                bytes,
            })
        }
        Some(ratios) => {
            let ids: Vec<ImageId> = images.iter().map(|img| img.id).collect();
            let split = split_images(&ids, &ratios, opts.seed)?;
            let by_id: BTreeMap<u64, &Stored<ImageRecord>> =
                images.iter().map(|img| (img.id.as_u64(), img)).collect();

            let mut entries = vec![("classes.txt".to_string(), classes_txt.into_bytes())];
            for (subset, members) in split.named_subsets() {
                for id in members {
                    let Some(&image) = by_id.get(&id.as_u64()) else {
                        continue;
                    };
                    let anns = by_image
                        .get(&id.as_u64())
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    let body = label_file(image, anns, &class_ids);
                    entries.push((
                        format!(
                            "{subset}/labels/{}.txt",
                            stem_of(&image.record.file_name)
                        ),
                        body.into_bytes(),
                    ));
                }
            }

            let file_name = format!("{}_yolo_split.zip", ctx.dataset_name);
            let bytes = write_archive(&entries, &file_name)?;
            Ok(ExportedFile {
                file_name,
                content_type: "application/zip",
                bytes,
            })
        }
    }
}

/// Renders one image's annotations as label rows, newline-joined without
/// a trailing newline. Annotations without a mapped category are skipped.
fn label_file(
    image: &Stored<ImageRecord>,
    annotations: &[&Stored<AnnotationRecord>],
    class_ids: &BTreeMap<u64, usize>,
) -> String {
    let width = image.record.width as f64;
    let height = image.record.height as f64;

    let mut rows = Vec::new();
    for annotation in annotations {
        let Some(&class_id) = annotation
            .record
            .category_id
            .and_then(|id| class_ids.get(&id.as_u64()))
        else {
            continue;
        };
        let norm = annotation.record.bbox.to_normalized(width, height);
        let (cx, cy) = norm.center();
        rows.push(format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            class_id, cx, cy, norm.width, norm.height
        ));
    }
    rows.join("\n")
}

fn stem_of(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    }
}
