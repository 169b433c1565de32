//! Format adapters.
//!
//! Each submodule speaks one external annotation format. Imports share a
//! single contract: parse the payload, reconcile the category names it
//! mentions, match images by file name within the target dataset, suppress
//! IoU duplicates, and insert what remains. Problems scoped to one item
//! accumulate in [`ImportStats`] while structural problems abort the whole
//! import. Exports read the dataset back out and render bytes plus a
//! suggested download name.

pub mod coco;
pub mod voc_xml;
pub mod yolo;

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::AnnoportError;
use crate::model::{AnnotationRecord, CategoryRecord, DatasetContext, ImageRecord};
use crate::split::SplitRatios;
use crate::store::{DocumentStore, Filter, Stored};

/// External formats the engine speaks.
///
/// Decoupled from the CLI's argument parsing; [`Format::parse_name`]
/// accepts the aliases users actually type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Coco,
    Yolo,
    VocXml,
}

impl Format {
    /// Canonical name for the format.
    pub fn name(&self) -> &'static str {
        match self {
            Format::Coco => "coco",
            Format::Yolo => "yolo",
            Format::VocXml => "pascal",
        }
    }

    /// Parses a user-supplied format name.
    pub fn parse_name(name: &str) -> Option<Self> {
        match name {
            "coco" | "coco-json" => Some(Format::Coco),
            "yolo" => Some(Format::Yolo),
            "pascal" | "pascal-voc" | "voc" | "voc-xml" => Some(Format::VocXml),
            _ => None,
        }
    }
}

/// Classification of per-item import problems.
///
/// These codes are part of the JSON schema and should remain stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The item names an image, category, or class the dataset does not
    /// have.
    Reference,
    /// The item exceeds a size limit.
    SizeLimit,
    /// The store rejected the item.
    Persistence,
    /// The item is syntactically broken.
    Malformed,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::Reference => "reference",
            IssueKind::SizeLimit => "size_limit",
            IssueKind::Persistence => "persistence",
            IssueKind::Malformed => "malformed",
        };
        f.write_str(label)
    }
}

/// A non-fatal problem attributed to one payload item.
#[derive(Clone, Debug, Serialize)]
pub struct ImportIssue {
    pub kind: IssueKind,
    /// The payload item at fault: an entry name, a file-and-line pair, or
    /// a record reference.
    pub item: String,
    pub message: String,
}

impl ImportIssue {
    pub fn reference(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Reference,
            item: item.into(),
            message: message.into(),
        }
    }

    pub fn size_limit(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::SizeLimit,
            item: item.into(),
            message: message.into(),
        }
    }

    pub fn persistence(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Persistence,
            item: item.into(),
            message: message.into(),
        }
    }

    pub fn malformed(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: IssueKind::Malformed,
            item: item.into(),
            message: message.into(),
        }
    }
}

/// What one import run did to the dataset.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ImportStats {
    /// Payload items that resolved to an image in the dataset.
    pub images_matched: u64,
    pub annotations_created: u64,
    pub categories_created: u64,
    /// Annotations dropped because an equivalent one already existed.
    pub duplicates_skipped: u64,
    /// Per-item problems, in encounter order.
    pub issues: Vec<ImportIssue>,
}

impl ImportStats {
    /// Records a per-item problem without aborting the import.
    pub fn add(&mut self, issue: ImportIssue) {
        tracing::warn!(kind = %issue.kind, item = %issue.item, "{}", issue.message);
        self.issues.push(issue);
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {} images matched, {} annotations created",
            self.images_matched, self.annotations_created
        )?;
        writeln!(
            f,
            "  {} categories created, {} duplicates skipped",
            self.categories_created, self.duplicates_skipped
        )?;

        if !self.issues.is_empty() {
            writeln!(f)?;
            writeln!(f, "Issues ({}):", self.issues.len())?;
            for issue in &self.issues {
                writeln!(f, "  - [{}] {}: {}", issue.kind, issue.item, issue.message)?;
            }
        }

        Ok(())
    }
}

/// An image a payload declares, before any record exists for it.
///
/// Adapters that can enumerate images without a store expose a
/// `listed_images` helper returning these; the CLI uses them to seed a
/// scratch dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedImage {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Bytes ready to hand to a download.
#[derive(Clone, Debug)]
pub struct ExportedFile {
    /// Suggested download name, derived from the dataset name.
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Options shared by every exporter.
#[derive(Clone, Copy, Debug)]
pub struct ExportOptions {
    /// Restrict the export to images that carry at least one annotation.
    pub only_annotated: bool,
    /// Partition images into train/val/test subtrees.
    pub split: Option<SplitRatios>,
    /// Seed for the split shuffle; unseeded splits differ per call.
    pub seed: Option<u64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            only_annotated: true,
            split: None,
            seed: None,
        }
    }
}

/// Fetches the dataset's images in export order, honoring the
/// `only_annotated` filter.
pub fn selected_images<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
    opts: &ExportOptions,
) -> Result<Vec<Stored<ImageRecord>>, AnnoportError> {
    let images: Vec<Stored<ImageRecord>> =
        store.find_many(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?;
    if !opts.only_annotated {
        return Ok(images);
    }

    let annotations: Vec<Stored<AnnotationRecord>> =
        store.find_many(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?;
    let annotated: BTreeSet<u64> = annotations
        .iter()
        .map(|a| a.record.image_id.as_u64())
        .collect();

    Ok(images
        .into_iter()
        .filter(|img| annotated.contains(&img.id.as_u64()))
        .collect())
}

/// Fetches the annotations belonging to the given images, in insertion
/// order.
pub fn annotations_for_images<S: DocumentStore>(
    store: &S,
    images: &[Stored<ImageRecord>],
) -> Result<Vec<Stored<AnnotationRecord>>, AnnoportError> {
    let wanted = Filter::or(
        images
            .iter()
            .map(|img| Filter::eq("image_id", img.id.as_u64())),
    );
    store.find_many(&wanted)
}

/// Fetches the dataset's categories in insertion order; class indices and
/// interchange ids derive from this order.
pub fn dataset_categories<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
) -> Result<Vec<Stored<CategoryRecord>>, AnnoportError> {
    store.find_many(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))
}

/// Packs named entries into a deflate-compressed ZIP archive in memory.
///
/// Entry names use `/` separators; order is preserved.
pub(crate) fn write_archive(
    entries: &[(String, Vec<u8>)],
    item: &str,
) -> Result<Vec<u8>, AnnoportError> {
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, bytes) in entries {
        writer
            .start_file(name.as_str(), options)
            .map_err(|source| AnnoportError::Archive {
                item: item.to_string(),
                source,
            })?;
        writer.write_all(bytes)?;
    }
    let cursor = writer.finish().map_err(|source| AnnoportError::Archive {
        item: item.to_string(),
        source,
    })?;
    Ok(cursor.into_inner())
}
