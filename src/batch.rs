//! Batched image ingestion from archives.
//!
//! An uploaded archive may hold thousands of images, so insertion happens
//! in fixed-size chunks rather than one round-trip per image. A chunk
//! that fails as a whole is retried item by item so one bad record cannot
//! sink its forty-nine neighbors.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::AnnoportError;
use crate::formats::ImportIssue;
use crate::model::{DatasetContext, ImageRecord};
use crate::payload::{self, PayloadEntry};
use crate::store::{DocumentStore, Filter, Stored};

/// Archive entries nested deeper than this many directories are ignored.
const MAX_ENTRY_DEPTH: usize = 3;

/// Failures printed in full before the report elides the rest.
const FAILURE_SAMPLE: usize = 10;

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp", "gif"];

/// Tuning knobs for [`ingest_images`].
#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    /// Images inserted per store round-trip.
    pub chunk_size: usize,
    /// Per-image byte ceiling.
    pub max_item_bytes: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            chunk_size: 50,
            max_item_bytes: 10 * 1024 * 1024,
        }
    }
}

/// What one ingestion run did to the dataset.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    /// Image entries discovered in the archive.
    pub total_found: u64,
    pub images_created: u64,
    /// Per-item failures, in encounter order.
    pub issues: Vec<ImportIssue>,
}

impl BatchReport {
    /// Records a per-item failure without aborting the run.
    pub fn add(&mut self, issue: ImportIssue) {
        tracing::warn!(kind = %issue.kind, item = %issue.item, "{}", issue.message);
        self.issues.push(issue);
    }

    /// Created images as a percentage of discovered ones, rounded to two
    /// decimals. Zero when the archive held no images.
    pub fn success_rate(&self) -> f64 {
        if self.total_found == 0 {
            return 0.0;
        }
        let rate = self.images_created as f64 / self.total_found as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  {} of {} images ingested ({:.2}% success)",
            self.images_created,
            self.total_found,
            self.success_rate()
        )?;

        if !self.issues.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures ({}):", self.issues.len())?;
            for issue in self.issues.iter().take(FAILURE_SAMPLE) {
                writeln!(f, "  - [{}] {}: {}", issue.kind, issue.item, issue.message)?;
            }
            if self.issues.len() > FAILURE_SAMPLE {
                writeln!(f, "  ... {} more not shown", self.issues.len() - FAILURE_SAMPLE)?;
            }
        }

        Ok(())
    }
}

/// Ingests every image found in an archive into the dataset.
///
/// Entries are discovered by extension at any directory depth up to three
/// levels. Each one must decode as an image and stay under the per-item
/// byte ceiling; entries failing either check are reported and skipped.
/// File names colliding with an image already in the dataset (or earlier
/// in the same archive) get a numeric suffix rather than overwriting.
pub fn ingest_images<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    bytes: &[u8],
    item: &str,
    opts: &BatchOptions,
) -> Result<BatchReport, AnnoportError> {
    let entries = payload::archive_entries(bytes, item)?;
    let found: Vec<&PayloadEntry> = entries.iter().filter(|entry| is_image(entry)).collect();

    let mut report = BatchReport {
        total_found: found.len() as u64,
        ..BatchReport::default()
    };

    let existing: Vec<Stored<ImageRecord>> =
        store.find_many(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?;
    let mut taken: BTreeSet<String> = existing
        .into_iter()
        .map(|image| image.record.file_name)
        .collect();

    for chunk in found.chunks(opts.chunk_size.max(1)) {
        let mut names: Vec<String> = Vec::with_capacity(chunk.len());
        let mut records: Vec<ImageRecord> = Vec::with_capacity(chunk.len());

        for entry in chunk {
            if entry.bytes.len() > opts.max_item_bytes {
                report.add(ImportIssue::size_limit(
                    entry.name.clone(),
                    format!(
                        "{} bytes exceeds the {} byte item limit",
                        entry.bytes.len(),
                        opts.max_item_bytes
                    ),
                ));
                continue;
            }

            let size = match imagesize::blob_size(&entry.bytes) {
                Ok(size) => size,
                Err(err) => {
                    report.add(ImportIssue::malformed(
                        entry.name.clone(),
                        format!("not a decodable image: {err}"),
                    ));
                    continue;
                }
            };
            let (Ok(width), Ok(height)) = (u32::try_from(size.width), u32::try_from(size.height))
            else {
                report.add(ImportIssue::malformed(
                    entry.name.clone(),
                    format!("image dimensions {}x{} do not fit in u32", size.width, size.height),
                ));
                continue;
            };

            let file_name = unique_file_name(entry.file_name(), &taken);
            taken.insert(file_name.clone());

            names.push(entry.name.clone());
            records.push(
                ImageRecord::new(ctx.dataset_id, file_name, width, height)
                    .with_size_bytes(entry.bytes.len() as u64),
            );
        }

        if records.is_empty() {
            continue;
        }

        match store.insert_many(records.clone()) {
            Ok(stored) => report.images_created += stored.len() as u64,
            Err(err) => {
                tracing::warn!("chunk insert failed, retrying items individually: {err}");
                for (name, record) in names.into_iter().zip(records) {
                    match store.insert_one(record) {
                        Ok(_) => report.images_created += 1,
                        Err(err) => report.add(ImportIssue::persistence(
                            name,
                            format!("image could not be stored: {err}"),
                        )),
                    }
                }
            }
        }
    }

    Ok(report)
}

fn is_image(entry: &PayloadEntry) -> bool {
    if entry.name.matches('/').count() >= MAX_ENTRY_DEPTH {
        return false;
    }
    entry
        .extension()
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Appends `_1`, `_2`, ... before the extension until the name is free.
fn unique_file_name(name: &str, taken: &BTreeSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };
    let mut counter = 1;
    loop {
        let candidate = format!("{stem}_{counter}{ext}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
