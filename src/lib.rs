//! Annoport: annotation interchange and deduplication.
//!
//! Annoport translates object detection annotations between an internal
//! dataset model and three external formats: interchange-JSON,
//! normalized-text archives, and per-image-XML archives. Imports match
//! payload items against the dataset's images by file name and suppress
//! incoming boxes that duplicate existing annotations above an IoU
//! threshold; exports can partition a dataset into train/val/test
//! subsets.
//!
//! # Modules
//!
//! - [`model`]: stored record types (images, annotations, categories, ...)
//! - [`formats`]: the format adapters and shared import/export types
//! - [`dedup`]: IoU-based duplicate detection
//! - [`service`]: dataset-level operations built on the adapters
//! - [`store`]: document store port and in-memory implementation
//! - [`error`]: error types for annoport operations

pub mod batch;
pub mod color;
pub mod dedup;
pub mod error;
pub mod formats;
pub mod geometry;
pub mod model;
pub mod payload;
pub mod reconcile;
pub mod service;
pub mod split;
pub mod store;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

pub use error::AnnoportError;

use store::DocumentStore;

/// The annoport CLI application.
#[derive(Parser)]
#[command(name = "annoport")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert annotations from one format to another.
    Convert(ConvertArgs),
    /// List the images, annotations, and categories a payload declares.
    Inspect(InspectArgs),
    /// Import a payload and print dataset statistics.
    Stats(StatsArgs),
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Input file or directory to convert.
    input: PathBuf,

    /// Input format ('coco', 'yolo', or 'pascal').
    #[arg(long)]
    from: String,

    /// Output format ('coco', 'yolo', or 'pascal').
    #[arg(long)]
    to: String,

    /// Output path; defaults to the export's suggested file name.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Dataset name embedded in export file names and metadata.
    #[arg(long, default_value = "dataset", env = "ANNOPORT_DATASET")]
    name: String,

    /// Export every image, not just annotated ones.
    #[arg(long)]
    all_images: bool,

    /// Partition the export into train/val/test percentages, e.g. '80,10,10'.
    #[arg(long)]
    split: Option<String>,

    /// Seed for the split shuffle, for reproducible partitions.
    #[arg(long)]
    seed: Option<u64>,
}

/// Arguments for the inspect subcommand.
#[derive(clap::Args)]
struct InspectArgs {
    /// Input file or directory to inspect.
    input: PathBuf,

    /// Input format ('coco', 'yolo', or 'pascal').
    #[arg(long)]
    from: String,

    /// Dataset name for the scratch import.
    #[arg(long, default_value = "dataset")]
    name: String,
}

/// Arguments for the stats subcommand.
#[derive(clap::Args)]
struct StatsArgs {
    /// Input file or directory to summarize.
    input: PathBuf,

    /// Input format ('coco', 'yolo', or 'pascal').
    #[arg(long)]
    from: String,

    /// Dataset name for the scratch import.
    #[arg(long, default_value = "dataset")]
    name: String,

    /// Count every image, not just annotated ones.
    #[arg(long)]
    all_images: bool,
}

/// Run the annoport CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), AnnoportError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Inspect(args)) => run_inspect(args),
        Some(Commands::Stats(args)) => run_stats(args),
        None => {
            println!("annoport {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Annotation interchange and deduplication.");
            println!();
            println!("Run 'annoport --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the convert subcommand.
fn run_convert(args: ConvertArgs) -> Result<(), AnnoportError> {
    let from = parse_format(&args.from)?;
    let to = parse_format(&args.to)?;

    let (store, ctx, stats) = stage_payload(&args.input, from, &args.name)?;
    println!("Imported {} ({} format):", args.input.display(), from.name());
    print!("{stats}");

    let opts = formats::ExportOptions {
        only_annotated: !args.all_images,
        split: args.split.as_deref().map(parse_split).transpose()?,
        seed: args.seed,
    };
    let exported = service::export_dataset(&store, &ctx, to, &opts)?;

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&exported.file_name));
    fs::write(&output, &exported.bytes)?;
    println!();
    println!(
        "Wrote {} ({}, {} bytes)",
        output.display(),
        exported.content_type,
        exported.bytes.len()
    );
    Ok(())
}

/// Execute the inspect subcommand.
fn run_inspect(args: InspectArgs) -> Result<(), AnnoportError> {
    let from = parse_format(&args.from)?;
    let (store, ctx, stats) = stage_payload(&args.input, from, &args.name)?;

    let images: Vec<store::Stored<model::ImageRecord>> =
        store.find_many(&store::Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?;
    let annotations: Vec<store::Stored<model::AnnotationRecord>> =
        store.find_many(&store::Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?;
    let categories = formats::dataset_categories(&store, &ctx)?;

    let mut per_image: BTreeMap<u64, u64> = BTreeMap::new();
    for annotation in &annotations {
        *per_image
            .entry(annotation.record.image_id.as_u64())
            .or_insert(0) += 1;
    }

    println!("Imported {} ({} format):", args.input.display(), from.name());
    print!("{stats}");

    println!();
    println!("Images ({}):", images.len());
    for image in &images {
        let count = per_image.get(&image.id.as_u64()).copied().unwrap_or(0);
        println!(
            "  {} ({}x{}): {} annotations",
            image.record.file_name, image.record.width, image.record.height, count
        );
    }

    println!();
    println!("Categories ({}):", categories.len());
    for category in &categories {
        println!(
            "  {} ({} annotations)",
            category.record.name, category.record.annotation_count
        );
    }
    Ok(())
}

/// Execute the stats subcommand.
fn run_stats(args: StatsArgs) -> Result<(), AnnoportError> {
    let from = parse_format(&args.from)?;
    let (store, ctx, stats) = stage_payload(&args.input, from, &args.name)?;

    let summary = service::export_statistics(&store, &ctx, !args.all_images)?;
    println!("Imported {} ({} format):", args.input.display(), from.name());
    print!("{stats}");

    println!();
    println!("Export statistics:");
    println!("  images: {}", summary.images);
    println!("  annotations: {}", summary.annotations);
    println!("  categories: {}", summary.categories);
    println!(
        "  total images in dataset: {}",
        summary.total_images_in_dataset
    );
    Ok(())
}

fn parse_format(name: &str) -> Result<formats::Format, AnnoportError> {
    formats::Format::parse_name(name).ok_or_else(|| {
        AnnoportError::UnsupportedFormat(format!("'{name}' (supported: coco, yolo, pascal)"))
    })
}

/// Parses 'train,val,test' percentages, e.g. '80,10,10'.
fn parse_split(raw: &str) -> Result<split::SplitRatios, AnnoportError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(AnnoportError::InvalidSplit {
            message: format!("expected 'train,val,test' percentages, got '{raw}'"),
        });
    }

    let mut values = [0u32; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part.parse().map_err(|_| AnnoportError::InvalidSplit {
            message: format!("'{part}' is not a percentage"),
        })?;
    }

    let ratios = split::SplitRatios::new(values[0], values[1], values[2]);
    ratios.validate()?;
    Ok(ratios)
}

/// Reads the input as raw payload bytes.
///
/// A directory is packed into an in-memory archive first, so the adapters
/// see local trees and uploaded archives identically.
fn payload_bytes(input: &Path) -> Result<Vec<u8>, AnnoportError> {
    if input.is_dir() {
        let entries = payload::dir_entries(input)?;
        let named: Vec<(String, Vec<u8>)> = entries
            .into_iter()
            .map(|entry| (entry.name, entry.bytes))
            .collect();
        return formats::write_archive(&named, &input.display().to_string());
    }
    Ok(fs::read(input)?)
}

/// Reads, seeds, and imports a payload into a fresh in-memory dataset.
fn stage_payload(
    input: &Path,
    format: formats::Format,
    name: &str,
) -> Result<(store::MemoryStore, model::DatasetContext, formats::ImportStats), AnnoportError> {
    let bytes = payload_bytes(input)?;
    let item = input.display().to_string();

    let mut store = store::MemoryStore::new();
    let ctx = model::DatasetContext::new(model::DatasetId(1), name);

    seed_images(&mut store, &ctx, format, &bytes, &item)?;
    let stats = service::import_dataset(&mut store, &ctx, format, &bytes, &item)?;
    Ok((store, ctx, stats))
}

/// Seeds the scratch dataset with the images a payload declares.
///
/// Imports attach annotations to existing image records, so the fresh
/// store needs image rows first. Interchange-JSON and per-image-XML
/// payloads declare file names and dimensions; normalized-text archives
/// carry the image files themselves, which the batch pipeline ingests.
fn seed_images<S: DocumentStore>(
    store: &mut S,
    ctx: &model::DatasetContext,
    format: formats::Format,
    bytes: &[u8],
    item: &str,
) -> Result<(), AnnoportError> {
    match format {
        formats::Format::Coco => {
            insert_listed(store, ctx, formats::coco::listed_images(bytes, item)?)
        }
        formats::Format::VocXml => {
            insert_listed(store, ctx, formats::voc_xml::listed_images(bytes, item)?)
        }
        formats::Format::Yolo => {
            let report =
                batch::ingest_images(store, ctx, bytes, item, &batch::BatchOptions::default())?;
            tracing::debug!(
                images = report.images_created,
                "seeded dataset from archive image files"
            );
            Ok(())
        }
    }
}

fn insert_listed<S: DocumentStore>(
    store: &mut S,
    ctx: &model::DatasetContext,
    listed: Vec<formats::ListedImage>,
) -> Result<(), AnnoportError> {
    let mut seen = BTreeSet::new();
    for image in listed {
        if !seen.insert(image.file_name.clone()) {
            continue;
        }
        store.insert_one(model::ImageRecord::new(
            ctx.dataset_id,
            image.file_name,
            image.width,
            image.height,
        ))?;
    }
    Ok(())
}
