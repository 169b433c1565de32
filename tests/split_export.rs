//! Subset splitting across the three export layouts.

use std::collections::BTreeSet;

use annoport::formats::{ExportOptions, Format};
use annoport::geometry::BBox;
use annoport::model::{AnnotationRecord, DatasetContext};
use annoport::payload::archive_entries;
use annoport::service::export_dataset;
use annoport::split::SplitRatios;
use annoport::store::MemoryStore;

mod common;
use common::{demo_dataset, insert_annotation, seed_category, seed_image};

/// Ten images named img0..img9, the even ones annotated.
fn seeded_dataset() -> (MemoryStore, DatasetContext) {
    let (mut store, ctx) = demo_dataset();
    let car = seed_category(&mut store, &ctx, "car", "#FF0000");
    for i in 0..10 {
        let image_id = seed_image(&mut store, &ctx, &format!("img{i}.jpg"), 640, 480);
        if i % 2 == 0 {
            insert_annotation(
                &mut store,
                AnnotationRecord::new_box(
                    ctx.dataset_id,
                    image_id,
                    BBox::new(10.0 * i as f64, 0.0, 50.0, 50.0),
                )
                .with_category(Some(car.id), Some(car.record.name.clone())),
            );
        }
    }
    (store, ctx)
}

fn split_opts(train: u32, val: u32, test: u32, seed: u64) -> ExportOptions {
    ExportOptions {
        only_annotated: false,
        split: Some(SplitRatios::new(train, val, test)),
        seed: Some(seed),
    }
}

fn sorted_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut entries: Vec<(String, Vec<u8>)> = archive_entries(bytes, "export")
        .expect("entries")
        .into_iter()
        .map(|entry| (entry.name, entry.bytes))
        .collect();
    entries.sort();
    entries
}

#[test]
fn same_seed_reproduces_the_same_archive() {
    let (store, ctx) = seeded_dataset();
    let opts = split_opts(80, 10, 10, 7);

    let first = export_dataset(&store, &ctx, Format::Yolo, &opts).expect("first export");
    let second = export_dataset(&store, &ctx, Format::Yolo, &opts).expect("second export");

    assert_eq!(first.file_name, "demo_yolo_split.zip");
    assert_eq!(sorted_entries(&first.bytes), sorted_entries(&second.bytes));
}

#[test]
fn yolo_subsets_partition_the_image_set() {
    let (store, ctx) = seeded_dataset();
    let opts = split_opts(60, 20, 20, 3);

    let exported = export_dataset(&store, &ctx, Format::Yolo, &opts).expect("export");
    let entries = sorted_entries(&exported.bytes);

    assert!(entries.iter().any(|(name, _)| name == "classes.txt"));

    let mut per_subset: Vec<(String, String)> = Vec::new();
    for (name, _) in &entries {
        if name == "classes.txt" {
            continue;
        }
        let mut parts = name.splitn(3, '/');
        let subset = parts.next().expect("subset").to_string();
        assert_eq!(parts.next(), Some("labels"));
        let stem = parts
            .next()
            .and_then(|file| file.strip_suffix(".txt"))
            .expect("label file")
            .to_string();
        per_subset.push((subset, stem));
    }

    // Every image lands in exactly one subset, annotated or not.
    let stems: BTreeSet<&str> = per_subset.iter().map(|(_, stem)| stem.as_str()).collect();
    assert_eq!(per_subset.len(), 10);
    assert_eq!(stems.len(), 10);
    for i in 0..10 {
        assert!(stems.contains(format!("img{i}").as_str()));
    }

    let train = per_subset.iter().filter(|(s, _)| s == "train").count();
    let val = per_subset.iter().filter(|(s, _)| s == "val").count();
    let test = per_subset.iter().filter(|(s, _)| s == "test").count();
    assert_eq!((train, val, test), (6, 2, 2));
}

#[test]
fn coco_split_writes_one_document_per_subset() {
    let (store, ctx) = seeded_dataset();
    // floor cuts leave val empty: 4 train, 0 val, 1 test of 5 selected.
    let opts = ExportOptions {
        only_annotated: true,
        split: Some(SplitRatios::new(80, 10, 10)),
        seed: Some(11),
    };

    let exported = export_dataset(&store, &ctx, Format::Coco, &opts).expect("export");
    assert_eq!(exported.file_name, "demo_coco_split.zip");

    let entries = sorted_entries(&exported.bytes);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["test/annotations.json", "train/annotations.json"]);

    let mut image_total = 0;
    for (_, bytes) in &entries {
        let doc: serde_json::Value = serde_json::from_slice(bytes).expect("parse subset");
        image_total += doc["images"].as_array().expect("images").len();
        // The category table is complete in every subset.
        assert_eq!(doc["categories"].as_array().expect("categories").len(), 1);
    }
    assert_eq!(image_total, 5);
}

#[test]
fn voc_split_renders_unannotated_images_too() {
    let (store, ctx) = seeded_dataset();
    let opts = split_opts(100, 0, 0, 1);

    let exported = export_dataset(&store, &ctx, Format::VocXml, &opts).expect("export");
    assert_eq!(exported.file_name, "demo_pascal_split.zip");

    let entries = sorted_entries(&exported.bytes);
    assert_eq!(entries.len(), 10);
    for (name, bytes) in &entries {
        assert!(name.starts_with("train/annotations/"));
        assert!(name.ends_with(".xml"));
        let xml = String::from_utf8(bytes.clone()).expect("utf8");
        assert!(xml.contains("<folder>train</folder>"));
    }

    // Without a split the unannotated half is dropped entirely.
    let plain = export_dataset(&store, &ctx, Format::VocXml, &ExportOptions::default())
        .expect("plain export");
    assert_eq!(sorted_entries(&plain.bytes).len(), 5);
}

#[test]
fn invalid_ratios_surface_through_export() {
    let (store, ctx) = seeded_dataset();
    let opts = split_opts(80, 30, 10, 0);

    let err = export_dataset(&store, &ctx, Format::Yolo, &opts).expect_err("must fail");
    let rendered = err.to_string();
    assert!(rendered.contains("invalid split ratios"));
    assert!(rendered.contains("sum to 100, got 80/30/10 = 120"));
}
