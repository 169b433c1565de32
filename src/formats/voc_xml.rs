//! Per-image-XML adapter (Pascal VOC).
//!
//! One XML document per image: a `filename` element, a `size` block, and
//! one `object` per annotated region with absolute corner coordinates.
//! Import walks the whole archive for `.xml` entries, at any depth;
//! export renders an `annotations/` tree, or one tree per subset when
//! splitting.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use roxmltree::Node;

use crate::dedup::find_duplicate;
use crate::error::AnnoportError;
use crate::formats::{
    annotations_for_images, dataset_categories, selected_images, write_archive, ExportOptions,
    ExportedFile, ImportIssue, ImportStats, ListedImage,
};
use crate::geometry::{BBox, Pixel};
use crate::model::{
    AnnotationRecord, AnnotationSource, CategoryCreator, DatasetContext, ImageId, ImageRecord,
};
use crate::payload::{self, PayloadEntry};
use crate::reconcile::{reconcile_categories, CategorySpec};
use crate::split::split_images;
use crate::store::{DocumentStore, Filter, Stored};

/// Overlap at or above this suppresses an incoming annotation.
const DUPLICATE_IOU: f64 = 0.80;

#[derive(Debug)]
struct VocFile {
    /// Text of the `filename` element, when present.
    filename: Option<String>,
    /// From the `size` block, when present and numeric.
    width: Option<u32>,
    height: Option<u32>,
    objects: Vec<VocObject>,
}

#[derive(Debug)]
struct VocObject {
    name: String,
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
}

/// Lists the images a per-image-XML archive annotates, with dimensions
/// from each document's size block. Entries that fail to parse or carry
/// no usable size are skipped.
pub fn listed_images(bytes: &[u8], item: &str) -> Result<Vec<ListedImage>, AnnoportError> {
    let entries = payload::archive_entries(bytes, item)?;

    let mut images = Vec::new();
    for entry in &entries {
        if entry.extension().as_deref() != Some("xml") {
            continue;
        }
        let text = String::from_utf8_lossy(&entry.bytes);
        let Ok(file) = parse_voc_file(&text) else {
            continue;
        };
        let (Some(width), Some(height)) = (file.width, file.height) else {
            continue;
        };
        let file_name = file
            .filename
            .unwrap_or_else(|| format!("{}.jpg", entry.stem()));
        images.push(ListedImage {
            file_name,
            width,
            height,
        });
    }
    Ok(images)
}

/// Imports a per-image-XML archive into the dataset.
///
/// Every `.xml` entry in the archive is one image's annotations; entries
/// that fail to parse are reported and skipped without aborting the rest.
/// The annotated image is named by the `filename` element, falling back
/// to the XML entry's stem plus `.jpg`, and must already exist in the
/// dataset. Object names are created as categories if absent. Incoming
/// boxes that overlap an existing annotation of the same category at
/// IoU >= 0.8 are skipped as duplicates.
pub fn import_voc<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    bytes: &[u8],
    item: &str,
) -> Result<ImportStats, AnnoportError> {
    let entries = payload::archive_entries(bytes, item)?;

    let mut stats = ImportStats::default();

    let mut parsed: Vec<(&PayloadEntry, VocFile)> = Vec::new();
    for entry in &entries {
        if entry.extension().as_deref() != Some("xml") {
            continue;
        }
        let text = String::from_utf8_lossy(&entry.bytes);
        match parse_voc_file(&text) {
            Ok(file) => parsed.push((entry, file)),
            Err(message) => stats.add(ImportIssue::malformed(entry.name.clone(), message)),
        }
    }

    // Resolve every file to its image before creating any category, so a
    // file full of unmatchable annotations contributes nothing.
    let mut matched: Vec<(&PayloadEntry, VocFile, Stored<ImageRecord>)> = Vec::new();
    for (entry, file) in parsed {
        let file_name = match &file.filename {
            Some(name) => name.clone(),
            None => format!("{}.jpg", entry.stem()),
        };
        let found: Option<Stored<ImageRecord>> = store.find_one(&Filter::and([
            Filter::eq("dataset_id", ctx.dataset_id.as_u64()),
            Filter::eq("file_name", file_name.as_str()),
        ]))?;
        match found {
            Some(image) => {
                stats.images_matched += 1;
                matched.push((entry, file, image));
            }
            None => stats.add(ImportIssue::reference(
                entry.name.clone(),
                format!("image '{file_name}' not found in dataset"),
            )),
        }
    }

    // Object names become categories in encounter order.
    let mut specs: Vec<CategorySpec> = Vec::new();
    for (_, file, _) in &matched {
        for object in &file.objects {
            if specs.iter().all(|spec| spec.name != object.name) {
                specs.push(CategorySpec::named(object.name.as_str()));
            }
        }
    }
    let reconciled = reconcile_categories(store, ctx, &specs, CategoryCreator::System, None)?;
    stats.categories_created = reconciled.created.len() as u64;

    for (entry, file, image) in matched {
        for object in file.objects {
            let Some(category_id) = reconciled.id_of(&object.name) else {
                stats.add(ImportIssue::reference(
                    entry.name.clone(),
                    format!("category '{}' could not be resolved", object.name),
                ));
                continue;
            };

            let bbox =
                BBox::<Pixel>::from_corners(object.xmin, object.ymin, object.xmax, object.ymax);
            let duplicate = find_duplicate(
                store,
                image.id,
                Some(category_id),
                Some(object.name.as_str()),
                &bbox,
                DUPLICATE_IOU,
            )?;
            if duplicate.is_some() {
                stats.duplicates_skipped += 1;
                continue;
            }

            let record = AnnotationRecord::new_box(ctx.dataset_id, image.id, bbox)
                .with_category(Some(category_id), Some(object.name.clone()))
                .with_source(AnnotationSource::Imported);
            match store.insert_one(record) {
                Ok(_) => stats.annotations_created += 1,
                Err(err) => stats.add(ImportIssue::persistence(
                    entry.name.clone(),
                    format!("annotation could not be stored: {err}"),
                )),
            }
        }
    }

    Ok(stats)
}

fn parse_voc_file(xml: &str) -> Result<VocFile, String> {
    let document = roxmltree::Document::parse(xml).map_err(|err| err.to_string())?;

    let annotation = document.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err("missing <annotation> root element".to_string());
    }

    let filename = optional_child_text(annotation, "filename");
    let (width, height) = match child_element(annotation, "size") {
        Some(size) => (dimension_of(size, "width"), dimension_of(size, "height")),
        None => (None, None),
    };

    let mut objects = Vec::new();
    for object in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
    {
        let name = required_child_text(object, "name", "<object>")?;
        let bndbox = child_element(object, "bndbox")
            .ok_or_else(|| "missing <bndbox> in <object>".to_string())?;

        let xmin = parse_corner(bndbox, "xmin")?;
        let ymin = parse_corner(bndbox, "ymin")?;
        let xmax = parse_corner(bndbox, "xmax")?;
        let ymax = parse_corner(bndbox, "ymax")?;

        objects.push(VocObject {
            name,
            xmin,
            ymin,
            xmax,
            ymax,
        });
    }

    Ok(VocFile {
        filename,
        width,
        height,
        objects,
    })
}

fn dimension_of(size: Node<'_, '_>, tag: &str) -> Option<u32> {
    optional_child_text(size, tag).and_then(|raw| raw.parse().ok())
}

fn required_child_text(node: Node<'_, '_>, tag: &str, context: &str) -> Result<String, String> {
    optional_child_text(node, tag).ok_or_else(|| format!("missing <{tag}> in {context}"))
}

fn parse_corner(bndbox: Node<'_, '_>, tag: &str) -> Result<f64, String> {
    let raw = required_child_text(bndbox, tag, "<bndbox>")?;
    raw.parse::<f64>().map_err(|_| {
        format!("invalid <{tag}> value '{raw}' in <bndbox>; expected floating-point number")
    })
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

/// Fuzz-only entrypoint for single-document parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_voc_file(xml: &str) {
    let _ = parse_voc_file(xml);
}

/// Exports the dataset as a per-image-XML archive.
///
/// Without a split, images with no annotations are skipped and documents
/// land under `annotations/`; with one, every image gets a document under
/// `<subset>/annotations/` and the subset name doubles as the `folder`
/// element. Corner coordinates are truncated to integers.
pub fn export_voc<S: DocumentStore>(
    store: &S,
    ctx: &DatasetContext,
    opts: &ExportOptions,
) -> Result<ExportedFile, AnnoportError> {
    let images = selected_images(store, ctx, opts)?;
    let categories = dataset_categories(store, ctx)?;
    let annotations = annotations_for_images(store, &images)?;

    let category_names: BTreeMap<u64, &str> = categories
        .iter()
        .map(|category| (category.id.as_u64(), category.record.name.as_str()))
        .collect();

    let mut by_image: BTreeMap<u64, Vec<&Stored<AnnotationRecord>>> = BTreeMap::new();
    for annotation in &annotations {
        by_image
            .entry(annotation.record.image_id.as_u64())
            .or_default()
            .push(annotation);
    }

    match opts.split {
        None => {
            let folder = if ctx.dataset_name.is_empty() {
                "dataset"
            } else {
                ctx.dataset_name.as_str()
            };

            let mut entries = Vec::new();
            for image in &images {
                let Some(anns) = by_image.get(&image.id.as_u64()) else {
                    continue;
                };
                let xml = render_voc_xml(folder, image, anns, &category_names);
                entries.push((
                    format!("annotations/{}.xml", stem_of(&image.record.file_name)),
                    xml.into_bytes(),
                ));
            }

            let file_name = format!("{}_pascalvoc.zip", ctx.dataset_name);
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

            let mut entries = Vec::new();
            for (subset, members) in split.named_subsets() {
                for id in members {
                    let Some(&image) = by_id.get(&id.as_u64()) else {
                        continue;
                    };
                    let anns = by_image
                        .get(&id.as_u64())
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    let xml = render_voc_xml(subset, image, anns, &category_names);
                    entries.push((
                        format!(
                            "{subset}/annotations/{}.xml",
                            stem_of(&image.record.file_name)
                        ),
                        xml.into_bytes(),
                    ));
                }
            }

            let file_name = format!("{}_pascal_split.zip", ctx.dataset_name);
            let bytes = write_archive(&entries, &file_name)?;
            Ok(ExportedFile {
                file_name,
                content_type: "application/zip",
                bytes,
            })
        }
    }
}

fn render_voc_xml(
    folder: &str,
    image: &Stored<ImageRecord>,
    annotations: &[&Stored<AnnotationRecord>],
    category_names: &BTreeMap<u64, &str>,
) -> String {
    let mut xml = String::new();

    writeln!(xml, "<?xml version=\"1.0\" encoding=\"utf-8\"?>").expect("write to string");
    writeln!(xml, "<annotation>").expect("write to string");
    writeln!(xml, "  <folder>{}</folder>", xml_escape(folder)).expect("write to string");
    writeln!(
        xml,
        "  <filename>{}</filename>",
        xml_escape(&image.record.file_name)
    )
    .expect("write to string");
    writeln!(xml, "  <size>").expect("write to string");
    writeln!(xml, "    <width>{}</width>", image.record.width).expect("write to string");
    writeln!(xml, "    <height>{}</height>", image.record.height).expect("write to string");
    writeln!(xml, "    <depth>3</depth>").expect("write to string");
    writeln!(xml, "  </size>").expect("write to string");

    for annotation in annotations {
        let record = &annotation.record;
        let name = record
            .category_id
            .and_then(|id| category_names.get(&id.as_u64()).copied())
            .unwrap_or("unknown");

        writeln!(xml, "  <object>").expect("write to string");
        writeln!(xml, "    <name>{}</name>", xml_escape(name)).expect("write to string");
        writeln!(xml, "    <pose>Unspecified</pose>").expect("write to string");
        writeln!(xml, "    <truncated>0</truncated>").expect("write to string");
        writeln!(xml, "    <difficult>0</difficult>").expect("write to string");
        writeln!(xml, "    <bndbox>").expect("write to string");
        writeln!(xml, "      <xmin>{}</xmin>", record.bbox.xmin() as i64).expect("write to string");
        writeln!(xml, "      <ymin>{}</ymin>", record.bbox.ymin() as i64).expect("write to string");
        writeln!(xml, "      <xmax>{}</xmax>", record.bbox.xmax() as i64).expect("write to string");
        writeln!(xml, "      <ymax>{}</ymax>", record.bbox.ymax() as i64).expect("write to string");
        writeln!(xml, "    </bndbox>").expect("write to string");
        writeln!(xml, "  </object>").expect("write to string");
    }

    writeln!(xml, "</annotation>").expect("write to string");

    xml
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn stem_of(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::write_archive;
    use crate::model::{CategoryRecord, DatasetId};
    use crate::store::MemoryStore;

    fn demo_dataset() -> (MemoryStore, DatasetContext) {
        (MemoryStore::new(), DatasetContext::new(DatasetId(1), "demo"))
    }

    fn seed_image(store: &mut MemoryStore, ctx: &DatasetContext, name: &str) -> ImageId {
        store
            .insert_one(ImageRecord::new(ctx.dataset_id, name, 640, 480))
            .unwrap()
            .id
    }

    fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let owned: Vec<(String, Vec<u8>)> = entries
            .iter()
            .map(|(name, text)| (name.to_string(), text.as_bytes().to_vec()))
            .collect();
        write_archive(&owned, "test").unwrap()
    }

    const PHOTO_XML: &str = r#"<?xml version="1.0"?>
<annotation>
  <folder>images</folder>
  <filename>photo.jpg</filename>
  <size><width>640</width><height>480</height><depth>3</depth></size>
  <object>
    <name>car</name>
    <pose>Unspecified</pose>
    <bndbox><xmin>10</xmin><ymin>20</ymin><xmax>110</xmax><ymax>90</ymax></bndbox>
  </object>
  <object>
    <name>person</name>
    <bndbox><xmin>200.5</xmin><ymin>0</ymin><xmax>260</xmax><ymax>150</ymax></bndbox>
  </object>
</annotation>
"#;

    #[test]
    fn test_parse_reads_objects_and_corners() {
        let file = parse_voc_file(PHOTO_XML).unwrap();
        assert_eq!(file.filename.as_deref(), Some("photo.jpg"));
        assert_eq!(file.objects.len(), 2);
        assert_eq!(file.objects[0].name, "car");
        assert_eq!(file.objects[1].xmin, 200.5);
    }

    #[test]
    fn test_parse_rejects_broken_documents() {
        assert!(parse_voc_file("not xml at all").is_err());

        let err = parse_voc_file("<wrong/>").unwrap_err();
        assert!(err.contains("<annotation>"));

        let err = parse_voc_file(
            "<annotation><object><bndbox><xmin>1</xmin></bndbox></object></annotation>",
        )
        .unwrap_err();
        assert!(err.contains("missing <name>"));

        let err = parse_voc_file(
            "<annotation><object><name>x</name><bndbox><xmin>oops</xmin><ymin>1</ymin><xmax>2</xmax><ymax>2</ymax></bndbox></object></annotation>",
        )
        .unwrap_err();
        assert!(err.contains("invalid <xmin> value 'oops'"));
    }

    #[test]
    fn test_listed_images_reads_size_blocks() {
        let payload = archive(&[
            ("photo.xml", PHOTO_XML),
            ("nosize.xml", "<annotation><filename>n.jpg</filename></annotation>"),
            ("broken.xml", "<oops"),
        ]);
        let images = listed_images(&payload, "upload.zip").unwrap();
        assert_eq!(
            images,
            vec![ListedImage {
                file_name: "photo.jpg".to_string(),
                width: 640,
                height: 480,
            }]
        );
    }

    #[test]
    fn test_import_matches_and_converts_corners() {
        let (mut store, ctx) = demo_dataset();
        seed_image(&mut store, &ctx, "photo.jpg");

        let payload = archive(&[("annotations/photo.xml", PHOTO_XML)]);
        let stats = import_voc(&mut store, &ctx, &payload, "upload.zip").unwrap();

        assert_eq!(stats.images_matched, 1);
        assert_eq!(stats.categories_created, 2);
        assert_eq!(stats.annotations_created, 2);
        assert!(!stats.has_issues());

        let stored: Vec<Stored<AnnotationRecord>> = store.find_many(&Filter::All).unwrap();
        assert_eq!(stored[0].record.bbox.to_array(), [10.0, 20.0, 100.0, 70.0]);
        assert_eq!(stored[0].record.area, 7000.0);
        assert_eq!(stored[0].record.category_name.as_deref(), Some("car"));
        assert_eq!(stored[0].record.source, AnnotationSource::Imported);
    }

    #[test]
    fn test_import_falls_back_to_entry_stem() {
        let (mut store, ctx) = demo_dataset();
        seed_image(&mut store, &ctx, "bare.jpg");

        let xml = "<annotation><object><name>car</name>\
                   <bndbox><xmin>0</xmin><ymin>0</ymin><xmax>10</xmax><ymax>10</ymax></bndbox>\
                   </object></annotation>";
        let payload = archive(&[("deep/nested/bare.xml", xml)]);
        let stats = import_voc(&mut store, &ctx, &payload, "upload.zip").unwrap();

        assert_eq!(stats.images_matched, 1);
        assert_eq!(stats.annotations_created, 1);
    }

    #[test]
    fn test_import_reports_problems_per_entry() {
        let (mut store, ctx) = demo_dataset();
        seed_image(&mut store, &ctx, "photo.jpg");

        let payload = archive(&[
            ("good.xml", PHOTO_XML),
            ("broken.xml", "<annotation><object></object>"),
            ("ghost.xml", "<annotation><filename>ghost.jpg</filename></annotation>"),
            ("notes.txt", "ignored"),
        ]);
        let stats = import_voc(&mut store, &ctx, &payload, "upload.zip").unwrap();

        // good.xml names photo.jpg via its filename element even though
        // the entry stem differs.
        assert_eq!(stats.images_matched, 1);
        assert_eq!(stats.annotations_created, 2);
        assert_eq!(stats.issues.len(), 2);
        assert_eq!(stats.issues[0].item, "broken.xml");
        assert_eq!(stats.issues[1].item, "ghost.xml");
        assert!(stats.issues[1].message.contains("ghost.jpg"));
    }

    #[test]
    fn test_import_duplicate_threshold_is_looser() {
        let (mut store, ctx) = demo_dataset();
        let image_id = seed_image(&mut store, &ctx, "photo.jpg");
        // IoU with the incoming (0,0,100,100) box: 0.85.
        store
            .insert_one(
                AnnotationRecord::new_box(
                    ctx.dataset_id,
                    image_id,
                    BBox::new(0.0, 0.0, 100.0, 85.0),
                )
                .with_category(None, Some("car".to_string())),
            )
            .unwrap();

        let xml = "<annotation><filename>photo.jpg</filename><object><name>car</name>\
                   <bndbox><xmin>0</xmin><ymin>0</ymin><xmax>100</xmax><ymax>100</ymax></bndbox>\
                   </object></annotation>";
        let payload = archive(&[("photo.xml", xml)]);
        let stats = import_voc(&mut store, &ctx, &payload, "upload.zip").unwrap();

        assert_eq!(stats.duplicates_skipped, 1);
        assert_eq!(stats.annotations_created, 0);
    }

    #[test]
    fn test_export_single_archive() {
        let (mut store, ctx) = demo_dataset();
        let annotated = seed_image(&mut store, &ctx, "photo.jpg");
        seed_image(&mut store, &ctx, "empty.jpg");
        let car = store
            .insert_one(CategoryRecord::new(
                ctx.dataset_id,
                "car",
                "#FF0000",
                CategoryCreator::System,
            ))
            .unwrap();
        store
            .insert_one(
                AnnotationRecord::new_box(
                    ctx.dataset_id,
                    annotated,
                    BBox::new(10.7, 20.2, 99.9, 69.9),
                )
                .with_category(Some(car.id), Some("car".to_string())),
            )
            .unwrap();
        // No category reference at all.
        store
            .insert_one(AnnotationRecord::new_box(
                ctx.dataset_id,
                annotated,
                BBox::new(0.0, 0.0, 5.0, 5.0),
            ))
            .unwrap();

        let opts = ExportOptions {
            only_annotated: false,
            ..ExportOptions::default()
        };
        let exported = export_voc(&store, &ctx, &opts).unwrap();
        assert_eq!(exported.file_name, "demo_pascalvoc.zip");
        assert_eq!(exported.content_type, "application/zip");

        let entries = payload::archive_entries(&exported.bytes, "export").unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["annotations/photo.xml"]);

        let xml = String::from_utf8(entries[0].bytes.clone()).unwrap();
        assert!(xml.contains("<folder>demo</folder>"));
        assert!(xml.contains("<filename>photo.jpg</filename>"));
        // Corners truncate to integers.
        assert!(xml.contains("<xmin>10</xmin>"));
        assert!(xml.contains("<xmax>110</xmax>"));
        assert!(xml.contains("<pose>Unspecified</pose>"));
        assert!(xml.contains("<name>car</name>"));
        assert!(xml.contains("<name>unknown</name>"));
    }

    #[test]
    fn test_export_split_covers_every_image() {
        let (mut store, ctx) = demo_dataset();
        let annotated = seed_image(&mut store, &ctx, "a.jpg");
        seed_image(&mut store, &ctx, "b.jpg");
        let car = store
            .insert_one(CategoryRecord::new(
                ctx.dataset_id,
                "car",
                "#FF0000",
                CategoryCreator::System,
            ))
            .unwrap();
        store
            .insert_one(
                AnnotationRecord::new_box(
                    ctx.dataset_id,
                    annotated,
                    BBox::new(0.0, 0.0, 10.0, 10.0),
                )
                .with_category(Some(car.id), Some("car".to_string())),
            )
            .unwrap();

        let opts = ExportOptions {
            only_annotated: false,
            split: Some(crate::split::SplitRatios::new(100, 0, 0)),
            seed: Some(11),
        };
        let exported = export_voc(&store, &ctx, &opts).unwrap();
        assert_eq!(exported.file_name, "demo_pascal_split.zip");

        let entries = payload::archive_entries(&exported.bytes, "export").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .all(|e| e.name.starts_with("train/annotations/")));

        // The subset name doubles as the folder element, and unannotated
        // images still get a document.
        let b_entry = entries
            .iter()
            .find(|e| e.name == "train/annotations/b.xml")
            .unwrap();
        let xml = String::from_utf8(b_entry.bytes.clone()).unwrap();
        assert!(xml.contains("<folder>train</folder>"));
        assert!(!xml.contains("<object>"));
    }

    #[test]
    fn test_xml_escape_in_rendered_names() {
        let (mut store, ctx) = demo_dataset();
        let image_id = seed_image(&mut store, &ctx, "photo.jpg");
        let cat = store
            .insert_one(CategoryRecord::new(
                ctx.dataset_id,
                "cat & <dog>",
                "#FF0000",
                CategoryCreator::System,
            ))
            .unwrap();
        store
            .insert_one(
                AnnotationRecord::new_box(
                    ctx.dataset_id,
                    image_id,
                    BBox::new(0.0, 0.0, 10.0, 10.0),
                )
                .with_category(Some(cat.id), Some("cat & <dog>".to_string())),
            )
            .unwrap();

        let exported = export_voc(&store, &ctx, &ExportOptions::default()).unwrap();
        let entries = payload::archive_entries(&exported.bytes, "export").unwrap();
        let xml = String::from_utf8(entries[0].bytes.clone()).unwrap();
        assert!(xml.contains("<name>cat &amp; &lt;dog&gt;</name>"));
    }
}
