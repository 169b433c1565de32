#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use annoport::geometry::{BBox, Pixel};
use annoport::model::{
    AnnotationRecord, CategoryCreator, CategoryRecord, DatasetContext, DatasetId, ImageRecord,
};
use annoport::store::{DocumentStore, Filter, MemoryStore, Stored};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const EPS_COCO: f64 = 1e-10;
pub const EPS_VOC: f64 = 1e-9;

pub fn eps_yolo(image_w: u32, image_h: u32) -> f64 {
    image_w.max(image_h) as f64 * 1e-6
}

pub fn eps_yolo_for_plan(plan: &SeedPlan) -> f64 {
    plan.images
        .iter()
        .map(|(_, width, height)| eps_yolo(*width, *height))
        .fold(1e-9, f64::max)
}

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn prop_dataset() -> (MemoryStore, DatasetContext) {
    (MemoryStore::new(), DatasetContext::new(DatasetId(1), "prop"))
}

/// A dataset laid out before it touches a store: image rows, category
/// names, and `(image index, category index, box)` triples.
#[derive(Clone, Debug)]
pub struct SeedPlan {
    pub images: Vec<(String, u32, u32)>,
    pub categories: Vec<String>,
    pub annotations: Vec<(usize, usize, BBox<Pixel>)>,
}

impl SeedPlan {
    /// Inserts every record directly, bypassing duplicate checks, so the
    /// store holds exactly what the plan describes.
    pub fn populate(&self, store: &mut MemoryStore, ctx: &DatasetContext) {
        let image_ids: Vec<_> = self
            .images
            .iter()
            .map(|(file_name, width, height)| {
                store
                    .insert_one(ImageRecord::new(ctx.dataset_id, file_name, *width, *height))
                    .expect("insert image")
                    .id
            })
            .collect();
        let category_ids: Vec<_> = self
            .categories
            .iter()
            .map(|name| {
                store
                    .insert_one(CategoryRecord::new(
                        ctx.dataset_id,
                        name,
                        "#FF0000",
                        CategoryCreator::System,
                    ))
                    .expect("insert category")
                    .id
            })
            .collect();

        for (image_idx, category_idx, bbox) in &self.annotations {
            let record = AnnotationRecord::new_box(ctx.dataset_id, image_ids[*image_idx], *bbox)
                .with_category(
                    Some(category_ids[*category_idx]),
                    Some(self.categories[*category_idx].clone()),
                );
            store.insert_one(record).expect("insert annotation");
        }
    }

    /// Inserts only the image rows, as a reimport target.
    pub fn populate_images(&self, store: &mut MemoryStore, ctx: &DatasetContext) {
        for (file_name, width, height) in &self.images {
            store
                .insert_one(ImageRecord::new(ctx.dataset_id, file_name, *width, *height))
                .expect("insert image");
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnnSem {
    pub image_file: String,
    pub category: String,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

/// Flattens a store's annotations to comparable rows: file name, category
/// name, and pixel corners, sorted.
pub fn ann_semantics<S: DocumentStore>(store: &S) -> Result<Vec<AnnSem>, String> {
    let images: Vec<Stored<ImageRecord>> =
        store.find_many(&Filter::All).map_err(|e| e.to_string())?;
    let image_by_id: BTreeMap<u64, String> = images
        .into_iter()
        .map(|img| (img.id.as_u64(), img.record.file_name))
        .collect();
    let categories: Vec<Stored<CategoryRecord>> =
        store.find_many(&Filter::All).map_err(|e| e.to_string())?;
    let category_by_id: BTreeMap<u64, String> = categories
        .into_iter()
        .map(|cat| (cat.id.as_u64(), cat.record.name))
        .collect();

    let annotations: Vec<Stored<AnnotationRecord>> =
        store.find_many(&Filter::All).map_err(|e| e.to_string())?;
    let mut out = Vec::with_capacity(annotations.len());
    for ann in &annotations {
        let image_file = image_by_id
            .get(&ann.record.image_id.as_u64())
            .ok_or_else(|| {
                format!(
                    "annotation {} references missing image id {}",
                    ann.id.as_u64(),
                    ann.record.image_id.as_u64()
                )
            })?;
        let category = match &ann.record.category_name {
            Some(name) => name.clone(),
            None => ann
                .record
                .category_id
                .and_then(|id| category_by_id.get(&id.as_u64()).cloned())
                .ok_or_else(|| {
                    format!("annotation {} carries no category reference", ann.id.as_u64())
                })?,
        };

        out.push(AnnSem {
            image_file: image_file.clone(),
            category,
            xmin: ann.record.bbox.xmin(),
            ymin: ann.record.bbox.ymin(),
            xmax: ann.record.bbox.xmax(),
            ymax: ann.record.bbox.ymax(),
        });
    }

    out.sort_by(ann_sem_cmp);
    Ok(out)
}

pub fn assert_annotations_equivalent<A: DocumentStore, B: DocumentStore>(
    a: &A,
    b: &B,
    eps: f64,
) -> Result<(), String> {
    let left = ann_semantics(a)?;
    let right = ann_semantics(b)?;

    if left.len() != right.len() {
        return Err(format!(
            "annotation count mismatch: left={} right={}",
            left.len(),
            right.len()
        ));
    }

    assert_semantics_subset(&left, &right, eps)?;
    assert_semantics_subset(&right, &left, eps)?;
    Ok(())
}

pub fn assert_annotations_subset<A: DocumentStore, B: DocumentStore>(
    sub: &A,
    sup: &B,
    eps: f64,
) -> Result<(), String> {
    let sub_sem = ann_semantics(sub)?;
    let sup_sem = ann_semantics(sup)?;
    assert_semantics_subset(&sub_sem, &sup_sem, eps)
}

/// Names of every category in the store's category collection.
pub fn category_names<S: DocumentStore>(store: &S) -> Result<BTreeSet<String>, String> {
    let categories: Vec<Stored<CategoryRecord>> =
        store.find_many(&Filter::All).map_err(|e| e.to_string())?;
    Ok(categories.into_iter().map(|cat| cat.record.name).collect())
}

/// Names of the categories annotations actually reference.
pub fn used_category_names<S: DocumentStore>(store: &S) -> Result<BTreeSet<String>, String> {
    Ok(ann_semantics(store)?
        .into_iter()
        .map(|ann| ann.category)
        .collect())
}

pub fn arb_plan(max_images: usize, max_cats: usize, max_anns: usize) -> BoxedStrategy<SeedPlan> {
    assert!(max_images > 0, "max_images must be > 0");
    assert!(max_cats > 0, "max_cats must be > 0");

    (1usize..=max_images, 1usize..=max_cats, 0usize..=max_anns)
        .prop_flat_map(|(image_count, category_count, ann_count)| {
            (
                proptest::collection::hash_map(
                    image_file_name_strategy(),
                    (2u32..=4096, 2u32..=4096),
                    image_count..=image_count,
                ),
                proptest::collection::hash_set(
                    category_name_strategy(),
                    category_count..=category_count,
                ),
                proptest::collection::vec(ann_seed_strategy(), ann_count..=ann_count),
            )
                .prop_map(|(images, categories, ann_seeds)| {
                    build_plan(images, categories, ann_seeds)
                })
        })
        .boxed()
}

type AnnSeed = (u16, u16, u32, u32, u32, u32);

fn ann_seed_strategy() -> impl Strategy<Value = AnnSeed> {
    (
        any::<u16>(),
        any::<u16>(),
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
    )
}

fn image_file_name_strategy() -> BoxedStrategy<String> {
    proptest::string::string_regex("[a-z0-9_]{1,12}\\.jpg")
        .expect("valid filename regex")
        .boxed()
}

fn category_name_strategy() -> BoxedStrategy<String> {
    proptest::string::string_regex("[a-z]{1,20}")
        .expect("valid category name regex")
        .boxed()
}

fn build_plan(
    image_data: HashMap<String, (u32, u32)>,
    category_names: HashSet<String>,
    ann_seeds: Vec<AnnSeed>,
) -> SeedPlan {
    let mut images: Vec<(String, u32, u32)> = image_data
        .into_iter()
        .map(|(file_name, (width, height))| (file_name, width, height))
        .collect();
    images.sort();

    let mut categories: Vec<String> = category_names.into_iter().collect();
    categories.sort();

    let annotations: Vec<(usize, usize, BBox<Pixel>)> = ann_seeds
        .into_iter()
        .map(|(image_seed, category_seed, sx, sy, sw, sh)| {
            let image_idx = image_seed as usize % images.len();
            let category_idx = category_seed as usize % categories.len();
            let (_, width, height) = images[image_idx];
            (
                image_idx,
                category_idx,
                bbox_from_seed(width, height, sx, sy, sw, sh),
            )
        })
        .collect();

    SeedPlan {
        images,
        categories,
        annotations,
    }
}

/// A box with whole-number corners, at least 1x1, inside the image.
fn bbox_from_seed(width: u32, height: u32, sx: u32, sy: u32, sw: u32, sh: u32) -> BBox<Pixel> {
    let xmin = sx % (width - 1);
    let ymin = sy % (height - 1);
    let xmax = xmin + 1 + (sw % (width - xmin));
    let ymax = ymin + 1 + (sh % (height - ymin));

    BBox::from_corners(xmin as f64, ymin as f64, xmax as f64, ymax as f64)
}

fn assert_semantics_subset(sub: &[AnnSem], sup: &[AnnSem], eps: f64) -> Result<(), String> {
    let mut used = vec![false; sup.len()];

    for wanted in sub {
        let mut found_match = None;
        for (idx, candidate) in sup.iter().enumerate() {
            if used[idx] {
                continue;
            }
            if approx_ann_sem(wanted, candidate, eps) {
                found_match = Some(idx);
                break;
            }
        }

        match found_match {
            Some(idx) => used[idx] = true,
            None => {
                return Err(format!(
                    "missing annotation semantic match for image='{}', category='{}', bbox=({}, {}, {}, {}), eps={}",
                    wanted.image_file,
                    wanted.category,
                    wanted.xmin,
                    wanted.ymin,
                    wanted.xmax,
                    wanted.ymax,
                    eps
                ));
            }
        }
    }

    Ok(())
}

fn approx_ann_sem(left: &AnnSem, right: &AnnSem, eps: f64) -> bool {
    left.image_file == right.image_file
        && left.category == right.category
        && (left.xmin - right.xmin).abs() <= eps
        && (left.ymin - right.ymin).abs() <= eps
        && (left.xmax - right.xmax).abs() <= eps
        && (left.ymax - right.ymax).abs() <= eps
}

fn ann_sem_cmp(a: &AnnSem, b: &AnnSem) -> std::cmp::Ordering {
    a.image_file
        .cmp(&b.image_file)
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.xmin.total_cmp(&b.xmin))
        .then_with(|| a.ymin.total_cmp(&b.ymin))
        .then_with(|| a.xmax.total_cmp(&b.xmax))
        .then_with(|| a.ymax.total_cmp(&b.ymax))
}
