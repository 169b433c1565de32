#![allow(dead_code)]

use std::io::{Cursor, Write};

use annoport::model::{
    AnnotationRecord, CategoryCreator, CategoryRecord, DatasetContext, DatasetId, ImageId,
    ImageRecord,
};
use annoport::store::{DocumentStore, MemoryStore, Stored};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A fresh store with a one-dataset context named `demo`.
pub fn demo_dataset() -> (MemoryStore, DatasetContext) {
    (MemoryStore::new(), DatasetContext::new(DatasetId(1), "demo"))
}

pub fn seed_image(
    store: &mut MemoryStore,
    ctx: &DatasetContext,
    name: &str,
    width: u32,
    height: u32,
) -> ImageId {
    store
        .insert_one(ImageRecord::new(ctx.dataset_id, name, width, height))
        .expect("insert image")
        .id
}

pub fn seed_category(
    store: &mut MemoryStore,
    ctx: &DatasetContext,
    name: &str,
    color: &str,
) -> Stored<CategoryRecord> {
    store
        .insert_one(CategoryRecord::new(
            ctx.dataset_id,
            name,
            color,
            CategoryCreator::System,
        ))
        .expect("insert category")
}

pub fn insert_annotation(store: &mut MemoryStore, record: AnnotationRecord) {
    store.insert_one(record).expect("insert annotation");
}

/// Packs named entries into an in-memory ZIP, the shape every import
/// accepts.
pub fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(bytes).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// A minimal valid 24-bit BMP of the given dimensions, for exercising the
/// image ingestion probe without real photo fixtures.
pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

/// A PNG signature plus IHDR chunk, enough for header-based size probing.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(33);
    bytes.extend_from_slice(b"\x89PNG\r\n\x1a\n");
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    // Bit depth, color type, compression, filter, interlace.
    bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
    // CRC is never checked by header probes.
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes
}
