use thiserror::Error;

/// The main error type for annoport operations.
///
/// Only hard failures live here: a payload that cannot be recognized at
/// all, a document missing a required top-level field, archive corruption,
/// and store faults. Per-item import problems (unresolvable references,
/// oversized items, retry failures) are accumulated as data inside the
/// import statistics instead, so a batch returns partial success rather
/// than aborting.
#[derive(Debug, Error)]
pub enum AnnoportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized payload for {item}: neither a JSON document nor a ZIP archive")]
    InvalidPayload { item: String },

    #[error("failed to parse JSON document {item}: {source}")]
    JsonParse {
        item: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize JSON for {item}: {source}")]
    JsonWrite {
        item: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse XML document {item}: {message}")]
    XmlParse { item: String, message: String },

    #[error("failed to parse YAML document {item}: {source}")]
    YamlParse {
        item: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("archive error in {item}: {source}")]
    Archive {
        item: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive {item} contains no parseable documents")]
    EmptyArchive { item: String },

    #[error("archive {item} names its classes in neither classes.txt nor data.yaml")]
    ClassMapMissing { item: String },

    #[error("{collection} record {id} not found")]
    RecordNotFound { collection: &'static str, id: u64 },

    #[error("category {id} still has {annotations} annotation(s); delete them first or cascade")]
    CategoryInUse { id: u64, annotations: u64 },

    #[error("dataset {dataset_id} has no categories; create one before annotating")]
    NoCategories { dataset_id: u64 },

    #[error("invalid split ratios: {message}")]
    InvalidSplit { message: String },

    #[error("document store error: {message}")]
    Store { message: String },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}
