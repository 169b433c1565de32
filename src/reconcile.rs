//! Category reconciliation.
//!
//! Importers and the prediction pipeline hand over the category names they
//! encountered; reconciliation maps each name onto the dataset's existing
//! categories and creates the missing ones with freshly allocated colors.
//! Existing categories are snapshotted once per call, so a batch creates
//! each missing name exactly once and never reuses a color it has already
//! handed out.

use std::collections::BTreeMap;

use crate::color::ColorAllocator;
use crate::error::AnnoportError;
use crate::model::{CategoryCreator, CategoryId, CategoryRecord, DatasetContext};
use crate::store::{DocumentStore, Filter, Stored};

/// A category referenced by an import payload.
#[derive(Clone, Debug)]
pub struct CategorySpec {
    pub name: String,
    /// Color carried by the source file; honored when well-formed and not
    /// already taken in the dataset.
    pub color_hint: Option<String>,
}

impl CategorySpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color_hint: None,
        }
    }

    pub fn with_color_hint(mut self, hint: impl Into<String>) -> Self {
        self.color_hint = Some(hint.into());
        self
    }
}

/// The name-to-category mapping produced by one reconciliation pass.
#[derive(Debug, Default)]
pub struct CategoryReconciliation {
    /// Every category in the dataset after the pass, keyed by name.
    pub by_name: BTreeMap<String, CategoryId>,
    /// Categories this pass created, in creation order.
    pub created: Vec<Stored<CategoryRecord>>,
}

impl CategoryReconciliation {
    /// Looks up the id a name resolved to.
    pub fn id_of(&self, name: &str) -> Option<CategoryId> {
        self.by_name.get(name).copied()
    }
}

/// Resolves category names against a dataset, creating what is missing.
///
/// `creator` and `model_name` are stamped onto any category this call
/// creates; lookups of existing categories ignore them.
pub fn reconcile_categories<S: DocumentStore>(
    store: &mut S,
    ctx: &DatasetContext,
    specs: &[CategorySpec],
    creator: CategoryCreator,
    model_name: Option<&str>,
) -> Result<CategoryReconciliation, AnnoportError> {
    let existing: Vec<Stored<CategoryRecord>> =
        store.find_many(&Filter::eq("dataset_id", ctx.dataset_id.as_u64()))?;

    let mut allocator = ColorAllocator::new(existing.iter().map(|c| c.record.color.clone()));
    let mut outcome = CategoryReconciliation::default();
    for stored in existing {
        outcome.by_name.insert(stored.record.name.clone(), stored.id);
    }

    for spec in specs {
        if outcome.by_name.contains_key(&spec.name) {
            continue;
        }

        let color = match spec.color_hint.as_deref() {
            Some(hint) if allocator.try_claim(hint) => hint.to_string(),
            _ => allocator.allocate(&spec.name),
        };

        let mut record = CategoryRecord::new(ctx.dataset_id, spec.name.clone(), color, creator);
        if let Some(model) = model_name {
            record = record.with_model_name(model);
        }
        let stored = store.insert_one(record)?;
        tracing::info!(
            category = %spec.name,
            color = %stored.record.color,
            dataset = %ctx.dataset_id,
            "created category"
        );
        outcome.by_name.insert(spec.name.clone(), stored.id);
        outcome.created.push(stored);
    }

    Ok(outcome)
}
